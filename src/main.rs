use std::sync::Arc;

use anyhow::Result;
use microgrid_dispatcher::config::Config;
use microgrid_dispatcher::dispatch::{DispatchLoop, ImbalanceCoordinator};
use microgrid_dispatcher::telemetry;
use parking_lot::Mutex;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load()?;
    let microgrid = cfg.build_microgrid();
    info!(
        generation_kw = microgrid.total_generation_kw(),
        demand_kw = microgrid.total_demand_kw(),
        tick_seconds = cfg.dispatch.tick_seconds,
        "starting microgrid dispatcher"
    );
    let grid = Arc::new(Mutex::new(microgrid));

    let coordinator = ImbalanceCoordinator::new(cfg.dispatch.thresholds.clone());
    let dispatch = DispatchLoop::new(grid.clone(), coordinator);
    let loop_handle = dispatch.spawn(cfg.dispatch.tick_seconds);

    #[cfg(feature = "sim")]
    let (jitter_handle, jitter_cancel) = {
        let cancel = tokio_util::sync::CancellationToken::new();
        let handle = microgrid_dispatcher::sim::spawn_tariff_jitter(
            grid.clone(),
            cfg.dispatch.tick_seconds,
            cancel.clone(),
            0.05,
        )?;
        (handle, cancel)
    };

    telemetry::shutdown_signal().await;

    dispatch.stop();
    loop_handle.await?;

    #[cfg(feature = "sim")]
    {
        jitter_cancel.cancel();
        jitter_handle.await?;
    }

    warn!("shutdown complete");
    Ok(())
}
