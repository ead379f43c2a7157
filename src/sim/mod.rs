//! Demo microgrid and tariff jitter used by the binary when no real
//! collaborators are wired in.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatch::Microgrid;
use crate::domain::{BatteryStore, Capability, DeviceKind, GenerationDevice, GridContract, LoadDevice};

/// A small but representative microgrid: three online generators, one cold
/// standby turbine, four loads across three priority tiers.
pub fn demo_microgrid() -> Microgrid {
    Microgrid::new(
        vec![
            GenerationDevice::new(
                "fuel-cell",
                DeviceKind::FuelCell,
                1,
                Capability::Adjustable {
                    min_kw: 20.0,
                    max_kw: 120.0,
                },
            )
            .with_state(true, 50.0),
            GenerationDevice::new(
                "pv-array",
                DeviceKind::Pv,
                2,
                Capability::Adjustable {
                    min_kw: 0.0,
                    max_kw: 300.0,
                },
            )
            .with_state(true, 180.0),
            GenerationDevice::new(
                "wind-north",
                DeviceKind::Wind,
                3,
                Capability::Binary { rated_kw: 80.0 },
            )
            .with_state(true, 80.0),
            GenerationDevice::new(
                "backup-turbine",
                DeviceKind::FuelTurbine,
                4,
                Capability::Adjustable {
                    min_kw: 30.0,
                    max_kw: 200.0,
                },
            ),
        ],
        vec![
            LoadDevice::new("process-line", 1, Capability::Binary { rated_kw: 160.0 }).with_state(true, 160.0),
            LoadDevice::new(
                "hvac",
                2,
                Capability::Adjustable {
                    min_kw: 25.0,
                    max_kw: 90.0,
                },
            )
            .with_state(true, 70.0),
            LoadDevice::new("warehouse-lighting", 3, Capability::Binary { rated_kw: 25.0 }).with_state(true, 25.0),
            LoadDevice::new(
                "ev-depot",
                4,
                Capability::Adjustable {
                    min_kw: 0.0,
                    max_kw: 110.0,
                },
            )
            .with_state(true, 55.0),
        ],
        BatteryStore::new(250.0, 120.0),
        GridContract::new(1500.0, 2000.0, true, 0.45, 0.30),
    )
}

/// Multiplicative noise on the contract tariffs, so consecutive ticks see
/// slightly different prices and exercise the hysteresis bands.
pub struct TariffJitter {
    noise: Normal<f64>,
    rng: StdRng,
}

impl TariffJitter {
    pub fn new(std_dev: f64) -> Result<Self> {
        let noise = Normal::new(0.0, std_dev)
            .map_err(|e| anyhow::anyhow!("invalid tariff jitter std dev {std_dev}: {e}"))?;
        Ok(Self {
            noise,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn perturb(&mut self, contract: &mut GridContract) {
        let buy_factor = (1.0 + self.noise.sample(&mut self.rng)).clamp(0.5, 1.5);
        let sell_factor = (1.0 + self.noise.sample(&mut self.rng)).clamp(0.5, 1.5);
        contract.buy_price = (contract.buy_price * buy_factor).max(0.0);
        contract.sell_price = (contract.sell_price * sell_factor).max(0.0);
        debug!(
            buy_price = contract.buy_price,
            sell_price = contract.sell_price,
            "tariffs perturbed"
        );
    }
}

/// Periodically perturb the shared contract tariffs until cancelled.
pub fn spawn_tariff_jitter(
    grid: Arc<Mutex<Microgrid>>,
    every_seconds: u64,
    cancel: CancellationToken,
    std_dev: f64,
) -> Result<JoinHandle<()>> {
    let mut jitter = TariffJitter::new(std_dev)?;
    Ok(tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(every_seconds.max(1)));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("tariff jitter stopped");
                    break;
                }
                _ = interval.tick() => {
                    jitter.perturb(&mut grid.lock().contract);
                }
            }
        }
    }))
}
