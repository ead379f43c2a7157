use once_cell::sync::OnceCell;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static INIT: OnceCell<()> = OnceCell::new();

/// Install the global JSON tracing subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init_tracing() {
    INIT.get_or_init(|| {
        tracing_log::LogTracer::init().ok();
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    });
}

/// Tracing setup with an additional daily-rotated file output. The returned
/// guard must be held for the lifetime of the process or buffered log lines
/// are lost. Returns `None` when a subscriber is already installed.
pub fn init_tracing_with_file(
    directory: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let mut guard = None;
    INIT.get_or_init(|| {
        tracing_log::LogTracer::init().ok();
        let file_appender = tracing_appender::rolling::daily(directory, "dispatcher.log");
        let (file_writer, worker_guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
            .init();
        guard = Some(worker_guard);
    });
    guard
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
    info!("shutdown signal received");
}
