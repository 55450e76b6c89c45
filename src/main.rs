use std::path::Path;
use std::sync::Arc;

use d_controller::reconciler::workspace_mounts_controller;
use d_controller::storage::MemoryStore;
use d_controller::utils::file_io::open_file_for_append;
use d_controller::ControllerConfig;
use d_controller::Error;
use d_controller::Resource;
use d_controller::Result;
use d_controller::SystemError;
use d_controller::Workspace;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let config = ControllerConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(&config.controller.name, &config.monitoring.log_dir)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let store = Arc::new(MemoryStore::new());
    let runtime = workspace_mounts_controller(
        config,
        graceful_rx.clone(),
        store.lister_watcher(&Workspace::gvr()),
        store.clone(),
        store.clone(),
        store,
    )
    .start_metrics_server(graceful_rx.clone())
    .build()?;

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if let Err(e) = runtime.run().await {
        error!("controller stops: {:?}", e);
        return Err(e);
    }

    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    info!("Shutdown controller..");
    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::System(SystemError::SignalSendFailed(format!(
            "Failed to send shutdown signal: {e}"
        )))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

pub fn init_observability(
    controller: &str,
    log_dir: &Path,
) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(&log_dir.join(format!("{controller}/d.log")))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
