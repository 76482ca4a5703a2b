//! taskstat demo host
//!
//! - Loads `taskstat.yaml` (or the path given as the first argument)
//! - Serves the task gauge at `exporter.path` on `exporter.listen`
//! - Runs a few tracked heartbeat workers until Ctrl+C / SIGTERM
//! - Stops the endpoint within `exporter.shutdown_timeout_ms`, then drains workers

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use taskstat_core::TaskTracker;
use taskstat_gateway::{config, MetricsEndpoint, MetricsRegistry, TaskStats};

const WORKERS: [&str; 3] = ["ingest", "ingest", "compact"];

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, code = e.code().as_str(), "taskstat-demo failed");
        std::process::exit(1);
    }
}

async fn run() -> taskstat_core::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "taskstat.yaml".into());
    let cfg = config::load_from_file(&path)?;

    let registry = Arc::new(MetricsRegistry::new());
    let tracker = Arc::new(TaskTracker::new(cfg.service.clone()));
    let stats = Arc::new(TaskStats::with_metric_name(
        Arc::clone(&tracker),
        &registry,
        &cfg.exporter.metric_name,
    )?);
    let sync = stats.spawn_periodic_sync(cfg.exporter.sync_interval());

    let endpoint = Arc::new(MetricsEndpoint::new(Arc::clone(&registry)));
    let server = {
        let endpoint = Arc::clone(&endpoint);
        let path = cfg.exporter.path.clone();
        let listen = cfg.exporter.listen.clone();
        tokio::spawn(async move { endpoint.run(&path, &listen).await })
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    for (i, name) in WORKERS.iter().enumerate() {
        let guard = tracker.start(name);
        let mut stop_rx = stop_rx.clone();
        let beat = Duration::from_millis(500 * (i as u64 + 1));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(beat) => tracing::debug!(worker = %guard.name(), "heartbeat"),
                    _ = stop_rx.changed() => break,
                }
            }
        });
    }

    tokio::select! {
        _ = shutdown_signal() => {}
        res = endpoint.listening() => {
            // On bind failure fall through; the error comes back from `stop_and_join`.
            if res.is_ok() {
                shutdown_signal().await;
            }
        }
    }

    let _ = stop_tx.send(true);
    let stop_res = endpoint
        .stop_and_join(server, cfg.exporter.shutdown_timeout())
        .await;
    sync.abort();

    let drained = {
        let tracker = Arc::clone(&tracker);
        let timeout = cfg.exporter.shutdown_timeout();
        tokio::task::spawn_blocking(move || tracker.wait_timeout(timeout))
            .await
            .map_err(|e| taskstat_core::TaskStatError::Internal(e.to_string()))?
    };
    if !drained {
        tracing::warn!(outstanding = tracker.outstanding(), "workers still running at exit");
    }

    stop_res
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
