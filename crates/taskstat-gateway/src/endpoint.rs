//! Embedded HTTP exposition endpoint.
//!
//! Single-shot lifecycle: `Idle -> Starting -> Listening -> Stopped`
//! (`Starting -> Stopped` on bind failure). There is no restart; build a new
//! `MetricsEndpoint` instead.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use taskstat_core::error::{Result, TaskStatError};
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::obs::MetricsRegistry;
use crate::router;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Idle,
    Starting,
    Listening(SocketAddr),
    Stopped,
}

pub struct MetricsEndpoint {
    registry: Arc<MetricsRegistry>,
    state: watch::Sender<EndpointState>,
    shutdown: Arc<Notify>,
}

impl MetricsEndpoint {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        let (state, _) = watch::channel(EndpointState::Idle);
        Self {
            registry,
            state,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> EndpointState {
        *self.state.borrow()
    }

    /// Bind `addr`, serve the registry at `pattern`, and resolve only when the
    /// endpoint is stopped (`Ok`) or fails (`Bind`/`Serve`).
    ///
    /// Spawn this on its own task; use [`stop`](Self::stop) from elsewhere.
    pub async fn run(&self, pattern: &str, addr: &str) -> Result<()> {
        let mut claimed = false;
        self.state.send_if_modified(|s| {
            if *s == EndpointState::Idle {
                *s = EndpointState::Starting;
                claimed = true;
            }
            claimed
        });
        if !claimed {
            return Err(TaskStatError::AlreadyStarted);
        }

        let res = self.serve(pattern, addr).await;
        self.state.send_replace(EndpointState::Stopped);
        res
    }

    async fn serve(&self, pattern: &str, addr: &str) -> Result<()> {
        let app = router::build_router(pattern, Arc::clone(&self.registry))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TaskStatError::Bind(format!("{addr}: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| TaskStatError::Bind(format!("{addr}: {e}")))?;

        self.state.send_replace(EndpointState::Listening(local));
        tracing::info!(%local, pattern, "metrics endpoint listening");

        let shutdown = Arc::clone(&self.shutdown);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await
            .map_err(|e| TaskStatError::Serve(e.to_string()))?;

        tracing::info!(%local, "metrics endpoint stopped");
        Ok(())
    }

    /// Resolve with the bound address once listening.
    ///
    /// Waits while the endpoint is `Idle`; fails if it stopped without ever
    /// listening (e.g. bind failure).
    pub async fn listening(&self) -> Result<SocketAddr> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|s| matches!(s, EndpointState::Listening(_) | EndpointState::Stopped))
            .await
            .map_err(|_| TaskStatError::Internal("endpoint state channel closed".into()))?;
        match state {
            EndpointState::Listening(addr) => Ok(addr),
            _ => Err(TaskStatError::Serve("endpoint stopped before listening".into())),
        }
    }

    /// Gracefully stop the endpoint, letting in-flight scrapes finish.
    ///
    /// Fails with `NotStarted` if `run` was never called and with
    /// `ShutdownTimeout` if the listener is still open after `deadline`.
    /// Stopping an already stopped endpoint is a no-op.
    pub async fn stop(&self, deadline: Duration) -> Result<()> {
        match self.state() {
            EndpointState::Idle => return Err(TaskStatError::NotStarted),
            EndpointState::Stopped => return Ok(()),
            EndpointState::Starting | EndpointState::Listening(_) => {}
        }

        tracing::debug!(?deadline, "metrics endpoint shutdown requested");
        self.shutdown.notify_one();

        let mut rx = self.state.subscribe();
        tokio::time::timeout(deadline, rx.wait_for(|s| *s == EndpointState::Stopped))
            .await
            .map_err(|_| TaskStatError::ShutdownTimeout)?
            .map_err(|_| TaskStatError::Internal("endpoint state channel closed".into()))?;
        Ok(())
    }

    /// Stop the endpoint and join the task that is running [`run`](Self::run).
    ///
    /// Covers a `server` task that has been spawned but not yet polled: the
    /// endpoint is given up to `deadline` to claim its listener and is then
    /// stopped normally. A task that still has not started is aborted. Once
    /// stopped, the task's own result (e.g. `Bind`) is returned; on
    /// `ShutdownTimeout` the task is left running and not joined.
    pub async fn stop_and_join(
        &self,
        server: JoinHandle<Result<()>>,
        deadline: Duration,
    ) -> Result<()> {
        let stopped = match self.stop(deadline).await {
            Err(TaskStatError::NotStarted) => {
                let _ = tokio::time::timeout(deadline, self.listening()).await;
                self.stop(deadline).await
            }
            other => other,
        };

        match stopped {
            Err(TaskStatError::NotStarted) => {
                server.abort();
                match server.await {
                    Ok(res) => res,
                    Err(e) if e.is_cancelled() => Ok(()),
                    Err(e) => Err(TaskStatError::Internal(e.to_string())),
                }
            }
            Err(e) => Err(e),
            Ok(()) => match server.await {
                Ok(res) => res,
                Err(e) => Err(TaskStatError::Internal(e.to_string())),
            },
        }
    }
}
