//! ---
//! probe_section: "05-http-surface"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Notification ingress and campaign control over HTTP."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use gwprobe_core::{Probe, SharedRegistry};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::routes::{router, ApiState};

/// Configures and spawns the probe HTTP server.
pub struct ProbeApiBuilder {
    listen: SocketAddr,
    probe: Arc<Probe>,
    registry: Option<SharedRegistry>,
}

impl ProbeApiBuilder {
    pub fn new(listen: SocketAddr, probe: Arc<Probe>) -> Self {
        Self {
            listen,
            probe,
            registry: None,
        }
    }

    /// Expose the registry at `/metrics`.
    pub fn with_metrics_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub async fn spawn(self) -> anyhow::Result<ProbeApiHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "probe api listening");

        let app = router(Arc::new(ApiState::new(self.probe, self.registry)));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "probe api server exited with error");
            }
        });

        Ok(ProbeApiHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

pub struct ProbeApiHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ProbeApiHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for in-flight requests to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(anyhow::Error::new)
    }
}
