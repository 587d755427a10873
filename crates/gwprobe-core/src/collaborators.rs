//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Seams to the systems the probe drives. Implementations live in the S3 and
//! Kubernetes crates; tests substitute in-memory fakes.
use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::interpose::PendingAction;

/// Timing of one data-path write, in nanoseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub start_ts: i64,
    pub end_ts: i64,
    pub error: Option<String>,
}

/// Asks the gateway process to terminate itself.
#[async_trait]
pub trait TargetControl: Send + Sync {
    async fn request_termination(&self, how: &str) -> Result<()>;
}

/// Object writes issued by the background workload.
#[async_trait]
pub trait DataPath: Send + Sync {
    async fn write_object(&self, bucket: &str, key: &str, payload: &str) -> WriteOutcome;
}

/// Deployment scaling and node scheduling control.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn set_replicas(&self, replicas: i32) -> Result<()>;
    async fn node_names(&self) -> Result<Vec<String>>;
    /// Mark a node so no new pods are scheduled onto it.
    async fn taint_node(&self, node: &str) -> Result<()>;
    async fn untaint_node(&self, node: &str) -> Result<()>;
}

/// Runs a queued action between a sealed restart and the next injection.
#[async_trait]
pub trait Interposer: Send + Sync {
    async fn interpose(&self, action: &PendingAction) -> Result<()>;
}

/// Destination for finalized campaign artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    fn name(&self) -> &str;
    async fn persist(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Stand-in used when no orchestrator is configured. Every call fails so the
/// scaling strategies log what they could not do.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredOrchestrator;

#[async_trait]
impl Orchestrator for UnconfiguredOrchestrator {
    async fn set_replicas(&self, replicas: i32) -> Result<()> {
        bail!("no orchestrator configured; cannot scale to {replicas}")
    }

    async fn node_names(&self) -> Result<Vec<String>> {
        bail!("no orchestrator configured; cannot list nodes")
    }

    async fn taint_node(&self, node: &str) -> Result<()> {
        bail!("no orchestrator configured; cannot taint {node}")
    }

    async fn untaint_node(&self, node: &str) -> Result<()> {
        bail!("no orchestrator configured; cannot untaint {node}")
    }
}
