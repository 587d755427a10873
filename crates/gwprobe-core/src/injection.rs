//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Failure-injection strategies selected from the campaign's death-type tag.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::collaborators::{Orchestrator, TargetControl};
use crate::metrics::ProbeMetrics;

pub const TAG_SCALE_CYCLE: &str = "k8s_scale_deployment_0_1";
pub const TAG_SCALE_CYCLE_NODE_ROTATION: &str = "k8s_scale_deployment_0_1_node_rr";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum InjectionMode {
    /// Ask the gateway to terminate itself; the tag is forwarded as the kill cause.
    DirectKill,
    /// Scale the deployment to zero and back to one.
    ScaleCycle,
    /// Move the next replica to the following node, then scale-cycle.
    ScaleCycleNodeRotation,
}

impl InjectionMode {
    /// Every unrecognised tag selects a direct kill.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            TAG_SCALE_CYCLE => InjectionMode::ScaleCycle,
            TAG_SCALE_CYCLE_NODE_ROTATION => InjectionMode::ScaleCycleNodeRotation,
            _ => InjectionMode::DirectKill,
        }
    }

    pub fn label(self) -> &'static str {
        self.into()
    }
}

/// Node scheduling state of a campaign: the rotation cursor and an optional pinned node.
#[derive(Debug, Default, Clone)]
pub struct NodePlacement {
    rotation: Option<Vec<String>>,
    cursor: Option<usize>,
    pinned: Option<String>,
    pinned_applied: bool,
}

impl NodePlacement {
    pub fn pin(&mut self, node: impl Into<String>) {
        self.pinned = Some(node.into());
        self.pinned_applied = false;
    }

    /// Node currently receiving the replica, if placement is being steered.
    pub fn selected(&self) -> Option<&str> {
        match (&self.rotation, self.cursor) {
            (Some(nodes), Some(idx)) => nodes.get(idx).map(String::as_str),
            _ if self.pinned_applied => self.pinned.as_deref(),
            _ => None,
        }
    }

    /// Whether any node may carry a scheduling marker placed by this campaign.
    pub fn touched(&self) -> bool {
        self.cursor.is_some() || self.pinned_applied
    }

    fn rotation_known(&self) -> bool {
        self.rotation.is_some()
    }

    fn set_rotation(&mut self, nodes: Vec<String>) {
        self.rotation = Some(nodes);
        self.cursor = None;
    }

    /// Move to the next node in the rotation, wrapping around. The first pick
    /// of a campaign is the first listed node.
    fn advance(&mut self) -> Option<usize> {
        let len = self.rotation.as_ref().map_or(0, Vec::len);
        if len == 0 {
            return None;
        }
        let next = match self.cursor {
            Some(idx) => (idx + 1) % len,
            None => 0,
        };
        self.cursor = Some(next);
        Some(next)
    }

    fn rotation_nodes(&self) -> &[String] {
        self.rotation.as_deref().unwrap_or(&[])
    }
}

/// A way of making the gateway restart.
#[async_trait]
pub trait FailureStrategy: Send + Sync {
    fn mode(&self) -> InjectionMode;
    async fn inject(&self, how: &str, placement: &mut NodePlacement);
}

pub struct DirectKill {
    target: Arc<dyn TargetControl>,
    metrics: Option<ProbeMetrics>,
}

#[async_trait]
impl FailureStrategy for DirectKill {
    fn mode(&self) -> InjectionMode {
        InjectionMode::DirectKill
    }

    /// The gateway may report its own death before answering the kill request,
    /// so the request runs detached from the caller.
    async fn inject(&self, how: &str, _placement: &mut NodePlacement) {
        let target = Arc::clone(&self.target);
        let metrics = self.metrics.clone();
        let how = how.to_owned();
        tokio::spawn(async move {
            if let Err(err) = target.request_termination(&how).await {
                warn!(how = %how, error = %err, "kill request failed");
                if let Some(metrics) = metrics {
                    metrics.inc_control_failure("kill");
                }
            }
        });
    }
}

pub struct ScaleCycle {
    orchestrator: Arc<dyn Orchestrator>,
    settle: Duration,
    metrics: Option<ProbeMetrics>,
}

impl ScaleCycle {
    async fn cycle(&self) {
        for (replicas, pause) in [(0, self.settle), (1, Duration::ZERO)] {
            if let Err(err) = self.orchestrator.set_replicas(replicas).await {
                warn!(replicas, error = %err, "scaling deployment failed");
                self.control_failure("scale");
            }
            if !pause.is_zero() {
                sleep(pause).await;
            }
        }
    }

    fn control_failure(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_control_failure(operation);
        }
    }
}

#[async_trait]
impl FailureStrategy for ScaleCycle {
    fn mode(&self) -> InjectionMode {
        InjectionMode::ScaleCycle
    }

    async fn inject(&self, _how: &str, _placement: &mut NodePlacement) {
        self.cycle().await;
    }
}

pub struct NodeRotationScaleCycle {
    scale: ScaleCycle,
}

#[async_trait]
impl FailureStrategy for NodeRotationScaleCycle {
    fn mode(&self) -> InjectionMode {
        InjectionMode::ScaleCycleNodeRotation
    }

    async fn inject(&self, _how: &str, placement: &mut NodePlacement) {
        let orchestrator = &self.scale.orchestrator;
        if !placement.rotation_known() {
            match orchestrator.node_names().await {
                Ok(nodes) => placement.set_rotation(nodes),
                Err(err) => {
                    warn!(error = %err, "listing nodes failed; skipping injection");
                    self.scale.control_failure("node_list");
                    return;
                }
            }
        }
        let Some(selected) = placement.advance() else {
            warn!("node rotation requested but the cluster reports no nodes");
            return;
        };
        for (idx, node) in placement.rotation_nodes().iter().enumerate() {
            let (result, operation) = if idx == selected {
                (orchestrator.untaint_node(node).await, "untaint")
            } else {
                (orchestrator.taint_node(node).await, "taint")
            };
            if let Err(err) = result {
                warn!(node = %node, operation, error = %err, "updating node taint failed");
                self.scale.control_failure(operation);
            }
        }
        debug!(node = ?placement.selected(), "rotated replica placement");
        self.scale.cycle().await;
    }
}

/// The three strategies plus the node-marker bookkeeping they share.
pub struct StrategySet {
    direct: DirectKill,
    scale: ScaleCycle,
    rotation: NodeRotationScaleCycle,
    orchestrator: Arc<dyn Orchestrator>,
    metrics: Option<ProbeMetrics>,
}

impl StrategySet {
    pub fn new(
        target: Arc<dyn TargetControl>,
        orchestrator: Arc<dyn Orchestrator>,
        scale_settle: Duration,
        metrics: Option<ProbeMetrics>,
    ) -> Self {
        let scale = || ScaleCycle {
            orchestrator: Arc::clone(&orchestrator),
            settle: scale_settle,
            metrics: metrics.clone(),
        };
        Self {
            direct: DirectKill {
                target,
                metrics: metrics.clone(),
            },
            scale: scale(),
            rotation: NodeRotationScaleCycle { scale: scale() },
            orchestrator: Arc::clone(&orchestrator),
            metrics,
        }
    }

    pub fn select(&self, mode: InjectionMode) -> &dyn FailureStrategy {
        match mode {
            InjectionMode::DirectKill => &self.direct,
            InjectionMode::ScaleCycle => &self.scale,
            InjectionMode::ScaleCycleNodeRotation => &self.rotation,
        }
    }

    /// Taint every node except the pinned one. Runs once per campaign.
    pub async fn apply_pin(&self, placement: &mut NodePlacement) {
        let Some(pinned) = placement.pinned.clone() else {
            return;
        };
        if placement.pinned_applied {
            return;
        }
        let nodes = match self.orchestrator.node_names().await {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(node = %pinned, error = %err, "listing nodes failed; pin not applied");
                self.control_failure("node_list");
                return;
            }
        };
        for node in nodes.iter().filter(|node| **node != pinned) {
            if let Err(err) = self.orchestrator.taint_node(node).await {
                warn!(node = %node, error = %err, "tainting node failed");
                self.control_failure("taint");
            }
        }
        if let Err(err) = self.orchestrator.untaint_node(&pinned).await {
            warn!(node = %pinned, error = %err, "untainting pinned node failed");
            self.control_failure("untaint");
        }
        placement.pinned_applied = true;
        info!(node = %pinned, "replica pinned");
    }

    /// Remove scheduling markers from every node if this campaign placed any.
    pub async fn release_placement(&self, placement: &NodePlacement) {
        if !placement.touched() {
            return;
        }
        let nodes = match self.orchestrator.node_names().await {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(error = %err, "listing nodes failed; taints left in place");
                self.control_failure("node_list");
                return;
            }
        };
        for node in &nodes {
            if let Err(err) = self.orchestrator.untaint_node(node).await {
                warn!(node = %node, error = %err, "untainting node failed");
                self.control_failure("untaint");
            }
        }
        info!(nodes = nodes.len(), "node scheduling restored");
    }

    fn control_failure(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_control_failure(operation);
        }
    }
}
