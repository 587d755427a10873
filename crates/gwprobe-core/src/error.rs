//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use thiserror::Error;

/// Failures surfaced by the probe state machine to its callers.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("a death event is already pending (received at {pending_ts})")]
    DeathAlreadyPending { pending_ts: i64 },
    #[error("start checkpoint '{checkpoint}' received with no pending death")]
    NoPendingDeath { checkpoint: String },
    #[error("a campaign is already in flight ({pending_restarts} restarts outstanding)")]
    CampaignInFlight { pending_restarts: u32 },
    #[error("invalid campaign request: {0}")]
    InvalidArm(String),
    #[error("workload '{0}' is not available")]
    UnavailableWorkload(String),
    #[error("workload argument '{0}' is missing")]
    MissingWorkloadArg(&'static str),
}

impl ProbeError {
    /// True for protocol violations, i.e. events arriving in an order the
    /// correlation state machine does not accept.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ProbeError::DeathAlreadyPending { .. }
                | ProbeError::NoPendingDeath { .. }
                | ProbeError::CampaignInFlight { .. }
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::DeathAlreadyPending { .. } => "death_already_pending",
            ProbeError::NoPendingDeath { .. } => "no_pending_death",
            ProbeError::CampaignInFlight { .. } => "campaign_in_flight",
            ProbeError::InvalidArm(_) => "invalid_arm",
            ProbeError::UnavailableWorkload(_) => "unavailable_workload",
            ProbeError::MissingWorkloadArg(_) => "missing_workload_arg",
        }
    }
}
