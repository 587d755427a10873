//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Event records exchanged with the instrumented gateway and the values sealed
//! from them.
use serde::{Deserialize, Serialize};

/// Mark substituted when a restart is sealed without an operator-provided mark.
/// Data recorded under it is never finalized.
pub const UNSOLICITED_MARK: &str = "unsolicited";

/// Checkpoint emitted once the gateway process entered its main routine.
pub const CHECKPOINT_MAIN: &str = "main";

/// Checkpoint emitted once the gateway frontend accepts requests.
pub const CHECKPOINT_FRONTEND_UP: &str = "frontend-up";

/// A termination notification from the gateway. Timestamps are nanoseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathEvent {
    pub ts: i64,
    /// Free-form cause, e.g. `sigterm` or `die_request`.
    pub kind: String,
}

/// A startup checkpoint notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartEvent {
    pub ts: i64,
    pub checkpoint: String,
}

impl StartEvent {
    pub fn new(ts: i64, checkpoint: impl Into<String>) -> Self {
        Self {
            ts,
            checkpoint: checkpoint.into(),
        }
    }
}

/// One sealed restart measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartEvent {
    /// Monotonic within a campaign. Resets to zero with the run state.
    pub id: u64,
    pub mark: String,
    pub death: DeathEvent,
    pub main: StartEvent,
    pub frontend_up: StartEvent,
}

impl RestartEvent {
    /// Nanoseconds from death to the `main` checkpoint. Spans beyond the `i64`
    /// range saturate.
    pub fn to_main_nanos(&self) -> i64 {
        self.main.ts.saturating_sub(self.death.ts)
    }

    /// Nanoseconds from death to the `frontend-up` checkpoint.
    pub fn to_frontend_up_nanos(&self) -> i64 {
        self.frontend_up.ts.saturating_sub(self.death.ts)
    }

    /// Nanoseconds between the `main` and `frontend-up` checkpoints.
    pub fn main_to_frontend_up_nanos(&self) -> i64 {
        self.frontend_up.ts.saturating_sub(self.main.ts)
    }
}

/// Outcome of a single workload write against the data path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3WorkloadEvent {
    pub id: u64,
    pub start_ts: i64,
    pub end_ts: i64,
    /// Empty on success.
    pub error: String,
}

impl S3WorkloadEvent {
    pub fn rtt_nanos(&self) -> i64 {
        self.end_ts.saturating_sub(self.start_ts)
    }

    pub fn failed(&self) -> bool {
        !self.error.is_empty()
    }
}
