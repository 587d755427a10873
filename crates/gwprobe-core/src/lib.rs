//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---

pub mod artifacts;
pub mod collaborators;
pub mod error;
pub mod events;
pub mod injection;
pub mod interpose;
pub mod metrics;
pub mod probe;
pub mod stats;
pub mod store;
pub mod workload;

pub use artifacts::{render_artifacts, Artifact, FsArtifactSink};
pub use collaborators::{
    ArtifactSink, DataPath, Interposer, Orchestrator, TargetControl, UnconfiguredOrchestrator,
    WriteOutcome,
};
pub use error::ProbeError;
pub use events::{
    DeathEvent, RestartEvent, S3WorkloadEvent, StartEvent, CHECKPOINT_FRONTEND_UP,
    CHECKPOINT_MAIN, UNSOLICITED_MARK,
};
pub use injection::{FailureStrategy, InjectionMode, NodePlacement, StrategySet};
pub use interpose::PendingAction;
pub use metrics::{new_registry, ProbeMetrics, SharedRegistry};
pub use probe::{
    ArmRequest, Collaborators, Probe, ProbeSettings, RunPhase, StartOutcome, StatusSnapshot,
};
pub use stats::{MarkSelector, Reductions, RestartSeries, StatsDocument, WorkloadSeriesStats};
pub use store::{CollectedData, SharedStore};
pub use workload::{WorkloadConfig, WorkloadHandle, WorkloadKind};
