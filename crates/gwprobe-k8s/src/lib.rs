//! ---
//! probe_section: "04-orchestration"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Deployment scaling and node scheduling control."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Orchestrator collaborator backed by the Kubernetes API.

pub mod error;
pub mod orchestrator;
pub mod taints;

pub use error::K8sError;
pub use orchestrator::KubeOrchestrator;
