//! ---
//! probe_section: "04-orchestration"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Deployment scaling and node scheduling control."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use thiserror::Error;

#[derive(Error, Debug)]
pub enum K8sError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("unable to infer cluster configuration: {0}")]
    Config(#[from] kube::config::InferConfigError),

    #[error("invalid API server URL '{0}'")]
    InvalidServer(String),

    #[error("node {0} not found")]
    NodeNotFound(String),
}
