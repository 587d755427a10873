//! ---
//! probe_section: "05-http-surface"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Notification ingress and campaign control over HTTP."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! HTTP surface of the probe.
//!
//! The gateway reports deaths and startup checkpoints with `PUT /death` and
//! `PUT /start`; operators arm campaigns with `PUT /probe`, reset with
//! `PUT /clear` and read results from `GET /stats`, `GET /status` and
//! `GET /metrics`.

mod error;
mod routes;
mod server;

pub use error::ApiError;
pub use routes::{router, ApiState};
pub use server::{ProbeApiBuilder, ProbeApiHandle};
