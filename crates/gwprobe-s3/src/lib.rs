//! ---
//! probe_section: "03-gateway-control"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Signed S3 and admin requests against the gateway."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Gateway-facing S3 plumbing: a SigV4 signer, a small signed HTTP client,
//! and the probe collaborators implemented on top of it.

pub mod client;
pub mod interpose;
pub mod signer;
pub mod sink;

pub use client::S3Client;
pub use interpose::S3Interposer;
pub use signer::{Credentials, SigV4Signer, SignError};
pub use sink::S3ArtifactSink;
