//! ---
//! probe_section: "01-core-functionality"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Shared primitives and utilities for the probe runtime."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Shared primitives for the gateway probe workspace.
//! This crate exposes configuration loading, logging setup, timestamp
//! units, and the small argument parsers used at the HTTP boundary.

pub mod args;
pub mod config;
pub mod logging;
pub mod time;

pub use args::{parse_i64, parse_kv_args, parse_u64, ArgsError};
pub use config::{
    ApiConfig, AppConfig, ArtifactConfig, LoadedAppConfig, LoggingConfig, OrchestratorConfig,
    ProbeConfig, TargetConfig,
};
pub use logging::{init_tracing, level_directive, LogFormat};
pub use time::{now_nanos, unix_seconds, TimeUnit, TimeUnitError};
