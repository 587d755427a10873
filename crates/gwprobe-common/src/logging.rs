//! ---
//! probe_section: "01-core-functionality"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Shared primitives and utilities for the probe runtime."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "GWPROBE_LOG";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Translate the probe's short verbosity names into an `EnvFilter` directive.
///
/// Unknown names are passed through untouched so full directives such as
/// `info,gwprobe_core=trace` keep working.
pub fn level_directive(level: &str) -> String {
    match level {
        "off" => "off".to_owned(),
        "trc" => "trace".to_owned(),
        "dbg" => "debug".to_owned(),
        "inf" => "info".to_owned(),
        "wrn" => "warn".to_owned(),
        "err" | "fat" => "error".to_owned(),
        other => other.to_owned(),
    }
}

/// Initialize the tracing subscriber.
///
/// Filter precedence: the explicit `directive` (from the CLI), then `GWPROBE_LOG`,
/// then `RUST_LOG`, finally `info`. Stdout follows the configured format and a
/// daily rolling JSON file is written under the logging directory.
pub fn init_tracing(
    service_name: &str,
    config: &LoggingConfig,
    directive: Option<&str>,
) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());

    let file_appender = daily(&config.directory, format!("{prefix}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let requested = directive
        .map(level_directive)
        .or_else(|| std::env::var(LOG_ENV).ok());
    let filter = match requested {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid log directive '{directive}' ({err}); defaulting to info");
            EnvFilter::new("info")
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let fmt_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(service = %service_name, log_dir = %config.directory.display(), format = ?config.format, "tracing initialised");
    Ok(())
}
