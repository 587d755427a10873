//! ---
//! probe_section: "01-core-functionality"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Shared primitives and utilities for the probe runtime."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;
use crate::time::TimeUnit;

fn default_collect_at() -> String {
    "frontend-up".to_owned()
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_target_endpoint() -> String {
    "http://localhost:7480".to_owned()
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "default".to_owned()
}

fn default_deployment() -> String {
    "s3gw".to_owned()
}

fn default_scale_settle() -> Duration {
    Duration::from_millis(1000)
}

fn default_taint_key() -> String {
    "noSch".to_owned()
}

fn default_taint_value() -> String {
    "1".to_owned()
}

fn default_artifact_directory() -> PathBuf {
    PathBuf::from("target/probe-artifacts")
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for the probe daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no candidate existed and defaults were used.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "GWPROBE_CONFIG";

    /// Load configuration from the first existing candidate, respecting the
    /// `GWPROBE_CONFIG` override. Falls back to defaults when nothing exists.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        let config = AppConfig::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.probe.collect_at.trim().is_empty() {
            return Err(anyhow!("probe.collect_at must name a start checkpoint"));
        }
        if self.target.endpoint.trim().is_empty() {
            return Err(anyhow!("target.endpoint must not be empty"));
        }
        if self.orchestrator.enabled && self.orchestrator.deployment.trim().is_empty() {
            return Err(anyhow!(
                "orchestrator.deployment is required when the orchestrator is enabled"
            ));
        }
        if self.artifacts.bucket.is_some() && self.artifacts.s3_endpoint.is_none() {
            return Err(anyhow!(
                "artifacts.bucket requires artifacts.s3_endpoint to be set"
            ));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Correlation tuning.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Start checkpoint whose arrival seals a restart measurement.
    #[serde(default = "default_collect_at")]
    pub collect_at: String,
    /// Wait after sealing before the next failure is injected.
    #[serde(default = "default_settle_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub settle_delay: Duration,
    /// Unit used for the statistics persisted when a campaign completes.
    #[serde(default)]
    pub finalize_time_unit: TimeUnit,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            collect_at: default_collect_at(),
            settle_delay: default_settle_delay(),
            finalize_time_unit: TimeUnit::Millis,
        }
    }
}

/// The instrumented gateway under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_target_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_true")]
    pub force_path_style: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            endpoint: default_target_endpoint(),
            region: default_region(),
            force_path_style: true,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_deployment")]
    pub deployment: String,
    /// Wait between scaling the deployment to zero and back to one.
    #[serde(default = "default_scale_settle")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub scale_settle: Duration,
    /// API server URL overriding the inferred cluster (in-cluster service account or kubeconfig).
    #[serde(default)]
    pub api_server: Option<String>,
    #[serde(default = "default_taint_key")]
    pub taint_key: String,
    #[serde(default = "default_taint_value")]
    pub taint_value: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace: default_namespace(),
            deployment: default_deployment(),
            scale_settle: default_scale_settle(),
            api_server: None,
            taint_key: default_taint_key(),
            taint_value: default_taint_value(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_true")]
    pub force_path_style: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            directory: default_artifact_directory(),
            s3_endpoint: None,
            bucket: None,
            force_path_style: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.probe.collect_at, "frontend-up");
        assert_eq!(config.probe.settle_delay, Duration::from_millis(100));
        assert_eq!(config.target.endpoint, "http://localhost:7480");
        assert_eq!(config.orchestrator.taint_key, "noSch");
        assert_eq!(config.api.listen.port(), 8080);
    }

    #[test]
    fn durations_are_read_in_milliseconds() {
        let config: AppConfig = r#"
            [probe]
            collect_at = "main"
            settle_delay = 250
            finalize_time_unit = "us"

            [orchestrator]
            enabled = true
            deployment = "s3gw-ha"
            scale_settle = 1500
        "#
        .parse()
        .unwrap();
        assert_eq!(config.probe.collect_at, "main");
        assert_eq!(config.probe.settle_delay, Duration::from_millis(250));
        assert_eq!(config.probe.finalize_time_unit, TimeUnit::Micros);
        assert_eq!(config.orchestrator.scale_settle, Duration::from_millis(1500));
    }

    #[test]
    fn bucket_without_endpoint_is_rejected() {
        let err = r#"
            [artifacts]
            bucket = "results"
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("s3_endpoint"));
    }

    #[test]
    fn load_falls_back_to_defaults_when_no_candidate_exists() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let loaded = AppConfig::load_with_source(&[missing]).unwrap();
        assert!(loaded.source.is_none());

        let present = dir.path().join("probe.toml");
        fs::write(&present, "[probe]\ncollect_at = \"main\"\n").unwrap();
        let loaded = AppConfig::load_with_source(&[present.clone()]).unwrap();
        assert_eq!(loaded.source.as_deref(), Some(present.as_path()));
        assert_eq!(loaded.config.probe.collect_at, "main");
    }
}
