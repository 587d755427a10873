//! ---
//! probe_section: "06-daemon"
//! probe_subsection: "binary"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Binary entrypoint for the gateway probe daemon."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gwprobe_api::ProbeApiBuilder;
use gwprobe_common::{init_tracing, AppConfig};
use gwprobe_core::{
    new_registry, ArtifactSink, Collaborators, FsArtifactSink, Orchestrator, Probe, ProbeMetrics,
    ProbeSettings, UnconfiguredOrchestrator,
};
use gwprobe_k8s::KubeOrchestrator;
use gwprobe_s3::{Credentials, S3ArtifactSink, S3Client, S3Interposer, SigV4Signer};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Gateway restart probe daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long = "s3gw-endpoint", value_name = "URL", help = "Gateway endpoint receiving kill requests and workload traffic")]
    s3gw_endpoint: Option<String>,

    #[arg(long, value_name = "MS", help = "Settle delay between a sealed restart and the next injection")]
    wbtd: Option<u64>,

    #[arg(long = "collect-at", value_name = "CHECKPOINT", help = "Start checkpoint that seals a measurement")]
    collect_at: Option<String>,

    #[arg(long, value_name = "ADDR", help = "Address the HTTP surface listens on")]
    listen: Option<SocketAddr>,

    #[arg(short = 'v', long = "verbosity", value_name = "LEVEL", help = "Log level: off, trc, dbg, inf, wrn, err or a filter directive")]
    verbosity: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/gwprobe.toml"));
    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    init_tracing("gwprobed", &config.logging, cli.verbosity.as_deref())?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    run_daemon(config).await
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(endpoint) = &cli.s3gw_endpoint {
        config.target.endpoint = endpoint.clone();
    }
    if let Some(ms) = cli.wbtd {
        config.probe.settle_delay = Duration::from_millis(ms);
    }
    if let Some(checkpoint) = &cli.collect_at {
        config.probe.collect_at = checkpoint.clone();
    }
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let registry = new_registry();
    let metrics = ProbeMetrics::new(registry.clone())?;

    let credentials =
        Credentials::from_env().context("gateway credentials are required to sign requests")?;
    let target = Arc::new(S3Client::new(
        &config.target.endpoint,
        SigV4Signer::new(credentials.clone(), config.target.region.clone()),
        config.target.force_path_style,
    )?);
    info!(endpoint = %target.endpoint(), "gateway client ready");

    let orchestrator: Arc<dyn Orchestrator> = if config.orchestrator.enabled {
        let client = KubeOrchestrator::connect(&config.orchestrator)
            .await
            .context("unable to connect to the orchestrator")?;
        info!(
            namespace = %config.orchestrator.namespace,
            deployment = %config.orchestrator.deployment,
            "orchestrator client ready"
        );
        Arc::new(client)
    } else {
        warn!("orchestrator disabled; scale-cycle strategies will fail");
        Arc::new(UnconfiguredOrchestrator)
    };

    let mut sinks: Vec<Arc<dyn ArtifactSink>> =
        vec![Arc::new(FsArtifactSink::new(config.artifacts.directory.clone()))];
    if let (Some(endpoint), Some(bucket)) = (&config.artifacts.s3_endpoint, &config.artifacts.bucket) {
        let client = S3Client::new(
            endpoint,
            SigV4Signer::new(credentials, config.target.region.clone()),
            config.artifacts.force_path_style,
        )?;
        info!(endpoint = %endpoint, bucket = %bucket, "artifact upload enabled");
        sinks.push(Arc::new(S3ArtifactSink::new(Arc::new(client), bucket.clone())));
    }

    let settings = ProbeSettings::from_config(&config.probe, config.orchestrator.scale_settle);
    info!(
        collect_at = %settings.collect_at,
        settle_ms = settings.settle_delay.as_millis() as u64,
        "probe configured"
    );
    let probe = Arc::new(Probe::new(
        settings,
        Collaborators {
            target: target.clone(),
            data_path: target.clone(),
            orchestrator,
            interposer: Arc::new(S3Interposer::new(target)),
            sinks,
        },
        Some(metrics),
    ));

    let server = ProbeApiBuilder::new(config.api.listen, Arc::clone(&probe))
        .with_metrics_registry(registry)
        .spawn()
        .await?;
    info!(address = %server.local_addr(), "probe running; waiting for termination signal");

    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    server.shutdown().await?;
    probe.clear().await;
    Ok(())
}
