//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{self, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

/// Registry shared by every component that publishes probe metrics.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Metrics published by the correlation core and the workload generator.
#[derive(Clone)]
pub struct ProbeMetrics {
    restarts_sealed_total: IntCounterVec,
    restart_duration_seconds: HistogramVec,
    injections_total: IntCounterVec,
    control_failures_total: IntCounterVec,
    protocol_violations_total: IntCounterVec,
    workload_ops_total: IntCounterVec,
    workload_rtt_seconds: Histogram,
}

impl ProbeMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let restarts_sealed_total = IntCounterVec::new(
            Opts::new(
                "gwprobe_restarts_sealed_total",
                "Restart measurements sealed by the correlation state machine",
            ),
            &["mark"],
        )?;
        registry.register(Box::new(restarts_sealed_total.clone()))?;

        let restart_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gwprobe_restart_duration_seconds",
                "Time from gateway death to each startup checkpoint",
            )
            .buckets(prometheus::exponential_buckets(0.01, 2.0, 14)?),
            &["checkpoint"],
        )?;
        registry.register(Box::new(restart_duration_seconds.clone()))?;

        let injections_total = IntCounterVec::new(
            Opts::new(
                "gwprobe_injections_total",
                "Failure injections dispatched, by strategy",
            ),
            &["strategy"],
        )?;
        registry.register(Box::new(injections_total.clone()))?;

        let control_failures_total = IntCounterVec::new(
            Opts::new(
                "gwprobe_control_failures_total",
                "Control calls against the gateway or orchestrator that failed",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(control_failures_total.clone()))?;

        let protocol_violations_total = IntCounterVec::new(
            Opts::new(
                "gwprobe_protocol_violations_total",
                "Notifications rejected because they arrived out of order",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(protocol_violations_total.clone()))?;

        let workload_ops_total = IntCounterVec::new(
            Opts::new(
                "gwprobe_workload_ops_total",
                "Workload writes issued against the data path",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(workload_ops_total.clone()))?;

        let workload_rtt_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "gwprobe_workload_rtt_seconds",
                "Round-trip time of workload writes",
            )
            .buckets(prometheus::exponential_buckets(0.0005, 2.0, 16)?),
        )?;
        registry.register(Box::new(workload_rtt_seconds.clone()))?;

        Ok(Self {
            restarts_sealed_total,
            restart_duration_seconds,
            injections_total,
            control_failures_total,
            protocol_violations_total,
            workload_ops_total,
            workload_rtt_seconds,
        })
    }

    pub fn record_sealed(&self, mark: &str, to_main: Duration, to_frontend_up: Duration) {
        self.restarts_sealed_total.with_label_values(&[mark]).inc();
        self.restart_duration_seconds
            .with_label_values(&["main"])
            .observe(to_main.as_secs_f64());
        self.restart_duration_seconds
            .with_label_values(&["frontend-up"])
            .observe(to_frontend_up.as_secs_f64());
    }

    pub fn inc_injection(&self, strategy: &str) {
        self.injections_total.with_label_values(&[strategy]).inc();
    }

    pub fn inc_control_failure(&self, operation: &str) {
        self.control_failures_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn inc_protocol_violation(&self, kind: &str) {
        self.protocol_violations_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn record_workload_op(&self, rtt: Duration, failed: bool) {
        let outcome = if failed { "error" } else { "ok" };
        self.workload_ops_total.with_label_values(&[outcome]).inc();
        self.workload_rtt_seconds.observe(rtt.as_secs_f64());
    }
}

impl std::fmt::Debug for ProbeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeMetrics").finish_non_exhaustive()
    }
}

/// Convert a signed nanosecond span into a `Duration`, clamping negatives to zero.
pub(crate) fn nanos_to_duration(nanos: i64) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
}
