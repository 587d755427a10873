//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Background workload exercising the gateway data path during a campaign.
use std::sync::Arc;
use std::time::Duration;

use gwprobe_common::parse_kv_args;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::collaborators::DataPath;
use crate::error::ProbeError;
use crate::events::S3WorkloadEvent;
use crate::metrics::{nanos_to_duration, ProbeMetrics};
use crate::store::SharedStore;

const HEARTBEAT_EVERY: u64 = 100;

/// Operator-supplied workload description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub function: String,
    #[serde(default)]
    pub args: IndexMap<String, String>,
    pub frequency_ms: u64,
}

impl WorkloadConfig {
    /// Build from the wire form, where args travel as `k=v,k=v`.
    pub fn from_wire(function: &str, args: &str, frequency_ms: u64) -> Self {
        Self {
            function: function.to_owned(),
            args: parse_kv_args(args),
            frequency_ms,
        }
    }

    pub fn frequency(&self) -> Duration {
        Duration::from_millis(self.frequency_ms)
    }
}

/// A workload function resolved from its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadKind {
    /// Repeatedly PUT `payload` to `bucket/object`.
    SendObject {
        bucket: String,
        object: String,
        payload: String,
    },
}

impl WorkloadKind {
    pub fn resolve(config: &WorkloadConfig) -> Result<Self, ProbeError> {
        match config.function.as_str() {
            "SendObject" => {
                let arg = |key: &'static str| {
                    config
                        .args
                        .get(key)
                        .cloned()
                        .ok_or(ProbeError::MissingWorkloadArg(key))
                };
                Ok(WorkloadKind::SendObject {
                    bucket: arg("bn")?,
                    object: arg("on")?,
                    payload: config.args.get("pl").cloned().unwrap_or_default(),
                })
            }
            other => Err(ProbeError::UnavailableWorkload(other.to_owned())),
        }
    }

    async fn run_once(&self, data_path: &dyn DataPath) -> crate::collaborators::WriteOutcome {
        match self {
            WorkloadKind::SendObject {
                bucket,
                object,
                payload,
            } => data_path.write_object(bucket, object, payload).await,
        }
    }
}

/// Handle to a running workload task.
#[derive(Debug)]
pub struct WorkloadHandle {
    stop: mpsc::Sender<()>,
    task: JoinHandle<u64>,
}

impl WorkloadHandle {
    /// Start ticking every `frequency`; the first operation runs one period after spawn.
    /// Outcomes are recorded under `mark`.
    pub fn spawn(
        kind: WorkloadKind,
        frequency: Duration,
        mark: String,
        store: SharedStore,
        data_path: Arc<dyn DataPath>,
        metrics: Option<ProbeMetrics>,
    ) -> Self {
        let (stop, mut stop_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + frequency, frequency);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ops: u64 = 0;
            info!(mark = %mark, frequency_ms = frequency.as_millis() as u64, "workload started");
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.recv() => {
                        debug!(mark = %mark, "workload stop received");
                        break;
                    }
                    _ = ticker.tick() => {
                        ops += 1;
                        let outcome = kind.run_once(data_path.as_ref()).await;
                        let event = S3WorkloadEvent {
                            id: ops,
                            start_ts: outcome.start_ts,
                            end_ts: outcome.end_ts,
                            error: outcome.error.unwrap_or_default(),
                        };
                        if let Some(metrics) = &metrics {
                            metrics.record_workload_op(nanos_to_duration(event.rtt_nanos()), event.failed());
                        }
                        if event.failed() {
                            debug!(mark = %mark, id = ops, error = %event.error, "workload operation failed");
                        }
                        store.lock().record_workload(&mark, event);
                        if ops % HEARTBEAT_EVERY == 0 {
                            info!(mark = %mark, ops, "workload heartbeat");
                        }
                    }
                }
            }
            info!(mark = %mark, ops, "workload stopped");
            ops
        });
        Self { stop, task }
    }

    /// Signal the task to stop and wait for it. Returns the number of operations issued.
    pub async fn stop(self) -> u64 {
        let _ = self.stop.send(()).await;
        match self.task.await {
            Ok(ops) => ops,
            Err(err) => {
                warn!(error = %err, "workload task ended abnormally");
                0
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
