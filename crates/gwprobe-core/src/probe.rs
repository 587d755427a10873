//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! The correlation state machine.
//!
//! A single [`Probe`] owns the run state of the process. Death and start
//! notifications are paired into [`RestartEvent`]s under the current mark; the
//! arrival of the `collect_at` checkpoint seals a measurement, decrements the
//! pending-restart quota and either injects the next failure or finalizes the
//! campaign. Every mutating operation holds the run-state lock for its whole
//! duration, including the settle and grace sleeps.
use std::sync::Arc;
use std::time::Duration;

use gwprobe_common::{unix_seconds, ProbeConfig, TimeUnit};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::artifacts::render_artifacts;
use crate::collaborators::{ArtifactSink, DataPath, Interposer, Orchestrator, TargetControl};
use crate::error::ProbeError;
use crate::events::{
    DeathEvent, RestartEvent, StartEvent, CHECKPOINT_FRONTEND_UP, CHECKPOINT_MAIN,
    UNSOLICITED_MARK,
};
use crate::injection::{InjectionMode, NodePlacement, StrategySet};
use crate::interpose::PendingAction;
use crate::metrics::{nanos_to_duration, ProbeMetrics};
use crate::stats::{MarkSelector, StatsDocument};
use crate::store::{CollectedData, SharedStore};
use crate::workload::{WorkloadConfig, WorkloadHandle, WorkloadKind};

/// Timing and sealing parameters.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub collect_at: String,
    pub settle_delay: Duration,
    pub scale_settle: Duration,
    pub finalize_time_unit: TimeUnit,
}

impl ProbeSettings {
    pub fn from_config(probe: &ProbeConfig, scale_settle: Duration) -> Self {
        Self {
            collect_at: probe.collect_at.clone(),
            settle_delay: probe.settle_delay,
            scale_settle,
            finalize_time_unit: probe.finalize_time_unit,
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            collect_at: CHECKPOINT_FRONTEND_UP.to_owned(),
            settle_delay: Duration::from_millis(100),
            scale_settle: Duration::from_millis(1000),
            finalize_time_unit: TimeUnit::Millis,
        }
    }
}

/// External systems the probe drives.
pub struct Collaborators {
    pub target: Arc<dyn TargetControl>,
    pub data_path: Arc<dyn DataPath>,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub interposer: Arc<dyn Interposer>,
    pub sinks: Vec<Arc<dyn ArtifactSink>>,
}

/// Parameters of a campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmRequest {
    pub restarts: u32,
    /// Death-type tag selecting the failure strategy.
    #[serde(default)]
    pub how: String,
    #[serde(default)]
    pub mark: String,
    #[serde(default)]
    pub grace_period_ms: u64,
    #[serde(default)]
    pub pin_node: Option<String>,
    #[serde(default)]
    pub interpose: Option<PendingAction>,
    #[serde(default)]
    pub workload: Option<WorkloadConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunPhase {
    Idle,
    AwaitingStart,
    Correlating,
}

/// Point-in-time view of the run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub phase: RunPhase,
    pub mark: String,
    pub pending_restarts: u32,
    pub death_type: String,
    pub restart_id: u64,
    pub pending_starts: usize,
    pub workload_running: bool,
    pub selected_node: Option<String>,
}

/// Result of a start notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Checkpoint recorded; the measurement is still open.
    Recorded,
    Sealed(RestartEvent),
}

#[derive(Debug, Default)]
struct RunState {
    pending_death: Option<DeathEvent>,
    pending_starts: Vec<StartEvent>,
    pending_restarts: u32,
    grace_period: Duration,
    death_type: String,
    mark: String,
    restart_id: u64,
    interpose: Option<PendingAction>,
    placement: NodePlacement,
    workload_config: Option<WorkloadConfig>,
    workload: Option<WorkloadHandle>,
    workload_started: bool,
}

impl RunState {
    fn phase(&self) -> RunPhase {
        match (&self.pending_death, self.pending_starts.is_empty()) {
            (None, _) => RunPhase::Idle,
            (Some(_), true) => RunPhase::AwaitingStart,
            (Some(_), false) => RunPhase::Correlating,
        }
    }

    fn start_named(&self, checkpoint: &str) -> Option<&StartEvent> {
        self.pending_starts
            .iter()
            .find(|start| start.checkpoint == checkpoint)
    }
}

pub struct Probe {
    settings: ProbeSettings,
    state: Mutex<RunState>,
    store: SharedStore,
    strategies: StrategySet,
    data_path: Arc<dyn DataPath>,
    interposer: Arc<dyn Interposer>,
    sinks: Vec<Arc<dyn ArtifactSink>>,
    metrics: Option<ProbeMetrics>,
}

impl Probe {
    pub fn new(
        settings: ProbeSettings,
        collaborators: Collaborators,
        metrics: Option<ProbeMetrics>,
    ) -> Self {
        let strategies = StrategySet::new(
            collaborators.target,
            collaborators.orchestrator,
            settings.scale_settle,
            metrics.clone(),
        );
        Self {
            settings,
            state: Mutex::new(RunState::default()),
            store: CollectedData::shared(),
            strategies,
            data_path: collaborators.data_path,
            interposer: collaborators.interposer,
            sinks: collaborators.sinks,
            metrics,
        }
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Record a death. At most one death may be pending.
    pub async fn submit_death(&self, death: DeathEvent) -> Result<(), ProbeError> {
        let mut state = self.state.lock().await;
        if let Some(pending) = &state.pending_death {
            let err = ProbeError::DeathAlreadyPending {
                pending_ts: pending.ts,
            };
            return Err(self.violation(err));
        }
        info!(ts = death.ts, kind = %death.kind, mark = %state.mark, "death received");
        state.pending_death = Some(death);
        Ok(())
    }

    /// Record a start checkpoint; the `collect_at` checkpoint seals the measurement.
    pub async fn submit_start(&self, start: StartEvent) -> Result<StartOutcome, ProbeError> {
        let mut state = self.state.lock().await;
        if state.pending_death.is_none() {
            let err = ProbeError::NoPendingDeath {
                checkpoint: start.checkpoint,
            };
            return Err(self.violation(err));
        }
        debug!(ts = start.ts, checkpoint = %start.checkpoint, "start received");
        let seals = start.checkpoint == self.settings.collect_at;
        state.pending_starts.push(start);
        if !seals {
            return Ok(StartOutcome::Recorded);
        }

        let Some(restart) = self.seal(&mut state) else {
            return Ok(StartOutcome::Recorded);
        };
        if state.pending_restarts > 0 {
            self.rearm(&mut state).await;
        } else {
            self.complete(&mut state).await;
        }
        Ok(StartOutcome::Sealed(restart))
    }

    /// Store the campaign parameters and inject the first failure.
    pub async fn arm(&self, request: ArmRequest) -> Result<(), ProbeError> {
        if request.restarts == 0 {
            return Err(ProbeError::InvalidArm("restarts must be positive".into()));
        }
        if let Some(workload) = &request.workload {
            if workload.frequency_ms == 0 {
                return Err(ProbeError::InvalidArm(
                    "workload frequency must be positive".into(),
                ));
            }
        }

        let mut state = self.state.lock().await;
        if state.pending_restarts > 0 || state.pending_death.is_some() {
            let err = ProbeError::CampaignInFlight {
                pending_restarts: state.pending_restarts,
            };
            return Err(self.violation(err));
        }

        // Leftovers of an unsolicited campaign are not carried into this one.
        self.reset(&mut state).await;
        state.pending_restarts = request.restarts;
        state.death_type = request.how;
        // Unmarked campaigns record restarts and workload data under one mark.
        state.mark = if request.mark.is_empty() {
            UNSOLICITED_MARK.to_owned()
        } else {
            request.mark
        };
        state.grace_period = Duration::from_millis(request.grace_period_ms);
        state.interpose = request.interpose;
        state.workload_config = request.workload;
        if let Some(node) = request.pin_node {
            state.placement.pin(node);
        }
        info!(
            restarts = state.pending_restarts,
            how = %state.death_type,
            mark = %state.mark,
            "campaign armed"
        );
        self.trigger(&mut state).await;
        Ok(())
    }

    /// Drop all collected data and in-flight state.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        if let Some(workload) = state.workload.take() {
            workload.stop().await;
        }
        self.reset(&mut state).await;
        self.store.lock().clear();
        info!("probe cleared");
    }

    pub fn stats(&self, selector: &MarkSelector, unit: TimeUnit, full_series: bool) -> StatsDocument {
        StatsDocument::compute(&self.store.lock(), selector, unit, full_series)
    }

    pub async fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().await;
        StatusSnapshot {
            phase: state.phase(),
            mark: state.mark.clone(),
            pending_restarts: state.pending_restarts,
            death_type: state.death_type.clone(),
            restart_id: state.restart_id,
            pending_starts: state.pending_starts.len(),
            workload_running: state
                .workload
                .as_ref()
                .is_some_and(|handle| !handle.is_finished()),
            selected_node: state.placement.selected().map(str::to_owned),
        }
    }

    fn seal(&self, state: &mut RunState) -> Option<RestartEvent> {
        let death = state.pending_death.take()?;
        if state.mark.is_empty() {
            state.mark = UNSOLICITED_MARK.to_owned();
        }
        state.restart_id += 1;

        let backfill = |checkpoint: &str| {
            state
                .start_named(checkpoint)
                .cloned()
                .unwrap_or_else(|| StartEvent::new(death.ts, checkpoint))
        };
        let restart = RestartEvent {
            id: state.restart_id,
            mark: state.mark.clone(),
            main: backfill(CHECKPOINT_MAIN),
            frontend_up: backfill(CHECKPOINT_FRONTEND_UP),
            death,
        };
        state.pending_starts.clear();
        state.pending_restarts = state.pending_restarts.saturating_sub(1);

        self.store.lock().record_restart(restart.clone());
        if let Some(metrics) = &self.metrics {
            metrics.record_sealed(
                &restart.mark,
                nanos_to_duration(restart.to_main_nanos()),
                nanos_to_duration(restart.to_frontend_up_nanos()),
            );
        }
        info!(
            mark = %restart.mark,
            restart_id = restart.id,
            to_main_ns = restart.to_main_nanos(),
            to_frontend_up_ns = restart.to_frontend_up_nanos(),
            pending = state.pending_restarts,
            "restart sealed"
        );
        Some(restart)
    }

    async fn rearm(&self, state: &mut RunState) {
        sleep(self.settings.settle_delay).await;
        if !state.grace_period.is_zero() {
            info!(grace_ms = state.grace_period.as_millis() as u64, "waiting grace period");
            sleep(state.grace_period).await;
        }
        if let Some(action) = &state.interpose {
            if let Err(err) = self.interposer.interpose(action).await {
                warn!(action = action.label(), error = %err, "interposition failed");
                self.control_failure("interpose");
            }
        }
        self.trigger(state).await;
    }

    async fn trigger(&self, state: &mut RunState) {
        if !state.workload_started {
            if let Some(config) = state.workload_config.clone() {
                self.start_workload(config, state);
            }
        }
        self.strategies.apply_pin(&mut state.placement).await;

        let mode = InjectionMode::from_tag(&state.death_type);
        let strategy = self.strategies.select(mode);
        info!(strategy = mode.label(), how = %state.death_type, mark = %state.mark, "injecting failure");
        strategy.inject(&state.death_type, &mut state.placement).await;
        if let Some(metrics) = &self.metrics {
            metrics.inc_injection(mode.label());
        }
    }

    fn start_workload(&self, config: WorkloadConfig, state: &mut RunState) {
        // Set before resolving so a bad config is reported once per campaign.
        state.workload_started = true;
        match WorkloadKind::resolve(&config) {
            Ok(kind) => {
                state.workload = Some(WorkloadHandle::spawn(
                    kind,
                    config.frequency(),
                    state.mark.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.data_path),
                    self.metrics.clone(),
                ));
            }
            Err(err) => error!(function = %config.function, error = %err, "workload not started"),
        }
    }

    async fn complete(&self, state: &mut RunState) {
        if let Some(workload) = state.workload.take() {
            let ops = workload.stop().await;
            debug!(ops, "workload drained");
        }
        if state.mark == UNSOLICITED_MARK {
            info!("unsolicited restart recorded; campaign not finalized");
            return;
        }

        let document = StatsDocument::compute(
            &self.store.lock(),
            &MarkSelector::Mark(state.mark.clone()),
            self.settings.finalize_time_unit,
            true,
        );
        match render_artifacts(&state.mark, unix_seconds(), &document) {
            Ok(artifacts) => {
                for artifact in &artifacts {
                    for sink in &self.sinks {
                        if let Err(err) = sink.persist(&artifact.name, &artifact.bytes).await {
                            warn!(sink = sink.name(), artifact = %artifact.name, error = %err, "persisting artifact failed");
                            self.control_failure("persist");
                        }
                    }
                }
            }
            Err(err) => error!(mark = %state.mark, error = %err, "rendering artifacts failed"),
        }
        info!(mark = %state.mark, restarts = document.restart_series.first().map_or(0, |s| s.samples), "campaign complete");
        self.reset(state).await;
    }

    async fn reset(&self, state: &mut RunState) {
        self.strategies.release_placement(&state.placement).await;
        *state = RunState::default();
    }

    fn violation(&self, err: ProbeError) -> ProbeError {
        warn!(error = %err, "protocol violation");
        if let Some(metrics) = &self.metrics {
            metrics.inc_protocol_violation(err.kind());
        }
        err
    }

    fn control_failure(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_control_failure(operation);
        }
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
