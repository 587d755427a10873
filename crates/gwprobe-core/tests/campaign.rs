//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use gwprobe_common::TimeUnit;
use gwprobe_core::{
    ArmRequest, ArtifactSink, Collaborators, DataPath, DeathEvent, Interposer, MarkSelector,
    Orchestrator, PendingAction, Probe, ProbeError, ProbeSettings, RunPhase, StartEvent,
    StartOutcome, TargetControl, WorkloadConfig, WriteOutcome, UNSOLICITED_MARK,
};
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingTarget {
    kills: Mutex<Vec<String>>,
}

#[async_trait]
impl TargetControl for RecordingTarget {
    async fn request_termination(&self, how: &str) -> Result<()> {
        self.kills.lock().push(how.to_owned());
        Ok(())
    }
}

#[derive(Default)]
struct FakeCluster {
    nodes: Vec<String>,
    tainted: Mutex<BTreeSet<String>>,
    replicas: Mutex<Vec<i32>>,
}

#[async_trait]
impl Orchestrator for FakeCluster {
    async fn set_replicas(&self, replicas: i32) -> Result<()> {
        self.replicas.lock().push(replicas);
        Ok(())
    }

    async fn node_names(&self) -> Result<Vec<String>> {
        Ok(self.nodes.clone())
    }

    async fn taint_node(&self, node: &str) -> Result<()> {
        self.tainted.lock().insert(node.to_owned());
        Ok(())
    }

    async fn untaint_node(&self, node: &str) -> Result<()> {
        self.tainted.lock().remove(node);
        Ok(())
    }
}

#[derive(Default)]
struct StampedDataPath {
    writes: Mutex<u64>,
}

#[async_trait]
impl DataPath for StampedDataPath {
    async fn write_object(&self, _bucket: &str, _key: &str, _payload: &str) -> WriteOutcome {
        let mut writes = self.writes.lock();
        *writes += 1;
        let start_ts = *writes as i64 * 1_000_000;
        WriteOutcome {
            start_ts,
            end_ts: start_ts + 2_000_000,
            error: None,
        }
    }
}

#[derive(Default)]
struct RecordingInterposer {
    actions: Mutex<Vec<PendingAction>>,
}

#[async_trait]
impl Interposer for RecordingInterposer {
    async fn interpose(&self, action: &PendingAction) -> Result<()> {
        self.actions.lock().push(action.clone());
        Ok(())
    }
}

#[derive(Default)]
struct MemorySink {
    artifacts: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl ArtifactSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn persist(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.artifacts.lock().push((name.to_owned(), bytes.to_vec()));
        Ok(())
    }
}

struct Harness {
    probe: Probe,
    target: Arc<RecordingTarget>,
    cluster: Arc<FakeCluster>,
    data_path: Arc<StampedDataPath>,
    interposer: Arc<RecordingInterposer>,
    sink: Arc<MemorySink>,
}

impl Harness {
    fn new() -> Self {
        Self::with_nodes(&[])
    }

    fn with_nodes(nodes: &[&str]) -> Self {
        let target = Arc::new(RecordingTarget::default());
        let cluster = Arc::new(FakeCluster {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            ..FakeCluster::default()
        });
        let data_path = Arc::new(StampedDataPath::default());
        let interposer = Arc::new(RecordingInterposer::default());
        let sink = Arc::new(MemorySink::default());
        let settings = ProbeSettings {
            settle_delay: Duration::ZERO,
            scale_settle: Duration::ZERO,
            ..ProbeSettings::default()
        };
        let probe = Probe::new(
            settings,
            Collaborators {
                target: target.clone(),
                data_path: data_path.clone(),
                orchestrator: cluster.clone(),
                interposer: interposer.clone(),
                sinks: vec![sink.clone() as Arc<dyn ArtifactSink>],
            },
            None,
        );
        Self {
            probe,
            target,
            cluster,
            data_path,
            interposer,
            sink,
        }
    }

    async fn kills_reach(&self, expected: usize) {
        for _ in 0..200 {
            if self.target.kills.lock().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!(
            "expected {expected} kill requests, saw {}",
            self.target.kills.lock().len()
        );
    }

    async fn restart(&self, death_ts: i64, main_ts: i64, frontend_ts: i64) -> StartOutcome {
        self.probe
            .submit_death(death("sigterm", death_ts))
            .await
            .unwrap();
        let outcome = self
            .probe
            .submit_start(StartEvent::new(main_ts, "main"))
            .await
            .unwrap();
        assert_eq!(outcome, StartOutcome::Recorded);
        self.probe
            .submit_start(StartEvent::new(frontend_ts, "frontend-up"))
            .await
            .unwrap()
    }
}

fn death(kind: &str, ts: i64) -> DeathEvent {
    DeathEvent {
        ts,
        kind: kind.to_owned(),
    }
}

fn arm(restarts: u32, how: &str, mark: &str) -> ArmRequest {
    ArmRequest {
        restarts,
        how: how.to_owned(),
        mark: mark.to_owned(),
        ..ArmRequest::default()
    }
}

fn sealed(outcome: StartOutcome) -> gwprobe_core::RestartEvent {
    match outcome {
        StartOutcome::Sealed(restart) => restart,
        StartOutcome::Recorded => panic!("expected a sealed restart"),
    }
}

#[tokio::test]
async fn single_restart_campaign_finalizes_without_another_kill() {
    let h = Harness::new();
    h.probe.arm(arm(1, "kill", "scenario")).await.unwrap();
    h.kills_reach(1).await;

    let restart = sealed(h.restart(1000, 1050, 1080).await);
    assert_eq!(restart.id, 1);
    assert_eq!(restart.mark, "scenario");
    assert_eq!(restart.to_main_nanos(), 50);
    assert_eq!(restart.to_frontend_up_nanos(), 80);
    assert_eq!(restart.main_to_frontend_up_nanos(), 30);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*h.target.kills.lock(), vec!["kill".to_owned()]);

    let names: Vec<String> = h.sink.artifacts.lock().iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(names.len(), 3);
    assert!(names[0].starts_with("scenario_stats_") && names[0].ends_with(".json"));
    assert!(names[1].starts_with("scenario_restarts_"));
    assert!(names[2].starts_with("scenario_s3wl_"));

    let status = h.probe.status().await;
    assert_eq!(status.phase, RunPhase::Idle);
    assert_eq!(status.pending_restarts, 0);
    assert_eq!(status.mark, "");

    let doc = h
        .probe
        .stats(&MarkSelector::Mark("scenario".into()), TimeUnit::Nanos, true);
    let entry = &doc.restart_series[0].data.as_ref().unwrap()[0];
    assert_eq!(entry.duration_to_main, 50);
    assert_eq!(entry.duration_to_frontend_up, 80);
    assert_eq!(entry.frontend_up_main_delta, 30);
}

#[tokio::test]
async fn ids_increase_from_one_and_each_cycle_reinjects() {
    let h = Harness::new();
    h.probe.arm(arm(3, "segfault", "ids")).await.unwrap();

    let mut ids = Vec::new();
    for cycle in 0..3i64 {
        h.kills_reach(cycle as usize + 1).await;
        let base = 10_000 * (cycle + 1);
        ids.push(sealed(h.restart(base, base + 10, base + 20).await).id);
    }
    assert_eq!(ids, vec![1, 2, 3]);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.target.kills.lock().len(), 3);
    assert!(h.target.kills.lock().iter().all(|how| how == "segfault"));
    assert_eq!(h.probe.status().await.restart_id, 0);
    assert_eq!(h.probe.store().lock().restarts("ids").len(), 3);
}

#[tokio::test]
async fn non_collect_at_checkpoint_neither_seals_nor_decrements() {
    let h = Harness::new();
    h.probe.arm(arm(2, "kill", "partial")).await.unwrap();
    h.probe.submit_death(death("sigterm", 100)).await.unwrap();
    let outcome = h
        .probe
        .submit_start(StartEvent::new(150, "main"))
        .await
        .unwrap();
    assert_eq!(outcome, StartOutcome::Recorded);

    let status = h.probe.status().await;
    assert_eq!(status.phase, RunPhase::Correlating);
    assert_eq!(status.pending_restarts, 2);
    assert_eq!(status.pending_starts, 1);
    assert_eq!(h.probe.store().lock().restart_count(), 0);
}

#[tokio::test]
async fn missing_checkpoint_is_backfilled_with_death_timestamp() {
    let h = Harness::new();
    h.probe.arm(arm(1, "kill", "backfill")).await.unwrap();
    h.probe.submit_death(death("sigterm", 1000)).await.unwrap();
    let restart = sealed(
        h.probe
            .submit_start(StartEvent::new(1080, "frontend-up"))
            .await
            .unwrap(),
    );
    assert_eq!(restart.main.ts, 1000);
    assert_eq!(restart.main.checkpoint, "main");
    assert_eq!(restart.to_main_nanos(), 0);
    assert_eq!(restart.to_frontend_up_nanos(), 80);
}

#[tokio::test]
async fn out_of_order_notifications_are_rejected_without_mutation() {
    let h = Harness::new();
    let err = h
        .probe
        .submit_start(StartEvent::new(10, "main"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::NoPendingDeath { .. }));
    assert!(err.is_protocol_violation());
    assert_eq!(h.probe.status().await.phase, RunPhase::Idle);

    h.probe.submit_death(death("sigterm", 20)).await.unwrap();
    let err = h
        .probe
        .submit_death(death("sigkill", 30))
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::DeathAlreadyPending { pending_ts: 20 }));

    let restart = sealed(
        h.probe
            .submit_start(StartEvent::new(90, "frontend-up"))
            .await
            .unwrap(),
    );
    assert_eq!(restart.death.ts, 20);
    assert_eq!(restart.death.kind, "sigterm");
}

#[tokio::test]
async fn arming_is_validated() {
    let h = Harness::new();
    assert!(matches!(
        h.probe.arm(arm(0, "kill", "m")).await,
        Err(ProbeError::InvalidArm(_))
    ));

    let mut request = arm(1, "kill", "m");
    request.workload = Some(WorkloadConfig::from_wire("SendObject", "bn=b,on=o", 0));
    assert!(matches!(
        h.probe.arm(request).await,
        Err(ProbeError::InvalidArm(_))
    ));

    h.probe.arm(arm(2, "kill", "m")).await.unwrap();
    let err = h.probe.arm(arm(1, "kill", "other")).await.unwrap_err();
    assert!(matches!(
        err,
        ProbeError::CampaignInFlight {
            pending_restarts: 2
        }
    ));
    assert_eq!(h.probe.status().await.mark, "m");
}

#[tokio::test]
async fn unsolicited_restarts_are_kept_but_never_finalized() {
    let h = Harness::new();
    let restart = sealed(h.restart(0, 5, 9).await);
    assert_eq!(restart.mark, UNSOLICITED_MARK);
    assert_eq!(restart.id, 1);
    assert!(h.sink.artifacts.lock().is_empty());

    let doc = h.probe.stats(&MarkSelector::All, TimeUnit::Nanos, false);
    assert_eq!(doc.restart_series_count, 1);
    assert_eq!(doc.restart_series[0].mark, UNSOLICITED_MARK);

    h.probe.arm(arm(1, "kill", "fresh")).await.unwrap();
    let restart = sealed(h.restart(100, 110, 120).await);
    assert_eq!(restart.id, 1);
    assert_eq!(restart.mark, "fresh");
}

#[tokio::test]
async fn extreme_timestamps_seal_and_finalize() {
    let h = Harness::new();
    h.probe.arm(arm(1, "kill", "edge")).await.unwrap();
    h.probe.submit_death(death("kill", i64::MIN)).await.unwrap();
    let restart = sealed(
        h.probe
            .submit_start(StartEvent::new(i64::MAX, "frontend-up"))
            .await
            .unwrap(),
    );
    assert_eq!(restart.to_main_nanos(), 0);
    assert_eq!(restart.to_frontend_up_nanos(), i64::MAX);
    assert_eq!(h.sink.artifacts.lock().len(), 3);
    assert_eq!(h.probe.status().await.phase, RunPhase::Idle);

    let doc = h
        .probe
        .stats(&MarkSelector::Mark("edge".into()), TimeUnit::Seconds, true);
    let entry = &doc.restart_series[0].data.as_ref().unwrap()[0];
    assert_eq!(entry.duration_to_frontend_up, i64::MAX / 1_000_000_000);
}

#[tokio::test]
async fn unmarked_campaign_keeps_workload_with_its_restarts() {
    let h = Harness::new();
    let mut request = arm(2, "kill", "");
    request.workload = Some(WorkloadConfig::from_wire("SendObject", "bn=b,on=o", 2));
    h.probe.arm(request).await.unwrap();
    assert_eq!(h.probe.status().await.mark, UNSOLICITED_MARK);

    tokio::time::sleep(Duration::from_millis(20)).await;
    h.restart(10, 20, 30).await;
    h.restart(40, 50, 60).await;

    let store = h.probe.store();
    let data = store.lock();
    assert_eq!(data.restart_marks().collect::<Vec<_>>(), vec![UNSOLICITED_MARK]);
    assert_eq!(data.workload_marks().collect::<Vec<_>>(), vec![UNSOLICITED_MARK]);
    assert!(h.sink.artifacts.lock().is_empty());
}

#[tokio::test]
async fn workload_runs_for_the_campaign_and_stops_at_quota_zero() {
    let h = Harness::new();
    let mut request = arm(1, "kill", "wl");
    request.workload = Some(WorkloadConfig::from_wire(
        "SendObject",
        "bn=probe,on=obj,pl=x",
        2,
    ));
    h.probe.arm(request).await.unwrap();
    assert!(h.probe.status().await.workload_running);

    tokio::time::sleep(Duration::from_millis(30)).await;
    h.restart(1, 2, 3).await;
    assert!(!h.probe.status().await.workload_running);

    let recorded = h.probe.store().lock().workload_count();
    assert!(recorded > 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.probe.store().lock().workload_count(), recorded);
    assert_eq!(*h.data_path.writes.lock() as usize, recorded);

    let artifacts = h.sink.artifacts.lock();
    let (_, csv) = artifacts
        .iter()
        .find(|(name, _)| name.starts_with("wl_s3wl_"))
        .unwrap();
    let rows = String::from_utf8(csv.clone()).unwrap().lines().count();
    assert_eq!(rows, recorded + 1);
}

#[tokio::test]
async fn unknown_workload_function_does_not_block_the_campaign() {
    let h = Harness::new();
    let mut request = arm(1, "kill", "nowl");
    request.workload = Some(WorkloadConfig::from_wire("ListBuckets", "", 5));
    h.probe.arm(request).await.unwrap();
    assert!(!h.probe.status().await.workload_running);
    h.kills_reach(1).await;
    sealed(h.restart(1, 2, 3).await);
    assert_eq!(h.probe.store().lock().workload_count(), 0);
}

#[tokio::test]
async fn node_rotation_visits_nodes_and_reset_clears_taints() {
    let h = Harness::with_nodes(&["n0", "n1", "n2"]);
    h.probe
        .arm(arm(3, "k8s_scale_deployment_0_1_node_rr", "rr"))
        .await
        .unwrap();

    let mut selected = Vec::new();
    for cycle in 0..3i64 {
        let status = h.probe.status().await;
        selected.push(status.selected_node.unwrap());
        assert_eq!(h.cluster.tainted.lock().len(), 2);
        h.restart(cycle * 100, cycle * 100 + 1, cycle * 100 + 2).await;
    }
    assert_eq!(selected, vec!["n0", "n1", "n2"]);
    assert!(h.cluster.tainted.lock().is_empty());
    assert_eq!(*h.cluster.replicas.lock(), vec![0, 1, 0, 1, 0, 1]);
    assert!(h.target.kills.lock().is_empty());
}

#[tokio::test]
async fn pinned_node_is_applied_once_and_released() {
    let h = Harness::with_nodes(&["a", "b"]);
    let mut request = arm(2, "k8s_scale_deployment_0_1", "pin");
    request.pin_node = Some("b".into());
    h.probe.arm(request).await.unwrap();
    assert_eq!(
        h.cluster.tainted.lock().iter().cloned().collect::<Vec<_>>(),
        vec!["a".to_owned()]
    );
    assert_eq!(h.probe.status().await.selected_node.as_deref(), Some("b"));

    h.restart(0, 1, 2).await;
    h.restart(10, 11, 12).await;
    assert!(h.cluster.tainted.lock().is_empty());
    assert_eq!(h.cluster.replicas.lock().len(), 4);
}

#[tokio::test]
async fn interposition_runs_before_each_reinjection() {
    let h = Harness::new();
    let action = PendingAction::FillBucket {
        bucket: "fill".into(),
        prefix: "obj".into(),
        payload: "p".into(),
        count: 4,
        timestamped: false,
    };
    let mut request = arm(3, "kill", "interpose");
    request.interpose = Some(action.clone());
    h.probe.arm(request).await.unwrap();
    assert!(h.interposer.actions.lock().is_empty());

    h.restart(0, 1, 2).await;
    h.restart(10, 11, 12).await;
    h.restart(20, 21, 22).await;
    assert_eq!(*h.interposer.actions.lock(), vec![action.clone(), action]);
}

#[tokio::test]
async fn clear_drops_collected_and_in_flight_state() {
    let h = Harness::new();
    h.probe.arm(arm(2, "kill", "c")).await.unwrap();
    h.restart(0, 1, 2).await;
    h.probe.submit_death(death("sigterm", 50)).await.unwrap();

    h.probe.clear().await;
    let status = h.probe.status().await;
    assert_eq!(status.phase, RunPhase::Idle);
    assert_eq!(status.pending_restarts, 0);
    let doc = h.probe.stats(&MarkSelector::All, TimeUnit::Millis, false);
    assert_eq!(doc.restart_series_count, 0);
    assert_eq!(doc.workload_series_count, 0);
}
