//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Per-mark storage for sealed restarts and workload outcomes.
use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::events::{RestartEvent, S3WorkloadEvent};

/// Store shared between the state machine and the workload task.
pub type SharedStore = Arc<Mutex<CollectedData>>;

/// Workload events for one mark, ordered by start timestamp. Equal start
/// timestamps keep insertion order.
#[derive(Debug, Default, Clone)]
pub struct WorkloadSeries {
    events: BTreeMap<(i64, u64), S3WorkloadEvent>,
    inserted: u64,
}

impl WorkloadSeries {
    pub fn push(&mut self, event: S3WorkloadEvent) {
        self.events.insert((event.start_ts, self.inserted), event);
        self.inserted += 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in ascending start-timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = &S3WorkloadEvent> {
        self.events.values()
    }
}

#[derive(Debug, Default, Clone)]
pub struct CollectedData {
    restarts: IndexMap<String, Vec<RestartEvent>>,
    workload: IndexMap<String, WorkloadSeries>,
}

impl CollectedData {
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn record_restart(&mut self, event: RestartEvent) {
        self.restarts
            .entry(event.mark.clone())
            .or_default()
            .push(event);
    }

    pub fn record_workload(&mut self, mark: &str, event: S3WorkloadEvent) {
        self.workload.entry(mark.to_owned()).or_default().push(event);
    }

    pub fn restarts(&self, mark: &str) -> &[RestartEvent] {
        self.restarts.get(mark).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn workload(&self, mark: &str) -> Option<&WorkloadSeries> {
        self.workload.get(mark)
    }

    /// Marks with restart data, in first-seen order.
    pub fn restart_marks(&self) -> impl Iterator<Item = &str> {
        self.restarts.keys().map(String::as_str)
    }

    /// Marks with workload data, in first-seen order.
    pub fn workload_marks(&self) -> impl Iterator<Item = &str> {
        self.workload.keys().map(String::as_str)
    }

    pub fn restart_count(&self) -> usize {
        self.restarts.values().map(Vec::len).sum()
    }

    pub fn workload_count(&self) -> usize {
        self.workload.values().map(WorkloadSeries::len).sum()
    }

    pub fn clear(&mut self) {
        self.restarts.clear();
        self.workload.clear();
    }
}
