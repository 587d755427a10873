//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Reduction of collected series into summary distributions.
//!
//! Per-event durations are integer nanosecond differences divided by the
//! display unit's scale (truncating toward zero). The reductions over a
//! series are reported as floating point values and are `None` when the
//! series is empty.
use gwprobe_common::TimeUnit;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::events::{RestartEvent, S3WorkloadEvent};
use crate::store::CollectedData;

/// Which marks a statistics request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkSelector {
    All,
    Mark(String),
}

impl MarkSelector {
    /// `"all"` and the empty string select every mark.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" | "all" => MarkSelector::All,
            mark => MarkSelector::Mark(mark.to_owned()),
        }
    }
}

/// Summary of one derived series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reductions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub p95_nearest_rank: Option<f64>,
    pub p99_nearest_rank: Option<f64>,
}

impl Reductions {
    pub fn from_series(series: &[i64]) -> Self {
        if series.is_empty() {
            return Self::default();
        }
        let mut sorted: Vec<f64> = series.iter().map(|value| *value as f64).collect();
        sorted.sort_by(f64::total_cmp);
        Self {
            min: Some(Statistics::min(sorted.iter())),
            max: Some(Statistics::max(sorted.iter())),
            mean: Some(Statistics::mean(sorted.iter())),
            p95: percentile_linear(&sorted, 95.0),
            p99: percentile_linear(&sorted, 99.0),
            p95_nearest_rank: percentile_nearest_rank(&sorted, 95.0),
            p99_nearest_rank: percentile_nearest_rank(&sorted, 99.0),
        }
    }

    pub fn is_absent(&self) -> bool {
        *self == Self::default()
    }
}

/// Percentile with linear interpolation between closest ranks. `sorted` must be ascending.
pub fn percentile_linear(sorted: &[f64], percent: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&percent) {
        return None;
    }
    let rank = percent * (sorted.len() - 1) as f64 / 100.0;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + weight * (sorted[upper] - sorted[lower]))
}

/// Smallest value with at least `percent` of the sample at or below it. `sorted` must be ascending.
pub fn percentile_nearest_rank(sorted: &[f64], percent: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&percent) {
        return None;
    }
    let rank = (percent * sorted.len() as f64 / 100.0).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    Some(sorted[index])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartEntry {
    pub restart_id: u64,
    pub duration_to_main: i64,
    pub duration_to_frontend_up: i64,
    pub frontend_up_main_delta: i64,
}

impl RestartEntry {
    fn derive(event: &RestartEvent, unit: TimeUnit) -> Self {
        Self {
            restart_id: event.id,
            duration_to_main: unit.from_nanos(event.to_main_nanos()),
            duration_to_frontend_up: unit.from_nanos(event.to_frontend_up_nanos()),
            frontend_up_main_delta: unit.from_nanos(event.main_to_frontend_up_nanos()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartSeries {
    pub mark: String,
    pub samples: usize,
    pub to_main: Reductions,
    pub to_frontend_up: Reductions,
    pub frontend_up_main_delta: Reductions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<RestartEntry>>,
}

impl RestartSeries {
    pub fn build(mark: &str, events: &[RestartEvent], unit: TimeUnit, full_series: bool) -> Self {
        let entries: Vec<RestartEntry> = events
            .iter()
            .map(|event| RestartEntry::derive(event, unit))
            .collect();
        let column = |select: fn(&RestartEntry) -> i64| -> Vec<i64> {
            entries.iter().map(select).collect()
        };
        Self {
            mark: mark.to_owned(),
            samples: entries.len(),
            to_main: Reductions::from_series(&column(|e| e.duration_to_main)),
            to_frontend_up: Reductions::from_series(&column(|e| e.duration_to_frontend_up)),
            frontend_up_main_delta: Reductions::from_series(&column(|e| e.frontend_up_main_delta)),
            data: full_series.then_some(entries),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadEntry {
    pub id: u64,
    pub start: i64,
    pub end: i64,
    pub rtt: i64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSeriesStats {
    pub mark: String,
    pub samples: usize,
    pub errors: usize,
    pub rtt: Reductions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<WorkloadEntry>>,
}

impl WorkloadSeriesStats {
    pub fn build<'a>(
        mark: &str,
        events: impl IntoIterator<Item = &'a S3WorkloadEvent>,
        unit: TimeUnit,
        full_series: bool,
    ) -> Self {
        let entries: Vec<WorkloadEntry> = events
            .into_iter()
            .map(|event| WorkloadEntry {
                id: event.id,
                start: event.start_ts,
                end: event.end_ts,
                rtt: unit.from_nanos(event.rtt_nanos()),
                error: event.error.clone(),
            })
            .collect();
        let rtts: Vec<i64> = entries.iter().map(|entry| entry.rtt).collect();
        Self {
            mark: mark.to_owned(),
            samples: entries.len(),
            errors: entries.iter().filter(|entry| !entry.error.is_empty()).count(),
            rtt: Reductions::from_series(&rtts),
            data: full_series.then_some(entries),
        }
    }
}

/// Statistics result returned to operators and persisted on campaign completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsDocument {
    pub time_unit: TimeUnit,
    pub restart_series_count: usize,
    pub restart_series: Vec<RestartSeries>,
    pub workload_series_count: usize,
    pub workload_series: Vec<WorkloadSeriesStats>,
}

impl StatsDocument {
    /// Compute the document from the collected data.
    ///
    /// A specific mark always yields one restart series and one workload
    /// series, with absent reductions when nothing was recorded for it.
    pub fn compute(
        data: &CollectedData,
        selector: &MarkSelector,
        unit: TimeUnit,
        full_series: bool,
    ) -> Self {
        let (restart_series, workload_series) = match selector {
            MarkSelector::All => (
                data.restart_marks()
                    .map(|mark| RestartSeries::build(mark, data.restarts(mark), unit, full_series))
                    .collect::<Vec<_>>(),
                data.workload_marks()
                    .filter_map(|mark| {
                        data.workload(mark).map(|series| {
                            WorkloadSeriesStats::build(mark, series.iter(), unit, full_series)
                        })
                    })
                    .collect::<Vec<_>>(),
            ),
            MarkSelector::Mark(mark) => {
                let workload = match data.workload(mark) {
                    Some(series) => WorkloadSeriesStats::build(mark, series.iter(), unit, full_series),
                    None => WorkloadSeriesStats::build(mark, std::iter::empty(), unit, full_series),
                };
                (
                    vec![RestartSeries::build(mark, data.restarts(mark), unit, full_series)],
                    vec![workload],
                )
            }
        };
        Self {
            time_unit: unit,
            restart_series_count: restart_series.len(),
            restart_series,
            workload_series_count: workload_series.len(),
            workload_series,
        }
    }
}
