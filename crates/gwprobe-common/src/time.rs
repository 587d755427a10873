//! ---
//! probe_section: "01-core-functionality"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Shared primitives and utilities for the probe runtime."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Display unit applied to raw nanosecond timestamps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
    strum::IntoStaticStr,
)]
pub enum TimeUnit {
    #[serde(rename = "ns")]
    #[strum(serialize = "ns")]
    Nanos,
    #[serde(rename = "us")]
    #[strum(serialize = "us")]
    Micros,
    #[default]
    #[serde(rename = "ms")]
    #[strum(serialize = "ms")]
    Millis,
    #[serde(rename = "s")]
    #[strum(serialize = "s")]
    Seconds,
}

impl TimeUnit {
    /// Nanoseconds per unit.
    pub const fn scale(self) -> i64 {
        match self {
            TimeUnit::Nanos => 1,
            TimeUnit::Micros => 1_000,
            TimeUnit::Millis => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
        }
    }

    /// Convert a nanosecond quantity into this unit, truncating toward zero.
    pub const fn from_nanos(self, nanos: i64) -> i64 {
        nanos / self.scale()
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time unit '{0}' (expected ns, us, ms or s)")]
pub struct TimeUnitError(pub String);

impl FromStr for TimeUnit {
    type Err = TimeUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ns" => Ok(TimeUnit::Nanos),
            "us" => Ok(TimeUnit::Micros),
            "ms" => Ok(TimeUnit::Millis),
            "s" => Ok(TimeUnit::Seconds),
            other => Err(TimeUnitError(other.to_owned())),
        }
    }
}

/// Wall-clock time in nanoseconds since the Unix epoch, the wire unit of every event.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Wall-clock time in whole seconds, used to stamp artifact names.
pub fn unix_seconds() -> i64 {
    Utc::now().timestamp()
}
