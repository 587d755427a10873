//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Action queued by the operator to run before every re-injection of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PendingAction {
    /// Create `bucket` if needed and write `count` objects named `{prefix}_{i}`
    /// (or `{prefix}_{i}_{unix}` when `timestamped`).
    FillBucket {
        bucket: String,
        prefix: String,
        #[serde(default)]
        payload: String,
        count: u32,
        #[serde(default)]
        timestamped: bool,
    },
    /// Delete objects `{prefix}_{i}` for `i` in `0..count`.
    EraseObjects {
        bucket: String,
        prefix: String,
        count: u32,
    },
}

impl PendingAction {
    pub fn label(&self) -> &'static str {
        match self {
            PendingAction::FillBucket { .. } => "fill_bucket",
            PendingAction::EraseObjects { .. } => "erase_objects",
        }
    }

    /// Object keys touched by this action. `unix_ts` is only used when timestamped.
    pub fn object_keys(&self, unix_ts: i64) -> Vec<String> {
        match self {
            PendingAction::FillBucket {
                prefix,
                count,
                timestamped,
                ..
            } => (0..*count)
                .map(|i| {
                    if *timestamped {
                        format!("{prefix}_{i}_{unix_ts}")
                    } else {
                        format!("{prefix}_{i}")
                    }
                })
                .collect(),
            PendingAction::EraseObjects { prefix, count, .. } => {
                (0..*count).map(|i| format!("{prefix}_{i}")).collect()
            }
        }
    }
}
