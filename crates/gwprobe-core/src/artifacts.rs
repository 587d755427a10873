//! ---
//! probe_section: "02-correlation-injection"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Restart correlation, failure injection, and measurement reduction."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Rendering and persistence of the files written when a campaign completes.
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::collaborators::ArtifactSink;
use crate::stats::StatsDocument;

/// A named blob handed to every configured sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Render the statistics document and raw series of `mark`.
///
/// Produces `{mark}_stats_{ts}.json`, `{mark}_restarts_{ts}.csv` and
/// `{mark}_s3wl_{ts}.csv`. The CSV files are empty apart from the header
/// when the document was computed without full series.
pub fn render_artifacts(mark: &str, unix_ts: i64, document: &StatsDocument) -> Result<Vec<Artifact>> {
    let json = serde_json::to_vec_pretty(document).context("serialising statistics document")?;

    let restart_rows = document
        .restart_series
        .iter()
        .filter(|series| series.mark == mark)
        .flat_map(|series| series.data.iter().flatten());
    let workload_rows = document
        .workload_series
        .iter()
        .filter(|series| series.mark == mark)
        .flat_map(|series| series.data.iter().flatten());

    Ok(vec![
        Artifact {
            name: format!("{mark}_stats_{unix_ts}.json"),
            bytes: json,
        },
        Artifact {
            name: format!("{mark}_restarts_{unix_ts}.csv"),
            bytes: to_csv(
                &["restart_id", "duration_to_main", "duration_to_frontend_up", "frontend_up_main_delta"],
                restart_rows,
            )?,
        },
        Artifact {
            name: format!("{mark}_s3wl_{unix_ts}.csv"),
            bytes: to_csv(&["id", "start", "end", "rtt", "error"], workload_rows)?,
        },
    ])
}

fn to_csv<'a, T: Serialize + 'a>(
    header: &[&str],
    rows: impl IntoIterator<Item = &'a T>,
) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.into_inner().context("flushing csv buffer")
}

/// Writes artifacts to a local directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    directory: PathBuf,
}

impl FsArtifactSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn persist(&self, name: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("creating artifact directory {}", self.directory.display()))?;
        let path = self.directory.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing artifact {}", path.display()))
    }
}
