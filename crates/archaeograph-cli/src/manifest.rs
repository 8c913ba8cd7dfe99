//! Run manifests: one timestamped JSON record per `run`, plus a copy of the
//! latest at `results/import.json`.

use anyhow::{Context, Result};
use archaeograph_core::ExportPaths;
use archaeograph_embed::EnrichReport;
use archaeograph_graph::LoadReport;
use archaeograph_staging::CleaningReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub source: PathBuf,
    pub offline: bool,
    pub dry_run: bool,
    pub cleaning: Option<CleaningReport>,
    pub enrichment: Option<EnrichReport>,
    pub export: Option<ExportPaths>,
    pub load: Option<LoadReport>,
    /// Set when the run stopped early.
    pub error: Option<String>,
}

impl RunManifest {
    pub fn start(source: &Path, offline: bool, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            source: source.to_path_buf(),
            offline,
            dry_run,
            cleaning: None,
            enrichment: None,
            export: None,
            load: None,
            error: None,
        }
    }

    /// Stamp the end time and write both files. Returns the timestamped path.
    pub fn finish(&mut self, results_dir: &Path) -> Result<PathBuf> {
        let finished = Utc::now();
        self.finished_at = Some(finished);

        let dir = results_dir.join("import");
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!(
            "import_{}.json",
            self.started_at.format("%Y%m%dT%H%M%SZ")
        ));
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, &text).with_context(|| format!("writing {}", path.display()))?;
        let latest = results_dir.join("import.json");
        std::fs::write(&latest, &text).with_context(|| format!("writing {}", latest.display()))?;
        Ok(path)
    }
}
