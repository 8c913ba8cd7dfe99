//! Batched graph load of the two exported files.

use crate::proximity::{pairs_within, Point};
use crate::rows::{count_rows, CsvBatches, GraphRow};
use crate::store::{GraphStore, Phase};
use archaeograph_core::{ImportError, Layer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub sites_loaded: u64,
    pub features_loaded: u64,
    /// Features whose parent Site was not in the store at write time.
    pub features_orphaned: u64,
    pub rows_without_key: u64,
    pub batches_committed: u64,
    pub proximity_edges: u64,
}

#[derive(Debug, Clone)]
pub struct GraphLoader {
    pub batch_size: usize,
    /// Radius for `CLOSE_TO_*` edges; no proximity pass when unset.
    pub proximity_meters: Option<f64>,
}

impl GraphLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            proximity_meters: None,
        }
    }

    pub fn with_proximity(mut self, radius: Option<f64>) -> Self {
        self.proximity_meters = radius;
        self
    }

    /// Both exported files must exist. Callers check this before connecting.
    pub fn check_inputs(sites_csv: &Path, feats_csv: &Path) -> Result<(), ImportError> {
        for path in [sites_csv, feats_csv] {
            if !path.is_file() {
                return Err(ImportError::io(
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "exported file not found; run the export stage first",
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Load Sites, then Features, then (optionally) proximity edges.
    ///
    /// `progress(phase, processed, total)` runs after every batch. The store
    /// is closed on every exit path.
    pub async fn run(
        &self,
        store: &dyn GraphStore,
        sites_csv: &Path,
        feats_csv: &Path,
        mut progress: impl FnMut(Phase, u64, u64),
    ) -> Result<LoadReport, ImportError> {
        let result = match Self::check_inputs(sites_csv, feats_csv) {
            Ok(()) => self.load(store, sites_csv, feats_csv, &mut progress).await,
            Err(e) => Err(e),
        };
        match store.close().await {
            Ok(()) => info!("graph store connection closed"),
            Err(e) => warn!(error = %e, "closing graph store failed"),
        }
        result
    }

    async fn load(
        &self,
        store: &dyn GraphStore,
        sites_csv: &Path,
        feats_csv: &Path,
        progress: &mut impl FnMut(Phase, u64, u64),
    ) -> Result<LoadReport, ImportError> {
        store.ensure_constraints().await?;
        let sites_total = count_rows(sites_csv, Layer::Sites, self.batch_size)?;
        let feats_total = count_rows(feats_csv, Layer::Features, self.batch_size)?;
        info!(sites = sites_total, features = feats_total, "loading graph");

        let mut report = LoadReport::default();
        let mut site_points = Vec::new();
        let mut feature_points = Vec::new();

        // Sites
        let mut batches = CsvBatches::open(sites_csv, Layer::Sites, self.batch_size)?;
        let (mut processed, mut committed, mut batch_no) = (0u64, 0u64, 0usize);
        while let Some(batch) = batches.next_batch()? {
            batch_no += 1;
            processed += batch.len() as u64;
            let rows = self.keyed(batch, Phase::Sites, &mut report);
            if !rows.is_empty() {
                store
                    .upsert_sites(&rows)
                    .await
                    .map_err(|e| batch_error(Phase::Sites, batch_no, committed, e))?;
                committed += rows.len() as u64;
                report.batches_committed += 1;
                collect_points(&rows, &mut site_points);
            }
            debug!(phase = %Phase::Sites, batch = batch_no, rows = rows.len(), "batch committed");
            progress(Phase::Sites, processed, sites_total);
        }
        if batch_no == 0 {
            progress(Phase::Sites, 0, sites_total);
        }
        report.sites_loaded = committed;

        // Features
        let mut batches = CsvBatches::open(feats_csv, Layer::Features, self.batch_size)?;
        let (mut processed, mut committed, mut batch_no) = (0u64, 0u64, 0usize);
        while let Some(batch) = batches.next_batch()? {
            batch_no += 1;
            processed += batch.len() as u64;
            let rows = self.keyed(batch, Phase::Feats, &mut report);

            let parents: Vec<String> = rows
                .iter()
                .filter_map(|r| r.parent.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let existing: HashSet<String> = if parents.is_empty() {
                HashSet::new()
            } else {
                store
                    .existing_sites(&parents)
                    .await
                    .map_err(|e| batch_error(Phase::Feats, batch_no, committed, e))?
            };
            let (rows, orphans): (Vec<GraphRow>, Vec<GraphRow>) = rows
                .into_iter()
                .partition(|r| r.parent.as_ref().is_some_and(|p| existing.contains(p)));
            for orphan in &orphans {
                warn!(
                    feature = %orphan.key,
                    site = orphan.parent.as_deref().unwrap_or(""),
                    "parent site not in graph, skipping feature"
                );
            }
            report.features_orphaned += orphans.len() as u64;

            if !rows.is_empty() {
                store
                    .upsert_features(&rows)
                    .await
                    .map_err(|e| batch_error(Phase::Feats, batch_no, committed, e))?;
                committed += rows.len() as u64;
                report.batches_committed += 1;
                collect_points(&rows, &mut feature_points);
            }
            debug!(phase = %Phase::Feats, batch = batch_no, rows = rows.len(), "batch committed");
            progress(Phase::Feats, processed, feats_total);
        }
        if batch_no == 0 {
            progress(Phase::Feats, 0, feats_total);
        }
        report.features_loaded = committed;

        if let Some(radius) = self.proximity_meters {
            for (layer, points) in [(Layer::Sites, &site_points), (Layer::Features, &feature_points)] {
                let pairs = pairs_within(points, radius);
                store.link_nearby(layer, &pairs).await?;
                info!(layer = %layer, radius, edges = pairs.len(), "linked nearby nodes");
                report.proximity_edges += pairs.len() as u64;
            }
        }

        info!(
            sites = report.sites_loaded,
            features = report.features_loaded,
            orphaned = report.features_orphaned,
            without_key = report.rows_without_key,
            batches = report.batches_committed,
            "graph load complete"
        );
        Ok(report)
    }

    /// Drop (and count) rows without a key.
    fn keyed(&self, batch: Vec<GraphRow>, phase: Phase, report: &mut LoadReport) -> Vec<GraphRow> {
        let before = batch.len();
        let rows: Vec<GraphRow> = batch.into_iter().filter(|r| !r.key.is_empty()).collect();
        let skipped = (before - rows.len()) as u64;
        if skipped > 0 {
            warn!(phase = %phase, skipped, "rows without a key");
            report.rows_without_key += skipped;
        }
        rows
    }
}

fn collect_points(rows: &[GraphRow], out: &mut Vec<Point>) {
    out.extend(rows.iter().filter_map(|r| {
        r.xy().map(|(x, y)| Point {
            key: r.key.clone(),
            x,
            y,
        })
    }));
}

fn batch_error(phase: Phase, batch: usize, committed_rows: u64, e: ImportError) -> ImportError {
    let message = match e {
        ImportError::Graph { message } => message,
        other => other.to_string(),
    };
    ImportError::GraphBatch {
        phase: phase.to_string(),
        batch,
        committed_rows,
        message,
    }
}
