//! Embedding enrichment of the staged tables.

use crate::cache::{cache_key, EmbeddingCache};
use crate::embedder::Embedder;
use archaeograph_core::{ImportError, Layer};
use archaeograph_staging::StagingStore;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Per-row progress of the enricher.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichProgress {
    pub layer: Layer,
    pub processed: usize,
    pub total: usize,
    pub percent: f64,
    /// Extrapolated from the mean time per processed row.
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerEnrichReport {
    pub rows: usize,
    pub already_embedded: usize,
    pub cache_hits: usize,
    pub service_calls: usize,
    pub skipped_empty: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichReport {
    pub model: String,
    pub sites: LayerEnrichReport,
    pub features: LayerEnrichReport,
}

impl EnrichReport {
    pub fn service_calls(&self) -> usize {
        self.sites.service_calls + self.features.service_calls
    }
}

pub struct Enricher<'a> {
    store: &'a mut StagingStore,
    cache: &'a EmbeddingCache,
    embedder: &'a dyn Embedder,
}

impl<'a> Enricher<'a> {
    pub fn new(
        store: &'a mut StagingStore,
        cache: &'a EmbeddingCache,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self {
            store,
            cache,
            embedder,
        }
    }

    /// Enrich Sites, then Features. An embedding failure aborts the current
    /// table and leaves it as it was; earlier tables and cache entries stay.
    pub async fn enrich_all(
        &mut self,
        mut progress: impl FnMut(&EnrichProgress),
    ) -> Result<EnrichReport, ImportError> {
        let sites = self.enrich_layer(Layer::Sites, &mut progress).await?;
        let features = self.enrich_layer(Layer::Features, &mut progress).await?;
        Ok(EnrichReport {
            model: self.embedder.model().to_string(),
            sites,
            features,
        })
    }

    pub async fn enrich_layer(
        &mut self,
        layer: Layer,
        progress: &mut impl FnMut(&EnrichProgress),
    ) -> Result<LayerEnrichReport, ImportError> {
        let mut table = self.store.read_table(layer)?;
        let total = table.len();
        let mut report = LayerEnrichReport {
            rows: total,
            ..LayerEnrichReport::default()
        };
        let started = Instant::now();

        for row in 0..total {
            if table.rows[row].embedding.is_some() {
                report.already_embedded += 1;
            } else {
                let text = table.descriptive_text(row);
                if text.trim().is_empty() {
                    report.skipped_empty += 1;
                    debug!(layer = %layer, row, "no descriptive text, leaving row unembedded");
                } else {
                    let key = cache_key(&text);
                    let vector = match self.cache.get(&key)? {
                        Some(v) => {
                            report.cache_hits += 1;
                            v
                        }
                        None => {
                            let v = self.embedder.embed(&text).await.map_err(|e| {
                                ImportError::Embedding {
                                    table: layer.table_name().to_string(),
                                    row,
                                    message: e.to_string(),
                                }
                            })?;
                            self.cache.put(&key, &v)?;
                            report.service_calls += 1;
                            v
                        }
                    };
                    table.rows[row].embedding = Some(vector);
                }
            }

            let processed = row + 1;
            let elapsed = started.elapsed();
            progress(&EnrichProgress {
                layer,
                processed,
                total,
                percent: processed as f64 * 100.0 / total as f64,
                eta: (processed < total)
                    .then(|| elapsed.mul_f64((total - processed) as f64 / processed as f64)),
            });
        }

        self.store.replace_table(&table)?;
        info!(
            layer = %layer,
            rows = report.rows,
            already_embedded = report.already_embedded,
            cache_hits = report.cache_hits,
            service_calls = report.service_calls,
            skipped_empty = report.skipped_empty,
            "enriched staging table"
        );
        Ok(report)
    }
}
