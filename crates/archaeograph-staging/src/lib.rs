//! Source loading and staging for the archaeology import
//!
//! - [`source`]: GeoPackage reader (file path or byte stream)
//! - [`clean`]: ordered cleaning rules and the cleaning report
//! - [`columnar`]: CBOR column-major cache of the cleaned layers
//! - [`store`]: SQLite staging store shared with the enricher
//! - [`export`]: CSV export for the graph loader

pub mod clean;
pub mod columnar;
pub mod export;
pub mod source;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use clean::{CleaningReport, CleaningStats, DropReason, DroppedRow};
pub use export::export_csvs;
pub use source::{GeoPackage, SourceInput};
pub use store::StagingStore;

use archaeograph_core::{ImportConfig, ImportError, Layer};
use tracing::{info, warn};

/// Read, clean and stage both layers.
///
/// Both layers are read and cleaned completely before anything is written, so
/// a fatal error leaves the columnar cache and the staging store untouched.
pub fn load_source(input: SourceInput, config: &ImportConfig) -> Result<CleaningReport, ImportError> {
    let source = input.materialise()?;
    let gpkg = GeoPackage::open(source.path())?;
    let sites = gpkg.read_layer(Layer::Sites)?;
    let features = gpkg.read_layer(Layer::Features)?;
    drop(gpkg);

    let cleaned = clean::clean_layers(sites, features, config.default_crs);
    let report = cleaned.report;

    // Staging first: snapshots never describe tables the store does not hold.
    let mut store = StagingStore::open(&config.staging_db())?;
    store.replace_tables(&[&cleaned.sites, &cleaned.features])?;

    let columnar_dir = config.columnar_dir();
    columnar::write_snapshot(&columnar_dir, &cleaned.sites, report.source_crs)?;
    columnar::write_snapshot(&columnar_dir, &cleaned.features, report.features_crs)?;

    let s = &report.stats;
    for row in &report.dropped {
        warn!(
            layer = %row.layer,
            reason = ?row.reason,
            source_row = row.source_row,
            key = row.key.as_deref().unwrap_or(""),
            "dropped source row"
        );
    }
    info!(
        sites = s.sites_valid,
        features = s.feats_valid,
        dropped_sites_xy = s.dropped_sites_xy,
        dropped_feats_xy = s.dropped_feats_xy,
        dropped_feats_dup = s.dropped_feats_dup,
        dropped_feats_orphan = s.dropped_feats_orphan,
        crs = %report.source_crs,
        "staged source layers"
    );
    Ok(report)
}
