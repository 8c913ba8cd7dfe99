//! Cleaning rules: coordinate filter, key filter, dedup, orphan filter, then
//! type coercion and geometry derivation.
//!
//! The order is fixed and each excluded row is counted under exactly one
//! reason: a row dropped for missing coordinates is never also a duplicate,
//! and the orphan check runs against the *deduplicated* Site keys.

use crate::source::RawLayer;
use archaeograph_core::crs::{point_wkt, round6};
use archaeograph_core::schema::{X_COLUMN, Y_COLUMN};
use archaeograph_core::{ColumnKind, Crs, Layer, Table, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MissingCoordinates,
    MissingKey,
    DuplicateKey,
    Orphan,
}

/// One excluded source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRow {
    pub layer: Layer,
    pub reason: DropReason,
    /// Zero-based position in the source layer.
    pub source_row: usize,
    pub key: Option<String>,
    /// Parent reference, for orphaned Features.
    pub parent: Option<String>,
}

/// Exact, mutually exclusive cleaning counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningStats {
    pub sites_total: usize,
    pub feats_total: usize,
    pub sites_valid: usize,
    pub feats_valid: usize,
    pub dropped_sites_xy: usize,
    pub dropped_feats_xy: usize,
    pub dropped_sites_nokey: usize,
    pub dropped_feats_nokey: usize,
    pub dropped_sites_dup: usize,
    pub dropped_feats_dup: usize,
    pub dropped_feats_orphan: usize,
}

impl CleaningStats {
    fn count(&mut self, layer: Layer, reason: DropReason) {
        let slot = match (layer, reason) {
            (Layer::Sites, DropReason::MissingCoordinates) => &mut self.dropped_sites_xy,
            (Layer::Features, DropReason::MissingCoordinates) => &mut self.dropped_feats_xy,
            (Layer::Sites, DropReason::MissingKey) => &mut self.dropped_sites_nokey,
            (Layer::Features, DropReason::MissingKey) => &mut self.dropped_feats_nokey,
            (Layer::Sites, DropReason::DuplicateKey) => &mut self.dropped_sites_dup,
            (Layer::Features, DropReason::DuplicateKey) => &mut self.dropped_feats_dup,
            // Sites have no parent.
            (Layer::Sites, DropReason::Orphan) => return,
            (Layer::Features, DropReason::Orphan) => &mut self.dropped_feats_orphan,
        };
        *slot += 1;
    }

    /// Every source row is either valid or dropped for exactly one reason.
    pub fn is_consistent(&self) -> bool {
        self.sites_total
            == self.sites_valid
                + self.dropped_sites_xy
                + self.dropped_sites_nokey
                + self.dropped_sites_dup
            && self.feats_total
                == self.feats_valid
                    + self.dropped_feats_xy
                    + self.dropped_feats_nokey
                    + self.dropped_feats_dup
                    + self.dropped_feats_orphan
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningReport {
    pub stats: CleaningStats,
    pub dropped: Vec<DroppedRow>,
    /// CRS the Sites layer was read in (declared or default).
    pub source_crs: Crs,
    /// Usually equal to `source_crs`; a container may declare them separately.
    pub features_crs: Crs,
}

impl CleaningReport {
    pub fn dropped_by(&self, layer: Layer, reason: DropReason) -> impl Iterator<Item = &DroppedRow> {
        self.dropped
            .iter()
            .filter(move |d| d.layer == layer && d.reason == reason)
    }
}

#[derive(Debug, Clone)]
pub struct CleanedLayers {
    pub sites: Table,
    pub features: Table,
    pub report: CleaningReport,
}

/// Apply the cleaning rules to both layers.
pub fn clean_layers(sites: RawLayer, features: RawLayer, default_crs: Crs) -> CleanedLayers {
    let mut stats = CleaningStats {
        sites_total: sites.table.len(),
        feats_total: features.table.len(),
        ..CleaningStats::default()
    };
    let mut dropped = Vec::new();

    let site_rows = filter_rows(&sites.table, None, &mut stats, &mut dropped);
    let site_keys: HashSet<String> = site_rows
        .iter()
        .filter_map(|&i| sites.table.key(i))
        .collect();
    let feature_rows = filter_rows(&features.table, Some(&site_keys), &mut stats, &mut dropped);

    let source_crs = sites.declared_crs.unwrap_or(default_crs);
    let features_crs = features.declared_crs.unwrap_or(default_crs);
    let sites_out = stage(&sites.table, &site_rows, source_crs);
    let features_out = stage(&features.table, &feature_rows, features_crs);
    stats.sites_valid = sites_out.len();
    stats.feats_valid = features_out.len();
    debug_assert!(stats.is_consistent());

    CleanedLayers {
        sites: sites_out,
        features: features_out,
        report: CleaningReport {
            stats,
            dropped,
            source_crs,
            features_crs,
        },
    }
}

/// Surviving row indices, in source order.
fn filter_rows(
    table: &Table,
    parent_keys: Option<&HashSet<String>>,
    stats: &mut CleaningStats,
    dropped: &mut Vec<DroppedRow>,
) -> Vec<usize> {
    let layer = table.layer;
    let parent_col = layer.schema().parent_ref;
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(table.len());

    for row in 0..table.len() {
        let key = table.key(row);
        let parent = parent_col.and_then(|c| table.value(row, c).canonical_key());

        let has_xy = table.value(row, X_COLUMN).as_f64().is_some()
            && table.value(row, Y_COLUMN).as_f64().is_some();
        let reason = if !has_xy {
            Some(DropReason::MissingCoordinates)
        } else if key.is_none() {
            Some(DropReason::MissingKey)
        } else if seen.contains(key.as_deref().unwrap_or_default()) {
            Some(DropReason::DuplicateKey)
        } else if let Some(parents) = parent_keys {
            match &parent {
                Some(p) if parents.contains(p) => None,
                _ => Some(DropReason::Orphan),
            }
        } else {
            None
        };

        // A key is "taken" by its first coordinate-valid occurrence, even if that
        // occurrence later turns out to be an orphan.
        if let (Some(k), true) = (&key, has_xy) {
            seen.insert(k.clone());
        }

        match reason {
            None => keep.push(row),
            Some(reason) => {
                stats.count(layer, reason);
                dropped.push(DroppedRow {
                    layer,
                    reason,
                    source_row: row,
                    key,
                    parent: if reason == DropReason::Orphan { parent } else { None },
                });
            }
        }
    }
    keep
}

/// Coerce, derive geometry and produce the staged column layout.
fn stage(raw: &Table, rows: &[usize], crs: Crs) -> Table {
    let schema = raw.layer.schema();
    let mut out = Table::staged(raw.layer);
    for &row in rows {
        let mut values: Vec<Value> = schema
            .columns
            .iter()
            .map(|spec| {
                let v = raw.value(row, spec.name);
                match spec.kind {
                    ColumnKind::Key => v.to_key(),
                    ColumnKind::Float | ColumnKind::Integer => v.coerce_float(),
                    ColumnKind::Text if v.is_null() => Value::Null,
                    ColumnKind::Text => Value::Text(v.to_string()),
                }
            })
            .collect();

        // Filtered rows always carry numeric coordinates.
        let x = raw.value(row, X_COLUMN).as_f64().unwrap_or_default();
        let y = raw.value(row, Y_COLUMN).as_f64().unwrap_or_default();
        let (lon, lat) = crs.to_wgs84(x, y);
        values.push(Value::Text(point_wkt(x, y)));
        values.push(Value::Float(round6(lon)));
        values.push(Value::Float(round6(lat)));
        out.push(values);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn raw(layer: Layer, rows: Vec<Vec<(&str, Value)>>) -> RawLayer {
        let schema = layer.schema();
        let mut table = Table::new(layer, schema.columns.iter().map(|c| c.name.to_string()).collect());
        for row in rows {
            let values = schema
                .columns
                .iter()
                .map(|spec| {
                    row.iter()
                        .find(|(k, _)| *k == spec.name)
                        .map(|(_, v)| v.clone())
                        .unwrap_or(Value::Null)
                })
                .collect();
            table.push(values);
        }
        RawLayer {
            table,
            declared_crs: None,
        }
    }

    fn site(id: &str, x: Option<f64>) -> Vec<(&'static str, Value)> {
        vec![
            ("SiteID", Value::from(id)),
            ("X", Value::from(x)),
            ("Y", Value::Float(2_045_000.0)),
        ]
    }

    fn feat(id: &str, site: &str, x: Option<f64>) -> Vec<(&'static str, Value)> {
        vec![
            ("FeatureID", Value::from(id)),
            ("Site", Value::from(site)),
            ("X", Value::from(x)),
            ("Y", Value::Float(2_045_000.0)),
        ]
    }

    #[test]
    fn duplicate_behind_a_coordinate_drop_is_kept() {
        // First "S1" has no X, so the second "S1" is the first valid occurrence.
        let sites = raw(Layer::Sites, vec![site("S1", None), site("S1", Some(447_000.0))]);
        let feats = raw(Layer::Features, vec![]);
        let out = clean_layers(sites, feats, Crs::DEFAULT_SOURCE);
        assert_eq!(out.report.stats.sites_valid, 1);
        assert_eq!(out.report.stats.dropped_sites_xy, 1);
        assert_eq!(out.report.stats.dropped_sites_dup, 0);
    }

    #[test]
    fn orphan_check_uses_deduplicated_sites() {
        // S2 exists in the raw layer but only without coordinates.
        let sites = raw(
            Layer::Sites,
            vec![site("S1", Some(447_000.0)), site("S2", None)],
        );
        let feats = raw(
            Layer::Features,
            vec![
                feat("F1", "S1", Some(447_001.0)),
                feat("F2", "S2", Some(447_002.0)),
                feat("F1", "S1", Some(447_003.0)),
                feat("F3", "S1", None),
            ],
        );
        let out = clean_layers(sites, feats, Crs::DEFAULT_SOURCE);
        let s = &out.report.stats;
        assert_eq!(s.feats_valid, 1);
        assert_eq!(s.dropped_feats_orphan, 1);
        assert_eq!(s.dropped_feats_dup, 1);
        assert_eq!(s.dropped_feats_xy, 1);
        assert!(s.is_consistent());

        let orphan: Vec<_> = out.report.dropped_by(Layer::Features, DropReason::Orphan).collect();
        assert_eq!(orphan[0].key.as_deref(), Some("F2"));
        assert_eq!(orphan[0].parent.as_deref(), Some("S2"));
    }

    #[test]
    fn integer_and_text_keys_resolve() {
        let sites = raw(
            Layer::Sites,
            vec![vec![
                ("SiteID", Value::Integer(7)),
                ("X", Value::Float(447_000.0)),
                ("Y", Value::Float(2_045_000.0)),
            ]],
        );
        let feats = raw(Layer::Features, vec![feat("F1", "7", Some(447_001.0))]);
        let out = clean_layers(sites, feats, Crs::DEFAULT_SOURCE);
        assert_eq!(out.report.stats.feats_valid, 1);
        assert_eq!(out.sites.value(0, "SiteID"), &Value::from("7"));
    }

    #[test]
    fn missing_key_is_its_own_reason() {
        let sites = raw(
            Layer::Sites,
            vec![vec![("X", Value::Float(1.0)), ("Y", Value::Float(2.0))]],
        );
        let out = clean_layers(sites, raw(Layer::Features, vec![]), Crs::Wgs84);
        assert_eq!(out.report.stats.dropped_sites_nokey, 1);
        assert_eq!(out.report.stats.sites_valid, 0);
    }

    #[test]
    fn unparseable_numbers_become_null_and_coordinates_are_derived() {
        let sites = raw(
            Layer::Sites,
            vec![vec![
                ("SiteID", Value::from("S1")),
                ("X", Value::from("500000")),
                ("Y", Value::Float(0.0)),
                ("NoOfFeatures", Value::from("many")),
                ("Shape_Area", Value::from("12.5")),
            ]],
        );
        let out = clean_layers(sites, raw(Layer::Features, vec![]), Crs::DEFAULT_SOURCE);
        let t = &out.sites;
        assert_eq!(t.value(0, "NoOfFeatures"), &Value::Null);
        assert_eq!(t.value(0, "Shape_Area"), &Value::Float(12.5));
        assert_eq!(t.value(0, "X"), &Value::Float(500_000.0));
        assert_eq!(t.value(0, "geometry"), &Value::from("POINT (500000 0)"));
        assert_abs_diff_eq!(t.value(0, "Lon").as_f64().unwrap(), 33.0);
        assert_abs_diff_eq!(t.value(0, "Lat").as_f64().unwrap(), 0.0);
    }

    #[test]
    fn non_numeric_coordinates_count_as_missing() {
        let sites = raw(
            Layer::Sites,
            vec![vec![
                ("SiteID", Value::from("S1")),
                ("X", Value::from("unknown")),
                ("Y", Value::Float(1.0)),
            ]],
        );
        let out = clean_layers(sites, raw(Layer::Features, vec![]), Crs::Wgs84);
        assert_eq!(out.report.stats.dropped_sites_xy, 1);
    }
}
