//! Fixture GeoPackages for tests (enabled by the `test-utils` feature).

use archaeograph_core::{ColumnKind, Layer, Value};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;

/// Builder for a minimal GeoPackage with `Sites` and `Features` layers.
#[derive(Debug, Clone, Default)]
pub struct GpkgFixture {
    srs: Option<u32>,
    sites: Vec<Vec<(String, Value)>>,
    features: Vec<Vec<(String, Value)>>,
}

impl GpkgFixture {
    /// `srs` is the EPSG code declared for both layers; `None` declares the
    /// GeoPackage "undefined cartesian" system (`srs_id = -1`).
    pub fn new(srs: Option<u32>) -> Self {
        Self {
            srs,
            ..Self::default()
        }
    }

    pub fn site(&mut self, id: &str, xy: Option<(f64, f64)>, attrs: &[(&str, &str)]) -> &mut Self {
        let row = Self::row("SiteID", Value::from(id), None, xy, attrs);
        self.sites.push(row);
        self
    }

    pub fn feature(
        &mut self,
        id: &str,
        site: &str,
        xy: Option<(f64, f64)>,
        attrs: &[(&str, &str)],
    ) -> &mut Self {
        let row = Self::row("FeatureID", Value::from(id), Some(site), xy, attrs);
        self.features.push(row);
        self
    }

    /// Add a raw row with arbitrary values (e.g. integer keys, unparseable numbers).
    pub fn raw(&mut self, layer: Layer, values: Vec<(&str, Value)>) -> &mut Self {
        let row = values.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        match layer {
            Layer::Sites => self.sites.push(row),
            Layer::Features => self.features.push(row),
        }
        self
    }

    fn row(
        key_col: &str,
        key: Value,
        site: Option<&str>,
        xy: Option<(f64, f64)>,
        attrs: &[(&str, &str)],
    ) -> Vec<(String, Value)> {
        let mut row = vec![(key_col.to_string(), key)];
        if let Some(site) = site {
            row.push(("Site".to_string(), Value::from(site)));
        }
        let (x, y) = match xy {
            Some((x, y)) => (Value::Float(x), Value::Float(y)),
            None => (Value::Null, Value::Null),
        };
        row.push(("X".to_string(), x));
        row.push(("Y".to_string(), y));
        for (k, v) in attrs {
            row.push((k.to_string(), Value::from(*v)));
        }
        row
    }

    pub fn write(&self, path: &Path) -> rusqlite::Result<()> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE gpkg_spatial_ref_sys (
                srs_name TEXT NOT NULL, srs_id INTEGER PRIMARY KEY,
                organization TEXT NOT NULL, organization_coordsys_id INTEGER NOT NULL,
                definition TEXT NOT NULL, description TEXT);
             INSERT INTO gpkg_spatial_ref_sys VALUES
                ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', NULL),
                ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', NULL);
             CREATE TABLE gpkg_contents (
                table_name TEXT NOT NULL PRIMARY KEY, data_type TEXT NOT NULL,
                identifier TEXT UNIQUE, description TEXT DEFAULT '',
                last_change DATETIME, min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE,
                srs_id INTEGER);",
        )?;
        let srs_id: i64 = match self.srs {
            Some(code) => {
                conn.execute(
                    "INSERT INTO gpkg_spatial_ref_sys VALUES (?1, ?2, 'EPSG', ?2, 'fixture', NULL)",
                    rusqlite::params![format!("EPSG:{code}"), code as i64],
                )?;
                code as i64
            }
            None => -1,
        };

        for (layer, rows) in [(Layer::Sites, &self.sites), (Layer::Features, &self.features)] {
            let schema = layer.schema();
            let mut cols = vec!["fid INTEGER PRIMARY KEY AUTOINCREMENT".to_string(), "geom BLOB".to_string()];
            for spec in schema.columns {
                let ty = match spec.kind {
                    ColumnKind::Float | ColumnKind::Integer => "REAL",
                    ColumnKind::Key | ColumnKind::Text => "TEXT",
                };
                cols.push(format!("\"{}\" {ty}", spec.name));
            }
            conn.execute_batch(&format!(
                "CREATE TABLE \"{}\" ({});",
                layer.table_name(),
                cols.join(", ")
            ))?;
            conn.execute(
                "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id)
                 VALUES (?1, 'features', ?1, ?2)",
                rusqlite::params![layer.table_name(), srs_id],
            )?;

            for row in rows {
                let names: Vec<String> = row.iter().map(|(k, _)| format!("\"{k}\"")).collect();
                let marks: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
                let sql = format!(
                    "INSERT INTO \"{}\" ({}) VALUES ({})",
                    layer.table_name(),
                    names.join(", "),
                    marks.join(", ")
                );
                let params = row.iter().map(|(_, v)| to_sql(v));
                conn.execute(&sql, params_from_iter(params))?;
            }
        }
        Ok(())
    }
}

fn to_sql(v: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match v {
        Value::Null => Sql::Null,
        Value::Integer(i) => Sql::Integer(*i),
        Value::Float(f) => Sql::Real(*f),
        Value::Text(s) => Sql::Text(s.clone()),
    }
}

/// The reference survey: 10 Sites (one without X), 20 Features (two
/// duplicate `FeatureID`s, three pointing at Sites that do not exist).
///
/// Expected after cleaning: 9 Sites, 15 Features;
/// `{sites_xy: 1, sites_dup: 0, feats_xy: 0, feats_dup: 2, feats_orphan: 3}`.
pub fn survey_fixture() -> GpkgFixture {
    let mut fx = GpkgFixture::new(Some(32636));
    let categories = ["cemetery", "settlement", "rock art", "quarry"];
    for i in 1..=10 {
        let id = format!("S{i:02}");
        let xy = (447_000.0 + 100.0 * i as f64, 2_045_000.0 + 50.0 * i as f64);
        let category = categories[i % categories.len()];
        if i == 10 {
            fx.raw(
                Layer::Sites,
                vec![
                    ("SiteID", Value::from(id.as_str())),
                    ("X", Value::Null),
                    ("Y", Value::Float(xy.1)),
                    ("Category", Value::from(category)),
                ],
            );
        } else {
            fx.site(&id, Some(xy), &[("Category", category), ("Surface", "gravel")]);
        }
    }

    // 15 valid features spread over S01..S09; text repeats on purpose so the
    // embedding cache gets hits.
    for i in 1..=15 {
        let id = format!("F{i:02}");
        let site = format!("S{:02}", (i - 1) % 9 + 1);
        let xy = (447_000.0 + 7.0 * i as f64, 2_045_100.0 + 3.0 * i as f64);
        let condition = if i % 2 == 0 { "good" } else { "poor" };
        fx.feature(&id, &site, Some(xy), &[("Category", "grave"), ("Condition", condition)]);
    }
    // Two duplicates of existing FeatureIDs (pointing at valid Sites).
    fx.feature("F03", "S01", Some((447_500.0, 2_045_500.0)), &[("Category", "duplicate")]);
    fx.feature("F07", "S02", Some((447_600.0, 2_045_600.0)), &[("Category", "duplicate")]);
    // Three orphans.
    for (id, site) in [("F16", "S99"), ("F17", "S98"), ("F18", "S97")] {
        fx.feature(id, site, Some((447_700.0, 2_045_700.0)), &[("Category", "grave")]);
    }
    fx
}
