//! Flat-file export of the staged tables for the graph loader.

use crate::store::StagingStore;
use archaeograph_core::schema::EMBEDDING_COLUMN;
use archaeograph_core::{ExportPaths, ImportError, Layer, Table};
use std::path::Path;
use tracing::info;

/// Write `sites_vec.csv` and `feat_vec.csv`. Both tables are read before
/// either file is written.
pub fn export_csvs(store: &StagingStore, paths: &ExportPaths) -> Result<ExportPaths, ImportError> {
    let sites = store.read_table(Layer::Sites)?;
    let features = store.read_table(Layer::Features)?;
    write_csv(&sites, &paths.sites)?;
    write_csv(&features, &paths.features)?;
    info!(
        sites = sites.len(),
        features = features.len(),
        sites_path = %paths.sites.display(),
        features_path = %paths.features.display(),
        "exported staging tables"
    );
    Ok(paths.clone())
}

pub fn write_csv(table: &Table, path: &Path) -> Result<(), ImportError> {
    let err = |message: String| ImportError::Export {
        path: path.to_path_buf(),
        message,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ImportError::io(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| err(e.to_string()))?;

    let mut header: Vec<&str> = table.columns.iter().map(String::as_str).collect();
    header.push(EMBEDDING_COLUMN);
    writer.write_record(&header).map_err(|e| err(e.to_string()))?;

    for record in &table.rows {
        let mut fields: Vec<String> = record.values.iter().map(|v| v.to_string()).collect();
        fields.push(match &record.embedding {
            Some(v) => serde_json::to_string(v).map_err(|e| err(e.to_string()))?,
            None => String::new(),
        });
        writer.write_record(&fields).map_err(|e| err(e.to_string()))?;
    }
    writer.flush().map_err(|e| ImportError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archaeograph_core::Value;

    fn staged(layer: Layer, keys: &[&str]) -> Table {
        let mut t = Table::staged(layer);
        for key in keys {
            let mut values = vec![Value::Null; t.columns.len()];
            values[0] = Value::from(*key);
            values[t.column_index("geometry").unwrap()] = Value::from("POINT (1 2)");
            values[t.column_index("Lon").unwrap()] = Value::Float(32.5);
            t.push(values);
        }
        t
    }

    #[test]
    fn header_geometry_and_embedding_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StagingStore::open_in_memory().unwrap();
        let mut sites = staged(Layer::Sites, &["S1", "S2"]);
        sites.rows[0].embedding = Some(vec![0.5, -0.25]);
        store
            .replace_tables(&[&sites, &staged(Layer::Features, &[])])
            .unwrap();

        let paths = ExportPaths {
            sites: dir.path().join("out/sites_vec.csv"),
            features: dir.path().join("out/feat_vec.csv"),
        };
        export_csvs(&store, &paths).unwrap();

        let mut reader = csv::Reader::from_path(&paths.sites).unwrap();
        let header = reader.headers().unwrap().clone();
        assert_eq!(&header[0], "SiteID");
        assert_eq!(header.iter().last(), Some("embedding"));
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        let geom = header.iter().position(|h| h == "geometry").unwrap();
        assert_eq!(&rows[0][geom], "POINT (1 2)");
        assert_eq!(rows[0].iter().last(), Some("[0.5,-0.25]"));
        assert_eq!(rows[1].iter().last(), Some(""));

        let features = std::fs::read_to_string(&paths.features).unwrap();
        assert_eq!(features.lines().count(), 1);
    }

    #[test]
    fn missing_staging_table_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StagingStore::open_in_memory().unwrap();
        store.replace_table(&staged(Layer::Sites, &["S1"])).unwrap();
        let paths = ExportPaths {
            sites: dir.path().join("sites_vec.csv"),
            features: dir.path().join("feat_vec.csv"),
        };
        assert!(matches!(
            export_csvs(&store, &paths),
            Err(ImportError::StagingMissing { .. })
        ));
        assert!(!paths.sites.exists());
    }
}
