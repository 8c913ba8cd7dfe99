//! Columnar cache: a column-major CBOR snapshot of each cleaned layer.
//!
//! Written after cleaning, before the staging store is touched. Read back by
//! the map export (`geojson`), which only needs a handful of columns.

use archaeograph_core::{Crs, ImportError, Layer, Table, Value};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const COLUMNAR_SNAPSHOT_VERSION_V1: &str = "archaeograph_columnar_v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnV1 {
    pub name: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnarSnapshotV1 {
    pub version: String,
    pub layer: Layer,
    /// CRS of the `X`/`Y`/`geometry` columns.
    pub crs: Crs,
    pub rows: usize,
    pub columns: Vec<ColumnV1>,
}

impl ColumnarSnapshotV1 {
    pub fn from_table(table: &Table, crs: Crs) -> Self {
        let columns = table
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| ColumnV1 {
                name: name.clone(),
                values: table.rows.iter().map(|r| r.values[idx].clone()).collect(),
            })
            .collect();
        Self {
            version: COLUMNAR_SNAPSHOT_VERSION_V1.to_string(),
            layer: table.layer,
            crs,
            rows: table.len(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Back to row-major form.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(
            self.layer,
            self.columns.iter().map(|c| c.name.clone()).collect(),
        );
        for row in 0..self.rows {
            let values = self
                .columns
                .iter()
                .map(|c| c.values.get(row).cloned().unwrap_or(Value::Null))
                .collect();
            table.push(values);
        }
        table
    }
}

/// `sites_clean.cbor` / `features_clean.cbor` below `dir`.
pub fn snapshot_path(dir: &Path, layer: Layer) -> PathBuf {
    let stem = match layer {
        Layer::Sites => "sites_clean",
        Layer::Features => "features_clean",
    };
    dir.join(format!("{stem}.cbor"))
}

pub fn write_snapshot(dir: &Path, table: &Table, crs: Crs) -> Result<PathBuf, ImportError> {
    fs::create_dir_all(dir).map_err(|e| ImportError::io(dir, e))?;
    let path = snapshot_path(dir, table.layer);
    let tmp = path.with_extension("cbor.tmp");
    let snapshot = ColumnarSnapshotV1::from_table(table, crs);

    let mut out = Vec::new();
    ciborium::ser::into_writer(&snapshot, &mut out)
        .map_err(|e| ImportError::staging("columnar", format!("CBOR encode: {e}")))?;
    fs::write(&tmp, out).map_err(|e| ImportError::io(&tmp, e))?;
    fs::rename(&tmp, &path).map_err(|e| ImportError::io(&path, e))?;
    Ok(path)
}

pub fn read_snapshot(dir: &Path, layer: Layer) -> Result<ColumnarSnapshotV1, ImportError> {
    let path = snapshot_path(dir, layer);
    let bytes = fs::read(&path).map_err(|e| ImportError::io(&path, e))?;
    let snapshot: ColumnarSnapshotV1 = ciborium::de::from_reader(bytes.as_slice())
        .map_err(|e| ImportError::staging("columnar", format!("CBOR decode: {e}")))?;
    if snapshot.version != COLUMNAR_SNAPSHOT_VERSION_V1 {
        return Err(ImportError::staging(
            "columnar",
            format!(
                "unsupported snapshot version: {} (expected {COLUMNAR_SNAPSHOT_VERSION_V1})",
                snapshot.version
            ),
        ));
    }
    if snapshot.layer != layer {
        return Err(ImportError::staging(
            "columnar",
            format!("{} holds layer {}", path.display(), snapshot.layer),
        ));
    }
    Ok(snapshot)
}
