//! Reading exported layer files into typed graph rows, one batch at a time.

use archaeograph_core::schema::EMBEDDING_COLUMN;
use archaeograph_core::value::parse_number;
use archaeograph_core::{ColumnKind, ImportError, Layer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A node property after write-time coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Property {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    FloatList(Vec<f64>),
}

impl Property {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Property::Int(i) => Some(*i as f64),
            Property::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Property::Null)
    }

    /// Coerce exported text to the property type of `kind`.
    ///
    /// Integer columns truncate toward zero (`toInteger("3.9") = 3`);
    /// anything unparseable, and the empty string, become `Null`.
    pub fn coerce(kind: ColumnKind, text: &str) -> Property {
        match kind {
            ColumnKind::Integer => parse_number(text)
                .filter(|f| f.abs() < 9.2e18)
                .map(|f| Property::Int(f.trunc() as i64))
                .unwrap_or(Property::Null),
            ColumnKind::Float => parse_number(text)
                .map(Property::Float)
                .unwrap_or(Property::Null),
            ColumnKind::Key | ColumnKind::Text if text.is_empty() => Property::Null,
            ColumnKind::Key | ColumnKind::Text => Property::Text(text.to_string()),
        }
    }
}

/// One exported row ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRow {
    /// Empty when the row has no key; such rows are skipped by the loader.
    pub key: String,
    /// Parent Site key (Features only).
    pub parent: Option<String>,
    /// Every column except the key, coerced; includes `embedding`.
    pub props: Vec<(String, Property)>,
}

impl GraphRow {
    pub fn prop(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Planar position, when both coordinates parsed.
    pub fn xy(&self) -> Option<(f64, f64)> {
        let x = self.prop("X")?.as_f64()?;
        let y = self.prop("Y")?.as_f64()?;
        Some((x, y))
    }
}

/// Streams an exported file in batches of `batch_size` rows.
pub struct CsvBatches {
    reader: csv::Reader<File>,
    path: PathBuf,
    batch_size: usize,
    key_idx: usize,
    parent_idx: Option<usize>,
    columns: Vec<(String, ColumnKind)>,
    record: csv::StringRecord,
    line: u64,
}

impl CsvBatches {
    pub fn open(path: &Path, layer: Layer, batch_size: usize) -> Result<Self, ImportError> {
        let err = |message: String| ImportError::Export {
            path: path.to_path_buf(),
            message,
        };
        let mut reader = csv::Reader::from_path(path).map_err(|e| err(e.to_string()))?;
        let headers = reader.headers().map_err(|e| err(e.to_string()))?.clone();
        let schema = layer.schema();

        let position = |name: &str| headers.iter().position(|h| h == name);
        let key_idx = position(schema.key)
            .ok_or_else(|| err(format!("missing key column `{}`", schema.key)))?;
        let parent_idx = match schema.parent_ref {
            Some(p) => Some(position(p).ok_or_else(|| err(format!("missing column `{p}`")))?),
            None => None,
        };
        let columns = headers
            .iter()
            .map(|h| {
                let kind = if h == EMBEDDING_COLUMN {
                    ColumnKind::Text
                } else {
                    schema.kind_of(h)
                };
                (h.to_string(), kind)
            })
            .collect();

        Ok(Self {
            reader,
            path: path.to_path_buf(),
            batch_size: batch_size.max(1),
            key_idx,
            parent_idx,
            columns,
            record: csv::StringRecord::new(),
            line: 1,
        })
    }

    /// Next batch, or `None` at end of file. Never returns an empty batch.
    pub fn next_batch(&mut self) -> Result<Option<Vec<GraphRow>>, ImportError> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            let more = self
                .reader
                .read_record(&mut self.record)
                .map_err(|e| ImportError::Export {
                    path: self.path.clone(),
                    message: e.to_string(),
                })?;
            if !more {
                break;
            }
            self.line += 1;
            batch.push(self.row());
        }
        Ok((!batch.is_empty()).then_some(batch))
    }

    fn row(&self) -> GraphRow {
        let field = |idx: usize| self.record.get(idx).unwrap_or("");
        let key = field(self.key_idx).to_string();
        let parent = self
            .parent_idx
            .map(field)
            .filter(|p| !p.is_empty())
            .map(String::from);

        let mut props = Vec::with_capacity(self.columns.len());
        for (idx, (name, kind)) in self.columns.iter().enumerate() {
            if idx == self.key_idx {
                continue;
            }
            let text = field(idx);
            let value = if name == EMBEDDING_COLUMN {
                parse_embedding(text).unwrap_or_else(|| {
                    warn!(path = %self.path.display(), line = self.line, "unparseable embedding, storing null");
                    Property::Null
                })
            } else {
                Property::coerce(*kind, text)
            };
            props.push((name.clone(), value));
        }
        GraphRow { key, parent, props }
    }
}

/// `Some(Null)` for an empty field, `None` when the JSON is malformed.
fn parse_embedding(text: &str) -> Option<Property> {
    if text.trim().is_empty() {
        return Some(Property::Null);
    }
    serde_json::from_str::<Vec<f64>>(text)
        .ok()
        .map(Property::FloatList)
}

/// Row count of an exported file, scanned in batch-sized chunks.
pub fn count_rows(path: &Path, layer: Layer, batch_size: usize) -> Result<u64, ImportError> {
    let mut batches = CsvBatches::open(path, layer, batch_size)?;
    let mut total = 0u64;
    while let Some(batch) = batches.next_batch()? {
        total += batch.len() as u64;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn coercion_follows_column_kind() {
        assert_eq!(Property::coerce(ColumnKind::Integer, "3.9"), Property::Int(3));
        assert_eq!(Property::coerce(ColumnKind::Integer, "-3.9"), Property::Int(-3));
        assert_eq!(Property::coerce(ColumnKind::Integer, "many"), Property::Null);
        assert_eq!(Property::coerce(ColumnKind::Float, " 12.5 "), Property::Float(12.5));
        assert_eq!(Property::coerce(ColumnKind::Float, ""), Property::Null);
        assert_eq!(Property::coerce(ColumnKind::Text, ""), Property::Null);
        assert_eq!(
            Property::coerce(ColumnKind::Text, "12"),
            Property::Text("12".into())
        );
    }

    #[test]
    fn reads_features_with_parent_and_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "feat_vec.csv",
            "FeatureID,Site,Age,X,Y,embedding\n\
             F1,S1,4.7,447000.5,2045000,\"[0.5,-1.0]\"\n\
             ,S1,,1,2,\n\
             F3,,x,1,2,[broken\n",
        );
        let mut batches = CsvBatches::open(&path, Layer::Features, 10).unwrap();
        let rows = batches.next_batch().unwrap().unwrap();
        assert!(batches.next_batch().unwrap().is_none());
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].key, "F1");
        assert_eq!(rows[0].parent.as_deref(), Some("S1"));
        assert_eq!(rows[0].prop("Age"), Some(&Property::Int(4)));
        assert_eq!(rows[0].xy(), Some((447000.5, 2045000.0)));
        assert_eq!(rows[0].prop("embedding"), Some(&Property::FloatList(vec![0.5, -1.0])));
        assert!(rows[0].prop("FeatureID").is_none());

        assert!(rows[1].key.is_empty());
        assert_eq!(rows[1].prop("embedding"), Some(&Property::Null));
        assert_eq!(rows[2].parent, None);
        assert_eq!(rows[2].prop("embedding"), Some(&Property::Null));
    }

    #[test]
    fn missing_key_column_is_an_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "sites_vec.csv", "Category,X\ncemetery,1\n");
        assert!(matches!(
            CsvBatches::open(&path, Layer::Sites, 10),
            Err(ImportError::Export { .. })
        ));
    }

    proptest! {
        #[test]
        fn batches_partition_the_file(n in 0usize..60, batch_size in 1usize..12) {
            let dir = tempfile::tempdir().unwrap();
            let mut body = String::from("SiteID,X,Y\n");
            for i in 0..n {
                body.push_str(&format!("S{i},{i},{i}\n"));
            }
            let path = write(dir.path(), "sites_vec.csv", &body);

            let mut batches = CsvBatches::open(&path, Layer::Sites, batch_size).unwrap();
            let mut seen = Vec::new();
            while let Some(batch) = batches.next_batch().unwrap() {
                prop_assert!(!batch.is_empty() && batch.len() <= batch_size);
                seen.extend(batch.into_iter().map(|r| r.key));
            }
            let expected: Vec<String> = (0..n).map(|i| format!("S{i}")).collect();
            prop_assert_eq!(seen, expected);
            prop_assert_eq!(count_rows(&path, Layer::Sites, batch_size).unwrap(), n as u64);
        }
    }
}
