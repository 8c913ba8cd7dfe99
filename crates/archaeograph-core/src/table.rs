//! In-memory table: the unit every stage reads and replaces wholesale.

use crate::schema::{Layer, TEXT_SEPARATOR};
use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub values: Vec<Value>,
    /// Embedding vector, filled in by the enricher.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            embedding: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub layer: Layer,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

static NULL: Value = Value::Null;

impl Table {
    pub fn new(layer: Layer, columns: Vec<String>) -> Self {
        Self {
            layer,
            columns,
            rows: Vec::new(),
        }
    }

    /// Empty table with the staged column layout of `layer`.
    pub fn staged(layer: Layer) -> Self {
        let columns = layer
            .schema()
            .staged_columns()
            .into_iter()
            .map(String::from)
            .collect();
        Self::new(layer, columns)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell lookup by column name; unknown columns read as `Null`.
    pub fn value(&self, row: usize, column: &str) -> &Value {
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).and_then(|r| r.values.get(idx)))
            .unwrap_or(&NULL)
    }

    pub fn push(&mut self, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.push(Record::new(values));
    }

    /// Canonical primary key of a row.
    pub fn key(&self, row: usize) -> Option<String> {
        self.value(row, self.layer.schema().key).canonical_key()
    }

    /// Descriptive text for embedding: the layer's text columns, trimmed,
    /// with nulls and blank cells skipped. Empty when nothing is left.
    pub fn descriptive_text(&self, row: usize) -> String {
        self.layer
            .schema()
            .text_columns
            .iter()
            .map(|c| self.value(row, c).to_string())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(TEXT_SEPARATOR)
    }

    pub fn embedded_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.embedding.is_some()).count()
    }
}
