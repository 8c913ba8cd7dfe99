//! Staging store: one SQLite database holding the `Sites` and `Features`
//! tables between stages.
//!
//! Tables are always replaced wholesale inside a transaction, so a reader
//! sees either the previous table or the new one. The embedding column is
//! stored as JSON array text.

use archaeograph_core::schema::EMBEDDING_COLUMN;
use archaeograph_core::{ColumnKind, ImportError, Layer, Record, Table, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct StagingStore {
    conn: Connection,
    path: Option<PathBuf>,
}

fn sql_err(stage: &'static str) -> impl Fn(rusqlite::Error) -> ImportError {
    move |e| ImportError::staging(stage, e)
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl StagingStore {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ImportError::io(parent, e))?;
        }
        let conn = Connection::open(path).map_err(sql_err("open"))?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, ImportError> {
        let conn = Connection::open_in_memory().map_err(sql_err("open"))?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn has_table(&self, layer: Layer) -> Result<bool, ImportError> {
        self.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [layer.table_name()],
                |_| Ok(()),
            )
            .optional()
            .map(|r| r.is_some())
            .map_err(sql_err("inspect"))
    }

    pub fn row_count(&self, layer: Layer) -> Result<usize, ImportError> {
        self.require(layer)?;
        let sql = format!("SELECT count(*) FROM {}", quote(layer.table_name()));
        let n: i64 = self
            .conn
            .query_row(&sql, [], |r| r.get(0))
            .map_err(sql_err("count"))?;
        Ok(n as usize)
    }

    fn require(&self, layer: Layer) -> Result<(), ImportError> {
        if self.has_table(layer)? {
            Ok(())
        } else {
            Err(ImportError::StagingMissing {
                table: layer.table_name().to_string(),
            })
        }
    }

    /// Replace a single table.
    pub fn replace_table(&mut self, table: &Table) -> Result<(), ImportError> {
        self.replace_tables(&[table])
    }

    /// Replace several tables in one transaction.
    pub fn replace_tables(&mut self, tables: &[&Table]) -> Result<(), ImportError> {
        let tx = self.conn.transaction().map_err(sql_err("replace"))?;
        for table in tables {
            write_table(&tx, table)?;
        }
        tx.commit().map_err(sql_err("commit"))?;
        Ok(())
    }

    pub fn read_table(&self, layer: Layer) -> Result<Table, ImportError> {
        self.require(layer)?;
        let schema = layer.schema();
        let columns: Vec<String> = schema
            .staged_columns()
            .into_iter()
            .map(String::from)
            .collect();
        let mut select: Vec<String> = columns.iter().map(|c| quote(c)).collect();
        select.push(quote(EMBEDDING_COLUMN));
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            select.join(", "),
            quote(layer.table_name())
        );

        let mut stmt = self.conn.prepare(&sql).map_err(sql_err("read"))?;
        let mut rows = stmt.query([]).map_err(sql_err("read"))?;
        let mut table = Table::new(layer, columns);
        let width = table.columns.len();
        while let Some(row) = rows.next().map_err(sql_err("read"))? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                let raw = row.get_ref(idx).map_err(sql_err("read"))?;
                values.push(from_sql(raw));
            }
            let embedding = match row.get::<_, Option<String>>(width).map_err(sql_err("read"))? {
                Some(text) if !text.is_empty() => Some(
                    serde_json::from_str::<Vec<f32>>(&text)
                        .map_err(|e| ImportError::staging("read", e))?,
                ),
                _ => None,
            };
            table.rows.push(Record { values, embedding });
        }
        Ok(table)
    }
}

fn write_table(tx: &rusqlite::Transaction<'_>, table: &Table) -> Result<(), ImportError> {
    let schema = table.layer.schema();
    let name = quote(table.layer.table_name());
    let mut defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let ty = match schema.kind_of(c) {
                ColumnKind::Float | ColumnKind::Integer => "REAL",
                ColumnKind::Key | ColumnKind::Text => "TEXT",
            };
            format!("{} {ty}", quote(c))
        })
        .collect();
    defs.push(format!("{} TEXT", quote(EMBEDDING_COLUMN)));

    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {name}; CREATE TABLE {name} ({});",
        defs.join(", ")
    ))
    .map_err(sql_err("replace"))?;

    let mut names: Vec<String> = table.columns.iter().map(|c| quote(c)).collect();
    names.push(quote(EMBEDDING_COLUMN));
    let marks: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {name} ({}) VALUES ({})",
        names.join(", "),
        marks.join(", ")
    );
    let mut stmt = tx.prepare(&sql).map_err(sql_err("insert"))?;
    for record in &table.rows {
        let mut params: Vec<SqlValue> = record.values.iter().map(to_sql).collect();
        params.push(match &record.embedding {
            Some(v) => SqlValue::Text(
                serde_json::to_string(v).map_err(|e| ImportError::staging("insert", e))?,
            ),
            None => SqlValue::Null,
        });
        stmt.execute(params_from_iter(params))
            .map_err(sql_err("insert"))?;
    }
    debug!(table = %table.layer, rows = table.len(), "replaced staging table");
    Ok(())
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(raw: ValueRef<'_>) -> Value {
    match raw {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
    }
}
