//! GeoPackage source reader.
//!
//! A GeoPackage is an SQLite container: layers are listed in `gpkg_contents`
//! and their spatial reference in `gpkg_spatial_ref_sys`. The survey layers
//! carry their planar coordinates as plain `X`/`Y` attribute columns, so the
//! binary geometry column is never decoded.

use archaeograph_core::schema::{X_COLUMN, Y_COLUMN};
use archaeograph_core::{Crs, ImportError, Layer, Table, Value};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Where the GeoPackage comes from.
pub enum SourceInput {
    Path(PathBuf),
    /// Upload-style byte stream; materialised to a temporary `.gpkg` first.
    Reader(Box<dyn Read + Send>),
}

impl From<PathBuf> for SourceInput {
    fn from(p: PathBuf) -> Self {
        SourceInput::Path(p)
    }
}

impl From<&Path> for SourceInput {
    fn from(p: &Path) -> Self {
        SourceInput::Path(p.to_path_buf())
    }
}

/// A source path, plus the temporary file backing it when it was streamed.
pub struct MaterialisedSource {
    path: PathBuf,
    _temp: Option<NamedTempFile>,
}

impl MaterialisedSource {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceInput {
    pub fn materialise(self) -> Result<MaterialisedSource, ImportError> {
        match self {
            SourceInput::Path(path) => Ok(MaterialisedSource { path, _temp: None }),
            SourceInput::Reader(mut reader) => {
                let mut temp = tempfile::Builder::new()
                    .prefix("archaeograph-")
                    .suffix(".gpkg")
                    .tempfile()
                    .map_err(|e| ImportError::io(std::env::temp_dir(), e))?;
                let bytes = std::io::copy(&mut reader, temp.as_file_mut())
                    .map_err(|e| ImportError::io(temp.path(), e))?;
                temp.as_file_mut()
                    .sync_all()
                    .map_err(|e| ImportError::io(temp.path(), e))?;
                debug!(bytes, path = %temp.path().display(), "materialised source stream");
                Ok(MaterialisedSource {
                    path: temp.path().to_path_buf(),
                    _temp: Some(temp),
                })
            }
        }
    }
}

/// One layer as read from the container: schema columns (missing ones null),
/// raw untyped values, and the declared CRS if there is one.
#[derive(Debug, Clone)]
pub struct RawLayer {
    pub table: Table,
    pub declared_crs: Option<Crs>,
}

pub struct GeoPackage {
    conn: Connection,
    path: PathBuf,
}

impl GeoPackage {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        if !path.is_file() {
            return Err(ImportError::source(path, "GeoPackage not found"));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ImportError::source(path, format!("cannot open: {e}")))?;
        // Opening is lazy; touch the schema so a non-SQLite file fails here.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| {
            r.get::<_, i64>(0)
        })
        .map_err(|e| ImportError::source(path, format!("not a GeoPackage: {e}")))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn err(&self, message: impl Into<String>) -> ImportError {
        ImportError::source(&self.path, message)
    }

    fn has_table(&self, name: &str) -> Result<bool, ImportError> {
        self.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                [name],
                |_| Ok(()),
            )
            .optional()
            .map(|r| r.is_some())
            .map_err(|e| self.err(e.to_string()))
    }

    /// Resolve a layer name to its table and declared `srs_id`.
    fn resolve_layer(&self, layer: &str) -> Result<(String, Option<i64>), ImportError> {
        if self.has_table("gpkg_contents")? {
            let found = self
                .conn
                .query_row(
                    "SELECT table_name, srs_id FROM gpkg_contents
                     WHERE lower(table_name) = lower(?1) OR lower(identifier) = lower(?1)
                     LIMIT 1",
                    [layer],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, Option<i64>>(1)?)),
                )
                .optional()
                .map_err(|e| self.err(e.to_string()))?;
            if let Some((table, srs_id)) = found {
                let srs_id = match srs_id {
                    Some(id) => Some(id),
                    None => self.geometry_column_srs(&table)?,
                };
                return Ok((table, srs_id));
            }
        }
        if self.has_table(layer)? {
            return Ok((layer.to_string(), None));
        }
        Err(self.err(format!("layer `{layer}` not found")))
    }

    fn geometry_column_srs(&self, table: &str) -> Result<Option<i64>, ImportError> {
        if !self.has_table("gpkg_geometry_columns")? {
            return Ok(None);
        }
        self.conn
            .query_row(
                "SELECT srs_id FROM gpkg_geometry_columns WHERE table_name = ?1 LIMIT 1",
                [table],
                |r| r.get::<_, Option<i64>>(0),
            )
            .optional()
            .map(Option::flatten)
            .map_err(|e| self.err(e.to_string()))
    }

    /// `0` and `-1` are the GeoPackage "undefined" systems.
    fn declared_crs(&self, srs_id: Option<i64>) -> Result<Option<Crs>, ImportError> {
        let Some(srs_id) = srs_id.filter(|id| *id > 0) else {
            return Ok(None);
        };
        if !self.has_table("gpkg_spatial_ref_sys")? {
            return Ok(None);
        }
        let row = self
            .conn
            .query_row(
                "SELECT organization, organization_coordsys_id
                 FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
                [srs_id],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(|e| self.err(e.to_string()))?;
        match row {
            Some((org, code)) if org.eq_ignore_ascii_case("epsg") => {
                Crs::from_epsg(code as u32).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn read_layer(&self, layer: Layer) -> Result<RawLayer, ImportError> {
        let schema = layer.schema();
        let (table_name, srs_id) = self.resolve_layer(layer.table_name())?;
        let declared_crs = self.declared_crs(srs_id)?;

        let sql = format!("SELECT * FROM \"{}\"", table_name.replace('"', "\"\""));
        let mut stmt = self.conn.prepare(&sql).map_err(|e| self.err(e.to_string()))?;
        let source_columns: Vec<String> =
            stmt.column_names().into_iter().map(String::from).collect();

        // Schema column → source column index (exact match first, then case-insensitive).
        let mapping: Vec<Option<usize>> = schema
            .columns
            .iter()
            .map(|spec| {
                source_columns
                    .iter()
                    .position(|c| c == spec.name)
                    .or_else(|| {
                        source_columns
                            .iter()
                            .position(|c| c.eq_ignore_ascii_case(spec.name))
                    })
            })
            .collect();

        for required in [schema.key, X_COLUMN, Y_COLUMN] {
            let idx = schema
                .columns
                .iter()
                .position(|c| c.name == required)
                .and_then(|i| mapping[i]);
            if idx.is_none() {
                return Err(self.err(format!(
                    "layer `{table_name}` has no `{required}` column"
                )));
            }
        }

        let mut table = Table::new(
            layer,
            schema.columns.iter().map(|c| c.name.to_string()).collect(),
        );
        let mut rows = stmt.query([]).map_err(|e| self.err(e.to_string()))?;
        while let Some(row) = rows.next().map_err(|e| self.err(e.to_string()))? {
            let mut values = Vec::with_capacity(mapping.len());
            for idx in &mapping {
                let value = match idx {
                    Some(i) => {
                        let raw = row.get_ref(*i).map_err(|e| self.err(e.to_string()))?;
                        from_sql(raw)
                    }
                    None => Value::Null,
                };
                values.push(value);
            }
            table.push(values);
        }

        info!(
            layer = %layer,
            table = %table_name,
            rows = table.len(),
            crs = ?declared_crs.map(|c| c.to_string()),
            "read source layer"
        );
        Ok(RawLayer {
            table,
            declared_crs,
        })
    }
}

fn from_sql(raw: ValueRef<'_>) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}
