//! Archaeograph core data model
//!
//! Shared by every stage of the import pipeline:
//!
//! ```text
//! GeoPackage ──► Source Loader ──► staging ──► Enricher ──► Exporter ──► Graph Loader
//!                 (staging)                     (embed)     (staging)      (graph)
//! ```
//!
//! - [`schema`]: the static `Sites` / `Features` layer schemas
//! - [`value`] / [`table`]: cells and wholesale-replaceable tables
//! - [`crs`]: planar → WGS84 reprojection for the derived `Lon`/`Lat`
//! - [`config`]: file + environment configuration
//! - [`error`]: the pipeline error taxonomy

pub mod config;
pub mod crs;
pub mod error;
pub mod schema;
pub mod table;
pub mod value;

pub use config::{EmbeddingConfig, ExportPaths, GraphCredentials, ImportConfig};
pub use crs::Crs;
pub use error::{ImportError, Result};
pub use schema::{ColumnKind, Layer, LayerSchema};
pub use table::{Record, Table};
pub use value::Value;
