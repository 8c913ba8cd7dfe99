//! Static layer schemas for the two source layers.
//!
//! Both the Source Loader and the Graph Loader agree on these column lists:
//! the loader uses them to reindex and coerce raw GeoPackage rows, the graph
//! loader uses the [`ColumnKind`]s to coerce exported text back into typed
//! node properties.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived geometry column (WKT text in the source CRS).
pub const GEOMETRY_COLUMN: &str = "geometry";
/// Derived WGS84 longitude, rounded to 6 decimals.
pub const LON_COLUMN: &str = "Lon";
/// Derived WGS84 latitude, rounded to 6 decimals.
pub const LAT_COLUMN: &str = "Lat";
/// Embedding vector column (JSON array text in staging and export).
pub const EMBEDDING_COLUMN: &str = "embedding";

/// Planar coordinate columns present in both layers.
pub const X_COLUMN: &str = "X";
pub const Y_COLUMN: &str = "Y";

/// Separator used when joining descriptive text columns.
pub const TEXT_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Sites,
    Features,
}

impl Layer {
    pub const ALL: [Layer; 2] = [Layer::Sites, Layer::Features];

    /// Layer name inside the GeoPackage and staging table name.
    pub fn table_name(self) -> &'static str {
        match self {
            Layer::Sites => "Sites",
            Layer::Features => "Features",
        }
    }

    /// Graph node label.
    pub fn node_label(self) -> &'static str {
        match self {
            Layer::Sites => "Site",
            Layer::Features => "Feature",
        }
    }

    pub fn schema(self) -> &'static LayerSchema {
        match self {
            Layer::Sites => &SITES,
            Layer::Features => &FEATURES,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sites" | "site" => Some(Layer::Sites),
            "features" | "feature" | "feats" => Some(Layer::Features),
            _ => None,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// How a column is typed once it leaves the raw source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Identifier column, canonicalised to text.
    Key,
    /// Free text / categorical.
    Text,
    /// Numeric, stored as float; float in the graph.
    Float,
    /// Numeric, stored as float in staging; truncated to an integer in the graph.
    Integer,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { name, kind }
}

#[derive(Debug)]
pub struct LayerSchema {
    pub layer: Layer,
    /// Primary key column.
    pub key: &'static str,
    /// Foreign reference to the parent layer's key (Features → Sites).
    pub parent_ref: Option<&'static str>,
    /// Source attribute columns, in staging order.
    pub columns: &'static [ColumnSpec],
    /// Columns joined (in order) into the descriptive text that gets embedded.
    pub text_columns: &'static [&'static str],
}

impl LayerSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Kind of any staged column, including the derived ones.
    pub fn kind_of(&self, name: &str) -> ColumnKind {
        if let Some(spec) = self.column(name) {
            return spec.kind;
        }
        match name {
            LON_COLUMN | LAT_COLUMN => ColumnKind::Float,
            _ => ColumnKind::Text,
        }
    }

    /// Staged column order: source columns, then geometry, Lon, Lat.
    pub fn staged_columns(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = self.columns.iter().map(|c| c.name).collect();
        out.extend([GEOMETRY_COLUMN, LON_COLUMN, LAT_COLUMN]);
        out
    }
}

pub static SITES: LayerSchema = LayerSchema {
    layer: Layer::Sites,
    key: "SiteID",
    parent_ref: None,
    columns: &[
        col("SiteID", ColumnKind::Key),
        col("Category", ColumnKind::Text),
        col("Location1", ColumnKind::Text),
        col("Location2", ColumnKind::Text),
        col("Surface", ColumnKind::Text),
        col("NoOfFeatures", ColumnKind::Integer),
        col("X", ColumnKind::Float),
        col("Y", ColumnKind::Float),
        col("Shape_Length", ColumnKind::Float),
        col("Shape_Area", ColumnKind::Float),
    ],
    text_columns: &["Category", "Location1", "Location2", "Surface"],
};

pub static FEATURES: LayerSchema = LayerSchema {
    layer: Layer::Features,
    key: "FeatureID",
    parent_ref: Some("Site"),
    columns: &[
        col("FeatureID", ColumnKind::Key),
        col("Site", ColumnKind::Key),
        col("Category", ColumnKind::Text),
        col("Location1", ColumnKind::Text),
        col("Location2", ColumnKind::Text),
        col("Length", ColumnKind::Float),
        col("Width", ColumnKind::Float),
        col("Height", ColumnKind::Float),
        col("Condition", ColumnKind::Text),
        col("Age", ColumnKind::Integer),
        col("X", ColumnKind::Float),
        col("Y", ColumnKind::Float),
        col("Category2", ColumnKind::Text),
        col("RockArt1", ColumnKind::Text),
        col("RockArt2", ColumnKind::Text),
        col("RockArt3", ColumnKind::Text),
        col("RockArt4", ColumnKind::Text),
        col("RockArt5", ColumnKind::Text),
        col("RockArt6", ColumnKind::Text),
    ],
    text_columns: &[
        "Category",
        "Location1",
        "Location2",
        "Condition",
        "Age",
        "Category2",
        "RockArt1",
        "RockArt2",
        "RockArt3",
        "RockArt4",
        "RockArt5",
        "RockArt6",
    ],
};
