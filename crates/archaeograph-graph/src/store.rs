//! Graph store seam.

use crate::rows::GraphRow;
use archaeograph_core::{ImportError, Layer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Loader phase, as reported to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Sites,
    Feats,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Sites => "sites",
            Phase::Feats => "feats",
        })
    }
}

pub const HAS_FEATURE: &str = "HAS_FEATURE";
pub const LOCATED_ON: &str = "LOCATED_ON";

/// Relationship type linking nearby nodes of one layer.
pub fn proximity_relation(layer: Layer) -> &'static str {
    match layer {
        Layer::Sites => "CLOSE_TO_SITE",
        Layer::Features => "CLOSE_TO_FEATURE",
    }
}

/// A pair of nodes closer than the proximity radius, directed from the
/// smaller key to the larger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearPair {
    pub from: String,
    pub to: String,
    pub distance: f64,
}

/// Property graph backend.
///
/// Every mutating call is one transaction: it either applies completely or
/// not at all. All writes are `MERGE`-style, so replaying a call is a no-op.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Uniqueness constraints on `Site.SiteID` and `Feature.FeatureID`.
    async fn ensure_constraints(&self) -> Result<(), ImportError>;

    /// Merge Sites by key and overwrite their properties.
    async fn upsert_sites(&self, rows: &[GraphRow]) -> Result<(), ImportError>;

    /// The subset of `keys` that exist as Site nodes.
    async fn existing_sites(&self, keys: &[String]) -> Result<HashSet<String>, ImportError>;

    /// Merge Features by key, overwrite their properties, and merge the
    /// `HAS_FEATURE`/`LOCATED_ON` edges to their parent Site. Every row's
    /// parent must already exist.
    async fn upsert_features(&self, rows: &[GraphRow]) -> Result<(), ImportError>;

    /// Merge proximity edges between nodes of `layer`.
    async fn link_nearby(&self, layer: Layer, pairs: &[NearPair]) -> Result<(), ImportError>;

    /// Total nodes in the store (used to decide whether an import is needed).
    async fn node_count(&self) -> Result<u64, ImportError>;

    async fn close(&self) -> Result<(), ImportError>;
}
