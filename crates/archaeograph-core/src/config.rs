//! Import configuration.
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables (`NEO4J_*`, `OPENAI_*`, `EMBED_MODEL`). Secrets are read from the
//! environment only and never written back out.

use crate::crs::Crs;
use crate::error::ImportError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBED_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// GeoPackage with the `Sites` and `Features` layers.
    pub source: PathBuf,
    /// Root for the columnar cache, staging store and embedding cache.
    pub cache_dir: PathBuf,
    /// Directory for the exported CSV files.
    pub data_dir: PathBuf,
    /// Directory for run manifests and map exports.
    pub results_dir: PathBuf,
    /// CRS assumed when the container declares none.
    pub default_crs: Crs,
    /// Rows per graph transaction.
    pub batch_size: usize,
    /// Link nodes closer than this planar distance (metres); disabled when unset.
    pub proximity_meters: Option<f64>,
    pub graph: GraphCredentials,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphCredentials {
    pub uri: String,
    pub user: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Locations of the two exported flat files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPaths {
    pub sites: PathBuf,
    pub features: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("data/WADI_12_2016.gpkg"),
            cache_dir: PathBuf::from("cache"),
            data_dir: PathBuf::from("data"),
            results_dir: PathBuf::from("results"),
            default_crs: Crs::DEFAULT_SOURCE,
            batch_size: DEFAULT_BATCH_SIZE,
            proximity_meters: None,
            graph: GraphCredentials::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for GraphCredentials {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EMBED_BASE_URL.to_string(),
            model: DEFAULT_EMBED_MODEL.to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl ImportConfig {
    /// Read the JSON file (if any), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ImportError> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| ImportError::io(p, e))?;
                serde_json::from_str(&text)
                    .map_err(|e| ImportError::Config(format!("{}: {e}", p.display())))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function (testable without
    /// touching the process environment).
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = var("NEO4J_URI") {
            self.graph.uri = uri;
        }
        if let Some(user) = var("NEO4J_USER") {
            self.graph.user = user;
        }
        if let Some(pass) = var("NEO4J_PASS").or_else(|| var("NEO4J_PASSWORD")) {
            self.graph.password = pass;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Some(model) = var("EMBED_MODEL") {
            self.embedding.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.batch_size == 0 {
            return Err(ImportError::Config("batch_size must be at least 1".into()));
        }
        if let Some(r) = self.proximity_meters {
            if !(r.is_finite() && r > 0.0) {
                return Err(ImportError::Config(format!(
                    "proximity_meters must be a positive distance, got {r}"
                )));
            }
        }
        let uri = url::Url::parse(&self.graph.uri)
            .map_err(|e| ImportError::Config(format!("graph uri `{}`: {e}", self.graph.uri)))?;
        match uri.scheme() {
            "bolt" | "bolt+s" | "bolt+ssc" | "neo4j" | "neo4j+s" | "neo4j+ssc" => {}
            other => {
                return Err(ImportError::Config(format!(
                    "graph uri scheme `{other}` is not a Bolt/Neo4j scheme"
                )))
            }
        }
        url::Url::parse(&self.embedding.base_url).map_err(|e| {
            ImportError::Config(format!(
                "embedding base_url `{}`: {e}",
                self.embedding.base_url
            ))
        })?;
        Ok(())
    }

    pub fn columnar_dir(&self) -> PathBuf {
        self.cache_dir.join("columnar")
    }

    pub fn staging_db(&self) -> PathBuf {
        self.cache_dir.join("staging").join("archaeology.sqlite")
    }

    pub fn embedding_cache_db(&self) -> PathBuf {
        self.cache_dir.join("staging").join("embeddings.sqlite")
    }

    pub fn export_paths(&self) -> ExportPaths {
        ExportPaths {
            sites: self.data_dir.join("sites_vec.csv"),
            features: self.data_dir.join("feat_vec.csv"),
        }
    }

    /// Point every derived location below one root directory.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            source: root.join("source.gpkg"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
            results_dir: root.join("results"),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_and_password_fallback() {
        let env: HashMap<&str, &str> = [
            ("NEO4J_URI", "neo4j://graph:7687"),
            ("NEO4J_PASSWORD", "secret"),
            ("EMBED_MODEL", "text-embedding-3-large"),
        ]
        .into_iter()
        .collect();
        let mut config = ImportConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.graph.uri, "neo4j://graph:7687");
        assert_eq!(config.graph.user, "neo4j");
        assert_eq!(config.graph.password, "secret");
        assert_eq!(config.embedding.model, "text-embedding-3-large");
        config.validate().unwrap();
    }

    #[test]
    fn neo4j_pass_wins_over_password() {
        let mut config = ImportConfig::default();
        config.apply_env(|k| match k {
            "NEO4J_PASS" => Some("a".into()),
            "NEO4J_PASSWORD" => Some("b".into()),
            _ => None,
        });
        assert_eq!(config.graph.password, "a");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ImportConfig {
            batch_size: 0,
            ..ImportConfig::default()
        };
        assert!(config.validate().is_err());

        config.batch_size = 10;
        config.graph.uri = "http://localhost:7474".into();
        assert!(config.validate().is_err());

        config.graph.uri = "bolt://localhost:7687".into();
        config.proximity_meters = Some(-5.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_file_is_partial_and_secrets_are_not_serialised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.json");
        std::fs::write(
            &path,
            r#"{ "batch_size": 250, "default_crs": "EPSG:32635", "graph": { "password": "x" } }"#,
        )
        .unwrap();
        let config: ImportConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.default_crs.epsg(), 32635);
        assert_eq!(config.graph.uri, "bolt://localhost:7687");

        let out = serde_json::to_string(&config).unwrap();
        assert!(!out.contains("password"));
        assert!(!out.contains("api_key"));
    }

    #[test]
    fn derived_paths_follow_roots() {
        let config = ImportConfig::rooted_at(Path::new("/tmp/run"));
        assert_eq!(
            config.export_paths().features,
            PathBuf::from("/tmp/run/data/feat_vec.csv")
        );
        assert!(config.staging_db().starts_with("/tmp/run/cache"));
    }
}
