//! Persistent content-addressed embedding cache.
//!
//! `emb_cache(key TEXT PRIMARY KEY, vec BLOB)` where `key` is the lowercase
//! hex SHA-256 of the descriptive text and `vec` is a bincode `Vec<f32>`.
//! Entries are written once and never replaced.

use archaeograph_core::ImportError;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub fn cache_key(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct EmbeddingCache {
    conn: Connection,
    path: PathBuf,
}

impl EmbeddingCache {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ImportError::io(parent, e))?;
        }
        let conn = Connection::open(path).map_err(|e| cache_err(path, e))?;
        Self::init(conn, path.to_path_buf())
    }

    pub fn open_in_memory() -> Result<Self, ImportError> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|e| cache_err(&path, e))?;
        Self::init(conn, path)
    }

    fn init(conn: Connection, path: PathBuf) -> Result<Self, ImportError> {
        conn.execute_batch("CREATE TABLE IF NOT EXISTS emb_cache (key TEXT PRIMARY KEY, vec BLOB)")
            .map_err(|e| cache_err(&path, e))?;
        Ok(Self { conn, path })
    }

    fn err(&self, e: impl std::fmt::Display) -> ImportError {
        cache_err(&self.path, e)
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<f32>>, ImportError> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row("SELECT vec FROM emb_cache WHERE key = ?1", [key], |r| r.get(0))
            .optional()
            .map_err(|e| self.err(e))?;
        blob.map(|b| bincode::deserialize::<Vec<f32>>(&b).map_err(|e| self.err(e)))
            .transpose()
    }

    pub fn put(&self, key: &str, vector: &[f32]) -> Result<(), ImportError> {
        let blob = bincode::serialize(vector).map_err(|e| self.err(e))?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO emb_cache (key, vec) VALUES (?1, ?2)",
                params![key, blob],
            )
            .map_err(|e| self.err(e))?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, ImportError> {
        let n: i64 = self
            .conn
            .query_row("SELECT count(*) FROM emb_cache", [], |r| r.get(0))
            .map_err(|e| self.err(e))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, ImportError> {
        Ok(self.len()? == 0)
    }
}

fn cache_err(path: &Path, e: impl std::fmt::Display) -> ImportError {
    ImportError::Cache {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_lowercase_sha256_hex() {
        assert_eq!(
            cache_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn entries_survive_reopen_and_are_never_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staging/embeddings.sqlite");
        {
            let cache = EmbeddingCache::open(&path).unwrap();
            assert!(cache.is_empty().unwrap());
            cache.put("k", &[1.0, 2.0]).unwrap();
            cache.put("k", &[9.0]).unwrap();
        }
        let cache = EmbeddingCache::open(&path).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(vec![1.0, 2.0]));
        assert_eq!(cache.get("missing").unwrap(), None);
        assert_eq!(cache.len().unwrap(), 1);
    }
}
