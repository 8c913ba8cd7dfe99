//! Embedding enrichment for the staged archaeology tables
//!
//! Each staged row's descriptive text is embedded at most once, ever: vectors
//! are cached by the SHA-256 of the text in a persistent SQLite table, so
//! identical text across rows, tables and runs costs one service call.

pub mod cache;
pub mod embedder;
pub mod enricher;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use cache::{cache_key, EmbeddingCache};
pub use embedder::{EmbedError, Embedder, HashEmbedder, OpenAiEmbedder};
pub use enricher::{EnrichProgress, EnrichReport, Enricher, LayerEnrichReport};
