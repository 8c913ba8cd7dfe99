//! Graph loading for the archaeology import
//!
//! Streams the exported `Sites`/`Features` files in fixed-size batches into a
//! property graph. Every batch is one transaction of `MERGE` writes, so a
//! re-run converges on the same graph and a failed batch leaves earlier ones
//! committed.
//!
//! - [`rows`]: exported file → typed [`GraphRow`] batches
//! - [`store`]: the [`GraphStore`] seam
//! - [`neo4j`]: Bolt backend ([`Neo4jStore`])
//! - [`memory`]: in-process backend ([`MemoryGraph`])
//! - [`loader`]: the batch loop ([`GraphLoader`])
//! - [`proximity`]: grid search for `CLOSE_TO_*` pairs

pub mod loader;
pub mod memory;
pub mod neo4j;
pub mod proximity;
pub mod rows;
pub mod store;

pub use loader::{GraphLoader, LoadReport};
pub use memory::MemoryGraph;
pub use neo4j::Neo4jStore;
pub use rows::{CsvBatches, GraphRow, Property};
pub use store::{GraphStore, NearPair, Phase};
