//! End-to-end pipeline tests across crates:
//! GeoPackage → staging → embeddings → CSV → graph.
//!
//! Run with: cargo test --test integration_tests

use archaeograph_core::{ImportConfig, Layer};
use archaeograph_embed::testutil::CountingEmbedder;
use archaeograph_embed::{EmbeddingCache, Enricher};
use archaeograph_graph::store::{HAS_FEATURE, LOCATED_ON};
use archaeograph_graph::{GraphLoader, MemoryGraph, Property};
use archaeograph_staging::testutil::survey_fixture;
use archaeograph_staging::{columnar, export_csvs, load_source, StagingStore};
use tempfile::tempdir;

#[tokio::test]
async fn survey_pipeline_end_to_end() {
    let dir = tempdir().unwrap();
    let config = ImportConfig::rooted_at(dir.path());
    survey_fixture().write(&config.source).unwrap();

    // Source loader
    let cleaning = load_source(config.source.as_path().into(), &config).unwrap();
    assert_eq!(cleaning.stats.sites_valid, 9);
    assert_eq!(cleaning.stats.feats_valid, 15);
    assert!(cleaning.stats.is_consistent());

    let snapshot = columnar::read_snapshot(&config.columnar_dir(), Layer::Sites).unwrap();
    assert_eq!(snapshot.rows, 9);

    // Embedding enricher
    let mut store = StagingStore::open(&config.staging_db()).unwrap();
    let cache = EmbeddingCache::open(&config.embedding_cache_db()).unwrap();
    let embedder = CountingEmbedder::new();
    let enrichment = Enricher::new(&mut store, &cache, &embedder)
        .enrich_all(|_| {})
        .await
        .unwrap();
    assert_eq!(enrichment.service_calls(), embedder.calls());

    // Tabular exporter
    let paths = export_csvs(&store, &config.export_paths()).unwrap();
    let header = std::fs::read_to_string(&paths.features).unwrap();
    let header = header.lines().next().unwrap();
    assert!(header.starts_with("FeatureID,"));
    assert!(header.ends_with(",embedding"));

    // Graph loader, twice
    let graph = MemoryGraph::new();
    let loader = GraphLoader::new(4);
    let first = loader
        .run(&graph, &paths.sites, &paths.features, |_, _, _| {})
        .await
        .unwrap();
    let second = loader
        .run(&graph, &paths.sites, &paths.features, |_, _, _| {})
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.sites_loaded, 9);
    assert_eq!(first.features_loaded, 15);
    assert_eq!(graph.site_count(), 9);
    assert_eq!(graph.feature_count(), 15);
    assert_eq!(graph.edge_count(HAS_FEATURE), 15);
    assert_eq!(graph.edge_count(LOCATED_ON), 15);

    let feature = graph.feature("F01").unwrap();
    assert!(matches!(feature.get("embedding"), Some(Property::FloatList(v)) if !v.is_empty()));
}

#[tokio::test]
async fn reload_after_import_keeps_graph_stable() {
    let dir = tempdir().unwrap();
    let config = ImportConfig::rooted_at(dir.path());
    survey_fixture().write(&config.source).unwrap();
    let graph = MemoryGraph::new();
    let cache = EmbeddingCache::open(&config.embedding_cache_db()).unwrap();
    let embedder = CountingEmbedder::new();

    for _ in 0..2 {
        load_source(config.source.as_path().into(), &config).unwrap();
        let mut store = StagingStore::open(&config.staging_db()).unwrap();
        Enricher::new(&mut store, &cache, &embedder)
            .enrich_all(|_| {})
            .await
            .unwrap();
        let paths = export_csvs(&store, &config.export_paths()).unwrap();
        GraphLoader::new(1000)
            .run(&graph, &paths.sites, &paths.features, |_, _, _| {})
            .await
            .unwrap();
    }

    // The second pass is served entirely from the cache.
    assert_eq!(embedder.calls(), cache.len().unwrap());
    assert_eq!(graph.site_count(), 9);
    assert_eq!(graph.feature_count(), 15);
    assert_eq!(graph.close_calls(), 2);
}
