//! Archaeograph CLI
//!
//! Drives the survey import pipeline:
//! - `load`: GeoPackage → cleaned columnar cache + staging store
//! - `embed`: descriptive-text embeddings, cached by content hash
//! - `export`: staged tables → `sites_vec.csv` / `feat_vec.csv`
//! - `import`: CSVs → Neo4j (or an in-memory graph with `--dry-run`)
//! - `run`: all four, with a run manifest under `results/`

use anyhow::{anyhow, Result};
use archaeograph_core::{ImportConfig, Layer};
use archaeograph_embed::{Embedder, EmbeddingCache, Enricher, HashEmbedder, OpenAiEmbedder};
use archaeograph_graph::{GraphLoader, GraphStore, LoadReport, MemoryGraph, Neo4jStore};
use archaeograph_staging::{columnar, export_csvs, load_source, SourceInput, StagingStore};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod geojson;
mod manifest;
mod progress;
mod report;

use manifest::RunManifest;
use progress::{EnrichBars, LoadBars};

#[derive(Parser, Debug)]
#[command(name = "archaeograph")]
#[command(author, version, about = "Archaeograph: survey GeoPackage to knowledge graph")]
struct Cli {
    /// JSON configuration file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG / LOG_LEVEL say otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read, clean and stage the Sites and Features layers.
    Load {
        /// GeoPackage path, or `-` to read it from stdin
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Attach an embedding to every staged row with descriptive text.
    Embed {
        /// Use the deterministic local embedder instead of the HTTP service
        #[arg(long)]
        offline: bool,
    },

    /// Write the staged tables to CSV.
    Export,

    /// Load the exported CSVs into the graph.
    Import {
        /// Load into an in-memory graph instead of Neo4j
        #[arg(long)]
        dry_run: bool,
    },

    /// load, embed, export and import in one go, recording a run manifest.
    Run {
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long)]
        offline: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Report the graph's node count and whether an import is needed.
    Status,

    /// Convert a cleaned layer to GeoJSON for the map view.
    Geojson {
        #[arg(long, value_parser = parse_layer)]
        layer: Layer,
        /// Defaults to `<results_dir>/map/<layer>.geojson`
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn parse_layer(s: &str) -> Result<Layer, String> {
    Layer::parse(s).ok_or_else(|| format!("unknown layer `{s}` (expected sites or features)"))
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let directives = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| default.to_string());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let mut config = ImportConfig::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    if let Err(e) = rt.block_on(dispatch(cli.command, &mut config)) {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
    Ok(())
}

async fn dispatch(command: Commands, config: &mut ImportConfig) -> Result<()> {
    match command {
        Commands::Load { source } => {
            let input = source_input(config, source);
            let cleaning = load_source(input, config)?;
            report::print_cleaning(&cleaning);
        }
        Commands::Embed { offline } => {
            cmd_embed(config, offline).await?;
        }
        Commands::Export => {
            cmd_export(config)?;
        }
        Commands::Import { dry_run } => {
            cmd_import(config, dry_run).await?;
        }
        Commands::Run {
            source,
            offline,
            dry_run,
        } => cmd_run(config, source, offline, dry_run).await?,
        Commands::Status => cmd_status(config).await?,
        Commands::Geojson { layer, out } => cmd_geojson(config, layer, out)?,
    }
    Ok(())
}

/// `-` means stdin; any other path replaces the configured source.
fn source_input(config: &mut ImportConfig, source: Option<PathBuf>) -> SourceInput {
    match source {
        Some(p) if p.as_os_str() == "-" => SourceInput::Reader(Box::new(std::io::stdin())),
        Some(p) => {
            config.source = p;
            SourceInput::Path(config.source.clone())
        }
        None => SourceInput::Path(config.source.clone()),
    }
}

fn embedder(config: &ImportConfig, offline: bool) -> Result<Box<dyn Embedder>> {
    if offline {
        return Ok(Box::new(HashEmbedder::new(HashEmbedder::DEFAULT_DIMS)));
    }
    Ok(Box::new(OpenAiEmbedder::new(&config.embedding)?))
}

async fn cmd_embed(
    config: &ImportConfig,
    offline: bool,
) -> Result<archaeograph_embed::EnrichReport> {
    let embedder = embedder(config, offline)?;
    let mut store = StagingStore::open(&config.staging_db())?;
    let cache = EmbeddingCache::open(&config.embedding_cache_db())?;

    let mut bars = EnrichBars::new();
    let result = Enricher::new(&mut store, &cache, embedder.as_ref())
        .enrich_all(|p| bars.update(p))
        .await;
    bars.finish();

    let enrichment = result?;
    report::print_enrichment(&enrichment);
    Ok(enrichment)
}

fn cmd_export(config: &ImportConfig) -> Result<archaeograph_core::ExportPaths> {
    let store = StagingStore::open(&config.staging_db())?;
    let paths = export_csvs(&store, &config.export_paths())?;
    println!(
        "{} {} and {}",
        "exported".green().bold(),
        paths.sites.display(),
        paths.features.display()
    );
    Ok(paths)
}

async fn cmd_import(config: &ImportConfig, dry_run: bool) -> Result<LoadReport> {
    let paths = config.export_paths();
    GraphLoader::check_inputs(&paths.sites, &paths.features)?;
    let loader =
        GraphLoader::new(config.batch_size).with_proximity(config.proximity_meters);

    let bars = LoadBars::new();
    let result = if dry_run {
        let graph = MemoryGraph::new();
        loader
            .run(&graph, &paths.sites, &paths.features, |p, d, t| bars.update(p, d, t))
            .await
    } else {
        let store = Neo4jStore::connect(&config.graph).await?;
        loader
            .run(&store, &paths.sites, &paths.features, |p, d, t| bars.update(p, d, t))
            .await
    };
    bars.finish();

    let load = result?;
    report::print_load(&load);
    Ok(load)
}

async fn cmd_run(
    config: &mut ImportConfig,
    source: Option<PathBuf>,
    offline: bool,
    dry_run: bool,
) -> Result<()> {
    let input = source_input(config, source);
    let shown_source = match &input {
        SourceInput::Path(p) => p.clone(),
        SourceInput::Reader(_) => PathBuf::from("-"),
    };
    let mut manifest = RunManifest::start(&shown_source, offline, dry_run);
    info!(run_id = %manifest.run_id, source = %shown_source.display(), "import run started");

    let outcome = run_stages(config, input, offline, dry_run, &mut manifest).await;
    if let Err(e) = &outcome {
        manifest.error = Some(format!("{e:#}"));
    }
    let written = manifest.finish(&config.results_dir)?;
    println!("{} {}", "manifest".bold(), written.display());
    outcome
}

async fn run_stages(
    config: &ImportConfig,
    input: SourceInput,
    offline: bool,
    dry_run: bool,
    manifest: &mut RunManifest,
) -> Result<()> {
    let cleaning = load_source(input, config)?;
    report::print_cleaning(&cleaning);
    manifest.cleaning = Some(cleaning);

    manifest.enrichment = Some(cmd_embed(config, offline).await?);
    manifest.export = Some(cmd_export(config)?);
    manifest.load = Some(cmd_import(config, dry_run).await?);
    Ok(())
}

async fn cmd_status(config: &ImportConfig) -> Result<()> {
    let store = Neo4jStore::connect(&config.graph).await?;
    let counted = store.node_count().await;
    store.close().await?;
    let nodes = counted?;
    if nodes == 0 {
        println!(
            "{} graph at {} is empty; run `archaeograph run` to import",
            "status".bold(),
            store.uri()
        );
    } else {
        println!(
            "{} graph at {} has {} nodes; no import needed",
            "status".bold(),
            store.uri(),
            nodes.to_string().green()
        );
    }
    Ok(())
}

fn default_geojson_path(results_dir: &Path, layer: Layer) -> PathBuf {
    results_dir
        .join("map")
        .join(format!("{}.geojson", layer.table_name().to_lowercase()))
}

fn cmd_geojson(config: &ImportConfig, layer: Layer, out: Option<PathBuf>) -> Result<()> {
    let snapshot = columnar::read_snapshot(&config.columnar_dir(), layer)?;
    let out = out.unwrap_or_else(|| default_geojson_path(&config.results_dir, layer));
    let count = geojson::write_feature_collection(&snapshot, &out)?;
    println!("{} {count} points to {}", "wrote".green().bold(), out.display());
    Ok(())
}
