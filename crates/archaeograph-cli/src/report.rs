//! Human-readable stage summaries.

use archaeograph_core::Layer;
use archaeograph_embed::{EnrichReport, LayerEnrichReport};
use archaeograph_graph::LoadReport;
use archaeograph_staging::{CleaningReport, DropReason};
use colored::Colorize;

const MAX_LISTED_DROPS: usize = 20;

fn reason_label(reason: DropReason) -> &'static str {
    match reason {
        DropReason::MissingCoordinates => "no X/Y",
        DropReason::MissingKey => "no key",
        DropReason::DuplicateKey => "duplicate",
        DropReason::Orphan => "orphan",
    }
}

pub fn print_cleaning(report: &CleaningReport) {
    let s = &report.stats;
    println!("{} (source CRS {})", "cleaning".bold(), report.source_crs);
    println!(
        "  {:<10} {:>7} {:>7} {:>7} {:>7} {:>9} {:>7}",
        "layer", "total", "valid", "no X/Y", "no key", "duplicate", "orphan"
    );
    println!(
        "  {:<10} {:>7} {:>7} {:>7} {:>7} {:>9} {:>7}",
        "Sites",
        s.sites_total,
        s.sites_valid.to_string().green(),
        s.dropped_sites_xy,
        s.dropped_sites_nokey,
        s.dropped_sites_dup,
        "-"
    );
    println!(
        "  {:<10} {:>7} {:>7} {:>7} {:>7} {:>9} {:>7}",
        "Features",
        s.feats_total,
        s.feats_valid.to_string().green(),
        s.dropped_feats_xy,
        s.dropped_feats_nokey,
        s.dropped_feats_dup,
        s.dropped_feats_orphan
    );

    if report.dropped.is_empty() {
        return;
    }
    println!("{}", "dropped rows".yellow().bold());
    for row in report.dropped.iter().take(MAX_LISTED_DROPS) {
        let key = row.key.as_deref().unwrap_or("(none)");
        match (&row.parent, row.layer) {
            (Some(parent), Layer::Features) => println!(
                "  {:<9} {:<10} {key} -> {parent}",
                row.layer.table_name(),
                reason_label(row.reason)
            ),
            _ => println!(
                "  {:<9} {:<10} {key} (row {})",
                row.layer.table_name(),
                reason_label(row.reason),
                row.source_row + 1
            ),
        }
    }
    if report.dropped.len() > MAX_LISTED_DROPS {
        println!("  ... and {} more", report.dropped.len() - MAX_LISTED_DROPS);
    }
}

fn enrich_line(name: &str, r: &LayerEnrichReport) {
    println!(
        "  {name:<10} rows {:>6}  embedded before {:>6}  cache hits {:>6}  service calls {:>6}  no text {:>4}",
        r.rows, r.already_embedded, r.cache_hits, r.service_calls, r.skipped_empty
    );
}

pub fn print_enrichment(report: &EnrichReport) {
    println!("{} (model {})", "enrichment".bold(), report.model);
    enrich_line("Sites", &report.sites);
    enrich_line("Features", &report.features);
}

pub fn print_load(report: &LoadReport) {
    println!("{}", "graph load".bold());
    println!("  sites loaded       {}", report.sites_loaded.to_string().green());
    println!("  features loaded    {}", report.features_loaded.to_string().green());
    if report.features_orphaned > 0 {
        println!("  features orphaned  {}", report.features_orphaned.to_string().yellow());
    }
    if report.rows_without_key > 0 {
        println!("  rows without key   {}", report.rows_without_key.to_string().yellow());
    }
    println!("  batches committed  {}", report.batches_committed);
    if report.proximity_edges > 0 {
        println!("  proximity edges    {}", report.proximity_edges);
    }
}
