//! Terminal progress bars for the enrichment and graph stages.

use archaeograph_core::Layer;
use archaeograph_embed::EnrichProgress;
use archaeograph_graph::Phase;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:>8.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn new_bar(multi: &MultiProgress, prefix: &str, len: u64) -> ProgressBar {
    let bar = multi.add(ProgressBar::new(len));
    bar.set_style(bar_style());
    bar.set_prefix(prefix.to_string());
    bar
}

/// One bar per staged table, created when the enricher reaches it.
pub struct EnrichBars {
    multi: MultiProgress,
    current: Option<(Layer, ProgressBar)>,
}

impl EnrichBars {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current: None,
        }
    }

    pub fn update(&mut self, p: &EnrichProgress) {
        if self.current.as_ref().map(|(layer, _)| *layer) != Some(p.layer) {
            if let Some((_, bar)) = self.current.take() {
                bar.finish();
            }
            let prefix = p.layer.table_name().to_lowercase();
            self.current = Some((p.layer, new_bar(&self.multi, &prefix, p.total as u64)));
        }
        if let Some((_, bar)) = &self.current {
            bar.set_position(p.processed as u64);
            match p.eta {
                Some(eta) => bar.set_message(format!("eta {}s", eta.as_secs())),
                None => bar.set_message(""),
            }
        }
    }

    pub fn finish(mut self) {
        if let Some((_, bar)) = self.current.take() {
            bar.finish();
        }
    }
}

/// Sites and Features bars for the graph loader.
pub struct LoadBars {
    sites: ProgressBar,
    feats: ProgressBar,
    _multi: MultiProgress,
}

impl LoadBars {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        Self {
            sites: new_bar(&multi, "sites", 0),
            feats: new_bar(&multi, "feats", 0),
            _multi: multi,
        }
    }

    pub fn update(&self, phase: Phase, processed: u64, total: u64) {
        let bar = match phase {
            Phase::Sites => &self.sites,
            Phase::Feats => &self.feats,
        };
        bar.set_length(total);
        bar.set_position(processed);
        if processed >= total {
            bar.finish();
        }
    }

    pub fn finish(self) {
        self.sites.finish();
        self.feats.finish();
    }
}
