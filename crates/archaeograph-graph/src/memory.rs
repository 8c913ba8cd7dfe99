//! In-process graph backend with the same merge semantics as the Cypher
//! queries. Used for dry runs and tests.

use crate::rows::{GraphRow, Property};
use crate::store::{proximity_relation, GraphStore, NearPair, Phase, HAS_FEATURE, LOCATED_ON};
use archaeograph_core::{ImportError, Layer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

pub type Properties = BTreeMap<String, Property>;

#[derive(Debug, Default)]
struct State {
    sites: BTreeMap<String, Properties>,
    features: BTreeMap<String, Properties>,
    /// `(relation, from, to)`
    edges: BTreeSet<(String, String, String)>,
    constraints: BTreeSet<String>,
    upserts: BTreeMap<Phase, usize>,
    fail_on: Option<(Phase, usize)>,
    close_calls: usize,
}

/// Cloneable handle; clones share one graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    state: Arc<Mutex<State>>,
}

/// `SET n += props`: null values remove the property.
fn merge_props(target: &mut Properties, row: &GraphRow) {
    for (k, v) in &row.props {
        if v.is_null() {
            target.remove(k);
        } else {
            target.insert(k.clone(), v.clone());
        }
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th (1-based) upsert call of `phase` fail without writing.
    pub fn fail_batch(&self, phase: Phase, n: usize) {
        self.state.lock().fail_on = Some((phase, n));
    }

    pub fn site(&self, key: &str) -> Option<Properties> {
        self.state.lock().sites.get(key).cloned()
    }

    pub fn feature(&self, key: &str) -> Option<Properties> {
        self.state.lock().features.get(key).cloned()
    }

    pub fn site_count(&self) -> usize {
        self.state.lock().sites.len()
    }

    pub fn feature_count(&self) -> usize {
        self.state.lock().features.len()
    }

    pub fn edge_count(&self, relation: &str) -> usize {
        self.state
            .lock()
            .edges
            .iter()
            .filter(|(r, _, _)| r == relation)
            .count()
    }

    pub fn has_edge(&self, relation: &str, from: &str, to: &str) -> bool {
        self.state
            .lock()
            .edges
            .contains(&(relation.to_string(), from.to_string(), to.to_string()))
    }

    pub fn constraint_count(&self) -> usize {
        self.state.lock().constraints.len()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    fn check_failure(state: &mut State, phase: Phase) -> Result<(), ImportError> {
        let n = state.upserts.entry(phase).or_default();
        *n += 1;
        if state.fail_on == Some((phase, *n)) {
            return Err(ImportError::graph(format!(
                "injected failure on {phase} upsert {n}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn ensure_constraints(&self) -> Result<(), ImportError> {
        let mut state = self.state.lock();
        for layer in Layer::ALL {
            state
                .constraints
                .insert(format!("{}.{}", layer.node_label(), layer.schema().key));
        }
        Ok(())
    }

    async fn upsert_sites(&self, rows: &[GraphRow]) -> Result<(), ImportError> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state, Phase::Sites)?;
        for row in rows {
            merge_props(state.sites.entry(row.key.clone()).or_default(), row);
        }
        Ok(())
    }

    async fn existing_sites(&self, keys: &[String]) -> Result<HashSet<String>, ImportError> {
        let state = self.state.lock();
        Ok(keys
            .iter()
            .filter(|k| state.sites.contains_key(*k))
            .cloned()
            .collect())
    }

    async fn upsert_features(&self, rows: &[GraphRow]) -> Result<(), ImportError> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state, Phase::Feats)?;
        for row in rows {
            // MATCH on the parent: rows without one are not written.
            let Some(parent) = row.parent.as_ref().filter(|p| state.sites.contains_key(*p)) else {
                continue;
            };
            let parent = parent.clone();
            merge_props(state.features.entry(row.key.clone()).or_default(), row);
            state
                .edges
                .insert((HAS_FEATURE.to_string(), parent.clone(), row.key.clone()));
            state
                .edges
                .insert((LOCATED_ON.to_string(), row.key.clone(), parent));
        }
        Ok(())
    }

    async fn link_nearby(&self, layer: Layer, pairs: &[NearPair]) -> Result<(), ImportError> {
        let mut state = self.state.lock();
        let relation = proximity_relation(layer);
        for pair in pairs {
            let nodes = match layer {
                Layer::Sites => &state.sites,
                Layer::Features => &state.features,
            };
            if nodes.contains_key(&pair.from) && nodes.contains_key(&pair.to) {
                state
                    .edges
                    .insert((relation.to_string(), pair.from.clone(), pair.to.clone()));
            }
        }
        Ok(())
    }

    async fn node_count(&self) -> Result<u64, ImportError> {
        let state = self.state.lock();
        Ok((state.sites.len() + state.features.len()) as u64)
    }

    async fn close(&self) -> Result<(), ImportError> {
        self.state.lock().close_calls += 1;
        Ok(())
    }
}
