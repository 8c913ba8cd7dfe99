//! Neo4j backend over Bolt.

use crate::rows::{GraphRow, Property};
use crate::store::{proximity_relation, GraphStore, NearPair, HAS_FEATURE, LOCATED_ON};
use archaeograph_core::{GraphCredentials, ImportError, Layer};
use async_trait::async_trait;
use neo4rs::{query, BoltNull, BoltType, Graph, Query};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

pub struct Neo4jStore {
    graph: Mutex<Option<Graph>>,
    uri: String,
}

impl Neo4jStore {
    /// Connect and verify the connection with a trivial query.
    pub async fn connect(credentials: &GraphCredentials) -> Result<Self, ImportError> {
        let connect_err = |e: neo4rs::Error| ImportError::GraphConnect {
            uri: credentials.uri.clone(),
            message: e.to_string(),
        };
        let graph = Graph::new(
            credentials.uri.as_str(),
            credentials.user.as_str(),
            credentials.password.as_str(),
        )
        .await
        .map_err(connect_err)?;
        let mut stream = graph
            .execute(query("RETURN 1 AS ok"))
            .await
            .map_err(connect_err)?;
        while stream.next().await.map_err(connect_err)?.is_some() {}
        debug!(uri = %credentials.uri, "connected to graph store");

        Ok(Self {
            graph: Mutex::new(Some(graph)),
            uri: credentials.uri.clone(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn graph(&self) -> Result<Graph, ImportError> {
        self.graph
            .lock()
            .clone()
            .ok_or_else(|| ImportError::graph("connection already closed"))
    }

    /// Run one write query in its own transaction.
    async fn write(&self, q: Query) -> Result<(), ImportError> {
        let graph = self.graph()?;
        let mut txn = graph.start_txn().await.map_err(ImportError::graph)?;
        if let Err(e) = txn.run(q).await {
            if let Err(rollback) = txn.rollback().await {
                warn!(uri = %self.uri, error = %rollback, "transaction rollback failed");
            }
            return Err(ImportError::graph(e));
        }
        txn.commit().await.map_err(ImportError::graph)
    }
}

fn bolt(p: &Property) -> BoltType {
    match p {
        Property::Null => BoltType::Null(BoltNull),
        Property::Int(i) => BoltType::from(*i),
        Property::Float(f) => BoltType::from(*f),
        Property::Text(s) => BoltType::from(s.clone()),
        Property::FloatList(v) => BoltType::from(v.clone()),
    }
}

/// `{key, parent, props}` maps for `UNWIND`.
fn row_params(rows: &[GraphRow]) -> Vec<BoltType> {
    rows.iter()
        .map(|row| {
            let props: HashMap<String, BoltType> = row
                .props
                .iter()
                .map(|(k, v)| (k.clone(), bolt(v)))
                .collect();
            let mut map: HashMap<String, BoltType> = HashMap::new();
            map.insert("key".into(), BoltType::from(row.key.clone()));
            map.insert(
                "parent".into(),
                match &row.parent {
                    Some(p) => BoltType::from(p.clone()),
                    None => BoltType::Null(BoltNull),
                },
            );
            map.insert("props".into(), BoltType::from(props));
            BoltType::from(map)
        })
        .collect()
}

fn pair_params(pairs: &[NearPair]) -> Vec<BoltType> {
    pairs
        .iter()
        .map(|p| {
            let mut map: HashMap<String, BoltType> = HashMap::new();
            map.insert("from".into(), BoltType::from(p.from.clone()));
            map.insert("to".into(), BoltType::from(p.to.clone()));
            map.insert("distance".into(), BoltType::from(p.distance));
            BoltType::from(map)
        })
        .collect()
}

fn constraint_cypher(layer: Layer) -> String {
    format!(
        "CREATE CONSTRAINT {name}_key IF NOT EXISTS FOR (n:{label}) REQUIRE n.{key} IS UNIQUE",
        name = layer.node_label().to_lowercase(),
        label = layer.node_label(),
        key = layer.schema().key,
    )
}

fn upsert_sites_cypher() -> String {
    let label = Layer::Sites.node_label();
    let key = Layer::Sites.schema().key;
    format!(
        "UNWIND $rows AS row
         MERGE (s:{label} {{{key}: row.key}})
         SET s += row.props"
    )
}

fn upsert_features_cypher() -> String {
    let site = Layer::Sites.node_label();
    let site_key = Layer::Sites.schema().key;
    let feature = Layer::Features.node_label();
    let feature_key = Layer::Features.schema().key;
    format!(
        "UNWIND $rows AS row
         MATCH (s:{site} {{{site_key}: row.parent}})
         MERGE (f:{feature} {{{feature_key}: row.key}})
         SET f += row.props
         MERGE (s)-[:{HAS_FEATURE}]->(f)
         MERGE (f)-[:{LOCATED_ON}]->(s)"
    )
}

fn link_nearby_cypher(layer: Layer) -> String {
    format!(
        "UNWIND $pairs AS p
         MATCH (a:{label} {{{key}: p.from}}), (b:{label} {{{key}: p.to}})
         MERGE (a)-[r:{rel}]->(b)
         SET r.distance = p.distance",
        label = layer.node_label(),
        key = layer.schema().key,
        rel = proximity_relation(layer),
    )
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn ensure_constraints(&self) -> Result<(), ImportError> {
        let graph = self.graph()?;
        for layer in Layer::ALL {
            graph
                .run(query(&constraint_cypher(layer)))
                .await
                .map_err(ImportError::graph)?;
        }
        Ok(())
    }

    async fn upsert_sites(&self, rows: &[GraphRow]) -> Result<(), ImportError> {
        let q = query(&upsert_sites_cypher()).param("rows", row_params(rows));
        self.write(q).await
    }

    async fn existing_sites(&self, keys: &[String]) -> Result<HashSet<String>, ImportError> {
        let graph = self.graph()?;
        let q = query("MATCH (s:Site) WHERE s.SiteID IN $keys RETURN s.SiteID AS id")
            .param("keys", keys.to_vec());
        let mut stream = graph.execute(q).await.map_err(ImportError::graph)?;
        let mut found = HashSet::new();
        while let Some(row) = stream.next().await.map_err(ImportError::graph)? {
            found.insert(row.get::<String>("id").map_err(ImportError::graph)?);
        }
        Ok(found)
    }

    async fn upsert_features(&self, rows: &[GraphRow]) -> Result<(), ImportError> {
        let q = query(&upsert_features_cypher()).param("rows", row_params(rows));
        self.write(q).await
    }

    async fn link_nearby(&self, layer: Layer, pairs: &[NearPair]) -> Result<(), ImportError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let q = query(&link_nearby_cypher(layer)).param("pairs", pair_params(pairs));
        self.write(q).await
    }

    async fn node_count(&self) -> Result<u64, ImportError> {
        let graph = self.graph()?;
        let mut stream = graph
            .execute(query("MATCH (n) RETURN count(n) AS n"))
            .await
            .map_err(ImportError::graph)?;
        let mut count = 0u64;
        if let Some(row) = stream.next().await.map_err(ImportError::graph)? {
            count = row.get::<i64>("n").map_err(ImportError::graph)? as u64;
        }
        Ok(count)
    }

    /// Drops the connection pool; later calls fail with a graph error.
    async fn close(&self) -> Result<(), ImportError> {
        self.graph.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo4rs::BoltString;

    fn field<'a>(value: &'a BoltType, name: &str) -> &'a BoltType {
        match value {
            BoltType::Map(map) => map
                .value
                .get(&BoltString::from(name))
                .unwrap_or_else(|| panic!("missing field {name}")),
            other => panic!("expected a map, got {other:?}"),
        }
    }

    fn text(value: &BoltType) -> &str {
        match value {
            BoltType::String(s) => &s.value,
            other => panic!("expected a string, got {other:?}"),
        }
    }

    #[test]
    fn row_params_carry_key_parent_and_typed_props() {
        let rows = vec![
            GraphRow {
                key: "F1".into(),
                parent: Some("S1".into()),
                props: vec![
                    ("Length".into(), Property::Int(3)),
                    ("Lon".into(), Property::Float(32.5)),
                    ("Notes".into(), Property::Null),
                    ("embedding".into(), Property::FloatList(vec![0.5, 0.25])),
                ],
            },
            GraphRow {
                key: "S9".into(),
                parent: None,
                props: vec![("Category".into(), Property::Text("cemetery".into()))],
            },
        ];
        let params = row_params(&rows);
        assert_eq!(params.len(), 2);

        assert_eq!(text(field(&params[0], "key")), "F1");
        assert_eq!(text(field(&params[0], "parent")), "S1");
        let props = field(&params[0], "props");
        assert!(matches!(field(props, "Length"), BoltType::Integer(i) if i.value == 3));
        assert!(matches!(field(props, "Lon"), BoltType::Float(f) if f.value == 32.5));
        assert!(matches!(field(props, "Notes"), BoltType::Null(_)));
        assert!(matches!(field(props, "embedding"), BoltType::List(l) if l.value.len() == 2));

        assert!(matches!(field(&params[1], "parent"), BoltType::Null(_)));
        assert_eq!(text(field(field(&params[1], "props"), "Category")), "cemetery");
    }

    #[test]
    fn pair_params_keep_endpoints_and_distance() {
        let params = pair_params(&[NearPair {
            from: "S1".into(),
            to: "S2".into(),
            distance: 50.0,
        }]);
        assert_eq!(text(field(&params[0], "from")), "S1");
        assert_eq!(text(field(&params[0], "to")), "S2");
        assert!(matches!(field(&params[0], "distance"), BoltType::Float(f) if f.value == 50.0));
    }

    #[test]
    fn constraints_are_idempotent_per_label() {
        let sites = constraint_cypher(Layer::Sites);
        assert!(sites.starts_with("CREATE CONSTRAINT site_key IF NOT EXISTS"));
        assert!(sites.ends_with("FOR (n:Site) REQUIRE n.SiteID IS UNIQUE"));
        let features = constraint_cypher(Layer::Features);
        assert!(features.contains("feature_key IF NOT EXISTS"));
        assert!(features.contains("REQUIRE n.FeatureID IS UNIQUE"));
    }

    #[test]
    fn upserts_merge_by_key_and_link_both_directions() {
        let sites = upsert_sites_cypher();
        assert!(sites.contains("MERGE (s:Site {SiteID: row.key})"));
        assert!(sites.contains("SET s += row.props"));

        let features = upsert_features_cypher();
        assert!(features.contains("MATCH (s:Site {SiteID: row.parent})"));
        assert!(features.contains("MERGE (f:Feature {FeatureID: row.key})"));
        assert!(features.contains("MERGE (s)-[:HAS_FEATURE]->(f)"));
        assert!(features.contains("MERGE (f)-[:LOCATED_ON]->(s)"));
    }

    #[test]
    fn proximity_links_use_the_layer_relation() {
        let cypher = link_nearby_cypher(Layer::Features);
        assert!(cypher.contains("(a:Feature {FeatureID: p.from})"));
        assert!(cypher.contains("(b:Feature {FeatureID: p.to})"));
        assert!(cypher.contains("MERGE (a)-[r:CLOSE_TO_FEATURE]->(b)"));
        assert!(link_nearby_cypher(Layer::Sites).contains("CLOSE_TO_SITE"));
    }
}
