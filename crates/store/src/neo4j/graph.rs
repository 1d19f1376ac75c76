//! Versioned graph store over Neo4j
//!
//! All data lives under one `KGNode` label and one `KG_REL` relationship
//! type; `kg_version` appears in every MERGE key and every read filter.
//! Writes are UNWIND-batched so one round trip carries a whole extraction
//! batch.

use async_trait::async_trait;
use kgraph_core::{
    EdgeRecord, EdgeView, GraphSlice, GraphStats, GraphStore, KgError, KgResult, NodeRecord,
    NodeView, Version,
};
use neo4rs::{query, BoltList, BoltMap, BoltType, Row};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::{bag_to_bolt, limit_param, props_to_bag, store_err, Neo4jStore};

/// Keys every node carries besides its user property bag.
const NODE_KEYS: &[&str] = &["kg_version", "entity_label", "name"];
/// Keys every relationship carries besides its user property bag.
const EDGE_KEYS: &[&str] = &["kg_version", "predicate"];

const UPSERT_NODES: &str = "
UNWIND $rows AS row
MERGE (n:KGNode {kg_version: $version, entity_label: row.entity_label, name: row.name})
SET n += row.props
";

const UPSERT_EDGES: &str = "
UNWIND $rows AS row
MATCH (a:KGNode {kg_version: $version, entity_label: row.source_label, name: row.source_name})
MATCH (b:KGNode {kg_version: $version, entity_label: row.target_label, name: row.target_name})
MERGE (a)-[r:KG_REL {kg_version: $version, predicate: row.predicate}]->(b)
SET r += row.props
";

const DELETE_VERSION: &str = "
MATCH (n:KGNode {kg_version: $version})
DETACH DELETE n
RETURN count(n) AS deleted
";

const ENTITY_TYPES: &str = "
MATCH (n:KGNode {kg_version: $version})
RETURN DISTINCT n.entity_label AS label
ORDER BY label
";

const RELATION_TYPES: &str = "
MATCH ()-[r:KG_REL {kg_version: $version}]->()
RETURN DISTINCT r.predicate AS predicate
ORDER BY predicate
";

const STATS: &str = "
MATCH (n:KGNode {kg_version: $version})
WITH count(n) AS entity_count, count(DISTINCT n.entity_label) AS node_type_count
OPTIONAL MATCH ()-[r:KG_REL {kg_version: $version}]->()
RETURN entity_count, node_type_count, count(r) AS relation_count
";

const FULL_GRAPH_NODES: &str = "
MATCH (n:KGNode {kg_version: $version})
RETURN id(n) AS id, n.entity_label AS entity_label, n.name AS name,
       properties(n) AS props
ORDER BY id(n)
LIMIT $limit
";

const FULL_GRAPH_EDGES: &str = "
MATCH (a:KGNode {kg_version: $version})-[r:KG_REL {kg_version: $version}]->(b:KGNode {kg_version: $version})
RETURN id(r) AS id, r.predicate AS predicate, id(a) AS source, id(b) AS target,
       properties(r) AS props
ORDER BY id(r)
LIMIT $limit
";

const SUBGRAPH_SEEDS: &str = "
MATCH (n:KGNode {kg_version: $version})
WHERE n.name CONTAINS $query
RETURN id(n) AS id, n.entity_label AS entity_label, n.name AS name,
       properties(n) AS props
ORDER BY id(n)
LIMIT $limit
";

const SUBGRAPH_HOP: &str = "
MATCH (a:KGNode {kg_version: $version})-[r:KG_REL {kg_version: $version}]-(b:KGNode {kg_version: $version})
WHERE id(a) IN $frontier
RETURN id(r) AS rid, r.predicate AS predicate,
       id(startNode(r)) AS source, id(endNode(r)) AS target,
       properties(r) AS rprops,
       id(b) AS bid, b.entity_label AS blabel, b.name AS bname,
       properties(b) AS bprops
ORDER BY id(r)
";

fn col<T: serde::de::DeserializeOwned>(row: &Row, key: &str) -> KgResult<T> {
    row.get(key).map_err(|e| KgError::Store(e.to_string()))
}

fn node_rows_param(nodes: &[NodeRecord]) -> BoltType {
    let mut rows = BoltList::default();
    for node in nodes {
        let mut row = BoltMap::default();
        row.put("entity_label".into(), BoltType::from(node.entity_label.as_str()));
        row.put("name".into(), BoltType::from(node.name.as_str()));
        row.put("props".into(), bag_to_bolt(&node.properties));
        rows.push(BoltType::Map(row));
    }
    BoltType::List(rows)
}

fn edge_rows_param(edges: &[EdgeRecord]) -> BoltType {
    let mut rows = BoltList::default();
    for edge in edges {
        let mut row = BoltMap::default();
        row.put("source_label".into(), BoltType::from(edge.source.entity_label.as_str()));
        row.put("source_name".into(), BoltType::from(edge.source.name.as_str()));
        row.put("target_label".into(), BoltType::from(edge.target.entity_label.as_str()));
        row.put("target_name".into(), BoltType::from(edge.target.name.as_str()));
        row.put("predicate".into(), BoltType::from(edge.predicate.as_str()));
        row.put("props".into(), bag_to_bolt(&edge.properties));
        rows.push(BoltType::Map(row));
    }
    BoltType::List(rows)
}

fn ids_param(ids: &[i64]) -> BoltType {
    let mut list = BoltList::default();
    for id in ids {
        list.push(BoltType::from(*id));
    }
    BoltType::List(list)
}

fn node_from_row(row: &Row) -> KgResult<(i64, NodeView)> {
    let id: i64 = col(row, "id")?;
    let entity_label: String = col(row, "entity_label")?;
    let name: Option<String> = col(row, "name")?;
    let props: Value = col(row, "props")?;
    Ok((
        id,
        NodeView {
            id: id.to_string(),
            labels: vec![entity_label],
            name,
            properties: Some(props_to_bag(props, NODE_KEYS)),
        },
    ))
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn upsert_nodes(&self, version: &Version, nodes: &[NodeRecord]) -> KgResult<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        self.graph()
            .run(
                query(UPSERT_NODES)
                    .param("version", version.as_str())
                    .param("rows", node_rows_param(nodes)),
            )
            .await
            .map_err(store_err)
    }

    async fn upsert_edges(&self, version: &Version, edges: &[EdgeRecord]) -> KgResult<()> {
        if edges.is_empty() {
            return Ok(());
        }
        self.graph()
            .run(
                query(UPSERT_EDGES)
                    .param("version", version.as_str())
                    .param("rows", edge_rows_param(edges)),
            )
            .await
            .map_err(store_err)
    }

    async fn delete_version(&self, version: &Version) -> KgResult<u64> {
        let mut rows = self
            .graph()
            .execute(query(DELETE_VERSION).param("version", version.as_str()))
            .await
            .map_err(store_err)?;
        match rows.next().await.map_err(store_err)? {
            Some(row) => {
                let deleted: i64 = col(&row, "deleted")?;
                Ok(deleted.max(0) as u64)
            }
            None => Ok(0),
        }
    }

    async fn entity_types(&self, version: &Version) -> KgResult<Vec<String>> {
        let mut rows = self
            .graph()
            .execute(query(ENTITY_TYPES).param("version", version.as_str()))
            .await
            .map_err(store_err)?;
        let mut labels = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            labels.push(col::<String>(&row, "label")?);
        }
        Ok(labels)
    }

    async fn relation_types(&self, version: &Version) -> KgResult<Vec<String>> {
        let mut rows = self
            .graph()
            .execute(query(RELATION_TYPES).param("version", version.as_str()))
            .await
            .map_err(store_err)?;
        let mut predicates = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            predicates.push(col::<String>(&row, "predicate")?);
        }
        Ok(predicates)
    }

    async fn stats(&self, version: &Version) -> KgResult<GraphStats> {
        let mut rows = self
            .graph()
            .execute(query(STATS).param("version", version.as_str()))
            .await
            .map_err(store_err)?;
        match rows.next().await.map_err(store_err)? {
            Some(row) => Ok(GraphStats {
                entity_count: col::<i64>(&row, "entity_count")?.max(0) as u64,
                relation_count: col::<i64>(&row, "relation_count")?.max(0) as u64,
                node_type_count: col::<i64>(&row, "node_type_count")?.max(0) as u64,
            }),
            None => Ok(GraphStats::default()),
        }
    }

    async fn full_graph(
        &self,
        version: &Version,
        limit_nodes: usize,
        limit_edges: usize,
    ) -> KgResult<GraphSlice> {
        let mut node_rows = self
            .graph()
            .execute(
                query(FULL_GRAPH_NODES)
                    .param("version", version.as_str())
                    .param("limit", limit_param(limit_nodes)),
            )
            .await
            .map_err(store_err)?;

        let mut nodes = Vec::new();
        let mut kept: HashSet<i64> = HashSet::new();
        let mut truncated = false;
        while let Some(row) = node_rows.next().await.map_err(store_err)? {
            if nodes.len() == limit_nodes {
                truncated = true;
                break;
            }
            let (id, view) = node_from_row(&row)?;
            kept.insert(id);
            nodes.push(view);
        }

        let mut edge_rows = self
            .graph()
            .execute(
                query(FULL_GRAPH_EDGES)
                    .param("version", version.as_str())
                    .param("limit", limit_param(limit_edges)),
            )
            .await
            .map_err(store_err)?;

        let mut edges = Vec::new();
        while let Some(row) = edge_rows.next().await.map_err(store_err)? {
            if edges.len() == limit_edges {
                truncated = true;
                break;
            }
            let source: i64 = col(&row, "source")?;
            let target: i64 = col(&row, "target")?;
            // Drop edges whose endpoints fell past the node truncation point
            if !kept.contains(&source) || !kept.contains(&target) {
                continue;
            }
            let id: i64 = col(&row, "id")?;
            let props: Value = col(&row, "props")?;
            edges.push(EdgeView {
                id: id.to_string(),
                predicate: col(&row, "predicate")?,
                source: source.to_string(),
                target: target.to_string(),
                properties: Some(props_to_bag(props, EDGE_KEYS)),
            });
        }

        Ok(GraphSlice {
            nodes,
            edges,
            truncated,
        })
    }

    async fn subgraph(
        &self,
        version: &Version,
        keyword: &str,
        depth: usize,
        limit_nodes: usize,
        limit_edges: usize,
    ) -> KgResult<GraphSlice> {
        let mut seed_rows = self
            .graph()
            .execute(
                query(SUBGRAPH_SEEDS)
                    .param("version", version.as_str())
                    .param("query", keyword)
                    .param("limit", limit_param(limit_nodes)),
            )
            .await
            .map_err(store_err)?;

        let mut nodes: Vec<NodeView> = Vec::new();
        let mut node_ids: HashSet<i64> = HashSet::new();
        let mut truncated = false;
        let mut frontier: Vec<i64> = Vec::new();

        while let Some(row) = seed_rows.next().await.map_err(store_err)? {
            if nodes.len() == limit_nodes {
                truncated = true;
                break;
            }
            let (id, view) = node_from_row(&row)?;
            node_ids.insert(id);
            frontier.push(id);
            nodes.push(view);
        }
        if nodes.is_empty() {
            return Ok(GraphSlice::default());
        }

        let mut edges: Vec<EdgeView> = Vec::new();
        let mut edge_ids: HashSet<i64> = HashSet::new();
        'expand: for _hop in 0..depth {
            if truncated || frontier.is_empty() {
                break;
            }
            let mut hop_rows = self
                .graph()
                .execute(
                    query(SUBGRAPH_HOP)
                        .param("version", version.as_str())
                        .param("frontier", ids_param(&frontier)),
                )
                .await
                .map_err(store_err)?;
            frontier = Vec::new();

            let mut neighbor_views: HashMap<i64, NodeView> = HashMap::new();
            let mut hop_edges: Vec<(i64, i64, i64, String, Value)> = Vec::new();
            while let Some(row) = hop_rows.next().await.map_err(store_err)? {
                let bid: i64 = col(&row, "bid")?;
                if !node_ids.contains(&bid) && !neighbor_views.contains_key(&bid) {
                    let blabel: String = col(&row, "blabel")?;
                    let bname: Option<String> = col(&row, "bname")?;
                    let bprops: Value = col(&row, "bprops")?;
                    neighbor_views.insert(
                        bid,
                        NodeView {
                            id: bid.to_string(),
                            labels: vec![blabel],
                            name: bname,
                            properties: Some(props_to_bag(bprops, NODE_KEYS)),
                        },
                    );
                }
                let rid: i64 = col(&row, "rid")?;
                if !edge_ids.contains(&rid) {
                    hop_edges.push((
                        rid,
                        col(&row, "source")?,
                        col(&row, "target")?,
                        col(&row, "predicate")?,
                        col(&row, "rprops")?,
                    ));
                    edge_ids.insert(rid);
                }
            }

            for (bid, view) in neighbor_views {
                if nodes.len() == limit_nodes {
                    truncated = true;
                    break 'expand;
                }
                node_ids.insert(bid);
                frontier.push(bid);
                nodes.push(view);
            }
            for (rid, source, target, predicate, props) in hop_edges {
                if !node_ids.contains(&source) || !node_ids.contains(&target) {
                    continue;
                }
                if edges.len() == limit_edges {
                    truncated = true;
                    break 'expand;
                }
                edges.push(EdgeView {
                    id: rid.to_string(),
                    predicate,
                    source: source.to_string(),
                    target: target.to_string(),
                    properties: Some(props_to_bag(props, EDGE_KEYS)),
                });
            }
        }

        Ok(GraphSlice {
            nodes,
            edges,
            truncated,
        })
    }
}
