//! Deterministic extraction for tests and demos
//!
//! [`SentenceExtractor`] turns simple subject–predicate–object sentences
//! into graph records without any upstream calls: `"Alice knows Bob."`
//! becomes two `Entity` nodes and one `knows` edge. Good enough to exercise
//! every pipeline path end to end.

use async_trait::async_trait;
use chrono::Utc;
use kgraph_core::{
    EdgeRecord, Extractor, KgResult, KnowledgeGraph, NodeKey, NodeRecord,
};
use serde_json::json;

/// Entity label used for every extracted node.
const LABEL: &str = "Entity";

/// Parses `"Subject predicate words Object."` sentences.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceExtractor;

fn is_name(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_uppercase())
}

fn parse_sentence(sentence: &str) -> Option<(String, String, String)> {
    let tokens: Vec<&str> = sentence
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() < 3 {
        return None;
    }
    let subject = tokens.first().filter(|t| is_name(t))?;
    let object = tokens.last().filter(|t| is_name(t))?;
    let predicate = tokens[1..tokens.len() - 1]
        .iter()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join("_");
    if predicate.is_empty() {
        return None;
    }
    Some((subject.to_string(), predicate, object.to_string()))
}

#[async_trait]
impl Extractor for SentenceExtractor {
    async fn build(
        &self,
        chunks: &[String],
        base: Option<&KnowledgeGraph>,
    ) -> KgResult<KnowledgeGraph> {
        let observed_at = Utc::now().to_rfc3339();
        let mut kg = base.cloned().unwrap_or_default();
        for chunk in chunks {
            for sentence in chunk.split('.') {
                let Some((subject, predicate, object)) = parse_sentence(sentence) else {
                    continue;
                };
                kg.upsert_node(NodeRecord::new(LABEL, subject.clone()));
                kg.upsert_node(NodeRecord::new(LABEL, object.clone()));
                let mut edge = EdgeRecord::new(
                    NodeKey::new(LABEL, subject),
                    NodeKey::new(LABEL, object),
                    predicate,
                );
                edge.properties
                    .insert("t_obs".to_string(), json!(observed_at));
                edge.properties.insert(
                    "atomic_facts".to_string(),
                    json!([format!("{}.", sentence.trim())]),
                );
                kg.upsert_edge(edge);
            }
        }
        Ok(kg)
    }
}
