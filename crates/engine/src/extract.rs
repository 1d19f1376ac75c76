//! LLM-backed text-to-graph extraction
//!
//! Each chunk goes to the chat upstream with a JSON-only prompt; the parsed
//! entities and relations are merged into the base graph (when updating) by
//! node and edge identity. When an embeddings upstream is configured, edge
//! atomic facts are embedded and attached under the `embeddings` property.
//!
//! A chunk whose output cannot be parsed is logged and skipped rather than
//! failing the whole build; upstream call failures (after the limiter's
//! retries) do fail it.

use async_trait::async_trait;
use chrono::Utc;
use kgraph_core::{
    EdgeRecord, Extractor, KgError, KgResult, KnowledgeGraph, NodeKey, NodeRecord, PropertyBag,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::{EmbeddingsClient, LlmClient};

const SYSTEM_PROMPT: &str = "You extract a knowledge graph from text. \
Respond with JSON only, no prose, in this shape: \
{\"entities\": [{\"label\": \"Person\", \"name\": \"Alice\", \"properties\": {}}], \
\"relations\": [{\"source\": {\"label\": \"Person\", \"name\": \"Alice\"}, \
\"target\": {\"label\": \"City\", \"name\": \"Paris\"}, \
\"predicate\": \"lives_in\", \"atomic_fact\": \"Alice lives in Paris.\"}]}. \
Use concise singular labels and snake_case predicates. \
Only extract what the text states.";

/// How many facts go into one embeddings request.
const EMBED_BATCH: usize = 64;

#[derive(Debug, Deserialize)]
struct RawRef {
    label: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    label: String,
    name: String,
    #[serde(default)]
    properties: PropertyBag,
}

#[derive(Debug, Deserialize)]
struct RawRelation {
    source: RawRef,
    target: RawRef,
    predicate: String,
    #[serde(default)]
    atomic_fact: Option<String>,
    #[serde(default)]
    properties: PropertyBag,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relations: Vec<RawRelation>,
}

/// Pull the JSON object out of a model reply that may carry code fences or
/// stray prose around it.
fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end >= start).then(|| &reply[start..=end])
}

/// The production extractor: one chat call per chunk, optional embeddings.
pub struct LlmExtractor {
    llm: LlmClient,
    embeddings: Option<EmbeddingsClient>,
    cancel: CancellationToken,
}

impl LlmExtractor {
    /// An extractor whose upstream calls abort when `cancel` fires.
    pub fn new(
        llm: LlmClient,
        embeddings: Option<EmbeddingsClient>,
        cancel: CancellationToken,
    ) -> Self {
        LlmExtractor {
            llm,
            embeddings,
            cancel,
        }
    }

    fn fold_chunk(&self, kg: &mut KnowledgeGraph, extraction: ChunkExtraction, observed_at: &str) {
        for entity in extraction.entities {
            kg.upsert_node(NodeRecord {
                entity_label: entity.label,
                name: entity.name,
                properties: entity.properties,
            });
        }
        for relation in extraction.relations {
            let source = NodeKey::new(relation.source.label, relation.source.name);
            let target = NodeKey::new(relation.target.label, relation.target.name);
            // Endpoints the model forgot to list still become nodes
            for key in [&source, &target] {
                kg.upsert_node(NodeRecord::new(key.entity_label.clone(), key.name.clone()));
            }
            let mut properties = relation.properties;
            properties.insert("t_obs".to_string(), json!(observed_at));
            if let Some(fact) = relation.atomic_fact {
                properties.insert("atomic_facts".to_string(), json!([fact]));
            }
            kg.upsert_edge(EdgeRecord {
                source,
                target,
                predicate: relation.predicate,
                properties,
            });
        }
    }

    async fn attach_embeddings(&self, kg: &mut KnowledgeGraph) -> KgResult<()> {
        let Some(client) = &self.embeddings else {
            return Ok(());
        };

        // Gather (edge index, fact) pairs for edges that carry facts
        let mut targets: Vec<(usize, String)> = Vec::new();
        for (i, edge) in kg.edges.iter().enumerate() {
            let fact = edge
                .properties
                .get("atomic_facts")
                .and_then(|v| v.as_array())
                .and_then(|facts| facts.first())
                .and_then(|f| f.as_str());
            if let Some(fact) = fact {
                targets.push((i, fact.to_string()));
            }
        }

        for batch in targets.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|(_, fact)| fact.clone()).collect();
            let vectors = client
                .embed(&texts, &self.cancel)
                .await
                .map_err(|e| KgError::Extraction(format!("embeddings: {e}")))?;
            for ((edge_index, _), vector) in batch.iter().zip(vectors) {
                kg.edges[*edge_index]
                    .properties
                    .insert("embeddings".to_string(), json!(vector));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn build(
        &self,
        chunks: &[String],
        base: Option<&KnowledgeGraph>,
    ) -> KgResult<KnowledgeGraph> {
        let observed_at = Utc::now().to_rfc3339();

        // Concurrency is governed by the limiter's in-flight cap; calls have
        // no inter-call ordering guarantee.
        let replies = futures::future::try_join_all(
            chunks
                .iter()
                .map(|chunk| self.llm.chat(SYSTEM_PROMPT, chunk, &self.cancel)),
        )
        .await
        .map_err(|e| KgError::Extraction(e.to_string()))?;

        let mut kg = base.cloned().unwrap_or_default();
        for (i, reply) in replies.iter().enumerate() {
            let parsed = extract_json(reply)
                .and_then(|raw| serde_json::from_str::<ChunkExtraction>(raw).ok());
            match parsed {
                Some(extraction) => {
                    debug!(
                        chunk = i,
                        entities = extraction.entities.len(),
                        relations = extraction.relations.len(),
                        "chunk extracted"
                    );
                    self.fold_chunk(&mut kg, extraction, &observed_at);
                }
                None => warn!(chunk = i, "unparseable extraction output, chunk skipped"),
            }
        }

        self.attach_embeddings(&mut kg).await?;
        Ok(kg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_found_inside_fences() {
        let reply = "```json\n{\"entities\": []}\n```";
        assert_eq!(extract_json(reply), Some("{\"entities\": []}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn chunk_extraction_tolerates_missing_fields() {
        let parsed: ChunkExtraction = serde_json::from_str("{}").unwrap();
        assert!(parsed.entities.is_empty());
        assert!(parsed.relations.is_empty());

        let parsed: ChunkExtraction = serde_json::from_str(
            r#"{"relations": [{"source": {"label": "A", "name": "a"},
                               "target": {"label": "B", "name": "b"},
                               "predicate": "rel"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.relations.len(), 1);
        assert!(parsed.relations[0].atomic_fact.is_none());
    }
}
