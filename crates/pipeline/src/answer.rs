//! Retrieval and answer pipeline
//!
//! Synchronous per query: embed the question, pull the nearest
//! documents, rerank, enrich from the graph, distill facts, assemble
//! the prompt, and generate. Rerank and enrichment degrade gracefully;
//! embedding and completion failures are the query's errors.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use sniprag_core::{relation, NodeCategory};
use sniprag_db::{DocumentStore, GraphDocContext, GraphStore, VectorHit};

use crate::inference::{CompletionClient, EmbeddingClient, RerankClient, RerankResult};
use crate::{Result, Settings};

/// Width parameters for one query
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Vector-search width
    pub k: usize,
    /// Final answer-set width
    pub top_k: usize,
    /// Include full document texts in the generation prompt
    pub include_text: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            k: 5,
            top_k: 3,
            include_text: false,
        }
    }
}

/// A distilled fact: the rendered sentence with its numeric confidence
/// carried alongside, never re-parsed out of the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub sentence: String,
    pub confidence: f32,
}

/// The complete result of a query: the generated answer plus the prompt
/// that produced it and the evidence that went into the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerBundle {
    pub answer: String,
    pub prompt: String,
    pub facts: Vec<Fact>,
    pub entities: BTreeMap<String, Vec<String>>,
}

/// A hit after reranking
#[derive(Debug, Clone)]
struct RankedHit {
    hit: VectorHit,
    relevance_score: Option<f32>,
}

/// A relation ready for fact rendering
#[derive(Debug, Clone)]
struct HitRelation {
    subject: String,
    label: String,
    object: String,
    confidence: f32,
}

/// A hit after graph enrichment
#[derive(Debug, Clone)]
struct EnrichedHit {
    title: Option<String>,
    snippet: String,
    /// (category, name) pairs
    entities: Vec<(String, String)>,
    relations: Vec<HitRelation>,
}

/// The retrieval and answer pipeline
pub struct AnswerPipeline {
    docs: DocumentStore,
    graph: GraphStore,
    embeddings: EmbeddingClient,
    rerank: RerankClient,
    completions: CompletionClient,
    fact_confidence_threshold: f32,
    max_facts: usize,
}

impl AnswerPipeline {
    pub fn new(
        docs: DocumentStore,
        graph: GraphStore,
        embeddings: EmbeddingClient,
        rerank: RerankClient,
        completions: CompletionClient,
        settings: &Settings,
    ) -> Self {
        Self {
            docs,
            graph,
            embeddings,
            rerank,
            completions,
            fact_confidence_threshold: settings.fact_confidence_threshold,
            max_facts: settings.max_facts,
        }
    }

    /// Answer a free-text question against the stored knowledge.
    #[instrument(skip(self))]
    pub async fn answer(&self, question: &str, opts: &QueryOptions) -> Result<AnswerBundle> {
        let query_vector = self.embeddings.embed_one(question).await?;

        let hits = self.docs.knn_search(&query_vector, opts.k).await?;
        info!("Vector search returned {} hits", hits.len());

        let ranked = self.rerank_hits(question, hits, opts.top_k).await;
        let enriched = self.enrich(ranked).await;

        let facts = distill_facts(&enriched, self.fact_confidence_threshold, self.max_facts);
        let entities = collect_entities(&enriched);
        let prompt = build_prompt(question, &enriched, &facts, &entities, opts.include_text);

        let answer = self.completions.complete(&prompt).await?;

        Ok(AnswerBundle {
            answer,
            prompt,
            facts,
            entities,
        })
    }

    /// Rerank the hits, falling back to the vector order on any rerank
    /// failure. Never fatal for the query.
    async fn rerank_hits(
        &self,
        question: &str,
        hits: Vec<VectorHit>,
        top_k: usize,
    ) -> Vec<RankedHit> {
        if hits.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = hits.iter().map(|hit| hit.snippet.clone()).collect();
        match self.rerank.rerank(question, &texts).await {
            Ok(results) => apply_rerank(hits, &results, top_k),
            Err(e) => {
                warn!("Reranking failed, keeping vector order: {}", e);
                fallback_ranked(hits, top_k)
            }
        }
    }

    /// Merge graph context onto the surviving hits, preferring
    /// graph-sourced metadata when present. Enrichment failure degrades
    /// to the documents' own stored fields.
    async fn enrich(&self, ranked: Vec<RankedHit>) -> Vec<EnrichedHit> {
        let ids: Vec<String> = ranked
            .iter()
            .map(|r| strip_doc_prefix(&r.hit.id).to_string())
            .collect();

        let contexts = match self.graph.fetch_context(&ids).await {
            Ok(contexts) => contexts,
            Err(e) => {
                warn!("Graph enrichment failed, continuing without it: {}", e);
                Vec::new()
            }
        };
        let mut by_id: HashMap<String, GraphDocContext> = contexts
            .into_iter()
            .map(|ctx| (ctx.doc_id.clone(), ctx))
            .collect();

        ranked
            .into_iter()
            .map(|r| {
                let context = by_id.remove(strip_doc_prefix(&r.hit.id));
                merge_hit(r, context)
            })
            .collect()
    }
}

/// Drop a store-specific id prefix if the hit carries one.
fn strip_doc_prefix(id: &str) -> &str {
    id.strip_prefix("document:").unwrap_or(id)
}

/// Attach relevance scores by index, order by descending relevance, and
/// truncate. Hits the reranker did not score sort after scored ones in
/// their original order.
fn apply_rerank(hits: Vec<VectorHit>, results: &[RerankResult], top_k: usize) -> Vec<RankedHit> {
    let mut scores: HashMap<usize, f32> = HashMap::new();
    for result in results {
        if result.index < hits.len() {
            scores.insert(result.index, result.relevance_score);
        }
    }

    let mut ranked: Vec<RankedHit> = hits
        .into_iter()
        .enumerate()
        .map(|(idx, hit)| RankedHit {
            hit,
            relevance_score: scores.get(&idx).copied(),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.relevance_score
            .unwrap_or(f32::MIN)
            .total_cmp(&a.relevance_score.unwrap_or(f32::MIN))
    });
    ranked.truncate(top_k);
    ranked
}

/// Graceful degradation: the first `top_k` hits unchanged, in original
/// vector order, with no relevance scores.
fn fallback_ranked(hits: Vec<VectorHit>, top_k: usize) -> Vec<RankedHit> {
    hits.into_iter()
        .take(top_k)
        .map(|hit| RankedHit {
            hit,
            relevance_score: None,
        })
        .collect()
}

fn merge_hit(ranked: RankedHit, context: Option<GraphDocContext>) -> EnrichedHit {
    let hit = ranked.hit;

    // Document-sourced fallbacks, used when the graph has nothing.
    let mut entities: Vec<(String, String)> = hit
        .named_entities
        .as_ref()
        .map(|groups| {
            groups
                .iter()
                .flat_map(|(tag, names)| {
                    let category = NodeCategory::from_tag(tag).to_string();
                    names
                        .iter()
                        .map(move |name| (category.clone(), name.clone()))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut relations: Vec<HitRelation> = hit
        .relations
        .as_ref()
        .map(|map| {
            map.iter()
                .filter_map(|(key, confidence)| {
                    let (subject, rel_type, object) = relation::split_key(key)?;
                    Some(HitRelation {
                        subject: subject.to_string(),
                        label: relation::normalize_label(rel_type),
                        object: object.to_string(),
                        confidence: *confidence,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut title = hit.title;

    if let Some(context) = context {
        if context.title.is_some() {
            title = context.title;
        }
        if !context.entities.is_empty() {
            entities = context
                .entities
                .into_iter()
                .map(|e| (e.category, e.name))
                .collect();
        }
        if !context.relations.is_empty() {
            relations = context
                .relations
                .into_iter()
                .map(|e| HitRelation {
                    subject: e.subject,
                    label: e.label,
                    object: e.object,
                    confidence: e.confidence,
                })
                .collect();
        }
    }

    EnrichedHit {
        title,
        snippet: hit.snippet,
        entities,
        relations,
    }
}

/// Render relations at or above the confidence threshold as short
/// sentences, deduplicated, capped, ordered by descending confidence.
fn distill_facts(enriched: &[EnrichedHit], threshold: f32, cap: usize) -> Vec<Fact> {
    let mut seen = HashSet::new();
    let mut facts = Vec::new();

    for hit in enriched {
        for rel in &hit.relations {
            if rel.confidence < threshold {
                continue;
            }
            let sentence = format!("{} {} {}.", rel.subject, rel.label.to_lowercase(), rel.object);
            if seen.insert(sentence.clone()) {
                facts.push(Fact {
                    sentence,
                    confidence: rel.confidence,
                });
            }
        }
    }

    facts.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    facts.truncate(cap);
    facts
}

/// Named entities grouped by category, deduplicated and sorted.
fn collect_entities(enriched: &[EnrichedHit]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for hit in enriched {
        for (category, name) in &hit.entities {
            grouped.entry(category.clone()).or_default().push(name.clone());
        }
    }
    for names in grouped.values_mut() {
        names.sort();
        names.dedup();
    }
    grouped
}

/// Assemble the generation prompt from fixed templates.
fn build_prompt(
    question: &str,
    enriched: &[EnrichedHit],
    facts: &[Fact],
    entities: &BTreeMap<String, Vec<String>>,
    include_text: bool,
) -> String {
    let mut prompt = String::from(
        "You are a precise assistant. Answer the question using only the \
         context below. If the context is insufficient, say so plainly.\n\n",
    );

    if include_text && !enriched.is_empty() {
        prompt.push_str("DOCUMENTS:\n");
        for (i, hit) in enriched.iter().enumerate() {
            match hit.title.as_deref() {
                Some(title) => {
                    prompt.push_str(&format!("[{}] {}: {}\n", i + 1, title, hit.snippet))
                }
                None => prompt.push_str(&format!("[{}] {}\n", i + 1, hit.snippet)),
            }
        }
        prompt.push('\n');
    }

    prompt.push_str("FACTS:\n");
    if facts.is_empty() {
        prompt.push_str("- none recorded\n");
    }
    for fact in facts {
        prompt.push_str(&format!(
            "- {} (confidence {:.2})\n",
            fact.sentence, fact.confidence
        ));
    }
    prompt.push('\n');

    prompt.push_str("NAMED ENTITIES:\n");
    if entities.is_empty() {
        prompt.push_str("- none recorded\n");
    }
    for (category, names) in entities {
        prompt.push_str(&format!("- {}: {}\n", category, names.join(", ")));
    }
    prompt.push('\n');

    prompt.push_str(&format!("QUESTION: {}\n\nANSWER:", question));
    prompt
}
