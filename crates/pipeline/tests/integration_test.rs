//! Integration tests for the SnipRAG pipelines
//!
//! Everything here runs against the in-memory engine. Tests that need
//! live inference services are marked #[ignore] with the service named
//! in the reason; run them with: cargo test -- --ignored

use std::collections::BTreeMap;

use sniprag_core::{document_id, DocPayload, DocStatus, EmbedPayload, JobStatus, Stage, SubmittedItem};
use sniprag_db::{init_memory, DocumentStore, GraphStore, WorkQueue};
use sniprag_pipeline::{submit_batch, LoadStage, Settings, Worker};

fn item(snippet: &str) -> SubmittedItem {
    SubmittedItem {
        date: Some("2025-03-23T23:13:29.700Z".into()),
        title: Some("llama.cpp - chat".into()),
        url: Some("http://localhost:8080/#/chat".into()),
        snippet: Some(snippet.to_string()),
        id: None,
    }
}

/// Seed a document the way the embed + extract stages would leave it.
async fn seed_extracted_document(
    docs: &DocumentStore,
    snippet: &str,
    timestamp: &str,
    relations: &[(&str, f32)],
    entities: &[(&str, &[&str])],
) -> String {
    let doc_id = document_id(snippet, timestamp);
    docs.upsert_metadata(&doc_id, &item(snippet), snippet)
        .await
        .expect("Failed to upsert metadata");

    let relations: BTreeMap<String, f32> = relations
        .iter()
        .map(|(key, confidence)| (key.to_string(), *confidence))
        .collect();
    let entities: BTreeMap<String, Vec<String>> = entities
        .iter()
        .map(|(tag, names)| {
            (
                tag.to_string(),
                names.iter().map(|n| n.to_string()).collect(),
            )
        })
        .collect();

    docs.set_extraction(&doc_id, &relations, &entities)
        .await
        .expect("Failed to set extraction");
    doc_id
}

// ==========================================
// DOCUMENT STORE
// ==========================================

#[tokio::test]
async fn test_document_round_trip() {
    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db);

    let doc_id = document_id("A snippet about Rust.", "20250323231428");
    docs.upsert_metadata(&doc_id, &item("A snippet about Rust."), "A snippet about Rust.")
        .await
        .unwrap();
    docs.put_embedding(&doc_id, &[0.1, 0.2, 0.3]).await.unwrap();

    let document = docs.get(&doc_id).await.unwrap().expect("document exists");
    assert_eq!(document.snippet, "A snippet about Rust.");
    assert_eq!(document.title.as_deref(), Some("llama.cpp - chat"));
    assert!(document.embedding.is_some());
    assert_eq!(document.doc_status(), Some(DocStatus::Embedded));

    // The embedding lives in its own field and survives a metadata
    // refresh untouched.
    docs.upsert_metadata(&doc_id, &item("A snippet about Rust."), "A snippet about Rust.")
        .await
        .unwrap();
    let document = docs.get(&doc_id).await.unwrap().unwrap();
    assert!(document.embedding.is_some());

    assert!(docs.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_knn_on_empty_store_returns_nothing() {
    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db);

    let hits = docs.knn_search(&[0.1, 0.2, 0.3], 5).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_knn_orders_by_similarity() {
    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db);

    // Three documents at decreasing similarity to the query vector.
    let vectors: Vec<(&str, Vec<f32>)> = vec![
        ("nearest", vec![1.0, 0.0, 0.0]),
        ("middle", vec![0.7, 0.7, 0.0]),
        ("farthest", vec![0.0, 1.0, 0.0]),
    ];
    for (snippet, vector) in &vectors {
        let doc_id = document_id(snippet, "20250323231428");
        docs.upsert_metadata(&doc_id, &item(snippet), snippet)
            .await
            .unwrap();
        docs.put_embedding(&doc_id, vector).await.unwrap();
    }

    // Fewer documents than k: all of them come back, nearest first.
    let hits = docs.knn_search(&[1.0, 0.0, 0.0], 5).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].snippet, "nearest");
    assert_eq!(hits[1].snippet, "middle");
    assert_eq!(hits[2].snippet, "farthest");
    assert!(hits[0].similarity >= hits[1].similarity);
    assert!(hits[1].similarity >= hits[2].similarity);

    // Width is honored.
    let hits = docs.knn_search(&[1.0, 0.0, 0.0], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].snippet, "nearest");
}

// ==========================================
// WORK QUEUE
// ==========================================

#[tokio::test]
async fn test_queue_lifecycle() {
    let db = init_memory().await.expect("Failed to init db");
    let queue = WorkQueue::new(db);

    assert!(queue.claim_next().await.unwrap().is_none());

    queue
        .enqueue(
            Stage::Extract,
            DocPayload {
                doc_id: "abc".into(),
            },
        )
        .await
        .unwrap();

    let job = queue.claim_next().await.unwrap().expect("claimable job");
    assert_eq!(job.stage, Stage::Extract);
    assert_eq!(job.status, JobStatus::Running);

    // A running job is not claimable again.
    assert!(queue.claim_next().await.unwrap().is_none());

    queue.complete(&job).await.unwrap();
    assert_eq!(queue.stats().await.unwrap().succeeded, 1);
}

#[tokio::test]
async fn test_queue_retry_backoff_and_dead_letter() {
    let db = init_memory().await.expect("Failed to init db");
    let queue = WorkQueue::new(db);

    queue
        .enqueue(
            Stage::Load,
            DocPayload {
                doc_id: "abc".into(),
            },
        )
        .await
        .unwrap();
    let job = queue.claim_next().await.unwrap().unwrap();

    // First failure: back to pending behind a backoff gate, so it is
    // not immediately claimable.
    let outcome = queue.retry_or_fail(&job, "boom").await.unwrap();
    assert_eq!(outcome, JobStatus::Pending);
    assert!(queue.claim_next().await.unwrap().is_none());

    // Third failure exhausts the budget and parks the job.
    let mut exhausted = job.clone();
    exhausted.attempts = 2;
    let outcome = queue.retry_or_fail(&exhausted, "boom again").await.unwrap();
    assert_eq!(outcome, JobStatus::Failed);

    let failed = queue.failed_jobs().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].last_error.as_deref(), Some("boom again"));

    // Dead-lettered jobs are re-drivable, never silently dropped.
    let key = failed[0].key().unwrap();
    assert!(queue.redrive(&key).await.unwrap());
    let redriven = queue.claim_next().await.unwrap().expect("redriven job");
    assert_eq!(redriven.attempts, 0);

    assert!(!queue.redrive("not-a-job").await.unwrap());
}

#[tokio::test]
async fn test_submit_batch_enqueues_embed_job() {
    let db = init_memory().await.expect("Failed to init db");
    let queue = WorkQueue::new(db);

    submit_batch(
        &queue,
        vec![item("one"), item("two")],
        "20250323231428".into(),
    )
    .await
    .unwrap();

    let job = queue.claim_next().await.unwrap().expect("embed job");
    assert_eq!(job.stage, Stage::Embed);

    let payload: EmbedPayload = serde_json::from_value(job.payload.clone()).unwrap();
    assert_eq!(payload.items.len(), 2);
    assert_eq!(payload.timestamp, "20250323231428");
}

// ==========================================
// LOAD STAGE
// ==========================================

const FOUNDING_SNIPPET: &str = "Larry Page and Sergey Brin, two graduate students \
     at Stanford University, co-founded Google.";

async fn seed_founding_document(docs: &DocumentStore, timestamp: &str) -> String {
    seed_extracted_document(
        docs,
        FOUNDING_SNIPPET,
        timestamp,
        &[("Larry Page|co_founded|Google", 0.92)],
        &[
            ("PERSON", &["Larry Page", "Sergey Brin"][..]),
            ("ORG", &["Google"][..]),
        ],
    )
    .await
}

#[tokio::test]
async fn test_load_stage_scenario() {
    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db.clone());
    let graph = GraphStore::new(db.clone());

    let doc_id = seed_founding_document(&docs, "20250323231428").await;

    LoadStage::new(docs.clone(), graph.clone())
        .run(&doc_id)
        .await
        .expect("Load failed");

    let stats = graph.stats().await.unwrap();
    assert_eq!(stats.doc_node_count, 1);
    assert_eq!(stats.entity_count, 3);
    assert_eq!(stats.mention_count, 3);
    assert_eq!(stats.relation_count, 1);

    let contexts = graph.fetch_context(&[doc_id.clone()]).await.unwrap();
    assert_eq!(contexts.len(), 1);
    let context = &contexts[0];

    let people: Vec<&str> = context
        .entities
        .iter()
        .filter(|e| e.category == "Person")
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(people.len(), 2);
    assert!(people.contains(&"Larry Page"));
    assert!(people.contains(&"Sergey Brin"));
    assert!(context
        .entities
        .iter()
        .any(|e| e.category == "Organization" && e.name == "Google"));

    assert_eq!(context.relations.len(), 1);
    let relation = &context.relations[0];
    assert_eq!(relation.subject, "Larry Page");
    assert_eq!(relation.label, "Co Founded");
    assert_eq!(relation.object, "Google");
    assert!(relation.confidence > 0.0);
    assert_eq!(relation.sources, vec![doc_id.clone()]);

    let document = docs.get(&doc_id).await.unwrap().unwrap();
    assert_eq!(document.doc_status(), Some(DocStatus::Loaded));
}

#[tokio::test]
async fn test_load_twice_is_idempotent() {
    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db.clone());
    let graph = GraphStore::new(db.clone());

    let doc_id = seed_founding_document(&docs, "20250323231428").await;
    let load = LoadStage::new(docs.clone(), graph.clone());

    load.run(&doc_id).await.unwrap();
    let first = graph.stats().await.unwrap();

    load.run(&doc_id).await.unwrap();
    let second = graph.stats().await.unwrap();

    assert_eq!(first.doc_node_count, second.doc_node_count);
    assert_eq!(first.entity_count, second.entity_count);
    assert_eq!(first.mention_count, second.mention_count);
    assert_eq!(first.relation_count, second.relation_count);

    // Same contributing document exactly once, confidence undrifted.
    let contexts = graph.fetch_context(&[doc_id.clone()]).await.unwrap();
    let relation = &contexts[0].relations[0];
    assert_eq!(relation.sources, vec![doc_id]);
    assert!((relation.confidence - 0.92).abs() < 1e-6);
}

#[tokio::test]
async fn test_repeat_assertion_from_second_document_reconciles() {
    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db.clone());
    let graph = GraphStore::new(db.clone());
    let load = LoadStage::new(docs.clone(), graph.clone());

    let relations = &[("Larry Page|co_founded|Google", 0.9)][..];
    let entities = &[
        ("PERSON", &["Larry Page"][..]),
        ("ORG", &["Google"][..]),
    ][..];

    let doc_a =
        seed_extracted_document(&docs, "Snippet A about Google.", "1000", relations, entities)
            .await;
    let doc_b = seed_extracted_document(
        &docs,
        "Snippet B about Google.",
        "2000",
        &[("Larry Page|co_founded|Google", 0.5)],
        entities,
    )
    .await;

    load.run(&doc_a).await.unwrap();
    load.run(&doc_b).await.unwrap();

    // One edge; weighted mean of 0.9 and 0.5; both contributors listed.
    let stats = graph.stats().await.unwrap();
    assert_eq!(stats.relation_count, 1);
    // Entities collapsed globally: one Larry Page, one Google.
    assert_eq!(stats.entity_count, 2);

    let contexts = graph.fetch_context(&[doc_a.clone()]).await.unwrap();
    let relation = &contexts[0].relations[0];
    assert!((relation.confidence - 0.7).abs() < 1e-6);
    assert_eq!(relation.sources.len(), 2);
    assert!(relation.sources.contains(&doc_a));
    assert!(relation.sources.contains(&doc_b));

    // Redelivering doc_b extends nothing: one entry per distinct id.
    load.run(&doc_b).await.unwrap();
    let contexts = graph.fetch_context(&[doc_a]).await.unwrap();
    let relation = &contexts[0].relations[0];
    assert_eq!(relation.sources.len(), 2);
    assert!((relation.confidence - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn test_malformed_relation_keys_never_become_edges() {
    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db.clone());
    let graph = GraphStore::new(db.clone());

    let doc_id = seed_extracted_document(
        &docs,
        "A snippet with broken extraction output.",
        "20250323231428",
        &[
            ("no delimiters at all", 0.9),
            ("only|two", 0.9),
            ("a|b|c|d", 0.9),
        ],
        &[("PERSON", &["Somebody"][..])],
    )
    .await;

    LoadStage::new(docs, graph.clone())
        .run(&doc_id)
        .await
        .unwrap();

    let stats = graph.stats().await.unwrap();
    assert_eq!(stats.relation_count, 0);
    // The well-formed entity still loaded.
    assert_eq!(stats.entity_count, 1);
}

#[tokio::test]
async fn test_load_without_extraction_fields_is_a_noop() {
    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db.clone());
    let graph = GraphStore::new(db.clone());

    let doc_id = document_id("No extraction yet.", "20250323231428");
    docs.upsert_metadata(&doc_id, &item("No extraction yet."), "No extraction yet.")
        .await
        .unwrap();

    LoadStage::new(docs, graph.clone())
        .run(&doc_id)
        .await
        .expect("no-op load should not error");

    let stats = graph.stats().await.unwrap();
    assert_eq!(stats.doc_node_count, 0);
}

// ==========================================
// WORKER
// ==========================================

#[tokio::test]
async fn test_worker_handles_dangling_document_jobs() {
    let db = init_memory().await.expect("Failed to init db");
    let queue = WorkQueue::new(db.clone());
    let worker = Worker::new(db.clone(), &Settings::default());

    // Extract and Load jobs pointing at a deleted document are no-ops,
    // not errors: the jobs succeed and nothing is created.
    queue
        .enqueue(
            Stage::Extract,
            DocPayload {
                doc_id: "gone".into(),
            },
        )
        .await
        .unwrap();
    queue
        .enqueue(
            Stage::Load,
            DocPayload {
                doc_id: "also-gone".into(),
            },
        )
        .await
        .unwrap();

    assert!(worker.run_once().await.unwrap());
    assert!(worker.run_once().await.unwrap());
    assert!(!worker.run_once().await.unwrap());

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 0);
}

// ==========================================
// TESTS REQUIRING INFERENCE SERVICES
// Run with: cargo test -- --ignored
// ==========================================

#[tokio::test]
#[ignore = "Requires the embedding service on localhost:8000"]
async fn test_embed_stage_end_to_end() {
    use sniprag_pipeline::{AuditLog, EmbedStage, EmbeddingClient};

    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db.clone());
    let queue = WorkQueue::new(db.clone());
    let embeddings = EmbeddingClient::new("http://localhost:8000", 120);

    let stage = EmbedStage::new(docs.clone(), queue.clone(), embeddings, AuditLog::disabled());

    // Blank and missing snippets are filtered; one document per
    // surviving snippet.
    let items = vec![item(FOUNDING_SNIPPET), item("   "), item("Rust is fast.")];
    let created = stage.run(&items, "20250323231428").await.unwrap();
    assert_eq!(created, 2);

    let doc_id = document_id(FOUNDING_SNIPPET, "20250323231428");
    let document = docs.get(&doc_id).await.unwrap().expect("document stored");
    assert!(document.embedding.is_some());
}

#[tokio::test]
#[ignore = "Requires embedding, rerank, and completion services"]
async fn test_query_returns_complete_bundle() {
    use sniprag_pipeline::{
        AnswerPipeline, CompletionClient, EmbeddingClient, QueryOptions, RerankClient,
    };

    let settings = Settings::default();
    let db = init_memory().await.expect("Failed to init db");
    let docs = DocumentStore::new(db.clone());
    let graph = GraphStore::new(db.clone());

    let doc_id = seed_founding_document(&docs, "20250323231428").await;
    LoadStage::new(docs.clone(), graph.clone())
        .run(&doc_id)
        .await
        .unwrap();

    let pipeline = AnswerPipeline::new(
        docs,
        graph,
        EmbeddingClient::new(settings.embedding_url.clone(), 120),
        RerankClient::new(settings.rerank_url.clone(), 120),
        CompletionClient::new(settings.completion_url.clone(), 120),
        &settings,
    );

    let bundle = pipeline
        .answer("Who founded Google?", &QueryOptions::default())
        .await
        .expect("query should return a complete bundle");

    assert!(!bundle.answer.is_empty());
    assert!(bundle.prompt.contains("QUESTION: Who founded Google?"));
    assert!(!bundle.facts.is_empty());
}
