//! SnipRAG CLI
//!
//! Operational surface for the snippet pipeline: submit batches, run a
//! worker, query the knowledge, and inspect pipeline state.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sniprag_core::SubmittedItem;
use sniprag_db::{init_memory, init_persistent, DocumentStore, GraphStore, WorkQueue};
use sniprag_pipeline::{
    submit_batch, AnswerPipeline, CompletionClient, EmbeddingClient, QueryOptions, RerankClient,
    Settings, Worker,
};

/// SnipRAG - snippets in, graph-enriched answers out
#[derive(Parser)]
#[command(name = "sniprag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path (defaults to ~/.sniprag/data)
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    /// Use in-memory database (for testing)
    #[arg(long)]
    memory: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a batch of snippets for asynchronous ingestion
    Ingest {
        /// Path to a JSON batch file: {"timestamp": ..., "data": [...]}
        /// or a bare array of records
        path: PathBuf,
    },

    /// Run a pipeline worker until interrupted
    Worker {
        /// Seconds to sleep when the queue is empty
        #[arg(long, default_value = "2")]
        poll_secs: u64,
    },

    /// Ask a question against the stored knowledge
    Query {
        /// The question
        question: String,

        /// Vector-search width
        #[arg(short, long, default_value = "5")]
        k: usize,

        /// Final answer-set width
        #[arg(short, long, default_value = "3")]
        top_k: usize,

        /// Include full document texts in the generation prompt
        #[arg(long)]
        include_text: bool,

        /// Print the prompt that was sent alongside the answer
        #[arg(long)]
        show_prompt: bool,
    },

    /// Show a document's pipeline status
    Status {
        /// Document id
        doc_id: String,
    },

    /// Inspect or re-drive queued jobs
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Show document, graph, and queue statistics
    Stats,
}

#[derive(Subcommand)]
enum JobCommands {
    /// List dead-lettered jobs
    Failed,

    /// Move a dead-lettered job back to pending
    Redrive {
        /// Job id
        job_id: String,
    },
}

/// On-disk batch layout, as posted by the capture front door
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Envelope {
        timestamp: String,
        data: Vec<SubmittedItem>,
    },
    Bare(Vec<SubmittedItem>),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize database
    let db = if cli.memory {
        info!("Using in-memory database");
        init_memory().await?
    } else {
        let db_path = cli.db_path.unwrap_or_else(|| {
            let mut path = dirs::home_dir().expect("Could not find home directory");
            path.push(".sniprag");
            path.push("data");
            path
        });

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Using database at: {}", db_path.display());
        init_persistent(&db_path).await?
    };

    let settings = Settings::from_env();

    match cli.command {
        Commands::Ingest { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let batch: BatchFile =
                serde_json::from_str(&raw).context("Failed to parse batch file")?;

            let (timestamp, items) = match batch {
                BatchFile::Envelope { timestamp, data } => (timestamp, data),
                BatchFile::Bare(data) => (
                    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string(),
                    data,
                ),
            };

            let queue = WorkQueue::new(db);
            let job = submit_batch(&queue, items, timestamp).await?;
            println!(
                "✓ Batch accepted, job {}",
                job.key().unwrap_or_else(|| "?".into())
            );
            println!("Processing is asynchronous; poll with `sniprag status <doc-id>`.");
        }

        Commands::Worker { poll_secs } => {
            let embeddings =
                EmbeddingClient::new(settings.embedding_url.clone(), settings.request_timeout_secs);
            if !embeddings.health().await.unwrap_or(false) {
                eprintln!(
                    "Warning: embedding service not reachable at {}",
                    embeddings.base_url()
                );
            }

            let worker = Worker::new(db, &settings);
            worker.run(Duration::from_secs(poll_secs)).await;
        }

        Commands::Query {
            question,
            k,
            top_k,
            include_text,
            show_prompt,
        } => {
            let embeddings =
                EmbeddingClient::new(settings.embedding_url.clone(), settings.request_timeout_secs);
            if !embeddings.health().await.unwrap_or(false) {
                eprintln!(
                    "Error: embedding service not reachable at {}",
                    embeddings.base_url()
                );
                anyhow::bail!("Embedding service unavailable");
            }

            let pipeline = AnswerPipeline::new(
                DocumentStore::new(db.clone()),
                GraphStore::new(db),
                embeddings,
                RerankClient::new(settings.rerank_url.clone(), settings.request_timeout_secs),
                CompletionClient::new(
                    settings.completion_url.clone(),
                    settings.request_timeout_secs,
                ),
                &settings,
            );

            let options = QueryOptions {
                k,
                top_k,
                include_text,
            };
            let bundle = pipeline.answer(&question, &options).await?;

            println!("{}\n", bundle.answer.trim());

            if !bundle.facts.is_empty() {
                println!("Facts used:");
                for fact in &bundle.facts {
                    println!("  - {} (confidence {:.2})", fact.sentence, fact.confidence);
                }
            }
            if !bundle.entities.is_empty() {
                println!("Entities:");
                for (category, names) in &bundle.entities {
                    println!("  - {}: {}", category, names.join(", "));
                }
            }
            if show_prompt {
                println!("\n--- prompt ---\n{}", bundle.prompt);
            }
        }

        Commands::Status { doc_id } => {
            let docs = DocumentStore::new(db);
            match docs.get(&doc_id).await? {
                Some(document) => {
                    println!(
                        "{}: {}",
                        doc_id,
                        document.status.as_deref().unwrap_or("unknown")
                    );
                    if let Some(title) = document.title.as_deref() {
                        println!("  title: {}", title);
                    }
                    println!(
                        "  relations: {}, entity groups: {}",
                        document.relations.map(|r| r.len()).unwrap_or(0),
                        document.named_entities.map(|e| e.len()).unwrap_or(0),
                    );
                }
                None => println!("{}: not found", doc_id),
            }
        }

        Commands::Jobs { command } => {
            let queue = WorkQueue::new(db);
            match command {
                JobCommands::Failed => {
                    let failed = queue.failed_jobs().await?;
                    if failed.is_empty() {
                        println!("No dead-lettered jobs.");
                    }
                    for job in failed {
                        println!(
                            "{} [{}] attempts={} error={}",
                            job.key().unwrap_or_else(|| "?".into()),
                            job.stage,
                            job.attempts,
                            job.last_error.as_deref().unwrap_or("-"),
                        );
                    }
                }
                JobCommands::Redrive { job_id } => {
                    if queue.redrive(&job_id).await? {
                        println!("✓ Job {} re-driven", job_id);
                    } else {
                        println!("No dead-lettered job with id {}", job_id);
                    }
                }
            }
        }

        Commands::Stats => {
            let docs = DocumentStore::new(db.clone());
            let graph = GraphStore::new(db.clone());
            let queue = WorkQueue::new(db);

            let graph_stats = graph.stats().await?;
            println!("Documents: {}", docs.count().await?);
            println!(
                "Graph: {} doc nodes, {} entities, {} mentions, {} relations",
                graph_stats.doc_node_count,
                graph_stats.entity_count,
                graph_stats.mention_count,
                graph_stats.relation_count,
            );
            let queue_stats = queue.stats().await?;
            println!(
                "Jobs: {} pending, {} running, {} succeeded, {} failed",
                queue_stats.pending,
                queue_stats.running,
                queue_stats.succeeded,
                queue_stats.failed,
            );
        }
    }

    Ok(())
}
