//! Storage layer for SnipRAG
//!
//! Provides the SurrealDB-backed adapters the pipeline depends on: the
//! document store (records + binary embeddings + k-NN), the graph store
//! (merge-create nodes and edges), and the durable work queue.

pub mod documents;
pub mod error;
pub mod graph;
pub mod queue;
pub mod schema;

pub use documents::{DocumentStore, VectorHit};
pub use error::{DbError, Result};
pub use graph::{EntityNode, GraphDocContext, GraphStats, GraphStore, RelationEdge};
pub use queue::{QueueStats, QueuedJob, WorkQueue};

use std::path::Path;
use surrealdb::engine::local::{Db, Mem};
use surrealdb::Surreal;

/// Database connection type
pub type DbConnection = Surreal<Db>;

/// Initialize database with RocksDB (persistent)
#[cfg(feature = "rocksdb")]
pub async fn init_persistent(path: impl AsRef<Path>) -> Result<DbConnection> {
    use surrealdb::engine::local::RocksDb;

    let db = Surreal::new::<RocksDb>(path.as_ref()).await?;
    setup_database(&db).await?;
    Ok(db)
}

/// Initialize database in-memory (for testing)
pub async fn init_memory() -> Result<DbConnection> {
    let db = Surreal::new::<Mem>(()).await?;
    setup_database(&db).await?;
    Ok(db)
}

/// Setup database namespace, database, and schema
async fn setup_database(db: &DbConnection) -> Result<()> {
    db.use_ns("sniprag").use_db("main").await?;
    schema::initialize_schema(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_memory() {
        let db = init_memory().await.expect("Failed to init memory db");
        // Just verify it connects
        let _: Vec<serde_json::Value> = db.select("document").await.unwrap();
    }
}
