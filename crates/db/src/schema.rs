//! SurrealDB schema definitions

use crate::{DbConnection, Result};
use tracing::info;

/// Initialize the database schema
pub async fn initialize_schema(db: &DbConnection) -> Result<()> {
    info!("Initializing database schema...");

    // Define tables and fields
    db.query(SCHEMA_DEFINITION).await?;

    info!("Schema initialized successfully");
    Ok(())
}

const SCHEMA_DEFINITION: &str = r#"
-- ============================================
-- DOCUMENT STORE
-- ============================================

-- Ingested snippet records. The embedding is hex-armored f32
-- little-endian bytes, kept apart from the textual fields.
DEFINE TABLE document SCHEMAFULL;
DEFINE FIELD title ON document TYPE option<string>;
DEFINE FIELD url ON document TYPE option<string>;
DEFINE FIELD date ON document TYPE option<string>;
DEFINE FIELD snippet ON document TYPE string;
DEFINE FIELD embedding ON document TYPE option<string>;
DEFINE FIELD relations ON document FLEXIBLE TYPE option<object>;
DEFINE FIELD named_entities ON document FLEXIBLE TYPE option<object>;
DEFINE FIELD status ON document TYPE option<string>;
DEFINE FIELD created_at ON document TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON document TYPE datetime DEFAULT time::now();

-- ============================================
-- GRAPH STORE
-- ============================================

-- One node per loaded document, keyed by document id
DEFINE TABLE doc_node SCHEMAFULL;
DEFINE FIELD title ON doc_node TYPE option<string>;
DEFINE FIELD url ON doc_node TYPE option<string>;
DEFINE FIELD date ON doc_node TYPE option<string>;
DEFINE FIELD created_at ON doc_node TYPE datetime DEFAULT time::now();

-- Entity nodes, deduplicated globally on (name, category)
DEFINE TABLE entity SCHEMAFULL;
DEFINE FIELD name ON entity TYPE string;
DEFINE FIELD category ON entity TYPE string;
DEFINE FIELD created_at ON entity TYPE datetime DEFAULT time::now();

-- Document-to-entity edges
DEFINE TABLE mentions SCHEMAFULL;
DEFINE FIELD in ON mentions TYPE record<doc_node>;
DEFINE FIELD out ON mentions TYPE record<entity>;
DEFINE FIELD created_at ON mentions TYPE datetime DEFAULT time::now();

-- Entity-to-entity edges; identity is (in, label, out)
DEFINE TABLE relates SCHEMAFULL;
DEFINE FIELD in ON relates TYPE record<entity>;
DEFINE FIELD out ON relates TYPE record<entity>;
DEFINE FIELD label ON relates TYPE string;
DEFINE FIELD confidence ON relates TYPE float;
DEFINE FIELD sources ON relates TYPE array<string> DEFAULT [];
DEFINE FIELD created_at ON relates TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON relates TYPE datetime DEFAULT time::now();

-- ============================================
-- WORK QUEUE
-- ============================================

-- Durable jobs; not_before is a unix-seconds backoff gate
DEFINE TABLE job SCHEMAFULL;
DEFINE FIELD stage ON job TYPE string;
DEFINE FIELD payload ON job FLEXIBLE TYPE object;
DEFINE FIELD status ON job TYPE string DEFAULT 'pending';
DEFINE FIELD attempts ON job TYPE int DEFAULT 0;
DEFINE FIELD not_before ON job TYPE int DEFAULT 0;
DEFINE FIELD last_error ON job TYPE option<string>;
DEFINE FIELD created_at ON job TYPE datetime DEFAULT time::now();

-- ============================================
-- INDEXES
-- ============================================

-- Entity identity: the same (name, category) pair always resolves to
-- one node, whichever document observed it
DEFINE INDEX idx_entity_identity ON entity FIELDS name, category UNIQUE;

-- Queue scans
DEFINE INDEX idx_job_status ON job FIELDS status;

-- Pipeline status lookups
DEFINE INDEX idx_document_status ON document FIELDS status;
"#;
