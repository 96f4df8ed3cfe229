// Database module
// Vector storage: PostgreSQL + pgvector for real runs, an in-memory store for tests and demos

pub mod memory;
pub mod pgvector;

use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;
use crate::embeddings::{Chunk, ChunkMetadata};

pub use memory::MemoryVectorStore;
pub use pgvector::PgVectorStore;

/// A chunk and its embedding, ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    /// The id depends only on the collection and the chunk, so storing the same
    /// document twice replaces records instead of duplicating them
    #[inline]
    pub fn new(collection: &str, chunk: Chunk, embedding: Vec<f32>) -> Self {
        let key = format!(
            "{}:{}:{}:{}:{}",
            collection,
            chunk.metadata.source,
            chunk.metadata.page,
            chunk.metadata.chunk_index,
            chunk.text
        );

        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()),
            text: chunk.text,
            metadata: chunk.metadata,
            embedding,
        }
    }
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

/// Named collections of embedded chunks
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records, returning how many were written
    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<usize>;

    /// The `k` records closest to `embedding`, best match first
    async fn query(&self, collection: &str, embedding: &[f32], k: usize)
    -> Result<Vec<ScoredChunk>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    /// Remove a collection and all of its records
    async fn clear(&self, collection: &str) -> Result<()>;
}
