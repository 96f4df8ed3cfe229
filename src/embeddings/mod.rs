// Embeddings module
// Text splitting and the embedding interface shared by the hosted providers

pub mod chunking;

use anyhow::Result;
use async_trait::async_trait;

pub use chunking::{Chunk, ChunkMetadata, DEFAULT_SEPARATORS, TextSplitter};

/// Turns text into fixed-length vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed documents, returning one vector per input in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
