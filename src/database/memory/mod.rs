
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{ChunkRecord, ScoredChunk, VectorStore};
use crate::{RagError, Result};

/// Vector store held in process memory with brute-force cosine search
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    collections: Mutex<HashMap<String, Vec<ChunkRecord>>>,
}

impl MemoryVectorStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the collections that currently hold records
    #[inline]
    pub fn collections(&self) -> Result<Vec<String>> {
        let collections = self.lock()?;
        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<ChunkRecord>>>> {
        self.collections
            .lock()
            .map_err(|_| RagError::Database("In-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<usize> {
        let mut collections = self.lock()?;
        let stored = collections.entry(collection.to_string()).or_default();

        let mut positions: HashMap<Uuid, usize> = stored
            .iter()
            .enumerate()
            .map(|(i, record)| (record.id, i))
            .collect();

        for record in records {
            if let Some(&i) = positions.get(&record.id) {
                stored[i] = record.clone();
            } else {
                positions.insert(record.id, stored.len());
                stored.push(record.clone());
            }
        }

        debug!("Stored {} records in {}", records.len(), collection);
        Ok(records.len())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.lock()?;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredChunk> = records
            .iter()
            .map(|record| ScoredChunk {
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score: cosine_similarity(embedding, &record.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.lock()?.get(collection).map_or(0, Vec::len))
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        self.lock()?.remove(collection);
        Ok(())
    }
}

/// Cosine similarity; zero when either vector has no magnitude or the lengths differ
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
