// Indexer module
// Load a document, split it, embed the chunks and store them in the provider's collection


use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{ChunkRecord, VectorStore};
use crate::document::{self, Page};
use crate::embeddings::{Embedder, TextSplitter};
use crate::providers::selection::{Resolved, collection_name, resolve_failover};
use crate::providers::{Provider, ProviderFactory};
use crate::{RagError, Result};

/// Outcome of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks: usize,
    /// Provider that produced the stored vectors
    pub provider: Provider,
    pub collection: String,
}

pub struct Indexer {
    config: Config,
    providers: Arc<dyn ProviderFactory>,
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    reset: bool,
}

impl Indexer {
    #[inline]
    pub fn new(
        config: &Config,
        providers: Arc<dyn ProviderFactory>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            providers,
            store,
            splitter: TextSplitter::new(&config.chunking)?,
            reset: false,
        })
    }

    /// Clear the target collection before storing
    #[inline]
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Ingest the document at `path`
    #[inline]
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        info!("Ingesting {}", path.display());
        let pages = document::load(path)?;
        self.ingest_pages(&pages).await
    }

    /// Split, embed and store already loaded pages
    #[inline]
    pub async fn ingest_pages(&self, pages: &[Page]) -> Result<IngestReport> {
        let chunks = self.splitter.split_pages(pages);
        if chunks.is_empty() {
            return Err(RagError::Document(
                "Splitting produced no chunks; the document has no usable text".to_string(),
            ));
        }
        info!("Split {} pages into {} chunks", pages.len(), chunks.len());

        let base = self.config.collection_base()?;
        let embedders = resolve_failover(&self.config.credentials(), |provider| {
            self.providers.embedder(provider)
        })?;

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

        let (provider, vectors) = match self.embed_all(&embedders.active, &texts).await {
            Ok(vectors) => (embedders.active.provider, vectors),
            Err(active_error) => {
                let Some(standby) = &embedders.standby else {
                    return Err(RagError::Provider(format!(
                        "Embedding with {} failed: {:#}",
                        embedders.active.provider, active_error
                    )));
                };
                warn!(
                    "Embedding with {} failed: {:#}. Re-embedding all chunks with {}",
                    embedders.active.provider, active_error, standby.provider
                );
                let vectors = self.embed_all(standby, &texts).await.map_err(|e| {
                    RagError::Provider(format!(
                        "Embedding with {} failed: {:#}",
                        standby.provider, e
                    ))
                })?;
                (standby.provider, vectors)
            }
        };

        let collection = collection_name(base, provider);

        if self.reset {
            info!("Clearing collection {}", collection);
            self.store.clear(&collection).await?;
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord::new(&collection, chunk, vector))
            .collect();

        let stored = self.store.upsert(&collection, &records).await?;
        info!("Stored {} chunks in {} using {}", stored, collection, provider);

        Ok(IngestReport {
            pages: pages.len(),
            chunks: stored,
            provider,
            collection,
        })
    }

    /// Embed every text in order, one batch at a time
    async fn embed_all(
        &self,
        embedder: &Resolved<Arc<dyn Embedder>>,
        texts: &[String],
    ) -> anyhow::Result<Vec<Vec<f32>>> {
        let bar = progress_bar(texts.len(), embedder.provider);
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.embedding_batch_size.max(1)) {
            let batch_vectors = match embedder.client.embed_documents(batch).await {
                Ok(batch_vectors) => batch_vectors,
                Err(e) => {
                    bar.abandon();
                    return Err(e).with_context(|| {
                        format!("Failed to embed batch of {} chunks", batch.len())
                    });
                }
            };

            if batch_vectors.len() != batch.len() {
                bar.abandon();
                bail!(
                    "Mismatch between chunk and embedding counts: {} vs {}",
                    batch.len(),
                    batch_vectors.len()
                );
            }

            vectors.extend(batch_vectors);
            bar.inc(batch.len() as u64);
            debug!("Embedded {}/{} chunks", vectors.len(), texts.len());
        }

        bar.finish_and_clear();
        Ok(vectors)
    }
}

fn progress_bar(len: usize, provider: Provider) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} Embedding with {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(len as u64).with_style(style);
    bar.set_message(provider.to_string());
    bar
}
