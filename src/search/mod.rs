// Search module
// Retrieve the closest chunks for a question and answer it from that context only

pub mod prompt;


use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::{ScoredChunk, VectorStore};
use crate::embeddings::Embedder;
use crate::providers::selection::{Failover, collection_name, resolve_failover};
use crate::providers::{ChatTurn, Generator, Provider, ProviderFactory};
use crate::shell::Answerer;
use crate::{RagError, Result};

/// Separator placed between chunk texts when building the context
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Result of asking a question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answered(String),
    /// Nothing was retrieved, so no answer was generated
    NoRelevantContext,
    EmptyQuestion,
}

/// Chunks retrieved for a query and where they came from
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub provider: Provider,
    pub collection: String,
    pub chunks: Vec<ScoredChunk>,
}

impl Retrieval {
    /// Chunk texts joined into a single context block
    #[inline]
    pub fn context(&self) -> String {
        self.chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }
}

pub struct RetrievalService {
    collection_base: String,
    top_k: usize,
    embedders: Failover<Arc<dyn Embedder>>,
    generators: Failover<Arc<dyn Generator>>,
    store: Arc<dyn VectorStore>,
}

impl RetrievalService {
    /// Resolve embedding and generation providers independently of each other
    #[inline]
    pub fn new(
        config: &Config,
        providers: &dyn ProviderFactory,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let credentials = config.credentials();
        let embedders = resolve_failover(&credentials, |provider| providers.embedder(provider))?;
        let generators = resolve_failover(&credentials, |provider| providers.generator(provider))?;

        info!(
            "Embedding with {}, generating with {}",
            embedders.provider(),
            generators.provider()
        );

        Ok(Self {
            collection_base: config.collection_base()?.to_string(),
            top_k: config.top_k,
            embedders,
            generators,
            store,
        })
    }

    /// Collection searched when the active embedding provider works
    #[inline]
    pub fn collection(&self) -> String {
        collection_name(&self.collection_base, self.embedders.provider())
    }

    #[inline]
    pub fn embedding_provider(&self) -> Provider {
        self.embedders.provider()
    }

    #[inline]
    pub fn generation_provider(&self) -> Provider {
        self.generators.provider()
    }

    /// Answer a question, or `None` when no answer could be produced
    #[inline]
    pub async fn answer(&self, question: &str) -> Option<String> {
        match self.ask(question).await {
            Ok(Outcome::Answered(answer)) => Some(answer),
            Ok(Outcome::NoRelevantContext) => {
                info!("No relevant context found for question");
                None
            }
            Ok(Outcome::EmptyQuestion) => None,
            Err(e) => {
                error!("Failed to answer question: {}", e);
                None
            }
        }
    }

    /// Answer a question, keeping track of why no answer was produced
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<Outcome> {
        if question.trim().is_empty() {
            return Ok(Outcome::EmptyQuestion);
        }

        let retrieval = self.retrieve(question, self.top_k).await?;
        let context = retrieval.context();
        if context.trim().is_empty() {
            return Ok(Outcome::NoRelevantContext);
        }

        debug!(
            "Built context of {} characters from {} chunks in {}",
            context.len(),
            retrieval.chunks.len(),
            retrieval.collection
        );

        let turns = [ChatTurn::user(prompt::render(&context, question))];
        let answer = self.generate(&turns).await?;
        Ok(Outcome::Answered(answer))
    }

    /// The `k` chunks closest to `query`, best match first
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Retrieval> {
        let (provider, embedding) = match self.embedders.active.client.embed_query(query).await {
            Ok(embedding) => (self.embedders.active.provider, embedding),
            Err(active_error) => {
                let Some(standby) = &self.embedders.standby else {
                    return Err(RagError::Provider(format!(
                        "Embedding with {} failed: {:#}",
                        self.embedders.active.provider, active_error
                    )));
                };
                warn!(
                    "Embedding with {} failed: {:#}. Falling back to {}",
                    self.embedders.active.provider, active_error, standby.provider
                );
                let embedding = standby.client.embed_query(query).await.map_err(|e| {
                    RagError::Provider(format!(
                        "Embedding with {} failed: {:#}",
                        standby.provider, e
                    ))
                })?;
                (standby.provider, embedding)
            }
        };

        let collection = collection_name(&self.collection_base, provider);
        let chunks = self.store.query(&collection, &embedding, k).await?;
        debug!("Retrieved {} chunks from {}", chunks.len(), collection);

        Ok(Retrieval {
            provider,
            collection,
            chunks,
        })
    }

    async fn generate(&self, turns: &[ChatTurn]) -> Result<String> {
        let active = &self.generators.active;
        match active.client.generate(turns).await {
            Ok(answer) => Ok(answer),
            Err(active_error) => {
                let Some(standby) = &self.generators.standby else {
                    return Err(RagError::Provider(format!(
                        "Generation with {} failed: {:#}",
                        active.provider, active_error
                    )));
                };
                warn!(
                    "Generation with {} failed: {:#}. Retrying with {}",
                    active.provider, active_error, standby.provider
                );
                standby.client.generate(turns).await.map_err(|e| {
                    RagError::Provider(format!(
                        "Generation with {} failed: {:#}",
                        standby.provider, e
                    ))
                })
            }
        }
    }
}

#[async_trait]
impl Answerer for RetrievalService {
    async fn answer(&self, question: &str) -> Option<String> {
        Self::answer(self, question).await
    }
}
