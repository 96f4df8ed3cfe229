// Hosted model providers
// Gemini is the primary provider, OpenAI the secondary; both expose embeddings and chat

pub mod gemini;
pub mod http;
pub mod openai;
pub mod selection;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::embeddings::Embedder;

pub use gemini::{GeminiChat, GeminiEmbeddings};
pub use openai::{OpenAiChat, OpenAiEmbeddings};
pub use selection::{Credentials, Failover, Resolved, Selection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gemini,
    OpenAi,
}

impl Provider {
    pub const PRIMARY: Self = Self::Gemini;
    pub const SECONDARY: Self = Self::OpenAi;

    /// Suffix appended to the collection base name for vectors from this provider
    #[inline]
    pub fn collection_suffix(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => write!(f, "Gemini"),
            Self::OpenAi => write!(f, "OpenAI"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a chat exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Text generation from an ordered list of chat turns
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, turns: &[ChatTurn]) -> Result<String>;
}

/// Builds provider clients; construction must not touch the network
pub trait ProviderFactory: Send + Sync {
    fn embedder(&self, provider: Provider) -> Result<Arc<dyn Embedder>>;
    fn generator(&self, provider: Provider) -> Result<Arc<dyn Generator>>;
}

/// Factory for the real HTTP clients
#[derive(Debug, Clone)]
pub struct HttpProviders {
    config: Config,
}

impl HttpProviders {
    #[inline]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl ProviderFactory for HttpProviders {
    fn embedder(&self, provider: Provider) -> Result<Arc<dyn Embedder>> {
        let settings = self.config.provider(provider);
        Ok(match provider {
            Provider::Gemini => Arc::new(GeminiEmbeddings::new(
                settings,
                &self.config.http,
                self.config.embedding_batch_size,
            )?),
            Provider::OpenAi => Arc::new(OpenAiEmbeddings::new(
                settings,
                &self.config.http,
                self.config.embedding_batch_size,
            )?),
        })
    }

    fn generator(&self, provider: Provider) -> Result<Arc<dyn Generator>> {
        let settings = self.config.provider(provider);
        Ok(match provider {
            Provider::Gemini => Arc::new(GeminiChat::new(settings, &self.config.http)?),
            Provider::OpenAi => Arc::new(OpenAiChat::new(settings, &self.config.http)?),
        })
    }
}
