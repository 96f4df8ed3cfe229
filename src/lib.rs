use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingConfiguration(Vec<String>),

    #[error("No provider configured: set GOOGLE_API_KEY or OPENAI_API_KEY")]
    NoProviderConfigured,

    #[error("Document error: {0}")]
    Document(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod indexer;
pub mod providers;
pub mod search;
pub mod shell;

#[cfg(test)]
mod testing;
