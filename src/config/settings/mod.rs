
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::interactive::mask_secret;
use crate::providers::Provider;
use crate::providers::selection::Credentials;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_GEMINI_GENERATION_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_GENERATION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TOP_K: usize = 10;

/// Immutable process configuration, read once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub document_path: Option<PathBuf>,
    pub database: DatabaseConfig,
    /// Collection base name; the embedding provider suffix is appended per run
    pub collection_base: Option<String>,
    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,
    pub chunking: ChunkingConfig,
    pub http: HttpConfig,
    pub embedding_batch_size: usize,
    pub top_k: usize,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            document_path: None,
            database: DatabaseConfig::Parts {
                host: "localhost".to_string(),
                port: 5432,
                user: None,
                password: None,
                database: None,
            },
            collection_base: None,
            gemini: ProviderConfig {
                api_key: None,
                embedding_model: DEFAULT_GEMINI_EMBEDDING_MODEL.to_string(),
                generation_model: DEFAULT_GEMINI_GENERATION_MODEL.to_string(),
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            },
            openai: ProviderConfig {
                api_key: None,
                embedding_model: DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
                generation_model: DEFAULT_OPENAI_GENERATION_MODEL.to_string(),
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            },
            chunking: ChunkingConfig::default(),
            http: HttpConfig::default(),
            embedding_batch_size: 64,
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    Url(String),
    Parts {
        host: String,
        port: u16,
        user: Option<String>,
        password: Option<String>,
        database: Option<String>,
    },
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // The URL may embed a password; show the target only
            Self::Url(_) => f.debug_tuple("Url").field(&self.describe()).finish(),
            Self::Parts {
                host,
                port,
                user,
                password,
                database,
            } => f
                .debug_struct("Parts")
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .field("password", &password.as_deref().map(mask_secret))
                .field("database", database)
                .finish(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub generation_model: String,
    pub base_url: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("embedding_model", &self.embedding_model)
            .field("generation_model", &self.generation_model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for HttpConfig {
    #[inline]
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            retry_attempts: 3,
        }
    }
}

impl HttpConfig {
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which command the configuration has to satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Ingest,
    Chat,
    Search,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} (expected a number)")]
    InvalidNumber { name: &'static str, value: String },
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({overlap}) must not exceed chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
    #[error("Invalid embedding batch size: {0} (must be between 1 and 100)")]
    InvalidBatchSize(usize),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name for {0} (cannot be empty)")]
    InvalidModel(&'static str),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Incomplete database settings: missing {}", .0.join(", "))]
    IncompleteDatabase(Vec<&'static str>),
    #[error("Failed to read .env file: {0}")]
    EnvFile(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Config {
    /// Load `.env` (if present) and read the process environment
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => debug!("No .env file found"),
            Err(e) => return Err(ConfigError::EnvFile(e.to_string())),
        }

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from any variable source. Blank values count as unset.
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let get_or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let database = match get("DATABASE_URL") {
            Some(url) => DatabaseConfig::Url(url),
            None => DatabaseConfig::Parts {
                host: get_or("POSTGRES_HOST", "localhost"),
                port: parse_number("POSTGRES_PORT", get("POSTGRES_PORT"), 5432)?,
                user: get("POSTGRES_USER"),
                password: get("POSTGRES_PASSWORD"),
                database: get("POSTGRES_DB"),
            },
        };

        let config = Self {
            document_path: get("PDF_PATH").map(PathBuf::from),
            database,
            collection_base: get("PG_VECTOR_COLLECTION_NAME"),
            gemini: ProviderConfig {
                api_key: get("GOOGLE_API_KEY"),
                embedding_model: get_or("GOOGLE_EMBEDDING_MODEL", DEFAULT_GEMINI_EMBEDDING_MODEL),
                generation_model: get_or("GOOGLE_LLM_MODEL", DEFAULT_GEMINI_GENERATION_MODEL),
                base_url: get_or("GOOGLE_API_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            },
            openai: ProviderConfig {
                api_key: get("OPENAI_API_KEY"),
                embedding_model: get_or("OPENAI_EMBEDDING_MODEL", DEFAULT_OPENAI_EMBEDDING_MODEL),
                generation_model: get_or("OPENAI_LLM_MODEL", DEFAULT_OPENAI_GENERATION_MODEL),
                base_url: get_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            },
            chunking: ChunkingConfig {
                chunk_size: parse_number("CHUNK_SIZE", get("CHUNK_SIZE"), 1000)?,
                chunk_overlap: parse_number("CHUNK_OVERLAP", get("CHUNK_OVERLAP"), 150)?,
            },
            http: HttpConfig {
                timeout_secs: parse_number("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"), 60)?,
                retry_attempts: parse_number(
                    "REQUEST_RETRY_ATTEMPTS",
                    get("REQUEST_RETRY_ATTEMPTS"),
                    3,
                )?,
            },
            embedding_batch_size: parse_number(
                "EMBEDDING_BATCH_SIZE",
                get("EMBEDDING_BATCH_SIZE"),
                64,
            )?,
            top_k: DEFAULT_TOP_K,
        };

        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        self.gemini.validate("Gemini")?;
        self.openai.validate("OpenAI")?;

        if !(1..=100).contains(&self.embedding_batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.embedding_batch_size));
        }

        if !(1..=600).contains(&self.http.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.http.timeout_secs));
        }

        if !(1..=10).contains(&self.http.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.http.retry_attempts));
        }

        Ok(())
    }

    /// Names of the variables a command needs but that are absent
    #[inline]
    pub fn missing_for(&self, requirement: Requirement) -> Vec<String> {
        let mut missing = Vec::new();

        if requirement == Requirement::Ingest && self.document_path.is_none() {
            missing.push("PDF_PATH".to_string());
        }

        if self.gemini.api_key.is_none() && self.openai.api_key.is_none() {
            missing.push("GOOGLE_API_KEY or OPENAI_API_KEY".to_string());
        }

        missing.extend(self.database.missing().into_iter().map(str::to_string));

        if self.collection_base.is_none() {
            missing.push("PG_VECTOR_COLLECTION_NAME".to_string());
        }

        missing
    }

    #[inline]
    pub fn ensure(&self, requirement: Requirement) -> crate::Result<()> {
        let missing = self.missing_for(requirement);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(crate::RagError::MissingConfiguration(missing))
        }
    }

    #[inline]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.gemini.api_key.clone(), self.openai.api_key.clone())
    }

    #[inline]
    pub fn provider(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenAi => &self.openai,
        }
    }

    #[inline]
    pub fn collection_base(&self) -> crate::Result<&str> {
        self.collection_base.as_deref().ok_or_else(|| {
            crate::RagError::MissingConfiguration(vec!["PG_VECTOR_COLLECTION_NAME".to_string()])
        })
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap > self.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }

        Ok(())
    }
}

impl ProviderConfig {
    pub fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;

        if self.embedding_model.trim().is_empty() || self.generation_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(name));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Variables still needed to build a connection
    #[inline]
    pub fn missing(&self) -> Vec<&'static str> {
        match self {
            Self::Url(_) => Vec::new(),
            Self::Parts {
                user,
                password,
                database,
                ..
            } => [
                ("POSTGRES_USER", user),
                ("POSTGRES_PASSWORD", password),
                ("POSTGRES_DB", database),
            ]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect(),
        }
    }

    #[inline]
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        match self {
            Self::Url(url) => PgConnectOptions::from_str(&normalize_database_url(url))
                .map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string())),
            Self::Parts {
                host,
                port,
                user: Some(user),
                password: Some(password),
                database: Some(database),
            } => Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .password(password)
                .database(database)),
            Self::Parts { .. } => Err(ConfigError::IncompleteDatabase(self.missing())),
        }
    }

    /// Connection target without credentials, for messages
    #[inline]
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => match Url::parse(&normalize_database_url(url)) {
                Ok(parsed) => format!(
                    "{}:{}{}",
                    parsed.host_str().unwrap_or("localhost"),
                    parsed.port().unwrap_or(5432),
                    parsed.path()
                ),
                Err(_) => "<invalid database url>".to_string(),
            },
            Self::Parts {
                host,
                port,
                database,
                ..
            } => format!("{}:{}/{}", host, port, database.as_deref().unwrap_or("")),
        }
    }
}

/// Strip a SQLAlchemy driver suffix such as `postgresql+psycopg://`
#[inline]
pub fn normalize_database_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let scheme = scheme.split_once('+').map_or(scheme, |(base, _)| base);
            format!("{}://{}", scheme, rest)
        }
        None => url.to_string(),
    }
}

fn parse_number<T: FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        None => Ok(default),
    }
}
