// Configuration management module
// Reads the process environment (and an optional .env file) into an immutable Config

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ChunkingConfig, Config, ConfigError, DatabaseConfig, HttpConfig, ProviderConfig, Requirement,
};
