use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use pdf_rag_chat::commands::{chat, configure, format_missing, ingest, search};
use pdf_rag_chat::config::Config;
use pdf_rag_chat::shell::ShellExit;
use pdf_rag_chat::{RagError, Result};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pdf-rag-chat")]
#[command(about = "Ask questions about a PDF, answered only from its content")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split, embed and store the document named by PDF_PATH
    Ingest {
        /// Clear the collection before storing
        #[arg(long)]
        reset: bool,
    },
    /// Start the interactive question loop
    Chat,
    /// Show the stored chunks closest to a query
    Search {
        /// Text to search for
        query: String,
        /// Number of chunks to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Configure credentials, database and document path
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RagError::MissingConfiguration(names)) => {
            eprintln!("{}", style(format_missing(&names)).red());
            eprintln!(
                "Set them in the environment or a .env file, or run `pdf-rag-chat config`."
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Config { show } => configure(show, Path::new(".env")),
        Commands::Ingest { reset } => {
            let config = Config::from_env()?;
            ingest(&config, reset).await.map(|_| ())
        }
        Commands::Chat => {
            let config = Config::from_env()?;
            if chat(&config).await? == ShellExit::Interrupted {
                // A pending stdin read would keep the runtime from shutting down
                std::process::exit(0);
            }
            Ok(())
        }
        Commands::Search { query, limit } => {
            let config = Config::from_env()?;
            search(&config, &query, limit).await
        }
    }
}
