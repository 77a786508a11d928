mod commands;

use clap::{Parser, Subcommand};
use commands::Workspace;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hydrorag")]
#[command(about = "Ask your equipment manuals", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an API secret in the system keyring
    Auth {
        /// Service the secret belongs to (openai, erp)
        service: String,
    },

    /// Index a folder of manuals
    Build {
        /// Folder to index
        folder: PathBuf,

        /// Use the deterministic offline embedder instead of OpenAI
        #[arg(long)]
        offline: bool,
    },

    /// Show the chunks nearest to a query
    Query {
        /// Query text
        text: String,

        /// Number of chunks to return
        #[arg(short, long, default_value = "10")]
        k: usize,
    },

    /// Answer a question from the manuals (interactive when omitted)
    Ask {
        /// Question to answer
        question: Option<String>,
    },

    /// Recommend a treatment train for a water analysis
    Recommend {
        /// Lab record as JSON
        #[arg(long)]
        record: PathBuf,

        /// Customer request
        #[arg(long)]
        query: String,
    },

    /// Show index statistics
    Stats,
}

fn get_data_dir(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path.unwrap_or_else(|| {
        hydrorag_core::config::default_data_dir().unwrap_or_else(|_| PathBuf::from(".hydrorag"))
    })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let workspace = Workspace::open(get_data_dir(cli.data_dir))?;

    match cli.command {
        Commands::Auth { service } => {
            commands::auth::run(&service, &workspace)?;
        }
        Commands::Build { folder, offline } => {
            commands::build::run(&folder, offline, &workspace).await?;
        }
        Commands::Query { text, k } => {
            commands::query::run(&text, k, &workspace).await?;
        }
        Commands::Ask { question } => {
            commands::ask::run(question.as_deref(), &workspace).await?;
        }
        Commands::Recommend { record, query } => {
            commands::recommend::run(&record, &query, &workspace).await?;
        }
        Commands::Stats => {
            commands::stats::run(&workspace)?;
        }
    }

    Ok(())
}
