mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lustre::config::LustreConfig;

#[derive(Parser)]
#[command(name = "lustre", version, about = "Catalog image similarity search with hybrid image+text ranking")]
struct Cli {
    /// Config file (defaults to ~/.lustre/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the search server
    Serve {
        /// `http` (search endpoints + MCP at /mcp) or `stdio` (MCP only)
        #[arg(long)]
        transport: Option<String>,
    },
    /// Manage model files
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Manage the vector index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Manage the product catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Search the catalog from the command line
    Search {
        /// Query image
        #[arg(long)]
        image: Option<PathBuf>,
        /// Query text (combined with --image for a hybrid search)
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
        /// Ignored for hybrid searches
        #[arg(long)]
        min_percent: Option<f64>,
        /// Print hits as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show catalog and index statistics
    Stats,
    /// Check database, index, and model files
    Doctor,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the CLIP and background models to ~/.lustre/models/
    Download,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed every catalog image and write a new index
    Build {
        /// Images directory (defaults to storage.images_dir)
        #[arg(long)]
        images: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Create the product database
    Init,
    /// Upsert one product per image (sku = title = file stem)
    Import {
        /// Images directory (defaults to storage.images_dir)
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LustreConfig::load_from(path)?,
        None => LustreConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC and command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = transport.unwrap_or_else(|| config.server.transport.clone());
            match transport.as_str() {
                "http" => server::serve_http(config).await?,
                "stdio" => server::serve_stdio(config).await?,
                other => anyhow::bail!("unknown transport: {other}. Supported: http, stdio"),
            }
        }
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config).await?,
        },
        Command::Index { action } => match action {
            IndexAction::Build { images } => cli::build_index::build_index(&config, images)?,
        },
        Command::Catalog { action } => match action {
            CatalogAction::Init => cli::catalog::init(&config)?,
            CatalogAction::Import { dir } => cli::catalog::import(&config, dir)?,
        },
        Command::Search {
            image,
            text,
            top_k,
            min_percent,
            json,
        } => {
            let args = cli::search::SearchArgs {
                image,
                text,
                top_k,
                min_percent,
                json,
            };
            cli::search::search(&config, args).await?;
        }
        Command::Stats => cli::stats::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
