use anyhow::Result;
use clap::{Parser, Subcommand};
use pdf_chat::commands::{check_backend, chat_with_document, load_config, serve};
use pdf_chat::config::{get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-chat")]
#[command(about = "Chat with a PDF document through a local retrieval-augmented pipeline")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, uploads and vector data
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Start the HTTP chat server
    Serve {
        /// Address to listen on, overrides server.host
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on, overrides server.port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Load a PDF and chat about it in the terminal
    Chat {
        /// Path to the PDF document
        pdf: PathBuf,
    },
    /// Check that the model backend is reachable and the models are installed
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir.as_deref();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&load_config(config_dir)?);
            } else {
                let dir = match config_dir {
                    Some(dir) => dir.to_path_buf(),
                    None => get_config_dir()?,
                };
                run_interactive_config(&dir)?;
            }
        }
        Commands::Serve { host, port } => {
            serve(load_config(config_dir)?, host, port).await?;
        }
        Commands::Chat { pdf } => {
            chat_with_document(load_config(config_dir)?, &pdf).await?;
        }
        Commands::Check => {
            check_backend(&load_config(config_dir)?).await?;
        }
    }

    Ok(())
}
