use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, get_config_dir};
use crate::conversation::ModelClients;
use crate::ollama::{OllamaTransport, health_check};
use crate::server;
use crate::session::SessionManager;

/// Load configuration from `config_dir` (or the default directory) with environment overrides
#[inline]
pub fn load_config(config_dir: Option<&Path>) -> Result<Config> {
    let dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => get_config_dir()?,
    };
    Config::load_with_env(&dir)
        .with_context(|| format!("Failed to load configuration from {}", dir.display()))
}

/// Start the HTTP chat server
#[inline]
pub async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    if let Err(e) = backend_health(&config).await {
        warn!("Model backend is not ready: {:#}", e);
        eprintln!(
            "{} {:#}",
            style("⚠ Model backend is not ready:").yellow(),
            e
        );
    }

    let clients = ModelClients::from_config(&config.ollama)?;
    let manager = Arc::new(SessionManager::new(config, clients));

    eprintln!(
        "{} http://{}",
        style("📄 PDF chat server listening on").bold().green(),
        addr
    );
    server::serve(manager, addr).await
}

/// Ingest a PDF and answer questions about it from the terminal
#[inline]
pub async fn chat_with_document(config: Config, pdf: &Path) -> Result<()> {
    let clients = ModelClients::from_config(&config.ollama)?;
    let manager = SessionManager::new(config, clients);

    let bar = spinner(format!("Processing {}", pdf.display()));
    let result = manager.ingest(pdf).await;
    bar.finish_and_clear();
    let chunks =
        result.with_context(|| format!("Failed to process {}", pdf.display()))?;

    println!(
        "{} {} ({} chunks). Ask away, or type {} to leave.",
        style("✓ Loaded").green(),
        style(pdf.display()).cyan(),
        chunks,
        style("exit").bold()
    );
    info!("Interactive chat started for {}", pdf.display());

    loop {
        let question: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let question = question.trim();

        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        let bar = spinner("Thinking".to_string());
        let answer = manager.ask(question).await;
        bar.finish_and_clear();

        match answer {
            Ok(answer) => println!("{} {}\n", style("Bot:").bold().cyan(), answer),
            Err(e) => println!("{} {}\n", style("Error:").bold().red(), e),
        }
    }

    let turns = manager.history().await.len();
    manager
        .close()
        .await
        .context("Failed to release the document index")?;
    println!("Conversation ended after {} questions.", turns);
    Ok(())
}

/// Ping the model backend and verify both configured models are installed
#[inline]
pub async fn check_backend(config: &Config) -> Result<()> {
    println!(
        "Checking Ollama at {}",
        style(config.ollama_url()?).cyan()
    );

    match backend_health(config).await {
        Ok(()) => {
            println!("{}", style("✓ Server reachable").green());
            println!(
                "{} {}",
                style("✓ Embedding model available:").green(),
                config.ollama.embedding_model
            );
            println!(
                "{} {}",
                style("✓ Chat model available:").green(),
                config.ollama.chat_model
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {:#}", style("✗ Backend check failed:").red(), e);
            println!("Run 'pdf-chat config' to change the connection settings.");
            Err(e)
        }
    }
}

async fn backend_health(config: &Config) -> Result<()> {
    let transport = OllamaTransport::new(&config.ollama)?.with_retry_attempts(1);
    let models = [
        config.ollama.embedding_model.clone(),
        config.ollama.chat_model.clone(),
    ];

    tokio::task::spawn_blocking(move || {
        let names: Vec<&str> = models.iter().map(String::as_str).collect();
        health_check(&transport, &names)
    })
    .await
    .context("Health check task failed")?
}

fn spinner(message: String) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}...")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
