use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_deep_research::{
    cli::{execute_command, Cli, Commands},
    config::{Config, LogFormat},
    llm::OpenAiClient,
    server::{AppState, McpServer},
    storage::SqliteStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "MCP Deep Research Server starting..."
    );

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let llm = match OpenAiClient::new(&config.llm, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.llm.base_url, model = %config.llm.model, "LLM client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize LLM client");
            return Err(e.into());
        }
    };

    let state = Arc::new(AppState::new(config, Arc::new(storage), Arc::new(llm))?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let server = McpServer::new(state);
            info!("Server ready, waiting for requests on stdin...");

            if let Err(e) = server.run().await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }

            info!("Server shutdown complete");
            Ok(())
        }
        command => {
            let result = execute_command(command, &state).await;
            if result.exit_code == 0 {
                println!("{}", result.message);
            } else {
                eprintln!("{}", result.message);
            }
            std::process::exit(result.exit_code);
        }
    }
}

/// Initialize tracing/logging. Output goes to stderr; stdout carries the
/// MCP channel.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
