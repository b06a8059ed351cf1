use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcx_cli::cli::{self, Args};
use mcx_cli::{shell, ChatSession};
use mcx_mcp_client::{McpManager, StdioConnector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials may live in a .env file next to the config.
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_cli_tracing();

    if args.check {
        if !cli::check(&args)? {
            std::process::exit(1);
        }
        return Ok(());
    }

    let loaded = mcx_domain::config::load(&args.load_request()?).context("loading configuration")?;
    let config = loaded.config;
    let provider = mcx_providers::build_provider(&config.model).context("creating model provider")?;

    let connector = StdioConnector::new(config.settings.tool_timeout());
    let manager = McpManager::connect_all(&config.servers, &config.settings, &connector).await?;

    eprintln!("Model: {} - {}", config.model.provider, config.model.model);
    eprintln!(
        "Connected {} server(s), {} tool(s) available",
        manager.server_count(),
        manager.tool_count()
    );
    for down in manager.unreachable() {
        eprintln!("Could not reach '{}': {}", down.name, down.last_error);
    }

    let mut session = ChatSession::new(provider, manager, &config.settings);
    let result = shell::run(&mut session).await;
    session.shutdown().await;

    eprintln!("Goodbye!");
    result
}

/// Compact, human-readable logs on stderr. `RUST_LOG` overrides the
/// default `warn` level.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
