use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use slack_mcp::Config;
use slack_mcp::SlackClient;
use slack_mcp::mcp::{McpServer, RequestHandler};

/// MCP server exposing Slack workspace operations as tools over stdio
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Optional configuration file (TOML, YAML or JSON)
    #[arg(env = "SLACK_MCP_CONFIG")]
    config: Option<String>,

    /// Skip the auth.test call made at startup
    #[arg(long)]
    skip_connection_test: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_logging()?;

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    // A missing token leaves the server running without tools
    let slack_client = match SlackClient::from_config(&config) {
        Ok(client) => {
            let client = Arc::new(client);
            if !args.skip_connection_test {
                if client.test_connection().await {
                    info!("Connected to Slack");
                } else {
                    warn!("Slack connection test failed; tool calls may return errors");
                }
            }
            Some(client)
        }
        Err(e) => {
            warn!("Slack client not initialized: {}", e);
            None
        }
    };

    let mcp_server = McpServer::new(RequestHandler::new(slack_client));

    // Set up graceful shutdown
    let shutdown_signal = tokio::signal::ctrl_c();

    tokio::select! {
        result = mcp_server.run() => {
            if let Err(e) = result {
                error!("MCP server error: {}", e);
            }
        }
        _ = shutdown_signal => {
            info!("Shutting down");
        }
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    // Support both LOG_LEVEL and RUST_LOG environment variables
    let filter = if let Ok(rust_log) = std::env::var("RUST_LOG") {
        tracing_subscriber::EnvFilter::try_new(rust_log)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    } else if let Ok(log_level) = std::env::var("LOG_LEVEL") {
        let level_str = match log_level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            _ => "warn",
        };
        tracing_subscriber::EnvFilter::new(level_str)
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr) // stdout carries the protocol
        .compact()
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
