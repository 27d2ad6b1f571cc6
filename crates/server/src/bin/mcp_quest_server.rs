use anyhow::Context;
use deployment::Deployment;
use rmcp::{ServiceExt, transport::stdio};
use server::{DeploymentImpl, mcp::quest_server::QuestServer};
use services::services::config::Config;
use tracing_subscriber::{EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries the MCP protocol, so logs go to stderr
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_new(format!(
        "warn,server={log_level},services={log_level},db={log_level},rmcp=warn"
    ))
    .or_else(|_| EnvFilter::try_new("info"))
    .context("failed to build tracing filter")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_filter(env_filter),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    let profile_id = config.default_profile_id;
    let deployment = DeploymentImpl::new(config).await?;

    tracing::info!(profile_id = %profile_id, "Starting MCP quest server on stdio");
    let service = QuestServer::new(deployment, profile_id)
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("Failed to start MCP server: {}", e))?;
    service.waiting().await?;
    Ok(())
}
