use crate::mcp::McpServer;
use crate::weather::{GetCurrentTemperatureHandler, TOOL_NAME, TemperatureSource, ThreadRngSource};
use crate::{Result, WeatherError};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Name the server reports in its `serverInfo`
pub const SERVER_NAME: &str = "weather";

/// Version the server reports in its `serverInfo`
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the weather server with its single tool registered
#[inline]
pub async fn build_server<S>(source: S) -> Result<Arc<McpServer>>
where
    S: TemperatureSource + 'static,
{
    let server = Arc::new(McpServer::new(
        SERVER_NAME.to_string(),
        SERVER_VERSION.to_string(),
    ));

    server
        .register_tool(
            GetCurrentTemperatureHandler::tool_definition(),
            GetCurrentTemperatureHandler::new(source),
        )
        .await
        .with_context(|| format!("Failed to register {} tool", TOOL_NAME))?;

    Ok(server)
}

/// Serve `server` over stdin/stdout until the client closes stdin
#[inline]
pub async fn run(server: Arc<McpServer>) -> Result<()> {
    server
        .serve_stdio()
        .await
        .map_err(|e| WeatherError::Mcp(format!("stdio transport failed: {:#}", e)))
}

/// Start the weather MCP server on stdio
#[inline]
pub async fn serve_mcp() -> Result<()> {
    let server = build_server(ThreadRngSource).await?;
    info!(
        "Serving '{}' v{} with tool {}",
        SERVER_NAME, SERVER_VERSION, TOOL_NAME
    );
    run(server).await
}
