use clap::Parser;
use mock_weather_mcp::Result;
use mock_weather_mcp::commands::serve_mcp;

/// Mock weather MCP server speaking JSON-RPC over stdin/stdout.
///
/// Exposes a single tool, `get_current_temperature`, that reports a random
/// temperature between 0 and 30 °C for the requested city.
#[derive(Parser)]
#[command(name = "mock-weather-mcp")]
#[command(version)]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol messages, so diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let Cli {} = Cli::parse();

    serve_mcp().await
}
