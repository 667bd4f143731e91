//! MCP server for relational databases.
//!
//! Run with `sqlscope-mcp`; connection settings come from `SQLSCOPE_*`
//! environment variables, read on every tool call.

use std::sync::Arc;

use clap::Parser;
use sqlscope_mcp::{McpServer, PostgresDriver, Settings, ToolContext, DEFAULT_ENV_PREFIX};
use tracing_subscriber::EnvFilter;

/// MCP server for relational database introspection and queries.
///
/// Exposes table listing, table metadata and SQL execution as MCP tools for
/// AI agents. Communicates via JSON-RPC 2.0 over stdin/stdout.
#[derive(Parser)]
#[command(name = "sqlscope-mcp")]
#[command(version, about, long_about = None)]
struct Args {
    /// Prefix of the environment variables holding the connection settings
    /// (<PREFIX>_HOST, _PORT, _USERNAME, _PASSWORD, _DATABASE, _SCOPES).
    #[arg(long, value_name = "PREFIX", default_value = DEFAULT_ENV_PREFIX)]
    env_prefix: String,

    /// Enable debug logging to stderr.
    #[arg(long, short)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sqlscope_mcp={}", default_level)));

    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    tracing::info!(
        prefix = %args.env_prefix,
        "Starting sqlscope-mcp {}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = Settings::from_env(&args.env_prefix);
    let ctx = ToolContext::new(Arc::new(PostgresDriver::new()), settings);
    let server = McpServer::new(ctx);

    // Run the server
    if let Err(e) = server.run_sync() {
        eprintln!("Error: Server error: {}", e);
        std::process::exit(1);
    }
}
