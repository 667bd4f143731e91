//! # sqlscope-mcp
//!
//! MCP (Model Context Protocol) server for relational database introspection and
//! query execution.
//!
//! This crate exposes three tools to AI agents over JSON-RPC 2.0 on stdin/stdout:
//!
//! - **list_tables**: tables and views of the configured database, optionally
//!   filtered by a named scope
//! - **get_metadata**: column metadata and a few sample rows for one table
//! - **execute_query**: run a SQL statement and return every row
//!
//! Each tool call reads the connection settings from the environment, opens its
//! own session, and closes it before answering. No session outlives a call.
//!
//! ## Usage
//!
//! The server is typically run as an executable and configured in AI tools like Claude Desktop:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "sqlscope": {
//!       "command": "/path/to/sqlscope-mcp",
//!       "env": {
//!         "SQLSCOPE_HOST": "localhost",
//!         "SQLSCOPE_PORT": "5432",
//!         "SQLSCOPE_USERNAME": "reader",
//!         "SQLSCOPE_PASSWORD": "secret",
//!         "SQLSCOPE_DATABASE": "shop",
//!         "SQLSCOPE_SCOPES": "{\"sales\": [\"orders\", \"customers\"]}"
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! For testing or embedding, the server can run against any [`Driver`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use sqlscope_mcp::{McpServer, MemoryDriver, Settings, ToolContext};
//!
//! let driver = MemoryDriver::new().with_database_named("shop");
//! let ctx = ToolContext::new(Arc::new(driver), Settings::from_env("SQLSCOPE"));
//! let server = McpServer::new(ctx);
//!
//! // Run the server (reads from stdin, writes to stdout)
//! // server.run_sync().expect("Server error");
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod convert;
pub mod driver;
pub mod error;
pub mod scope;
pub mod server;
pub mod service;
pub mod session;
pub mod tools;

pub use config::{ConnectionConfig, Settings, DEFAULT_ENV_PREFIX};
pub use convert::{QueryResult, TableListing, TableMetadata};
pub use driver::memory::MemoryDriver;
pub use driver::pg::PostgresDriver;
pub use driver::{Connection, Cursor, Driver, DriverError};
pub use error::{McpError, Result};
pub use scope::ScopeRegistry;
pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer};
pub use service::{QueryService, SchemaService};
pub use session::SessionHandle;
pub use tools::{ToolContext, ToolDef, ToolRegistry};
