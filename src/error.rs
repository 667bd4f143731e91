//! Error types for the MCP server.
//!
//! Driver failures arrive as [`DriverError`](crate::driver::DriverError) and are
//! mapped into the taxonomy below by the layer that knows what was being attempted.

use serde::{Deserialize, Serialize};

/// MCP server errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum McpError {
    /// Malformed caller input.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArg {
        /// Argument name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArg(String),

    /// The operation needs an open session and there is none.
    #[error("not connected to the database, connect first")]
    NotConnected,

    /// Named scope is not defined in the scope registry.
    #[error("scope '{scope}' not found. Available scopes: [{}]", .available.join(", "))]
    UnknownScope {
        /// Requested scope name
        scope: String,
        /// Scope names that are defined
        available: Vec<String>,
    },

    /// Schema lookup returned no columns.
    #[error("table not found or has no columns: {0}")]
    TableNotFound(String),

    /// The driver failed to open a session.
    #[error("connection failed: {0}")]
    ConnectionFailure(String),

    /// The driver failed to close a session.
    #[error("disconnect failed: {0}")]
    DisconnectFailure(String),

    /// The driver failed while listing, describing or querying.
    #[error("query failed: {0}")]
    QueryFailure(String),

    /// Required external configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unknown tool requested.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Shorthand for [`McpError::InvalidArg`].
    pub fn invalid_arg(name: impl Into<String>, reason: impl Into<String>) -> Self {
        McpError::InvalidArg {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs in a tool result rather than a JSON-RPC error.
    ///
    /// Tool failures are reported to the client as `isError` content so the
    /// caller sees the message; only protocol problems become JSON-RPC errors.
    pub fn is_tool_failure(&self) -> bool {
        !matches!(
            self,
            McpError::UnknownTool(_) | McpError::Protocol(_) | McpError::Io(_)
        )
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("JSON error: {}", err))
    }
}

/// JSON-RPC error codes.
pub mod rpc_codes {
    /// Parse error - Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl McpError {
    /// Convert to JSON-RPC error code.
    pub fn rpc_code(&self) -> i32 {
        match self {
            McpError::UnknownTool(_) => rpc_codes::METHOD_NOT_FOUND,
            McpError::MissingArg(_)
            | McpError::InvalidArg { .. }
            | McpError::UnknownScope { .. }
            | McpError::TableNotFound(_) => rpc_codes::INVALID_PARAMS,
            McpError::Protocol(_) => rpc_codes::INVALID_REQUEST,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_scope_lists_available() {
        let err = McpError::UnknownScope {
            scope: "missing".to_string(),
            available: vec!["hr".to_string(), "sales".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'missing'"));
        assert!(msg.contains("[hr, sales]"));
    }

    #[test]
    fn test_rpc_codes() {
        assert_eq!(
            McpError::UnknownTool("x".into()).rpc_code(),
            rpc_codes::METHOD_NOT_FOUND
        );
        assert_eq!(
            McpError::invalid_arg("table_name", "must not be blank").rpc_code(),
            rpc_codes::INVALID_PARAMS
        );
        assert_eq!(
            McpError::ConnectionFailure("refused".into()).rpc_code(),
            rpc_codes::INTERNAL_ERROR
        );
    }

    #[test]
    fn test_tool_failure_classification() {
        assert!(McpError::NotConnected.is_tool_failure());
        assert!(McpError::QueryFailure("boom".into()).is_tool_failure());
        assert!(!McpError::UnknownTool("nope".into()).is_tool_failure());
        assert!(!McpError::Protocol("bad".into()).is_tool_failure());
    }
}
