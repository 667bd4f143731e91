//! Tool registry and category definitions.
//!
//! Provides the infrastructure for registering and dispatching MCP tools. Every
//! call reads configuration, opens its own session, runs one service operation
//! and disconnects before returning.

pub mod query;
pub mod schema;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::driver::Driver;
use crate::error::{McpError, Result};
use crate::session::SessionHandle;

/// A tool definition for the MCP tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name (e.g., "list_tables")
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, input_schema: JsonValue) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// What a tool call needs from the process: a driver and a configuration source.
#[derive(Clone)]
pub struct ToolContext {
    driver: Arc<dyn Driver>,
    settings: Settings,
}

impl ToolContext {
    /// Create a context from a driver and a configuration source.
    pub fn new(driver: Arc<dyn Driver>, settings: Settings) -> Self {
        Self { driver, settings }
    }

    /// Configuration source.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Connect, run `work`, disconnect.
    ///
    /// The session is released on every exit path. A failed disconnect is
    /// logged and does not replace the outcome of `work`.
    pub fn with_session<T>(&self, work: impl FnOnce(&mut SessionHandle) -> Result<T>) -> Result<T> {
        let config = self.settings.connection_config()?;
        let mut session = SessionHandle::new(Arc::clone(&self.driver));
        session.connect(config)?;

        let outcome = work(&mut session);

        if let Err(e) = session.disconnect() {
            warn!("Failed to disconnect cleanly: {}", e);
        }
        outcome
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("driver", &self.driver.name())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Registry of all available tools.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    /// Create a new registry with all tools registered.
    pub fn new() -> Self {
        let mut tools = Vec::new();
        tools.extend(schema::tools());
        tools.extend(query::tools());
        Self { tools }
    }

    /// Get all tool definitions.
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    /// Dispatch a tool call to the appropriate handler.
    pub fn dispatch(
        &self,
        ctx: &ToolContext,
        name: &str,
        args: Map<String, JsonValue>,
    ) -> Result<JsonValue> {
        debug!(tool = name, "Dispatching tool call");
        match name {
            "list_tables" | "get_metadata" => schema::dispatch(ctx, name, args),
            "execute_query" => query::dispatch(ctx, name, args),
            _ => Err(McpError::UnknownTool(name.to_string())),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper macro for creating JSON Schema for tool input parameters.
#[macro_export]
macro_rules! schema {
    // Object with required and optional properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? },
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        let mut required = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), schema!(@type $req_type));)*
        $(props.insert($opt_name.to_string(), schema!(@type $opt_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Object with only required properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? }
    }) => {{
        let mut required = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), schema!(@type $req_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Object with only optional properties
    (object {
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        let mut props = serde_json::Map::new();
        $(props.insert($opt_name.to_string(), schema!(@type $opt_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": []
        })
    }};

    // Type mappings
    (@type string) => { serde_json::json!({"type": "string"}) };
    (@type integer) => { serde_json::json!({"type": "integer"}) };
    (@type (integer = $default:literal)) => {
        serde_json::json!({"type": "integer", "default": $default})
    };
}
