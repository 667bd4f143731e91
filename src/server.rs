//! MCP server implementation.
//!
//! Handles JSON-RPC 2.0 over stdio according to the MCP protocol specification.
//! Requests are answered one line at a time; notifications get no response.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::error::{rpc_codes, McpError, Result};
use crate::tools::{ToolContext, ToolRegistry};

/// MCP protocol version we support.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server information.
const SERVER_NAME: &str = "sqlscope-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, must be "2.0"
    pub jsonrpc: String,
    /// Request id; absent for notifications. An explicit `null` is kept as
    /// `Some(Null)`.
    #[serde(default, deserialize_with = "deserialize_present")]
    pub id: Option<JsonValue>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Option<JsonValue>,
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,
    /// Id of the request being answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    /// Result on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Error on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code, see [`rpc_codes`]
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<JsonValue>, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonValue>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Create an error response from an McpError.
    pub fn from_error(id: Option<JsonValue>, err: McpError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }
}

/// Wrap a tool result in the MCP content envelope.
fn tool_content(text: String, is_error: bool) -> JsonValue {
    let mut result = serde_json::json!({
        "content": [{
            "type": "text",
            "text": text
        }]
    });
    if is_error {
        result["isError"] = JsonValue::Bool(true);
    }
    result
}

/// MCP server.
///
/// Holds no per-connection state, so one instance can answer requests from
/// several threads.
pub struct McpServer {
    ctx: ToolContext,
    registry: ToolRegistry,
}

impl McpServer {
    /// Create a new MCP server for the given tool context.
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            ctx,
            registry: ToolRegistry::new(),
        }
    }

    /// Run the server, reading from stdin and writing to stdout.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve line-delimited requests from `reader` until EOF.
    ///
    /// Each request runs on the blocking pool, since driver calls block.
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // EOF - client disconnected
                break;
            }

            let request = line.trim().to_string();
            if request.is_empty() {
                continue;
            }

            let server = Arc::clone(&self);
            let response = tokio::task::spawn_blocking(move || server.handle_line(&request))
                .await
                .unwrap_or_else(|e| {
                    error!("Request handler failed: {}", e);
                    Some(JsonRpcResponse::error(
                        None,
                        rpc_codes::INTERNAL_ERROR,
                        format!("Internal error: {}", e),
                    ))
                });

            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    /// Run the server synchronously (for non-tokio environments).
    pub fn run_sync(&self) -> Result<()> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.serve_sync(stdin.lock(), stdout.lock())
    }

    /// Serve line-delimited requests from `reader` until EOF, blocking.
    pub fn serve_sync<R: BufRead, W: Write>(&self, mut reader: R, mut writer: W) -> Result<()> {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;

            if bytes_read == 0 {
                // EOF - client disconnected
                break;
            }

            let request = line.trim();
            if request.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(request) {
                let response_json = serde_json::to_string(&response)?;
                writeln!(writer, "{}", response_json)?;
                writer.flush()?;
            }
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    /// Parse and answer one request line. `None` for notifications.
    pub fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request),
            Err(e) => {
                warn!("Unparseable request: {}", e);
                Some(JsonRpcResponse::error(
                    None,
                    rpc_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle a single JSON-RPC request.
    pub fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.id.is_none() {
            debug!(method = %request.method, "Notification received");
            return None;
        }

        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_REQUEST,
                "Invalid JSON-RPC version".to_string(),
            ));
        }

        debug!(method = %request.method, "Request received");
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "tools/list" => self.handle_tools_list(request),
            "tools/call" => self.handle_tools_call(request),
            "prompts/list" => {
                JsonRpcResponse::success(request.id, serde_json::json!({ "prompts": [] }))
            }
            "resources/list" => {
                JsonRpcResponse::success(request.id, serde_json::json!({ "resources": [] }))
            }
            "ping" => JsonRpcResponse::success(request.id, serde_json::json!({})),
            _ => JsonRpcResponse::error(
                request.id,
                rpc_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            ),
        };
        Some(response)
    }

    fn instructions(&self) -> String {
        let settings = self.ctx.settings();
        format!(
            "Inspect and query a relational database. Use list_tables to see the \
             available tables and views (optionally filtered by a scope), get_metadata \
             to describe a table's columns with sample rows, and execute_query to run \
             SQL. The connection is configured through the environment variables {}, \
             {}, {}, {} and {}; {} may hold a JSON object mapping scope names to table \
             lists.",
            settings.var_name("HOST"),
            settings.var_name("PORT"),
            settings.var_name("USERNAME"),
            settings.var_name("PASSWORD"),
            settings.var_name("DATABASE"),
            settings.var_name("SCOPES"),
        )
    }

    /// Handle the initialize request.
    fn handle_initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        info!("Client initialized session");
        JsonRpcResponse::success(
            request.id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "prompts": {},
                    "resources": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION
                },
                "instructions": self.instructions()
            }),
        )
    }

    /// Handle the tools/list request.
    fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let tools: Vec<JsonValue> = self
            .registry
            .tools()
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema
                })
            })
            .collect();

        JsonRpcResponse::success(request.id, serde_json::json!({ "tools": tools }))
    }

    /// Handle the tools/call request.
    fn handle_tools_call(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        // Extract name and arguments from params
        let params = match &request.params {
            Some(JsonValue::Object(obj)) => obj,
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "Missing params object".to_string(),
                )
            }
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n.to_string(),
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "Missing 'name' in params".to_string(),
                )
            }
        };

        let arguments = match params.get("arguments") {
            Some(JsonValue::Object(obj)) => obj.clone(),
            Some(JsonValue::Null) | None => Map::new(),
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "'arguments' must be an object".to_string(),
                )
            }
        };

        // Dispatch the tool call
        let outcome = self
            .registry
            .dispatch(&self.ctx, &name, arguments)
            .and_then(|result| tool_text(&result));
        tool_response(request.id, &name, outcome)
    }
}

/// Render a tool result as the text of its content block.
fn tool_text<T: Serialize>(result: &T) -> Result<String> {
    serde_json::to_string(result)
        .map_err(|e| McpError::Internal(format!("failed to serialize tool result: {}", e)))
}

/// Answer a tools/call: domain failures become `isError` results, protocol
/// failures become JSON-RPC errors.
fn tool_response(id: Option<JsonValue>, name: &str, outcome: Result<String>) -> JsonRpcResponse {
    match outcome {
        Ok(text) => JsonRpcResponse::success(id, tool_content(text, false)),
        Err(err) if err.is_tool_failure() => {
            warn!(tool = %name, "Tool call failed: {}", err);
            JsonRpcResponse::success(id, tool_content(format!("Error: {}", err), true))
        }
        Err(err) => JsonRpcResponse::from_error(id, err),
    }
}
