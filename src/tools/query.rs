//! Query execution tools.
//!
//! Tools: execute_query

use serde_json::{Map, Value as JsonValue};

use crate::convert::{get_string_arg, to_json};
use crate::error::{McpError, Result};
use crate::schema;
use crate::service::query::validate_sql;
use crate::service::QueryService;
use crate::tools::{ToolContext, ToolDef};

/// Get all query tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![ToolDef::new(
        "execute_query",
        "Execute a SQL statement against the configured database and return \
         {columns, rows, row_count}. All rows are returned; values are strings or null.",
        schema!(object {
            required: { "sql_query": string }
        }),
    )]
}

/// Dispatch a query tool call.
pub fn dispatch(ctx: &ToolContext, name: &str, args: Map<String, JsonValue>) -> Result<JsonValue> {
    match name {
        "execute_query" => {
            let sql = get_string_arg(&args, "sql_query")?;
            validate_sql(&sql)?;
            let result = ctx.with_session(|session| QueryService::new(session).execute_query(&sql))?;
            to_json(&result)
        }
        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}
