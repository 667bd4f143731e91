//! Schema introspection tools.
//!
//! Tools: list_tables, get_metadata

use serde_json::{Map, Value as JsonValue};

use crate::convert::{get_optional_i64, get_optional_string, get_string_arg, to_json};
use crate::error::{McpError, Result};
use crate::schema;
use crate::service::schema::{validate_metadata_args, DEFAULT_SAMPLE_ROWS};
use crate::service::SchemaService;
use crate::tools::{ToolContext, ToolDef};

/// Get all schema tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            "list_tables",
            "List the tables and views of the configured database. Pass a scope name to \
             restrict the listing to the tables configured for that scope. Returns \
             {database, tables, views, total_count}.",
            schema!(object {
                optional: { "scope": string }
            }),
        ),
        ToolDef::new(
            "get_metadata",
            "Describe one table: column names, display names, types, uniqueness, \
             nullability, precision and scale, plus a few sample rows. Set sample_rows \
             to 0 to skip the sample.",
            schema!(object {
                required: { "table_name": string },
                optional: { "sample_rows": (integer = 3) }
            }),
        ),
    ]
}

/// Dispatch a schema tool call.
pub fn dispatch(ctx: &ToolContext, name: &str, args: Map<String, JsonValue>) -> Result<JsonValue> {
    match name {
        "list_tables" => {
            let scope = get_optional_string(&args, "scope")?;
            let registry = ctx.settings().scope_registry();
            let listing = ctx.with_session(|session| {
                SchemaService::new(session).list_tables(scope.as_deref(), &registry)
            })?;
            to_json(&listing)
        }
        "get_metadata" => {
            let table = get_string_arg(&args, "table_name")?;
            let sample_rows = get_optional_i64(&args, "sample_rows")?.unwrap_or(DEFAULT_SAMPLE_ROWS);
            validate_metadata_args(&table, sample_rows)?;
            let metadata = ctx.with_session(|session| {
                SchemaService::new(session).get_table_metadata(&table, sample_rows)
            })?;
            to_json(&metadata)
        }
        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}
