//! Conversion of driver results into the tool response shapes.
//!
//! Every cell is carried as a JSON string or `null`; a SQL NULL never turns
//! into an empty string. Serialization goes through `serde_json`, which
//! escapes quotes, backslashes and control characters.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::driver::{type_codes, ColumnInfo, Row};
use crate::error::{McpError, Result};

/// Names for the fixed driver type codes.
const TYPE_NAMES: &[(i32, &str)] = &[
    (type_codes::VARCHAR, "VARCHAR"),
    (type_codes::INTEGER, "INTEGER"),
    (type_codes::REAL, "REAL"),
    (type_codes::DATE, "DATE"),
    (type_codes::TIME, "TIME"),
    (type_codes::TIMESTAMP, "TIMESTAMP"),
    (type_codes::OBJECT, "OBJECT"),
    (type_codes::NUMERIC, "NUMERIC"),
    (type_codes::INTERVAL, "INTERVAL"),
];

/// Type name for a driver type code; unmapped codes render as `UNKNOWN(<code>)`.
pub fn type_name(code: i32) -> String {
    TYPE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("UNKNOWN({})", code))
}

/// Full column description returned by `get_metadata`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub display_name: String,
    /// Driver type code
    #[serde(rename = "type")]
    pub type_code: i32,
    /// Name for `type_code`
    pub type_name: String,
    pub unique: bool,
    pub nullable: bool,
    pub precision: i32,
    pub scale: i32,
}

impl From<&ColumnInfo> for ColumnDescriptor {
    fn from(col: &ColumnInfo) -> Self {
        Self {
            name: col.name.clone(),
            display_name: col.display_name.clone(),
            type_code: col.type_code,
            type_name: type_name(col.type_code),
            unique: col.is_unique(),
            nullable: col.is_nullable(),
            precision: col.precision,
            scale: col.scale,
        }
    }
}

/// Reduced column description returned by `execute_query`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryColumn {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub type_code: i32,
}

impl From<&ColumnInfo> for QueryColumn {
    fn from(col: &ColumnInfo) -> Self {
        Self {
            name: col.name.clone(),
            display_name: col.display_name.clone(),
            type_code: col.type_code,
        }
    }
}

/// Result of `list_tables`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableListing {
    pub database: String,
    pub tables: Vec<String>,
    pub views: Vec<String>,
    pub total_count: usize,
}

impl TableListing {
    /// Build a listing; `total_count` is derived.
    pub fn new(database: impl Into<String>, tables: Vec<String>, views: Vec<String>) -> Self {
        Self {
            database: database.into(),
            total_count: tables.len() + views.len(),
            tables,
            views,
        }
    }
}

/// Result of `get_metadata`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMetadata {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub sample_data: Vec<Row>,
}

impl TableMetadata {
    /// Format a table's schema and sample rows.
    pub fn new(table: impl Into<String>, schema: &[ColumnInfo], sample_data: Vec<Row>) -> Self {
        Self {
            table: table.into(),
            columns: schema.iter().map(ColumnDescriptor::from).collect(),
            sample_data,
        }
    }
}

/// Result of `execute_query`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<QueryColumn>,
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl QueryResult {
    /// Format a cursor description and its rows; `row_count` is derived.
    pub fn new(description: &[ColumnInfo], rows: Vec<Row>) -> Self {
        Self {
            columns: description.iter().map(QueryColumn::from).collect(),
            row_count: rows.len(),
            rows,
        }
    }
}

/// Serialize a result shape into a JSON value.
pub fn to_json<T: Serialize>(value: &T) -> Result<JsonValue> {
    serde_json::to_value(value).map_err(|e| McpError::Internal(e.to_string()))
}

/// Helper to get a required string argument from JSON arguments.
pub fn get_string_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String> {
    match args.get(name) {
        Some(JsonValue::String(s)) => Ok(s.clone()),
        None | Some(JsonValue::Null) => Err(McpError::MissingArg(name.to_string())),
        Some(_) => Err(McpError::invalid_arg(name, "expected a string")),
    }
}

/// Helper to get an optional string argument from JSON arguments.
pub fn get_optional_string(args: &Map<String, JsonValue>, name: &str) -> Result<Option<String>> {
    match args.get(name) {
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        None | Some(JsonValue::Null) => Ok(None),
        Some(_) => Err(McpError::invalid_arg(name, "expected a string")),
    }
}

/// Helper to get an optional signed integer argument from JSON arguments.
///
/// Negative values are returned as-is so the caller can reject them with a
/// specific message.
pub fn get_optional_i64(args: &Map<String, JsonValue>, name: &str) -> Result<Option<i64>> {
    match args.get(name) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| McpError::invalid_arg(name, "expected an integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_names() {
        assert_eq!(type_name(0), "VARCHAR");
        assert_eq!(type_name(1), "INTEGER");
        assert_eq!(type_name(2), "REAL");
        assert_eq!(type_name(3), "DATE");
        assert_eq!(type_name(4), "TIME");
        assert_eq!(type_name(5), "TIMESTAMP");
        assert_eq!(type_name(6), "OBJECT");
        assert_eq!(type_name(7), "NUMERIC");
        assert_eq!(type_name(12), "INTERVAL");
    }

    #[test]
    fn test_unknown_type_codes() {
        for code in [8, 11, 13, 99, -1, i32::MAX] {
            assert_eq!(type_name(code), format!("UNKNOWN({})", code));
            assert_eq!(type_name(code), type_name(code));
        }
    }

    #[test]
    fn test_metadata_shape() {
        let schema = vec![
            ColumnInfo::new("id", type_codes::INTEGER).not_null().unique(),
            ColumnInfo::new("amount", type_codes::NUMERIC)
                .display_name("Amount")
                .precision(10, 2),
            ColumnInfo::new("blob", 42),
        ];
        let samples = vec![vec![Some("1".to_string()), None, Some(String::new())]];
        let json = to_json(&TableMetadata::new("orders", &schema, samples)).unwrap();

        assert_eq!(
            json,
            json!({
                "table": "orders",
                "columns": [
                    {"name": "id", "display_name": "id", "type": 1, "type_name": "INTEGER",
                     "unique": true, "nullable": false, "precision": 0, "scale": 0},
                    {"name": "amount", "display_name": "Amount", "type": 7, "type_name": "NUMERIC",
                     "unique": false, "nullable": true, "precision": 10, "scale": 2},
                    {"name": "blob", "display_name": "blob", "type": 42, "type_name": "UNKNOWN(42)",
                     "unique": false, "nullable": true, "precision": 0, "scale": 0}
                ],
                "sample_data": [["1", null, ""]]
            })
        );
    }

    #[test]
    fn test_query_result_shape() {
        let description = vec![ColumnInfo::new("n", type_codes::INTEGER)];
        let result = QueryResult::new(&description, vec![vec![Some("1".to_string())]]);
        assert_eq!(result.row_count, 1);
        assert_eq!(
            to_json(&result).unwrap(),
            json!({
                "columns": [{"name": "n", "display_name": "n", "type": 1}],
                "rows": [["1"]],
                "row_count": 1
            })
        );
    }

    #[test]
    fn test_listing_counts() {
        let listing = TableListing::new(
            "shop",
            vec!["orders".to_string(), "customers".to_string()],
            vec!["recent".to_string()],
        );
        assert_eq!(listing.total_count, 3);
        let listing = TableListing::new("shop", vec![], vec![]);
        assert_eq!(listing.total_count, 0);
    }

    #[test]
    fn test_escaping_round_trips() {
        let nasty = "quote\" back\\slash\nnew\ttab\r\u{1}";
        let result = QueryResult::new(
            &[ColumnInfo::new("c\"ol", type_codes::VARCHAR)],
            vec![vec![Some(nasty.to_string())]],
        );
        let text = serde_json::to_string(&result).unwrap();
        assert!(text.contains(r#"quote\" back\\slash\nnew\ttab\r\u0001"#));
        assert!(text.contains(r#""c\"ol""#));

        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["rows"][0][0], json!(nasty));
    }

    #[test]
    fn test_arg_helpers() {
        let args = json!({"s": "x", "n": -2, "f": 1.5, "null": null})
            .as_object()
            .unwrap()
            .clone();
        assert_eq!(get_string_arg(&args, "s").unwrap(), "x");
        assert!(matches!(
            get_string_arg(&args, "missing"),
            Err(McpError::MissingArg(_))
        ));
        assert!(matches!(
            get_string_arg(&args, "n"),
            Err(McpError::InvalidArg { .. })
        ));
        assert_eq!(get_optional_string(&args, "null").unwrap(), None);
        assert_eq!(get_optional_i64(&args, "n").unwrap(), Some(-2));
        assert_eq!(get_optional_i64(&args, "missing").unwrap(), None);
        assert!(get_optional_i64(&args, "f").is_err());
    }
}
