//! Database driver seam.
//!
//! The session and services only talk to a database through these traits. A
//! driver exposes raw connect/open-database/execute/fetch/close primitives and
//! a fixed column-metadata structure; it does not interpret SQL.

pub mod memory;
pub mod pg;

use serde::{Deserialize, Serialize};

/// A result row. Every value is carried as text, or `None` for SQL NULL.
pub type Row = Vec<Option<String>>;

/// Type codes a driver reports in [`ColumnInfo::type_code`].
pub mod type_codes {
    /// Character data
    pub const VARCHAR: i32 = 0;
    /// Whole numbers
    pub const INTEGER: i32 = 1;
    /// Floating point
    pub const REAL: i32 = 2;
    /// Calendar date
    pub const DATE: i32 = 3;
    /// Time of day
    pub const TIME: i32 = 4;
    /// Date and time
    pub const TIMESTAMP: i32 = 5;
    /// Binary or structured data
    pub const OBJECT: i32 = 6;
    /// Exact decimal
    pub const NUMERIC: i32 = 7;
    /// Time span
    pub const INTERVAL: i32 = 12;
}

/// Failure reported by a driver primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    /// Driver-supplied message
    pub message: String,
}

impl DriverError {
    /// Create a driver error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for driver primitives.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// An entry of a database's table/view enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Object name as stored by the database
    pub name: String,
}

/// View details for a named object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewInfo {
    /// `0` for a plain table; any other value is a kind of view
    pub view_type: i32,
}

impl ViewInfo {
    /// Whether the object is a view.
    pub fn is_view(&self) -> bool {
        self.view_type != 0
    }
}

/// Column metadata as reported by a driver.
///
/// `null_flag` follows a single polarity: non-zero means the column has a NOT
/// NULL constraint, so a column is nullable iff `null_flag == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Human-facing label; drivers without one repeat the name
    pub display_name: String,
    /// Driver type code, see [`crate::convert::type_name`]
    pub type_code: i32,
    /// Non-zero if the column carries a unique constraint
    pub unique_flag: i32,
    /// Non-zero if the column rejects NULL
    pub null_flag: i32,
    /// Numeric precision or character length, `0` when not applicable
    pub precision: i32,
    /// Numeric scale, `0` when not applicable
    pub scale: i32,
}

impl ColumnInfo {
    /// A nullable, non-unique column with no precision or scale.
    pub fn new(name: impl Into<String>, type_code: i32) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            type_code,
            unique_flag: 0,
            null_flag: 0,
            precision: 0,
            scale: 0,
        }
    }

    /// Set the display name.
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.null_flag = 1;
        self
    }

    /// Mark the column unique.
    pub fn unique(mut self) -> Self {
        self.unique_flag = 1;
        self
    }

    /// Set precision and scale.
    pub fn precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Whether the column accepts NULL.
    pub fn is_nullable(&self) -> bool {
        self.null_flag == 0
    }

    /// Whether the column is unique.
    pub fn is_unique(&self) -> bool {
        self.unique_flag != 0
    }
}

/// Entry point of a database driver.
pub trait Driver: Send + Sync {
    /// Short driver name for logs.
    fn name(&self) -> &str;

    /// Log in to a server. The returned connection has no database open yet.
    fn open(
        &self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> DriverResult<Box<dyn Connection>>;
}

/// A native connection handle.
pub trait Connection {
    /// Open the named database on this connection.
    fn open_database(&mut self, name: &str) -> DriverResult<()>;

    /// Name of the open database, if any.
    fn database(&self) -> Option<&str>;

    /// Whether the handle is live with a database open.
    fn is_open(&self) -> bool;

    /// Close the connection. The handle must not be used afterwards.
    fn close(&mut self) -> DriverResult<()>;

    /// Enumerate tables and views of a database in the driver's native order.
    fn list_tables(&mut self, database: &str) -> DriverResult<Vec<TableInfo>>;

    /// View details for an object, `None` if the driver has nothing to report.
    fn view_info(&mut self, database: &str, name: &str) -> DriverResult<Option<ViewInfo>>;

    /// Column metadata for a table; empty if the table does not exist.
    fn schema(&mut self, database: &str, table: &str) -> DriverResult<Vec<ColumnInfo>>;

    /// Open a cursor for statement execution.
    fn cursor(&mut self) -> DriverResult<Box<dyn Cursor + '_>>;

    /// Quote an identifier for this driver's SQL dialect.
    fn quote_identifier(&self, name: &str) -> String;
}

/// A statement cursor borrowed from a [`Connection`].
pub trait Cursor {
    /// Execute a statement verbatim.
    fn execute(&mut self, sql: &str) -> DriverResult<()>;

    /// Columns of the last executed statement's result.
    fn description(&self) -> &[ColumnInfo];

    /// Fetch all remaining rows.
    fn fetch_all(&mut self) -> DriverResult<Vec<Row>>;

    /// Fetch up to `n` rows.
    fn fetch_many(&mut self, n: usize) -> DriverResult<Vec<Row>>;

    /// Release the cursor.
    fn close(&mut self) -> DriverResult<()>;
}

/// Double-quote an identifier, doubling embedded quotes (ANSI SQL).
pub fn quote_ansi_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ansi_identifier() {
        assert_eq!(quote_ansi_identifier("orders"), "\"orders\"");
        assert_eq!(quote_ansi_identifier("My Table"), "\"My Table\"");
        assert_eq!(quote_ansi_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_column_flags() {
        let col = ColumnInfo::new("id", 1);
        assert!(col.is_nullable());
        assert!(!col.is_unique());
        assert_eq!(col.display_name, "id");

        let col = ColumnInfo::new("id", 1).not_null().unique().display_name("ID");
        assert!(!col.is_nullable());
        assert!(col.is_unique());
        assert_eq!(col.display_name, "ID");
    }

    #[test]
    fn test_view_info() {
        assert!(!ViewInfo { view_type: 0 }.is_view());
        assert!(ViewInfo { view_type: 2 }.is_view());
    }
}
