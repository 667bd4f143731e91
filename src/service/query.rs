//! Arbitrary statement execution.

use tracing::info;

use super::with_cursor;
use crate::convert::QueryResult;
use crate::error::{McpError, Result};
use crate::session::SessionHandle;

const LOGGED_SQL_CHARS: usize = 100;

/// Validate an `execute_query` statement.
pub fn validate_sql(sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(McpError::invalid_arg("sql_query", "must not be empty"));
    }
    Ok(())
}

fn preview(sql: &str) -> String {
    match sql.char_indices().nth(LOGGED_SQL_CHARS) {
        Some((end, _)) => format!("{}...", &sql[..end]),
        None => sql.to_string(),
    }
}

/// Statement execution over a connected session.
pub struct QueryService<'a> {
    session: &'a mut SessionHandle,
}

impl<'a> QueryService<'a> {
    /// Borrow a session for query execution.
    pub fn new(session: &'a mut SessionHandle) -> Self {
        Self { session }
    }

    /// Execute `sql` verbatim and materialize every result row.
    ///
    /// The cursor is released whether or not execution succeeds.
    pub fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        validate_sql(sql)?;
        let conn = self.session.require_connection()?;
        info!("Executing query: {}", preview(sql));

        let result = with_cursor(conn, |cursor| {
            cursor.execute(sql)?;
            let rows = cursor.fetch_all()?;
            Ok(QueryResult::new(cursor.description(), rows))
        })?;

        info!("Query returned {} rows", result.row_count);
        Ok(result)
    }
}
