//! Table listing and table metadata.

use tracing::{debug, info};

use super::{query_failure, with_cursor};
use crate::convert::{TableListing, TableMetadata};
use crate::error::{McpError, Result};
use crate::scope::{in_scope, ScopeRegistry};
use crate::session::SessionHandle;

/// Default number of sample rows returned with table metadata.
pub const DEFAULT_SAMPLE_ROWS: i64 = 3;

/// Validate `get_metadata` arguments, returning the sample size.
///
/// Runs before any connection state is touched.
pub fn validate_metadata_args(table: &str, sample_rows: i64) -> Result<usize> {
    if table.trim().is_empty() {
        return Err(McpError::invalid_arg("table_name", "must not be empty"));
    }
    usize::try_from(sample_rows)
        .map_err(|_| McpError::invalid_arg("sample_rows", "must be zero or greater"))
}

/// Schema introspection over a connected session.
pub struct SchemaService<'a> {
    session: &'a mut SessionHandle,
}

impl<'a> SchemaService<'a> {
    /// Borrow a session for schema operations.
    pub fn new(session: &'a mut SessionHandle) -> Self {
        Self { session }
    }

    /// List tables and views of the open database.
    ///
    /// A non-blank `scope` must name an entry of `registry`; only objects whose
    /// names match one of its tables (ignoring case) are kept. Native
    /// enumeration order is preserved.
    pub fn list_tables(
        &mut self,
        scope: Option<&str>,
        registry: &ScopeRegistry,
    ) -> Result<TableListing> {
        let conn = self.session.require_connection()?;
        let database = conn.database().unwrap_or_default().to_string();

        let filter = match scope.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => {
                let tables = registry.get(name).ok_or_else(|| McpError::UnknownScope {
                    scope: name.to_string(),
                    available: registry.scope_names(),
                })?;
                info!(scope = name, "Applying scope filter ({} tables)", tables.len());
                Some(tables)
            }
            None => None,
        };

        let entries = conn.list_tables(&database).map_err(query_failure)?;
        if entries.is_empty() {
            info!("No tables found in database {}", database);
            return Ok(TableListing::new(database, Vec::new(), Vec::new()));
        }

        let mut tables = Vec::new();
        let mut views = Vec::new();
        for entry in entries {
            if let Some(filter) = filter {
                if !in_scope(&entry.name, filter) {
                    debug!("Skipping {} (not in scope)", entry.name);
                    continue;
                }
            }
            let is_view = conn
                .view_info(&database, &entry.name)
                .map_err(query_failure)?
                .map_or(false, |v| v.is_view());
            if is_view {
                views.push(entry.name);
            } else {
                tables.push(entry.name);
            }
        }

        info!(
            "Found {} tables and {} views in {}",
            tables.len(),
            views.len(),
            database
        );
        Ok(TableListing::new(database, tables, views))
    }

    /// Column metadata for `table` plus up to `sample_rows` rows.
    ///
    /// Arguments are validated before the connection is checked. No sample
    /// query is issued when `sample_rows` is zero.
    pub fn get_table_metadata(&mut self, table: &str, sample_rows: i64) -> Result<TableMetadata> {
        let limit = validate_metadata_args(table, sample_rows)?;
        let conn = self.session.require_connection()?;
        let database = conn.database().unwrap_or_default().to_string();

        let schema = conn.schema(&database, table).map_err(query_failure)?;
        if schema.is_empty() {
            return Err(McpError::TableNotFound(table.to_string()));
        }
        debug!("Table {} has {} columns", table, schema.len());

        let sample_data = if limit > 0 {
            let sql = format!(
                "SELECT * FROM {} LIMIT {}",
                conn.quote_identifier(table),
                limit
            );
            debug!("Fetching sample rows: {}", sql);
            with_cursor(conn, |cursor| {
                cursor.execute(&sql)?;
                cursor.fetch_many(limit)
            })?
        } else {
            Vec::new()
        };

        Ok(TableMetadata::new(table, &schema, sample_data))
    }
}
