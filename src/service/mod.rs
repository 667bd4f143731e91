//! Data operations against a connected [`SessionHandle`](crate::session::SessionHandle).
//!
//! - [`schema`]: table listing and table metadata
//! - [`query`]: arbitrary statement execution

pub mod query;
pub mod schema;

pub use query::QueryService;
pub use schema::SchemaService;

use tracing::warn;

use crate::driver::{Connection, Cursor, DriverError, DriverResult};
use crate::error::{McpError, Result};

pub(crate) fn query_failure(err: DriverError) -> McpError {
    McpError::QueryFailure(err.message)
}

/// Run `work` against a fresh cursor and release the cursor on every exit path.
///
/// When both `work` and the release fail, the release failure is logged and
/// the error from `work` is returned.
pub(crate) fn with_cursor<T>(
    conn: &mut dyn Connection,
    work: impl FnOnce(&mut dyn Cursor) -> DriverResult<T>,
) -> Result<T> {
    let mut cursor = conn.cursor().map_err(query_failure)?;
    let outcome = work(cursor.as_mut());
    let released = cursor.close();

    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(McpError::QueryFailure(format!(
            "failed to close cursor: {}",
            close_err
        ))),
        (Err(e), Ok(())) => Err(query_failure(e)),
        (Err(e), Err(close_err)) => {
            warn!("Failed to close cursor after error: {}", close_err);
            Err(query_failure(e))
        }
    }
}
