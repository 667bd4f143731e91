//! In-process scripted driver.
//!
//! Holds databases, tables, views and canned statement results in memory, with
//! failure injection and counters that expose the connection and cursor
//! lifecycle. Used by the test suite and for embedding without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    quote_ansi_identifier, ColumnInfo, Connection, Cursor, Driver, DriverError, DriverResult, Row,
    TableInfo, ViewInfo,
};

/// Lifecycle counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Successful `open` calls
    pub opens: usize,
    /// `close` calls, including failed ones
    pub closes: usize,
    /// Cursors handed out
    pub cursors_opened: usize,
    /// Cursors released
    pub cursors_closed: usize,
    /// Statements passed to `execute`, in order
    pub statements: Vec<String>,
}

impl DriverStats {
    /// Connections opened and not yet closed.
    pub fn live_connections(&self) -> usize {
        self.opens - self.closes
    }

    /// Cursors opened and not yet released.
    pub fn live_cursors(&self) -> usize {
        self.cursors_opened - self.cursors_closed
    }
}

#[derive(Debug, Clone)]
struct MemoryObject {
    name: String,
    view_type: i32,
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

#[derive(Debug, Clone, Default)]
struct MemoryDatabase {
    objects: Vec<MemoryObject>,
    results: HashMap<String, (Vec<ColumnInfo>, Vec<Row>)>,
    failing: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    databases: HashMap<String, MemoryDatabase>,
    fail_open: Option<String>,
    fail_close: Option<String>,
    fail_cursor_close: Option<String>,
    stats: DriverStats,
}

/// Scripted in-memory driver. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    state: Arc<Mutex<State>>,
}

impl MemoryDriver {
    /// Create a driver with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn with_database<F: FnOnce(&mut MemoryDatabase)>(self, database: &str, f: F) -> Self {
        f(self.lock().databases.entry(database.to_string()).or_default());
        self
    }

    /// Add an empty database.
    pub fn with_database_named(self, database: &str) -> Self {
        self.with_database(database, |_| {})
    }

    /// Add a table with columns and rows.
    pub fn with_table(
        self,
        database: &str,
        name: &str,
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
    ) -> Self {
        self.with_object(database, name, 0, columns, rows)
    }

    /// Add a view with columns and rows.
    pub fn with_view(
        self,
        database: &str,
        name: &str,
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
    ) -> Self {
        self.with_object(database, name, 1, columns, rows)
    }

    fn with_object(
        self,
        database: &str,
        name: &str,
        view_type: i32,
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
    ) -> Self {
        self.with_database(database, |db| {
            db.objects.push(MemoryObject {
                name: name.to_string(),
                view_type,
                columns,
                rows,
            })
        })
    }

    /// Script the result of an exact statement.
    pub fn with_result(
        self,
        database: &str,
        sql: &str,
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
    ) -> Self {
        self.with_database(database, |db| {
            db.results.insert(sql.to_string(), (columns, rows));
        })
    }

    /// Make an exact statement fail with `message`.
    pub fn with_failing_statement(self, database: &str, sql: &str, message: &str) -> Self {
        self.with_database(database, |db| {
            db.failing.insert(sql.to_string(), message.to_string());
        })
    }

    /// Make `open` fail with `message`.
    pub fn fail_open(self, message: &str) -> Self {
        self.lock().fail_open = Some(message.to_string());
        self
    }

    /// Make connection `close` fail with `message`.
    pub fn fail_close(self, message: &str) -> Self {
        self.lock().fail_close = Some(message.to_string());
        self
    }

    /// Make cursor `close` fail with `message`.
    pub fn fail_cursor_close(self, message: &str) -> Self {
        self.lock().fail_cursor_close = Some(message.to_string());
        self
    }

    /// Snapshot of the lifecycle counters.
    pub fn stats(&self) -> DriverStats {
        self.lock().stats.clone()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(
        &self,
        host: &str,
        _port: u16,
        username: &str,
        _password: &str,
    ) -> DriverResult<Box<dyn Connection>> {
        let mut state = self.lock();
        if let Some(message) = &state.fail_open {
            return Err(DriverError::new(format!(
                "{} ({}@{})",
                message, username, host
            )));
        }
        state.stats.opens += 1;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            database: None,
            closed: false,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<State>>,
    database: Option<String>,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::new("connection is closed"));
        }
        Ok(())
    }

    fn read_database<T>(
        &self,
        database: &str,
        f: impl FnOnce(&MemoryDatabase) -> T,
    ) -> DriverResult<T> {
        self.ensure_open()?;
        let state = lock(&self.state);
        let db = state
            .databases
            .get(database)
            .ok_or_else(|| DriverError::new(format!("database not found: {}", database)))?;
        Ok(f(db))
    }
}

impl Connection for MemoryConnection {
    fn open_database(&mut self, name: &str) -> DriverResult<()> {
        self.ensure_open()?;
        if !lock(&self.state).databases.contains_key(name) {
            return Err(DriverError::new(format!("database not found: {}", name)));
        }
        self.database = Some(name.to_string());
        Ok(())
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn is_open(&self) -> bool {
        !self.closed && self.database.is_some()
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.database = None;
        let mut state = lock(&self.state);
        state.stats.closes += 1;
        match &state.fail_close {
            Some(message) => Err(DriverError::new(message.clone())),
            None => Ok(()),
        }
    }

    fn list_tables(&mut self, database: &str) -> DriverResult<Vec<TableInfo>> {
        self.read_database(database, |db| {
            db.objects
                .iter()
                .map(|o| TableInfo {
                    name: o.name.clone(),
                })
                .collect()
        })
    }

    fn view_info(&mut self, database: &str, name: &str) -> DriverResult<Option<ViewInfo>> {
        self.read_database(database, |db| {
            db.objects
                .iter()
                .find(|o| o.name == name && o.view_type != 0)
                .map(|o| ViewInfo {
                    view_type: o.view_type,
                })
        })
    }

    fn schema(&mut self, database: &str, table: &str) -> DriverResult<Vec<ColumnInfo>> {
        self.read_database(database, |db| {
            db.objects
                .iter()
                .find(|o| o.name == table)
                .map(|o| o.columns.clone())
                .unwrap_or_default()
        })
    }

    fn cursor(&mut self) -> DriverResult<Box<dyn Cursor + '_>> {
        self.ensure_open()?;
        let database = self
            .database
            .clone()
            .ok_or_else(|| DriverError::new("no database is open"))?;
        lock(&self.state).stats.cursors_opened += 1;
        Ok(Box::new(MemoryCursor {
            state: Arc::clone(&self.state),
            database,
            description: Vec::new(),
            pending: VecDeque::new(),
            closed: false,
        }))
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_ansi_identifier(name)
    }
}

struct MemoryCursor {
    state: Arc<Mutex<State>>,
    database: String,
    description: Vec<ColumnInfo>,
    pending: VecDeque<Row>,
    closed: bool,
}

/// Recognize `SELECT * FROM "name" LIMIT n`, the statement used for samples.
fn parse_sample_query(sql: &str) -> Option<(String, usize)> {
    let rest = sql.trim().strip_prefix("SELECT * FROM ")?;
    let (ident, limit) = rest.rsplit_once(" LIMIT ")?;
    let inner = ident.strip_prefix('"')?.strip_suffix('"')?;
    Some((inner.replace("\"\"", "\""), limit.trim().parse().ok()?))
}

impl Cursor for MemoryCursor {
    fn execute(&mut self, sql: &str) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::new("cursor is closed"));
        }
        let mut state = lock(&self.state);
        state.stats.statements.push(sql.to_string());
        let db = state
            .databases
            .get(&self.database)
            .ok_or_else(|| DriverError::new(format!("database not found: {}", self.database)))?;

        if let Some(message) = db.failing.get(sql) {
            return Err(DriverError::new(message.clone()));
        }

        let (columns, rows) = if let Some((columns, rows)) = db.results.get(sql) {
            (columns.clone(), rows.clone())
        } else if let Some((table, limit)) = parse_sample_query(sql) {
            let object = db
                .objects
                .iter()
                .find(|o| o.name == table)
                .ok_or_else(|| DriverError::new(format!("table not found: {}", table)))?;
            let rows = object.rows.iter().take(limit).cloned().collect();
            (object.columns.clone(), rows)
        } else {
            return Err(DriverError::new(format!("syntax error near '{}'", sql)));
        };

        self.description = columns;
        self.pending = rows.into();
        Ok(())
    }

    fn description(&self) -> &[ColumnInfo] {
        &self.description
    }

    fn fetch_all(&mut self) -> DriverResult<Vec<Row>> {
        Ok(self.pending.drain(..).collect())
    }

    fn fetch_many(&mut self, n: usize) -> DriverResult<Vec<Row>> {
        let n = n.min(self.pending.len());
        Ok(self.pending.drain(..n).collect())
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();
        let mut state = lock(&self.state);
        state.stats.cursors_closed += 1;
        match &state.fail_cursor_close {
            Some(message) => Err(DriverError::new(message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Row {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    fn driver() -> MemoryDriver {
        MemoryDriver::new()
            .with_table(
                "shop",
                "orders",
                vec![ColumnInfo::new("id", 1)],
                vec![row(&["1"]), row(&["2"]), row(&["3"])],
            )
            .with_view("shop", "recent", vec![ColumnInfo::new("id", 1)], vec![])
    }

    #[test]
    fn test_parse_sample_query() {
        assert_eq!(
            parse_sample_query("SELECT * FROM \"orders\" LIMIT 3"),
            Some(("orders".to_string(), 3))
        );
        assert_eq!(
            parse_sample_query("SELECT * FROM \"a\"\"b\" LIMIT 1"),
            Some(("a\"b".to_string(), 1))
        );
        assert_eq!(parse_sample_query("SELECT 1"), None);
    }

    #[test]
    fn test_open_and_enumerate() {
        let driver = driver();
        let mut conn = driver.open("h", 1, "u", "").unwrap();
        assert!(!conn.is_open());
        conn.open_database("shop").unwrap();
        assert!(conn.is_open());
        assert_eq!(conn.database(), Some("shop"));

        let names: Vec<_> = conn
            .list_tables("shop")
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["orders", "recent"]);
        assert!(conn.view_info("shop", "orders").unwrap().is_none());
        assert!(conn.view_info("shop", "recent").unwrap().unwrap().is_view());
        assert!(conn.schema("shop", "missing").unwrap().is_empty());

        conn.close().unwrap();
        assert!(!conn.is_open());
        assert_eq!(driver.stats().live_connections(), 0);
    }

    #[test]
    fn test_open_unknown_database() {
        let mut conn = driver().open("h", 1, "u", "").unwrap();
        let err = conn.open_database("nope").unwrap_err();
        assert!(err.message.contains("nope"));
        assert!(!conn.is_open());
    }

    #[test]
    fn test_cursor_fetch_many() {
        let driver = driver();
        let mut conn = driver.open("h", 1, "u", "").unwrap();
        conn.open_database("shop").unwrap();
        {
            let mut cursor = conn.cursor().unwrap();
            cursor.execute("SELECT * FROM \"orders\" LIMIT 2").unwrap();
            assert_eq!(cursor.description().len(), 1);
            assert_eq!(cursor.fetch_many(5).unwrap().len(), 2);
            assert!(cursor.fetch_all().unwrap().is_empty());
            cursor.close().unwrap();
        }
        let stats = driver.stats();
        assert_eq!(stats.live_cursors(), 0);
        assert_eq!(stats.statements, vec!["SELECT * FROM \"orders\" LIMIT 2"]);
    }

    #[test]
    fn test_injected_failures() {
        let err = driver().fail_open("refused").open("h", 1, "u", "").err().unwrap();
        assert!(err.message.contains("refused"));

        let driver = driver().fail_close("close broke");
        let mut conn = driver.open("h", 1, "u", "").unwrap();
        assert_eq!(conn.close().unwrap_err().message, "close broke");
        assert_eq!(driver.stats().live_connections(), 0);
    }
}
