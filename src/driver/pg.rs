//! PostgreSQL driver over the blocking `postgres` client.
//!
//! `open` only records the server coordinates; the session is established by
//! `open_database`, since a PostgreSQL login is always bound to one database.
//! Objects are resolved against the schemas on the session's search path.

use std::collections::VecDeque;

use ::postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::debug;

use super::{
    quote_ansi_identifier, type_codes, ColumnInfo, Connection, Cursor, Driver, DriverError,
    DriverResult, Row, TableInfo, ViewInfo,
};

const APPLICATION_NAME: &str = "sqlscope-mcp";

/// One entry per name: the relation a bare name resolves to on the search path.
const LIST_TABLES: &str = r#"
    SELECT relname
    FROM (
        SELECT DISTINCT ON (c.relname)
            c.relname::text AS relname,
            array_position(current_schemas(false), n.nspname) AS schema_rank
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p', 'f', 'v', 'm')
          AND n.nspname = ANY (current_schemas(false))
        ORDER BY c.relname, array_position(current_schemas(false), n.nspname)
    ) visible
    ORDER BY schema_rank, relname
"#;

const VIEW_KIND: &str = r#"
    SELECT c.relkind::text
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relname = $1
      AND n.nspname = ANY (current_schemas(false))
    ORDER BY array_position(current_schemas(false), n.nspname)
    LIMIT 1
"#;

const DESCRIBE_COLUMNS: &str = r#"
    WITH target AS (
        SELECT t.table_schema, t.table_name
        FROM information_schema.tables t
        WHERE t.table_name::text = $1
          AND t.table_schema::name = ANY (current_schemas(false))
        ORDER BY array_position(current_schemas(false), t.table_schema::name)
        LIMIT 1
    )
    SELECT
        c.column_name::text,
        COALESCE(
            col_description(format('%I.%I', c.table_schema, c.table_name)::regclass, c.ordinal_position::int),
            c.column_name::text
        ) AS display_name,
        c.udt_name::text,
        (c.is_nullable = 'NO') AS not_null,
        EXISTS (
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON kcu.constraint_name = tc.constraint_name
                AND kcu.table_schema = tc.table_schema
                AND kcu.table_name = tc.table_name
            WHERE tc.table_schema = c.table_schema
              AND tc.table_name = c.table_name
              AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
              AND kcu.column_name = c.column_name
        ) AS is_unique,
        COALESCE(c.numeric_precision, c.character_maximum_length, c.datetime_precision, 0)::int4 AS precision,
        COALESCE(c.numeric_scale, 0)::int4 AS scale
    FROM information_schema.columns c
    JOIN target ON target.table_schema = c.table_schema AND target.table_name = c.table_name
    ORDER BY c.ordinal_position
"#;

/// Driver for PostgreSQL servers.
#[derive(Debug, Clone, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    /// Create the driver.
    pub fn new() -> Self {
        Self
    }
}

impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    fn open(
        &self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> DriverResult<Box<dyn Connection>> {
        let mut config = Config::new();
        config
            .host(host)
            .port(port)
            .user(username)
            .password(password)
            .application_name(APPLICATION_NAME);
        Ok(Box::new(PostgresConnection {
            config,
            client: None,
            database: None,
        }))
    }
}

fn pg_error(err: ::postgres::Error) -> DriverError {
    match err.as_db_error() {
        Some(db) => DriverError::new(format!("{} (SQLSTATE {})", db.message(), db.code().code())),
        None => DriverError::new(err.to_string()),
    }
}

/// Map a PostgreSQL type name (`udt_name`) onto the fixed type-code set.
pub fn type_code_for(pg_type: &str) -> i32 {
    match pg_type {
        "varchar" | "text" | "bpchar" | "char" | "name" | "citext" | "uuid" | "bool" => {
            type_codes::VARCHAR
        }
        "int2" | "int4" | "int8" | "oid" => type_codes::INTEGER,
        "float4" | "float8" => type_codes::REAL,
        "numeric" | "money" => type_codes::NUMERIC,
        "date" => type_codes::DATE,
        "time" | "timetz" => type_codes::TIME,
        "timestamp" | "timestamptz" => type_codes::TIMESTAMP,
        "interval" => type_codes::INTERVAL,
        _ => type_codes::OBJECT,
    }
}

/// `view_type` for a `pg_class.relkind`.
fn view_type_for(relkind: &str) -> i32 {
    match relkind {
        "v" => 1,
        "m" => 2,
        _ => 0,
    }
}

struct PostgresConnection {
    config: Config,
    client: Option<Client>,
    database: Option<String>,
}

impl PostgresConnection {
    fn client(&mut self, database: &str) -> DriverResult<&mut Client> {
        if self.database.as_deref() != Some(database) {
            return Err(DriverError::new(format!("database {} is not open", database)));
        }
        self.client
            .as_mut()
            .ok_or_else(|| DriverError::new("connection is closed"))
    }
}

impl Connection for PostgresConnection {
    fn open_database(&mut self, name: &str) -> DriverResult<()> {
        if let Some(client) = self.client.take() {
            client.close().map_err(pg_error)?;
        }
        let mut config = self.config.clone();
        config.dbname(name);
        let client = config.connect(NoTls).map_err(pg_error)?;
        debug!(database = name, "PostgreSQL session established");
        self.client = Some(client);
        self.database = Some(name.to_string());
        Ok(())
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn is_open(&self) -> bool {
        self.client.as_ref().map_or(false, |c| !c.is_closed())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.database = None;
        match self.client.take() {
            Some(client) => client.close().map_err(pg_error),
            None => Ok(()),
        }
    }

    fn list_tables(&mut self, database: &str) -> DriverResult<Vec<TableInfo>> {
        let rows = self
            .client(database)?
            .query(LIST_TABLES, &[])
            .map_err(pg_error)?;
        Ok(rows
            .iter()
            .map(|row| TableInfo { name: row.get(0) })
            .collect())
    }

    fn view_info(&mut self, database: &str, name: &str) -> DriverResult<Option<ViewInfo>> {
        let row = self
            .client(database)?
            .query_opt(VIEW_KIND, &[&name])
            .map_err(pg_error)?;
        Ok(row.map(|row| ViewInfo {
            view_type: view_type_for(row.get::<_, &str>(0)),
        }))
    }

    fn schema(&mut self, database: &str, table: &str) -> DriverResult<Vec<ColumnInfo>> {
        let rows = self
            .client(database)?
            .query(DESCRIBE_COLUMNS, &[&table])
            .map_err(pg_error)?;
        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get(0),
                display_name: row.get(1),
                type_code: type_code_for(row.get::<_, &str>(2)),
                null_flag: i32::from(row.get::<_, bool>(3)),
                unique_flag: i32::from(row.get::<_, bool>(4)),
                precision: row.get(5),
                scale: row.get(6),
            })
            .collect())
    }

    fn cursor(&mut self) -> DriverResult<Box<dyn Cursor + '_>> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| DriverError::new("connection is closed"))?;
        Ok(Box::new(PostgresCursor {
            client,
            description: Vec::new(),
            pending: VecDeque::new(),
        }))
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_ansi_identifier(name)
    }
}

/// Runs statements over the simple-query protocol so every value arrives as
/// text. Column types come from preparing the statement first; statements that
/// cannot be prepared (several commands in one string) report text columns.
/// Only the last command's result set is kept.
struct PostgresCursor<'a> {
    client: &'a mut Client,
    description: Vec<ColumnInfo>,
    pending: VecDeque<Row>,
}

/// Collects simple-query results command by command, keeping the last one.
#[derive(Debug, Default)]
struct ResultSets {
    columns: Vec<String>,
    rows: VecDeque<Row>,
    last: Option<(Vec<String>, VecDeque<Row>)>,
}

impl ResultSets {
    fn push_row(&mut self, columns: impl FnOnce() -> Vec<String>, values: Row) {
        if self.rows.is_empty() {
            self.columns = columns();
        }
        self.rows.push_back(values);
    }

    fn complete(&mut self) {
        let columns = std::mem::take(&mut self.columns);
        let rows = std::mem::take(&mut self.rows);
        self.last = Some((columns, rows));
    }

    /// Column names and rows of the last completed command.
    fn finish(mut self) -> (Vec<String>, VecDeque<Row>) {
        if !self.rows.is_empty() {
            self.complete();
        }
        self.last.unwrap_or_default()
    }
}

impl Cursor for PostgresCursor<'_> {
    fn execute(&mut self, sql: &str) -> DriverResult<()> {
        let prepared: Option<Vec<ColumnInfo>> = self.client.prepare(sql).ok().map(|statement| {
            statement
                .columns()
                .iter()
                .map(|c| ColumnInfo::new(c.name(), type_code_for(c.type_().name())))
                .collect()
        });

        let messages = self.client.simple_query(sql).map_err(pg_error)?;

        let mut sets = ResultSets::default();
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    let values = (0..row.len()).map(|i| row.get(i).map(str::to_string)).collect();
                    sets.push_row(
                        || row.columns().iter().map(|c| c.name().to_string()).collect(),
                        values,
                    );
                }
                SimpleQueryMessage::CommandComplete(_) => sets.complete(),
                _ => {}
            }
        }
        let (columns, rows) = sets.finish();

        self.description = match prepared {
            Some(description) => description,
            None => columns
                .into_iter()
                .map(|name| ColumnInfo::new(name, type_codes::VARCHAR))
                .collect(),
        };
        self.pending = rows;
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
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_mapping() {
        assert_eq!(type_code_for("varchar"), type_codes::VARCHAR);
        assert_eq!(type_code_for("int8"), type_codes::INTEGER);
        assert_eq!(type_code_for("float8"), type_codes::REAL);
        assert_eq!(type_code_for("numeric"), type_codes::NUMERIC);
        assert_eq!(type_code_for("date"), type_codes::DATE);
        assert_eq!(type_code_for("timetz"), type_codes::TIME);
        assert_eq!(type_code_for("timestamptz"), type_codes::TIMESTAMP);
        assert_eq!(type_code_for("interval"), type_codes::INTERVAL);
        assert_eq!(type_code_for("jsonb"), type_codes::OBJECT);
        assert_eq!(type_code_for("bytea"), type_codes::OBJECT);
    }

    fn text_row(values: &[&str]) -> Row {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_result_sets_keep_last_command() {
        let mut sets = ResultSets::default();
        sets.push_row(|| names(&["a"]), text_row(&["1"]));
        sets.complete();
        sets.push_row(|| names(&["b", "c"]), text_row(&["x", "y"]));
        sets.push_row(|| names(&["b", "c"]), text_row(&["z", "w"]));
        sets.complete();

        let (columns, rows) = sets.finish();
        assert_eq!(columns, names(&["b", "c"]));
        assert_eq!(rows, vec![text_row(&["x", "y"]), text_row(&["z", "w"])]);
    }

    #[test]
    fn test_result_sets_trailing_command_without_rows() {
        let mut sets = ResultSets::default();
        sets.push_row(|| names(&["a"]), text_row(&["1"]));
        sets.complete();
        sets.complete();

        let (columns, rows) = sets.finish();
        assert!(columns.is_empty());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_result_sets_without_completion() {
        let mut sets = ResultSets::default();
        sets.push_row(|| names(&["a"]), vec![None]);
        let (columns, rows) = sets.finish();
        assert_eq!(columns, names(&["a"]));
        assert_eq!(rows, vec![vec![None]]);

        let (columns, rows) = ResultSets::default().finish();
        assert!(columns.is_empty() && rows.is_empty());
    }

    #[test]
    fn test_listing_resolves_each_name_once() {
        assert!(LIST_TABLES.contains("DISTINCT ON (c.relname)"));
        assert!(LIST_TABLES.contains("ORDER BY c.relname, array_position"));
        assert!(VIEW_KIND.contains("LIMIT 1"));
    }

    #[test]
    fn test_view_type_for_relkind() {
        assert_eq!(view_type_for("r"), 0);
        assert_eq!(view_type_for("v"), 1);
        assert_eq!(view_type_for("m"), 2);
    }

    #[test]
    fn test_open_defers_session() {
        let conn = PostgresDriver::new()
            .open("127.0.0.1", 5432, "reader", "secret")
            .unwrap();
        assert!(!conn.is_open());
        assert_eq!(conn.database(), None);
        assert_eq!(conn.quote_identifier("Order Items"), "\"Order Items\"");
    }
}
