//! Connection parameters and the external configuration source.
//!
//! Configuration is read from `<PREFIX>_*` environment variables on every tool
//! call, so a client can change credentials without restarting the server.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{McpError, Result};
use crate::scope::ScopeRegistry;

/// Default prefix for configuration variables (`SQLSCOPE_HOST`, ...).
pub const DEFAULT_ENV_PREFIX: &str = "SQLSCOPE";

const PASSWORD_MASK: &str = "****";

/// Validated, immutable connection parameters.
///
/// The password never appears in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    username: String,
    password: String,
    database: String,
}

impl ConnectionConfig {
    /// Create a connection config, rejecting blank fields and out-of-range ports.
    ///
    /// A `None` password is stored as the empty string.
    pub fn new(
        host: impl Into<String>,
        port: i64,
        username: impl Into<String>,
        password: Option<&str>,
        database: impl Into<String>,
    ) -> Result<Self> {
        let host = host.into();
        let username = username.into();
        let database = database.into();

        if host.trim().is_empty() {
            return Err(McpError::invalid_arg("host", "must not be empty"));
        }
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| McpError::invalid_arg("port", "must be between 1 and 65535"))?;
        if username.trim().is_empty() {
            return Err(McpError::invalid_arg("username", "must not be empty"));
        }
        if database.trim().is_empty() {
            return Err(McpError::invalid_arg("database", "must not be empty"));
        }

        Ok(Self {
            host,
            port,
            username,
            password: password.unwrap_or_default().to_string(),
            database,
        })
    }

    /// Load from the process environment using [`DEFAULT_ENV_PREFIX`].
    pub fn from_env() -> Result<Self> {
        Settings::from_env(DEFAULT_ENV_PREFIX).connection_config()
    }

    /// Server host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Login password, possibly empty.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Database to open after login.
    pub fn database(&self) -> &str {
        &self.database
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionConfig{{host='{}', port={}, username='{}', password={}, database='{}'}}",
            self.host, self.port, self.username, PASSWORD_MASK, self.database
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &PASSWORD_MASK)
            .field("database", &self.database)
            .finish()
    }
}

type Lookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// External configuration source.
///
/// Wraps a variable lookup so the server reads the live environment while
/// tests supply a fixed map.
#[derive(Clone)]
pub struct Settings {
    prefix: String,
    lookup: Arc<Lookup>,
}

impl Settings {
    /// Read variables from the process environment.
    pub fn from_env(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            lookup: Arc::new(|key: &str| std::env::var(key).ok()),
        }
    }

    /// Read variables from a fixed map; keys are full variable names.
    pub fn from_map(prefix: &str, vars: HashMap<String, String>) -> Self {
        Self {
            prefix: prefix.to_string(),
            lookup: Arc::new(move |key: &str| vars.get(key).cloned()),
        }
    }

    /// Variable prefix in use.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full variable name for a setting, e.g. `SQLSCOPE_HOST`.
    pub fn var_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    fn get(&self, suffix: &str) -> Option<String> {
        (self.lookup)(&self.var_name(suffix))
    }

    fn require(&self, suffix: &str) -> Result<String> {
        match self.get(suffix) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(McpError::Configuration(format!(
                "environment variable {} is not set; configure the database connection in the MCP client settings",
                self.var_name(suffix)
            ))),
        }
    }

    /// Build a [`ConnectionConfig`] from `<PREFIX>_HOST`, `_PORT`, `_USERNAME`,
    /// `_PASSWORD` and `_DATABASE`.
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        debug!(prefix = %self.prefix, "Loading connection settings");

        let host = self.require("HOST")?;
        let port_str = self.require("PORT")?;
        let username = self.require("USERNAME")?;
        let database = self.require("DATABASE")?;
        let password = self.get("PASSWORD");

        let port: i64 = port_str.trim().parse().map_err(|_| {
            McpError::Configuration(format!(
                "environment variable {} must be an integer, got '{}'",
                self.var_name("PORT"),
                port_str
            ))
        })?;

        let config = ConnectionConfig::new(host, port, username, password.as_deref(), database)?;
        info!(
            host = config.host(),
            port = config.port(),
            username = config.username(),
            database = config.database(),
            "Loaded connection settings"
        );
        Ok(config)
    }

    /// Build the scope registry from `<PREFIX>_SCOPES`.
    ///
    /// Never fails: an absent or malformed value yields an empty registry.
    pub fn scope_registry(&self) -> ScopeRegistry {
        match self.get("SCOPES") {
            Some(json) if !json.trim().is_empty() => {
                ScopeRegistry::from_json_lenient(&json, &self.var_name("SCOPES"))
            }
            _ => {
                info!(
                    "{} not set - scope filtering disabled",
                    self.var_name("SCOPES")
                );
                ScopeRegistry::default()
            }
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_map("TEST", vars)
    }

    #[test]
    fn test_new_with_valid_parameters() {
        let config =
            ConnectionConfig::new("localhost", 8400, "testuser", Some("testpass"), "testdb")
                .unwrap();
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 8400);
        assert_eq!(config.username(), "testuser");
        assert_eq!(config.password(), "testpass");
        assert_eq!(config.database(), "testdb");
    }

    #[test]
    fn test_none_password_becomes_empty() {
        let config = ConnectionConfig::new("localhost", 8400, "testuser", None, "testdb").unwrap();
        assert_eq!(config.password(), "");

        let config =
            ConnectionConfig::new("localhost", 8400, "testuser", Some(""), "testdb").unwrap();
        assert_eq!(config.password(), "");
    }

    #[test]
    fn test_rejects_blank_fields() {
        for (host, user, db, field) in [
            ("", "u", "d", "host"),
            ("   ", "u", "d", "host"),
            ("h", "", "d", "username"),
            ("h", "u", "", "database"),
            ("h", "u", " \t", "database"),
        ] {
            let err = ConnectionConfig::new(host, 8400, user, Some("p"), db).unwrap_err();
            match err {
                McpError::InvalidArg { name, .. } => assert_eq!(name, field),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_rejects_out_of_range_port() {
        for port in [-1, 0, 65536, i64::MAX] {
            let err = ConnectionConfig::new("h", port, "u", None, "d").unwrap_err();
            assert!(
                matches!(err, McpError::InvalidArg { ref name, .. } if name == "port"),
                "port {} gave {:?}",
                port,
                err
            );
        }
        assert!(ConnectionConfig::new("h", 1, "u", None, "d").is_ok());
        assert!(ConnectionConfig::new("h", 65535, "u", None, "d").is_ok());
    }

    #[test]
    fn test_display_and_debug_mask_password() {
        let config =
            ConnectionConfig::new("localhost", 8400, "testuser", Some("secretpassword"), "testdb")
                .unwrap();

        for rendered in [config.to_string(), format!("{:?}", config)] {
            assert!(rendered.contains("****"));
            assert!(!rendered.contains("secretpassword"));
            assert!(rendered.contains("localhost"));
            assert!(rendered.contains("8400"));
            assert!(rendered.contains("testuser"));
            assert!(rendered.contains("testdb"));
        }
    }

    #[test]
    fn test_settings_build_config() {
        let settings = settings(&[
            ("TEST_HOST", "db.local"),
            ("TEST_PORT", " 5432 "),
            ("TEST_USERNAME", "reader"),
            ("TEST_DATABASE", "sales"),
        ]);
        let config = settings.connection_config().unwrap();
        assert_eq!(config.host(), "db.local");
        assert_eq!(config.port(), 5432);
        assert_eq!(config.password(), "");
        assert_eq!(config.database(), "sales");
    }

    #[test]
    fn test_settings_missing_variable() {
        let settings = settings(&[("TEST_HOST", "db.local"), ("TEST_PORT", "5432")]);
        let err = settings.connection_config().unwrap_err();
        match err {
            McpError::Configuration(msg) => assert!(msg.contains("TEST_USERNAME")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_settings_non_numeric_port() {
        let settings = settings(&[
            ("TEST_HOST", "db.local"),
            ("TEST_PORT", "fivefour"),
            ("TEST_USERNAME", "reader"),
            ("TEST_DATABASE", "sales"),
        ]);
        let err = settings.connection_config().unwrap_err();
        match err {
            McpError::Configuration(msg) => {
                assert!(msg.contains("TEST_PORT"));
                assert!(msg.contains("fivefour"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_settings_port_out_of_range() {
        let settings = settings(&[
            ("TEST_HOST", "db.local"),
            ("TEST_PORT", "70000"),
            ("TEST_USERNAME", "reader"),
            ("TEST_DATABASE", "sales"),
        ]);
        assert!(matches!(
            settings.connection_config(),
            Err(McpError::InvalidArg { .. })
        ));
    }

    #[test]
    fn test_settings_scopes() {
        let defined = settings(&[("TEST_SCOPES", r#"{"sales": ["orders"]}"#)]);
        assert!(defined.scope_registry().has_scope("sales"));

        let unset = settings(&[]);
        assert!(unset.scope_registry().is_empty());

        let malformed = settings(&[("TEST_SCOPES", "{not json")]);
        assert!(malformed.scope_registry().is_empty());
    }
}
