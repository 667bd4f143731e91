//! Database session lifecycle.
//!
//! A [`SessionHandle`] owns at most one native connection. It is created per
//! tool call, connected, handed to exactly one service, and disconnected before
//! the call returns.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::ConnectionConfig;
use crate::driver::{Connection, Driver};
use crate::error::{McpError, Result};

/// Connection state machine for a single database session.
///
/// The handle is connected iff it holds a native connection that reports an
/// open database. Disconnecting always clears the native handle and the stored
/// config, even when the driver's close call fails.
pub struct SessionHandle {
    driver: Arc<dyn Driver>,
    native: Option<Box<dyn Connection>>,
    config: Option<ConnectionConfig>,
}

impl SessionHandle {
    /// Create a disconnected handle backed by `driver`.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            native: None,
            config: None,
        }
    }

    /// Open a session, replacing any session this handle already holds.
    ///
    /// On failure the handle is left disconnected.
    pub fn connect(&mut self, config: ConnectionConfig) -> Result<()> {
        if self.native.is_some() {
            info!("Closing existing connection before establishing new one");
            if let Err(e) = self.disconnect() {
                warn!("Ignoring failure while closing previous connection: {}", e);
            }
        }

        info!(driver = self.driver.name(), "Connecting: {}", config);

        let mut native = self
            .driver
            .open(
                config.host(),
                config.port(),
                config.username(),
                config.password(),
            )
            .map_err(|e| {
                error!("Failed to connect: {}", e);
                McpError::ConnectionFailure(e.message)
            })?;

        if let Err(e) = native.open_database(config.database()) {
            error!("Failed to open database {}: {}", config.database(), e);
            if let Err(close_err) = native.close() {
                warn!("Failed to release partial connection: {}", close_err);
            }
            return Err(McpError::ConnectionFailure(e.message));
        }

        info!("Connected to database: {}", config.database());
        self.native = Some(native);
        self.config = Some(config);
        Ok(())
    }

    /// Whether a live session is held.
    pub fn is_connected(&self) -> bool {
        self.native.as_ref().map_or(false, |c| c.is_open())
    }

    /// Close the session. A no-op when nothing is held.
    ///
    /// State is cleared before the driver is asked to close, so a failing
    /// close still leaves the handle disconnected.
    pub fn disconnect(&mut self) -> Result<()> {
        self.config = None;
        let Some(mut native) = self.native.take() else {
            return Ok(());
        };

        info!("Disconnecting");
        native.close().map_err(|e| {
            error!("Failed to disconnect: {}", e);
            McpError::DisconnectFailure(e.message)
        })?;
        info!("Disconnected");
        Ok(())
    }

    /// The live native connection, or [`McpError::NotConnected`].
    pub fn require_connection(&mut self) -> Result<&mut dyn Connection> {
        match self.native.as_deref_mut() {
            Some(native) if native.is_open() => Ok(native),
            _ => Err(McpError::NotConnected),
        }
    }

    /// Config of the current session, `None` while disconnected.
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.native.is_some() {
            warn!("Session dropped while connected; disconnecting");
            if let Err(e) = self.disconnect() {
                warn!("{}", e);
            }
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("driver", &self.driver.name())
            .field("connected", &self.is_connected())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryDriver;

    fn config(database: &str) -> ConnectionConfig {
        ConnectionConfig::new("localhost", 8400, "testuser", Some("testpass"), database).unwrap()
    }

    fn session(driver: &MemoryDriver) -> SessionHandle {
        SessionHandle::new(Arc::new(driver.clone()))
    }

    #[test]
    fn test_fresh_handle_is_disconnected() {
        let mut handle = session(&MemoryDriver::new());
        assert!(!handle.is_connected());
        assert!(handle.config().is_none());
        assert!(matches!(
            handle.require_connection(),
            Err(McpError::NotConnected)
        ));
    }

    #[test]
    fn test_disconnect_when_disconnected_is_noop() {
        let driver = MemoryDriver::new();
        let mut handle = session(&driver);
        handle.disconnect().unwrap();
        handle.disconnect().unwrap();
        assert!(!handle.is_connected());
        assert_eq!(driver.stats().closes, 0);
    }

    #[test]
    fn test_connect_and_disconnect() {
        let driver = MemoryDriver::new().with_database_named("testdb");
        let mut handle = session(&driver);

        handle.connect(config("testdb")).unwrap();
        assert!(handle.is_connected());
        assert_eq!(handle.config().unwrap().database(), "testdb");
        assert_eq!(
            handle.require_connection().unwrap().database(),
            Some("testdb")
        );

        handle.disconnect().unwrap();
        assert!(!handle.is_connected());
        assert!(handle.config().is_none());
        handle.disconnect().unwrap();
        assert_eq!(driver.stats().live_connections(), 0);
    }

    #[test]
    fn test_reconnect_closes_previous_session() {
        let driver = MemoryDriver::new()
            .with_database_named("a")
            .with_database_named("b");
        let mut handle = session(&driver);

        handle.connect(config("a")).unwrap();
        handle.connect(config("b")).unwrap();

        let stats = driver.stats();
        assert_eq!(stats.opens, 2);
        assert_eq!(stats.live_connections(), 1);
        assert_eq!(handle.config().unwrap().database(), "b");
    }

    #[test]
    fn test_connect_failure_leaves_handle_disconnected() {
        let driver = MemoryDriver::new()
            .with_database_named("testdb")
            .fail_open("connection refused");
        let mut handle = session(&driver);

        let err = handle.connect(config("testdb")).unwrap_err();
        match err {
            McpError::ConnectionFailure(msg) => assert!(msg.contains("connection refused")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!handle.is_connected());
        assert!(handle.config().is_none());
    }

    #[test]
    fn test_unknown_database_releases_partial_connection() {
        let driver = MemoryDriver::new().with_database_named("testdb");
        let mut handle = session(&driver);
        handle.connect(config("testdb")).unwrap();

        let err = handle.connect(config("missing")).unwrap_err();
        assert!(matches!(err, McpError::ConnectionFailure(_)));
        assert!(!handle.is_connected());
        assert!(handle.config().is_none());
        assert_eq!(driver.stats().live_connections(), 0);
    }

    #[test]
    fn test_failed_close_still_clears_state() {
        let driver = MemoryDriver::new()
            .with_database_named("testdb")
            .fail_close("socket gone");
        let mut handle = session(&driver);
        handle.connect(config("testdb")).unwrap();

        let err = handle.disconnect().unwrap_err();
        assert!(matches!(err, McpError::DisconnectFailure(_)));
        assert!(!handle.is_connected());
        assert!(handle.config().is_none());

        handle.disconnect().unwrap();
    }

    #[test]
    fn test_drop_disconnects() {
        let driver = MemoryDriver::new().with_database_named("testdb");
        {
            let mut handle = session(&driver);
            handle.connect(config("testdb")).unwrap();
        }
        assert_eq!(driver.stats().live_connections(), 0);
    }

    #[test]
    fn test_debug_masks_password() {
        let driver = MemoryDriver::new().with_database_named("testdb");
        let mut handle = session(&driver);
        handle.connect(config("testdb")).unwrap();
        let rendered = format!("{:?}", handle);
        assert!(rendered.contains("connected: true"));
        assert!(!rendered.contains("testpass"));
    }
}
