/// Connection Module
///
/// Opening physical connections is delegated to a `ConnectionFactory`. The
/// default factory, `SqliteConnector`, opens a SQLite database from a
/// connection string and applies the pragmas every connection should carry.
use crate::config::DatabaseConfig;
use crate::core::Result;
use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::time::Duration;
use tracing::trace;

/// Default busy timeout applied to every connection
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Opens fresh physical connections.
pub trait ConnectionFactory: Send + Sync {
    fn open(&self) -> Result<Connection>;
}

impl<F> ConnectionFactory for F
where
    F: Fn() -> Result<Connection> + Send + Sync,
{
    fn open(&self) -> Result<Connection> {
        self()
    }
}

/// Opens SQLite connections from a connection string
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    /// Path to the database file, `:memory:`, or a `file:` URI
    connection_string: String,
    flags: OpenFlags,
    busy_timeout: Duration,
    foreign_keys: bool,
    /// Journal mode to request (None leaves the database's mode untouched)
    journal_mode: Option<String>,
}

impl SqliteConnector {
    /// Creates a connector with the default pragmas (`foreign_keys = ON`,
    /// `journal_mode = WAL`).
    pub fn new(connection_string: &str) -> Self {
        SqliteConnector {
            connection_string: connection_string.to_string(),
            flags: OpenFlags::default(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            foreign_keys: true,
            journal_mode: Some("WAL".to_string()),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        let mut connector = SqliteConnector::new(&config.connection_string);
        if let Some(ms) = config.busy_timeout_ms {
            connector.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(foreign_keys) = config.foreign_keys {
            connector.foreign_keys = foreign_keys;
        }
        if let Some(mode) = &config.journal_mode {
            connector.journal_mode = Some(mode.clone());
        }
        if config.read_only.unwrap_or(false) {
            connector.flags = OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            // Changing the journal mode needs write access.
            connector.journal_mode = None;
        }
        connector
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn with_flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn with_journal_mode(mut self, mode: Option<&str>) -> Self {
        self.journal_mode = mode.map(str::to_string);
        self
    }
}

impl ConnectionFactory for SqliteConnector {
    fn open(&self) -> Result<Connection> {
        trace!("Opening connection to {}", self.connection_string);
        let conn = Connection::open_with_flags(&self.connection_string, self.flags)?;

        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", self.foreign_keys)?;
        if let Some(mode) = &self.journal_mode {
            // journal_mode reports the resulting mode as a row.
            let _applied: String =
                conn.pragma_update_and_check(None, "journal_mode", mode, |row| row.get(0))?;
        }
        Ok(conn)
    }
}

impl fmt::Display for SqliteConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sqlite:{}", self.connection_string)
    }
}
