/// Database Facade Module
///
/// `Database` is the entry point of the library. It holds only connection
/// configuration; every command or scope it runs opens its own physical
/// connection and closes it on return, so one `Database` can be shared freely
/// between threads.
use crate::config::DatabaseConfig;
use crate::core::db::connection::{ConnectionFactory, SqliteConnector};
use crate::core::db::context::{ExecutionContext, RootContext};
use crate::core::db::transaction::{IsolationLevel, TransactionContext};
use crate::core::Result;
use rusqlite::Connection;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Application handle to one database
#[derive(Clone)]
pub struct Database {
    factory: Arc<dyn ConnectionFactory>,
    default_isolation: IsolationLevel,
}

impl Database {
    /// Creates a database that opens SQLite connections to `connection_string`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use nestql::{Database, ExecutionContext};
    ///
    /// let db = Database::open("app.db");
    /// let count: i64 = db.query("SELECT count(*) FROM users").scalar()?;
    /// # Ok::<(), nestql::NestqlError>(())
    /// ```
    pub fn open(connection_string: &str) -> Self {
        Database::with_factory(SqliteConnector::new(connection_string))
    }

    /// Creates a database backed by a custom connection factory.
    pub fn with_factory(factory: impl ConnectionFactory + 'static) -> Self {
        Database {
            factory: Arc::new(factory),
            default_isolation: IsolationLevel::default(),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Database::with_factory(SqliteConnector::from_config(config))
            .with_default_isolation(config.isolation_level.unwrap_or_default())
    }

    /// Sets the isolation level used by `transaction_do`.
    pub fn with_default_isolation(mut self, level: IsolationLevel) -> Self {
        self.default_isolation = level;
        self
    }

    pub fn default_isolation(&self) -> IsolationLevel {
        self.default_isolation
    }

    /// Opens a connection, runs `f` with it, and closes it on every exit path.
    pub fn connection_do<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.factory.open()?;
        trace!("Connection opened");
        let result = f(&conn);
        drop(conn);
        trace!("Connection closed");
        result
    }

    /// Like `connection_do`, but hands out a `RootContext` so several commands
    /// can share one connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&RootContext<'_>) -> Result<T>,
    {
        self.connection_do(|conn| f(&RootContext::with_isolation(conn, self.default_isolation)))
    }

    /// Runs `f` in a new physical transaction begun with `level`.
    ///
    /// The transaction commits when `f` returns `Ok` and is still active, and
    /// rolls back when `f` returns `Err`.
    pub fn transaction_do_with<T, F>(&self, level: IsolationLevel, f: F) -> Result<T>
    where
        F: FnOnce(&TransactionContext<'_>) -> Result<T>,
    {
        self.with_connection(|root| root.transaction_do_with(level, f))
    }
}

impl ExecutionContext for Database {
    fn run_command<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.connection_do(f)
    }

    fn transaction_do<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TransactionContext<'_>) -> Result<T>,
    {
        self.transaction_do_with(self.default_isolation, f)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("default_isolation", &self.default_isolation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NestqlError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn temp_database(dir: &TempDir) -> Database {
        let path = dir.path().join("facade.db");
        let db = Database::open(path.to_str().unwrap());
        db.non_query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
            .execute()
            .unwrap();
        db
    }

    #[test]
    fn test_each_command_opens_its_own_connection() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        let db = Database::with_factory(move || -> Result<Connection> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Connection::open_in_memory()?)
        });

        let one: i64 = db.query("SELECT 1").scalar().unwrap();
        let two: i64 = db.query("SELECT 2").scalar().unwrap();
        assert_eq!(one + two, 3);
        assert_eq!(opened.load(Ordering::SeqCst), 2);

        db.with_connection(|root| {
            root.query("SELECT 1").scalar::<i64>()?;
            root.query("SELECT 1").scalar::<i64>()?;
            Ok(())
        })
        .unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_connection_do_returns_value_and_errors() {
        let dir = TempDir::new().unwrap();
        let db = temp_database(&dir);

        let autocommit = db.connection_do(|conn| Ok(conn.is_autocommit())).unwrap();
        assert!(autocommit);

        let err = db
            .connection_do(|conn| -> Result<()> {
                conn.execute("INSERT INTO missing VALUES (1)", [])?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.as_driver_error().is_some());
    }

    #[test]
    fn test_transaction_do_with_isolation() {
        let dir = TempDir::new().unwrap();
        let db = temp_database(&dir).with_default_isolation(IsolationLevel::Immediate);
        assert_eq!(db.default_isolation(), IsolationLevel::Immediate);

        db.transaction_do(|tx| {
            tx.non_query("INSERT INTO notes (body) VALUES ('x')").execute()?;
            Ok(())
        })
        .unwrap();

        let result: Result<()> = db.transaction_do_with(IsolationLevel::Exclusive, |tx| {
            tx.non_query("INSERT INTO notes (body) VALUES ('y')").execute()?;
            Err(NestqlError::app("discard"))
        });
        assert!(result.is_err());

        let count: i64 = db.query("SELECT count(*) FROM notes").scalar().unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_open_failure_is_driver_error() {
        let db = Database::open("/nonexistent/path/database.db");
        let err = db.query("SELECT 1").scalar::<i64>().unwrap_err();
        assert!(matches!(err, NestqlError::Database(_)));
    }

    #[test]
    fn test_database_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Database>();
    }
}
