/// Execution Context Module
///
/// An execution context is anything that can run a prepared command against a
/// physical connection: the `Database` facade, a `RootContext` wrapping one open
/// connection, and a `TransactionContext`. All of them expose the same surface,
/// so code that issues commands does not care which one it was handed.
use crate::core::db::command::{NonQuery, Query};
use crate::core::db::transaction::{self, IsolationLevel, TransactionContext};
use crate::core::Result;
use rusqlite::Connection;

/// The shared contract of every place commands can run.
pub trait ExecutionContext {
    /// Runs `f` against the physical connection this context executes on.
    ///
    /// Used by `Query` and `NonQuery`; application code rarely needs it.
    fn run_command<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>;

    /// Runs `f` inside a transaction scope.
    ///
    /// On a context without a transaction this begins a physical transaction;
    /// on a `TransactionContext` it opens a nested scope on the same one.
    fn transaction_do<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TransactionContext<'_>) -> Result<T>;

    /// Creates a query bound to this context.
    fn query(&self, text: &str) -> Query<'_, Self>
    where
        Self: Sized,
    {
        Query::new(self, text)
    }

    /// Creates a non-query bound to this context.
    fn non_query(&self, text: &str) -> NonQuery<'_, Self>
    where
        Self: Sized,
    {
        NonQuery::new(self, text)
    }
}

/// A context over one open connection with no transaction of its own.
///
/// Commands run in autocommit mode. The connection belongs to the enclosing
/// `Database::with_connection` call and is closed when it returns.
#[derive(Debug)]
pub struct RootContext<'conn> {
    conn: &'conn Connection,
    default_isolation: IsolationLevel,
}

impl<'conn> RootContext<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        RootContext {
            conn,
            default_isolation: IsolationLevel::default(),
        }
    }

    pub(crate) fn with_isolation(conn: &'conn Connection, level: IsolationLevel) -> Self {
        RootContext {
            conn,
            default_isolation: level,
        }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Begins a physical transaction with the given isolation level and runs `f`
    /// inside it.
    pub fn transaction_do_with<T, F>(&self, level: IsolationLevel, f: F) -> Result<T>
    where
        F: FnOnce(&TransactionContext<'_>) -> Result<T>,
    {
        transaction::run_top_level(self.conn, level, f)
    }
}

impl ExecutionContext for RootContext<'_> {
    fn run_command<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        f(self.conn)
    }

    fn transaction_do<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TransactionContext<'_>) -> Result<T>,
    {
        self.transaction_do_with(self.default_isolation, f)
    }
}
