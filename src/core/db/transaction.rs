/// Transaction Module
///
/// SQLite allows a single active transaction per connection, so nested
/// `transaction_do` scopes are simulated: only the outermost scope begins and
/// commits the physical transaction, and every nested `TransactionContext`
/// aliases the same shared state cell.
///
/// ## Lifecycle
///
/// The shared state starts `Active` after the physical BEGIN and leaves it
/// exactly once, either through an explicit `commit()`/`rollback()` on any
/// context in the nest, through the outermost body returning `Ok` (implicit
/// commit), or through any body returning `Err` (implicit rollback). Implicit
/// completion is skipped once the state is no longer `Active`; explicit
/// completion and command execution fail with `TransactionCompleted`.
///
/// If SQLite ends the transaction itself (the connection is back in
/// autocommit mode while the state is still `Active`), the state moves to
/// `RolledBack` on the next check and the outermost scope reports
/// `TransactionCompleted` even when its body returned `Ok`.
use crate::core::db::context::ExecutionContext;
use crate::core::{NestqlError, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, warn};

/// How the physical transaction is begun.
///
/// SQLite has no ANSI isolation levels; these are its BEGIN behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    /// Locks are acquired on first read/write (driver default)
    #[default]
    Deferred,
    /// A write lock is acquired immediately
    Immediate,
    /// Readers outside the transaction are blocked as well (rollback journal only)
    Exclusive,
}

impl IsolationLevel {
    fn behavior(self) -> TransactionBehavior {
        match self {
            IsolationLevel::Deferred => TransactionBehavior::Deferred,
            IsolationLevel::Immediate => TransactionBehavior::Immediate,
            IsolationLevel::Exclusive => TransactionBehavior::Exclusive,
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = NestqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" => Ok(IsolationLevel::Deferred),
            "immediate" => Ok(IsolationLevel::Immediate),
            "exclusive" => Ok(IsolationLevel::Exclusive),
            other => Err(NestqlError::Config(format!(
                "unknown isolation level '{}' (expected deferred, immediate or exclusive)",
                other
            ))),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::Deferred => "deferred",
            IsolationLevel::Immediate => "immediate",
            IsolationLevel::Exclusive => "exclusive",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a physical transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy)]
enum Completion {
    Commit,
    Rollback,
}

/// State shared by every context nested under one outermost scope.
struct TransactionCell<'conn> {
    status: Cell<TransactionStatus>,
    // Taken (and thereby released) on the first transition out of `Active`.
    physical: RefCell<Option<Transaction<'conn>>>,
    // Set when SQLite ended the transaction without going through this cell.
    ended_by_driver: Cell<bool>,
}

impl<'conn> TransactionCell<'conn> {
    fn new(physical: Transaction<'conn>) -> Self {
        TransactionCell {
            status: Cell::new(TransactionStatus::Active),
            physical: RefCell::new(Some(physical)),
            ended_by_driver: Cell::new(false),
        }
    }

    fn status(&self) -> TransactionStatus {
        self.sync_with_connection();
        self.status.get()
    }

    /// Marks the transaction rolled back if SQLite already ended it.
    ///
    /// `INSERT OR ROLLBACK`, a raw `ROLLBACK`, and errors such as SQLITE_FULL
    /// return the connection to autocommit mode behind our back.
    fn sync_with_connection(&self) {
        if self.status.get() != TransactionStatus::Active {
            return;
        }
        let mut physical = self.physical.borrow_mut();
        if physical.as_ref().map_or(false, |tx| tx.is_autocommit()) {
            warn!("Transaction was ended by SQLite; treating it as rolled back");
            // Dropping a transaction on an autocommit connection issues nothing.
            drop(physical.take());
            self.status.set(TransactionStatus::RolledBack);
            self.ended_by_driver.set(true);
        }
    }

    fn ended_by_driver(&self) -> bool {
        self.sync_with_connection();
        self.ended_by_driver.get()
    }

    fn ensure_active(&self) -> Result<()> {
        match self.status() {
            TransactionStatus::Active => Ok(()),
            _ => Err(NestqlError::TransactionCompleted),
        }
    }

    fn complete(&self, completion: Completion) -> Result<()> {
        let physical = self
            .physical
            .borrow_mut()
            .take()
            .ok_or(NestqlError::TransactionCompleted)?;

        let (target, result) = match completion {
            Completion::Commit => (TransactionStatus::Committed, physical.commit()),
            Completion::Rollback if physical.is_autocommit() => {
                (TransactionStatus::RolledBack, Ok(()))
            }
            Completion::Rollback => (TransactionStatus::RolledBack, physical.rollback()),
        };
        // A failed COMMIT drops the transaction, which rolls it back.
        self.status.set(if result.is_ok() {
            target
        } else {
            TransactionStatus::RolledBack
        });
        Ok(result?)
    }
}

/// A transaction scope: runs commands on a borrowed connection inside a
/// physical transaction shared with its enclosing and nested scopes.
///
/// Not `Send`: a nest of contexts belongs to one call stack.
pub struct TransactionContext<'conn> {
    conn: &'conn Connection,
    cell: Rc<TransactionCell<'conn>>,
    depth: usize,
}

impl<'conn> TransactionContext<'conn> {
    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn status(&self) -> TransactionStatus {
        self.cell.status()
    }

    pub fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    /// Nesting depth; the outermost scope is 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Commits the shared physical transaction now.
    ///
    /// Fails with `TransactionCompleted` if it was already committed or rolled back.
    pub fn commit(&self) -> Result<()> {
        self.cell.ensure_active()?;
        debug!("Committing transaction explicitly at depth {}", self.depth);
        self.cell.complete(Completion::Commit)
    }

    /// Rolls back the shared physical transaction now.
    ///
    /// Fails with `TransactionCompleted` if it was already committed or rolled back.
    pub fn rollback(&self) -> Result<()> {
        self.cell.ensure_active()?;
        debug!("Rolling back transaction explicitly at depth {}", self.depth);
        self.cell.complete(Completion::Rollback)
    }

    fn nested(&self) -> TransactionContext<'conn> {
        TransactionContext {
            conn: self.conn,
            cell: Rc::clone(&self.cell),
            depth: self.depth + 1,
        }
    }
}

impl fmt::Debug for TransactionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("status", &self.status())
            .field("depth", &self.depth)
            .finish()
    }
}

impl ExecutionContext for TransactionContext<'_> {
    fn run_command<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.cell.ensure_active()?;
        f(self.conn)
    }

    /// Opens a nested scope on the same physical transaction.
    ///
    /// Returning `Ok` from a nested body commits nothing; returning `Err` rolls
    /// back the whole transaction.
    fn transaction_do<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TransactionContext<'_>) -> Result<T>,
    {
        self.cell.ensure_active()?;
        let inner = self.nested();
        debug!("Entering nested transaction scope at depth {}", inner.depth);
        run_scope(&inner, false, f)
    }
}

/// Begins a physical transaction on `conn` and runs `f` as the outermost scope.
pub(crate) fn run_top_level<T, F>(conn: &Connection, level: IsolationLevel, f: F) -> Result<T>
where
    F: FnOnce(&TransactionContext<'_>) -> Result<T>,
{
    let physical = Transaction::new_unchecked(conn, level.behavior())?;
    debug!("Began {} transaction", level);
    let ctx = TransactionContext {
        conn,
        cell: Rc::new(TransactionCell::new(physical)),
        depth: 0,
    };
    run_scope(&ctx, true, f)
}

/// Runs one scope body and applies implicit completion.
///
/// If `f` panics, the physical transaction is dropped during unwinding and
/// rusqlite rolls it back.
fn run_scope<T, F>(ctx: &TransactionContext<'_>, outermost: bool, f: F) -> Result<T>
where
    F: FnOnce(&TransactionContext<'_>) -> Result<T>,
{
    match f(ctx) {
        Ok(value) => {
            if outermost {
                // The body's work is gone; reporting success would hide that.
                if ctx.cell.ended_by_driver() {
                    return Err(NestqlError::TransactionCompleted);
                }
                if ctx.is_active() {
                    debug!("Committing transaction");
                    ctx.cell.complete(Completion::Commit)?;
                } else {
                    debug!("Transaction already {:?}; skipping commit", ctx.status());
                }
            }
            Ok(value)
        }
        Err(err) => {
            if !ctx.is_active() {
                return Err(err);
            }
            warn!(
                "Rolling back transaction after error at depth {}: {}",
                ctx.depth, err
            );
            Err(with_rollback_outcome(
                err,
                ctx.cell.complete(Completion::Rollback),
            ))
        }
    }
}

/// The error reported for a failed body, given how the rollback went.
fn with_rollback_outcome(original: NestqlError, rollback: Result<()>) -> NestqlError {
    match rollback {
        Ok(()) => original,
        Err(NestqlError::Database(source)) => NestqlError::RollbackFailed {
            source,
            original: Box::new(original),
        },
        Err(other) => other,
    }
}
