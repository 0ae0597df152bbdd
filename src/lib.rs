//! nestql: commands with named parameters and nestable transaction scopes
//! over SQLite.
//!
//! ```no_run
//! use nestql::{Database, ExecutionContext};
//!
//! let db = Database::open("app.db");
//! db.transaction_do(|outer| {
//!     outer.non_query("UPDATE users SET name = @new WHERE name = @old")
//!         .with_parameter("@old", "Ricardo")
//!         .with_parameter("@new", "Richo")
//!         .execute()?;
//!     // Runs on the same physical transaction; only the outer scope commits.
//!     outer.transaction_do(|inner| {
//!         inner.non_query("DELETE FROM users WHERE name = @name")
//!             .with_parameter("@name", "Richo")
//!             .execute()?;
//!         Ok(())
//!     })
//! })?;
//! # Ok::<(), nestql::NestqlError>(())
//! ```

// Core infrastructure modules
pub mod core;

pub mod config;

pub use crate::config::{load_config, Config, DatabaseConfig, LoggingConfig};
pub use crate::core::db::{
    Command, ConnectionFactory, Database, DbType, DbValue, ExecutionContext, FieldIndex,
    IsolationLevel, NameComparison, NonQuery, Parameter, ParameterSet, Query, Record,
    RootContext, RowReader, SqliteConnector, StatementKind, TransactionContext,
    TransactionStatus,
};
pub use crate::core::{NestqlError, Result};
