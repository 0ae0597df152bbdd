/// Database Module
///
/// This module provides the data-access layer, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Connections** (`connection.rs`): connection factories and SQLite pragmas
/// - **Facade** (`database.rs`): the `Database` entry point
/// - **Contexts** (`context.rs`): the `ExecutionContext` contract and `RootContext`
/// - **Transactions** (`transaction.rs`): nested transaction scopes over one
///   physical transaction
/// - **Commands** (`command.rs`): `Query` and `NonQuery` builders
/// - **Parameters** (`params.rs`) and **values** (`value.rs`): marshalling
/// - **Rows** (`row.rs`): the forward-only `RowReader` and owned `Record`
///
/// ## Error Handling
///
/// All operations return `NestqlError`. Driver errors are passed through
/// unchanged in `NestqlError::Database`.
pub mod command;
pub mod connection;
pub mod context;
pub mod database;
pub mod params;
pub mod row;
pub mod transaction;
pub mod value;

pub use command::{Command, NonQuery, Query, StatementKind};
pub use connection::{ConnectionFactory, SqliteConnector};
pub use context::{ExecutionContext, RootContext};
pub use database::Database;
pub use params::{DbType, Parameter, ParameterSet};
pub use row::{FieldIndex, NameComparison, Record, RowReader};
pub use transaction::{IsolationLevel, TransactionContext, TransactionStatus};
pub use value::DbValue;
