/// Nestql Error Module
///
/// This module defines the error types surfaced by the data-access layer.
/// Driver failures are carried through untouched; the remaining variants are
/// raised by the layer itself.
use thiserror::Error;

/// Error type for every fallible nestql operation.
///
/// The variants fall into three groups:
/// - Driver errors from SQLite, passed through without translation
/// - Core errors raised by the transaction and row layers
/// - Ambient errors (configuration, I/O, JSON) and application errors raised
///   from transaction bodies
#[derive(Error, Debug)]
pub enum NestqlError {
    /// Any failure raised by the underlying connection, statement or cursor
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A command, commit or rollback was attempted on a finished transaction
    #[error("The transaction has been completed already")]
    TransactionCompleted,

    /// A name-indexed row accessor was given an unknown column name
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// The statement declares a parameter that was never supplied
    #[error("Missing value for parameter: {0}")]
    MissingParameter(String),

    /// Rolling back after a failed transaction body failed as well
    #[error("Rollback failed: {source} (original error: {original})")]
    RollbackFailed {
        #[source]
        source: rusqlite::Error,
        original: Box<NestqlError>,
    },

    /// The command asks for something the driver cannot do
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors raised by application code, typically to abort a transaction body
    #[error("Application error: {0}")]
    App(String),
}

impl NestqlError {
    /// Shorthand for raising an application error from a transaction body.
    pub fn app(message: impl Into<String>) -> Self {
        NestqlError::App(message.into())
    }

    /// Returns true for errors signalling reuse of a finished transaction.
    pub fn is_transaction_completed(&self) -> bool {
        matches!(self, NestqlError::TransactionCompleted)
    }

    /// Returns the driver error when this error came from SQLite.
    pub fn as_driver_error(&self) -> Option<&rusqlite::Error> {
        match self {
            NestqlError::Database(e) => Some(e),
            _ => None,
        }
    }
}

/// Type alias for Result to use NestqlError as the error type.
pub type Result<T> = std::result::Result<T, NestqlError>;
