/// Core Module for nestql
///
/// This module contains the data-access layer proper: the database facade,
/// execution contexts, the transaction manager, commands and row readers,
/// together with the shared error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{NestqlError, Result};
