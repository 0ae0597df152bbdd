//! Shared fixtures for the integration tests.
//!
//! Each fixture owns a temporary directory holding a file-backed database,
//! since every facade call opens its own connection and `:memory:` databases
//! are private to one connection.
#![allow(dead_code)]

use chrono::NaiveDateTime;
use nestql::{Database, ExecutionContext, Result};
use std::path::PathBuf;
use tempfile::TempDir;
use uuid::Uuid;

pub struct TestDatabase {
    pub db: Database,
    pub path: PathBuf,
    _dir: TempDir,
}

/// Creates a database with an empty `Test` table.
pub fn setup() -> TestDatabase {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.db");
    let db = Database::open(path.to_str().unwrap());
    db.non_query(
        "CREATE TABLE Test (
            id TEXT NOT NULL PRIMARY KEY,
            name TEXT NULL,
            datetime TEXT NULL,
            number INTEGER NULL
        )",
    )
    .execute()
    .unwrap();
    TestDatabase { db, path, _dir: dir }
}

pub fn perform_insert<C: ExecutionContext>(
    ctx: &C,
    id: Uuid,
    name: Option<&str>,
    at: Option<NaiveDateTime>,
    number: Option<i32>,
) -> Result<usize> {
    ctx.non_query(
        "INSERT INTO Test (id, name, datetime, number) VALUES (@id, @name, @datetime, @number)",
    )
    .with_parameter("@id", id)
    .with_parameter("@name", name)
    .with_parameter("@datetime", at)
    .with_parameter("@number", number)
    .execute()
}

/// Creates a database holding the three rows the transaction scenarios start from.
pub fn setup_with_names() -> TestDatabase {
    let fixture = setup();
    for name in ["Ricardo", "Diego", "Sofía"] {
        perform_insert(&fixture.db, Uuid::new_v4(), Some(name), None, None).unwrap();
    }
    fixture
}

pub fn count<C: ExecutionContext>(ctx: &C) -> Result<i64> {
    ctx.query("SELECT count(*) FROM Test").scalar()
}

pub fn rename<C: ExecutionContext>(ctx: &C, old: &str, new: &str) -> Result<usize> {
    ctx.non_query("UPDATE Test SET name = @new_name WHERE name = @old_name")
        .with_parameter("@old_name", old)
        .with_parameter("@new_name", new)
        .execute()
}

pub fn delete_named<C: ExecutionContext>(ctx: &C, name: &str) -> Result<usize> {
    ctx.non_query("DELETE FROM Test WHERE name = @name")
        .with_parameter("@name", name)
        .execute()
}

pub fn sample_datetime() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2023, 11, 5)
        .unwrap()
        .and_hms_milli_opt(14, 3, 27, 125)
        .unwrap()
}
