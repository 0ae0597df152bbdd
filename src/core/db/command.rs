/// Command Module
///
/// Queries and non-queries are built by chaining parameters onto command text,
/// then executed exactly once through the context they were created from.
use crate::core::db::context::ExecutionContext;
use crate::core::db::params::{DbType, ParameterSet};
use crate::core::db::row::{Record, RowReader};
use crate::core::db::value::DbValue;
use crate::core::{NestqlError, Result};
use rusqlite::types::FromSql;
use rusqlite::{Connection, Rows, Statement};
use tracing::debug;

/// Command text plus its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    text: String,
    stored_procedure: bool,
    parameters: ParameterSet,
}

impl Command {
    pub fn new(text: &str) -> Self {
        Command {
            text: text.to_string(),
            stored_procedure: false,
            parameters: ParameterSet::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn is_stored_procedure(&self) -> bool {
        self.stored_procedure
    }

    /// Prepares the command on `conn` and binds its parameters.
    pub(crate) fn prepare<'c>(&self, conn: &'c Connection) -> Result<Statement<'c>> {
        if self.stored_procedure {
            return Err(NestqlError::Unsupported(format!(
                "SQLite has no stored procedures: {}",
                self.text
            )));
        }
        debug!(
            "Executing command: {} ({} parameters)",
            self.text,
            self.parameters.len()
        );
        let mut stmt = conn.prepare(&self.text)?;
        self.parameters.bind(&mut stmt)?;
        Ok(stmt)
    }
}

/// A statement that modifies data and reports the number of affected rows
pub struct NonQuery<'c, C: ExecutionContext> {
    context: &'c C,
    command: Command,
}

impl<'c, C: ExecutionContext> NonQuery<'c, C> {
    pub(crate) fn new(context: &'c C, text: &str) -> Self {
        NonQuery {
            context,
            command: Command::new(text),
        }
    }

    /// Sets a parameter value; `None` binds NULL.
    pub fn with_parameter(mut self, name: &str, value: impl Into<DbValue>) -> Self {
        self.command.parameters.set(name, value.into(), None);
        self
    }

    /// Sets a parameter value and forces its declared type.
    pub fn with_typed_parameter(
        mut self,
        name: &str,
        value: impl Into<DbValue>,
        db_type: DbType,
    ) -> Self {
        self.command.parameters.set(name, value.into(), Some(db_type));
        self
    }

    /// Marks the command text as a stored procedure name.
    pub fn stored_procedure(mut self) -> Self {
        self.command.stored_procedure = true;
        self
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Executes the statement and returns the number of affected rows.
    pub fn execute(self) -> Result<usize> {
        let command = self.command;
        self.context.run_command(|conn| {
            let mut stmt = command.prepare(conn)?;
            Ok(stmt.raw_execute()?)
        })
    }
}

/// A statement that produces rows
pub struct Query<'c, C: ExecutionContext> {
    context: &'c C,
    command: Command,
}

impl<'c, C: ExecutionContext> Query<'c, C> {
    pub(crate) fn new(context: &'c C, text: &str) -> Self {
        Query {
            context,
            command: Command::new(text),
        }
    }

    /// Sets a parameter value; `None` binds NULL.
    pub fn with_parameter(mut self, name: &str, value: impl Into<DbValue>) -> Self {
        self.command.parameters.set(name, value.into(), None);
        self
    }

    /// Sets a parameter value and forces its declared type.
    pub fn with_typed_parameter(
        mut self,
        name: &str,
        value: impl Into<DbValue>,
        db_type: DbType,
    ) -> Self {
        self.command.parameters.set(name, value.into(), Some(db_type));
        self
    }

    pub fn stored_procedure(mut self) -> Self {
        self.command.stored_procedure = true;
        self
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    fn execute<T, F>(self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Rows<'_>) -> Result<T>,
    {
        let command = self.command;
        self.context.run_command(|conn| {
            let mut stmt = command.prepare(conn)?;
            let mut rows = stmt.raw_query();
            f(&mut rows)
        })
    }

    /// Runs `action` for every row.
    pub fn for_each<F>(self, mut action: F) -> Result<()>
    where
        F: FnMut(&RowReader<'_, '_>) -> Result<()>,
    {
        self.execute(|rows| {
            while let Some(row) = rows.next()? {
                action(&RowReader::new(row))?;
            }
            Ok(())
        })
    }

    /// Maps every row through `f`.
    pub fn select<T, F>(self, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&RowReader<'_, '_>) -> Result<T>,
    {
        self.execute(|rows| {
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                result.push(f(&RowReader::new(row))?);
            }
            Ok(result)
        })
    }

    /// Maps the first row through `f`, or returns `None` for an empty result.
    pub fn first<T, F>(self, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&RowReader<'_, '_>) -> Result<T>,
    {
        self.execute(|rows| match rows.next()? {
            Some(row) => f(&RowReader::new(row)).map(Some),
            None => Ok(None),
        })
    }

    /// Reads column 0 of row 0.
    ///
    /// An empty result is reported by the driver as `QueryReturnedNoRows`.
    pub fn scalar<T: FromSql>(self) -> Result<T> {
        self.execute(|rows| match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Err(rusqlite::Error::QueryReturnedNoRows.into()),
        })
    }

    /// Materializes every row as a `Record`.
    pub fn to_array(self) -> Result<Vec<Record>> {
        self.select(|row| row.to_record())
    }
}

/// Represents different SQL statement types for introspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementKind {
    /// SELECT, WITH, VALUES and EXPLAIN statements
    Select,
    /// PRAGMA statements
    Pragma,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// CREATE statement
    Create,
    /// DROP statement
    Drop,
    /// ALTER statement
    Alter,
    /// BEGIN/COMMIT/ROLLBACK/SAVEPOINT/RELEASE commands
    Transaction,
    /// Other statement types
    Other,
}

impl StatementKind {
    /// Determines the statement kind from a SQL string
    pub fn from_sql(sql: &str) -> Self {
        let sql_upper = sql.trim().to_uppercase();
        let keyword = sql_upper
            .split(|c: char| c.is_whitespace() || c == ';' || c == '(')
            .next()
            .unwrap_or("");

        match keyword {
            "SELECT" | "WITH" | "VALUES" | "EXPLAIN" => StatementKind::Select,
            "PRAGMA" => StatementKind::Pragma,
            "INSERT" | "REPLACE" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "CREATE" => StatementKind::Create,
            "DROP" => StatementKind::Drop,
            "ALTER" => StatementKind::Alter,
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementKind::Transaction
            }
            _ => StatementKind::Other,
        }
    }

    /// Whether a statement of this kind, with this text, should run as a query.
    pub fn returns_rows(self, sql: &str) -> bool {
        match self {
            StatementKind::Select | StatementKind::Pragma => true,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                contains_keyword(sql, "RETURNING")
            }
            _ => false,
        }
    }
}

/// Whether `keyword` appears in `sql` as a bare word outside literals,
/// quoted identifiers and comments.
fn contains_keyword(sql: &str, keyword: &str) -> bool {
    let chars: Vec<char> = sql.chars().collect();
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if is_word(c) {
            let start = i;
            while i < chars.len() && is_word(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if word.eq_ignore_ascii_case(keyword) {
                return true;
            }
            continue;
        }
        match c {
            // A doubled quote just closes and reopens the literal.
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                i += 1;
                while i < chars.len() && chars[i] != close {
                    i += 1;
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    false
}
