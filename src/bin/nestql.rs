use clap::Parser;
use nestql::config::default_config_path;
use nestql::{
    load_config, Config, Database, DatabaseConfig, ExecutionContext, IsolationLevel, NestqlError,
    StatementKind,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Runs SQL statements against a SQLite database inside a single transaction.
///
/// Row-returning statements print one JSON object per row; other statements
/// print the number of affected rows. If any statement fails, nothing is
/// committed.
#[derive(Debug, Parser)]
#[command(name = "nestql", version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "NESTQL_CONFIG")]
    config: Option<PathBuf>,

    /// Database connection string (overrides the configuration file)
    #[arg(short, long)]
    database: Option<String>,

    /// Transaction isolation level: deferred, immediate or exclusive
    #[arg(short, long)]
    isolation: Option<IsolationLevel>,

    /// Parameter bound to every statement, as NAME=VALUE
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// SQL statements to run, in order
    #[arg(required = true)]
    sql: Vec<String>,
}

fn parse_param(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", arg)),
    }
}

fn load_configuration(cli: &Cli) -> nestql::Result<Option<Config>> {
    match &cli.config {
        Some(path) => load_config(path).map(Some),
        None => match default_config_path() {
            Some(path) if path.exists() => load_config(path).map(Some),
            _ => Ok(None),
        },
    }
}

fn init_logging(config: Option<&Config>) {
    let level = config
        .and_then(|c| c.logging.as_ref())
        .and_then(|l| l.level.clone())
        .unwrap_or_else(|| "warn".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_database(cli: &Cli, config: Option<Config>) -> nestql::Result<DatabaseConfig> {
    match (config, &cli.database) {
        (Some(config), Some(connection_string)) => Ok(DatabaseConfig {
            connection_string: connection_string.clone(),
            ..config.database
        }),
        (Some(config), None) => Ok(config.database),
        (None, Some(connection_string)) => Ok(DatabaseConfig::new(connection_string)),
        (None, None) => Err(NestqlError::Config(
            "no database given; pass --database or set database.connection_string".to_string(),
        )),
    }
}

fn run(cli: &Cli, config: Option<Config>) -> nestql::Result<()> {
    if let Some(sql) = cli
        .sql
        .iter()
        .find(|sql| StatementKind::from_sql(sql) == StatementKind::Transaction)
    {
        return Err(NestqlError::Unsupported(format!(
            "'{}': statements already run in one transaction",
            sql
        )));
    }

    let db = Database::from_config(&resolve_database(cli, config)?);
    let level = cli.isolation.unwrap_or(db.default_isolation());
    debug!("Running {} statement(s) with {} isolation", cli.sql.len(), level);

    let stdout = std::io::stdout();
    db.transaction_do_with(level, |tx| {
        let mut out = stdout.lock();
        for sql in &cli.sql {
            if StatementKind::from_sql(sql).returns_rows(sql) {
                let query = cli
                    .params
                    .iter()
                    .fold(tx.query(sql), |q, (name, value)| q.with_parameter(name, value));
                for record in query.to_array()? {
                    writeln!(out, "{}", serde_json::to_string(&record)?)?;
                }
            } else {
                let command = cli
                    .params
                    .iter()
                    .fold(tx.non_query(sql), |c, (name, value)| c.with_parameter(name, value));
                let affected = command.execute()?;
                writeln!(out, "{} row(s) affected", affected)?;
            }
        }
        Ok(())
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize the logging system using tracing subscriber
    init_logging(config.as_ref());
    info!("Starting nestql...");

    match run(&cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
