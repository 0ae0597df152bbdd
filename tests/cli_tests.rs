use assert_cmd::Command;
use std::io::Write;
use tempfile::TempDir;

fn nestql(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nestql").unwrap();
    cmd.env_remove("NESTQL_CONFIG")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", dir.path())
        .env("HOME", dir.path());
    cmd
}

fn database_arg(dir: &TempDir) -> String {
    dir.path().join("cli.db").to_str().unwrap().to_string()
}

#[test]
fn test_runs_statements_in_order() {
    let dir = TempDir::new().unwrap();

    nestql(&dir)
        .args(["--database", database_arg(&dir).as_str()])
        .arg("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
        .arg("INSERT INTO t (id, name) VALUES (1, 'Ricardo')")
        .arg("SELECT id, name FROM t")
        .assert()
        .success()
        .stdout("0 row(s) affected\n1 row(s) affected\n{\"id\":1,\"name\":\"Ricardo\"}\n");
}

#[test]
fn test_parameters_apply_to_every_statement() {
    let dir = TempDir::new().unwrap();
    let db = database_arg(&dir);

    nestql(&dir)
        .args(["-d", db.as_str(), "CREATE TABLE t (name TEXT)"])
        .assert()
        .success();
    nestql(&dir)
        .args(["-d", db.as_str(), "-p", "@name=Diego"])
        .arg("INSERT INTO t (name) VALUES (@name)")
        .arg("SELECT count(*) AS n FROM t WHERE name = :name")
        .assert()
        .success()
        .stdout("1 row(s) affected\n{\"n\":1}\n");
}

#[test]
fn test_failing_statement_rolls_back_the_batch() {
    let dir = TempDir::new().unwrap();
    let db = database_arg(&dir);

    nestql(&dir)
        .args(["-d", db.as_str(), "CREATE TABLE t (id INTEGER PRIMARY KEY)"])
        .assert()
        .success();
    nestql(&dir)
        .args(["-d", db.as_str(), "-i", "immediate"])
        .arg("INSERT INTO t (id) VALUES (1)")
        .arg("INSERT INTO t (id) VALUES (1)")
        .assert()
        .failure();
    nestql(&dir)
        .args(["-d", db.as_str(), "SELECT count(*) AS n FROM t"])
        .assert()
        .success()
        .stdout("{\"n\":0}\n");
}

#[test]
fn test_transaction_statements_are_rejected() {
    let dir = TempDir::new().unwrap();

    nestql(&dir)
        .args(["-d", database_arg(&dir).as_str(), "BEGIN", "SELECT 1"])
        .assert()
        .failure()
        .stdout("");
}

#[test]
fn test_connection_string_from_config_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("nestql.toml");
    let mut config = std::fs::File::create(&config_path).unwrap();
    writeln!(
        config,
        "[database]\nconnection_string = {:?}\nisolation_level = \"exclusive\"",
        database_arg(&dir)
    )
    .unwrap();

    nestql(&dir)
        .arg("--config")
        .arg(&config_path)
        .arg("SELECT 41 + 1 AS answer")
        .assert()
        .success()
        .stdout("{\"answer\":42}\n");
}

#[test]
fn test_missing_database_fails() {
    let dir = TempDir::new().unwrap();

    nestql(&dir).arg("SELECT 1").assert().failure();
}

#[test]
fn test_returning_in_a_literal_prints_affected_rows() {
    let dir = TempDir::new().unwrap();

    nestql(&dir)
        .args(["-d", database_arg(&dir).as_str()])
        .arg("CREATE TABLE t (id INTEGER PRIMARY KEY, note TEXT)")
        .arg("INSERT INTO t (id, note) VALUES (1, 'x')")
        .arg("UPDATE t SET note = 'returning'")
        .arg("UPDATE t SET note = 'y' RETURNING id")
        .assert()
        .success()
        .stdout("0 row(s) affected\n1 row(s) affected\n1 row(s) affected\n{\"id\":1}\n");
}
