//! CLI integration tests for sqlbridge.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that need no live database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the sqlbridge binary.
fn cmd() -> Command {
    Command::cargo_bin("sqlbridge").unwrap()
}

/// Command preloaded with an unreachable PostgreSQL connection.
fn cmd_with_pg() -> Command {
    let mut c = cmd();
    c.args([
        "--engine",
        "postgres",
        "--connection-string",
        "host=127.0.0.1 port=1 user=test dbname=test connect_timeout=2",
    ]);
    c
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("schema"))
        .stdout(predicate::str::contains("databases"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_import_subcommand_help() {
    cmd()
        .args(["import", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--chunk-size"))
        .stdout(predicate::str::contains("--rollback-on-error"))
        .stdout(predicate::str::contains("--rows-to-skip"))
        .stdout(predicate::str::contains("--no-header"));
}

#[test]
fn test_export_subcommand_help() {
    cmd()
        .args(["export", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--sql"))
        .stdout(predicate::str::contains("--newline"))
        .stdout(predicate::str::contains("--null-output"))
        .stdout(predicate::str::contains("--quotes"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlbridge"));
}

// =============================================================================
// Global Flag Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--engine"))
        .stdout(predicate::str::contains("--connection-string"))
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Configuration Error Tests
// =============================================================================

#[test]
fn test_missing_config_file_exits_with_code_1() {
    cmd()
        .args(["-c", "/nonexistent/config.yaml", "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "connection: [unclosed").unwrap();

    cmd()
        .args(["-c", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_required_fields_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "connection:").unwrap();
    writeln!(file, "  engine: postgres").unwrap();
    writeln!(file, "  host: localhost").unwrap();

    cmd()
        .args(["-c", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("database"));
}

#[test]
fn test_no_connection_info_exits_with_code_2() {
    cmd()
        .arg("health-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--connection-string"));
}

#[test]
fn test_unknown_engine_exits_with_code_2() {
    cmd()
        .args(["--engine", "oracle", "--connection-string", "x", "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("oracle"));
}

// =============================================================================
// Import Argument Tests
// =============================================================================

#[test]
fn test_import_zero_chunk_size_rejected_before_connecting() {
    cmd_with_pg()
        .args([
            "import",
            "--table",
            "people",
            "--file",
            "/nonexistent/people.csv",
            "--chunk-size",
            "0",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("chunk"));
}

#[test]
fn test_import_oversized_chunk_rejected() {
    cmd_with_pg()
        .args([
            "import",
            "--table",
            "people",
            "--file",
            "-",
            "--chunk-size",
            "10001",
        ])
        .assert()
        .code(2);
}

#[test]
fn test_unsupported_separator_rejected_by_parser() {
    cmd_with_pg()
        .args([
            "import",
            "--table",
            "people",
            "--file",
            "-",
            "--separator",
            "|",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported separator"));
}

#[test]
fn test_import_requires_table() {
    cmd_with_pg()
        .args(["import", "--file", "-"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--table"));
}

// =============================================================================
// Connection Tests
// =============================================================================

#[test]
fn test_unreachable_server_exits_with_code_3() {
    cmd_with_pg()
        .arg("health-check")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn test_unreachable_server_json_report() {
    cmd_with_pg()
        .args(["--output-json", "health-check"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("\"connected\": false"));
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_no_subcommand_shows_usage() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "/nonexistent.yaml", "schema"])
        .assert()
        .code(1);
}
