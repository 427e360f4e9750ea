//! Integration tests for the taskboard CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a taskboard Command isolated from the caller's environment
fn taskboard(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("taskboard");
    cmd.current_dir(dir.path())
        .env_remove("GEMINI_API_KEY")
        .env_remove("TASKBOARD_PORT")
        .env_remove("TASKBOARD_HOST")
        .env_remove("TASKBOARD_DB_PATH")
        .env_remove("TASKBOARD_LOG");
    cmd
}

fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = temp_dir();
        taskboard(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("init"))
            .stdout(predicate::str::contains("config"));
    }

    #[test]
    fn test_version() {
        let dir = temp_dir();
        taskboard(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_unknown_command_fails() {
        let dir = temp_dir();
        taskboard(&dir).arg("frobnicate").assert().failure();
    }

    #[test]
    fn test_serve_rejects_bad_port() {
        let dir = temp_dir();
        taskboard(&dir)
            .args(["serve", "--port", "not-a-port"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Database Initialization
// =============================================================================

mod database {
    use super::*;

    #[test]
    fn test_init_creates_default_database() {
        let dir = temp_dir();
        taskboard(&dir)
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("database initialized"));

        assert!(dir.path().join(".taskboard/taskboard.db").exists());
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = temp_dir();
        taskboard(&dir).arg("init").assert().success();
        taskboard(&dir).arg("init").assert().success();
    }

    #[test]
    fn test_init_with_db_path() {
        let dir = temp_dir();
        taskboard(&dir)
            .args(["init", "--db-path", "data/board.db"])
            .assert()
            .success();
        assert!(dir.path().join("data/board.db").exists());
    }

    #[test]
    fn test_init_db_path_from_env() {
        let dir = temp_dir();
        taskboard(&dir)
            .env("TASKBOARD_DB_PATH", "env.db")
            .arg("init")
            .assert()
            .success();
        assert!(dir.path().join("env.db").exists());
    }

    #[test]
    fn test_init_db_path_from_config() {
        let dir = temp_dir();
        fs::write(
            dir.path().join("taskboard.toml"),
            "[database]\npath = \"from-config.db\"\n",
        )
        .unwrap();
        taskboard(&dir).arg("init").assert().success();
        assert!(dir.path().join("from-config.db").exists());
    }

    #[test]
    fn test_db_path_conflicts_with_user_data() {
        let dir = temp_dir();
        taskboard(&dir)
            .args(["init", "--db-path", "x.db", "--user-data"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = temp_dir();
        taskboard(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("using defaults"))
            .stdout(predicate::str::contains("port = 3141"));
    }

    #[test]
    fn test_config_show_masks_api_key() {
        let dir = temp_dir();
        taskboard(&dir)
            .env("GEMINI_API_KEY", "super-secret")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("super-secret").not())
            .stdout(predicate::str::contains("********"));
    }

    #[test]
    fn test_config_init_creates_toml() {
        let dir = temp_dir();
        taskboard(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created taskboard.toml"));

        let content = fs::read_to_string(dir.path().join("taskboard.toml")).unwrap();
        assert!(content.contains("[server]"));
        assert!(content.contains("[recommender]"));

        taskboard(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_init_at_explicit_path() {
        let dir = temp_dir();
        taskboard(&dir)
            .args(["--config", "conf/board.toml", "config", "init"])
            .assert()
            .success();
        assert!(dir.path().join("conf/board.toml").exists());
    }

    #[test]
    fn test_config_validate_warns_about_missing_key() {
        let dir = temp_dir();
        taskboard(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_config_validate_clean_config() {
        let dir = temp_dir();
        taskboard(&dir)
            .env("GEMINI_API_KEY", "k")
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_validate_reports_bad_values() {
        let dir = temp_dir();
        fs::write(
            dir.path().join("taskboard.toml"),
            "[streak]\nutc_offset_minutes = 5000\n\n[recommender]\nrate_limit_requests = 0\n",
        )
        .unwrap();
        taskboard(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("utc_offset_minutes"))
            .stdout(predicate::str::contains("rate_limit_requests"));
    }

    #[test]
    fn test_invalid_toml_fails() {
        let dir = temp_dir();
        fs::write(dir.path().join("taskboard.toml"), "[server\nport = ").unwrap();
        taskboard(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("parse"));
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = temp_dir();
        taskboard(&dir)
            .args(["--config", "nope.toml", "init"])
            .assert()
            .failure();
    }

    #[test]
    fn test_bad_port_env_fails() {
        let dir = temp_dir();
        taskboard(&dir)
            .env("TASKBOARD_PORT", "eighty")
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("TASKBOARD_PORT"));
    }
}
