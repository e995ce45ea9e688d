#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test harness for running CLI commands with temporary databases
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    /// Create a new test harness with a temporary database
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");

        Self { temp_dir, db_path }
    }

    /// Get a Command instance configured for testing
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("cadence").expect("Failed to find cadence binary");

        // Run inside the temp dir so a stray config.toml is never picked up
        cmd.current_dir(self.temp_dir.path());
        cmd.env("CADENCE_DATABASE_PATH", &self.db_path);
        cmd.env_remove("CADENCE_LOG");

        cmd
    }

    /// Write a config.toml into the working directory of every command
    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.temp_dir.path().join("config.toml"), contents)
            .expect("Failed to write config.toml");
    }

    /// Helper to run a command and assert success
    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    /// Helper to run a command and assert failure
    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Run a command that prints JSON and parse its stdout
    pub fn run_json(&self, args: &[&str]) -> Value {
        let output = self.run_success(args).get_output().stdout.clone();
        serde_json::from_slice(&output).expect("Command did not print valid JSON")
    }

    /// Create an event and return its ID
    pub fn create(&self, title: &str, start: &str, rule: &str) -> String {
        self.run_success(&["create", title, "--start", start, "--rule", rule]);
        let instances = self.run_json(&["instances", "--include-cancelled", "--json"]);
        instances
            .as_array()
            .and_then(|all| all.iter().rev().find(|i| i["title"] == title))
            .and_then(|i| i["template_id"].as_str())
            .expect("Created event has no occurrences")
            .to_string()
    }

    /// Stored occurrences of one event, in date order
    pub fn instances_of(&self, template_id: &str) -> Vec<Value> {
        let shown = self.run_json(&["show", template_id, "--json"]);
        shown["instances"].as_array().cloned().unwrap_or_default()
    }
}

/// Common test fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub fn daily_meeting_args() -> Vec<&'static str> {
        vec![
            "create",
            "Daily Meeting",
            "--start",
            "2023-01-01T09:00",
            "--end",
            "2023-01-01T09:30",
            "--rule",
            "FREQ=DAILY;COUNT=10",
            "--location",
            "Room 1",
        ]
    }
}

/// Utility functions for test assertions
pub mod assertions {
    use predicates::prelude::*;

    pub fn has_instance_table_headers() -> impl Predicate<str> {
        predicate::str::contains("Date")
            .and(predicate::str::contains("Time"))
            .and(predicate::str::contains("Status"))
    }

    pub fn created_successfully() -> impl Predicate<str> {
        predicate::str::contains("✓").and(predicate::str::contains("Created event"))
    }

    pub fn has_error() -> impl Predicate<str> {
        predicate::str::contains("Error").or(predicate::str::contains("error"))
    }
}
