//! Common test utilities for Stackweave integration tests
//!
//! [`TestProject`] lays out a throwaway project directory with a template,
//! shell-script components, a private state directory and a global config, and
//! runs the `stackweave` binary against it.

// Not every helper is used by every test file
#![allow(dead_code)]

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Test project with its own state directory and global config
pub struct TestProject {
    _temp_dir: TempDir, // Keep alive for RAII cleanup
    project_dir: PathBuf,
    state_dir: PathBuf,
    config_path: PathBuf,
}

impl TestProject {
    /// Create an empty project
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let project_dir = temp_dir.path().join("project");
        let state_dir = temp_dir.path().join("state");
        let config_path = temp_dir.path().join("config.toml");

        fs::create_dir_all(&project_dir)?;
        fs::write(
            &config_path,
            format!("state_dir = {:?}\n", state_dir.display().to_string()),
        )?;

        Ok(Self {
            _temp_dir: temp_dir,
            project_dir,
            state_dir,
            config_path,
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_dir
    }

    pub fn state_path(&self) -> &Path {
        &self.state_dir
    }

    /// Write `stackweave.yml`
    pub fn write_template(&self, content: &str) -> Result<()> {
        fs::write(self.project_dir.join("stackweave.yml"), content)?;
        Ok(())
    }

    /// Create `components/<name>` with the given `component.toml` operations.
    ///
    /// Each operation is a shell command run in the component directory.
    pub fn add_component(&self, name: &str, operations: &[(&str, &str)]) -> Result<PathBuf> {
        let dir = self.project_dir.join("components").join(name);
        fs::create_dir_all(&dir)?;

        let mut manifest = format!("name = {name:?}\n\n[operations]\n");
        for (operation, command) in operations {
            manifest.push_str(&format!("{operation} = {command:?}\n"));
        }
        fs::write(dir.join("component.toml"), manifest)?;
        Ok(dir)
    }

    /// Component that echoes its inputs back as outputs and logs removals to
    /// `<project>/removed.log`.
    pub fn add_echo_component(&self, name: &str) -> Result<PathBuf> {
        self.add_component(
            name,
            &[
                ("deploy", "cat"),
                ("remove", "echo \"$STACKWEAVE_ALIAS\" >> ../../removed.log"),
                ("ping", "printf '{\"pong\": \"%s\"}' \"$STACKWEAVE_ALIAS\""),
            ],
        )
    }

    /// Aliases removed so far, in removal order
    pub fn removed_log(&self) -> Vec<String> {
        fs::read_to_string(self.project_dir.join("removed.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Contents of the state file for `instance`, if any
    pub fn read_state(&self, instance: &str) -> Option<String> {
        fs::read_to_string(self.state_dir.join(format!("{instance}.toml"))).ok()
    }

    /// Run the stackweave binary in the project directory
    pub fn run_stackweave(&self, args: &[&str]) -> Result<CommandOutput> {
        let binary = env!("CARGO_BIN_EXE_stackweave");
        let output = Command::new(binary)
            .args(args)
            .arg("--no-progress")
            .current_dir(&self.project_dir)
            .env("STACKWEAVE_CONFIG", &self.config_path)
            .env_remove("STACKWEAVE_STATE_DIR")
            .env_remove("STACKWEAVE_COMPONENTS_DIR")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .output()
            .context("Failed to run stackweave command")?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Captured output of a CLI run
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Assert the command succeeded
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.success,
            "Command failed with code {:?}\nStderr: {}",
            self.code, self.stderr
        );
        self
    }

    /// Assert the command failed
    pub fn assert_failure(&self) -> &Self {
        assert!(!self.success, "Command unexpectedly succeeded\nStdout: {}", self.stdout);
        self
    }

    /// Assert stdout contains the given text
    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Expected stdout to contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    /// Assert stderr contains the given text
    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Expected stderr to contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
