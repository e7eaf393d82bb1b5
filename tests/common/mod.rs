//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write `polybuild.toml`
    pub fn write_manifest(&self, content: &str) {
        self.create_file("polybuild.toml", content);
    }

    /// Run the polybuild binary in the project directory with an isolated cache
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_polybuild"))
            .current_dir(self.path())
            .env("POLYBUILD_CACHE_DIR", self.path().join(".cache"))
            .env_remove("POLYBUILD_MANIFEST")
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("Failed to execute polybuild")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Storefront manifest: UI depends on the three backend services
pub const STOREFRONT_MANIFEST: &str = r#"
[build]
jobs = 2

[[service]]
name = "catalog"
kind = "maven"
path = "catalog"

[[service]]
name = "cart"
kind = "go"
path = "cart"

[[service]]
name = "orders"
kind = "maven"
path = "orders"

[[service]]
name = "ui"
kind = "node"
path = "ui"
depends_on = ["catalog", "cart", "orders"]
"#;

/// Manifest with a two-service cycle
pub const CYCLIC_MANIFEST: &str = r#"
[[service]]
name = "a"
kind = "go"
path = "a"
depends_on = ["b"]

[[service]]
name = "b"
kind = "go"
path = "b"
depends_on = ["a"]
"#;

/// Manifest referencing a service that does not exist
pub const UNKNOWN_DEPENDENCY_MANIFEST: &str = r#"
[[service]]
name = "ui"
kind = "node"
path = "ui"
depends_on = ["auth"]
"#;
