//! Error types for polybuild
//!
//! Domain-specific error types using thiserror.
//!
//! Configuration errors (manifest, graph) abort a run before any service is
//! built. Stage errors never escape the step runner; they are folded into a
//! [`crate::core::result::BuildStepResult`] instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Manifest loading and validation errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file does not exist
    #[error("Manifest not found at '{path}'")]
    NotFound { path: PathBuf },

    /// Manifest file could not be read
    #[error("Failed to read manifest '{path}': {error}")]
    ReadError { path: PathBuf, error: String },

    /// Manifest is not valid TOML or does not match the schema
    #[error("Failed to parse manifest: {0}")]
    ParseError(String),

    /// Manifest parsed but contains an invalid value
    #[error("Invalid manifest: {message}")]
    Invalid { message: String },

    /// Artifact pattern is not a valid regular expression
    #[error("Service '{service}' has invalid artifact pattern '{pattern}': {error}")]
    InvalidPattern {
        service: String,
        pattern: String,
        error: String,
    },
}

/// Dependency graph construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The dependency declarations form a cycle
    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    /// A service depends on an identifier nobody registered
    #[error("Unknown dependency '{dependency}' required by '{service}'")]
    UnknownDependency { service: String, dependency: String },

    /// The same identifier was registered twice
    #[error("Service '{name}' is declared more than once")]
    DuplicateService { name: String },

    /// A selection named a service that is not registered
    #[error("Service '{name}' is not declared in the manifest")]
    UnknownService { name: String },
}

/// Cache coordinator errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory could not be created
    #[error("Failed to create cache directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },
}

/// Subprocess errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The program could not be started
    #[error("Failed to start '{program}': {error}")]
    Spawn { program: String, error: String },

    /// Waiting on the child or reading its output failed
    #[error("I/O error while running '{program}': {error}")]
    Io { program: String, error: String },
}

/// Failure of a single build stage
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// The tool ran and exited unsuccessfully
    #[error("'{command}' exited with {}", describe_status(*status))]
    ToolFailed {
        command: String,
        status: Option<i32>,
        tail: Vec<String>,
    },

    /// The tool failed in a way that looks like a flaky environment
    #[error("'{command}' hit a transient environment error (exit {})", describe_status(*status))]
    Transient {
        command: String,
        status: Option<i32>,
        tail: Vec<String>,
    },

    /// The stage exceeded its time budget
    #[error("stage timed out after {}s", timeout.as_secs())]
    TimedOut { timeout: Duration },

    /// The tool could not be launched at all
    #[error("{0}")]
    Launch(String),
}

impl StageError {
    /// Captured output excerpt, if the tool produced any
    pub fn tail(&self) -> &[String] {
        match self {
            StageError::ToolFailed { tail, .. } | StageError::Transient { tail, .. } => tail,
            StageError::TimedOut { .. } | StageError::Launch(_) => &[],
        }
    }

    /// Exit code reported by the tool
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StageError::ToolFailed { status, .. } | StageError::Transient { status, .. } => {
                *status
            }
            StageError::TimedOut { .. } | StageError::Launch(_) => None,
        }
    }
}

fn describe_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Artifact verification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    /// Output directory does not exist
    #[error("artifact directory '{dir}' does not exist")]
    DirectoryMissing { dir: PathBuf },

    /// No file matched the pattern
    #[error("no file in '{dir}' matches '{pattern}'")]
    NoMatch { dir: PathBuf, pattern: String },

    /// More than one file matched the pattern
    #[error("expected exactly one file matching '{pattern}', found {}", matches.len())]
    Ambiguous {
        pattern: String,
        matches: Vec<PathBuf>,
    },

    /// The matching file is empty
    #[error("artifact '{path}' is empty")]
    Empty { path: PathBuf },
}

/// Top-level polybuild error type
#[derive(Error, Debug)]
pub enum PolybuildError {
    /// Manifest error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Graph error
    #[error("Configuration error: {0}")]
    Graph(#[from] GraphError),

    /// Invalid run settings
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// IO error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

impl PolybuildError {
    /// Whether this error was raised before any service could run
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PolybuildError::Manifest(_) | PolybuildError::Graph(_) | PolybuildError::Config { .. }
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() {
            EXIT_CONFIG_ERROR
        } else {
            EXIT_BUILD_FAILED
        }
    }
}

/// Process exit code for a successful run
pub const EXIT_SUCCESS: i32 = 0;

/// Process exit code when at least one required service did not succeed
pub const EXIT_BUILD_FAILED: i32 = 1;

/// Process exit code when the manifest or dependency graph is invalid
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Map an error chain to the process exit code
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    let configuration = error.chain().any(|cause| {
        cause.is::<ManifestError>()
            || cause.is::<GraphError>()
            || cause
                .downcast_ref::<PolybuildError>()
                .is_some_and(|e| e.exit_code() == EXIT_CONFIG_ERROR)
    });

    if configuration {
        EXIT_CONFIG_ERROR
    } else {
        EXIT_BUILD_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_cycle_message_names_path() {
        let err = GraphError::CycleDetected {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_graph_errors_map_to_config_exit_code() {
        let err: anyhow::Error = Err::<(), _>(GraphError::UnknownDependency {
            service: "ui".into(),
            dependency: "auth".into(),
        })
        .context("Failed to build dependency graph")
        .unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_other_errors_map_to_build_failure() {
        let err = anyhow::Error::new(PolybuildError::Cache(CacheError::CreateDir {
            path: PathBuf::from("/nope"),
            error: "denied".into(),
        }));
        assert_eq!(exit_code_for(&err), EXIT_BUILD_FAILED);
    }

    #[test]
    fn test_stage_error_tail_and_status() {
        let err = StageError::ToolFailed {
            command: "go build".into(),
            status: Some(2),
            tail: vec!["main.go:3: undefined: x".into()],
        };
        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(err.tail().len(), 1);
        assert!(err.to_string().contains("status 2"));
    }
}
