//! Toolchain adapters
//!
//! The step runner talks to toolchains through [`StageExecutor`]. The
//! production implementation, [`CommandExecutor`], maps each
//! [`BuildKind`] and [`Stage`] to a fixed command sequence and runs it in
//! the service's working directory with the kind's cache directory wired in
//! through the environment or, for Maven, a command-line property.

use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::core::descriptor::{BuildKind, ServiceDescriptor};
use crate::core::result::Stage;
use crate::error::StageError;
use crate::infra::process::{self, CommandSpec};

/// Everything an executor needs to run one stage
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    /// Service being built
    pub service: &'a ServiceDescriptor,
    /// Stage to run (never [`Stage::Verify`])
    pub stage: Stage,
    /// Per-kind dependency cache directory
    pub cache_dir: &'a Path,
    /// Lines of output to keep
    pub tail_lines: usize,
}

/// Output of a successful stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    /// Trailing output lines
    pub tail: Vec<String>,
    /// Informational conditions (e.g. no tests found)
    pub notes: Vec<String>,
}

/// Runs tool-backed stages for a service
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Run one stage; errors are classified but never retried here
    async fn execute(&self, request: StageRequest<'_>) -> Result<StageOutput, StageError>;
}

/// Commands for `stage` of a service of `kind`, run in order
pub fn command_plan(kind: BuildKind, stage: Stage, service: &str) -> Vec<CommandSpec> {
    match (kind, stage) {
        (BuildKind::Maven, Stage::Setup) => vec![maven().args(["dependency:go-offline"])],
        (BuildKind::Maven, Stage::Compile) => {
            vec![maven().args(["-DskipTests", "package"])]
        }
        (BuildKind::Maven, Stage::Test) => vec![maven().args(["test"])],

        (BuildKind::Go, Stage::Setup) => vec![CommandSpec::new("go").args(["mod", "download"])],
        (BuildKind::Go, Stage::Compile) => vec![
            CommandSpec::new("go").args(["vet", "./..."]),
            CommandSpec::new("go")
                .args(["build", "-o"])
                .args([format!("bin/{service}"), ".".to_string()])
                .env("CGO_ENABLED", "0"),
        ],
        (BuildKind::Go, Stage::Test) => vec![CommandSpec::new("go").args(["test", "./..."])],

        (BuildKind::Node, Stage::Setup) => {
            vec![CommandSpec::new("npm").args(["ci", "--no-audit", "--no-fund"])]
        }
        (BuildKind::Node, Stage::Compile) => {
            vec![CommandSpec::new("npm").args(["run", "build", "--if-present"])]
        }
        (BuildKind::Node, Stage::Test) => vec![CommandSpec::new("npm")
            .args(["run", "test", "--if-present"])
            .env("CI", "true")],

        (_, Stage::Verify) => Vec::new(),
    }
}

fn maven() -> CommandSpec {
    CommandSpec::new("mvn").args(["-B", "--no-transfer-progress"])
}

/// Executable each build kind needs on `PATH`
pub fn program_for(kind: BuildKind) -> &'static str {
    match kind {
        BuildKind::Maven => "mvn",
        BuildKind::Go => "go",
        BuildKind::Node => "npm",
    }
}

/// Environment pointing a toolchain at its shared cache directory
///
/// Maven gets its repository through [`cache_args`] so an inherited
/// `MAVEN_OPTS` (heap size, proxies) stays untouched.
pub fn cache_env(kind: BuildKind, cache_dir: &Path) -> Vec<(String, String)> {
    let dir = cache_dir.display().to_string();
    match kind {
        BuildKind::Maven => Vec::new(),
        BuildKind::Go => vec![
            ("GOMODCACHE".to_string(), format!("{dir}/mod")),
            ("GOCACHE".to_string(), format!("{dir}/build")),
        ],
        BuildKind::Node => vec![("npm_config_cache".to_string(), dir)],
    }
}

/// Arguments pointing a toolchain at its shared cache directory
pub fn cache_args(kind: BuildKind, cache_dir: &Path) -> Vec<String> {
    match kind {
        BuildKind::Maven => vec![format!(
            "-Dmaven.repo.local={}",
            cache_dir.join("repository").display()
        )],
        BuildKind::Go | BuildKind::Node => Vec::new(),
    }
}

/// [`command_plan`] with the cache directory wired into every command
pub fn prepared_plan(
    service: &ServiceDescriptor,
    stage: Stage,
    cache_dir: &Path,
) -> Vec<CommandSpec> {
    let env = cache_env(service.kind, cache_dir);
    let args = cache_args(service.kind, cache_dir);
    command_plan(service.kind, stage, &service.name)
        .into_iter()
        .map(|command| {
            env.iter()
                .fold(command, |cmd, (k, v)| cmd.env(k.clone(), v.clone()))
                .args(args.iter().cloned())
        })
        .collect()
}

/// Whether tool output looks like a network or dependency-resolution hiccup
pub fn is_transient_failure(output: &[String]) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(could not transfer artifact|connection (reset|refused|timed out)|connect timed out|ETIMEDOUT|ECONNRESET|ECONNREFUSED|EAI_AGAIN|ENOTFOUND|i/o timeout|TLS handshake timeout|temporary failure in name resolution|network is unreachable|503 Service Unavailable|502 Bad Gateway)",
        )
        .ok()
    });
    let Some(pattern) = pattern else {
        return false;
    };
    output.iter().any(|line| pattern.is_match(line))
}

/// Informational notes derived from successful stage output
///
/// `tail_lines` is the capture limit; with nothing captured there is no
/// evidence either way.
fn detect_notes(
    kind: BuildKind,
    stage: Stage,
    output: &[String],
    tail_lines: usize,
) -> Vec<String> {
    if stage != Stage::Test || tail_lines == 0 {
        return Vec::new();
    }
    let no_tests = match kind {
        BuildKind::Go => {
            !output.is_empty()
                && output
                    .iter()
                    .filter(|l| !l.trim().is_empty())
                    .all(|l| l.contains("[no test files]"))
        }
        BuildKind::Maven => output.iter().any(|l| l.contains("No tests to run")),
        BuildKind::Node => output.iter().all(|l| l.trim().is_empty()),
    };
    if no_tests {
        vec!["no tests found".to_string()]
    } else {
        Vec::new()
    }
}

/// Executor spawning the real toolchains
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandExecutor;

impl CommandExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageExecutor for CommandExecutor {
    async fn execute(&self, request: StageRequest<'_>) -> Result<StageOutput, StageError> {
        let service = request.service;
        let mut tail = Vec::new();

        for command in prepared_plan(service, request.stage, request.cache_dir) {
            let output = process::run_captured(&command, &service.workdir, request.tail_lines)
                .await
                .map_err(|e| StageError::Launch(e.to_string()))?;

            if !output.success {
                let transient =
                    request.stage == Stage::Setup && is_transient_failure(&output.tail);
                let command = command.to_string();
                return Err(if transient {
                    StageError::Transient {
                        command,
                        status: output.status,
                        tail: output.tail,
                    }
                } else {
                    StageError::ToolFailed {
                        command,
                        status: output.status,
                        tail: output.tail,
                    }
                });
            }
            tail = output.tail;
        }

        Ok(StageOutput {
            notes: detect_notes(service.kind, request.stage, &tail, request.tail_lines),
            tail,
        })
    }
}
