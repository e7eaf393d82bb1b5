//! Toolchain discovery
//!
//! Locates build tools on `PATH` and probes their versions.

use std::path::PathBuf;

/// Location and version of one build tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    /// Program name looked up on `PATH`
    pub program: String,
    /// Resolved executable, if found
    pub path: Option<PathBuf>,
    /// First line of the tool's version output
    pub version: Option<String>,
}

impl ToolStatus {
    /// Whether the tool was found
    pub fn found(&self) -> bool {
        self.path.is_some()
    }
}

/// Look up `program` on `PATH`
pub fn find_program(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Run `program <version_arg>` and keep the first non-empty output line
pub fn probe_version(program: &str, version_arg: &str) -> Option<String> {
    let output = std::process::Command::new(program)
        .arg(version_arg)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(String::from)
}

/// Locate `program` and, if present, probe its version
pub fn inspect(program: &str, version_arg: &str) -> ToolStatus {
    let path = find_program(program);
    let version = path
        .as_ref()
        .and_then(|_| probe_version(program, version_arg));
    ToolStatus {
        program: program.to_string(),
        path,
        version,
    }
}
