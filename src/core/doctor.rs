//! Doctor command logic
//!
//! Reports which build toolchains are on `PATH`. A toolchain is required when
//! the manifest declares at least one service of its kind.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::core::adapter::program_for;
use crate::core::descriptor::BuildKind;
use crate::core::graph::BuildGraph;
use crate::core::manifest::Manifest;
use crate::infra::toolchain::{self, ToolStatus};

/// Result of a single toolchain check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Human-readable check name
    pub name: String,
    /// Build kind the tool serves
    pub kind: BuildKind,
    /// Whether the check passed
    pub passed: bool,
    /// Version if available
    pub version: Option<String>,
    /// Error message if the check failed
    pub error: Option<String>,
    /// Suggestion for fixing the issue
    pub suggestion: Option<String>,
    /// Whether the manifest needs this tool
    pub required: bool,
}

impl CheckResult {
    fn from_status(kind: BuildKind, status: &ToolStatus, required: bool) -> Self {
        let name = format!("{} ({kind})", status.program);
        if status.found() {
            Self {
                name,
                kind,
                passed: true,
                version: status.version.as_deref().and_then(extract_version),
                error: None,
                suggestion: None,
                required,
            }
        } else {
            Self {
                name,
                kind,
                passed: false,
                version: None,
                error: Some(format!("{} not found in PATH", status.program)),
                suggestion: Some(install_hint(kind).to_string()),
                required,
            }
        }
    }
}

/// Overall doctor report
#[derive(Debug, Default, Serialize)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Manifest or graph problems found
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    /// Check if all required checks passed
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    /// Check if everything passed, optional tools included
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    /// Count passed checks
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Failed checks for tools the manifest needs
    pub fn failed_required(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .collect()
    }
}

fn version_arg(kind: BuildKind) -> &'static str {
    match kind {
        BuildKind::Go => "version",
        BuildKind::Maven | BuildKind::Node => "--version",
    }
}

fn install_hint(kind: BuildKind) -> &'static str {
    match kind {
        BuildKind::Maven => "Install Apache Maven from https://maven.apache.org/download.cgi",
        BuildKind::Go => "Install Go from https://go.dev/dl/",
        BuildKind::Node => "Install Node.js (bundles npm) from https://nodejs.org/",
    }
}

/// Pull a dotted version number out of a tool's version banner
fn extract_version(output: &str) -> Option<String> {
    let version_regex = Regex::new(r"v?(\d+\.\d+(?:\.\d+)?(?:-\w+)?)").ok()?;
    version_regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Build kinds declared in the manifest
fn kinds_in_use(manifest: &Manifest) -> BTreeSet<BuildKind> {
    manifest.services.iter().map(|s| s.kind).collect()
}

/// Check the toolchains, probing with `inspect`
///
/// Without a manifest every toolchain is reported as optional.
pub fn run_doctor_with<F>(manifest: Option<&Manifest>, inspect: F) -> DoctorReport
where
    F: Fn(&str, &str) -> ToolStatus,
{
    let in_use = manifest.map(kinds_in_use).unwrap_or_default();
    let checks = BuildKind::ALL
        .into_iter()
        .map(|kind| {
            let status = inspect(program_for(kind), version_arg(kind));
            CheckResult::from_status(kind, &status, in_use.contains(&kind))
        })
        .collect();

    DoctorReport {
        checks,
        config_issues: Vec::new(),
    }
}

/// Check the toolchains on `PATH` and, if given, the manifest's graph
pub fn run_doctor(manifest: Option<(&Manifest, &std::path::Path)>) -> DoctorReport {
    let mut report = run_doctor_with(manifest.map(|(m, _)| m), toolchain::inspect);

    if let Some((manifest, base_dir)) = manifest {
        let graph = manifest
            .descriptors(base_dir)
            .map_err(|e| e.to_string())
            .and_then(|descriptors| BuildGraph::build(descriptors).map_err(|e| e.to_string()));
        if let Err(issue) = graph {
            report.config_issues.push(issue);
        }
        for entry in &manifest.services {
            let dir = base_dir.join(&entry.path);
            if !dir.is_dir() {
                report
                    .config_issues
                    .push(format!("service '{}': directory {} does not exist", entry.name, dir.display()));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fake<'a>(found: &'a [&'a str]) -> impl Fn(&str, &str) -> ToolStatus + 'a {
        move |program, _| ToolStatus {
            program: program.to_string(),
            path: found
                .contains(&program)
                .then(|| PathBuf::from(format!("/usr/bin/{program}"))),
            version: found
                .contains(&program)
                .then(|| format!("{program} version go1.22.1 linux/amd64")),
        }
    }

    #[test]
    fn test_tools_optional_without_manifest() {
        let report = run_doctor_with(None, fake(&[]));
        assert_eq!(report.checks.len(), 3);
        assert!(report.all_required_passed());
        assert!(!report.all_passed());
    }

    #[test]
    fn test_kinds_in_manifest_are_required() {
        let manifest = Manifest::from_toml(
            r#"
[[service]]
name = "cart"
kind = "go"
path = "cart"
"#,
        )
        .unwrap();
        let report = run_doctor_with(Some(&manifest), fake(&["npm"]));
        let failed: Vec<_> = report.failed_required().iter().map(|c| c.kind).collect();
        assert_eq!(failed, vec![BuildKind::Go]);
        assert_eq!(report.passed_count(), 1);
    }

    #[test]
    fn test_version_extracted_from_banner() {
        let report = run_doctor_with(None, fake(&["go"]));
        let go = report.checks.iter().find(|c| c.kind == BuildKind::Go).unwrap();
        assert_eq!(go.version.as_deref(), Some("1.22.1"));
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("Apache Maven 3.9.6 (bc0240f)"), Some("3.9.6".into()));
        assert_eq!(extract_version("10.2.4"), Some("10.2.4".into()));
        assert_eq!(extract_version("no digits"), None);
    }
}
