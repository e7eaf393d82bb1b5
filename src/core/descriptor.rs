//! Service descriptors
//!
//! A [`ServiceDescriptor`] is the static description of one buildable
//! service: what toolchain builds it, where it lives, what it depends on and
//! what artifact a successful build must leave behind. Descriptors are
//! immutable once loaded.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ArtifactError;

/// Toolchain family used to build a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    /// Java services built with Maven
    Maven,
    /// Go modules
    Go,
    /// Node.js packages built with npm
    Node,
}

impl BuildKind {
    /// All supported build kinds
    pub const ALL: [BuildKind; 3] = [BuildKind::Maven, BuildKind::Go, BuildKind::Node];

    /// Stable lowercase name, also used as the cache directory name
    pub fn as_str(self) -> &'static str {
        match self {
            BuildKind::Maven => "maven",
            BuildKind::Go => "go",
            BuildKind::Node => "node",
        }
    }

    /// Artifact rule used when a service does not declare one
    pub fn default_artifact(self, service: &str) -> ArtifactRule {
        let (dir, pattern) = match self {
            BuildKind::Maven => ("target".to_string(), r"^[^.].*\.jar$".to_string()),
            BuildKind::Go => ("bin".to_string(), format!("^{}$", regex::escape(service))),
            BuildKind::Node => ("dist".to_string(), r"^index\.html$".to_string()),
        };
        // The patterns above are fixed or fully escaped
        ArtifactRule::new(dir, &pattern).unwrap_or_else(|_| ArtifactRule::any_file("."))
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a failing test stage affects the service outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPolicy {
    /// Test failure fails the service
    #[default]
    Required,
    /// Test failure is recorded as a note and the build continues
    Advisory,
}

/// Expected build output of a service
///
/// Verification passes when exactly one regular file directly inside
/// `dir` (relative to the service working directory) has a file name
/// matching `pattern`, and that file is non-empty.
#[derive(Debug, Clone)]
pub struct ArtifactRule {
    dir: PathBuf,
    pattern: Regex,
}

impl ArtifactRule {
    /// Create a rule from an output directory and a file name regex
    pub fn new(dir: impl Into<PathBuf>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            dir: dir.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Rule accepting any single file in `dir`
    pub fn any_file(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pattern: Regex::new(".+").expect("static pattern is valid"),
        }
    }

    /// Output directory relative to the working directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name pattern
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Locate the artifact produced under `workdir`
    pub fn locate(&self, workdir: &Path) -> Result<PathBuf, ArtifactError> {
        let dir = workdir.join(&self.dir);
        if !dir.is_dir() {
            return Err(ArtifactError::DirectoryMissing { dir });
        }

        let mut matches: Vec<PathBuf> = walkdir::WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|name| self.pattern.is_match(name))
            })
            .map(walkdir::DirEntry::into_path)
            .collect();
        matches.sort();

        match matches.len() {
            0 => Err(ArtifactError::NoMatch {
                dir,
                pattern: self.pattern().to_string(),
            }),
            1 => {
                let path = matches.remove(0);
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                if size == 0 {
                    Err(ArtifactError::Empty { path })
                } else {
                    Ok(path)
                }
            }
            _ => Err(ArtifactError::Ambiguous {
                pattern: self.pattern().to_string(),
                matches,
            }),
        }
    }
}

impl PartialEq for ArtifactRule {
    fn eq(&self, other: &Self) -> bool {
        self.dir == other.dir && self.pattern.as_str() == other.pattern.as_str()
    }
}

/// Static description of one service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    /// Unique identifier
    pub name: String,
    /// Toolchain family
    pub kind: BuildKind,
    /// Working directory the tools run in
    pub workdir: PathBuf,
    /// Identifiers of services that must succeed first, in declaration order
    pub dependencies: Vec<String>,
    /// Expected build output
    pub artifact: ArtifactRule,
    /// Whether test failures fail the service
    pub tests: TestPolicy,
    /// Whether the overall run outcome depends on this service
    pub required: bool,
    /// Per-stage timeout override
    pub stage_timeout: Option<Duration>,
}

impl ServiceDescriptor {
    /// Create a descriptor with no dependencies and the kind's default artifact rule
    pub fn new(name: impl Into<String>, kind: BuildKind, workdir: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            artifact: kind.default_artifact(&name),
            name,
            kind,
            workdir: workdir.into(),
            dependencies: Vec::new(),
            tests: TestPolicy::Required,
            required: true,
            stage_timeout: None,
        }
    }

    /// Set the dependency list
    #[must_use]
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the artifact rule
    #[must_use]
    pub fn with_artifact(mut self, artifact: ArtifactRule) -> Self {
        self.artifact = artifact;
        self
    }

    /// Set the test policy
    #[must_use]
    pub fn with_tests(mut self, tests: TestPolicy) -> Self {
        self.tests = tests;
        self
    }

    /// Mark the service as optional for the overall outcome
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Override the per-stage timeout
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }
}
