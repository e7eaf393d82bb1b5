//! Manifest (polybuild.toml) parsing and validation
//!
//! The manifest declares run settings and the service table.
//! Supports environment variable substitution using ${VAR} syntax.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::defaults;
use crate::core::descriptor::{ArtifactRule, BuildKind, ServiceDescriptor, TestPolicy};
use crate::error::ManifestError;

/// The orchestrator manifest (polybuild.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Run settings
    #[serde(default)]
    pub build: BuildSettings,

    /// Service table
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceEntry>,
}

/// Run-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildSettings {
    /// Maximum number of services built at once (defaults to CPU count)
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Stop admitting new services after the first failure
    #[serde(default)]
    pub fail_fast: bool,

    /// Time budget for each stage
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Attempts for stages failing with transient environment errors
    #[serde(default = "default_transient_attempts")]
    pub transient_attempts: u32,

    /// Lines of tool output kept in error reports
    #[serde(default = "default_tail_lines")]
    pub output_tail_lines: usize,

    /// Cache namespace under the cache root
    #[serde(default = "default_cache_namespace")]
    pub cache_namespace: String,

    /// Explicit cache root (overrides the platform cache directory)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_stage_timeout() -> u64 {
    defaults::STAGE_TIMEOUT_SECS
}

fn default_transient_attempts() -> u32 {
    defaults::TRANSIENT_ATTEMPTS
}

fn default_tail_lines() -> usize {
    defaults::OUTPUT_TAIL_LINES
}

fn default_cache_namespace() -> String {
    defaults::CACHE_NAMESPACE.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            jobs: None,
            fail_fast: false,
            stage_timeout_secs: default_stage_timeout(),
            transient_attempts: default_transient_attempts(),
            output_tail_lines: default_tail_lines(),
            cache_namespace: default_cache_namespace(),
            cache_dir: None,
        }
    }
}

/// One `[[service]]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceEntry {
    /// Unique service identifier
    pub name: String,

    /// Build kind (maven, go, node)
    pub kind: BuildKind,

    /// Working directory, relative to the manifest
    pub path: PathBuf,

    /// Services that must build first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Test failure policy
    #[serde(default)]
    pub tests: TestPolicy,

    /// Whether the run outcome depends on this service
    #[serde(default = "default_true")]
    pub required: bool,

    /// Per-stage timeout override
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Expected artifact (defaults depend on the build kind)
    #[serde(default)]
    pub artifact: Option<ArtifactEntry>,
}

/// `[service.artifact]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactEntry {
    /// Output directory relative to the service path
    pub dir: PathBuf,
    /// Regular expression matched against file names in `dir`
    pub pattern: String,
}

impl Manifest {
    /// Parse a manifest from TOML, substituting ${VAR} references first
    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        let substituted = substitute_env_vars_in_toml(content).map_err(ManifestError::ParseError)?;
        let manifest: Manifest =
            toml::from_str(&substituted).map_err(|e| ManifestError::ParseError(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest from disk
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::ReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Check values serde cannot check
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.build.jobs == Some(0) {
            return Err(ManifestError::Invalid {
                message: "build.jobs must be at least 1".to_string(),
            });
        }
        if self.build.transient_attempts == 0 {
            return Err(ManifestError::Invalid {
                message: "build.transient_attempts must be at least 1".to_string(),
            });
        }
        if self.build.output_tail_lines == 0 {
            return Err(ManifestError::Invalid {
                message: "build.output_tail_lines must be at least 1".to_string(),
            });
        }
        if self.build.stage_timeout_secs == 0 {
            return Err(ManifestError::Invalid {
                message: "build.stage_timeout_secs must be positive".to_string(),
            });
        }
        let namespace = &self.build.cache_namespace;
        if namespace.is_empty()
            || namespace == "."
            || namespace == ".."
            || namespace.contains(['/', '\\'])
        {
            return Err(ManifestError::Invalid {
                message: format!("build.cache_namespace '{namespace}' must be a plain directory name"),
            });
        }
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ManifestError::Invalid {
                    message: "service name cannot be empty".to_string(),
                });
            }
            if service.timeout_secs == Some(0) {
                return Err(ManifestError::Invalid {
                    message: format!("service '{}' has a zero timeout", service.name),
                });
            }
        }
        Ok(())
    }

    /// Build descriptors with working directories resolved against `base_dir`
    pub fn descriptors(&self, base_dir: &Path) -> Result<Vec<ServiceDescriptor>, ManifestError> {
        self.services
            .iter()
            .map(|entry| entry.to_descriptor(base_dir))
            .collect()
    }
}

impl ServiceEntry {
    fn to_descriptor(&self, base_dir: &Path) -> Result<ServiceDescriptor, ManifestError> {
        let workdir = if self.path.is_absolute() {
            self.path.clone()
        } else {
            base_dir.join(&self.path)
        };

        let mut descriptor = ServiceDescriptor::new(&self.name, self.kind, workdir)
            .depends_on(self.depends_on.iter().cloned())
            .with_tests(self.tests);

        if let Some(artifact) = &self.artifact {
            let rule = ArtifactRule::new(&artifact.dir, &artifact.pattern).map_err(|e| {
                ManifestError::InvalidPattern {
                    service: self.name.clone(),
                    pattern: artifact.pattern.clone(),
                    error: e.to_string(),
                }
            })?;
            descriptor = descriptor.with_artifact(rule);
        }
        if !self.required {
            descriptor = descriptor.optional();
        }
        if let Some(secs) = self.timeout_secs {
            descriptor = descriptor.with_stage_timeout(Duration::from_secs(secs));
        }
        Ok(descriptor)
    }
}

/// Substitute environment variables in a string using ${VAR} syntax.
///
/// Unset variables expand to the empty string.
///
/// # Examples
/// ```
/// use polybuild::core::manifest::substitute_env_vars;
///
/// std::env::set_var("POLYBUILD_DOC_VAR", "services");
/// let result = substitute_env_vars("${POLYBUILD_DOC_VAR}/ui").unwrap();
/// assert_eq!(result, "services/ui");
/// std::env::remove_var("POLYBUILD_DOC_VAR");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, String> {
    let re =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| format!("Invalid regex: {e}"))?;

    let mut last_end = 0;
    let mut output = String::with_capacity(input.len());

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        output.push_str(&input[last_end..full_match.start()]);
        output.push_str(&std::env::var(&cap[1]).unwrap_or_default());
        last_end = full_match.end();
    }

    output.push_str(&input[last_end..]);
    Ok(output)
}

/// Substitute environment variables in all string values of a TOML document
fn substitute_env_vars_in_toml(content: &str) -> Result<String, String> {
    let mut value: toml::Value =
        toml::from_str(content).map_err(|e| format!("Failed to parse TOML: {e}"))?;

    substitute_in_value(&mut value)?;

    toml::to_string_pretty(&value).map_err(|e| format!("Failed to serialize TOML: {e}"))
}

fn substitute_in_value(value: &mut toml::Value) -> Result<(), String> {
    match value {
        toml::Value::String(s) => {
            *s = substitute_env_vars(s)?;
        }
        toml::Value::Array(arr) => {
            for item in arr.iter_mut() {
                substitute_in_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}
