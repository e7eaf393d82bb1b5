//! Per-service build results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ArtifactError, StageError};

/// Build stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Dependency download
    Setup,
    /// Compilation and packaging
    Compile,
    /// Test suite
    Test,
    /// Artifact verification
    Verify,
}

impl Stage {
    /// Stages delegated to the toolchain adapter
    pub const TOOL_STAGES: [Stage; 3] = [Stage::Setup, Stage::Compile, Stage::Test];

    /// Lowercase stage name
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Compile => "compile",
            Stage::Test => "test",
            Stage::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Every stage passed
    Success,
    /// A stage failed
    Failed,
    /// The service was never attempted
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        })
    }
}

/// Why a stage failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The tool exited unsuccessfully, could not start, or kept hitting
    /// transient errors past the retry bound
    StageFailure,
    /// The stage ran past its time budget
    Timeout,
    /// Compile and test passed but the expected artifact is not there
    ArtifactMissing,
}

/// Why a service was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A dependency did not succeed
    DependencyFailed {
        /// The dependency that failed or was itself skipped
        dependency: String,
    },
    /// Fail-fast stopped admission before this service started
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DependencyFailed { dependency } => {
                write!(f, "dependency '{dependency}' did not succeed")
            }
            SkipReason::Cancelled => f.write_str("cancelled after an earlier failure"),
        }
    }
}

/// Diagnostic attached to a failed service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Failure classification
    pub kind: FailureKind,
    /// One-line description
    pub message: String,
    /// Tool exit status, when the tool ran to completion
    pub exit_code: Option<i32>,
    /// Trailing lines of tool output
    pub output_tail: Vec<String>,
    /// How many times the stage was attempted
    pub attempts: u32,
}

impl ErrorDetail {
    /// Build a detail from a stage error
    pub fn from_stage_error(error: &StageError, attempts: u32) -> Self {
        let kind = match error {
            StageError::TimedOut { .. } => FailureKind::Timeout,
            _ => FailureKind::StageFailure,
        };
        let message = match error {
            StageError::Transient { .. } if attempts > 1 => {
                format!("{error}; giving up after {attempts} attempts")
            }
            _ => error.to_string(),
        };
        Self {
            kind,
            message,
            exit_code: error.exit_code(),
            output_tail: error.tail().to_vec(),
            attempts,
        }
    }

    /// Build a detail from a failed artifact check
    pub fn from_artifact_error(error: &ArtifactError) -> Self {
        Self {
            kind: FailureKind::ArtifactMissing,
            message: error.to_string(),
            exit_code: None,
            output_tail: Vec::new(),
            attempts: 1,
        }
    }
}

/// Duration as integer milliseconds on the wire
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Result of building one service
///
/// Written exactly once per service per run. For skipped services `stage`
/// is [`Stage::Setup`] since nothing ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStepResult {
    /// Service identifier
    pub service: String,
    /// Last stage reached
    pub stage: Stage,
    /// Terminal state
    pub outcome: Outcome,
    /// Failure diagnostic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Skip cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Wall time spent on the service
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    /// Verified artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// Informational conditions that do not affect the outcome
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl BuildStepResult {
    /// Successful build with a verified artifact
    pub fn success(service: &str, artifact: PathBuf, duration: Duration, notes: Vec<String>) -> Self {
        Self {
            service: service.to_string(),
            stage: Stage::Verify,
            outcome: Outcome::Success,
            error: None,
            skip_reason: None,
            duration,
            artifact: Some(artifact),
            notes,
        }
    }

    /// Failed build halted at `stage`
    pub fn failed(
        service: &str,
        stage: Stage,
        error: ErrorDetail,
        duration: Duration,
        notes: Vec<String>,
    ) -> Self {
        Self {
            service: service.to_string(),
            stage,
            outcome: Outcome::Failed,
            error: Some(error),
            skip_reason: None,
            duration,
            artifact: None,
            notes,
        }
    }

    /// Service that was never attempted
    pub fn skipped(service: &str, reason: SkipReason) -> Self {
        Self {
            service: service.to_string(),
            stage: Stage::Setup,
            outcome: Outcome::Skipped,
            error: None,
            skip_reason: Some(reason),
            duration: Duration::ZERO,
            artifact: None,
            notes: Vec::new(),
        }
    }

    /// Whether the service succeeded
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}
