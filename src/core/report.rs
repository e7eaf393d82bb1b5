//! Result aggregation
//!
//! The [`Aggregator`] is the single writer of per-service results during a
//! run. Once the graph is drained it is finalized into a [`RunReport`],
//! which decides the overall outcome and feeds downstream consumers (image
//! builds take the artifact list, notification sinks take the full report).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::core::graph::BuildGraph;
use crate::core::result::{BuildStepResult, ErrorDetail, Outcome, Stage};

/// Overall run outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every required service succeeded
    Success,
    /// At least one required service failed or was skipped
    Failed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunOutcome::Success => "success",
            RunOutcome::Failed => "failed",
        })
    }
}

/// Collects results as services complete
#[derive(Debug)]
pub struct Aggregator {
    expected: BTreeSet<String>,
    required: BTreeSet<String>,
    results: BTreeMap<String, BuildStepResult>,
}

impl Aggregator {
    /// Aggregator expecting one result per node of `graph`
    pub fn new(graph: &BuildGraph) -> Self {
        Self {
            expected: graph.nodes().iter().map(|d| d.name.clone()).collect(),
            required: graph
                .nodes()
                .iter()
                .filter(|d| d.required)
                .map(|d| d.name.clone())
                .collect(),
            results: BTreeMap::new(),
        }
    }

    /// Record a result; returns `false` if the service was unknown or
    /// already recorded, in which case the result is dropped
    pub fn record(&mut self, result: BuildStepResult) -> bool {
        if !self.expected.contains(&result.service) {
            tracing::warn!(service = %result.service, "Dropping result for unknown service");
            return false;
        }
        if self.results.contains_key(&result.service) {
            tracing::warn!(service = %result.service, "Dropping duplicate result");
            return false;
        }
        self.results.insert(result.service.clone(), result);
        true
    }

    /// Number of results recorded so far
    pub fn recorded(&self) -> usize {
        self.results.len()
    }

    /// Fold recorded results into the final report
    pub fn finalize(self, duration: Duration) -> RunReport {
        let complete = self.results.len() == self.expected.len();
        let required_ok = self
            .required
            .iter()
            .all(|name| self.results.get(name).is_some_and(BuildStepResult::is_success));

        let outcome = if complete && required_ok {
            RunOutcome::Success
        } else {
            RunOutcome::Failed
        };

        RunReport {
            outcome,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            required: self.required,
            results: self.results,
        }
    }
}

/// Failed service with its diagnostic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootCause<'a> {
    /// Service that failed
    pub service: &'a str,
    /// Stage that failed
    pub stage: Stage,
    /// Diagnostic
    pub error: Option<&'a ErrorDetail>,
}

/// One line of the sorted summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryLine {
    /// Service identifier
    pub service: String,
    /// Terminal state
    pub outcome: Outcome,
    /// Last stage reached
    pub stage: Stage,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// Short explanation for failures and skips
    pub detail: Option<String>,
    /// Whether the outcome counts towards the run result
    pub required: bool,
}

/// Finalized result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Overall outcome
    pub outcome: RunOutcome,
    /// Wall time of the whole run
    pub duration_ms: u64,
    /// Services whose outcome decides the run
    pub required: BTreeSet<String>,
    /// Per-service results keyed by identifier
    pub results: BTreeMap<String, BuildStepResult>,
}

impl RunReport {
    /// Whether every required service succeeded
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    /// Result for `service`
    pub fn get(&self, service: &str) -> Option<&BuildStepResult> {
        self.results.get(service)
    }

    /// Services with the given outcome, sorted
    pub fn with_outcome(&self, outcome: Outcome) -> Vec<&str> {
        self.results
            .values()
            .filter(|r| r.outcome == outcome)
            .map(|r| r.service.as_str())
            .collect()
    }

    /// Services that actually failed (not skipped), sorted
    pub fn root_causes(&self) -> Vec<RootCause<'_>> {
        self.results
            .values()
            .filter(|r| r.outcome == Outcome::Failed)
            .map(|r| RootCause {
                service: &r.service,
                stage: r.stage,
                error: r.error.as_ref(),
            })
            .collect()
    }

    /// Artifact paths of successful services, for image builds
    pub fn artifacts(&self) -> Vec<(&str, &Path)> {
        self.results
            .values()
            .filter(|r| r.is_success())
            .filter_map(|r| r.artifact.as_deref().map(|p| (r.service.as_str(), p)))
            .collect()
    }

    /// Deterministic summary sorted by identifier
    pub fn summary(&self) -> Vec<SummaryLine> {
        self.results
            .values()
            .map(|r| SummaryLine {
                service: r.service.clone(),
                outcome: r.outcome,
                stage: r.stage,
                duration_ms: u64::try_from(r.duration.as_millis()).unwrap_or(u64::MAX),
                detail: match r.outcome {
                    Outcome::Success if r.notes.is_empty() => None,
                    Outcome::Success => Some(r.notes.join("; ")),
                    Outcome::Failed => r.error.as_ref().map(|e| e.message.clone()),
                    Outcome::Skipped => r.skip_reason.as_ref().map(ToString::to_string),
                },
                required: self.required.contains(&r.service),
            })
            .collect()
    }

    /// Report as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{BuildKind, ServiceDescriptor};
    use crate::core::result::{ErrorDetail, FailureKind, SkipReason};
    use std::path::PathBuf;

    fn graph() -> BuildGraph {
        BuildGraph::build([
            ServiceDescriptor::new("cart", BuildKind::Go, "cart"),
            ServiceDescriptor::new("docs", BuildKind::Node, "docs").optional(),
            ServiceDescriptor::new("orders", BuildKind::Maven, "orders"),
        ])
        .unwrap()
    }

    fn ok(name: &str) -> BuildStepResult {
        BuildStepResult::success(name, PathBuf::from(format!("/out/{name}")), Duration::from_millis(5), vec![])
    }

    fn failed(name: &str, stage: Stage) -> BuildStepResult {
        BuildStepResult::failed(
            name,
            stage,
            ErrorDetail {
                kind: FailureKind::StageFailure,
                message: "exit 1".into(),
                exit_code: Some(1),
                output_tail: vec![],
                attempts: 1,
            },
            Duration::from_millis(5),
            vec![],
        )
    }

    #[test]
    fn test_all_required_success() {
        let mut agg = Aggregator::new(&graph());
        agg.record(ok("cart"));
        agg.record(ok("orders"));
        agg.record(failed("docs", Stage::Test));
        let report = agg.finalize(Duration::from_secs(1));

        assert!(report.is_success(), "optional failure must not fail the run");
        assert_eq!(report.artifacts().len(), 2);
        assert_eq!(report.root_causes().len(), 1);
    }

    #[test]
    fn test_required_failure_fails_run() {
        let mut agg = Aggregator::new(&graph());
        agg.record(ok("cart"));
        agg.record(failed("orders", Stage::Compile));
        agg.record(BuildStepResult::skipped("docs", SkipReason::Cancelled));
        let report = agg.finalize(Duration::ZERO);

        assert_eq!(report.outcome, RunOutcome::Failed);
        let causes = report.root_causes();
        assert_eq!(causes[0].service, "orders");
        assert_eq!(causes[0].stage, Stage::Compile);
        assert_eq!(report.artifacts(), vec![("cart", Path::new("/out/cart"))]);
    }

    #[test]
    fn test_missing_results_fail_run() {
        let mut agg = Aggregator::new(&graph());
        agg.record(ok("cart"));
        assert_eq!(agg.finalize(Duration::ZERO).outcome, RunOutcome::Failed);
    }

    #[test]
    fn test_results_written_once() {
        let mut agg = Aggregator::new(&graph());
        assert!(agg.record(ok("cart")));
        assert!(!agg.record(failed("cart", Stage::Test)));
        assert!(!agg.record(ok("unknown")));
        assert_eq!(agg.recorded(), 1);
    }

    #[test]
    fn test_summary_sorted_with_details() {
        let mut agg = Aggregator::new(&graph());
        agg.record(failed("orders", Stage::Compile));
        agg.record(BuildStepResult::skipped(
            "docs",
            SkipReason::DependencyFailed {
                dependency: "orders".into(),
            },
        ));
        agg.record(ok("cart"));
        let summary = agg.finalize(Duration::ZERO).summary();

        let names: Vec<_> = summary.iter().map(|l| l.service.as_str()).collect();
        assert_eq!(names, vec!["cart", "docs", "orders"]);
        assert_eq!(summary[1].detail.as_deref(), Some("dependency 'orders' did not succeed"));
        assert!(!summary[1].required);
        assert_eq!(summary[2].detail.as_deref(), Some("exit 1"));
    }

    #[test]
    fn test_report_json_round_trips() {
        let mut agg = Aggregator::new(&graph());
        agg.record(ok("cart"));
        let report = agg.finalize(Duration::from_millis(1500));
        let json = report.to_json().unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert!(json.contains("\"outcome\": \"failed\""));
    }
}
