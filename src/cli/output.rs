//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress bars,
//! status-prefixed messages and the end-of-run summary.

use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::report::RunReport;
use crate::core::result::Outcome;

static QUIET: AtomicBool = AtomicBool::new(false);
static JSON: AtomicBool = AtomicBool::new(false);

/// Output mode selected on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Suppress everything except errors
    pub quiet: bool,
    /// Machine-readable output
    pub json: bool,
    /// Verbosity level (`-v` count)
    pub verbose: u8,
}

impl OutputConfig {
    /// Create an output configuration
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this configuration visible to the output helpers
    pub fn apply_global(&self) {
        QUIET.store(self.quiet, Ordering::Relaxed);
        JSON.store(self.json, Ordering::Relaxed);
    }

    /// Default tracing level for this verbosity
    pub fn log_level(&self) -> tracing::Level {
        match (self.quiet, self.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::WARN,
            (false, 1) => tracing::Level::INFO,
            (false, 2) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        }
    }
}

/// Whether `--json` is active
pub fn is_json() -> bool {
    JSON.load(Ordering::Relaxed)
}

/// Whether `--quiet` is active
pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Skipped prefix
    pub const SKIPPED: &str = "⊘";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Prefix for a service outcome
pub fn outcome_symbol(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => status::SUCCESS,
        Outcome::Failed => status::ERROR,
        Outcome::Skipped => status::SKIPPED,
    }
}

/// Print a success line unless quiet
pub fn print_success(message: &str) {
    if !is_quiet() && !is_json() {
        println!("{} {message}", status::SUCCESS);
    }
}

/// Print an informational line unless quiet
pub fn print_info(message: &str) {
    if !is_quiet() && !is_json() {
        println!("{} {message}", status::INFO);
    }
}

/// Print a warning to stderr unless quiet
pub fn print_warning(message: &str) {
    if !is_quiet() && !is_json() {
        eprintln!("{} {message}", status::WARNING);
    }
}

/// Print an indented detail line unless quiet
pub fn print_detail(message: &str) {
    if !is_quiet() && !is_json() {
        println!("    {message}");
    }
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    if is_json() {
        let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        let json = serde_json::json!({
            "status": "error",
            "error": error.to_string(),
            "causes": causes,
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }

    eprintln!("{} {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("    caused by: {cause}");
    }
}

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Create a progress bar over services; hidden in quiet and JSON modes
pub fn create_build_bar(total: u64) -> ProgressBar {
    if is_quiet() || is_json() {
        return ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden());
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} services ({msg})")
    {
        pb.set_style(style.progress_chars("█▓▒░"));
    }
    pb
}

/// Format milliseconds as seconds with one decimal
#[allow(clippy::cast_precision_loss)]
pub fn format_duration_ms(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

/// Render the sorted end-of-run summary
pub fn render_summary(report: &RunReport) -> String {
    let lines = report.summary();
    let width = lines.iter().map(|l| l.service.len()).max().unwrap_or(0);
    let mut out = String::new();

    for line in &lines {
        let optional = if line.required { "" } else { " [optional]" };
        out.push_str(&format!(
            "  {} {:<width$}  {:<7}  {:>7}  {}{optional}",
            outcome_symbol(line.outcome),
            line.service,
            line.stage.as_str(),
            format_duration_ms(line.duration_ms),
            line.detail.as_deref().unwrap_or(""),
        ));
        out.push('\n');
    }

    let causes = report.root_causes();
    if !causes.is_empty() {
        out.push_str("\nRoot causes:\n");
        for cause in causes {
            out.push_str(&format!("  {} {} failed at {}", status::ERROR, cause.service, cause.stage));
            if let Some(error) = cause.error {
                out.push_str(&format!(": {}", error.message));
                for tail in &error.output_tail {
                    out.push_str(&format!("\n      | {tail}"));
                }
            }
            out.push('\n');
        }
    }

    let artifacts = report.artifacts();
    if !artifacts.is_empty() {
        out.push_str("\nArtifacts:\n");
        for (service, path) in artifacts {
            out.push_str(&format!("  {service}: {}\n", path.display()));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{BuildKind, ServiceDescriptor};
    use crate::core::graph::BuildGraph;
    use crate::core::report::Aggregator;
    use crate::core::result::{BuildStepResult, ErrorDetail, FailureKind, SkipReason, Stage};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_log_level_from_flags() {
        assert_eq!(OutputConfig::new(false, false, 0).log_level(), tracing::Level::WARN);
        assert_eq!(OutputConfig::new(false, false, 2).log_level(), tracing::Level::DEBUG);
        assert_eq!(OutputConfig::new(true, false, 2).log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_duration_format() {
        assert_eq!(format_duration_ms(1500), "1.5s");
        assert_eq!(format_duration_ms(0), "0.0s");
    }

    #[test]
    fn test_summary_lists_root_cause_and_artifacts() {
        let graph = BuildGraph::build([
            ServiceDescriptor::new("cart", BuildKind::Go, "cart"),
            ServiceDescriptor::new("orders", BuildKind::Maven, "orders"),
            ServiceDescriptor::new("ui", BuildKind::Node, "ui").depends_on(["orders"]),
        ])
        .unwrap();
        let mut agg = Aggregator::new(&graph);
        agg.record(BuildStepResult::success(
            "cart",
            PathBuf::from("/w/cart/bin/cart"),
            Duration::from_millis(1200),
            vec![],
        ));
        agg.record(BuildStepResult::failed(
            "orders",
            Stage::Compile,
            ErrorDetail {
                kind: FailureKind::StageFailure,
                message: "mvn package exited with status 1".into(),
                exit_code: Some(1),
                output_tail: vec!["[ERROR] cannot find symbol".into()],
                attempts: 1,
            },
            Duration::from_millis(800),
            vec![],
        ));
        agg.record(BuildStepResult::skipped(
            "ui",
            SkipReason::DependencyFailed {
                dependency: "orders".into(),
            },
        ));

        let text = render_summary(&agg.finalize(Duration::from_secs(2)));
        let first_lines: Vec<&str> = text.lines().take(3).collect();
        assert!(first_lines[0].contains("✓ cart"));
        assert!(first_lines[1].contains("✗ orders"));
        assert!(first_lines[2].contains("⊘ ui"));
        assert!(text.contains("orders failed at compile"));
        assert!(text.contains("| [ERROR] cannot find symbol"));
        assert!(text.contains("cart: /w/cart/bin/cart"));
    }
}
