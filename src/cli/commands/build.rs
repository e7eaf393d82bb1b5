//! Build command implementation
//!
//! Implements `polybuild build`: loads the manifest, runs every service in
//! dependency order and prints the sorted summary. A failed run returns an
//! error so the process exits with the build-failure code.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use indicatif::ProgressBar;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::cli::output::{
    create_build_bar, format_duration_ms, is_json, is_quiet, outcome_symbol, print_info,
    print_success, render_summary, status,
};
use crate::core::adapter::CommandExecutor;
use crate::core::events::{BuildEvent, ChannelSink, FanoutSink, TracingSink};
use crate::core::orchestrator::{Orchestrator, Project, RunOptions};
use crate::core::result::Outcome;
use crate::infra::dirs::PolybuildDirs;
use crate::infra::filesystem::write_file;

/// Execute the build command
pub async fn execute(manifest_path: &Path, options: RunOptions, report_path: Option<&Path>) -> Result<()> {
    let project = Project::load(manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;

    let (channel, events) = ChannelSink::new();
    let sink = FanoutSink::new().with(TracingSink).with(channel);
    let orchestrator = Orchestrator::new(Arc::new(CommandExecutor::new()), Arc::new(sink));

    let total = if options.only.is_empty() {
        project.registry().len()
    } else {
        project.graph(&options.only)?.len()
    };
    print_info(&format!("Building {total} services"));
    let progress = tokio::spawn(drive_progress(events, create_build_bar(total as u64)));

    let result = orchestrator
        .run(&project, &options, &PolybuildDirs::new())
        .await;
    // Dropping the orchestrator closes the event channel
    drop(orchestrator);
    if let Err(e) = progress.await {
        tracing::debug!("Progress task ended abnormally: {e}");
    }
    let report = result.context("Build configuration is invalid")?;

    if let Some(path) = report_path {
        write_file(path, &report.to_json()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote run report");
    }

    if is_json() {
        println!("{}", report.to_json()?);
    } else if !is_quiet() {
        println!();
        print!("{}", render_summary(&report));
        println!();
    }

    if report.is_success() {
        print_success(&format!(
            "Build succeeded in {}",
            format_duration_ms(report.duration_ms)
        ));
        Ok(())
    } else {
        let failed = report
            .summary()
            .into_iter()
            .filter(|line| line.required && line.outcome != Outcome::Success)
            .count();
        bail!("Build failed: {failed} required service(s) did not succeed");
    }
}

/// Advance the progress bar as services reach a terminal state
async fn drive_progress(mut events: UnboundedReceiver<BuildEvent>, pb: ProgressBar) {
    while let Some(event) = events.recv().await {
        match event {
            BuildEvent::ServiceStarted { service } => pb.set_message(service),
            BuildEvent::StageRetrying {
                service, attempt, ..
            } => pb.println(format!(
                "{} {service}: transient failure, retrying (attempt {attempt})",
                status::WARNING
            )),
            BuildEvent::ServiceFinished {
                service,
                outcome,
                stage,
                duration_ms,
            } => {
                pb.inc(1);
                pb.println(format!(
                    "{} {service} ({stage}, {})",
                    outcome_symbol(outcome),
                    format_duration_ms(duration_ms)
                ));
            }
            BuildEvent::ServiceSkipped { service, reason } => {
                pb.inc(1);
                pb.println(format!("{} {service}: {reason}", status::SKIPPED));
            }
            _ => {}
        }
    }
    pb.finish_and_clear();
}
