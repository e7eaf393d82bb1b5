//! Build step runner
//!
//! Drives one service through setup, compile, test and verify. A failing
//! stage halts the sequence and is recorded in the returned
//! [`BuildStepResult`]; nothing here aborts the run as a whole.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::ExponentialBackoffBuilder;

use crate::config::defaults;
use crate::core::adapter::{StageExecutor, StageOutput, StageRequest};
use crate::core::cache::CacheCoordinator;
use crate::core::descriptor::{ServiceDescriptor, TestPolicy};
use crate::core::events::{millis, BuildEvent, EventSink};
use crate::core::manifest::BuildSettings;
use crate::core::result::{BuildStepResult, ErrorDetail, FailureKind, Stage};
use crate::error::StageError;

/// Retry, timeout and capture settings for the step runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Default time budget per stage
    pub stage_timeout: Duration,
    /// Attempts for a stage failing with a transient error (at least 1)
    pub transient_attempts: u32,
    /// First delay between transient retries
    pub retry_base_delay: Duration,
    /// Largest delay between transient retries
    pub retry_max_delay: Duration,
    /// Lines of tool output kept
    pub tail_lines: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(defaults::STAGE_TIMEOUT_SECS),
            transient_attempts: defaults::TRANSIENT_ATTEMPTS,
            retry_base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            retry_max_delay: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
            tail_lines: defaults::OUTPUT_TAIL_LINES,
        }
    }
}

impl RunnerSettings {
    /// Settings taken from the manifest `[build]` table
    pub fn from_build_settings(settings: &BuildSettings) -> Self {
        Self {
            stage_timeout: Duration::from_secs(settings.stage_timeout_secs),
            transient_attempts: settings.transient_attempts.max(1),
            tail_lines: settings.output_tail_lines,
            ..Self::default()
        }
    }
}

/// Executes the stage sequence for one service at a time
pub struct StepRunner {
    executor: Arc<dyn StageExecutor>,
    cache: CacheCoordinator,
    settings: RunnerSettings,
}

impl StepRunner {
    /// Create a runner
    pub fn new(
        executor: Arc<dyn StageExecutor>,
        cache: CacheCoordinator,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            executor,
            cache,
            settings,
        }
    }

    /// Build `service`, returning its terminal result
    pub async fn run(&self, service: &ServiceDescriptor, events: &dyn EventSink) -> BuildStepResult {
        let started = Instant::now();
        let mut notes = Vec::new();

        let cache_dir = match self.cache.acquire(service.kind) {
            Ok(dir) => dir,
            Err(e) => {
                let detail = ErrorDetail {
                    kind: FailureKind::StageFailure,
                    message: e.to_string(),
                    exit_code: None,
                    output_tail: Vec::new(),
                    attempts: 1,
                };
                return BuildStepResult::failed(&service.name, Stage::Setup, detail, started.elapsed(), notes);
            }
        };

        for stage in Stage::TOOL_STAGES {
            match self.run_stage(service, stage, &cache_dir, events).await {
                Ok(output) => notes.extend(output.notes),
                Err((error, _)) if stage == Stage::Test && service.tests == TestPolicy::Advisory => {
                    tracing::warn!(service = %service.name, "Advisory tests failed: {error}");
                    notes.push(format!("advisory tests failed: {error}"));
                }
                Err((error, attempts)) => {
                    return BuildStepResult::failed(
                        &service.name,
                        stage,
                        ErrorDetail::from_stage_error(&error, attempts),
                        started.elapsed(),
                        notes,
                    );
                }
            }
        }

        let verify_started = Instant::now();
        events.emit(BuildEvent::StageStarted {
            service: service.name.clone(),
            stage: Stage::Verify,
        });
        let verified = service.artifact.locate(&service.workdir);
        events.emit(BuildEvent::StageFinished {
            service: service.name.clone(),
            stage: Stage::Verify,
            success: verified.is_ok(),
            duration_ms: millis(verify_started.elapsed()),
        });

        match verified {
            Ok(artifact) => {
                tracing::debug!(service = %service.name, artifact = %artifact.display(), "Artifact verified");
                BuildStepResult::success(&service.name, artifact, started.elapsed(), notes)
            }
            Err(e) => BuildStepResult::failed(
                &service.name,
                Stage::Verify,
                ErrorDetail::from_artifact_error(&e),
                started.elapsed(),
                notes,
            ),
        }
    }

    /// Run one tool stage with timeout and bounded transient retry
    ///
    /// Only setup is retried; compile and test are deterministic for a given
    /// source tree. Returns the error together with the number of attempts.
    async fn run_stage(
        &self,
        service: &ServiceDescriptor,
        stage: Stage,
        cache_dir: &Path,
        events: &dyn EventSink,
    ) -> Result<StageOutput, (StageError, u32)> {
        let timeout = service.stage_timeout.unwrap_or(self.settings.stage_timeout);
        let max_attempts = self.settings.transient_attempts.max(1);
        let request = StageRequest {
            service,
            stage,
            cache_dir,
            tail_lines: self.settings.tail_lines,
        };
        let executor = &self.executor;
        let attempts = AtomicU32::new(0);

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.retry_base_delay)
            .with_max_interval(self.settings.retry_max_delay)
            .with_max_elapsed_time(None)
            .build();

        events.emit(BuildEvent::StageStarted {
            service: service.name.clone(),
            stage,
        });
        let started = Instant::now();

        let result = backoff::future::retry_notify(
            policy,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    match tokio::time::timeout(timeout, executor.execute(request)).await {
                        Err(_) => Err(backoff::Error::permanent(StageError::TimedOut { timeout })),
                        Ok(Ok(output)) => Ok(output),
                        Ok(Err(e @ StageError::Transient { .. }))
                            if stage == Stage::Setup && attempt < max_attempts =>
                        {
                            Err(backoff::Error::transient(e))
                        }
                        Ok(Err(e)) => Err(backoff::Error::permanent(e)),
                    }
                }
            },
            |error: StageError, delay: Duration| {
                tracing::debug!(service = %service.name, stage = %stage, "Backing off {}ms", delay.as_millis());
                events.emit(BuildEvent::StageRetrying {
                    service: service.name.clone(),
                    stage,
                    attempt: attempts.load(Ordering::SeqCst),
                    error: error.to_string(),
                });
            },
        )
        .await;

        events.emit(BuildEvent::StageFinished {
            service: service.name.clone(),
            stage,
            success: result.is_ok(),
            duration_ms: millis(started.elapsed()),
        });

        result.map_err(|e| (e, attempts.load(Ordering::SeqCst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{ArtifactRule, BuildKind};
    use crate::core::events::{ChannelSink, NullSink};
    use crate::core::result::Outcome;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Executor replaying a queue of scripted results per stage
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<HashMap<Stage, Vec<Result<StageOutput, StageError>>>>,
        calls: Mutex<Vec<Stage>>,
        hang_on: Option<Stage>,
    }

    impl Scripted {
        fn respond(self, stage: Stage, result: Result<StageOutput, StageError>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(stage)
                .or_default()
                .push(result);
            self
        }
    }

    #[async_trait]
    impl StageExecutor for Scripted {
        async fn execute(&self, request: StageRequest<'_>) -> Result<StageOutput, StageError> {
            self.calls.lock().unwrap().push(request.stage);
            if self.hang_on == Some(request.stage) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(&request.stage) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => Ok(StageOutput::default()),
            }
        }
    }

    fn transient() -> StageError {
        StageError::Transient {
            command: "mvn dependency:go-offline".into(),
            status: Some(1),
            tail: vec!["Could not transfer artifact".into()],
        }
    }

    fn fixture(executor: Arc<Scripted>) -> (TempDir, StepRunner, ServiceDescriptor) {
        let tmp = TempDir::new().unwrap();
        let workdir = tmp.path().join("svc");
        std::fs::create_dir_all(workdir.join("out")).unwrap();
        std::fs::write(workdir.join("out/app.jar"), "PK").unwrap();

        let settings = RunnerSettings {
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(2),
            ..RunnerSettings::default()
        };
        let runner = StepRunner::new(
            executor,
            CacheCoordinator::new(tmp.path().join("cache"), "test"),
            settings,
        );
        let svc = ServiceDescriptor::new("svc", BuildKind::Maven, workdir)
            .with_artifact(ArtifactRule::new("out", r"\.jar$").unwrap());
        (tmp, runner, svc)
    }

    #[tokio::test]
    async fn test_all_stages_pass() {
        let executor = Arc::new(Scripted::default());
        let (_tmp, runner, svc) = fixture(executor.clone());

        let result = runner.run(&svc, &NullSink).await;
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.stage, Stage::Verify);
        assert!(result.artifact.unwrap().ends_with("app.jar"));
        assert_eq!(
            *executor.calls.lock().unwrap(),
            vec![Stage::Setup, Stage::Compile, Stage::Test]
        );
    }

    #[tokio::test]
    async fn test_compile_failure_halts_sequence() {
        let executor = Arc::new(Scripted::default().respond(
            Stage::Compile,
            Err(StageError::ToolFailed {
                command: "mvn package".into(),
                status: Some(1),
                tail: vec!["[ERROR] cannot find symbol".into()],
            }),
        ));
        let (_tmp, runner, svc) = fixture(executor.clone());

        let result = runner.run(&svc, &NullSink).await;
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.stage, Stage::Compile);
        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::StageFailure);
        assert_eq!(error.exit_code, Some(1));
        assert_eq!(error.output_tail, vec!["[ERROR] cannot find symbol"]);
        assert!(!executor.calls.lock().unwrap().contains(&Stage::Test));
    }

    #[tokio::test]
    async fn test_transient_setup_is_retried() {
        let executor = Arc::new(
            Scripted::default()
                .respond(Stage::Setup, Err(transient()))
                .respond(Stage::Setup, Ok(StageOutput::default())),
        );
        let (_tmp, runner, svc) = fixture(executor.clone());
        let (sink, mut rx) = ChannelSink::new();

        let result = runner.run(&svc, &sink).await;
        assert_eq!(result.outcome, Outcome::Success);

        let setups = executor
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == Stage::Setup)
            .count();
        assert_eq!(setups, 2);

        let mut retried = false;
        while let Ok(event) = rx.try_recv() {
            if let BuildEvent::StageRetrying { attempt, .. } = event {
                assert_eq!(attempt, 1);
                retried = true;
            }
        }
        assert!(retried);
    }

    #[tokio::test]
    async fn test_transient_attempts_are_bounded() {
        let executor = Arc::new(
            Scripted::default()
                .respond(Stage::Setup, Err(transient()))
                .respond(Stage::Setup, Err(transient()))
                .respond(Stage::Setup, Err(transient()))
                .respond(Stage::Setup, Ok(StageOutput::default())),
        );
        let (_tmp, runner, svc) = fixture(executor.clone());

        let result = runner.run(&svc, &NullSink).await;
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.stage, Stage::Setup);
        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::StageFailure);
        assert_eq!(error.attempts, defaults::TRANSIENT_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_test_failures_are_not_retried() {
        let executor = Arc::new(
            Scripted::default()
                .respond(Stage::Test, Err(transient()))
                .respond(Stage::Test, Ok(StageOutput::default())),
        );
        let (_tmp, runner, svc) = fixture(executor.clone());

        let result = runner.run(&svc, &NullSink).await;
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.stage, Stage::Test);
        assert_eq!(result.error.unwrap().attempts, 1);
        let tests = executor
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == Stage::Test)
            .count();
        assert_eq!(tests, 1);
    }

    #[tokio::test]
    async fn test_advisory_tests_do_not_fail() {
        let executor = Arc::new(Scripted::default().respond(
            Stage::Test,
            Err(StageError::ToolFailed {
                command: "npm run test".into(),
                status: Some(1),
                tail: vec![],
            }),
        ));
        let (_tmp, runner, svc) = fixture(executor);
        let svc = svc.with_tests(TestPolicy::Advisory);

        let result = runner.run(&svc, &NullSink).await;
        assert_eq!(result.outcome, Outcome::Success);
        assert!(result.notes.iter().any(|n| n.contains("advisory tests failed")));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_distinct() {
        let executor = Arc::new(Scripted::default());
        let (_tmp, runner, svc) = fixture(executor);
        let svc = svc.with_artifact(ArtifactRule::new("out", r"\.war$").unwrap());

        let result = runner.run(&svc, &NullSink).await;
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.stage, Stage::Verify);
        assert_eq!(result.error.unwrap().kind, FailureKind::ArtifactMissing);
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let executor = Arc::new(Scripted {
            hang_on: Some(Stage::Compile),
            ..Scripted::default()
        });
        let (_tmp, runner, svc) = fixture(executor);
        let svc = svc.with_stage_timeout(Duration::from_millis(20));

        let result = runner.run(&svc, &NullSink).await;
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.stage, Stage::Compile);
        assert_eq!(result.error.unwrap().kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_notes_are_carried() {
        let executor = Arc::new(Scripted::default().respond(
            Stage::Test,
            Ok(StageOutput {
                tail: vec![],
                notes: vec!["no tests found".into()],
            }),
        ));
        let (_tmp, runner, svc) = fixture(executor);
        let result = runner.run(&svc, &NullSink).await;
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.notes, vec!["no tests found"]);
    }
}
