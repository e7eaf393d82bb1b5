//! Concurrency scheduler
//!
//! Drives a [`BuildGraph`] to completion with at most `jobs` services in
//! flight. Node state lives in an arena indexed like the graph; the
//! scheduler loop is the only writer. A node is admitted once every
//! dependency has succeeded. When a node fails or is skipped, all of its
//! pending dependents are skipped transitively. Under fail-fast every pending
//! node is skipped instead, and running nodes are left to finish.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};

use crate::core::events::{millis, BuildEvent, EventSink};
use crate::core::graph::BuildGraph;
use crate::core::report::{Aggregator, RunReport};
use crate::core::result::{BuildStepResult, ErrorDetail, FailureKind, Outcome, SkipReason, Stage};
use crate::core::runner::StepRunner;
use crate::error::PolybuildError;

/// What a failure does to the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Skip only the failed node's dependents; unrelated branches continue
    #[default]
    BestEffort,
    /// Stop admitting work after the first failure
    FailFast,
}

/// Scheduler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    jobs: usize,
    policy: FailurePolicy,
}

impl SchedulerConfig {
    /// Settings allowing `jobs` concurrent services; `jobs` must be at least 1
    pub fn new(jobs: usize) -> Result<Self, PolybuildError> {
        if jobs == 0 {
            return Err(PolybuildError::Config {
                message: "concurrency limit must be at least 1".to_string(),
            });
        }
        Ok(Self {
            jobs,
            policy: FailurePolicy::BestEffort,
        })
    }

    /// Set the failure policy
    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Concurrency limit
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Failure policy
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Running,
    Done(Outcome),
}

/// Mutable bookkeeping for one run
struct RunState<'g> {
    graph: &'g BuildGraph,
    states: Vec<NodeState>,
    /// Dependencies not yet succeeded, per node
    waiting_on: Vec<usize>,
    /// Admissible nodes, ordered by index (and so by identifier)
    ready: BTreeSet<usize>,
    aggregator: Aggregator,
    halted: bool,
}

impl<'g> RunState<'g> {
    fn new(graph: &'g BuildGraph) -> Self {
        let waiting_on: Vec<usize> = (0..graph.len()).map(|n| graph.dependencies(n).len()).collect();
        let ready = (0..graph.len()).filter(|&n| waiting_on[n] == 0).collect();
        Self {
            graph,
            states: vec![NodeState::Pending; graph.len()],
            waiting_on,
            ready,
            aggregator: Aggregator::new(graph),
            halted: false,
        }
    }

    fn next_ready(&mut self) -> Option<usize> {
        if self.halted {
            return None;
        }
        let node = self.ready.pop_first()?;
        self.states[node] = NodeState::Running;
        Some(node)
    }

    fn complete(
        &mut self,
        node: usize,
        result: BuildStepResult,
        policy: FailurePolicy,
        events: &dyn EventSink,
    ) {
        let outcome = result.outcome;
        self.states[node] = NodeState::Done(outcome);
        events.emit(BuildEvent::ServiceFinished {
            service: result.service.clone(),
            outcome,
            stage: result.stage,
            duration_ms: millis(result.duration),
        });
        self.aggregator.record(result);

        if outcome == Outcome::Success {
            let graph = self.graph;
            for &dependent in graph.dependents(node) {
                self.waiting_on[dependent] -= 1;
                if self.waiting_on[dependent] == 0 && self.states[dependent] == NodeState::Pending {
                    self.ready.insert(dependent);
                }
            }
            return;
        }

        self.skip_dependents(node, events);
        if policy == FailurePolicy::FailFast {
            self.cancel_pending(events);
        }
    }

    /// Skip every pending node reachable through dependent edges from `root`
    fn skip_dependents(&mut self, root: usize, events: &dyn EventSink) {
        let graph = self.graph;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for &dependent in graph.dependents(node) {
                if self.states[dependent] != NodeState::Pending {
                    continue;
                }
                let reason = SkipReason::DependencyFailed {
                    dependency: graph.node(node).name.clone(),
                };
                self.skip(dependent, reason, events);
                stack.push(dependent);
            }
        }
    }

    /// Stop admission and skip everything not yet started
    fn cancel_pending(&mut self, events: &dyn EventSink) {
        if !self.halted {
            tracing::warn!("Fail-fast: cancelling services that have not started");
        }
        self.halted = true;
        for node in 0..self.states.len() {
            if self.states[node] == NodeState::Pending {
                self.skip(node, SkipReason::Cancelled, events);
            }
        }
    }

    fn skip(&mut self, node: usize, reason: SkipReason, events: &dyn EventSink) {
        let graph = self.graph;
        let service = &graph.node(node).name;
        self.states[node] = NodeState::Done(Outcome::Skipped);
        self.ready.remove(&node);
        events.emit(BuildEvent::ServiceSkipped {
            service: service.clone(),
            reason: reason.clone(),
        });
        self.aggregator
            .record(BuildStepResult::skipped(service, reason));
    }
}

/// Runs a build graph on a bounded pool of workers
pub struct Scheduler {
    config: SchedulerConfig,
    runner: Arc<StepRunner>,
    events: Arc<dyn EventSink>,
}

impl Scheduler {
    /// Create a scheduler
    pub fn new(config: SchedulerConfig, runner: Arc<StepRunner>, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            runner,
            events,
        }
    }

    /// Build every service in `graph` and return the finalized report
    pub async fn run(&self, graph: &BuildGraph) -> RunReport {
        let started = Instant::now();
        let jobs = self.config.jobs;
        self.events.emit(BuildEvent::RunStarted {
            services: graph.len(),
            jobs,
        });

        let mut state = RunState::new(graph);
        let mut running = FuturesUnordered::new();

        loop {
            while running.len() < jobs {
                let Some(node) = state.next_ready() else {
                    break;
                };
                let descriptor = graph.node(node).clone();
                self.events.emit(BuildEvent::ServiceStarted {
                    service: descriptor.name.clone(),
                });

                let runner = Arc::clone(&self.runner);
                let events = Arc::clone(&self.events);
                let handle =
                    tokio::spawn(async move { runner.run(&descriptor, events.as_ref()).await });
                running.push(async move { (node, handle.await) });
            }

            let Some((node, joined)) = running.next().await else {
                break;
            };
            let result = joined.unwrap_or_else(|e| {
                let service = &graph.node(node).name;
                tracing::error!(service = %service, "Worker task ended abnormally: {e}");
                BuildStepResult::failed(
                    service,
                    Stage::Setup,
                    ErrorDetail {
                        kind: FailureKind::StageFailure,
                        message: format!("worker task ended abnormally: {e}"),
                        exit_code: None,
                        output_tail: Vec::new(),
                        attempts: 1,
                    },
                    std::time::Duration::ZERO,
                    Vec::new(),
                )
            });
            state.complete(node, result, self.config.policy, self.events.as_ref());
        }

        // Every pending node either became ready or was skipped; anything
        // left here means the graph invariants were broken upstream.
        for node in 0..graph.len() {
            if matches!(state.states[node], NodeState::Pending | NodeState::Running) {
                tracing::error!(service = %graph.node(node).name, "Service left unscheduled");
                state.skip(node, SkipReason::Cancelled, self.events.as_ref());
            }
        }

        let report = state.aggregator.finalize(started.elapsed());
        self.events.emit(BuildEvent::RunFinished {
            outcome: report.outcome,
            duration_ms: report.duration_ms,
        });
        report
    }
}
