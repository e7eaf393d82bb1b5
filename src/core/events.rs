//! Structured build events
//!
//! The orchestrator reports progress as [`BuildEvent`] values pushed into an
//! [`EventSink`]. Delivery (log lines, progress bars, notification hooks) is
//! up to the sink.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::report::RunOutcome;
use crate::core::result::{Outcome, SkipReason, Stage};

/// Progress event emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    /// Scheduling began
    RunStarted { services: usize, jobs: usize },
    /// A service was admitted to a worker
    ServiceStarted { service: String },
    /// A stage began
    StageStarted { service: String, stage: Stage },
    /// A stage hit a transient error and will be retried
    StageRetrying {
        service: String,
        stage: Stage,
        attempt: u32,
        error: String,
    },
    /// A stage ended
    StageFinished {
        service: String,
        stage: Stage,
        success: bool,
        duration_ms: u64,
    },
    /// A service reached success or failed
    ServiceFinished {
        service: String,
        outcome: Outcome,
        stage: Stage,
        duration_ms: u64,
    },
    /// A service will not be attempted
    ServiceSkipped { service: String, reason: SkipReason },
    /// Every service is terminal
    RunFinished { outcome: RunOutcome, duration_ms: u64 },
}

/// Receiver of build events
pub trait EventSink: Send + Sync {
    /// Deliver one event; must not block
    fn emit(&self, event: BuildEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: BuildEvent) {}
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: BuildEvent) {
        match &event {
            BuildEvent::RunStarted { services, jobs } => {
                tracing::info!("Building {services} services with {jobs} jobs");
            }
            BuildEvent::ServiceStarted { service } => {
                tracing::info!(service = %service, "Starting build");
            }
            BuildEvent::StageStarted { service, stage } => {
                tracing::debug!(service = %service, stage = %stage, "Stage started");
            }
            BuildEvent::StageRetrying {
                service,
                stage,
                attempt,
                error,
            } => {
                tracing::warn!(service = %service, stage = %stage, attempt, "Retrying after transient error: {error}");
            }
            BuildEvent::StageFinished {
                service,
                stage,
                success,
                duration_ms,
            } => {
                tracing::debug!(service = %service, stage = %stage, success, duration_ms, "Stage finished");
            }
            BuildEvent::ServiceFinished {
                service,
                outcome,
                stage,
                duration_ms,
            } => match outcome {
                Outcome::Success => {
                    tracing::info!(service = %service, duration_ms, "Build succeeded");
                }
                _ => {
                    tracing::error!(service = %service, stage = %stage, duration_ms, "Build failed");
                }
            },
            BuildEvent::ServiceSkipped { service, reason } => {
                tracing::warn!(service = %service, "Skipping: {reason}");
            }
            BuildEvent::RunFinished {
                outcome,
                duration_ms,
            } => {
                tracing::info!(duration_ms, "Run finished: {outcome}");
            }
        }
    }
}

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<BuildEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BuildEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: BuildEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

/// Delivers each event to several sinks in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    /// Create an empty fan-out
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[must_use]
    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: BuildEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

/// Milliseconds in a duration, saturating
pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(BuildEvent::ServiceStarted {
            service: "cart".into(),
        });
        sink.emit(BuildEvent::ServiceSkipped {
            service: "ui".into(),
            reason: SkipReason::Cancelled,
        });
        drop(sink);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0], BuildEvent::ServiceStarted { .. }));
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let (a, mut rx_a) = ChannelSink::new();
        let (b, mut rx_b) = ChannelSink::new();
        let fanout = FanoutSink::new().with(a).with(b).with(NullSink);
        fanout.emit(BuildEvent::RunStarted { services: 1, jobs: 1 });
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_value(BuildEvent::StageStarted {
            service: "orders".into(),
            stage: Stage::Compile,
        })
        .unwrap();
        assert_eq!(json["event"], "stage_started");
        assert_eq!(json["stage"], "compile");
    }
}
