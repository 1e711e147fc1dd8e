//! Lifecycle events emitted during a build run.
//!
//! Events are fire-and-forget: sinks must not block the engine and delivery
//! failures are not build failures. The channel sink hands events to an
//! external consumer such as a webhook dispatcher.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::registry::RecordOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum BuildEvent {
  #[serde(rename = "run.started")]
  RunStarted { services: usize },

  #[serde(rename = "service.start")]
  ServiceStart { service: String },

  #[serde(rename = "service.finished")]
  ServiceFinished {
    service: String,
    outcome: RecordOutcome,
  },

  #[serde(rename = "error")]
  Error { service: String, message: String },

  #[serde(rename = "run.finished")]
  RunFinished { success: bool, elapsed_ms: u64 },
}

impl BuildEvent {
  pub fn name(&self) -> &'static str {
    match self {
      BuildEvent::RunStarted { .. } => "run.started",
      BuildEvent::ServiceStart { .. } => "service.start",
      BuildEvent::ServiceFinished { .. } => "service.finished",
      BuildEvent::Error { .. } => "error",
      BuildEvent::RunFinished { .. } => "run.finished",
    }
  }
}

pub trait EventSink: Send + Sync {
  fn emit(&self, event: BuildEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
  fn emit(&self, _event: BuildEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
  tx: mpsc::UnboundedSender<BuildEvent>,
}

impl ChannelSink {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<BuildEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }
}

impl EventSink for ChannelSink {
  fn emit(&self, event: BuildEvent) {
    let name = event.name();
    if self.tx.send(event).is_err() {
      trace!(event = name, "event receiver dropped");
    }
  }
}
