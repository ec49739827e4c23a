//! Event sink trait and implementations.

use super::{EventKind, LifecycleEvent};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Receiver for lifecycle events.
///
/// Sinks must not fail the run; any error is theirs to log and drop.
#[async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Emits an event.
    async fn emit(&self, event: &LifecycleEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &LifecycleEvent) {}
}

/// An event sink that logs events using the tracing framework.
///
/// `stage.failed` is always logged at `WARN`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &LifecycleEvent) {
        let stage = event.stage.as_deref().unwrap_or("-");
        if event.kind == EventKind::StageFailed {
            warn!(
                event_type = %event.kind,
                run_id = %event.run_id,
                stage = %stage,
                event_data = %event.data,
                "Event: {}", event.kind
            );
            return;
        }
        match self.level {
            Level::DEBUG | Level::TRACE => {
                debug!(
                    event_type = %event.kind,
                    run_id = %event.run_id,
                    stage = %stage,
                    event_data = %event.data,
                    "Event: {}", event.kind
                );
            }
            _ => {
                info!(
                    event_type = %event.kind,
                    run_id = %event.run_id,
                    stage = %stage,
                    event_data = %event.data,
                    "Event: {}", event.kind
                );
            }
        }
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<LifecycleEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event kinds in emission order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.read().iter().map(|e| e.kind).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events of one kind.
    #[must_use]
    pub fn events_of_kind(&self, kind: EventKind) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns the events concerning one stage.
    #[must_use]
    pub fn events_for_stage(&self, stage: &str) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.stage.as_deref() == Some(stage))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &LifecycleEvent) {
        self.events.write().push(event.clone());
    }
}
