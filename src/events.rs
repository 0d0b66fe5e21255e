//! Domain events emitted by interception, reconciliation, and hit handling.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::SentRecord;

/// A tracking event. Carries the affected record so subscribers never need
/// a store lookup of their own.
#[derive(Debug, Clone)]
pub enum TrackingEvent {
    /// A record was created during send interception.
    Sent(SentRecord),
    /// A provider reported successful delivery to a recipient.
    Delivered {
        recipient: String,
        record: SentRecord,
    },
    /// A permanent (hard) bounce for a recipient.
    PermanentBounce {
        recipient: String,
        record: SentRecord,
    },
    /// A transient (soft) bounce for a recipient.
    TransientBounce {
        recipient: String,
        /// Provider's bounce sub-type classification, empty if omitted.
        bounce_sub_type: String,
        /// Diagnostic/description string, empty if omitted.
        diagnostic: String,
        record: SentRecord,
    },
    /// A recipient filed a complaint (marked the message as spam).
    Complaint {
        recipient: String,
        record: SentRecord,
    },
    /// The open pixel was fetched.
    Opened { ip: String, record: SentRecord },
    /// A rewritten link was clicked.
    LinkClicked {
        ip: String,
        url: String,
        record: SentRecord,
    },
}

/// Sink for domain events.
///
/// Implementations forward to the host's event bus or task dispatcher.
/// `publish` must return promptly; handlers that do real work should hand
/// off to an at-least-once dispatcher, so reconciliation stays
/// commutative and idempotent under retries.
pub trait EventSink: Send + Sync {
    /// Publish one event.
    fn publish(&self, event: TrackingEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: TrackingEvent) {}
}

/// Collects events in memory, for tests and hosts that poll.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<TrackingEvent>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of all events published so far, in order.
    pub fn events(&self) -> Vec<TrackingEvent> {
        self.events.lock().clone()
    }

    /// Number of events published so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether no events have been published.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drop all collected events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, event: TrackingEvent) {
        self.events.lock().push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn publish(&self, event: TrackingEvent) {
        (**self).publish(event)
    }
}
