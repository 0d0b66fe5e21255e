//! Provider drivers: translate provider-specific webhook payloads into
//! normalized outcomes, and resolve provider-native message ids after
//! transport hand-off.
//!
//! Drivers are dispatched by name at runtime as `Arc<dyn TrackerDriver>`;
//! `callback` is async (the SNS driver fetches the subscription-confirm
//! URL inside it), so the trait goes through `#[async_trait]` for object
//! safety.

mod local;
mod mailgun;
mod ses;

pub use local::LocalDriver;
pub use mailgun::MailgunDriver;
pub use ses::SesDriver;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::TrackerConfig;
use crate::error::TrackError;
use crate::message::SentMessage;

/// A raw inbound webhook request.
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    /// The HTTP request body, unparsed.
    pub body: String,
}

impl CallbackRequest {
    /// Wrap a raw body.
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Severity of a bounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceSeverity {
    /// The address is gone; do not retry.
    Permanent,
    /// A soft failure (mailbox full, greylisting, ...).
    Transient,
}

/// One failing recipient within a bounce notification.
#[derive(Debug, Clone)]
pub struct BouncedRecipient {
    pub email: String,
    /// Diagnostic/description string; empty if the provider omitted it.
    pub diagnostic: String,
    /// Provider-shaped detail object, appended verbatim to the record's
    /// `failures` log.
    pub detail: Value,
}

/// A normalized webhook outcome.
#[derive(Debug, Clone)]
pub enum Outcome {
    Delivered {
        /// Whether the provider considers the delivery successful.
        success: bool,
        /// SMTP response line as reported.
        smtp_response: String,
        timestamp: DateTime<Utc>,
        recipients: Vec<String>,
    },
    Bounced {
        severity: BounceSeverity,
        /// Provider's bounce sub-type classification, if any.
        sub_type: Option<String>,
        recipients: Vec<BouncedRecipient>,
    },
    Complained {
        recipients: Vec<String>,
        timestamp: DateTime<Utc>,
        /// Provider feedback-type classification, if supplied.
        complaint_type: Option<String>,
    },
}

/// A normalized event ready for reconciliation, keyed by the provider's
/// message id.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Provider-native message id, the join key back to a record.
    pub message_id: String,
    pub outcome: Outcome,
    /// Provider-tagged key the raw payload is stored under.
    pub raw_key: String,
    /// The raw provider payload.
    pub raw: Value,
}

/// What a driver made of a callback.
#[derive(Debug, Clone)]
pub enum CallbackDisposition {
    /// Normalized events to reconcile against records.
    Events(Vec<WebhookEvent>),
    /// A subscription-confirmation handshake was completed; no business
    /// event.
    SubscriptionConfirmed,
    /// Receipt acknowledged, nothing to do (unknown event type, or a
    /// driver with no inbound semantics).
    Ignored,
}

/// A delivery-provider adapter.
#[async_trait]
pub trait TrackerDriver: Send + Sync {
    /// Resolve a provider-native message id from the sent message's
    /// headers, or `None` if this driver stamps no id header.
    fn resolve_message_id(&self, message: &SentMessage) -> Option<String>;

    /// Validate and normalize an inbound webhook payload.
    async fn callback(&self, request: CallbackRequest) -> Result<CallbackDisposition, TrackError>;
}

/// Registry mapping transport names to driver instances.
///
/// Built-in drivers are registered at construction; hosts may register
/// additional drivers (or override built-ins) at any time.
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn TrackerDriver>>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with the built-in drivers registered under the names
    /// the resolver produces: `ses` (alias `sns`), `mailgun`, and the
    /// local driver for `smtp` / `log` / `array` / `failover`.
    pub fn with_builtins(config: &Arc<TrackerConfig>) -> Self {
        let registry = Self::empty();

        let ses: Arc<dyn TrackerDriver> = Arc::new(SesDriver::new(Arc::clone(config)));
        registry.register("ses", Arc::clone(&ses));
        registry.register("sns", ses);

        registry.register(
            "mailgun",
            Arc::new(MailgunDriver::new(
                &config.mailgun_signing_key,
                config.mailgun_verify_signature,
            )),
        );

        let local: Arc<dyn TrackerDriver> = Arc::new(LocalDriver);
        for name in ["smtp", "log", "array", "failover"] {
            registry.register(name, Arc::clone(&local));
        }

        registry
    }

    /// Register (or replace) a driver under a name.
    pub fn register(&self, name: impl Into<String>, driver: Arc<dyn TrackerDriver>) {
        self.drivers.write().insert(name.into(), driver);
    }

    /// Driver registered under `name`.
    pub fn driver(&self, name: &str) -> Option<Arc<dyn TrackerDriver>> {
        self.drivers.read().get(name).cloned()
    }
}
