//! The [`MailTracker`] facade: one struct wiring the interceptor,
//! reconcilers, driver registry, and purger over a shared store.

use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::drivers::{CallbackDisposition, CallbackRequest, DriverRegistry, TrackerDriver};
use crate::error::TrackError;
use crate::events::{EventSink, NullSink};
use crate::intercept::OutboundInterceptor;
use crate::message::{OutboundEmail, SentMessage};
use crate::model::SentRecord;
use crate::purge::RecordPurger;
use crate::reconcile::{EventReconciler, MessageIdReconciler};
use crate::resolver::DefaultMailerResolver;
use crate::store::{ContentStore, MemoryContentStore, MemoryStore, SentEmailStore};

/// Builder for a [`MailTracker`]. Every component defaults to the
/// in-memory/no-op implementation.
pub struct MailTrackerBuilder {
    config: TrackerConfig,
    store: Option<Arc<dyn SentEmailStore>>,
    content: Option<Arc<dyn ContentStore>>,
    events: Option<Arc<dyn EventSink>>,
    registry: Option<Arc<DriverRegistry>>,
}

impl MailTrackerBuilder {
    /// Use this record store instead of an in-memory one.
    pub fn store(mut self, store: Arc<dyn SentEmailStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this blob store instead of an in-memory one.
    pub fn content_store(mut self, content: Arc<dyn ContentStore>) -> Self {
        self.content = Some(content);
        self
    }

    /// Publish domain events to this sink instead of discarding them.
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Use this driver registry instead of the built-in set.
    pub fn registry(mut self, registry: Arc<DriverRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Assemble the tracker.
    pub fn build(self) -> MailTracker {
        let config = Arc::new(self.config);
        let store = self.store.unwrap_or_else(|| MemoryStore::shared());
        let content = self.content.unwrap_or_else(|| MemoryContentStore::shared());
        let events: Arc<dyn EventSink> = self.events.unwrap_or_else(|| Arc::new(NullSink));
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(DriverRegistry::with_builtins(&config)));
        let resolver = Arc::new(DefaultMailerResolver::new(config.default_mailer.clone()));

        let interceptor = OutboundInterceptor::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&content),
            resolver.clone() as Arc<dyn crate::resolver::MailerResolver>,
            Arc::clone(&events),
        );
        let message_ids = MessageIdReconciler::new(Arc::clone(&store), Arc::clone(&registry));
        let reconciler = EventReconciler::new(Arc::clone(&store), Arc::clone(&events));
        let purger = RecordPurger::new(Arc::clone(&config), Arc::clone(&store), Arc::clone(&content));

        MailTracker {
            config,
            store,
            resolver,
            registry,
            interceptor,
            message_ids,
            reconciler,
            purger,
        }
    }
}

/// Email tracking entry point.
///
/// One instance per process (or per tenant) owns the full pipeline:
/// outbound interception, provider message-id joining, webhook
/// reconciliation, open/click hits, and retention purging.
pub struct MailTracker {
    config: Arc<TrackerConfig>,
    store: Arc<dyn SentEmailStore>,
    resolver: Arc<DefaultMailerResolver>,
    registry: Arc<DriverRegistry>,
    interceptor: OutboundInterceptor,
    message_ids: MessageIdReconciler,
    reconciler: EventReconciler,
    purger: RecordPurger,
}

impl MailTracker {
    /// A tracker over in-memory stores with events discarded.
    pub fn new(config: TrackerConfig) -> Self {
        Self::builder(config).build()
    }

    /// Start building a tracker with custom components.
    pub fn builder(config: TrackerConfig) -> MailTrackerBuilder {
        MailTrackerBuilder {
            config,
            store: None,
            content: None,
            events: None,
            registry: None,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The record store, shared with all components.
    pub fn store(&self) -> &Arc<dyn SentEmailStore> {
        &self.store
    }

    /// Intercept an outgoing message; see
    /// [`OutboundInterceptor::intercept`].
    pub fn intercept(
        &self,
        email: &mut OutboundEmail,
        event_mailer: Option<&str>,
    ) -> Result<Vec<SentRecord>, TrackError> {
        self.interceptor.intercept(email, event_mailer)
    }

    /// Join the provider message id after transport hand-off; see
    /// [`MessageIdReconciler::message_sent`].
    pub fn message_sent(&self, message: &SentMessage) -> Option<SentRecord> {
        self.message_ids.message_sent(message)
    }

    /// Handle an inbound provider webhook.
    ///
    /// Resolves the named driver, validates and normalizes the payload,
    /// then reconciles each resulting event against the store.
    pub async fn handle_callback(
        &self,
        driver_name: &str,
        body: impl Into<String>,
    ) -> Result<CallbackDisposition, TrackError> {
        let driver = self
            .registry
            .driver(driver_name)
            .ok_or_else(|| TrackError::UnknownDriver(driver_name.to_string()))?;

        let disposition = driver.callback(CallbackRequest::new(body)).await?;
        if let CallbackDisposition::Events(events) = &disposition {
            for event in events {
                self.reconciler.apply(event);
            }
        }
        Ok(disposition)
    }

    /// Record an open-pixel hit.
    pub fn record_open(&self, token: &str, ip: &str) {
        self.reconciler.record_open(token, ip);
    }

    /// Record a link-click hit; returns the redirect destination.
    pub fn record_click(&self, token: &str, url: &str, ip: &str) -> String {
        self.reconciler.record_click(token, url, ip)
    }

    /// Run a retention sweep; see [`RecordPurger::purge`].
    pub fn purge(&self, override_days: Option<u32>) -> usize {
        self.purger.purge(override_days)
    }

    /// Record the transport the host is about to send with.
    pub fn set_mailer(&self, mailer: Option<&str>) {
        self.resolver.set_mailer(mailer);
    }

    /// Register (or replace) a driver at runtime.
    pub fn register_driver(&self, name: impl Into<String>, driver: Arc<dyn TrackerDriver>) {
        self.registry.register(name, driver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::LocalDriver;

    #[tokio::test]
    async fn test_unknown_driver_errors() {
        let tracker = MailTracker::new(TrackerConfig::default());
        let result = tracker.handle_callback("postal", "{}").await;
        assert!(matches!(result, Err(TrackError::UnknownDriver(_))));
    }

    #[tokio::test]
    async fn test_runtime_driver_registration() {
        let tracker = MailTracker::new(TrackerConfig::default());
        tracker.register_driver("postal", Arc::new(LocalDriver));
        let disposition = tracker.handle_callback("postal", "{}").await.unwrap();
        assert!(matches!(disposition, CallbackDisposition::Ignored));
    }
}
