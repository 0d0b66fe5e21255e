//! Outbound send interception: inject trackers and persist one
//! [`SentRecord`] per (recipient, sender) pair, synchronously in the
//! send path.

use std::sync::Arc;

use crate::config::{ContentStrategy, TrackerConfig};
use crate::error::TrackError;
use crate::events::{EventSink, TrackingEvent};
use crate::hash::TokenGenerator;
use crate::message::{
    Headers, OutboundEmail, HASH_HEADER, MAILABLE_ID_HEADER, MAILABLE_TYPE_HEADER,
    NO_TRACK_HEADER,
};
use crate::model::{BodySnapshot, MailableRef, SentRecord};
use crate::resolver::MailerResolver;
use crate::rewrite::rewrite_body;
use crate::store::{ContentStore, SentEmailStore};
use crate::trackers::{tracker_chain, Tracker};

/// Intercepts outgoing messages before transport hand-off.
pub struct OutboundInterceptor {
    config: Arc<TrackerConfig>,
    store: Arc<dyn SentEmailStore>,
    content: Arc<dyn ContentStore>,
    resolver: Arc<dyn MailerResolver>,
    events: Arc<dyn EventSink>,
    chain: Vec<Box<dyn Tracker>>,
}

impl OutboundInterceptor {
    /// Create an interceptor; the injector chain is derived from config.
    pub fn new(
        config: Arc<TrackerConfig>,
        store: Arc<dyn SentEmailStore>,
        content: Arc<dyn ContentStore>,
        resolver: Arc<dyn MailerResolver>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let chain = tracker_chain(&config);
        Self {
            config,
            store,
            content,
            resolver,
            events,
            chain,
        }
    }

    /// Process an outgoing message in place.
    ///
    /// An `X-No-Track` header opts the whole message out: the header is
    /// stripped, nothing is persisted, and the message goes out otherwise
    /// untouched. Otherwise, for each (to, from) pair a correlation token
    /// is stamped as `X-Mailer-Hash`, the body is rewritten through the
    /// injector chain, and a record is persisted and announced.
    ///
    /// Fails only when no transport name can be resolved; tracking is
    /// otherwise best-effort relative to delivery.
    pub fn intercept(
        &self,
        email: &mut OutboundEmail,
        event_mailer: Option<&str>,
    ) -> Result<Vec<SentRecord>, TrackError> {
        // Per-message opt-out, checked once.
        if email.headers.contains(NO_TRACK_HEADER) {
            email.headers.remove(NO_TRACK_HEADER);
            tracing::debug!("Skipping tracking for opted-out message");
            return Ok(Vec::new());
        }

        let mailer = self
            .resolver
            .resolve(event_mailer)
            .ok_or(TrackError::MailerUnresolved)?;

        // Back-reference headers are consumed once for the whole message.
        let mailable = take_mailable_ref(&mut email.headers);

        let mut records = Vec::new();
        let to = email.to.clone();
        let from = email.from.clone();

        for to_addr in &to {
            for from_addr in &from {
                let token = TokenGenerator::generate(self.store.as_ref());
                email.headers.set(HASH_HEADER, token.clone());

                let rewritten = rewrite_body(&email.body, &self.chain, &token);
                email.body = rewritten.body;
                let original_html = rewritten.original_html.unwrap_or_default();

                let mut record = SentRecord::new(&token);
                record.sender_name = from_addr.display_name().to_string();
                record.sender_email = from_addr.email.clone();
                record.recipient_name = to_addr.display_name().to_string();
                record.recipient_email = to_addr.email.clone();
                record.subject = email.subject.clone();
                record.raw_headers = email.headers.to_wire_string();
                record.content = self.capture_content(&token, &original_html);
                record.meta.mailer = Some(mailer.clone());
                record.mailable = mailable.clone();

                let saved = self.store.insert(record);
                tracing::debug!(hash = %saved.hash, recipient = %saved.recipient_email, "Tracked outgoing email");
                self.events.publish(TrackingEvent::Sent(saved.clone()));
                records.push(saved);
            }
        }

        Ok(records)
    }

    /// Store the captured original HTML per the content strategy.
    ///
    /// External writes are a single best-effort attempt; a failure is
    /// logged and the path still recorded, never blocking the send.
    fn capture_content(&self, token: &str, original_html: &str) -> BodySnapshot {
        if !self.config.log_content || original_html.is_empty() {
            return BodySnapshot::None;
        }
        match self.config.content_strategy {
            ContentStrategy::Inline => {
                let max = self.config.content_max_size;
                if original_html.chars().count() > max {
                    let truncated: String = original_html.chars().take(max).collect();
                    BodySnapshot::Inline(format!("{}...", truncated))
                } else {
                    BodySnapshot::Inline(original_html.to_string())
                }
            }
            ContentStrategy::External => {
                let path = self.config.content_path(token);
                if let Err(err) = self.content.put(&path, original_html) {
                    tracing::warn!(error = %err, path = %path, "Failed to store message content");
                }
                BodySnapshot::File(path)
            }
        }
    }
}

/// Consume `X-Mailable-Id` / `X-Mailable-Type` into a back-reference,
/// stripping them from the outgoing headers. Both must be present.
fn take_mailable_ref(headers: &mut Headers) -> Option<MailableRef> {
    let id = headers.get(MAILABLE_ID_HEADER).map(|v| v.to_string());
    let type_tag = headers.get(MAILABLE_TYPE_HEADER).map(|v| v.to_string());
    match (id, type_tag) {
        (Some(id), Some(type_tag)) => {
            headers.remove(MAILABLE_ID_HEADER);
            headers.remove(MAILABLE_TYPE_HEADER);
            Some(MailableRef { type_tag, id })
        }
        _ => None,
    }
}
