//! Reconciliation: joining provider message ids and webhook outcomes back
//! onto records, and recording pixel/click hits.
//!
//! All merges are written to be idempotent under webhook redelivery, with
//! one documented exception: `failures` is append-only, so a redelivered
//! bounce duplicates its entries.

use std::sync::Arc;

use chrono::Utc;

use crate::drivers::{BounceSeverity, DriverRegistry, Outcome, WebhookEvent};
use crate::events::{EventSink, TrackingEvent};
use crate::message::{SentMessage, HASH_HEADER};
use crate::model::SentRecord;
use crate::store::SentEmailStore;

/// Joins the provider-native message id onto a record right after
/// transport hand-off.
pub struct MessageIdReconciler {
    store: Arc<dyn SentEmailStore>,
    registry: Arc<DriverRegistry>,
}

impl MessageIdReconciler {
    pub fn new(store: Arc<dyn SentEmailStore>, registry: Arc<DriverRegistry>) -> Self {
        Self { store, registry }
    }

    /// Record the message id for a message the transport just accepted.
    ///
    /// The correlation token comes from the `X-Mailer-Hash` header the
    /// interceptor stamped; a message without one (or with a token no
    /// record carries) is not ours and is skipped. The record's stored
    /// mailer name selects the driver; when that driver stamps no
    /// provider id, the transport-native id is used.
    pub fn message_sent(&self, message: &SentMessage) -> Option<SentRecord> {
        let token = message.headers.get(HASH_HEADER)?.to_string();
        let record = self.store.find_by_token(&token)?;

        let message_id = record
            .mailer()
            .and_then(|name| self.registry.driver(name))
            .and_then(|driver| driver.resolve_message_id(message))
            .unwrap_or_else(|| message.message_id.clone());

        tracing::debug!(hash = %token, message_id = %message_id, "Resolved provider message id");
        self.store.update_by_token(&token, &mut |record| {
            // Message ids are set once; a redelivered send event must not
            // clobber an id a webhook already joined on.
            record.message_id.get_or_insert_with(|| message_id.clone());
        })
    }
}

/// Applies normalized webhook outcomes and open/click hits to records.
pub struct EventReconciler {
    store: Arc<dyn SentEmailStore>,
    events: Arc<dyn EventSink>,
}

impl EventReconciler {
    pub fn new(store: Arc<dyn SentEmailStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Merge one webhook event into its record and announce the outcome,
    /// once per affected recipient.
    ///
    /// A message id no record carries is a no-op: the message predates
    /// tracking or was purged, and the webhook is acknowledged anyway.
    pub fn apply(&self, event: &WebhookEvent) -> Option<SentRecord> {
        let updated = self
            .store
            .update_by_message_id(&event.message_id, &mut |record| {
                match &event.outcome {
                    Outcome::Delivered {
                        success,
                        smtp_response,
                        timestamp,
                        ..
                    } => {
                        record.meta.success = Some(*success);
                        record.meta.smtp_response = Some(smtp_response.clone());
                        record.meta.delivered_at = Some(*timestamp);
                    }
                    Outcome::Bounced { recipients, .. } => {
                        record.meta.success = Some(false);
                        for recipient in recipients {
                            record.meta.failures.push(recipient.detail.clone());
                        }
                    }
                    Outcome::Complained {
                        timestamp,
                        complaint_type,
                        ..
                    } => {
                        record.meta.success = Some(false);
                        record.meta.complaint = true;
                        record.meta.complaint_time = Some(*timestamp);
                        record.meta.complaint_type = complaint_type.clone();
                    }
                }
                record.meta.put_raw(event.raw_key.clone(), event.raw.clone());
            })?;

        self.announce(event, &updated);
        Some(updated)
    }

    fn announce(&self, event: &WebhookEvent, record: &SentRecord) {
        match &event.outcome {
            Outcome::Delivered { recipients, .. } => {
                for recipient in recipients {
                    self.events.publish(TrackingEvent::Delivered {
                        recipient: recipient.clone(),
                        record: record.clone(),
                    });
                }
            }
            Outcome::Bounced {
                severity,
                sub_type,
                recipients,
            } => {
                for recipient in recipients {
                    let event = match severity {
                        BounceSeverity::Permanent => TrackingEvent::PermanentBounce {
                            recipient: recipient.email.clone(),
                            record: record.clone(),
                        },
                        BounceSeverity::Transient => TrackingEvent::TransientBounce {
                            recipient: recipient.email.clone(),
                            bounce_sub_type: sub_type.clone().unwrap_or_default(),
                            diagnostic: recipient.diagnostic.clone(),
                            record: record.clone(),
                        },
                    };
                    self.events.publish(event);
                }
            }
            Outcome::Complained { recipients, .. } => {
                for recipient in recipients {
                    self.events.publish(TrackingEvent::Complaint {
                        recipient: recipient.clone(),
                        record: record.clone(),
                    });
                }
            }
        }
    }

    /// Record an open-pixel hit. A token miss is silently ignored; the
    /// pixel itself is always served.
    pub fn record_open(&self, token: &str, ip: &str) {
        let updated = self.store.update_by_token(token, &mut |record| {
            record.opens += 1;
            record.opened_at.get_or_insert_with(Utc::now);
        });
        if let Some(record) = updated {
            self.events.publish(TrackingEvent::Opened {
                ip: ip.to_string(),
                record,
            });
        }
    }

    /// Record a link-click hit and return the redirect destination.
    ///
    /// The destination is returned even on a token miss, so stale links
    /// keep working after their record is purged.
    pub fn record_click(&self, token: &str, url: &str, ip: &str) -> String {
        let updated = self.store.update_by_token(token, &mut |record| {
            record.clicks += 1;
            record.clicked_at.get_or_insert_with(Utc::now);
        });
        if let Some(record) = updated {
            self.store.upsert_url_click(record.id, token, url);
            self.events.publish(TrackingEvent::LinkClicked {
                ip: ip.to_string(),
                url: url.to_string(),
                record,
            });
        }
        url.to_string()
    }
}
