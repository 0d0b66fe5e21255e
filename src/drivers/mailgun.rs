//! Mailgun driver: consumes Mailgun's JSON webhook format.
//!
//! Each webhook carries a `signature` block (`timestamp`, `token`,
//! `signature`) and an `event-data` object. The signature is an
//! HMAC-SHA256 of `timestamp` concatenated with `token`, keyed with the
//! account's webhook signing key, hex-encoded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ring::hmac;
use serde_json::Value;

use crate::error::TrackError;
use crate::message::SentMessage;

use super::{
    BounceSeverity, BouncedRecipient, CallbackDisposition, CallbackRequest, Outcome,
    TrackerDriver, WebhookEvent,
};

/// Header Mailgun's transport stamps the provider message id into,
/// angle-bracketed.
const MAILGUN_MESSAGE_ID_HEADER: &str = "X-Mailgun-Message-ID";

/// Mailgun webhook driver.
pub struct MailgunDriver {
    signing_key: String,
    verify_signature: bool,
}

impl MailgunDriver {
    /// Create a Mailgun driver with the account's webhook signing key.
    pub fn new(signing_key: &str, verify_signature: bool) -> Self {
        Self {
            signing_key: signing_key.to_string(),
            verify_signature,
        }
    }

    fn verify(&self, payload: &Value) -> Result<(), TrackError> {
        if self.signing_key.is_empty() {
            return Err(TrackError::Unauthorized(
                "mailgun signing key not configured".to_string(),
            ));
        }

        let signature = payload.get("signature").ok_or_else(|| {
            TrackError::Unauthorized("missing signature block".to_string())
        })?;
        let timestamp = signature.get("timestamp").and_then(Value::as_str);
        let token = signature.get("token").and_then(Value::as_str);
        let provided = signature.get("signature").and_then(Value::as_str);
        let (timestamp, token, provided) = match (timestamp, token, provided) {
            (Some(t), Some(k), Some(p)) => (t, k, p),
            _ => {
                return Err(TrackError::Unauthorized(
                    "incomplete signature block".to_string(),
                ))
            }
        };

        let provided = hex::decode(provided)
            .map_err(|_| TrackError::Unauthorized("malformed signature".to_string()))?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, self.signing_key.as_bytes());
        let data = format!("{}{}", timestamp, token);
        // ring's verify is constant-time.
        hmac::verify(&key, data.as_bytes(), &provided)
            .map_err(|_| TrackError::Unauthorized("signature mismatch".to_string()))
    }

    fn delivered_event(event: &Value, message_id: String) -> WebhookEvent {
        let code = event
            .pointer("/delivery-status/code")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0);
        let status_message = event
            .pointer("/delivery-status/message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let description = event
            .pointer("/delivery-status/description")
            .and_then(Value::as_str)
            .unwrap_or_default();

        WebhookEvent {
            message_id,
            outcome: Outcome::Delivered {
                success: (200..300).contains(&code),
                smtp_response: format!("{} - {} {}", code, status_message, description)
                    .trim()
                    .to_string(),
                timestamp: event_timestamp(event),
                recipients: recipient_list(event),
            },
            raw_key: "mailgun_message_delivery".to_string(),
            raw: event.clone(),
        }
    }

    fn failed_event(event: &Value, message_id: String) -> WebhookEvent {
        // A reject block means Mailgun refused the message outright;
        // treated as permanent regardless of the severity field.
        let severity = if event.get("reject").is_some()
            || event.get("severity").and_then(Value::as_str) == Some("permanent")
        {
            BounceSeverity::Permanent
        } else {
            BounceSeverity::Transient
        };

        let diagnostic = event
            .pointer("/delivery-status/message")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                event
                    .pointer("/delivery-status/description")
                    .and_then(Value::as_str)
            })
            .or_else(|| event.pointer("/reject/reason").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let recipients = recipient_list(event)
            .into_iter()
            .map(|email| {
                // The failure log entry must identify the recipient;
                // Mailgun keys the whole event by a single recipient
                // rather than listing them inside delivery-status.
                let mut detail = serde_json::Map::new();
                detail.insert("emailAddress".to_string(), Value::String(email.clone()));
                if let Some(status) = event.get("delivery-status") {
                    detail.insert("delivery-status".to_string(), status.clone());
                }
                BouncedRecipient {
                    email,
                    diagnostic: diagnostic.clone(),
                    detail: Value::Object(detail),
                }
            })
            .collect();

        WebhookEvent {
            message_id,
            outcome: Outcome::Bounced {
                severity,
                sub_type: event
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
                recipients,
            },
            raw_key: "mailgun_message_bounce".to_string(),
            raw: event.clone(),
        }
    }

    fn complained_event(event: &Value, message_id: String) -> WebhookEvent {
        WebhookEvent {
            message_id,
            outcome: Outcome::Complained {
                recipients: recipient_list(event),
                timestamp: event_timestamp(event),
                complaint_type: None,
            },
            raw_key: "mailgun_message_complaint".to_string(),
            raw: event.clone(),
        }
    }
}

#[async_trait]
impl TrackerDriver for MailgunDriver {
    fn resolve_message_id(&self, message: &SentMessage) -> Option<String> {
        message
            .headers
            .get(MAILGUN_MESSAGE_ID_HEADER)
            .map(|v| v.trim_matches(['<', '>']).to_string())
    }

    async fn callback(&self, request: CallbackRequest) -> Result<CallbackDisposition, TrackError> {
        let payload: Value = serde_json::from_str(&request.body)?;

        if self.verify_signature {
            self.verify(&payload)?;
        }

        let event = payload
            .get("event-data")
            .ok_or_else(|| TrackError::InvalidPayload("missing event-data".to_string()))?;
        let message_id = event
            .pointer("/message/headers/message-id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TrackError::InvalidPayload("missing message.headers.message-id".to_string())
            })?
            .to_string();

        let webhook_event = match event.get("event").and_then(Value::as_str) {
            Some("delivered") => Self::delivered_event(event, message_id),
            Some("failed") | Some("rejected") => Self::failed_event(event, message_id),
            Some("complained") => Self::complained_event(event, message_id),
            _ => return Ok(CallbackDisposition::Ignored),
        };

        Ok(CallbackDisposition::Events(vec![webhook_event]))
    }
}

fn recipient_list(event: &Value) -> Vec<String> {
    event
        .get("recipient")
        .and_then(Value::as_str)
        .map(|r| vec![r.to_string()])
        .unwrap_or_default()
}

fn event_timestamp(event: &Value) -> DateTime<Utc> {
    event
        .get("timestamp")
        .and_then(Value::as_f64)
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
        .unwrap_or_else(Utc::now)
}
