//! SES driver: consumes SNS-delivered notifications.
//!
//! Payload reference: SNS wraps each SES event in an envelope
//! (`Type`, `TopicArn`, `Message`) where `Message` is itself a JSON
//! string holding the SES notification
//! (`notificationType` of `Delivery` / `Bounce` / `Complaint`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;

use crate::config::TrackerConfig;
use crate::error::TrackError;
use crate::message::SentMessage;

use super::{
    BounceSeverity, BouncedRecipient, CallbackDisposition, CallbackRequest, Outcome,
    TrackerDriver, WebhookEvent,
};

/// Header SES stamps the provider message id into.
const SES_MESSAGE_ID_HEADER: &str = "X-SES-Message-ID";

/// SES/SNS webhook driver.
pub struct SesDriver {
    config: Arc<TrackerConfig>,
    client: Client,
}

impl SesDriver {
    /// Create an SES driver.
    pub fn new(config: Arc<TrackerConfig>) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Create with a custom reqwest client.
    pub fn with_client(config: Arc<TrackerConfig>, client: Client) -> Self {
        Self { config, client }
    }

    async fn confirm_subscription(&self, envelope: &Value) -> Result<CallbackDisposition, TrackError> {
        let url = envelope
            .get("SubscribeURL")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackError::InvalidPayload("missing SubscribeURL".to_string()))?;

        self.client.get(url).send().await?;
        tracing::debug!(url = %url, "Confirmed SNS subscription");
        Ok(CallbackDisposition::SubscriptionConfirmed)
    }

    fn process_notification(&self, envelope: &Value) -> Result<CallbackDisposition, TrackError> {
        let inner = envelope
            .get("Message")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackError::InvalidPayload("missing Message".to_string()))?;
        let message: Value = serde_json::from_str(inner)?;

        let notification_type = message
            .get("notificationType")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let event = match notification_type {
            "Delivery" => self.delivery_event(&message)?,
            "Bounce" => self.bounce_event(&message)?,
            "Complaint" => self.complaint_event(&message)?,
            _ => return Ok(CallbackDisposition::Ignored),
        };

        Ok(CallbackDisposition::Events(vec![event]))
    }

    fn message_id(message: &Value) -> Result<String, TrackError> {
        message
            .pointer("/mail/messageId")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| TrackError::InvalidPayload("missing mail.messageId".to_string()))
    }

    fn delivery_event(&self, message: &Value) -> Result<WebhookEvent, TrackError> {
        let recipients = string_list(message.pointer("/delivery/recipients"));
        Ok(WebhookEvent {
            message_id: Self::message_id(message)?,
            outcome: Outcome::Delivered {
                success: true,
                smtp_response: message
                    .pointer("/delivery/smtpResponse")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                timestamp: parse_timestamp(message.pointer("/delivery/timestamp")),
                recipients,
            },
            raw_key: "sns_message_delivery".to_string(),
            raw: message.clone(),
        })
    }

    fn bounce_event(&self, message: &Value) -> Result<WebhookEvent, TrackError> {
        let severity = match message.pointer("/bounce/bounceType").and_then(Value::as_str) {
            Some("Permanent") => BounceSeverity::Permanent,
            _ => BounceSeverity::Transient,
        };
        let sub_type = message
            .pointer("/bounce/bounceSubType")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        let recipients = message
            .pointer("/bounce/bouncedRecipients")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| BouncedRecipient {
                        email: item
                            .get("emailAddress")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        diagnostic: item
                            .get("diagnosticCode")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        detail: item.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(WebhookEvent {
            message_id: Self::message_id(message)?,
            outcome: Outcome::Bounced {
                severity,
                sub_type,
                recipients,
            },
            raw_key: "sns_message_bounce".to_string(),
            raw: message.clone(),
        })
    }

    fn complaint_event(&self, message: &Value) -> Result<WebhookEvent, TrackError> {
        let recipients = message
            .pointer("/complaint/complainedRecipients")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("emailAddress").and_then(Value::as_str))
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let complaint_type = message
            .pointer("/complaint/complaintFeedbackType")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Ok(WebhookEvent {
            message_id: Self::message_id(message)?,
            outcome: Outcome::Complained {
                recipients,
                timestamp: parse_timestamp(message.pointer("/complaint/timestamp")),
                complaint_type,
            },
            raw_key: "sns_message_complaint".to_string(),
            raw: message.clone(),
        })
    }
}

#[async_trait]
impl TrackerDriver for SesDriver {
    fn resolve_message_id(&self, message: &SentMessage) -> Option<String> {
        message
            .headers
            .get(SES_MESSAGE_ID_HEADER)
            .map(|v| v.to_string())
    }

    async fn callback(&self, request: CallbackRequest) -> Result<CallbackDisposition, TrackError> {
        let envelope: Value = serde_json::from_str(&request.body)?;

        // When a topic is configured, only callbacks from that topic are
        // trusted.
        if let Some(expected) = &self.config.sns_topic {
            let topic = envelope.get("TopicArn").and_then(Value::as_str);
            if topic != Some(expected.as_str()) {
                return Err(TrackError::Unauthorized("invalid topic ARN".to_string()));
            }
        }

        match envelope.get("Type").and_then(Value::as_str) {
            Some("SubscriptionConfirmation") => self.confirm_subscription(&envelope).await,
            Some("Notification") => self.process_notification(&envelope),
            _ => Ok(CallbackDisposition::Ignored),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn driver(topic: Option<&str>) -> SesDriver {
        let mut config = TrackerConfig::default();
        config.sns_topic = topic.map(|t| t.to_string());
        SesDriver::new(Arc::new(config))
    }

    fn notification(inner: Value) -> String {
        json!({
            "Type": "Notification",
            "TopicArn": "arn:aws:sns:us-east-1:123:mail",
            "Message": inner.to_string(),
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_delivery_notification() {
        let body = notification(json!({
            "notificationType": "Delivery",
            "mail": {"messageId": "ses-1"},
            "delivery": {
                "smtpResponse": "250 OK",
                "timestamp": "2024-03-01T10:00:00.000Z",
                "recipients": ["a@example.com", "b@example.com"],
            },
        }));

        let disposition = driver(None)
            .callback(CallbackRequest::new(body))
            .await
            .unwrap();
        let events = match disposition {
            CallbackDisposition::Events(events) => events,
            other => panic!("unexpected disposition: {:?}", other),
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message_id, "ses-1");
        assert_eq!(events[0].raw_key, "sns_message_delivery");
        match &events[0].outcome {
            Outcome::Delivered {
                success,
                smtp_response,
                recipients,
                ..
            } => {
                assert!(*success);
                assert_eq!(smtp_response, "250 OK");
                assert_eq!(recipients.len(), 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bounce_severity_and_diagnostics() {
        let body = notification(json!({
            "notificationType": "Bounce",
            "mail": {"messageId": "ses-2"},
            "bounce": {
                "bounceType": "Transient",
                "bounceSubType": "MailboxFull",
                "bouncedRecipients": [
                    {"emailAddress": "full@example.com", "diagnosticCode": "552 quota"},
                    {"emailAddress": "other@example.com"},
                ],
            },
        }));

        let disposition = driver(None)
            .callback(CallbackRequest::new(body))
            .await
            .unwrap();
        let events = match disposition {
            CallbackDisposition::Events(events) => events,
            other => panic!("unexpected disposition: {:?}", other),
        };
        match &events[0].outcome {
            Outcome::Bounced {
                severity,
                sub_type,
                recipients,
            } => {
                assert_eq!(*severity, BounceSeverity::Transient);
                assert_eq!(sub_type.as_deref(), Some("MailboxFull"));
                assert_eq!(recipients[0].diagnostic, "552 quota");
                // Diagnostic is an empty string when the provider omits it.
                assert_eq!(recipients[1].diagnostic, "");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_topic_mismatch_rejected() {
        let body = notification(json!({
            "notificationType": "Delivery",
            "mail": {"messageId": "ses-3"},
            "delivery": {"recipients": []},
        }));

        let result = driver(Some("arn:aws:sns:us-east-1:123:other"))
            .callback(CallbackRequest::new(body))
            .await;
        assert!(matches!(result, Err(TrackError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_unknown_notification_type_ignored() {
        let body = notification(json!({
            "notificationType": "Send",
            "mail": {"messageId": "ses-4"},
        }));

        let disposition = driver(None)
            .callback(CallbackRequest::new(body))
            .await
            .unwrap();
        assert!(matches!(disposition, CallbackDisposition::Ignored));
    }

    #[test]
    fn test_resolve_message_id_from_header() {
        let mut headers = crate::message::Headers::new();
        headers.add(SES_MESSAGE_ID_HEADER, "ses-native-id");
        let message = SentMessage::new(headers, "transport-id");

        assert_eq!(
            driver(None).resolve_message_id(&message).as_deref(),
            Some("ses-native-id")
        );

        let bare = SentMessage::new(crate::message::Headers::new(), "transport-id");
        assert!(driver(None).resolve_message_id(&bare).is_none());
    }
}
