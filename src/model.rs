//! Persistent record types: one [`SentRecord`] per (message, recipient)
//! pair, with [`UrlClick`] children and an append/merge-only [`Meta`] log
//! of provider outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the captured original HTML of a record lives. Inline text and an
/// external reference are mutually exclusive by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodySnapshot {
    /// Content capture disabled or nothing captured.
    #[default]
    None,
    /// Inline text, truncated with a trailing `...` beyond the configured
    /// ceiling.
    Inline(String),
    /// Path of an externally stored blob.
    File(String),
}

impl BodySnapshot {
    /// Blob path, when externally stored.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            Self::File(path) => Some(path.as_str()),
            _ => None,
        }
    }
}

/// Polymorphic back-reference to the business object that originated a
/// send. The core only stores and returns it; dereferencing is up to the
/// host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailableRef {
    /// Host-defined type tag.
    pub type_tag: String,
    /// Host-defined id.
    pub id: String,
}

/// Merge-only outcome log for a record.
///
/// Known keys are typed fields; raw provider payloads go into the ordered
/// [`raw`](Meta::raw) bucket keyed by a provider-tagged name. Merges are
/// last-write-wins per key, except [`failures`](Meta::failures) which only
/// ever appends. Redelivered bounce webhooks may therefore duplicate
/// entries in `failures`; that is documented behavior, not deduped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Whether the provider reported the send as successful. Unset until
    /// an outcome arrives.
    pub success: Option<bool>,
    /// SMTP response line reported on delivery.
    pub smtp_response: Option<String>,
    /// Delivery time, normalized to UTC regardless of source provider.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Accumulated per-recipient failure details across all bounce
    /// notifications for this record.
    pub failures: Vec<Value>,
    /// A complaint (spam report) was received.
    pub complaint: bool,
    /// Complaint time, normalized to UTC.
    pub complaint_time: Option<DateTime<Utc>>,
    /// Provider feedback-type classification, when supplied.
    pub complaint_type: Option<String>,
    /// Transport name the message was sent with.
    pub mailer: Option<String>,
    /// Ordered provider-tagged raw payload log, last-write-wins per key.
    pub raw: Vec<(String, Value)>,
}

impl Meta {
    /// Store a raw provider payload under a provider-tagged key,
    /// overwriting an earlier payload with the same key.
    pub fn put_raw(&mut self, key: impl Into<String>, payload: Value) {
        let key = key.into();
        if let Some(slot) = self.raw.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = payload;
        } else {
            self.raw.push((key, payload));
        }
    }

    /// Raw payload previously stored under `key`.
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.raw.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Persistent record of one tracked recipient of one sent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentRecord {
    /// Store-assigned id.
    pub id: u64,
    /// Correlation token, unique among non-deleted records at creation.
    pub hash: String,
    /// Provider-native message id; the join key for inbound webhooks.
    /// Treated as immutable once set.
    pub message_id: Option<String>,
    pub sender_name: String,
    pub sender_email: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub subject: String,
    /// Serialized header block as sent, minus stripped tracking headers.
    pub raw_headers: String,
    /// Captured pre-injection HTML.
    pub content: BodySnapshot,
    /// Open-pixel hit counter. Only ever increases.
    pub opens: u64,
    /// Link-click counter. Only ever increases.
    pub clicks: u64,
    /// First open time; set once, never overwritten.
    pub opened_at: Option<DateTime<Utc>>,
    /// First click time; set once, never overwritten.
    pub clicked_at: Option<DateTime<Utc>>,
    /// Outcome log.
    pub meta: Meta,
    /// Optional back-reference stamped via headers at send time.
    pub mailable: Option<MailableRef>,
    pub created_at: DateTime<Utc>,
}

impl SentRecord {
    /// Create an unsaved record with zeroed counters.
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            id: 0,
            hash: hash.into(),
            message_id: None,
            sender_name: String::new(),
            sender_email: String::new(),
            recipient_name: String::new(),
            recipient_email: String::new(),
            subject: String::new(),
            raw_headers: String::new(),
            content: BodySnapshot::None,
            opens: 0,
            clicks: 0,
            opened_at: None,
            clicked_at: None,
            meta: Meta::default(),
            mailable: None,
            created_at: Utc::now(),
        }
    }

    /// Transport name recorded at interception.
    pub fn mailer(&self) -> Option<&str> {
        self.meta.mailer.as_deref()
    }
}

/// Per-(record, destination URL) click counter. Owned by its
/// [`SentRecord`] and deleted when the parent is purged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlClick {
    /// Parent record id.
    pub sent_email_id: u64,
    /// Parent record's correlation token.
    pub hash: String,
    /// Destination URL as decoded from the click hit.
    pub url: String,
    /// Click counter for this exact (token, URL) pair.
    pub clicks: u64,
}
