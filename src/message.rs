//! Outbound message model: headers, MIME body tree, and the post-transport
//! view consumed by message-id reconciliation.
//!
//! This is not a general MIME library. [`BodyPart`] models only the
//! structural shapes mail-composition libraries produce: a single text
//! part, or one level of `alternative` / `mixed` / `related` nesting
//! (with `alternative` allowed one level deeper inside a composite).

use serde::{Deserialize, Serialize};

use crate::address::{Address, ToAddress};

/// Header carrying the correlation token on an outgoing message.
pub const HASH_HEADER: &str = "X-Mailer-Hash";
/// Presence-only opt-out header, consumed and stripped before send.
pub const NO_TRACK_HEADER: &str = "X-No-Track";
/// Optional back-reference headers, consumed at persistence time.
pub const MAILABLE_ID_HEADER: &str = "X-Mailable-Id";
pub const MAILABLE_TYPE_HEADER: &str = "X-Mailable-Type";

/// An ordered header block.
///
/// Order is preserved so the serialized block stored on a record matches
/// what went out on the wire. Lookup and removal are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace all headers with this name by a single entry, or append
    /// if none exists.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.add(name, value);
    }

    /// First value for `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Remove all headers with this name. Returns true if any were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.entries.len() != before
    }

    /// Whether a header with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Serialize as a `Name: value\r\n` block.
    pub fn to_wire_string(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.entries {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out
    }

    /// Iterate over entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Structural kind of a composite body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultipartKind {
    /// `multipart/alternative`: interchangeable renderings.
    Alternative,
    /// `multipart/mixed`: independent parts (e.g. attachments).
    Mixed,
    /// `multipart/related`: main part plus referenced resources.
    Related,
}

/// A node in the mail body tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyPart {
    /// A text leaf (`text/{subtype}`), e.g. `plain` or `html`.
    Text {
        /// Media subtype, lowercase.
        subtype: String,
        /// Decoded textual content.
        content: String,
    },
    /// A composite part with ordered children.
    Multipart {
        kind: MultipartKind,
        parts: Vec<BodyPart>,
    },
}

impl BodyPart {
    /// An HTML leaf.
    pub fn html(content: impl Into<String>) -> Self {
        Self::Text {
            subtype: "html".to_string(),
            content: content.into(),
        }
    }

    /// A plain-text leaf.
    pub fn plain(content: impl Into<String>) -> Self {
        Self::Text {
            subtype: "plain".to_string(),
            content: content.into(),
        }
    }

    /// A composite part.
    pub fn multipart(kind: MultipartKind, parts: Vec<BodyPart>) -> Self {
        Self::Multipart { kind, parts }
    }

    /// Whether this node is a `text/html` leaf.
    pub fn is_html(&self) -> bool {
        matches!(self, Self::Text { subtype, .. } if subtype == "html")
    }
}

/// An outgoing email at interception time.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    /// Sender addresses.
    pub from: Vec<Address>,
    /// Primary recipients.
    pub to: Vec<Address>,
    /// Subject line.
    pub subject: String,
    /// Header block.
    pub headers: Headers,
    /// Body tree.
    pub body: BodyPart,
}

impl OutboundEmail {
    /// Create a new email with an empty plain body.
    pub fn new() -> Self {
        Self {
            from: Vec::new(),
            to: Vec::new(),
            subject: String::new(),
            headers: Headers::new(),
            body: BodyPart::plain(""),
        }
    }

    /// Add a sender address.
    pub fn from(mut self, addr: impl ToAddress) -> Self {
        self.from.push(addr.to_address());
        self
    }

    /// Add a recipient.
    pub fn to(mut self, addr: impl ToAddress) -> Self {
        self.to.push(addr.to_address());
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Set the body tree.
    pub fn body(mut self, body: BodyPart) -> Self {
        self.body = body;
        self
    }

    /// Convenience: single HTML body.
    pub fn html_body(self, html: impl Into<String>) -> Self {
        self.body(BodyPart::html(html))
    }
}

impl Default for OutboundEmail {
    fn default() -> Self {
        Self::new()
    }
}

/// The transport's view of a message after hand-off, used to resolve the
/// provider-native message id.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Headers of the message as sent (including `X-Mailer-Hash` and any
    /// provider-stamped id headers).
    pub headers: Headers,
    /// Transport-level message id, used as a fallback when the driver
    /// cannot resolve a provider-native one.
    pub message_id: String,
}

impl SentMessage {
    /// Build from a sent email's headers and transport id.
    pub fn new(headers: Headers, message_id: impl Into<String>) -> Self {
        Self {
            headers,
            message_id: message_id.into(),
        }
    }
}
