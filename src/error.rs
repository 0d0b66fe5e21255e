//! Error types for mailtrace.

use thiserror::Error;

/// Errors that can occur while tracking emails or processing callbacks.
#[derive(Debug, Clone, Error)]
pub enum TrackError {
    /// Configuration error (missing value, invalid setting, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No mailer/transport name could be resolved for an outgoing message.
    ///
    /// This aborts interception: a record stored without a transport name
    /// cannot be reconciled against provider callbacks later.
    #[error("Unable to resolve the active mailer for this send")]
    MailerUnresolved,

    /// Webhook signature or topic verification failed.
    #[error("Unauthorized callback: {0}")]
    Unauthorized(String),

    /// No driver registered under the requested name.
    #[error("Unknown tracker driver: {0}")]
    UnknownDriver(String),

    /// Webhook payload did not have the expected shape.
    #[error("Invalid callback payload: {0}")]
    InvalidPayload(String),

    /// A link-hit destination failed basic URL validation.
    #[error("Invalid destination URL: {0}")]
    InvalidUrl(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Store-layer error.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for TrackError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for TrackError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
