//! Resolution of the outbound transport name recorded on each send.

use parking_lot::RwLock;

/// Resolves which mailer/transport name to record for an outgoing message.
pub trait MailerResolver: Send + Sync {
    /// Resolve the transport name, given the name the send event itself
    /// supplied (if any). `None` means resolution failed; interception
    /// must then abort rather than guess.
    fn resolve(&self, event_mailer: Option<&str>) -> Option<String>;
}

/// Default resolution chain: explicit event-supplied name, then the last
/// name set via [`set_mailer`](Self::set_mailer), then the configured
/// default transport.
///
/// The "last set" slot assumes single-transport-per-process use; two
/// transports sending concurrently from the same process can race on it.
/// Known limitation, kept as-is.
#[derive(Debug, Default)]
pub struct DefaultMailerResolver {
    last_used: RwLock<Option<String>>,
    default_mailer: Option<String>,
}

impl DefaultMailerResolver {
    /// Create a resolver with an optional configured default transport.
    pub fn new(default_mailer: Option<String>) -> Self {
        Self {
            last_used: RwLock::new(None),
            default_mailer,
        }
    }

    /// Record the transport the host is about to send with.
    pub fn set_mailer(&self, mailer: Option<&str>) {
        *self.last_used.write() = mailer.map(|m| m.to_string());
    }
}

impl MailerResolver for DefaultMailerResolver {
    fn resolve(&self, event_mailer: Option<&str>) -> Option<String> {
        if let Some(mailer) = event_mailer {
            return Some(mailer.to_string());
        }
        if let Some(mailer) = self.last_used.read().clone() {
            return Some(mailer);
        }
        self.default_mailer.clone()
    }
}
