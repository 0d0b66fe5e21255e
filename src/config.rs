//! Tracker configuration.
//!
//! All tunables live on an explicit [`TrackerConfig`] constructed once at
//! process start and threaded through constructors. There is no global
//! mutable configuration; two trackers with different settings can coexist
//! in the same process (useful in tests).

/// Where the captured original HTML of a tracked message is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStrategy {
    /// Store inline on the record, truncated at `content_max_size`.
    Inline,
    /// Write to the content store at `{content_folder}/{token}.html`.
    External,
}

/// Configuration for a [`MailTracker`](crate::MailTracker) instance.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Public base URL the pixel and click routes are mounted under,
    /// without a trailing slash (e.g. `https://app.example.com/email`).
    pub base_url: String,
    /// Inject the 1x1 open-tracking pixel.
    pub inject_pixel: bool,
    /// Rewrite anchor hrefs through the click-redirect route.
    pub track_links: bool,
    /// Capture the original HTML body onto the record at all.
    pub log_content: bool,
    /// How captured HTML is stored.
    pub content_strategy: ContentStrategy,
    /// Ceiling for inline content, in characters. Longer bodies are
    /// truncated and suffixed with `...`.
    pub content_max_size: usize,
    /// Folder prefix for externally stored bodies.
    pub content_folder: String,
    /// Records older than this many days are eligible for purging.
    /// `None` or `Some(0)` disables purging entirely.
    pub expire_days: Option<u32>,
    /// When set, SNS callbacks carrying a different `TopicArn` are
    /// rejected as unauthorized.
    pub sns_topic: Option<String>,
    /// Shared signing key for Mailgun webhook signatures.
    pub mailgun_signing_key: String,
    /// Verify Mailgun webhook signatures. Disable only in tests.
    pub mailgun_verify_signature: bool,
    /// Transport name recorded when nothing more specific is known.
    pub default_mailer: Option<String>,
    /// Redirect target for click hits that carry no destination.
    /// Falls back to `base_url` when unset.
    pub missing_link_redirect: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            inject_pixel: true,
            track_links: true,
            log_content: true,
            content_strategy: ContentStrategy::Inline,
            content_max_size: 65535,
            content_folder: "mail-tracker".to_string(),
            expire_days: None,
            sns_topic: None,
            mailgun_signing_key: String::new(),
            mailgun_verify_signature: true,
            default_mailer: None,
            missing_link_redirect: None,
        }
    }
}

impl TrackerConfig {
    /// Create a config with the given public base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// URL the open pixel for `token` points at.
    pub fn pixel_url(&self, token: &str) -> String {
        format!("{}/t/{}", self.base_url, token)
    }

    /// URL a rewritten link for `token` points at.
    ///
    /// The destination is percent-encoded so that ampersands and
    /// apostrophes in the original URL round-trip exactly.
    pub fn click_url(&self, url: &str, token: &str) -> String {
        format!(
            "{}/n?l={}&h={}",
            self.base_url,
            urlencoding::encode(url),
            token
        )
    }

    /// Path an externally stored body for `token` is written to.
    pub fn content_path(&self, token: &str) -> String {
        format!("{}/{}.html", self.content_folder, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_url_encodes_destination() {
        let config = TrackerConfig::new("https://example.com");
        let url = config.click_url("https://dest.example.com/?a=1&b='x'", "abc123");
        assert!(url.starts_with("https://example.com/n?l="));
        assert!(url.ends_with("&h=abc123"));
        // The raw ampersand of the destination must not survive unencoded.
        assert!(!url.contains("&b="));
    }

    #[test]
    fn test_content_path() {
        let config = TrackerConfig::default();
        assert_eq!(config.content_path("abc"), "mail-tracker/abc.html");
    }
}
