//! Tracker injectors: pure (html, token) -> html transforms.
//!
//! Each injector is applied exactly once per rewritten HTML leaf. The
//! pixel injector never touches anchor tags, so pixel-then-link and
//! link-then-pixel produce the same result.

use std::sync::Arc;

use regex::{Captures, Regex};

use crate::config::TrackerConfig;

/// A tracking artifact injector.
pub trait Tracker: Send + Sync {
    /// Inject this tracker's artifact into an HTML document.
    fn inject(&self, html: &str, token: &str) -> String;
}

/// Appends a 1x1 open-tracking pixel, immediately after the opening
/// `<body...>` tag when one exists, otherwise at the end of the document.
pub struct PixelTracker {
    config: Arc<TrackerConfig>,
    body_open: Regex,
}

impl PixelTracker {
    /// Create a pixel injector pointing at `config.pixel_url`.
    pub fn new(config: Arc<TrackerConfig>) -> Self {
        Self {
            config,
            body_open: Regex::new(r"^(.*<body[^>]*>)(.*)$").expect("static pattern"),
        }
    }
}

impl Tracker for PixelTracker {
    fn inject(&self, html: &str, token: &str) -> String {
        let pixel = format!(
            r#"<img border=0 width=1 alt="" height=1 src="{}" />"#,
            self.config.pixel_url(token)
        );

        // The body-tag scan is line-oriented; protect embedded newlines
        // with a random sentinel so the match cannot split tags.
        let sentinel = uuid::Uuid::new_v4().simple().to_string();
        let flat = html.replace('\n', &sentinel);

        let injected = match self.body_open.captures(&flat) {
            Some(caps) => format!("{}{}{}", &caps[1], &caps[2], pixel),
            None => format!("{}{}", flat, pixel),
        };

        injected.replace(&sentinel, "\n")
    }
}

/// Rewrites every anchor `href` through the click-redirect route,
/// parameterized with the original destination and the token.
pub struct LinkTracker {
    config: Arc<TrackerConfig>,
    href: Regex,
}

impl LinkTracker {
    /// Create a link injector pointing at `config.click_url`.
    pub fn new(config: Arc<TrackerConfig>) -> Self {
        Self {
            config,
            href: Regex::new(r#"(<a[^>]*href=["])([^"]*)"#).expect("static pattern"),
        }
    }
}

impl Tracker for LinkTracker {
    fn inject(&self, html: &str, token: &str) -> String {
        self.href
            .replace_all(html, |caps: &Captures| {
                let destination = if caps[2].is_empty() {
                    self.config.base_url.clone()
                } else {
                    // Entity-encoded ampersands must become literal `&`
                    // before the destination is embedded as a query value,
                    // so the redirect reconstructs the real URL.
                    caps[2].replace("&amp;", "&")
                };
                format!("{}{}", &caps[1], self.config.click_url(&destination, token))
            })
            .into_owned()
    }
}

/// The injector chain enabled by a config, in application order.
pub fn tracker_chain(config: &Arc<TrackerConfig>) -> Vec<Box<dyn Tracker>> {
    let mut chain: Vec<Box<dyn Tracker>> = Vec::new();
    if config.inject_pixel {
        chain.push(Box::new(PixelTracker::new(Arc::clone(config))));
    }
    if config.track_links {
        chain.push(Box::new(LinkTracker::new(Arc::clone(config))));
    }
    chain
}

/// Run every injector in the chain once over `html`.
pub fn apply_chain(chain: &[Box<dyn Tracker>], html: &str, token: &str) -> String {
    chain
        .iter()
        .fold(html.to_string(), |html, tracker| tracker.inject(&html, token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Arc<TrackerConfig> {
        Arc::new(TrackerConfig::new("https://track.example.com"))
    }

    #[test]
    fn test_pixel_after_body_tag() {
        let tracker = PixelTracker::new(config());
        let html = "<html><body class=\"x\"><p>Hi</p></body></html>";
        let out = tracker.inject(html, "tok1");

        assert!(out.contains(r#"src="https://track.example.com/t/tok1""#));
        // Everything up to and including </html> is preserved, pixel appended
        // after the body content the regex captured.
        assert!(out.starts_with("<html><body class=\"x\"><p>Hi</p></body></html>"));
        assert!(out.ends_with("/>"));
    }

    #[test]
    fn test_pixel_appended_without_body_tag() {
        let tracker = PixelTracker::new(config());
        let out = tracker.inject("<p>no body tag</p>", "tok1");
        assert!(out.starts_with("<p>no body tag</p><img "));
    }

    #[test]
    fn test_pixel_preserves_newlines() {
        let tracker = PixelTracker::new(config());
        let html = "<html>\n<body>\n<p>Hi</p>\n</body>\n</html>";
        let out = tracker.inject(html, "tok1");

        assert_eq!(out.matches('\n').count(), 4);
        assert!(out.contains("/t/tok1"));
        // No tag is split across the insertion.
        assert!(out.contains("<p>Hi</p>"));
    }

    #[test]
    fn test_link_rewrite() {
        let tracker = LinkTracker::new(config());
        let html = r#"<a href="https://dest.example.com/page">go</a>"#;
        let out = tracker.inject(html, "tok1");

        assert!(out.contains("https://track.example.com/n?l="));
        assert!(out.contains("&h=tok1"));
        assert!(!out.contains(r#"href="https://dest.example.com"#));
    }

    #[test]
    fn test_link_rewrite_decodes_entity_ampersand() {
        let tracker = LinkTracker::new(config());
        let html = r#"<a href="https://dest.example.com/?a=1&amp;b=2">go</a>"#;
        let out = tracker.inject(html, "tok1");

        let encoded = urlencoding::encode("https://dest.example.com/?a=1&b=2");
        assert!(out.contains(encoded.as_ref()));
    }

    #[test]
    fn test_link_rewrite_apostrophe_round_trips() {
        let tracker = LinkTracker::new(config());
        let html = r#"<a href="https://dest.example.com/?q=it's">go</a>"#;
        let out = tracker.inject(html, "tok1");

        let start = out.find("l=").unwrap() + 2;
        let end = out[start..].find("&h=").unwrap() + start;
        let decoded = urlencoding::decode(&out[start..end]).unwrap();
        assert_eq!(decoded, "https://dest.example.com/?q=it's");
    }

    #[test]
    fn test_link_rewrite_empty_href_uses_root() {
        let tracker = LinkTracker::new(config());
        let out = tracker.inject(r#"<a href="">go</a>"#, "tok1");

        let encoded = urlencoding::encode("https://track.example.com");
        assert!(out.contains(encoded.as_ref()));
    }

    #[test]
    fn test_chain_does_not_double_process_anchors() {
        let config = config();
        let chain = tracker_chain(&config);
        let html = r#"<html><body><a href="https://dest.example.com">go</a></body></html>"#;
        let out = apply_chain(&chain, html, "tok1");

        // Exactly one rewritten href and one pixel.
        assert_eq!(out.matches("/n?l=").count(), 1);
        assert_eq!(out.matches("/t/tok1").count(), 1);
        // The pixel's src attribute was not treated as a link target.
        assert!(!out.contains("l=https%3A%2F%2Ftrack.example.com%2Ft%2F"));
    }

    #[test]
    fn test_chain_respects_config_switches() {
        let mut config = TrackerConfig::new("https://track.example.com");
        config.inject_pixel = false;
        config.track_links = false;
        assert!(tracker_chain(&Arc::new(config)).is_empty());
    }
}
