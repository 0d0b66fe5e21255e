//! MIME body rewriting: replace the first HTML leaf with a
//! tracker-injected copy, preserving all other structure.

use crate::message::{BodyPart, MultipartKind};
use crate::trackers::{apply_chain, Tracker};

/// Result of a rewrite pass: the new body and the captured pre-injection
/// HTML, if any leaf was rewritten.
pub struct RewrittenBody {
    pub body: BodyPart,
    pub original_html: Option<String>,
}

/// Rewrite a body tree for tracking.
///
/// The first HTML leaf found (depth-first, left-to-right, descending one
/// level into a nested `alternative`) is replaced by the injector chain's
/// output and its original text captured. All sibling parts are passed
/// through byte-identical, and composite parts are rebuilt with their
/// original structural kind. A structure with more than one HTML leaf has
/// only the first rewritten; a non-HTML single-part body is returned
/// untouched with no capture.
pub fn rewrite_body(body: &BodyPart, chain: &[Box<dyn Tracker>], token: &str) -> RewrittenBody {
    match body {
        BodyPart::Multipart { kind, parts } => {
            let mut original_html = None;
            let mut new_parts = Vec::with_capacity(parts.len());

            for part in parts {
                if original_html.is_some() {
                    new_parts.push(part.clone());
                    continue;
                }
                match part {
                    BodyPart::Text { subtype, content } if subtype == "html" => {
                        original_html = Some(content.clone());
                        new_parts.push(BodyPart::html(apply_chain(chain, content, token)));
                    }
                    BodyPart::Multipart {
                        kind: MultipartKind::Alternative,
                        parts: inner,
                    } => {
                        let mut new_inner = Vec::with_capacity(inner.len());
                        for p in inner {
                            match p {
                                BodyPart::Text { subtype, content }
                                    if subtype == "html" && original_html.is_none() =>
                                {
                                    original_html = Some(content.clone());
                                    new_inner
                                        .push(BodyPart::html(apply_chain(chain, content, token)));
                                }
                                other => new_inner.push(other.clone()),
                            }
                        }
                        new_parts
                            .push(BodyPart::multipart(MultipartKind::Alternative, new_inner));
                    }
                    other => new_parts.push(other.clone()),
                }
            }

            RewrittenBody {
                body: BodyPart::multipart(*kind, new_parts),
                original_html,
            }
        }
        BodyPart::Text { subtype, content } if subtype == "html" => RewrittenBody {
            body: BodyPart::html(apply_chain(chain, content, token)),
            original_html: Some(content.clone()),
        },
        other => RewrittenBody {
            body: other.clone(),
            original_html: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::trackers::tracker_chain;
    use std::sync::Arc;

    fn chain() -> Vec<Box<dyn Tracker>> {
        tracker_chain(&Arc::new(TrackerConfig::new("https://track.example.com")))
    }

    const HTML: &str = r#"<html><body><a href="https://dest.example.com">go</a></body></html>"#;

    #[test]
    fn test_single_html_root() {
        let out = rewrite_body(&BodyPart::html(HTML), &chain(), "tok");
        assert_eq!(out.original_html.as_deref(), Some(HTML));
        match out.body {
            BodyPart::Text { subtype, content } => {
                assert_eq!(subtype, "html");
                assert!(content.contains("/t/tok"));
                assert!(content.contains("/n?l="));
            }
            _ => panic!("expected text part"),
        }
    }

    #[test]
    fn test_single_plain_root_untouched() {
        let plain = BodyPart::plain("just text");
        let out = rewrite_body(&plain, &chain(), "tok");
        assert_eq!(out.body, plain);
        assert!(out.original_html.is_none());
    }

    #[test]
    fn test_alternative_preserves_plain_sibling() {
        let body = BodyPart::multipart(
            MultipartKind::Alternative,
            vec![BodyPart::plain("plain version"), BodyPart::html(HTML)],
        );
        let out = rewrite_body(&body, &chain(), "tok");

        assert_eq!(out.original_html.as_deref(), Some(HTML));
        match &out.body {
            BodyPart::Multipart { kind, parts } => {
                assert_eq!(*kind, MultipartKind::Alternative);
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0], BodyPart::plain("plain version"));
                assert!(parts[1].is_html());
            }
            _ => panic!("expected multipart"),
        }
    }

    #[test]
    fn test_mixed_with_nested_alternative() {
        let body = BodyPart::multipart(
            MultipartKind::Mixed,
            vec![
                BodyPart::multipart(
                    MultipartKind::Alternative,
                    vec![BodyPart::plain("plain version"), BodyPart::html(HTML)],
                ),
                BodyPart::plain("attachment stand-in"),
            ],
        );
        let out = rewrite_body(&body, &chain(), "tok");

        assert_eq!(out.original_html.as_deref(), Some(HTML));
        match &out.body {
            BodyPart::Multipart { kind, parts } => {
                // Structural kind is never changed by the rewrite.
                assert_eq!(*kind, MultipartKind::Mixed);
                assert_eq!(parts.len(), 2);
                match &parts[0] {
                    BodyPart::Multipart { kind, parts } => {
                        assert_eq!(*kind, MultipartKind::Alternative);
                        assert_eq!(parts[0], BodyPart::plain("plain version"));
                    }
                    _ => panic!("expected nested alternative"),
                }
                assert_eq!(parts[1], BodyPart::plain("attachment stand-in"));
            }
            _ => panic!("expected multipart"),
        }
    }

    #[test]
    fn test_related_root() {
        let body = BodyPart::multipart(
            MultipartKind::Related,
            vec![BodyPart::html(HTML), BodyPart::plain("inline resource")],
        );
        let out = rewrite_body(&body, &chain(), "tok");

        assert!(out.original_html.is_some());
        match &out.body {
            BodyPart::Multipart { kind, parts } => {
                assert_eq!(*kind, MultipartKind::Related);
                assert_eq!(parts[1], BodyPart::plain("inline resource"));
            }
            _ => panic!("expected multipart"),
        }
    }

    #[test]
    fn test_only_first_html_leaf_rewritten() {
        let body = BodyPart::multipart(
            MultipartKind::Mixed,
            vec![BodyPart::html("<p>first</p>"), BodyPart::html("<p>second</p>")],
        );
        let out = rewrite_body(&body, &chain(), "tok");

        assert_eq!(out.original_html.as_deref(), Some("<p>first</p>"));
        match &out.body {
            BodyPart::Multipart { parts, .. } => {
                match &parts[0] {
                    BodyPart::Text { content, .. } => assert!(content.contains("/t/tok")),
                    _ => panic!("expected text part"),
                }
                // The second HTML leaf passes through unmodified.
                assert_eq!(parts[1], BodyPart::html("<p>second</p>"));
            }
            _ => panic!("expected multipart"),
        }
    }

    #[test]
    fn test_empty_chain_still_captures_original() {
        let out = rewrite_body(&BodyPart::html(HTML), &[], "tok");
        assert_eq!(out.original_html.as_deref(), Some(HTML));
        assert_eq!(out.body, BodyPart::html(HTML));
    }
}
