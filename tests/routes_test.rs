#![cfg(feature = "routes")]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use mailtrace::{routes, BodyPart, MailTracker, OutboundEmail, SentEmailStore, TrackerConfig};
use serde_json::json;
use tower::ServiceExt;

const BASE: &str = "http://localhost";

fn tracker(config: TrackerConfig) -> Arc<MailTracker> {
    Arc::new(MailTracker::new(config))
}

/// Intercept one email and return (token, rewritten html).
fn tracked_email(tracker: &MailTracker, html: &str) -> (String, String) {
    tracker.set_mailer(Some("smtp"));
    let mut email = OutboundEmail::new()
        .from("noreply@example.com")
        .to("user@example.com")
        .html_body(html);
    let token = tracker.intercept(&mut email, None).unwrap()[0].hash.clone();
    let html = match email.body {
        BodyPart::Text { content, .. } => content,
        other => panic!("unexpected body: {:?}", other),
    };
    (token, html)
}

async fn get(app: axum::Router, uri: &str) -> axum::http::Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post(app: axum::Router, uri: &str, body: String) -> axum::http::Response<Body> {
    app.oneshot(Request::post(uri).body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn pixel_returns_204_and_counts_the_open() {
    let tracker = tracker(TrackerConfig::new(BASE));
    let (token, _) = tracked_email(&tracker, "<html><body><p>Hi</p></body></html>");
    let app = routes::router(tracker.clone());

    let response = get(app.clone(), &format!("/t/{}", token)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(tracker.store().find_by_token(&token).unwrap().opens, 1);

    // Unknown tokens are acknowledged identically.
    let response = get(app, "/t/nonexistent").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn click_redirect_round_trips_the_destination_exactly() {
    let tracker = tracker(TrackerConfig::new(BASE));
    let destination = "https://dest.example.com/?a=1&b=it's";
    let html = r#"<html><body><a href="https://dest.example.com/?a=1&amp;b=it's">go</a></body></html>"#;
    let (token, rewritten) = tracked_email(&tracker, html);

    // Pull the rewritten href back out of the sent body.
    let start = rewritten.find(&format!("{}/n?l=", BASE)).unwrap();
    let end = rewritten[start..].find('"').unwrap() + start;
    let uri = rewritten[start..end].strip_prefix(BASE).unwrap().to_string();
    assert!(uri.ends_with(&format!("&h={}", token)));

    let app = routes::router(tracker.clone());
    let response = get(app, &uri).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        destination
    );

    let record = tracker.store().find_by_token(&token).unwrap();
    assert_eq!(record.clicks, 1);
    let clicks = tracker.store().url_clicks(record.id);
    assert_eq!(clicks[0].url, destination);
}

#[tokio::test]
async fn click_without_destination_falls_back() {
    let mut config = TrackerConfig::new(BASE);
    config.missing_link_redirect = Some("https://app.example.com/home".to_string());
    let app = routes::router(tracker(config));

    let response = get(app, "/n?h=sometoken").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://app.example.com/home"
    );
}

#[tokio::test]
async fn click_with_unparseable_destination_is_rejected() {
    let app = routes::router(tracker(TrackerConfig::new(BASE)));
    let response = get(app, "/n?l=not-a-url&h=sometoken").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn legacy_click_path_decodes_base64_with_dollar_substitution() {
    let tracker = tracker(TrackerConfig::new(BASE));
    let (token, _) = tracked_email(&tracker, "<html><body><p>Hi</p></body></html>");
    let destination = "https://dest.example.com/page";
    let encoded = BASE64.encode(destination).replace('/', "$");

    let app = routes::router(tracker.clone());
    let response = get(app.clone(), &format!("/l/{}/{}", encoded, token)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        destination
    );
    assert_eq!(tracker.store().find_by_token(&token).unwrap().clicks, 1);

    let response = get(app, "/l/!!!not-base64!!!/sometoken").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_status_mapping() {
    let app = routes::router(tracker(TrackerConfig::new(BASE)));

    // Unknown driver name.
    let response = post(app.clone(), "/callback/postal", "{}".to_string()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Default config has signature verification on with no key set.
    let response = post(app.clone(), "/callback/mailgun", "{}".to_string()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Local drivers acknowledge anything.
    let response = post(app.clone(), "/callback/smtp", "{}".to_string()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Malformed JSON for a driver that parses the body.
    let response = post(app, "/callback/ses", "not json".to_string()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sns_route_aliases_the_ses_driver() {
    let app = routes::router(tracker(TrackerConfig::new(BASE)));
    let body = json!({"Type": "UnsubscribeConfirmation"}).to_string();
    let response = post(app, "/sns", body).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
