//! HTTP endpoints for the pixel, click redirect, and provider webhooks,
//! as an [`axum::Router`] the host nests under its own app.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::TrackError;
use crate::tracker::MailTracker;

/// Routes for a tracker:
///
/// - `GET /t/{token}`: open pixel
/// - `GET /n?l={url}&h={token}`: click redirect
/// - `GET /l/{url}/{token}`: legacy base64 click redirect
/// - `POST /callback/{driver}`: provider webhook
/// - `POST /sns`: alias for `callback/ses`
pub fn router(tracker: Arc<MailTracker>) -> Router {
    Router::new()
        .route("/t/{token}", get(open_pixel))
        .route("/n", get(link_click))
        .route("/l/{url}/{token}", get(legacy_link_click))
        .route("/callback/{driver}", post(provider_callback))
        .route("/sns", post(sns_callback))
        .with_state(tracker)
}

/// Client IP from `X-Forwarded-For` (first hop), else empty. Tracking
/// never depends on it, so no stricter extraction is attempted.
fn forwarded_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

async fn open_pixel(
    State(tracker): State<Arc<MailTracker>>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    tracker.record_open(&token, &forwarded_ip(&headers));
    // Always acknowledged, even for unknown tokens; an error page inside
    // an <img> tag helps no one.
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct ClickParams {
    /// Destination URL, percent-encoded by the link tracker.
    l: Option<String>,
    /// Correlation token.
    h: Option<String>,
}

fn redirect(target: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response()
}

fn record_and_redirect(
    tracker: &MailTracker,
    token: &str,
    url: &str,
    ip: &str,
) -> Response {
    // The destination must at least parse as an absolute URL; this is an
    // open redirect otherwise shaped entirely by query input.
    if reqwest::Url::parse(url).is_err() {
        return (
            StatusCode::BAD_REQUEST,
            TrackError::InvalidUrl(url.to_string()).to_string(),
        )
            .into_response();
    }
    let target = tracker.record_click(token, url, ip);
    redirect(&target)
}

async fn link_click(
    State(tracker): State<Arc<MailTracker>>,
    Query(params): Query<ClickParams>,
    headers: HeaderMap,
) -> Response {
    let ip = forwarded_ip(&headers);
    let token = params.h.unwrap_or_default();

    match params.l {
        Some(url) if !url.is_empty() => record_and_redirect(&tracker, &token, &url, &ip),
        _ => {
            let config = tracker.config();
            let fallback = config
                .missing_link_redirect
                .clone()
                .unwrap_or_else(|| config.base_url.clone());
            redirect(&fallback)
        }
    }
}

async fn legacy_link_click(
    State(tracker): State<Arc<MailTracker>>,
    Path((url, token)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    // Legacy links carry the destination base64-encoded in the path,
    // with `/` swapped for `$` to survive routing.
    let decoded = BASE64
        .decode(url.replace('$', "/"))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    match decoded {
        Some(url) => record_and_redirect(&tracker, &token, &url, &forwarded_ip(&headers)),
        None => (
            StatusCode::BAD_REQUEST,
            "undecodable destination".to_string(),
        )
            .into_response(),
    }
}

async fn provider_callback(
    State(tracker): State<Arc<MailTracker>>,
    Path(driver): Path<String>,
    body: String,
) -> Response {
    callback_response(&tracker, &driver, body).await
}

async fn sns_callback(State(tracker): State<Arc<MailTracker>>, body: String) -> Response {
    callback_response(&tracker, "ses", body).await
}

async fn callback_response(tracker: &MailTracker, driver: &str, body: String) -> Response {
    match tracker.handle_callback(driver, body).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err @ TrackError::Unauthorized(_)) => {
            (StatusCode::UNAUTHORIZED, err.to_string()).into_response()
        }
        Err(err @ TrackError::UnknownDriver(_)) => {
            (StatusCode::NOT_FOUND, err.to_string()).into_response()
        }
        Err(err @ (TrackError::InvalidPayload(_) | TrackError::Json(_))) => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, driver, "Callback handling failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
