use std::sync::Arc;

use mailtrace::{
    CallbackDisposition, CallbackRequest, SesDriver, TrackError, TrackerConfig, TrackerDriver,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn sns_subscription_confirmation_fetches_subscribe_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/confirm"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let body = json!({
        "Type": "SubscriptionConfirmation",
        "TopicArn": "arn:aws:sns:us-east-1:123:mail",
        "SubscribeURL": format!("{}/confirm", server.uri()),
    })
    .to_string();

    let driver = SesDriver::new(Arc::new(TrackerConfig::default()));
    let disposition = driver.callback(CallbackRequest::new(body)).await.unwrap();
    assert!(matches!(
        disposition,
        CallbackDisposition::SubscriptionConfirmed
    ));
}

#[tokio::test]
async fn sns_subscription_confirmation_checks_topic_first() {
    let server = MockServer::start().await;
    // No confirmation request may reach the server for a foreign topic.
    Mock::given(method("GET"))
        .and(path("/confirm"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let body = json!({
        "Type": "SubscriptionConfirmation",
        "TopicArn": "arn:aws:sns:us-east-1:123:someone-elses-topic",
        "SubscribeURL": format!("{}/confirm", server.uri()),
    })
    .to_string();

    let mut config = TrackerConfig::default();
    config.sns_topic = Some("arn:aws:sns:us-east-1:123:mail".to_string());
    let driver = SesDriver::new(Arc::new(config));

    let result = driver.callback(CallbackRequest::new(body)).await;
    assert!(matches!(result, Err(TrackError::Unauthorized(_))));
}

#[tokio::test]
async fn sns_unreachable_subscribe_url_is_an_http_error() {
    let body = json!({
        "Type": "SubscriptionConfirmation",
        "SubscribeURL": "http://127.0.0.1:1/confirm",
    })
    .to_string();

    let driver = SesDriver::new(Arc::new(TrackerConfig::default()));
    let result = driver.callback(CallbackRequest::new(body)).await;
    assert!(matches!(result, Err(TrackError::Http(_))));
}

#[tokio::test]
async fn non_json_payload_is_invalid() {
    let driver = SesDriver::new(Arc::new(TrackerConfig::default()));
    let result = driver.callback(CallbackRequest::new("not json")).await;
    assert!(matches!(result, Err(TrackError::Json(_))));
}
