//! End to end over HTTP against a wiremock collector

use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use logship::LogShip;
use logship_core::domain::InitializationPriority;

use crate::common::{config_builder, eventually};

const INSTALL_ID: &str = "0f0e0d0c-0b0a-4908-8706-050403020100";

#[tokio::test]
async fn test_events_posted_to_collector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/logs"))
        .and(header("App-Secret", "test-secret"))
        .and(header("Install-ID", INSTALL_ID))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config_builder(dir.path(), 10)
        .endpoint(server.uri())
        .app_secret("test-secret")
        .install_id(INSTALL_ID)
        .build();
    let logship = LogShip::builder(config)
        .without_panic_hook()
        .build()
        .await
        .unwrap();
    let analytics = logship
        .add_module("analytics", InitializationPriority::Default)
        .unwrap();
    logship.start().await.unwrap();

    analytics
        .track_event("app_opened", Default::default())
        .await
        .unwrap();

    let mut delivered = false;
    for _ in 0..100 {
        if !server.received_requests().await.unwrap_or_default().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered, "collector received no batch");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let log = &body["logs"][0];
    assert_eq!(log["type"], "event");
    assert_eq!(log["name"], "app_opened");
    assert_eq!(log["sid"], logship.session_id().to_string());
    assert!(log["device"].is_object());

    let store = logship.store().clone();
    assert!(
        eventually(|| store.loaned_count() == 0).await,
        "acknowledged batch still on loan"
    );
    logship.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_missing_app_secret_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_builder(dir.path(), 10).build();

    let result = LogShip::builder(config).without_panic_hook().build().await;

    let err = result.err().expect("build fails without app secret");
    assert!(format!("{err:#}").contains("app_secret"));
}
