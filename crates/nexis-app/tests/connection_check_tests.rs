//! Integration tests for the connection check and report download.

mod common;

use common::{signed_in_client, test_config};
use nexis_app::{AppError, NexisClient};
use nexis_analysis::AnalysisError;
use nexis_auth::TokenPair;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn connection_check_tests_healthy_backend_passes_both_checks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "ok" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login/access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "check-token",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let client = NexisClient::from_config(test_config(&server, dir.path()))
        .expect("client should build");

    let report = client.check_connection().await;

    assert_eq!(report.api_status, Ok(200));
    assert!(report.demo_login);
    assert!(report.all_passed());
    assert!(!client.is_authenticated(), "the check login must not be stored");
}

#[tokio::test]
async fn connection_check_tests_signed_in_session_is_left_alone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login/access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "demo-token",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let config = test_config(&server, dir.path());
    let session_path = config.session_path.clone();
    let client = NexisClient::from_config(config).expect("client should build");
    client.session().save(&TokenPair::new("user-token", None));

    let report = client.check_connection().await;

    assert!(report.all_passed());
    assert_eq!(client.session().access_token().as_deref(), Some("user-token"));
    let reopened = NexisClient::from_config(test_config(&server, dir.path()))
        .expect("client should reopen");
    assert_eq!(reopened.session().access_token().as_deref(), Some("user-token"));
    assert!(session_path.exists());
}

#[tokio::test]
async fn connection_check_tests_missing_api_and_refused_login_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login/access-token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let client = NexisClient::from_config(test_config(&server, dir.path()))
        .expect("client should build");

    let report = client.check_connection().await;

    assert_eq!(report.api_status, Ok(404));
    assert!(!report.api_healthy());
    assert!(!report.demo_login);
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn connection_check_tests_download_link_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/21/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "presigned_url": "https://reports.example.com/21.pdf?expires=60"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/files/22/download"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let client = signed_in_client(&server);

    let url = client
        .download_report(21)
        .await
        .expect("download link should resolve");
    assert_eq!(url.path(), "/21.pdf");

    let error = client
        .download_report(22)
        .await
        .expect_err("forbidden download should fail");
    assert!(matches!(error, AppError::Analysis(AnalysisError::Status(403))));
}
