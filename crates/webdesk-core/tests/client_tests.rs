//! Integration tests for the HTTP client over the reqwest transport

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use webdesk_core::api::{ApiError, HttpClient, NormalizedResponse, UploadPart};
use webdesk_core::auth::{FileStorage, MemoryStorage, SessionStore};
use webdesk_core::{ClientConfig, ManualClock};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const T: i64 = 1_700_000_000_000;

fn setup(config: ClientConfig) -> (HttpClient, SessionStore) {
    let clock = Arc::new(ManualClock::at_millis(T));
    let session = SessionStore::with_clock(Arc::new(MemoryStorage::new()), clock.clone());
    let client = HttpClient::builder(config, session.clone())
        .clock(clock)
        .build()
        .unwrap();
    (client, session)
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"code": 200, "message": "ok", "data": data}))
}

#[tokio::test]
async fn test_get_unwraps_data_and_sends_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user/list"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer t1"))
        .and(header("x-platform", "web"))
        .respond_with(ok(json!([{"id": 1}, {"id": 2}])))
        .mount(&mock_server)
        .await;

    let (client, session) = setup(ClientConfig::new(mock_server.uri()));
    session.start("t1".to_string(), None, T).unwrap();

    let data = client.get("/user/list", Some(json!({"page": 1}))).await.unwrap();
    assert_eq!(data, json!([{"id": 1}, {"id": 2}]));
}

#[tokio::test]
async fn test_expired_session_sends_no_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let clock = Arc::new(ManualClock::at_millis(T));
    let session = SessionStore::with_clock(Arc::new(MemoryStorage::new()), clock.clone());
    let client = HttpClient::builder(ClientConfig::new(mock_server.uri()), session.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
    session.start("stale".to_string(), Some(json!({"id": 1})), T).unwrap();
    clock.advance(chrono::Duration::hours(25));

    client.get("/dashboard", None).await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
    assert!(session.get().unwrap().is_empty());
}

#[tokio::test]
async fn test_identical_gets_in_same_millisecond_differ() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ok(json!({})))
        .expect(2)
        .mount(&mock_server)
        .await;

    // The clock never moves, so both requests see the same millisecond
    let (client, _) = setup(ClientConfig::new(mock_server.uri()));
    let (a, b) = futures::join!(client.get("/dashboard", None), client.get("/dashboard", None));
    assert!(a.is_ok() && b.is_ok());

    let requests = mock_server.received_requests().await.unwrap();
    let signatures: HashSet<String> = requests
        .iter()
        .map(|r| r.url.query().unwrap_or_default().to_string())
        .collect();
    assert_eq!(signatures.len(), 2);
    assert!(signatures.iter().all(|q| q.contains("_t=")));
}

#[tokio::test]
async fn test_writes_are_not_cache_busted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notes"))
        .and(body_partial_json(json!({"title": "hello"})))
        .respond_with(ok(json!({"id": 9})))
        .mount(&mock_server)
        .await;

    let (client, _) = setup(ClientConfig::new(mock_server.uri()));
    let data = client.post("/notes", &json!({"title": "hello"})).await.unwrap();
    assert_eq!(data, json!({"id": 9}));

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), None);
}

#[tokio::test]
async fn test_business_failure_on_2xx_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 4001, "message": "Insufficient balance"})),
        )
        .mount(&mock_server)
        .await;

    let (client, _) = setup(ClientConfig::new(mock_server.uri()));
    let response = NormalizedResponse::from(client.post("/orders", &json!({"amount": 5})).await);

    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Insufficient balance"));
    assert_eq!(response.code.as_deref(), Some("4001"));
}

#[tokio::test]
async fn test_unauthorized_empties_persisted_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "token invalid"})))
        .mount(&mock_server)
        .await;

    let dir = std::env::temp_dir().join(format!("webdesk-client-401-{}", std::process::id()));
    let session = SessionStore::new(Arc::new(FileStorage::new(dir.clone())));
    session
        .start("t1".to_string(), Some(json!({"id": 1})), session.now_millis())
        .unwrap();

    let redirects = Arc::new(AtomicUsize::new(0));
    let counter = redirects.clone();
    let client = HttpClient::builder(ClientConfig::new(mock_server.uri()), session.clone())
        .on_unauthorized(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
        .unwrap();

    let err = client.get("/user/profile", None).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
    assert!(err.requires_login());
    assert_eq!(redirects.load(Ordering::SeqCst), 1);

    // A fresh store over the same directory sees nothing
    let reopened = SessionStore::new(Arc::new(FileStorage::new(dir.clone())));
    assert!(reopened.get().unwrap().is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_status_classification() {
    let mock_server = MockServer::start().await;

    Mock::given(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "Admins only"})))
        .mount(&mock_server)
        .await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;
    Mock::given(path("/conflict"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"code": "E_DUP", "msg": "Already exists"})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(path("/teapot"))
        .respond_with(ResponseTemplate::new(418))
        .mount(&mock_server)
        .await;

    let (client, session) = setup(ClientConfig::new(mock_server.uri()));
    session.start("t1".to_string(), None, T).unwrap();

    assert_eq!(
        client.get("/forbidden", None).await,
        Err(ApiError::Forbidden("Admins only".to_string()))
    );
    assert_eq!(client.get("/missing", None).await, Err(ApiError::NotFound));
    assert_eq!(client.delete("/broken").await, Err(ApiError::ServerError));

    let err = client.put("/conflict", &json!({})).await.unwrap_err();
    assert_eq!(err.to_string(), "Already exists");
    assert_eq!(err.code(), "E_DUP");

    let err = client.get("/teapot", None).await.unwrap_err();
    assert_eq!(err.code(), "http_418");

    // None of these are 401s
    assert!(session.is_valid());
}

#[tokio::test]
async fn test_timeout_is_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(path("/slow"))
        .respond_with(ok(json!({})).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let config = ClientConfig {
        timeout: Duration::from_millis(100),
        ..ClientConfig::new(mock_server.uri())
    };
    let (client, _) = setup(config);

    let response = NormalizedResponse::from(client.get("/slow", None).await);
    assert_eq!(response.code.as_deref(), Some("timeout"));
    assert_eq!(response.message.as_deref(), Some("Request timed out"));
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let (client, _) = setup(ClientConfig::new("http://127.0.0.1:1"));

    let err = client.get("/anything", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
    assert_eq!(err.code(), "network_error");
}

#[tokio::test]
async fn test_upload_sends_multipart() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ok(json!({"url": "https://cdn.test/avatar.png"})))
        .mount(&mock_server)
        .await;

    let (client, _) = setup(ClientConfig::new(mock_server.uri()));
    let parts = vec![
        UploadPart::file("file", "avatar.png", vec![0x89, 0x50, 0x4e, 0x47]).with_content_type("image/png"),
        UploadPart::text("folder", "avatars"),
    ];
    let data = client.upload("/files", parts).await.unwrap();
    assert_eq!(data["url"], "https://cdn.test/avatar.png");

    let requests = mock_server.received_requests().await.unwrap();
    let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("filename=\"avatar.png\""));
    assert!(body.contains("avatars"));
}
