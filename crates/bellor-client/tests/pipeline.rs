//! End-to-end pipeline tests against a mock backend.
//!
//! These exercise the full request path: pre-flight token validation,
//! single-flight refresh under concurrency, the single 401 retry, and the
//! key-convention transforms as they appear on the wire.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::Method;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bellor_auth::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use bellor_auth::{AuthError, KeyValueStore, MemoryStore, SessionState};
use bellor_client::{
    BellorClient, Body, Error, LoginRequest, MultipartPayload, RegisterRequest, RequestOptions,
};

fn jwt_expiring_in(offset_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let exp = (now + offset_secs).max(0);
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp).as_bytes());
    format!("{}.{}.sig", header, payload)
}

async fn client_with_store(server: &MockServer) -> (BellorClient, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let client = BellorClient::builder()
        .base_url(server.uri())
        .store(store.clone())
        .build()
        .unwrap();
    (client, store)
}

async fn seed_session(store: &MemoryStore, access: &str, refresh: &str) {
    store.set(ACCESS_TOKEN_KEY, access).await.unwrap();
    store.set(REFRESH_TOKEN_KEY, refresh).await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Key-convention transforms on the wire
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_outgoing_body_is_snake_case_on_the_wire() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;
    seed_session(&store, &jwt_expiring_in(3600), "r1").await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/users/me"))
        .and(body_json(json!({
            "profile_images": ["a.jpg"],
            "drawing_url": "d.png",
            "first_name": "John",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"id": "u1", "first_name": "John"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let value = client
        .request(
            Method::PUT,
            "users/me",
            Body::Json(json!({
                "profileImages": ["a.jpg"],
                "drawingUrl": "d.png",
                "firstName": "John",
            })),
            RequestOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(value["data"]["firstName"], "John");
}

#[tokio::test]
async fn test_incoming_body_is_camel_case_at_every_depth() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;
    seed_session(&store, &jwt_expiring_in(3600), "r1").await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/u2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "first_name": "John",
            "profile_images": ["x.jpg"],
            "nested": {"show_email": true},
        })))
        .mount(&server)
        .await;

    let value = client
        .request(Method::GET, "users/u2", Body::Empty, RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(value["firstName"], "John");
    assert_eq!(value["profileImages"][0], "x.jpg");
    assert_eq!(value["nested"]["showEmail"], true);
    assert!(value.get("first_name").is_none());
    assert!(value["nested"].get("show_email").is_none());
}

#[tokio::test]
async fn test_multipart_bodies_are_passed_through_untouched() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;
    seed_session(&store, &jwt_expiring_in(3600), "r1").await;

    Mock::given(method("POST"))
        .and(path("/api/v1/users/me/profile-images"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"url": "https://cdn.bellor.app/u1/me.jpg"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = MultipartPayload::new()
        .text("displayName", "John")
        .file("image", "me.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0]);

    client
        .request(
            Method::POST,
            "users/me/profile-images",
            Body::Multipart(payload),
            RequestOptions::default(),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let upload = &requests[0];

    let content_type = upload.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));

    // field names keep their exact spelling; no snake_case rewrite
    let body = String::from_utf8_lossy(&upload.body);
    assert!(body.contains(r#"name="displayName""#));
    assert!(body.contains(r#"filename="me.jpg""#));
}

#[tokio::test]
async fn test_non_json_responses_are_passed_through_raw() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;
    seed_session(&store, &jwt_expiring_in(3600), "r1").await;

    let image = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    Mock::given(method("GET"))
        .and(path("/api/v1/users/me/drawing"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(image.clone()),
        )
        .mount(&server)
        .await;

    let response = client
        .request_raw(
            Method::GET,
            "users/me/drawing",
            Body::Empty,
            RequestOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.bytes().await.unwrap().as_ref(), image.as_slice());
}

// ─────────────────────────────────────────────────────────────────────────────
// Token lifecycle through the pipeline
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_requests_share_a_single_refresh() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;
    seed_session(&store, &jwt_expiring_in(-10), "r1").await;

    let fresh = jwt_expiring_in(3600);

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "success": true,
                    "data": {"access_token": fresh, "refresh_token": "r2"},
                }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    // every request must arrive signed with the post-refresh token
    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .and(header("authorization", format!("Bearer {}", fresh)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"id": "u1"},
        })))
        .expect(3)
        .mount(&server)
        .await;

    let get = || {
        client.request(
            Method::GET,
            "users/me",
            Body::Empty,
            RequestOptions::default(),
        )
    };
    let (a, b, c) = tokio::join!(get(), get(), get());
    a.unwrap();
    b.unwrap();
    c.unwrap();

    // rotated refresh token was persisted alongside the new access token
    assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap().unwrap(), fresh);
    assert_eq!(store.get(REFRESH_TOKEN_KEY).await.unwrap().unwrap(), "r2");
}

#[tokio::test]
async fn test_401_triggers_one_refresh_and_one_retry() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;

    // locally valid, but the server has revoked it early
    let revoked = jwt_expiring_in(3600);
    let fresh = jwt_expiring_in(7200);
    seed_session(&store, &revoked, "r1").await;

    Mock::given(method("GET"))
        .and(path("/api/v1/matches"))
        .and(header("authorization", format!("Bearer {}", revoked)))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"access_token": fresh},
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/matches"))
        .and(header("authorization", format!("Bearer {}", fresh)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let value = client
        .request(Method::GET, "matches", Body::Empty, RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(value["data"], json!([]));
}

#[tokio::test]
async fn test_second_401_is_terminal_and_clears_the_session() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;

    let first = jwt_expiring_in(3600);
    let second = jwt_expiring_in(7200);
    seed_session(&store, &first, "r1").await;
    store.set(USER_KEY, r#"{"id":"u1"}"#).await.unwrap();

    // the server rejects both the original token and the refreshed one
    Mock::given(method("GET"))
        .and(path("/api/v1/matches"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"access_token": second},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .request(Method::GET, "matches", Body::Empty, RequestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AuthExpired));
    assert!(err.is_auth_error());

    // the whole triple goes together
    assert!(store.get(ACCESS_TOKEN_KEY).await.unwrap().is_none());
    assert!(store.get(REFRESH_TOKEN_KEY).await.unwrap().is_none());
    assert!(store.get(USER_KEY).await.unwrap().is_none());
    assert_eq!(client.session_state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_rejected_refresh_clears_the_session_and_is_not_retried() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;

    seed_session(&store, &jwt_expiring_in(-10), "r1").await;
    store.set(USER_KEY, r#"{"id":"u1"}"#).await.unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": {"message": "Invalid or expired refresh token"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .request(Method::GET, "matches", Body::Empty, RequestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Auth(AuthError::Rejected { status: 401, .. })
    ));

    assert!(store.get(ACCESS_TOKEN_KEY).await.unwrap().is_none());
    assert!(store.get(REFRESH_TOKEN_KEY).await.unwrap().is_none());
    assert!(store.get(USER_KEY).await.unwrap().is_none());
    assert_eq!(client.session_state(), SessionState::Unauthenticated);

    // terminal: the next request fails locally, with no second refresh call
    let err = client
        .request(Method::GET, "matches", Body::Empty, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::Unauthenticated)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Unauthenticated escape hatch and session bootstrap
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_bypasses_token_pipeline_and_installs_session() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;

    let access = jwt_expiring_in(3600);

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/register"))
        .and(body_json(json!({
            "email": "user@example.com",
            "password": "secret",
            "first_name": "John",
            "last_name": "Doe",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": {
                "access_token": access,
                "refresh_token": "r1",
                "user": {"id": "u1", "first_name": "John"},
            },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client
        .auth()
        .register(&RegisterRequest {
            email: "user@example.com".to_string(),
            password: "secret".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            date_of_birth: None,
        })
        .await
        .unwrap();

    assert_eq!(session.access_token, access);

    // no bearer token on the register call itself
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());

    // session triple installed, cached user readable in app convention
    assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap().unwrap(), access);
    assert_eq!(store.get(REFRESH_TOKEN_KEY).await.unwrap().unwrap(), "r1");
    assert!(client.auth().is_authenticated().await.unwrap());
    let user = client.auth().current_user().await.unwrap().unwrap();
    assert_eq!(user.first_name.as_deref(), Some("John"));
}

#[tokio::test]
async fn test_failed_login_surfaces_api_error_without_retry() {
    let server = MockServer::start().await;
    let (client, _store) = client_with_store(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": {"code": "invalid_credentials", "message": "Invalid email or password"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let err = client
        .auth()
        .login(&LoginRequest {
            email: "user@example.com".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .unwrap_err();

    match err {
        Error::Api { status, code, .. } => {
            assert_eq!(status, 401);
            assert_eq!(code, "invalid_credentials");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resume_session_without_stored_tokens() {
    let server = MockServer::start().await;
    let (client, _store) = client_with_store(&server).await;

    assert!(!client.auth().resume_session().await.unwrap());
}

#[tokio::test]
async fn test_resume_session_revives_expired_token() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;
    seed_session(&store, &jwt_expiring_in(-10), "r1").await;

    let fresh = jwt_expiring_in(3600);
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"access_token": fresh},
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.auth().resume_session().await.unwrap());
    assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap().unwrap(), fresh);
}

#[tokio::test]
async fn test_resume_session_reports_dead_session_as_logged_out() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;
    seed_session(&store, &jwt_expiring_in(-10), "r1").await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert!(!client.auth().resume_session().await.unwrap());
    assert_eq!(client.session_state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_logout_clears_session_even_when_server_unreachable() {
    let server = MockServer::start().await;
    let (client, store) = client_with_store(&server).await;
    seed_session(&store, &jwt_expiring_in(3600), "r1").await;

    // no logout mock mounted: the server answers 404, teardown still runs
    client.auth().logout().await.unwrap();

    assert!(store.get(ACCESS_TOKEN_KEY).await.unwrap().is_none());
    assert!(store.get(REFRESH_TOKEN_KEY).await.unwrap().is_none());
    assert!(!client.auth().is_authenticated().await.unwrap());
}
