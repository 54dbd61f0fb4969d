//! End-to-end tests against a local backend speaking the console protocol.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::tempdir;

use tollgate_application::{AuthError, SessionEndReason, SessionStatus};
use tollgate_domain::{AuthState, ClientSettings, ErrorKind, SignInCredentials};
use tollgate_infrastructure::{
    Client, FileKeyValueStore, MemoryKeyValueStore, build_client_with_store,
};

#[derive(Default)]
struct Backend {
    issued: AtomicUsize,
    valid: Mutex<HashSet<String>>,
    refresh_calls: AtomicUsize,
    reject_refresh: AtomicBool,
    flaky_calls: AtomicUsize,
}

impl Backend {
    fn issue(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("eyJhbGciOiJIUzI1NiJ9.access-{n}.sig");
        self.valid.lock().insert(token.clone());
        token
    }

    fn expire_all(&self) {
        self.valid.lock().clear();
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|t| self.valid.lock().contains(t))
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "message": "Token expired"})),
    )
        .into_response()
}

async fn login(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    if body["password"] != "secret" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "Invalid credentials"})),
        )
            .into_response();
    }
    let token = backend.issue();
    Json(json!({
        "success": true,
        "message": "Login successful",
        "data": {
            "user": {"_id": "u-1", "username": body["identifier"], "role": "admin"},
            "token": token,
            "refreshToken": "refresh-1",
            "expiresIn": 3600
        }
    }))
    .into_response()
}

async fn refresh(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if backend.reject_refresh.load(Ordering::SeqCst) || body["refreshToken"] != "refresh-1" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "Invalid refresh token"})),
        )
            .into_response();
    }
    Json(json!({"success": true, "data": {"token": backend.issue()}})).into_response()
}

async fn logout() -> Json<Value> {
    Json(json!({"success": true, "message": "Logout successful"}))
}

async fn me(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "success": true,
        "data": {"user": {"_id": "u-1", "username": "admin", "fullName": "Ada Admin"}}
    }))
    .into_response()
}

async fn items(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([{"id": 1, "name": "gate"}])).into_response()
}

async fn flaky(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    if backend.flaky_calls.fetch_add(1, Ordering::SeqCst) < 2 {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    Json(json!({"ok": true})).into_response()
}

async fn invalid(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "message": "Validation failed"})),
    )
        .into_response()
}

async fn spawn_backend(backend: Arc<Backend>) -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/items", get(items))
        .route("/api/flaky", get(flaky))
        .route("/api/invalid", post(invalid))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn settings(base_url: String) -> ClientSettings {
    let mut settings = ClientSettings {
        base_url,
        ..ClientSettings::default()
    };
    settings.auth.background_refresh = false;
    settings.retry.base_delay_ms = 10;
    settings.retry.max_delay_ms = 100;
    settings
}

async fn signed_in(backend: &Arc<Backend>) -> Client {
    let base = spawn_backend(backend.clone()).await;
    let client =
        build_client_with_store(settings(base), Arc::new(MemoryKeyValueStore::new())).unwrap();
    client
        .session
        .sign_in(SignInCredentials::new("admin", "secret"))
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn test_sign_in_and_fetch() {
    let backend = Arc::new(Backend::default());
    let client = signed_in(&backend).await;

    let items: Vec<Value> = client.api().get("/items").await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(client.tokens().state(), AuthState::Valid);
    assert_eq!(client.tokens().current_user().unwrap().username.as_deref(), Some("admin"));
}

#[tokio::test]
async fn test_duplicate_api_prefix_is_tolerated() {
    let backend = Arc::new(Backend::default());
    let client = signed_in(&backend).await;

    let items: Vec<Value> = client.api().get("/api/items").await.unwrap();
    assert_eq!(items[0]["name"], "gate");
}

#[tokio::test]
async fn test_wrong_password() {
    let backend = Arc::new(Backend::default());
    let base = spawn_backend(backend.clone()).await;
    let client =
        build_client_with_store(settings(base), Arc::new(MemoryKeyValueStore::new())).unwrap();

    let err = client
        .session
        .sign_in(SignInCredentials::new("admin", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::InvalidCredentials("Invalid credentials".into()));
    assert_eq!(client.tokens().state(), AuthState::SignedOut);
}

#[tokio::test]
async fn test_expired_token_refreshed_once() {
    let backend = Arc::new(Backend::default());
    let client = signed_in(&backend).await;
    backend.expire_all();

    let items: Vec<Value> = client.api().get("/items").await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(client.tokens().current_credential().unwrap().access_token.contains("access-2"));
}

#[tokio::test]
async fn test_rejected_refresh_requires_sign_in() {
    let backend = Arc::new(Backend::default());
    let client = signed_in(&backend).await;
    let mut status = client.session.watch();
    backend.expire_all();
    backend.reject_refresh.store(true, Ordering::SeqCst);

    let err = client.api().get::<Value>("/items").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::RefreshRejected);
    assert_eq!(client.tokens().state(), AuthState::SignedOut);
    let required = tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|s| matches!(s, SessionStatus::SignInRequired { .. })),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(
        required,
        SessionStatus::SignInRequired {
            reason: SessionEndReason::RefreshRejected
        }
    );

    let err = client.api().get::<Value>("/items").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthenticated);
}

#[tokio::test]
async fn test_transient_status_retried() {
    let backend = Arc::new(Backend::default());
    let client = signed_in(&backend).await;

    let body: Value = client.api().get("/flaky").await.unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(backend.flaky_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_validation_error_is_caller_fixable() {
    let backend = Arc::new(Backend::default());
    let client = signed_in(&backend).await;

    let err = client
        .api()
        .post::<Value, _>("/invalid", &json!({"name": ""}))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Http);
    assert_eq!(err.status, Some(400));
    assert_eq!(err.message, "Validation failed");
    assert!(err.is_caller_fixable());
}

#[tokio::test]
async fn test_refresh_profile() {
    let backend = Arc::new(Backend::default());
    let client = signed_in(&backend).await;

    let user = client.session.refresh_profile().await.unwrap();

    assert_eq!(user.display_name(), "Ada Admin");
    assert_eq!(client.tokens().current_user(), Some(user));
}

#[tokio::test]
async fn test_session_survives_restart() {
    let backend = Arc::new(Backend::default());
    let base = spawn_backend(backend.clone()).await;
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.json");

    {
        let client = build_client_with_store(
            settings(base.clone()),
            Arc::new(FileKeyValueStore::new(&path)),
        )
        .unwrap();
        client
            .session
            .sign_in(SignInCredentials::new("admin", "secret"))
            .await
            .unwrap();
    }
    assert!(path.exists());

    let client =
        build_client_with_store(settings(base.clone()), Arc::new(FileKeyValueStore::new(&path)))
            .unwrap();
    assert!(client.session.restore().await.unwrap());
    let items: Vec<Value> = client.api().get("/items").await.unwrap();
    assert_eq!(items.len(), 1);

    client.session.sign_out().await.unwrap();
    assert!(!path.exists());
    assert_eq!(client.session.status(), SessionStatus::SignedOut);
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut settings = settings(format!("http://{addr}/api"));
    settings.retry.max_retries = 1;
    let client =
        build_client_with_store(settings, Arc::new(MemoryKeyValueStore::new())).unwrap();

    let err = client
        .session
        .sign_in(SignInCredentials::new("admin", "secret"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
}
