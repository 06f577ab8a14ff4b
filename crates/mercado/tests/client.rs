//! Integration tests for the assembled client stack.
//!
//! These exercise the wiring the facade is responsible for: one
//! identity fetch shared by all consumers, credential attachment on
//! the way out, and the terminal-401 path clearing the session store
//! and firing the application sign-out callback.
//!
//! Each test boots a real `axum` backend on `127.0.0.1:0`.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::json;
use url::Url;

use mercado::prelude::*;
use mercado_auth::{AuthError, unix_now};

// =========================================================================
// Mock identity provider
// =========================================================================

struct MockProvider {
    token: Mutex<String>,
    get_calls: AtomicU32,
    refresh_calls: AtomicU32,
}

impl MockProvider {
    fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(token.to_string()),
            get_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
        }
    }

    fn session(&self) -> Session {
        Session {
            user: UserIdentity::new("user-1"),
            access_token: self.token.lock().unwrap().clone(),
            expires_at: unix_now() + 3_600,
        }
    }
}

impl IdentityProvider for MockProvider {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.session()))
    }

    async fn refresh_session(&self) -> Result<Session, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().unwrap() = "fresh".to_string();
        Ok(self.session())
    }
}

// =========================================================================
// Helpers
// =========================================================================

async fn serve(app: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test server should bind");
    let addr = listener.local_addr().expect("should have local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server runs");
    });
    Url::parse(&format!("http://{addr}")).expect("valid test URL")
}

fn config(api: Url, auth: Url) -> MercadoConfig {
    MercadoConfig::new(api, auth)
}

async fn echo_bearer(headers: HeaderMap) -> axum::Json<serde_json::Value> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    axum::Json(json!({ "authorization": auth }))
}

// =========================================================================
// Wiring
// =========================================================================

#[tokio::test]
async fn test_protected_request_carries_bearer_credential() {
    let app = Router::new().route("/me", get(echo_bearer));
    let base = serve(app).await;
    let provider = Arc::new(MockProvider::with_token("tok-123"));
    let client = MercadoClient::<MockProvider>::builder(config(base.clone(), base)).build(provider);

    let payload = client.send(ApiRequest::get("/me")).await.unwrap();

    assert_eq!(payload["authorization"], json!("Bearer tok-123"));
}

#[tokio::test]
async fn test_two_subscribers_share_one_identity_fetch() {
    let app = Router::new();
    let base = serve(app).await;
    let provider = Arc::new(MockProvider::with_token("tok"));
    let client =
        MercadoClient::<MockProvider>::builder(config(base.clone(), base)).build(Arc::clone(&provider));

    let seen_a: Arc<Mutex<Vec<Snapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_b: Arc<Mutex<Vec<Snapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_a = Arc::clone(&seen_a);
    let sink_b = Arc::clone(&seen_b);
    let _sub_a = client.session().subscribe(move |s| {
        sink_a.lock().unwrap().push(s.clone());
    });
    let _sub_b = client.session().subscribe(move |s| {
        sink_b.lock().unwrap().push(s.clone());
    });
    client.session().ensure_initialized().await;

    assert_eq!(provider.get_calls.load(Ordering::SeqCst), 1);
    let last_a = seen_a.lock().unwrap().last().cloned().unwrap();
    let last_b = seen_b.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last_a, last_b);
    assert!(last_a.session_loaded);
    assert_eq!(last_a.session.unwrap().access_token, "tok");
}

#[tokio::test]
async fn test_refresh_and_replay_end_to_end() {
    let app = Router::new().route(
        "/me",
        get(|headers: HeaderMap| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if auth == "Bearer fresh" {
                axum::Json(json!({ "ok": true })).into_response()
            } else {
                (
                    StatusCode::UNAUTHORIZED,
                    axum::Json(json!({ "detail": "token expired" })),
                )
                    .into_response()
            }
        }),
    );
    let base = serve(app).await;
    let provider = Arc::new(MockProvider::with_token("stale"));
    let client =
        MercadoClient::<MockProvider>::builder(config(base.clone(), base)).build(Arc::clone(&provider));

    let payload = client.send(ApiRequest::get("/me")).await.unwrap();

    assert_eq!(payload, json!({ "ok": true }));
    assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
}

// =========================================================================
// Terminal auth failure
// =========================================================================

#[tokio::test]
async fn test_terminal_401_clears_session_and_fires_sign_out() {
    let app = Router::new().route(
        "/me",
        get(|| async { (StatusCode::UNAUTHORIZED, axum::Json(json!({ "detail": "nope" }))) }),
    );
    let base = serve(app).await;
    let provider = Arc::new(MockProvider::with_token("stale"));
    let redirected = Arc::new(AtomicBool::new(false));
    let redirect_flag = Arc::clone(&redirected);
    let client = MercadoClient::<MockProvider>::builder(config(base.clone(), base))
        .on_sign_out(move || {
            redirect_flag.store(true, Ordering::SeqCst);
        })
        .build(Arc::clone(&provider));

    client.session().ensure_initialized().await;
    assert!(client.session().snapshot().is_authenticated());

    let result = client.send(ApiRequest::get("/me")).await;

    assert!(matches!(result, Err(ApiError::AuthExpired)));
    // Local identity is gone and the application was told to redirect.
    let snapshot = client.session().snapshot();
    assert!(!snapshot.is_authenticated());
    assert!(snapshot.session_loaded);
    assert!(redirected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_auth_endpoint_401_keeps_session_and_stays_put() {
    // A failed login on the identity-linked API must not sign the
    // current user out or bounce them to the login page.
    let auth_app = Router::new().route(
        "/auth/login",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                axum::Json(json!({ "detail": "Invalid credentials" })),
            )
        }),
    );
    let api_base = serve(Router::new()).await;
    let auth_base = serve(auth_app).await;
    let provider = Arc::new(MockProvider::with_token("tok"));
    let redirected = Arc::new(AtomicBool::new(false));
    let redirect_flag = Arc::clone(&redirected);
    let client = MercadoClient::<MockProvider>::builder(config(api_base, auth_base))
        .on_sign_out(move || {
            redirect_flag.store(true, Ordering::SeqCst);
        })
        .build(Arc::clone(&provider));

    client.session().ensure_initialized().await;

    let result = client
        .auth_api()
        .send(ApiRequest::post("/auth/login").public().json(json!({
            "email": "a@b.c",
            "password": "wrong"
        })))
        .await;

    match result {
        Err(ApiError::Api { status: 401, message }) => {
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("expected plain 401, got {other:?}"),
    }
    assert!(client.session().snapshot().is_authenticated());
    assert!(!redirected.load(Ordering::SeqCst));
    assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 0);
}
