//! End-to-end login and bearer authentication through the HTTP router.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use authgate_core::{Password, TokenSettings};
use authgate_gateway::auth::{
    AUTHENTICATION_EXCEPTION, CredentialVerifier, Session, VerificationError, VerifiedPrincipal,
};
use authgate_gateway::{Gateway, GatewayBuilder, GatewayConfig, TokenCodec, User, UserStore};

const LOGIN: &str = "/api/auth/login";

struct CountingVerifier {
    inner: UserStore,
    calls: AtomicUsize,
}

#[async_trait]
impl CredentialVerifier for CountingVerifier {
    async fn verify(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<VerifiedPrincipal, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(username, password).await
    }
}

struct Fixture {
    _dir: TempDir,
    gateway: Gateway,
    verifier: Arc<CountingVerifier>,
    settings: TokenSettings,
}

fn settings() -> TokenSettings {
    TokenSettings::new(b"integration-signing-key".to_vec(), "authgate-it", 15).unwrap()
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = UserStore::open(dir.path()).unwrap();

    let alice = User::new("alice", &Password::from("pw1"), ["ROLE_USER"]).unwrap();
    store.create(&alice).unwrap();
    let bob = User::new("bob", &Password::from("pw2"), ["ROLE_USER"]).unwrap();
    store.create(&bob).unwrap();
    store.set_enabled("bob", false).unwrap();

    let verifier = Arc::new(CountingVerifier {
        inner: store.clone(),
        calls: AtomicUsize::new(0),
    });

    let config = GatewayConfig {
        data_dir: dir.path().to_path_buf(),
        ..GatewayConfig::default()
    };

    let gateway = GatewayBuilder::new()
        .with_config(config)
        .with_token_settings(settings())
        .with_verifier(verifier.clone())
        .with_profiles(Arc::new(store))
        .build()
        .unwrap();

    Fixture {
        _dir: dir,
        gateway,
        verifier,
        settings: settings(),
    }
}

fn login_request(method: Method, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(LOGIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn login_issues_token_for_normalised_username() {
    let fx = fixture();

    let response = fx
        .gateway
        .router()
        .oneshot(login_request(
            Method::POST,
            &json!({ "username": "ALICE", "password": "pw1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let token = body["token"].as_str().unwrap();

    let principal = TokenCodec::new(&fx.settings).decode(token).unwrap();
    assert_eq!(principal.username, "alice");
    assert_eq!(
        principal.authorities.into_iter().collect::<Vec<_>>(),
        vec!["ROLE_USER".to_string()]
    );
}

#[tokio::test]
async fn failures_share_one_response_shape() {
    let fx = fixture();

    let wrong_password = fx
        .gateway
        .router()
        .oneshot(login_request(
            Method::POST,
            &json!({ "username": "alice", "password": "nope" }),
        ))
        .await
        .unwrap();
    let unknown_user = fx
        .gateway
        .router()
        .oneshot(login_request(
            Method::POST,
            &json!({ "username": "mallory", "password": "pw1" }),
        ))
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(wrong_password).await, json_body(unknown_user).await);
}

#[tokio::test]
async fn surrounding_whitespace_is_not_stripped() {
    let fx = fixture();

    let response = fx
        .gateway
        .router()
        .oneshot(login_request(
            Method::POST,
            &json!({ "username": " Alice ", "password": "pw1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "invalid_credentials");
}

#[tokio::test]
async fn disabled_account_is_rejected_after_verification() {
    let fx = fixture();

    let response = fx
        .gateway
        .router()
        .oneshot(login_request(
            Method::POST,
            &json!({ "username": "bob", "password": "pw2" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "account_disabled");
    assert_eq!(fx.verifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn get_is_rejected_before_verification() {
    let fx = fixture();

    let response = fx
        .gateway
        .router()
        .oneshot(login_request(
            Method::GET,
            &json!({ "username": "alice", "password": "pw1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "method_not_supported");
    assert_eq!(fx.verifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_body_is_missing_credentials() {
    let fx = fixture();

    let response = fx
        .gateway
        .router()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(LOGIN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], "missing_credentials");
    assert_eq!(fx.verifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn success_clears_session_failure_marker() {
    let fx = fixture();
    let session = Session::new();

    let mut failed = login_request(
        Method::POST,
        &json!({ "username": "alice", "password": "nope" }),
    );
    failed.extensions_mut().insert(session.clone());
    fx.gateway.router().oneshot(failed).await.unwrap();
    assert_eq!(
        session.get(AUTHENTICATION_EXCEPTION).await,
        Some(json!("Invalid username or password"))
    );

    let mut ok = login_request(
        Method::POST,
        &json!({ "username": "alice", "password": "pw1" }),
    );
    ok.extensions_mut().insert(session.clone());
    let response = fx.gateway.router().oneshot(ok).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(session.get(AUTHENTICATION_EXCEPTION).await, None);
}

#[tokio::test]
async fn bearer_token_reaches_protected_route() {
    let fx = fixture();

    let response = fx
        .gateway
        .router()
        .oneshot(login_request(
            Method::POST,
            &json!({ "username": "alice", "password": "pw1" }),
        ))
        .await
        .unwrap();
    let token = json_body(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let me = fx
        .gateway
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(me.status(), StatusCode::OK);
    let body = json_body(me).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["authorities"], json!(["ROLE_USER"]));
    assert_eq!(body["profile"]["enabled"], true);
}

#[tokio::test]
async fn protected_route_rejects_bad_tokens() {
    let fx = fixture();
    let router = fx.gateway.router();

    let missing = router
        .clone()
        .oneshot(Request::builder().uri("/api/auth/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(missing).await["code"], "missing_token");

    let other_issuer = TokenSettings::new(b"integration-signing-key".to_vec(), "someone-else", 15)
        .unwrap();
    let foreign = TokenCodec::new(&other_issuer)
        .encode(&(), &authgate_core::Principal::new("alice", ["ROLE_USER"]))
        .unwrap();

    let invalid = router
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {foreign}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(invalid).await["code"], "invalid_token");
}

#[tokio::test]
async fn health_endpoint() {
    let fx = fixture();

    let response = fx
        .gateway
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
