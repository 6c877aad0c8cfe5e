//! Login failure handling and request-scoped session attributes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use tokio::sync::RwLock;

use super::AuthError;

/// Session attribute holding the last authentication failure message.
pub const AUTHENTICATION_EXCEPTION: &str = "authgate.authentication_exception";

/// Session attributes attached to a request by an outer session layer.
///
/// The gateway never creates sessions; it only reads one if present
/// in the request extensions.
#[derive(Debug, Clone, Default)]
pub struct Session {
    attributes: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an attribute.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.attributes.read().await.get(key).cloned()
    }

    /// Set an attribute.
    pub async fn insert(&self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.write().await.insert(key.into(), value);
    }

    /// Remove an attribute, returning it.
    pub async fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.attributes.write().await.remove(key)
    }
}

/// What a failure handler knows about the failed request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Session, if the request carries one.
    pub session: Option<Session>,
}

/// Shapes the response for a failed login.
#[async_trait]
pub trait FailureHandler: Send + Sync {
    /// Build the response for `error`.
    async fn on_failure(&self, ctx: &RequestContext, error: &AuthError) -> Response;
}

/// Default handler: JSON error body, 401 (405 for wrong method).
///
/// Records the failure message in the session so a later success can clear it.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFailureHandler;

#[async_trait]
impl FailureHandler for JsonFailureHandler {
    async fn on_failure(&self, ctx: &RequestContext, error: &AuthError) -> Response {
        if let Some(session) = &ctx.session {
            session
                .insert(
                    AUTHENTICATION_EXCEPTION,
                    serde_json::Value::String(error.to_string()),
                )
                .await;
        }

        error.clone().into_response()
    }
}
