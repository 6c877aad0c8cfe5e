//! Authentication middleware for axum.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;

use authgate_core::{Principal, UserProfile};

use super::AuthError;
use super::jwt::TokenCodec;

/// Shared state for bearer-token authentication.
pub struct AuthState {
    /// Codec validating bearer tokens.
    pub codec: Arc<TokenCodec>,
}

impl AuthState {
    /// Create auth state around a codec.
    #[must_use]
    pub const fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Validate a bearer token and return its principal.
    ///
    /// The embedded profile is attached when it parses as a [`UserProfile`].
    ///
    /// # Errors
    ///
    /// Returns `TokenExpired` or `TokenInvalid`.
    pub fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.codec.decode_claims_at(token, Utc::now())?;
        let profile = serde_json::from_value::<UserProfile>(claims.user).ok();

        let principal = Principal::new(claims.sub, claims.scopes);
        Ok(match profile {
            Some(profile) => principal.with_profile(profile),
            None => principal,
        })
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("issuer", &self.codec.issuer())
            .finish_non_exhaustive()
    }
}

/// Extractor for authenticated requests.
///
/// Use this in handler parameters to require a valid bearer token.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    /// The authenticated principal.
    pub principal: Principal,
}

impl RequireAuth {
    /// Get the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.principal.username
    }

    /// Check for an authority.
    #[must_use]
    pub fn has_authority(&self, authority: &str) -> bool {
        self.principal.has_authority(authority)
    }

    /// Require an authority.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if the principal lacks it.
    pub fn require_authority(&self, authority: &str) -> Result<(), AuthError> {
        if self.has_authority(authority) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(format!(
                "{authority} authority required"
            )))
        }
    }
}

/// Error response for auth failures.
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::UserExists(_) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MalformedCredentials
            | Self::MissingCredentials
            | Self::AuthenticationFailed
            | Self::AccountDisabled
            | Self::MissingToken
            | Self::TokenExpired
            | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
        };

        let body = AuthErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = Arc::<AuthState>::from_ref(state);
        extract_auth(parts, &auth_state).map_err(IntoResponse::into_response)
    }
}

fn extract_auth(parts: &Parts, auth_state: &AuthState) -> Result<RequireAuth, AuthError> {
    let token = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(TokenCodec::extract_from_header)
        .ok_or(AuthError::MissingToken)?;

    let principal = auth_state.authenticate(token).inspect_err(|e| {
        tracing::debug!(path = %parts.uri.path(), error = %e, "bearer token rejected");
    })?;

    Ok(RequireAuth { principal })
}
