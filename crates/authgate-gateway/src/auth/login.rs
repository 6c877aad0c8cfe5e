//! Login flow: credentials in, signed token out.
//!
//! Each request runs the stages once, in order, and keeps no state:
//! `ReceivingRequest -> ParsingCredentials -> VerifyingCredentials ->
//! CheckingAccountState -> IssuingToken`. Token issuance is always last.

use std::sync::Arc;

use axum::Json;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use authgate_core::{Password, UserProfile, normalize_username};

use super::credentials::{CredentialVerifier, ProfileLookup, VerifiedPrincipal};
use super::failure::{AUTHENTICATION_EXCEPTION, FailureHandler, JsonFailureHandler, RequestContext};
use super::jwt::TokenCodec;
use super::AuthError;

/// Stage of a login attempt, recorded on every failure log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// Method check.
    ReceivingRequest,
    /// Body parsing and normalisation.
    ParsingCredentials,
    /// Credential verifier call.
    VerifyingCredentials,
    /// Profile lookup and enabled check.
    CheckingAccountState,
    /// Token encoding.
    IssuingToken,
}

impl std::fmt::Display for LoginStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ReceivingRequest => "receiving_request",
            Self::ParsingCredentials => "parsing_credentials",
            Self::VerifyingCredentials => "verifying_credentials",
            Self::CheckingAccountState => "checking_account_state",
            Self::IssuingToken => "issuing_token",
        };
        f.write_str(name)
    }
}

/// Login request body.
#[derive(Debug, Deserialize)]
#[serde(from = "RawLoginRequest")]
pub struct LoginRequest {
    /// Username, lowercased.
    pub username: String,
    /// Password.
    pub password: Password,
}

#[derive(Deserialize)]
struct RawLoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl From<RawLoginRequest> for LoginRequest {
    fn from(raw: RawLoginRequest) -> Self {
        Self {
            username: normalize_username(&raw.username),
            password: Password::new(raw.password),
        }
    }
}

/// Successful login response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The issued token.
    pub token: String,
}

/// Runs the login flow against its collaborators.
pub struct LoginProcessor {
    codec: Arc<TokenCodec>,
    verifier: Arc<dyn CredentialVerifier>,
    profiles: Arc<dyn ProfileLookup>,
    failure_handler: Arc<dyn FailureHandler>,
}

impl LoginProcessor {
    /// Create a processor using [`JsonFailureHandler`] for failures.
    #[must_use]
    pub fn new(
        codec: Arc<TokenCodec>,
        verifier: Arc<dyn CredentialVerifier>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        Self {
            codec,
            verifier,
            profiles,
            failure_handler: Arc::new(JsonFailureHandler),
        }
    }

    /// Replace the failure handler.
    #[must_use]
    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = handler;
        self
    }

    /// The codec used for issuing tokens.
    #[must_use]
    pub const fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// Handle a login request and build the HTTP response.
    ///
    /// Success answers 200 with [`TokenResponse`]; failures go to the failure handler.
    pub async fn handle(&self, ctx: RequestContext, body: &[u8]) -> Response {
        match self.attempt(&ctx.method, body).await {
            Ok(token) => {
                if let Some(session) = &ctx.session {
                    session.remove(AUTHENTICATION_EXCEPTION).await;
                }
                (StatusCode::OK, Json(TokenResponse { token })).into_response()
            }
            Err(err) => self.failure_handler.on_failure(&ctx, &err).await,
        }
    }

    /// Run every stage and return the issued token.
    ///
    /// # Errors
    ///
    /// Returns the condition that stopped the flow.
    pub async fn attempt(&self, method: &Method, body: &[u8]) -> Result<String, AuthError> {
        tracing::trace!(stage = %LoginStage::ReceivingRequest, "login attempt");
        if method != Method::POST {
            tracing::debug!(
                stage = %LoginStage::ReceivingRequest,
                method = %method,
                "authentication method not supported"
            );
            return Err(AuthError::UnsupportedMethod(method.to_string()));
        }

        let request = Self::parse_credentials(body)?;
        let verified = self.verify_credentials(&request).await?;
        let profile = self.check_account_state(&request.username).await?;
        let token = self.issue_token(profile.as_ref(), &verified)?;

        tracing::info!(username = %request.username, "new token has been issued");
        Ok(token)
    }

    fn parse_credentials(body: &[u8]) -> Result<LoginRequest, AuthError> {
        let request: LoginRequest = serde_json::from_slice(body).map_err(|e| {
            tracing::debug!(
                stage = %LoginStage::ParsingCredentials,
                error = %e,
                "unparseable login body"
            );
            AuthError::MalformedCredentials
        })?;

        if request.username.is_empty() || request.password.is_empty() {
            tracing::debug!(stage = %LoginStage::ParsingCredentials, "empty username or password");
            return Err(AuthError::MissingCredentials);
        }

        tracing::debug!(
            stage = %LoginStage::ParsingCredentials,
            username = %request.username,
            "user login"
        );
        Ok(request)
    }

    async fn verify_credentials(
        &self,
        request: &LoginRequest,
    ) -> Result<VerifiedPrincipal, AuthError> {
        self.verifier
            .verify(&request.username, &request.password)
            .await
            .map_err(|e| {
                tracing::debug!(
                    stage = %LoginStage::VerifyingCredentials,
                    username = %request.username,
                    reason = %e,
                    "credential verification failed"
                );
                AuthError::AuthenticationFailed
            })
    }

    // Runs only after the credentials were accepted. A disabled account is
    // therefore distinguishable by timing, never by message.
    async fn check_account_state(&self, username: &str) -> Result<Option<UserProfile>, AuthError> {
        let profile = self.profiles.lookup(username).await.map_err(|e| {
            tracing::warn!(
                stage = %LoginStage::CheckingAccountState,
                username = %username,
                error = %e,
                "profile lookup failed"
            );
            AuthError::AuthenticationFailed
        })?;

        if profile.as_ref().is_some_and(|p| !p.enabled) {
            tracing::debug!(
                stage = %LoginStage::CheckingAccountState,
                username = %username,
                "account disabled"
            );
            return Err(AuthError::AccountDisabled);
        }

        Ok(profile)
    }

    fn issue_token(
        &self,
        profile: Option<&UserProfile>,
        verified: &VerifiedPrincipal,
    ) -> Result<String, AuthError> {
        self.codec
            .encode_verified(&profile, verified.principal())
            .map_err(|e| {
                tracing::error!(
                    stage = %LoginStage::IssuingToken,
                    username = %verified.principal().username,
                    error = %e,
                    "token encoding failed"
                );
                AuthError::AuthenticationFailed
            })
    }
}

impl std::fmt::Debug for LoginProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginProcessor")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
