//! Authentication for the gateway.
//!
//! This module provides:
//! - JWT token encoding and validation
//! - The login flow and its collaborator traits
//! - Failure response shaping
//! - A sled-backed user store implementing the collaborators
//! - Bearer token extraction for protected routes

mod credentials;
mod failure;
mod jwt;
mod login;
mod middleware;
/// First-run setup helpers.
pub mod setup;
mod users;

pub use credentials::{
    CredentialVerifier, LookupError, ProfileLookup, VerificationError, VerifiedPrincipal,
};
pub use failure::{
    AUTHENTICATION_EXCEPTION, FailureHandler, JsonFailureHandler, RequestContext, Session,
};
pub use jwt::{ALGORITHM, CLAIM_AUTHORITIES, CLAIM_USER, Claims, TokenCodec, TokenError};
pub use login::{LoginProcessor, LoginRequest, LoginStage, TokenResponse};
pub use middleware::{AuthState, RequireAuth};
pub use users::{User, UserStore};

use thiserror::Error;

/// Authentication errors.
///
/// Login conditions are deliberately coarse: every credential problem
/// surfaces as [`AuthError::AuthenticationFailed`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Login endpoint called with a method other than POST.
    #[error("Authentication method not supported: {0}")]
    UnsupportedMethod(String),

    /// Login body is not a credential object.
    #[error("Username or password not provided")]
    MalformedCredentials,

    /// Username or password is empty.
    #[error("Username or password not provided")]
    MissingCredentials,

    /// Credentials rejected, for whatever reason.
    #[error("Invalid username or password")]
    AuthenticationFailed,

    /// Credentials were valid but the account is disabled.
    #[error("User account has been disabled")]
    AccountDisabled,

    /// No bearer token on a protected request.
    #[error("Authorization header missing or malformed")]
    MissingToken,

    /// Bearer token expired or unparseable.
    #[error("Token expired or malformed")]
    TokenExpired,

    /// Bearer token signature or issuer mismatch.
    #[error("Invalid token")]
    TokenInvalid,

    /// Permission denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// User not found.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// User already exists.
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl AuthError {
    /// Stable machine-readable code for response bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedMethod(_) => "method_not_supported",
            Self::MalformedCredentials | Self::MissingCredentials => "missing_credentials",
            Self::AuthenticationFailed => "invalid_credentials",
            Self::AccountDisabled => "account_disabled",
            Self::MissingToken => "missing_token",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "invalid_token",
            Self::PermissionDenied(_) => "permission_denied",
            Self::UserNotFound(_) => "user_not_found",
            Self::UserExists(_) => "user_exists",
            Self::Storage(_) | Self::Config(_) => "internal_error",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::ExpiredOrMalformed(_) => Self::TokenExpired,
            TokenError::Invalid(_) => Self::TokenInvalid,
            TokenError::MissingUsername
            | TokenError::MissingAuthorities
            | TokenError::Encoding(_) => Self::AuthenticationFailed,
        }
    }
}
