//! Collaborators consulted by the login flow.

use async_trait::async_trait;
use thiserror::Error;

use authgate_core::{Password, Principal, UserProfile};

/// A principal whose credentials were checked by a [`CredentialVerifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPrincipal(Principal);

impl VerifiedPrincipal {
    /// Mark a principal as verified.
    #[must_use]
    pub const fn new(principal: Principal) -> Self {
        Self(principal)
    }

    /// The verified principal.
    #[must_use]
    pub const fn principal(&self) -> &Principal {
        &self.0
    }
}

/// Why a credential check failed.
///
/// Never shown to the caller; the login flow collapses all of these.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// No such user.
    #[error("Unknown user")]
    UnknownUser,

    /// Password did not match.
    #[error("Bad credentials")]
    BadCredentials,

    /// Account locked by the credential store.
    #[error("Account locked")]
    Locked,

    /// Credential store failed.
    #[error("Credential backend error: {0}")]
    Backend(String),
}

/// Profile lookup failure.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Profile store failed.
    #[error("Profile backend error: {0}")]
    Backend(String),
}

/// Checks a username/password pair.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify credentials and return the principal with its authorities.
    async fn verify(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<VerifiedPrincipal, VerificationError>;
}

/// Looks up user profiles by normalised username.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    /// Fetch the profile, `None` if the user has none.
    async fn lookup(&self, username: &str) -> Result<Option<UserProfile>, LookupError>;
}
