//! Identity types shared by the codec and the login flow.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Normalise a username the way login ingress does.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.to_lowercase()
}

/// An authenticated identity plus its authority set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Username (the token subject).
    pub username: String,
    /// Opaque role/scope identifiers.
    pub authorities: BTreeSet<String>,
    /// Denormalised profile snapshot, when one was looked up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<UserProfile>,
}

impl Principal {
    /// Create a principal without a profile.
    #[must_use]
    pub fn new<I, A>(username: impl Into<String>, authorities: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            username: username.into(),
            authorities: authorities.into_iter().map(Into::into).collect(),
            profile: None,
        }
    }

    /// Attach a profile snapshot.
    #[must_use]
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Check whether the principal holds an authority.
    #[must_use]
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }
}

/// User profile as returned by profile lookup.
///
/// Embedded verbatim in issued tokens for client-side display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Username.
    pub username: String,
    /// Whether the account may log in.
    pub enabled: bool,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Any further attributes the profile source provides.
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Create an enabled profile with no optional fields.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            enabled: true,
            email: None,
            display_name: None,
            attributes: serde_json::Map::new(),
        }
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
