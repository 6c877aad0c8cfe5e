//! User model and storage.

use std::collections::BTreeSet;
use std::path::Path;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use authgate_core::{Password, Principal, UserProfile, normalize_username};

use super::AuthError;
use super::credentials::{
    CredentialVerifier, LookupError, ProfileLookup, VerificationError, VerifiedPrincipal,
};

const USERNAME_INDEX: &str = "idx:username:";

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Username for login, always lowercase.
    pub username: String,
    /// Optional email address.
    pub email: Option<String>,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Argon2 password hash.
    pub password_hash: String,
    /// Granted authorities.
    pub authorities: BTreeSet<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user last logged in.
    pub last_login: Option<DateTime<Utc>>,
    /// Whether the account may log in.
    pub enabled: bool,
}

impl User {
    /// Create a new user with the given credentials.
    ///
    /// # Errors
    ///
    /// Returns error if password hashing fails.
    pub fn new<I, A>(username: &str, password: &Password, authorities: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Ok(Self {
            id: format!("user_{}", uuid_v4()),
            username: normalize_username(username),
            email: None,
            display_name: None,
            password_hash: hash_password(password)?,
            authorities: authorities.into_iter().map(Into::into).collect(),
            created_at: Utc::now(),
            last_login: None,
            enabled: true,
        })
    }

    /// Check a password against this user's hash.
    #[must_use]
    pub fn verify_password(&self, password: &Password) -> bool {
        verify_password(password, &self.password_hash)
    }

    /// Replace the password.
    ///
    /// # Errors
    ///
    /// Returns error if password hashing fails.
    pub fn set_password(&mut self, password: &Password) -> Result<(), AuthError> {
        self.password_hash = hash_password(password)?;
        Ok(())
    }

    /// Profile view of this user, as embedded in tokens.
    #[must_use]
    pub fn to_profile(&self) -> UserProfile {
        let mut profile = UserProfile::new(&self.username).enabled(self.enabled);
        profile.email.clone_from(&self.email);
        profile.display_name.clone_from(&self.display_name);
        profile
    }

    /// Principal view of this user.
    #[must_use]
    pub fn to_principal(&self) -> Principal {
        Principal::new(&self.username, self.authorities.iter().cloned())
    }
}

/// User store backed by sled.
#[derive(Clone)]
pub struct UserStore {
    tree: sled::Tree,
}

impl UserStore {
    /// Open or create a user store under `path`.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        let db = sled::open(path.join("users"))
            .map_err(|e| AuthError::Storage(format!("Failed to open user database: {e}")))?;
        Self::with_db(&db)
    }

    /// Create a user store inside an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: &sled::Db) -> Result<Self, AuthError> {
        let tree = db
            .open_tree("users")
            .map_err(|e| AuthError::Storage(format!("Failed to open users tree: {e}")))?;

        Ok(Self { tree })
    }

    /// Check if any users exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Count users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tree
            .iter()
            .keys()
            .filter(|k| k.as_ref().is_ok_and(|k| !k.starts_with(USERNAME_INDEX.as_bytes())))
            .count()
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns error if the username is taken or storage fails.
    pub fn create(&self, user: &User) -> Result<(), AuthError> {
        if self.get_by_username(&user.username)?.is_some() {
            return Err(AuthError::UserExists(user.username.clone()));
        }

        self.put(user)?;

        let index_key = format!("{USERNAME_INDEX}{}", user.username);
        self.tree
            .insert(index_key.as_bytes(), user.id.as_bytes())
            .map_err(|e| AuthError::Storage(format!("Index error: {e}")))?;

        self.flush()?;
        tracing::debug!(username = %user.username, "user created");
        Ok(())
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn get(&self, id: &str) -> Result<Option<User>, AuthError> {
        match self.tree.get(id.as_bytes()) {
            Ok(Some(value)) => serde_json::from_slice(&value)
                .map(Some)
                .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("Get error: {e}"))),
        }
    }

    /// Get a user by username. The lookup is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn get_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let index_key = format!("{USERNAME_INDEX}{}", normalize_username(username));
        match self.tree.get(index_key.as_bytes()) {
            Ok(Some(id_bytes)) => self.get(&String::from_utf8_lossy(&id_bytes)),
            Ok(None) => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("Index lookup error: {e}"))),
        }
    }

    /// Update an existing user. The username cannot change.
    ///
    /// # Errors
    ///
    /// Returns error if the user doesn't exist or storage fails.
    pub fn update(&self, user: &User) -> Result<(), AuthError> {
        if self.get(&user.id)?.is_none() {
            return Err(AuthError::UserNotFound(user.id.clone()));
        }

        self.put(user)?;
        self.flush()
    }

    /// Delete a user by username.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn delete(&self, username: &str) -> Result<bool, AuthError> {
        let Some(user) = self.get_by_username(username)? else {
            return Ok(false);
        };

        let index_key = format!("{USERNAME_INDEX}{}", user.username);
        self.tree
            .remove(index_key.as_bytes())
            .map_err(|e| AuthError::Storage(format!("Index remove error: {e}")))?;
        self.tree
            .remove(user.id.as_bytes())
            .map_err(|e| AuthError::Storage(format!("Delete error: {e}")))?;

        self.flush()?;
        tracing::debug!(username = %user.username, "user deleted");
        Ok(true)
    }

    /// List all users, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn list(&self) -> Result<Vec<User>, AuthError> {
        let mut users = Vec::new();

        for result in self.tree.iter() {
            let (key, value) = result.map_err(|e| AuthError::Storage(format!("Iter error: {e}")))?;

            if key.starts_with(USERNAME_INDEX.as_bytes()) {
                continue;
            }

            let user: User = serde_json::from_slice(&value)
                .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}")))?;
            users.push(user);
        }

        Ok(users)
    }

    /// Enable or disable an account.
    ///
    /// # Errors
    ///
    /// Returns error if the user doesn't exist or storage fails.
    pub fn set_enabled(&self, username: &str, enabled: bool) -> Result<User, AuthError> {
        self.modify(username, |user| {
            user.enabled = enabled;
            Ok(())
        })
    }

    /// Replace a user's password.
    ///
    /// # Errors
    ///
    /// Returns error if the user doesn't exist, hashing fails or storage fails.
    pub fn set_password(&self, username: &str, password: &Password) -> Result<User, AuthError> {
        self.modify(username, |user| user.set_password(password))
    }

    fn modify<F>(&self, username: &str, f: F) -> Result<User, AuthError>
    where
        F: FnOnce(&mut User) -> Result<(), AuthError>,
    {
        let mut user = self
            .get_by_username(username)?
            .ok_or_else(|| AuthError::UserNotFound(normalize_username(username)))?;
        f(&mut user)?;
        self.update(&user)?;
        Ok(user)
    }

    fn put(&self, user: &User) -> Result<(), AuthError> {
        let value = serde_json::to_vec(user)
            .map_err(|e| AuthError::Storage(format!("Serialization error: {e}")))?;

        self.tree
            .insert(user.id.as_bytes(), value)
            .map_err(|e| AuthError::Storage(format!("Insert error: {e}")))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), AuthError> {
        self.tree
            .flush()
            .map(|_| ())
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))
    }
}

impl std::fmt::Debug for UserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStore")
            .field("user_count", &self.count())
            .finish()
    }
}

// Account enablement is left to the login flow, which checks it after
// credentials are accepted.
#[async_trait]
impl CredentialVerifier for UserStore {
    async fn verify(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<VerifiedPrincipal, VerificationError> {
        let mut user = self
            .get_by_username(username)
            .map_err(|e| VerificationError::Backend(e.to_string()))?
            .ok_or(VerificationError::UnknownUser)?;

        if !user.verify_password(password) {
            return Err(VerificationError::BadCredentials);
        }

        user.last_login = Some(Utc::now());
        if let Err(e) = self.update(&user) {
            tracing::warn!(username = %user.username, error = %e, "failed to record last login");
        }

        Ok(VerifiedPrincipal::new(user.to_principal()))
    }
}

#[async_trait]
impl ProfileLookup for UserStore {
    async fn lookup(&self, username: &str) -> Result<Option<UserProfile>, LookupError> {
        self.get_by_username(username)
            .map(|user| user.as_ref().map(User::to_profile))
            .map_err(|e| LookupError::Backend(e.to_string()))
    }
}

/// Hash a password using Argon2id.
fn hash_password(password: &Password) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.expose().as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Config(format!("Password hashing failed: {e}")))
}

/// Verify a password against a stored hash.
fn verify_password(password: &Password, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        tracing::warn!("stored password hash is unreadable");
        return false;
    };

    Argon2::default()
        .verify_password(password.expose().as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random UUID v4.
fn uuid_v4() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);

    // Version 4, RFC 4122 variant
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex = hex::encode(bytes);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
