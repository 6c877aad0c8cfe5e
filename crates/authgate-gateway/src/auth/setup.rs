//! First-run setup.

use authgate_core::Password;

use super::AuthError;
use super::users::{User, UserStore};

/// Env var naming the initial admin.
pub const ENV_ADMIN_USERNAME: &str = "AUTHGATE_ADMIN_USERNAME";
/// Env var holding the initial admin password.
pub const ENV_ADMIN_PASSWORD: &str = "AUTHGATE_ADMIN_PASSWORD";

/// Authorities granted to the seeded admin.
pub const ADMIN_AUTHORITIES: [&str; 2] = ["ROLE_ADMIN", "ROLE_USER"];

/// Auto-setup from environment variables.
///
/// Creates an admin from [`ENV_ADMIN_USERNAME`] and [`ENV_ADMIN_PASSWORD`]
/// if both are set and the store is empty.
///
/// # Errors
///
/// Returns error if user creation fails.
pub fn auto_setup_from_env(user_store: &UserStore) -> Result<Option<User>, AuthError> {
    auto_setup_with(user_store, |key| std::env::var(key).ok())
}

/// Auto-setup reading variables through `lookup`.
///
/// # Errors
///
/// Returns error if user creation fails.
pub fn auto_setup_with<F>(user_store: &UserStore, lookup: F) -> Result<Option<User>, AuthError>
where
    F: Fn(&str) -> Option<String>,
{
    if !user_store.is_empty() {
        return Ok(None);
    }

    let Some(username) = lookup(ENV_ADMIN_USERNAME).filter(|u| !u.trim().is_empty()) else {
        return Ok(None);
    };
    let Some(password) = lookup(ENV_ADMIN_PASSWORD).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };

    let admin = User::new(&username, &Password::new(password), ADMIN_AUTHORITIES)?;
    user_store.create(&admin)?;

    tracing::info!(
        username = %admin.username,
        "Admin user created from environment variables"
    );

    Ok(Some(admin))
}

/// Generate a random password.
#[must_use]
pub fn generate_password(length: usize) -> Password {
    use rand::Rng;
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::thread_rng();

    let password: String = (0..length)
        .map(|_| char::from(CHARSET[rng.gen_range(0..CHARSET.len())]))
        .collect();
    Password::new(password)
}

/// Generate a random hex signing key of `bytes` bytes.
#[must_use]
pub fn generate_signing_key(bytes: usize) -> String {
    use rand::RngCore;
    let mut key = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_auto_setup_creates_admin() {
        let temp_dir = TempDir::new().unwrap();
        let store = UserStore::open(temp_dir.path()).unwrap();

        let admin = auto_setup_with(
            &store,
            env(&[(ENV_ADMIN_USERNAME, "Root"), (ENV_ADMIN_PASSWORD, "s3cret")]),
        )
        .unwrap()
        .unwrap();

        assert_eq!(admin.username, "root");
        assert!(admin.authorities.contains("ROLE_ADMIN"));
        assert!(admin.verify_password(&Password::from("s3cret")));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_auto_setup_skips() {
        let temp_dir = TempDir::new().unwrap();
        let store = UserStore::open(temp_dir.path()).unwrap();

        assert!(auto_setup_with(&store, env(&[(ENV_ADMIN_USERNAME, "root")]))
            .unwrap()
            .is_none());
        assert!(store.is_empty());

        let full = env(&[(ENV_ADMIN_USERNAME, "root"), (ENV_ADMIN_PASSWORD, "pw")]);
        auto_setup_with(&store, &full).unwrap();
        assert!(auto_setup_with(&store, &full).unwrap().is_none());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_generate_password() {
        let a = generate_password(24);
        let b = generate_password(24);
        assert_eq!(a.expose().len(), 24);
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn test_generate_signing_key() {
        let key = generate_signing_key(64);
        assert_eq!(key.len(), 128);
        assert!(hex::decode(&key).is_ok());
    }
}
