//! Credential wrappers that keep secrets out of logs.

use secrecy::{ExposeSecret, SecretBox};

/// A password as received from a login request.
///
/// The inner value is wrapped with `secrecy::SecretBox` so it's never
/// printed in logs or debug output.
pub struct Password(SecretBox<str>);

impl Password {
    /// Wrap a password.
    #[must_use]
    pub fn new(password: String) -> Self {
        Self(SecretBox::new(password.into_boxed_str()))
    }

    /// Expose the secret for verification.
    ///
    /// Use sparingly - only when hashing or comparing.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the password is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

impl std::fmt::Display for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_redaction() {
        let password = Password::from("hunter2");
        assert_eq!(format!("{password:?}"), "Password([REDACTED])");
        assert_eq!(format!("{password}"), "[REDACTED]");
        assert_eq!(password.expose(), "hunter2");
    }

    #[test]
    fn test_empty_password() {
        assert!(Password::from("").is_empty());
        assert!(!Password::from("x").is_empty());
    }
}
