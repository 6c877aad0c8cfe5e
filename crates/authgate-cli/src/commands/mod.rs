//! CLI command implementations.

pub mod serve;
pub mod token;
pub mod user;

pub use serve::run_serve;
pub use token::run_token;
pub use user::run_user;

use std::path::Path;

use anyhow::Context;
use authgate_core::Config;

/// Load configuration from `path` or the default location, then apply env overrides.
///
/// A missing default file yields defaults; a missing explicit file is an error.
///
/// # Errors
///
/// Returns error if the file cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default().context("Failed to load default config")?,
    };

    let config = config.with_env_overrides();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_explicit_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("authgate.json");
        std::fs::write(
            &path,
            "{ server: { port: 9090 }, token: { issuer: 'it', expirationMinutes: 5 } }",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.token.expiration_minutes, 5);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.json"))).is_err());
    }
}
