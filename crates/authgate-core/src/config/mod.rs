//! Configuration loading and validation.
//!
//! Config is JSON5 so operators can comment their files.
//! Config location: `~/.authgate/authgate.json`

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Env var overriding `token.signingKey`.
pub const ENV_SIGNING_KEY: &str = "AUTHGATE_SIGNING_KEY";
/// Env var overriding `token.issuer`.
pub const ENV_TOKEN_ISSUER: &str = "AUTHGATE_TOKEN_ISSUER";
/// Env var overriding `token.expirationMinutes`.
pub const ENV_TOKEN_EXPIRATION: &str = "AUTHGATE_TOKEN_EXPIRATION_MINUTES";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token signing configuration.
    #[serde(default)]
    pub token: TokenConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;

        // The file may hold the signing key
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("authgate.json")
    }

    /// Get the `AuthGate` state directory.
    ///
    /// Uses `AUTHGATE_STATE_DIR` env var if set, otherwise `~/.authgate`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("AUTHGATE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".authgate")
        } else {
            PathBuf::from(".authgate")
        }
    }

    /// Directory holding the user store.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.server
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("data"))
    }

    /// Apply environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable numeric values are ignored with a warning.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_SIGNING_KEY).filter(|k| !k.is_empty()) {
            self.token.signing_key = Some(key);
        }

        if let Some(issuer) = lookup(ENV_TOKEN_ISSUER).filter(|i| !i.is_empty()) {
            self.token.issuer = issuer;
        }

        if let Some(raw) = lookup(ENV_TOKEN_EXPIRATION) {
            match raw.parse::<u32>() {
                Ok(minutes) => self.token.expiration_minutes = minutes,
                Err(e) => {
                    tracing::warn!(
                        value = %raw,
                        error = %e,
                        "ignoring invalid {ENV_TOKEN_EXPIRATION}"
                    );
                }
            }
        }

        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if !self.server.login_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "Login path '{}' must start with '/'",
                self.server.login_path
            )));
        }

        if self.token.issuer.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Token issuer cannot be empty".to_string(),
            ));
        }

        if self.token.expiration_minutes == 0 {
            return Err(ConfigError::Validation(
                "Token expiration must be at least one minute".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the immutable token settings from this config.
    ///
    /// # Errors
    ///
    /// Returns error if no signing key is configured or a value is invalid.
    pub fn token_settings(&self) -> Result<TokenSettings, ConfigError> {
        let key = self
            .token
            .signing_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingField("token.signingKey".to_string()))?;

        TokenSettings::new(
            decode_signing_key(key),
            self.token.issuer.clone(),
            self.token.expiration_minutes,
        )
    }
}

/// Interpret configured key material.
///
/// Hex strings of at least 32 bytes are decoded, anything else is used as raw UTF-8.
#[must_use]
pub fn decode_signing_key(material: &str) -> Vec<u8> {
    match hex::decode(material.trim()) {
        Ok(bytes) if bytes.len() >= 32 => bytes,
        _ => material.as_bytes().to_vec(),
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address mode.
    #[serde(default)]
    pub mode: BindMode,

    /// Path of the login endpoint.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// User store directory override.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            mode: BindMode::default(),
            login_path: default_login_path(),
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Resolve the bind address for the configured mode.
    #[must_use]
    pub fn bind_address(&self) -> String {
        match &self.mode {
            BindMode::Local => "127.0.0.1".to_string(),
            BindMode::Public => "0.0.0.0".to_string(),
            BindMode::Custom(addr) => addr.clone(),
        }
    }
}

const fn default_port() -> u16 {
    8080
}

fn default_login_path() -> String {
    "/api/auth/login".to_string()
}

/// Server bind mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to localhost only.
    #[default]
    Local,
    /// Bind to all interfaces.
    Public,
    /// Custom bind address.
    Custom(String),
}

/// Token signing configuration as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    /// Signing key (hex or raw). Required to serve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,

    /// Issuer stamped into and required from every token.
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Token lifetime in minutes.
    #[serde(default = "default_expiration_minutes")]
    pub expiration_minutes: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            issuer: default_issuer(),
            expiration_minutes: default_expiration_minutes(),
        }
    }
}

fn default_issuer() -> String {
    "authgate".to_string()
}

const fn default_expiration_minutes() -> u32 {
    60
}

/// Immutable token settings shared by every request.
///
/// Built once at startup. The key is never exposed through `Debug`.
pub struct TokenSettings {
    signing_key: SecretBox<[u8]>,
    issuer: String,
    expiration_minutes: u32,
}

impl TokenSettings {
    /// Create token settings.
    ///
    /// # Errors
    ///
    /// Returns error if the key or issuer is empty, or the lifetime is zero.
    pub fn new(
        signing_key: impl Into<Vec<u8>>,
        issuer: impl Into<String>,
        expiration_minutes: u32,
    ) -> Result<Self, ConfigError> {
        let signing_key = signing_key.into();
        let issuer = issuer.into();

        if signing_key.is_empty() {
            return Err(ConfigError::MissingField("token.signingKey".to_string()));
        }
        if issuer.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Token issuer cannot be empty".to_string(),
            ));
        }
        if expiration_minutes == 0 {
            return Err(ConfigError::Validation(
                "Token expiration must be at least one minute".to_string(),
            ));
        }

        Ok(Self {
            signing_key: SecretBox::new(signing_key.into_boxed_slice()),
            issuer,
            expiration_minutes,
        })
    }

    /// Raw key bytes. Only the codec should call this.
    #[must_use]
    pub fn signing_key(&self) -> &[u8] {
        self.signing_key.expose_secret()
    }

    /// Configured issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Token lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(u64::from(self.expiration_minutes) * 60)
    }
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("signing_key", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("expiration_minutes", &self.expiration_minutes)
            .finish()
    }
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}
