//! Token utilities: decode with the configured settings, generate signing keys.

use std::path::Path;

use anyhow::{Context, Result};
use authgate_core::Config;
use authgate_core::config::ENV_SIGNING_KEY;
use authgate_gateway::auth::{Claims, TokenCodec, TokenError, setup::generate_signing_key};
use chrono::{DateTime, Utc};

use crate::ui;

/// Token actions.
pub enum TokenAction {
    /// Decode and validate a token.
    Decode { token: String },
    /// Generate a signing key, optionally storing it.
    Secret { bytes: usize, write: bool },
}

/// Run a token command.
///
/// # Errors
///
/// Returns error if the token is rejected or the config cannot be written.
pub fn run_token(config: Config, config_path: &Path, action: TokenAction) -> Result<()> {
    match action {
        TokenAction::Decode { token } => decode_token(&config, token.trim()),
        TokenAction::Secret { bytes, write } => secret(config_path, bytes, write),
    }
}

fn decode_token(config: &Config, token: &str) -> Result<()> {
    let settings = config
        .token_settings()
        .context("Cannot decode without a signing key")?;
    let codec = TokenCodec::new(&settings);

    match codec.decode_claims_at(token, Utc::now()) {
        Ok(claims) => {
            print_claims(&claims)?;
            Ok(())
        }
        Err(err) => {
            ui::error(describe(&err));
            Err(err.into())
        }
    }
}

fn describe(err: &TokenError) -> &'static str {
    match err {
        TokenError::ExpiredOrMalformed(_) => "Token is expired or malformed",
        TokenError::Invalid(_) => "Token is invalid (signature or issuer mismatch)",
        TokenError::MissingUsername | TokenError::MissingAuthorities | TokenError::Encoding(_) => {
            "Token could not be processed"
        }
    }
}

fn format_timestamp(seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map_or_else(|| seconds.to_string(), |t| t.to_rfc3339())
}

fn print_claims(claims: &Claims) -> Result<()> {
    ui::success("Token is valid");
    ui::kv("Subject", &claims.sub);
    ui::kv("Issuer", &claims.iss);
    ui::kv("Authorities", &claims.scopes.join(", "));
    ui::kv("Issued at", &format_timestamp(claims.iat));
    ui::kv("Expires at", &format_timestamp(claims.exp));

    if !claims.user.is_null() {
        ui::header("Profile");
        println!("{}", serde_json::to_string_pretty(&claims.user)?);
    }

    Ok(())
}

/// Read the config file as stored, without env overrides.
fn load_stored(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        Config::load(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))
    } else {
        Ok(Config::default())
    }
}

fn secret(config_path: &Path, bytes: usize, write: bool) -> Result<()> {
    if bytes < 32 {
        anyhow::bail!("Signing keys must be at least 32 bytes");
    }

    let key = generate_signing_key(bytes);

    if write {
        let mut config = load_stored(config_path)?;
        config.token.signing_key = Some(key);
        config
            .save(config_path)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        ui::success(&format!(
            "Signing key stored in {}",
            config_path.display()
        ));
    } else {
        println!("{key}");
        ui::info(&format!(
            "Store it as token.signingKey or export {ENV_SIGNING_KEY}"
        ));
    }

    Ok(())
}
