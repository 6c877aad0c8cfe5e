//! Serve command - start the login gateway.

use anyhow::{Context, Result};
use authgate_core::config::{BindMode, ENV_SIGNING_KEY};
use authgate_core::{Config, ConfigError};

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
}

/// Apply command-line overrides to the loaded configuration.
fn apply_overrides(mut config: Config, args: ServeArgs) -> Result<Config> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.mode = BindMode::Custom(bind);
    }
    config.validate().context("Invalid server settings")?;
    Ok(config)
}

/// Run the gateway until interrupted.
///
/// # Errors
///
/// Returns error if no signing key is configured or the server fails.
pub async fn run_serve(config: Config, args: ServeArgs) -> Result<()> {
    let config = apply_overrides(config, args)?;

    if let Err(ConfigError::MissingField(field)) = config.token_settings() {
        ui::error(&format!("No signing key configured ({field})"));
        ui::info(&format!(
            "Run 'authgate token secret --write' or set {ENV_SIGNING_KEY}"
        ));
        anyhow::bail!("Cannot start without a signing key");
    }

    ui::header("Starting AuthGate");
    ui::kv(
        "Address",
        &format!("{}:{}", config.server.bind_address(), config.server.port),
    );
    ui::kv("Login path", &config.server.login_path);
    ui::kv("Issuer", &config.token.issuer);
    ui::kv(
        "Token lifetime",
        &format!("{} minutes", config.token.expiration_minutes),
    );
    ui::kv("Data dir", &config.data_dir().display().to_string());
    println!();
    ui::info("Press Ctrl+C to stop");
    println!();

    authgate_gateway::start(&config).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let config = apply_overrides(
            Config::default(),
            ServeArgs {
                port: Some(9000),
                bind: Some("10.0.0.1".to_string()),
            },
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address(), "10.0.0.1");
    }

    #[test]
    fn test_zero_port_rejected() {
        let result = apply_overrides(
            Config::default(),
            ServeArgs {
                port: Some(0),
                bind: None,
            },
        );
        assert!(result.is_err());
    }
}
