//! # Authgate Gateway
//!
//! HTTP login endpoint issuing signed bearer tokens, plus the token codec
//! and extractors protected routes use to validate them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
mod server;

pub use auth::{AuthError, AuthState, LoginProcessor, TokenCodec, TokenError, User, UserStore};
pub use server::{Gateway, GatewayBuilder, GatewayConfig, GatewayState, HEALTH_PATH, ME_PATH};

/// Start the gateway server from loaded configuration.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: &authgate_core::Config) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
