//! Gateway server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRef, Request, State},
    response::Response,
    routing::{any, get},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use authgate_core::{Config, TokenSettings, UserProfile};

use crate::GatewayError;
use crate::auth::{
    AuthState, CredentialVerifier, FailureHandler, LoginProcessor, ProfileLookup, RequestContext,
    RequireAuth, Session, TokenCodec, UserStore, setup::auto_setup_from_env,
};

/// Largest login body read before giving up on it.
const MAX_LOGIN_BODY: usize = 16 * 1024;

/// Path of the current-principal endpoint.
pub const ME_PATH: &str = "/api/auth/me";
/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Path of the login endpoint.
    pub login_path: String,
    /// Directory for the user store.
    pub data_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GatewayConfig {
    /// Derive gateway settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.server.port,
            bind_address: config.server.bind_address(),
            login_path: config.server.login_path.clone(),
            data_dir: config.data_dir(),
        }
    }
}

/// State shared across handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Bearer token authentication.
    pub auth: Arc<AuthState>,
    /// Login flow.
    pub login: Arc<LoginProcessor>,
}

impl FromRef<GatewayState> for Arc<AuthState> {
    fn from_ref(state: &GatewayState) -> Self {
        state.auth.clone()
    }
}

/// Gateway server.
pub struct Gateway {
    config: GatewayConfig,
    state: GatewayState,
}

/// Builder for constructing a Gateway with its dependencies.
pub struct GatewayBuilder {
    config: GatewayConfig,
    token_settings: Option<TokenSettings>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    profiles: Option<Arc<dyn ProfileLookup>>,
    failure_handler: Option<Arc<dyn FailureHandler>>,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            token_settings: None,
            verifier: None,
            profiles: None,
            failure_handler: None,
        }
    }

    /// Set gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set token settings. Required.
    #[must_use]
    pub fn with_token_settings(mut self, settings: TokenSettings) -> Self {
        self.token_settings = Some(settings);
        self
    }

    /// Set the credential verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Set the profile lookup.
    #[must_use]
    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileLookup>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Use a user store as both verifier and profile lookup.
    #[must_use]
    pub fn with_user_store(self, store: UserStore) -> Self {
        let store = Arc::new(store);
        self.with_verifier(store.clone()).with_profiles(store)
    }

    /// Replace the login failure handler.
    #[must_use]
    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    /// Build the gateway.
    ///
    /// Opens the user store under the data directory for any collaborator
    /// not supplied.
    ///
    /// # Errors
    ///
    /// Returns error if token settings are missing, the login path clashes
    /// with another route, or the user store cannot be opened.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let settings = self
            .token_settings
            .ok_or_else(|| GatewayError::Config("Token settings are required".to_string()))?;

        let login_path = &self.config.login_path;
        if !login_path.starts_with('/') || login_path == ME_PATH || login_path == HEALTH_PATH {
            return Err(GatewayError::Config(format!(
                "Invalid login path: {login_path}"
            )));
        }

        let (verifier, profiles) = match (self.verifier, self.profiles) {
            (Some(verifier), Some(profiles)) => (verifier, profiles),
            (verifier, profiles) => {
                let store = Arc::new(open_user_store(&self.config.data_dir)?);
                let store_verifier: Arc<dyn CredentialVerifier> = store.clone();
                let store_profiles: Arc<dyn ProfileLookup> = store;
                (
                    verifier.unwrap_or(store_verifier),
                    profiles.unwrap_or(store_profiles),
                )
            }
        };

        let codec = Arc::new(TokenCodec::new(&settings));
        let mut login = LoginProcessor::new(codec.clone(), verifier, profiles);
        if let Some(handler) = self.failure_handler {
            login = login.with_failure_handler(handler);
        }

        Ok(Gateway {
            config: self.config,
            state: GatewayState {
                auth: Arc::new(AuthState::new(codec)),
                login: Arc::new(login),
            },
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn open_user_store(data_dir: &std::path::Path) -> Result<UserStore, GatewayError> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| GatewayError::Config(format!("Failed to create data dir: {e}")))?;

    let store = UserStore::open(data_dir)
        .map_err(|e| GatewayError::Config(format!("User store init failed: {e}")))?;

    if let Err(e) = auto_setup_from_env(&store) {
        tracing::warn!("Auto-setup from env failed: {}", e);
    }
    if store.is_empty() {
        tracing::warn!("No users configured; create one with `authgate user create`");
    }

    Ok(store)
}

impl Gateway {
    /// Create a gateway from loaded configuration with the default user store.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration has no signing key or the store cannot be opened.
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let settings = config
            .token_settings()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        GatewayBuilder::new()
            .with_config(GatewayConfig::from_config(config))
            .with_token_settings(settings)
            .build()
    }

    /// Gateway configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.login_path, any(login_handler))
            .route(ME_PATH, get(me_handler))
            .route(HEALTH_PATH, get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the gateway server until interrupted.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            login_path = %self.config.login_path,
            "Gateway listening on http://{}",
            addr
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn login_handler(State(state): State<GatewayState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let ctx = RequestContext {
        method: parts.method,
        path: parts.uri.path().to_string(),
        session: parts.extensions.get::<Session>().cloned(),
    };

    // An unreadable body is treated as empty and fails credential parsing
    let body = axum::body::to_bytes(body, MAX_LOGIN_BODY)
        .await
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "failed to read login body");
            Bytes::new()
        });

    state.login.handle(ctx, &body).await
}

/// Body of the current-principal endpoint.
#[derive(Debug, Serialize)]
struct MeResponse {
    username: String,
    authorities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<UserProfile>,
}

async fn me_handler(auth: RequireAuth) -> Json<MeResponse> {
    let principal = auth.principal;
    Json(MeResponse {
        username: principal.username,
        authorities: principal.authorities.into_iter().collect(),
        profile: principal.profile,
    })
}
