//! # Application State
//!
//! Shared state for the Axum application.
//! Holds the charge lifecycle, the checkout flow, the Affirm key/endpoint
//! configuration and the process config.

use gateway_affirm::{AffirmChargeClient, AffirmConfig, AffirmTracker};
use gateway_core::{
    ChargeLifecycle, CheckoutFlow, Environment, ErrorReporter, GatewaySettings,
    InMemoryOrderStore, NonceIssuer, SharedChargeApi, SharedOrderStore, StoreUrls,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Queued error-tracker reports before new ones are dropped
const TRACKER_QUEUE_CAPACITY: usize = 256;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Storefront base URL for return/cancel redirects
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Bearer token for the admin endpoints; admin routes refuse every
    /// request when unset
    pub admin_token: Option<String>,
    /// Secret the checkout nonces are derived from
    pub nonce_secret: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let nonce_secret = match non_empty_var("NONCE_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("NONCE_SECRET not set, using a per-process secret");
                uuid::Uuid::new_v4().simple().to_string()
            }
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            admin_token: non_empty_var("ADMIN_TOKEN"),
            nonce_secret,
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Authorize/capture/void/refund state machine
    pub lifecycle: Arc<ChargeLifecycle>,
    /// Checkout entry and return leg
    pub checkout: Arc<CheckoutFlow>,
    /// Affirm keys and endpoints
    pub affirm: Arc<AffirmConfig>,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Wire the Affirm client, the error-tracker worker and an in-memory
    /// order store. Must run inside the Tokio runtime.
    pub fn new(settings: GatewaySettings) -> anyhow::Result<Self> {
        let config = AppConfig::from_env();

        let affirm = AffirmConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load Affirm keys: {}", e))?
            .with_sandbox(settings.sandbox)
            .with_region(settings.region.country());

        let api = AffirmChargeClient::new(affirm.clone())
            .map_err(|e| anyhow::anyhow!("Failed to initialize Affirm client: {}", e))?;
        let sink = AffirmTracker::new(affirm.clone())
            .map_err(|e| anyhow::anyhow!("Failed to initialize error tracker: {}", e))?;

        // Worker exits once every reporter clone is dropped
        let (reporter, _worker) = ErrorReporter::spawn(
            Arc::new(sink),
            Environment::from_sandbox(settings.sandbox),
            TRACKER_QUEUE_CAPACITY,
            affirm.tracker_timeout,
        );

        Ok(Self::with_parts(
            config,
            affirm,
            Arc::new(api),
            Arc::new(InMemoryOrderStore::new()),
            reporter,
            settings,
        ))
    }

    /// Assemble state from already-built parts
    pub fn with_parts(
        config: AppConfig,
        affirm: AffirmConfig,
        api: SharedChargeApi,
        store: SharedOrderStore,
        reporter: ErrorReporter,
        settings: GatewaySettings,
    ) -> Self {
        let lifecycle = Arc::new(ChargeLifecycle::new(api, store, reporter, settings));
        let checkout = Arc::new(CheckoutFlow::new(
            lifecycle.clone(),
            NonceIssuer::new(&config.nonce_secret),
            StoreUrls::new(&config.base_url),
        ));

        Self {
            lifecycle,
            checkout,
            affirm: Arc::new(affirm),
            config,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        self.lifecycle.settings()
    }

    pub fn store(&self) -> &SharedOrderStore {
        self.lifecycle.store()
    }
}

/// Load gateway settings from `GATEWAY_SETTINGS` or `config/gateway.toml`
pub fn load_gateway_settings() -> anyhow::Result<GatewaySettings> {
    dotenvy::dotenv().ok();

    if let Some(path) = non_empty_var("GATEWAY_SETTINGS") {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?;
        return parse_settings(&content, &path);
    }

    let config_paths = [
        "config/gateway.toml",
        "../config/gateway.toml",
        "../../config/gateway.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            return parse_settings(&content, path);
        }
    }

    tracing::warn!("No gateway settings found, using defaults");
    Ok(GatewaySettings::default())
}

fn parse_settings(content: &str, path: &str) -> anyhow::Result<GatewaySettings> {
    let settings = GatewaySettings::from_toml(content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
    tracing::info!(
        "Loaded gateway settings from {} (sandbox: {}, mode: {:?})",
        path,
        settings.sandbox,
        settings.transaction_mode
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_defaults() {
        // Clear env vars for test
        std::env::remove_var("HOST");
        std::env::remove_var("PORT");
        std::env::remove_var("BASE_URL");

        let config = AppConfig::from_env();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert!(!config.nonce_secret.is_empty());
    }

    #[test]
    fn test_socket_addr() {
        let config = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            environment: "test".to_string(),
            admin_token: None,
            nonce_secret: "secret".to_string(),
        };

        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");

        let bad = AppConfig {
            host: "not a host".to_string(),
            ..config
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn test_parse_settings_reports_path() {
        let err = parse_settings("sandbox = \"maybe\"", "config/gateway.toml").unwrap_err();
        assert!(err.to_string().contains("config/gateway.toml"));

        let settings = parse_settings("transaction_mode = \"auth_only\"", "inline").unwrap();
        assert!(settings.is_auth_only());
    }
}
