//! # Affirm Gateway
//!
//! Installment checkout gateway for Affirm.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export AFFIRM_PUBLIC_KEY=...
//! export AFFIRM_PRIVATE_KEY=...
//! export ADMIN_TOKEN=...
//! export NONCE_SECRET=...
//!
//! # Run the server
//! affirm-gateway
//! ```

use gateway_api::{load_gateway_settings, routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_gateway_settings()?;

    // Initialize logging
    let default_level = if settings.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    // Print banner
    print_banner();

    // Initialize application state
    let state = AppState::new(settings)?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!(
        "Affirm: {} ({:?})",
        if state.settings().sandbox { "sandbox" } else { "live" },
        state.settings().transaction_mode
    );
    if state.config.admin_token.is_none() {
        info!("ADMIN_TOKEN not set, admin endpoints are disabled");
    }

    // Create router
    let app = routes::create_router(state);

    // Start server
    info!("Affirm gateway starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Checkout: POST http://{}/api/v1/orders/{{id}}/checkout", addr);
        info!("Return leg: POST http://{}/gateway/affirm", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  Affirm Gateway RS
  ━━━━━━━━━━━━━━━━━━━━━━━
  Installment checkout gateway
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
