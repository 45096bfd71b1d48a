//! # gateway-affirm
//!
//! Affirm provider implementation for affirm-gateway-rs.
//!
//! - **AffirmChargeClient** implements `ChargeApi` over the Transactions API
//!   (token exchange, capture, void, refund)
//! - **AffirmTracker** implements `TrackerSink` for the partner error tracker
//! - **AffirmConfig** holds the US/CA key pairs and endpoint selection
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gateway_affirm::{AffirmChargeClient, AffirmConfig, AffirmTracker};
//!
//! let config = AffirmConfig::from_env()?.with_sandbox(settings.sandbox);
//! let api = Arc::new(AffirmChargeClient::new(config.clone())?);
//! let sink = Arc::new(AffirmTracker::new(config)?);
//! ```

pub mod client;
pub mod config;
pub mod tracker;

// Re-exports
pub use client::AffirmChargeClient;
pub use config::{AffirmConfig, KeyPair};
pub use tracker::AffirmTracker;
