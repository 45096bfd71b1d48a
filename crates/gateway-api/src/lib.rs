//! # gateway-api
//!
//! HTTP API layer for affirm-gateway-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Availability and checkout endpoints for the storefront
//! - The provider's checkout return leg
//! - Admin endpoints for capture, void and refund
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/v1/availability` | Eligibility for a cart |
//! | POST | `/api/v1/orders` | Register order (admin) |
//! | GET | `/api/v1/orders/{id}` | Order and charge record (admin) |
//! | POST | `/api/v1/orders/{id}/checkout` | Begin checkout |
//! | POST | `/gateway/affirm` | Checkout return leg |
//! | POST | `/api/v1/orders/{id}/capture` | Capture (admin) |
//! | POST | `/api/v1/orders/{id}/void` | Void (admin) |
//! | POST | `/api/v1/orders/{id}/refund` | Refund (admin) |
//! | GET | `/checkout/order-received/{id}` | Order received page |
//! | GET | `/checkout` | Checkout page |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{load_gateway_settings, AppConfig, AppState};
