//! # gateway-core
//!
//! Core types and the charge lifecycle for the Affirm installment gateway.
//!
//! This crate provides:
//! - `ChargeLifecycle`, the authorize/capture/void/refund state machine
//! - `ChargeRecord` and `ChargeLedger`, the typed per-order charge state
//! - `ChargeApi` trait for the provider's charge endpoints
//! - `CheckoutFlow` for the nonce-guarded checkout return leg
//! - `ErrorReporter` for background error-tracker delivery
//! - Availability checks and `GatewaySettings`
//! - `PaymentError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use gateway_core::{ChargeLifecycle, ErrorReporter, GatewaySettings, InMemoryOrderStore};
//!
//! let lifecycle = ChargeLifecycle::new(api, store, reporter, GatewaySettings::default());
//!
//! // Provider returned a checkout token for order 1001
//! lifecycle.authorize("1001", &checkout_token).await?;
//!
//! // Later, from the admin side
//! lifecycle.capture("1001", Some(4000)).await?;
//! lifecycle.refund("1001", None, "returned").await?;
//! ```

pub mod charge_api;
pub mod checkout;
pub mod eligibility;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod order;
pub mod record;
pub mod settings;
pub mod store;
pub mod tracker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Gateway id used to namespace order metadata
pub const GATEWAY_ID: &str = "affirm";

// Re-exports for convenience
pub use charge_api::{
    idempotency_key, CaptureResult, ChargeApi, ExpectedCharge, LedgerOperation, RefundResult,
    SharedChargeApi, TokenExchange,
};
pub use checkout::{CheckoutFlow, CheckoutRedirect, CheckoutReturn, CompleteCheckout, NonceIssuer};
pub use eligibility::{check_availability, is_available, Unavailable, AVAILABLE_COUNTRIES};
pub use error::{PaymentError, PaymentResult};
pub use ledger::ChargeLedger;
pub use lifecycle::{AuthorizeOutcome, ChargeLifecycle, RefundOutcome};
pub use money::{Country, Currency, Money};
pub use order::{Order, OrderNote, OrderStatus};
pub use record::{constant_time_eq, ChargeRecord, ChargeState};
pub use settings::{
    CancelDestination, CheckoutMode, GatewaySettings, Region, StoreUrls, TransactionMode,
};
pub use store::{InMemoryOrderStore, OrderLockGuard, OrderLocks, OrderStore, SharedOrderStore};
pub use tracker::{
    Environment, ErrorKind, ErrorReport, ErrorReporter, StackFrame, TrackerSink, TransactionStep,
};
