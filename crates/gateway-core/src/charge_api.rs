//! # Charge API Trait
//!
//! Contract between the lifecycle and the provider's charge endpoints.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ChargeApi (trait)                      │
//! │  ├── exchange_token()                                       │
//! │  ├── capture()                                              │
//! │  ├── void()                                                 │
//! │  └── refund()                                               │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┴─────────────────┐
//!  ┌───────┴────────────┐             ┌────────┴───────┐
//!  │ AffirmChargeClient │             │ MockChargeApi  │
//!  │  (gateway-affirm)  │             │   (testing)    │
//!  └────────────────────┘             └────────────────┘
//! ```
//!
//! Result shapes distinguish "the provider said no" from "we could not
//! talk to the provider": a decline is `Ok(None)` / `Ok(false)`, while
//! `Err` is reserved for failures on our side.

use crate::error::PaymentResult;
use crate::money::Country;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// What the order expects the authorized charge to look like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedCharge {
    pub order_id: String,
    /// Order total in cents
    pub amount: i64,
}

/// Outcome of exchanging a checkout token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenExchange {
    /// Provider charge the token resolved to
    pub charge_id: String,
    /// Charge belongs to the expected order
    pub validates: bool,
    /// Charge amount equals the expected amount
    pub amount_validation: bool,
    /// Authorized amount in cents
    pub authorized_amount: i64,
}

/// A successful capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResult {
    /// Provider fee for this capture, cents
    pub fee: i64,
    /// Captured amount, cents
    pub captured_amount: i64,
    /// Provider event id
    pub event_id: String,
}

/// A successful refund
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    /// Provider refund id
    pub id: String,
    /// Refunded amount, cents
    pub amount: i64,
    /// Portion of the fee returned to the merchant, cents
    pub fee_refunded: i64,
}

/// Provider charge endpoints.
#[async_trait]
pub trait ChargeApi: Send + Sync {
    /// Exchange a checkout token for an authorized charge.
    ///
    /// Any failure (transport, timeout, provider error) is an `Err`.
    async fn exchange_token(
        &self,
        token: &str,
        country: Country,
        expected: &ExpectedCharge,
    ) -> PaymentResult<TokenExchange>;

    /// Capture `amount` cents of an authorized charge. A retry with the same
    /// `idempotency_key` must not capture twice.
    ///
    /// `Ok(None)` when the provider declined or did not answer.
    async fn capture(
        &self,
        charge_id: &str,
        amount: i64,
        country: Country,
        idempotency_key: &str,
    ) -> PaymentResult<Option<CaptureResult>>;

    /// Void an authorization. `Ok(false)` when the provider declined.
    async fn void(&self, charge_id: &str, country: Country) -> PaymentResult<bool>;

    /// Refund `amount` cents of captured funds. A retry with the same
    /// `idempotency_key` must not refund twice.
    ///
    /// `Ok(None)` when the provider declined or did not answer.
    async fn refund(
        &self,
        charge_id: &str,
        amount: i64,
        country: Country,
        idempotency_key: &str,
    ) -> PaymentResult<Option<RefundResult>>;

    /// Provider name (for logging)
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a shared charge API (dynamic dispatch)
pub type SharedChargeApi = Arc<dyn ChargeApi>;

/// Ledger-changing operations that carry an idempotency key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOperation {
    Capture,
    Refund,
}

impl LedgerOperation {
    fn as_str(self) -> &'static str {
        match self {
            LedgerOperation::Capture => "capture",
            LedgerOperation::Refund => "refund",
        }
    }
}

/// Idempotency key for a capture or refund.
///
/// `ledger_total` is the captured (or refunded) total before the request,
/// so a retry of the same request reuses the key while the next partial
/// capture of an equal amount gets a new one.
pub fn idempotency_key(
    charge_id: &str,
    operation: LedgerOperation,
    amount: i64,
    ledger_total: i64,
) -> String {
    let digest = Sha256::digest(
        format!("{}:{}:{}:{}", charge_id, operation.as_str(), amount, ledger_total).as_bytes(),
    );
    hex::encode(&digest[..16])
}
