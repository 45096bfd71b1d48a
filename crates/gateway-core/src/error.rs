//! # Payment Error Types
//!
//! Typed error handling for the charge lifecycle.
//! All gateway operations return `Result<T, PaymentError>`.

use crate::tracker::ErrorKind;
use thiserror::Error;

/// Core error type for all gateway operations
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Configuration errors (missing keys, invalid settings)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Order not present in the order store
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: String },

    /// Checkout token could not be exchanged for a charge
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The charge the token resolved to belongs to a different order
    #[error("Order mismatch for checkout token on order {order_id}")]
    OrderMismatch { order_id: String },

    /// Authorized amount differs from the order total
    #[error("Amount mismatch on order {order_id}")]
    AmountMismatch { order_id: String },

    /// The order was already paid or cancelled by another path
    #[error("Order {order_id} no longer needs payment")]
    AlreadyPaid { order_id: String },

    /// Provider declined (or did not answer) a capture
    #[error("Capture of {amount} cents declined for charge {charge_id}")]
    CaptureDeclined { charge_id: String, amount: i64 },

    /// Provider declined a void
    #[error("Void declined for charge {charge_id}")]
    VoidFailed { charge_id: String },

    /// Provider declined a refund (or the auth-only void standing in for one)
    #[error("Refund failed: {reason}")]
    RefundFailed { reason: String },

    /// Neither authorized nor captured
    #[error("Order {order_id} is not refundable")]
    NotRefundable { order_id: String },

    /// Partial refund attempted while only authorized
    #[error("Cannot partially refund order {order_id} before it has been captured")]
    PartialRefundOnUncapturedOrder { order_id: String },

    /// Partial capture attempted on a charge authorized without it
    #[error("Partial capture is not enabled for order {order_id}")]
    PartialCaptureDisabled { order_id: String },

    /// Operation not legal from the record's current state
    #[error("Cannot {action} a charge in state {state}")]
    InvalidTransition { action: &'static str, state: String },

    /// Amount outside the range the ledger allows
    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    /// Another writer saved the order first
    #[error("Order {order_id} was modified concurrently")]
    ConcurrentModification { order_id: String },

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    ProviderError { provider: String, message: String },

    /// Network/HTTP error communicating with provider
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PaymentError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::NetworkError(_)
                | PaymentError::TokenExchange(_)
                | PaymentError::CaptureDeclined { .. }
                | PaymentError::VoidFailed { .. }
                | PaymentError::ConcurrentModification { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Configuration(_) => 500,
            PaymentError::InvalidRequest(_) => 400,
            PaymentError::OrderNotFound { .. } => 404,
            PaymentError::TokenExchange(_) => 502,
            PaymentError::OrderMismatch { .. } => 409,
            PaymentError::AmountMismatch { .. } => 409,
            PaymentError::AlreadyPaid { .. } => 409,
            PaymentError::CaptureDeclined { .. } => 402,
            PaymentError::VoidFailed { .. } => 402,
            PaymentError::RefundFailed { .. } => 402,
            PaymentError::NotRefundable { .. } => 422,
            PaymentError::PartialRefundOnUncapturedOrder { .. } => 422,
            PaymentError::PartialCaptureDisabled { .. } => 422,
            PaymentError::InvalidTransition { .. } => 409,
            PaymentError::InvalidAmount { .. } => 400,
            PaymentError::ConcurrentModification { .. } => 409,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::NetworkError(_) => 503,
            PaymentError::Internal(_) => 500,
            PaymentError::Serialization(_) => 500,
        }
    }

    /// Shopper-facing message. Never carries provider detail.
    pub fn customer_message(&self) -> &'static str {
        match self {
            PaymentError::OrderNotFound { .. } => {
                "Sorry, but that order is not available. Please try checking out again."
            }
            PaymentError::InvalidRequest(_) => {
                "Checkout failed. No token was provided by Affirm. You may wish to try a different payment method."
            }
            PaymentError::TokenExchange(_) => {
                "Checkout failed. Unable to exchange token with Affirm. Please try checking out again later, or try a different payment source."
            }
            PaymentError::OrderMismatch { .. } => {
                "Checkout failed. Order mismatch for Affirm token. Please try checking out again later, or try a different payment source."
            }
            PaymentError::AmountMismatch { .. } => {
                "Checkout failed. Your cart amount has changed since starting your Affirm application. Please try again."
            }
            PaymentError::AlreadyPaid { .. } => "Checkout failed. This order has already been paid.",
            PaymentError::CaptureDeclined { .. } => {
                "Checkout failed. Unable to capture charge with Affirm. Please try checking out again later, or try a different payment source."
            }
            _ => {
                "Checkout using Affirm failed. Please try checking out again later, or try a different payment source."
            }
        }
    }

    /// Error-tracker classification: provider or validation outcomes are
    /// declines, anything else means our side broke.
    pub fn tracker_kind(&self) -> ErrorKind {
        match self {
            PaymentError::OrderNotFound { .. }
            | PaymentError::InvalidRequest(_)
            | PaymentError::TokenExchange(_)
            | PaymentError::OrderMismatch { .. }
            | PaymentError::AmountMismatch { .. }
            | PaymentError::AlreadyPaid { .. }
            | PaymentError::CaptureDeclined { .. }
            | PaymentError::VoidFailed { .. }
            | PaymentError::RefundFailed { .. } => ErrorKind::TransactionDeclined,
            PaymentError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            _ => ErrorKind::InternalServerError,
        }
    }

    /// Short type name used as `error_class` in tracker payloads
    pub fn class_name(&self) -> &'static str {
        match self {
            PaymentError::Configuration(_) => "Configuration",
            PaymentError::InvalidRequest(_) => "InvalidRequest",
            PaymentError::OrderNotFound { .. } => "OrderNotFound",
            PaymentError::TokenExchange(_) => "TokenExchange",
            PaymentError::OrderMismatch { .. } => "OrderMismatch",
            PaymentError::AmountMismatch { .. } => "AmountMismatch",
            PaymentError::AlreadyPaid { .. } => "AlreadyPaid",
            PaymentError::CaptureDeclined { .. } => "CaptureDeclined",
            PaymentError::VoidFailed { .. } => "VoidFailed",
            PaymentError::RefundFailed { .. } => "RefundFailed",
            PaymentError::NotRefundable { .. } => "NotRefundable",
            PaymentError::PartialRefundOnUncapturedOrder { .. } => "PartialRefundOnUncapturedOrder",
            PaymentError::PartialCaptureDisabled { .. } => "PartialCaptureDisabled",
            PaymentError::InvalidTransition { .. } => "InvalidTransition",
            PaymentError::InvalidAmount { .. } => "InvalidAmount",
            PaymentError::ConcurrentModification { .. } => "ConcurrentModification",
            PaymentError::ProviderError { .. } => "ProviderError",
            PaymentError::NetworkError(_) => "NetworkError",
            PaymentError::Internal(_) => "Internal",
            PaymentError::Serialization(_) => "Serialization",
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::Serialization(err.to_string())
    }
}

/// Result type alias for gateway operations
pub type PaymentResult<T> = Result<T, PaymentError>;
