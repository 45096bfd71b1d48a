//! Test doubles for the charge lifecycle.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! downstream crates.

use crate::charge_api::{CaptureResult, ChargeApi, ExpectedCharge, RefundResult, TokenExchange};
use crate::error::{PaymentError, PaymentResult};
use crate::money::Country;
use crate::tracker::{Environment, ErrorReport, ErrorReporter};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

/// A call the mock received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeCall {
    Exchange { token: String, country: Country },
    Capture { charge_id: String, amount: i64, country: Country },
    Void { charge_id: String, country: Country },
    Refund { charge_id: String, amount: i64, country: Country },
}

/// Scripted answer for one call
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    Success(T),
    Decline,
    /// Surfaces as `PaymentError::Internal`
    Error(String),
}

/// Scripted [`ChargeApi`] that records every call.
///
/// Captures and refunds without a queued reply succeed for the requested
/// amount with no fee; voids without a queued reply succeed. Token exchange
/// fails until [`MockChargeApi::with_exchange`] is set.
#[derive(Debug, Default)]
pub struct MockChargeApi {
    exchange: Mutex<Option<TokenExchange>>,
    captures: Mutex<VecDeque<MockReply<CaptureResult>>>,
    voids: Mutex<VecDeque<MockReply<()>>>,
    refunds: Mutex<VecDeque<MockReply<RefundResult>>>,
    calls: Mutex<Vec<ChargeCall>>,
    idempotency_keys: Mutex<Vec<String>>,
}

impl MockChargeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exchange that validates and authorizes `amount`
    pub fn approving(charge_id: &str, amount: i64) -> Self {
        Self::new().with_exchange(TokenExchange {
            charge_id: charge_id.to_string(),
            validates: true,
            amount_validation: true,
            authorized_amount: amount,
        })
    }

    pub fn with_exchange(self, exchange: TokenExchange) -> Self {
        *guard(&self.exchange) = Some(exchange);
        self
    }

    pub fn push_capture(&self, reply: MockReply<CaptureResult>) {
        guard(&self.captures).push_back(reply);
    }

    pub fn push_void(&self, reply: MockReply<()>) {
        guard(&self.voids).push_back(reply);
    }

    pub fn push_refund(&self, reply: MockReply<RefundResult>) {
        guard(&self.refunds).push_back(reply);
    }

    pub fn calls(&self) -> Vec<ChargeCall> {
        guard(&self.calls).clone()
    }

    /// Keys sent with captures and refunds, in call order
    pub fn idempotency_keys(&self) -> Vec<String> {
        guard(&self.idempotency_keys).clone()
    }

    pub fn void_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChargeCall::Void { charge_id, .. } => Some(charge_id),
                _ => None,
            })
            .collect()
    }

    pub fn capture_calls(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChargeCall::Capture { amount, .. } => Some(amount),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ChargeCall) {
        guard(&self.calls).push(call);
    }
}

#[async_trait]
impl ChargeApi for MockChargeApi {
    async fn exchange_token(
        &self,
        token: &str,
        country: Country,
        _expected: &ExpectedCharge,
    ) -> PaymentResult<TokenExchange> {
        self.record(ChargeCall::Exchange {
            token: token.to_string(),
            country,
        });
        guard(&self.exchange)
            .clone()
            .ok_or_else(|| PaymentError::TokenExchange("token rejected".to_string()))
    }

    async fn capture(
        &self,
        charge_id: &str,
        amount: i64,
        country: Country,
        idempotency_key: &str,
    ) -> PaymentResult<Option<CaptureResult>> {
        guard(&self.idempotency_keys).push(idempotency_key.to_string());
        self.record(ChargeCall::Capture {
            charge_id: charge_id.to_string(),
            amount,
            country,
        });
        match guard(&self.captures).pop_front() {
            Some(MockReply::Success(result)) => Ok(Some(result)),
            Some(MockReply::Decline) => Ok(None),
            Some(MockReply::Error(message)) => Err(PaymentError::Internal(message)),
            None => Ok(Some(CaptureResult {
                fee: 0,
                captured_amount: amount,
                event_id: format!("ev_{}", amount),
            })),
        }
    }

    async fn void(&self, charge_id: &str, country: Country) -> PaymentResult<bool> {
        self.record(ChargeCall::Void {
            charge_id: charge_id.to_string(),
            country,
        });
        match guard(&self.voids).pop_front() {
            Some(MockReply::Success(())) | None => Ok(true),
            Some(MockReply::Decline) => Ok(false),
            Some(MockReply::Error(message)) => Err(PaymentError::Internal(message)),
        }
    }

    async fn refund(
        &self,
        charge_id: &str,
        amount: i64,
        country: Country,
        idempotency_key: &str,
    ) -> PaymentResult<Option<RefundResult>> {
        guard(&self.idempotency_keys).push(idempotency_key.to_string());
        self.record(ChargeCall::Refund {
            charge_id: charge_id.to_string(),
            amount,
            country,
        });
        match guard(&self.refunds).pop_front() {
            Some(MockReply::Success(result)) => Ok(Some(result)),
            Some(MockReply::Decline) => Ok(None),
            Some(MockReply::Error(message)) => Err(PaymentError::Internal(message)),
            None => Ok(Some(RefundResult {
                id: format!("rf_{}", amount),
                amount,
                fee_refunded: 0,
            })),
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Reporter whose queue the test reads directly
pub fn recording_reporter() -> (ErrorReporter, mpsc::Receiver<ErrorReport>) {
    ErrorReporter::channel(64, Environment::Sandbox)
}

/// Everything queued so far
pub fn drain_reports(rx: &mut mpsc::Receiver<ErrorReport>) -> Vec<ErrorReport> {
    let mut reports = Vec::new();
    while let Ok(report) = rx.try_recv() {
        reports.push(report);
    }
    reports
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
