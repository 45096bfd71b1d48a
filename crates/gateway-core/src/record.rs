//! # Order Charge Record
//!
//! The typed charge state attached to an order. Flags such as "auth only" or
//! "partially captured" are derived from [`ChargeState`] and the ledger
//! rather than stored, so contradictory combinations cannot exist.
//!
//! Transitions are crate-private: only the lifecycle and checkout flow move
//! a record forward.
//!
//! ```text
//!  Unauthorized ──authorize──▶ Authorized ──void──▶ Voided
//!                                  │
//!                               capture
//!                                  ▼
//!                         PartiallyCaptured ◀─┐
//!                                  │ capture ─┘
//!                                  ▼
//!                              Captured ──refund──▶ PartiallyRefunded ──▶ Refunded
//! ```

use crate::error::{PaymentError, PaymentResult};
use crate::ledger::ChargeLedger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a charge is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeState {
    Unauthorized,
    Authorized,
    PartiallyCaptured,
    Captured,
    PartiallyRefunded,
    Refunded,
    Voided,
}

impl Default for ChargeState {
    fn default() -> Self {
        ChargeState::Unauthorized
    }
}

impl std::fmt::Display for ChargeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChargeState::Unauthorized => "unauthorized",
            ChargeState::Authorized => "authorized",
            ChargeState::PartiallyCaptured => "partially_captured",
            ChargeState::Captured => "captured",
            ChargeState::PartiallyRefunded => "partially_refunded",
            ChargeState::Refunded => "refunded",
            ChargeState::Voided => "voided",
        };
        f.write_str(name)
    }
}

const REFUNDABLE_STATES: &[ChargeState] = &[
    ChargeState::PartiallyCaptured,
    ChargeState::Captured,
    ChargeState::PartiallyRefunded,
];

/// Charge state persisted on an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    charge_id: Option<String>,
    #[serde(default)]
    state: ChargeState,
    #[serde(default)]
    ledger: ChargeLedger,
    #[serde(default)]
    partial_capture_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    checkout_nonce: Option<String>,
}

impl ChargeRecord {
    pub fn charge_id(&self) -> Option<&str> {
        self.charge_id.as_deref()
    }

    pub fn state(&self) -> ChargeState {
        self.state
    }

    pub fn ledger(&self) -> &ChargeLedger {
        &self.ledger
    }

    pub fn partial_capture_enabled(&self) -> bool {
        self.partial_capture_enabled
    }

    pub fn checkout_nonce(&self) -> Option<&str> {
        self.checkout_nonce.as_deref()
    }

    /// Authorized and not yet fully captured
    pub fn is_auth_only(&self) -> bool {
        matches!(
            self.state,
            ChargeState::Authorized | ChargeState::PartiallyCaptured
        )
    }

    pub fn is_partially_captured(&self) -> bool {
        self.ledger.is_partially_captured()
    }

    /// Constant-time comparison against the persisted checkout nonce.
    /// A record without a nonce matches nothing.
    pub fn nonce_matches(&self, candidate: &str) -> bool {
        match &self.checkout_nonce {
            Some(expected) => constant_time_eq(expected.as_bytes(), candidate.as_bytes()),
            None => false,
        }
    }

    /// Flat `_wc_gateway_<id>_<key>` view of the record. Unset fields and
    /// cleared flags are absent.
    pub fn meta_entries(&self, gateway_id: &str) -> BTreeMap<String, String> {
        let key = |name: &str| format!("_wc_gateway_{}_{}", gateway_id, name);
        let mut meta = BTreeMap::new();

        if let Some(charge_id) = &self.charge_id {
            meta.insert(key("charge_id"), charge_id.clone());
            meta.insert(
                key("authorized_amount"),
                self.ledger.authorized_amount.to_string(),
            );
        }
        if self.ledger.captured_total > 0 {
            meta.insert(key("captured_total"), self.ledger.captured_total.to_string());
        }
        if self.ledger.fee_amount != 0 || self.ledger.captured_total > 0 {
            meta.insert(key("fee_amount"), self.ledger.fee_amount.to_string());
        }
        if self.is_auth_only() {
            meta.insert(key("authorized_only"), "1".to_string());
        }
        if self.partial_capture_enabled {
            meta.insert(key("partial_capture_enabled"), "1".to_string());
        }
        if self.is_partially_captured() {
            meta.insert(key("partially_captured"), "1".to_string());
        }
        if let Some(nonce) = &self.checkout_nonce {
            meta.insert(key("checkout_nonce"), nonce.clone());
        }
        meta
    }

    // ---------------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------------

    pub(crate) fn issue_nonce(&mut self, nonce: String) -> PaymentResult<()> {
        self.expect_state("begin checkout for", &[ChargeState::Unauthorized])?;
        self.checkout_nonce = Some(nonce);
        Ok(())
    }

    pub(crate) fn consume_nonce(&mut self) {
        self.checkout_nonce = None;
    }

    pub(crate) fn authorize(
        &mut self,
        charge_id: String,
        authorized_amount: i64,
        partial_capture_enabled: bool,
    ) -> PaymentResult<()> {
        self.expect_state("authorize", &[ChargeState::Unauthorized])?;
        self.ledger = ChargeLedger::authorized(authorized_amount)?;
        self.charge_id = Some(charge_id);
        self.partial_capture_enabled = partial_capture_enabled;
        self.state = ChargeState::Authorized;
        Ok(())
    }

    /// Validate and resolve a capture request without mutating anything
    pub(crate) fn plan_capture(&self, order_id: &str, requested: Option<i64>) -> PaymentResult<i64> {
        self.expect_state(
            "capture",
            &[ChargeState::Authorized, ChargeState::PartiallyCaptured],
        )?;
        let amount = self.ledger.resolve_capture(requested)?;
        if amount < self.ledger.remaining() && !self.partial_capture_enabled {
            return Err(PaymentError::PartialCaptureDisabled {
                order_id: order_id.to_string(),
            });
        }
        Ok(amount)
    }

    pub(crate) fn apply_capture(&mut self, captured: i64, fee: i64) -> PaymentResult<()> {
        self.expect_state(
            "capture",
            &[ChargeState::Authorized, ChargeState::PartiallyCaptured],
        )?;
        self.ledger.record_capture(captured, fee)?;
        self.state = if self.ledger.is_fully_captured() {
            ChargeState::Captured
        } else {
            ChargeState::PartiallyCaptured
        };
        Ok(())
    }

    /// Void is legal only for a pure authorization
    pub(crate) fn ensure_voidable(&self) -> PaymentResult<&str> {
        self.expect_state("void", &[ChargeState::Authorized])?;
        if self.ledger.captured_total != 0 {
            return Err(self.invalid("void"));
        }
        self.charge_id.as_deref().ok_or_else(|| self.invalid("void"))
    }

    pub(crate) fn apply_void(&mut self) -> PaymentResult<()> {
        self.ensure_voidable()?;
        self.state = ChargeState::Voided;
        Ok(())
    }

    /// Voids a charge that never completed authorization on our side
    pub(crate) fn abandon(&mut self) {
        if self.state == ChargeState::Authorized && self.ledger.captured_total == 0 {
            self.state = ChargeState::Voided;
        }
    }

    /// Resolve a refund of captured funds. `None` refunds everything still
    /// refundable.
    pub(crate) fn plan_refund(&self, requested: Option<i64>) -> PaymentResult<i64> {
        self.expect_state("refund", REFUNDABLE_STATES)?;
        let refundable = self.ledger.refundable();
        match requested {
            _ if refundable <= 0 => Err(PaymentError::InvalidAmount {
                message: "nothing left to refund".to_string(),
            }),
            None => Ok(refundable),
            Some(amount) if amount <= 0 || amount > refundable => Err(PaymentError::InvalidAmount {
                message: format!(
                    "refund of {} cents outside refundable balance of {} cents",
                    amount, refundable
                ),
            }),
            Some(amount) => Ok(amount),
        }
    }

    pub(crate) fn apply_refund(&mut self, refunded: i64, fee_refunded: i64) -> PaymentResult<()> {
        self.expect_state("refund", REFUNDABLE_STATES)?;
        self.ledger.record_refund(refunded, fee_refunded)?;
        if self.state != ChargeState::PartiallyCaptured {
            self.state = if self.ledger.is_fully_refunded() {
                ChargeState::Refunded
            } else {
                ChargeState::PartiallyRefunded
            };
        }
        Ok(())
    }

    fn expect_state(&self, action: &'static str, allowed: &[ChargeState]) -> PaymentResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> PaymentError {
        PaymentError::InvalidTransition {
            action,
            state: self.state.to_string(),
        }
    }
}

/// Byte comparison whose running time depends only on the lengths
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}
