//! # Charge Ledger
//!
//! Running totals for one charge, in cents. The ledger owns the amount
//! invariants: `0 <= captured_total <= authorized_amount` and
//! `0 <= refunded_total <= captured_total`.

use crate::error::{PaymentError, PaymentResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Authorized/captured/refunded/fee totals for a charge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeLedger {
    /// Ceiling for all captures, set once at authorization
    pub authorized_amount: i64,
    /// Sum of all successful captures
    pub captured_total: i64,
    /// Sum of all successful refunds
    #[serde(default)]
    pub refunded_total: i64,
    /// Provider fee, net of fee refunds
    #[serde(default)]
    pub fee_amount: i64,
}

impl ChargeLedger {
    /// Open a ledger for a fresh authorization
    pub fn authorized(amount: i64) -> PaymentResult<Self> {
        if amount <= 0 {
            return Err(PaymentError::InvalidAmount {
                message: format!("authorized amount must be positive, got {}", amount),
            });
        }
        Ok(Self {
            authorized_amount: amount,
            ..Self::default()
        })
    }

    /// Authorization not yet captured
    pub fn remaining(&self) -> i64 {
        self.authorized_amount - self.captured_total
    }

    /// Captured funds not yet refunded
    pub fn refundable(&self) -> i64 {
        self.captured_total - self.refunded_total
    }

    pub fn is_fully_captured(&self) -> bool {
        self.authorized_amount > 0 && self.captured_total == self.authorized_amount
    }

    pub fn is_partially_captured(&self) -> bool {
        self.captured_total > 0 && self.captured_total < self.authorized_amount
    }

    pub fn is_fully_refunded(&self) -> bool {
        self.captured_total > 0 && self.refunded_total == self.captured_total
    }

    /// Resolve a requested capture amount. `None` or zero means everything
    /// that is still authorized.
    pub fn resolve_capture(&self, requested: Option<i64>) -> PaymentResult<i64> {
        let remaining = self.remaining();
        match requested {
            None | Some(0) => {
                if remaining <= 0 {
                    return Err(PaymentError::InvalidAmount {
                        message: "nothing left to capture".to_string(),
                    });
                }
                Ok(remaining)
            }
            Some(amount) if amount < 0 || amount > remaining => {
                Err(PaymentError::InvalidAmount {
                    message: format!(
                        "capture of {} cents outside remaining authorization of {} cents",
                        amount, remaining
                    ),
                })
            }
            Some(amount) => Ok(amount),
        }
    }

    /// Apply a successful capture as reported by the provider
    pub fn record_capture(&mut self, captured: i64, fee: i64) -> PaymentResult<()> {
        if captured <= 0 || captured > self.remaining() {
            return Err(PaymentError::Internal(format!(
                "provider reported capture of {} cents against {} cents remaining",
                captured,
                self.remaining()
            )));
        }
        self.captured_total += captured;
        self.fee_amount += fee;
        Ok(())
    }

    /// Apply a successful refund as reported by the provider
    pub fn record_refund(&mut self, refunded: i64, fee_refunded: i64) -> PaymentResult<()> {
        if refunded <= 0 || refunded > self.refundable() {
            return Err(PaymentError::Internal(format!(
                "provider reported refund of {} cents against {} cents refundable",
                refunded,
                self.refundable()
            )));
        }
        self.refunded_total += refunded;
        let fee = self.fee_amount - fee_refunded;
        if fee < 0 {
            warn!(
                fee_amount = self.fee_amount,
                fee_refunded, "fee refund exceeds recorded fee, clamping to zero"
            );
        }
        self.fee_amount = fee.max(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorized_requires_positive_amount() {
        assert!(ChargeLedger::authorized(0).is_err());
        assert!(ChargeLedger::authorized(-5).is_err());
        assert_eq!(ChargeLedger::authorized(10000).unwrap().remaining(), 10000);
    }

    #[test]
    fn test_resolve_capture() {
        let mut ledger = ChargeLedger::authorized(10000).unwrap();
        assert_eq!(ledger.resolve_capture(None).unwrap(), 10000);
        assert_eq!(ledger.resolve_capture(Some(0)).unwrap(), 10000);
        assert_eq!(ledger.resolve_capture(Some(4000)).unwrap(), 4000);
        assert!(ledger.resolve_capture(Some(10001)).is_err());
        assert!(ledger.resolve_capture(Some(-1)).is_err());

        ledger.record_capture(4000, 120).unwrap();
        assert_eq!(ledger.resolve_capture(None).unwrap(), 6000);
        assert!(ledger.resolve_capture(Some(6001)).is_err());
    }

    #[test]
    fn test_captured_never_exceeds_authorized() {
        let mut ledger = ChargeLedger::authorized(10000).unwrap();
        ledger.record_capture(4000, 0).unwrap();
        assert!(ledger.is_partially_captured());
        assert!(ledger.record_capture(6001, 0).is_err());
        assert_eq!(ledger.captured_total, 4000);
        ledger.record_capture(6000, 0).unwrap();
        assert!(ledger.is_fully_captured());
        assert!(!ledger.is_partially_captured());
        assert!(ledger.record_capture(1, 0).is_err());
    }

    #[test]
    fn test_fee_refund() {
        let mut ledger = ChargeLedger::authorized(10000).unwrap();
        ledger.record_capture(10000, 300).unwrap();
        ledger.record_refund(3000, 90).unwrap();
        assert_eq!(ledger.fee_amount, 210);
        assert_eq!(ledger.refundable(), 7000);
    }

    #[test]
    fn test_fee_clamped_at_zero() {
        let mut ledger = ChargeLedger::authorized(500).unwrap();
        ledger.record_capture(500, 10).unwrap();
        ledger.record_refund(500, 25).unwrap();
        assert_eq!(ledger.fee_amount, 0);
        assert!(ledger.is_fully_refunded());
    }
}
