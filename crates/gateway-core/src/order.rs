//! # Order Types
//!
//! The order aggregate the gateway works against. The order system owns
//! orders; the gateway only reads totals and moves status, notes and the
//! embedded [`ChargeRecord`].

use crate::money::{Currency, Money};
use crate::record::{constant_time_eq, ChargeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status as the storefront sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    /// Awaiting payment
    Pending,
    /// Authorized, waiting for a manual capture
    OnHold,
    /// Paid
    Processing,
    /// Payment attempt failed, may be retried
    Failed,
    /// Cancelled (voided or mismatched)
    Cancelled,
    /// Fully refunded
    Refunded,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

/// A note appended to the order timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNote {
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// An order going through checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order ID (owned by the order system)
    pub id: String,

    /// Secret key the storefront hands to the shopper
    pub order_key: String,

    /// Currency
    pub currency: Currency,

    /// Order total in cents
    pub total: i64,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    status: OrderStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,

    #[serde(default)]
    notes: Vec<OrderNote>,

    #[serde(default)]
    charge: ChargeRecord,

    /// Bumped by the store on every save
    #[serde(default)]
    version: u64,
}

impl Order {
    /// Create a pending order with a generated order key
    pub fn new(id: impl Into<String>, currency: Currency, total: i64) -> Self {
        Self {
            id: id.into(),
            order_key: format!("wc_order_{}", Uuid::new_v4().simple()),
            currency,
            total,
            created_at: Utc::now(),
            status: OrderStatus::Pending,
            transaction_id: None,
            notes: Vec::new(),
            charge: ChargeRecord::default(),
            version: 0,
        }
    }

    /// Builder: set order key
    pub fn with_order_key(mut self, key: impl Into<String>) -> Self {
        self.order_key = key.into();
        self
    }

    /// Builder: set initial status
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn total_money(&self) -> Money {
        Money::from_cents(self.total, self.currency)
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn notes(&self) -> &[OrderNote] {
        &self.notes
    }

    pub fn charge(&self) -> &ChargeRecord {
        &self.charge
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Constant-time check of a presented order key
    pub fn key_is_valid(&self, key: &str) -> bool {
        constant_time_eq(self.order_key.as_bytes(), key.as_bytes())
    }

    /// Whether the order still expects a payment
    pub fn needs_payment(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Failed) && self.total > 0
    }

    /// Authorized amount, falling back to the order total before authorization
    pub fn authorized_amount(&self) -> i64 {
        match self.charge.ledger().authorized_amount {
            0 => self.total,
            amount => amount,
        }
    }

    pub fn captured_total(&self) -> i64 {
        self.charge.ledger().captured_total
    }

    /// Authorization still available for capture
    pub fn auth_remaining(&self) -> i64 {
        self.authorized_amount() - self.captured_total()
    }

    /// Refund/void eligibility: authorized-only, or a settled transaction
    pub fn can_refund(&self) -> bool {
        self.charge.is_auth_only()
            || self
                .transaction_id
                .as_deref()
                .map(|id| !id.is_empty())
                .unwrap_or(false)
    }

    pub(crate) fn charge_mut(&mut self) -> &mut ChargeRecord {
        &mut self.charge
    }

    pub(crate) fn add_note(&mut self, message: impl Into<String>) {
        self.notes.push(OrderNote {
            message: message.into(),
            created_at: Utc::now(),
        });
    }

    pub(crate) fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }

    pub(crate) fn set_transaction_id(&mut self, id: impl Into<String>) {
        self.transaction_id = Some(id.into());
    }

    /// Mark paid and record the settling transaction
    pub(crate) fn payment_complete(&mut self, transaction_id: impl Into<String>) {
        self.set_transaction_id(transaction_id);
        self.status = OrderStatus::Processing;
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_order_needs_payment() {
        let order = Order::new("1001", Currency::USD, 10000);
        assert!(order.needs_payment());
        assert!(order.order_key.starts_with("wc_order_"));
        assert_eq!(order.total_money().display(), "$100.00");
        assert_eq!(order.version(), 0);
    }

    #[test]
    fn test_needs_payment_by_status() {
        let order = Order::new("1", Currency::USD, 500).with_status(OrderStatus::Processing);
        assert!(!order.needs_payment());
        let order = Order::new("2", Currency::USD, 500).with_status(OrderStatus::Failed);
        assert!(order.needs_payment());
        let free = Order::new("3", Currency::USD, 0);
        assert!(!free.needs_payment());
    }

    #[test]
    fn test_auth_amount_falls_back_to_total() {
        let mut order = Order::new("1", Currency::CAD, 4200);
        assert_eq!(order.authorized_amount(), 4200);
        assert_eq!(order.auth_remaining(), 4200);

        order.charge_mut().authorize("ch_9".into(), 4000, false).unwrap();
        assert_eq!(order.authorized_amount(), 4000);
    }

    #[test]
    fn test_can_refund() {
        let mut order = Order::new("1", Currency::USD, 100);
        assert!(!order.can_refund());
        order.set_transaction_id("");
        assert!(!order.can_refund());
        order.payment_complete("ch_1");
        assert!(order.can_refund());
        assert_eq!(order.status(), OrderStatus::Processing);
    }

    #[test]
    fn test_key_validation() {
        let order = Order::new("1", Currency::USD, 100).with_order_key("wc_order_abc");
        assert!(order.key_is_valid("wc_order_abc"));
        assert!(!order.key_is_valid("wc_order_abd"));
    }
}
