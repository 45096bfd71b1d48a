//! # Charge Lifecycle
//!
//! Drives an order's charge through authorize, capture, void and refund.
//!
//! ```text
//! checkout return ──▶ authorize ──▶ exchange token ──▶ validate ──┬─▶ hold (auth only)
//!                                                                 └─▶ capture (full)
//! admin ──▶ capture / void / refund ──▶ re-validate record ──▶ provider ──▶ persist
//! ```
//!
//! Every operation runs under the order's lock, re-reads the record, calls
//! the provider, then applies the provider's answer to the record and saves.
//! Provider declines are reported as declined transactions; failures on our
//! side are reported as internal errors and propagated.

use crate::charge_api::{
    idempotency_key, CaptureResult, ExpectedCharge, LedgerOperation, RefundResult, SharedChargeApi,
};
use crate::error::{PaymentError, PaymentResult};
use crate::money::Money;
use crate::order::{Order, OrderStatus};
use crate::record::ChargeState;
use crate::settings::GatewaySettings;
use crate::store::{OrderLockGuard, OrderLocks, SharedOrderStore};
use crate::tracker::{ErrorKind, ErrorReporter, TransactionStep};
use tracing::{debug, error, info, instrument, warn};

/// Largest difference (cents) between a refund and the order total that
/// still counts as a full refund of an uncaptured authorization
const FULL_REFUND_TOLERANCE: i64 = 1;

/// Result of a successful authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// Authorized and held for manual capture
    Held,
    /// Authorized and captured in full
    Captured(CaptureResult),
}

/// Result of a successful refund
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    /// The charge was never captured, so the authorization was voided
    Voided,
    /// Captured funds were returned
    Refunded(RefundResult),
}

/// The charge lifecycle state machine
pub struct ChargeLifecycle {
    api: SharedChargeApi,
    store: SharedOrderStore,
    reporter: ErrorReporter,
    settings: GatewaySettings,
    locks: OrderLocks,
}

impl ChargeLifecycle {
    pub fn new(
        api: SharedChargeApi,
        store: SharedOrderStore,
        reporter: ErrorReporter,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            api,
            store,
            reporter,
            settings,
            locks: OrderLocks::new(),
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn store(&self) -> &SharedOrderStore {
        &self.store
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    pub fn provider_name(&self) -> &'static str {
        self.api.provider_name()
    }

    pub(crate) async fn lock(&self, order_id: &str) -> OrderLockGuard {
        self.locks.lock(order_id).await
    }

    // =========================================================================
    // Authorize
    // =========================================================================

    /// Exchange a checkout token and authorize (and, unless running auth
    /// only, capture) the order's charge.
    #[instrument(skip(self, token), fields(order_id = %order_id))]
    pub async fn authorize(&self, order_id: &str, token: &str) -> PaymentResult<AuthorizeOutcome> {
        let _guard = self.lock(order_id).await;
        let mut order = self.store.get(order_id).await?;
        self.authorize_locked(&mut order, token).await
    }

    /// Authorize with the order lock already held
    pub(crate) async fn authorize_locked(
        &self,
        order: &mut Order,
        token: &str,
    ) -> PaymentResult<AuthorizeOutcome> {
        let charge_id = match self.authorize_charge(order, token).await {
            Ok(charge_id) => charge_id,
            Err(e) => {
                warn!(order_id = %order.id, "authorization failed: {}", e);
                self.report_failure(TransactionStep::Auth, order, &e);
                return Err(e);
            }
        };

        if self.settings.is_auth_only() {
            order.set_transaction_id(&charge_id);
            order.set_status(OrderStatus::OnHold);
            order.add_note(format!(
                "Authorized charge of {} (charge ID {})",
                order.total_money().display(),
                charge_id
            ));
            if let Err(e) = self.store.save(order).await {
                error!(order_id = %order.id, "failed to save authorization: {}", e);
                self.report_failure(TransactionStep::Auth, order, &e);
                self.void_stranded(order, &charge_id).await;
                return Err(e);
            }
            info!(order_id = %order.id, charge_id = %charge_id, "authorization held for capture");
            return Ok(AuthorizeOutcome::Held);
        }

        match self.capture_locked(order, None).await {
            Ok(result) => Ok(AuthorizeOutcome::Captured(result)),
            Err(e) => {
                self.void_stranded(order, &charge_id).await;
                order.charge_mut().abandon();
                Err(e)
            }
        }
    }

    /// Token exchange and validation. On success the record is authorized
    /// in memory and the charge id returned; nothing is saved yet.
    async fn authorize_charge(&self, order: &mut Order, token: &str) -> PaymentResult<String> {
        let country = order.currency.country();
        let expected = ExpectedCharge {
            order_id: order.id.clone(),
            amount: order.total,
        };
        let exchange = self.api.exchange_token(token, country, &expected).await?;
        debug!(charge_id = %exchange.charge_id, "received charge id");

        if !exchange.validates {
            self.void_stranded(order, &exchange.charge_id).await;
            return Err(PaymentError::OrderMismatch {
                order_id: order.id.clone(),
            });
        }

        if !exchange.amount_validation {
            self.void_stranded(order, &exchange.charge_id).await;
            order.set_status(OrderStatus::Cancelled);
            order.add_note("Affirm total mismatch.");
            order.charge_mut().consume_nonce();
            self.store.save(order).await?;
            return Err(PaymentError::AmountMismatch {
                order_id: order.id.clone(),
            });
        }

        if !order.needs_payment() {
            self.void_stranded(order, &exchange.charge_id).await;
            return Err(PaymentError::AlreadyPaid {
                order_id: order.id.clone(),
            });
        }

        if let Err(e) = order.charge_mut().authorize(
            exchange.charge_id.clone(),
            exchange.authorized_amount,
            self.settings.partial_capture,
        ) {
            self.void_stranded(order, &exchange.charge_id).await;
            return Err(e);
        }
        order.charge_mut().consume_nonce();
        Ok(exchange.charge_id)
    }

    /// Best-effort void of a charge we will not keep. Its own failure is
    /// reported but never surfaced.
    async fn void_stranded(&self, order: &Order, charge_id: &str) {
        match self.api.void(charge_id, order.currency.country()).await {
            Ok(true) => debug!(charge_id, "voided stranded charge"),
            Ok(false) => {
                warn!(charge_id, "unable to void stranded charge");
                self.reporter.report(
                    TransactionStep::Void,
                    Some(order),
                    ErrorKind::TransactionDeclined,
                    None,
                    Some("Unable to void"),
                );
            }
            Err(e) => {
                warn!(charge_id, "void of stranded charge failed: {}", e);
                self.reporter.report(
                    TransactionStep::Void,
                    Some(order),
                    ErrorKind::InternalServerError,
                    Some(&e),
                    None,
                );
            }
        }
    }

    // =========================================================================
    // Capture
    // =========================================================================

    /// Capture `amount` cents, or everything still authorized when `None`/0
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn capture(&self, order_id: &str, amount: Option<i64>) -> PaymentResult<CaptureResult> {
        let _guard = self.lock(order_id).await;
        let mut order = self.store.get(order_id).await?;
        self.capture_locked(&mut order, amount).await
    }

    async fn capture_locked(
        &self,
        order: &mut Order,
        requested: Option<i64>,
    ) -> PaymentResult<CaptureResult> {
        let amount = order
            .charge()
            .plan_capture(&order.id, requested)
            .inspect_err(|e| warn!(order_id = %order.id, "capture rejected: {}", e))?;
        let charge_id = charge_id_of(order)?;
        let country = order.currency.country();

        let key = idempotency_key(
            &charge_id,
            LedgerOperation::Capture,
            amount,
            order.captured_total(),
        );

        let result = match self.api.capture(&charge_id, amount, country, &key).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                let message = format!(
                    "Unable to capture charge {} for order {} using charge id {}",
                    amount, order.id, charge_id
                );
                warn!("{}", message);
                self.reporter.report(
                    TransactionStep::Capture,
                    Some(order),
                    ErrorKind::TransactionDeclined,
                    None,
                    Some(&message),
                );
                return Err(PaymentError::CaptureDeclined { charge_id, amount });
            }
            Err(e) => {
                error!(order_id = %order.id, "capture call failed: {}", e);
                self.report_failure(TransactionStep::Capture, order, &e);
                return Err(e);
            }
        };

        if let Err(e) = order
            .charge_mut()
            .apply_capture(result.captured_amount, result.fee)
        {
            error!(order_id = %order.id, "capture result rejected: {}", e);
            self.report_failure(TransactionStep::Capture, order, &e);
            return Err(e);
        }

        order.add_note(format!(
            "Captured charge of {} (charge ID {} / event ID {})",
            Money::from_cents(result.captured_amount, order.currency).display(),
            charge_id,
            result.event_id
        ));
        if order.charge().ledger().is_fully_captured() {
            order.payment_complete(&charge_id);
        }
        self.persist(TransactionStep::Capture, order).await?;

        info!(
            order_id = %order.id,
            captured = result.captured_amount,
            fee = result.fee,
            "captured charge"
        );
        Ok(result)
    }

    // =========================================================================
    // Void
    // =========================================================================

    /// Void an authorization that has not been captured
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn void(&self, order_id: &str) -> PaymentResult<()> {
        let _guard = self.lock(order_id).await;
        let mut order = self.store.get(order_id).await?;

        ensure_refundable(&order)?;
        let charge_id = order
            .charge()
            .ensure_voidable()
            .inspect_err(|e| warn!("void rejected: {}", e))?
            .to_string();

        match self.api.void(&charge_id, order.currency.country()).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(charge_id = %charge_id, "unable to void charge");
                order.add_note(format!("Unable to void charge {}", charge_id));
                self.persist(TransactionStep::Void, &mut order).await?;
                self.reporter.report(
                    TransactionStep::Void,
                    Some(&order),
                    ErrorKind::TransactionDeclined,
                    None,
                    Some("Unable to void"),
                );
                return Err(PaymentError::VoidFailed { charge_id });
            }
            Err(e) => {
                error!("void call failed: {}", e);
                self.report_failure(TransactionStep::Void, &order, &e);
                return Err(e);
            }
        }

        order.charge_mut().apply_void()?;
        order.set_status(OrderStatus::Cancelled);
        order.add_note(format!("Authorized charge {} has been voided", charge_id));
        self.persist(TransactionStep::Void, &mut order).await?;

        info!(charge_id = %charge_id, "voided charge");
        Ok(())
    }

    // =========================================================================
    // Refund
    // =========================================================================

    /// Refund captured funds, or void an uncaptured authorization when the
    /// full order total is refunded
    #[instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn refund(
        &self,
        order_id: &str,
        amount: Option<i64>,
        reason: &str,
    ) -> PaymentResult<RefundOutcome> {
        let _guard = self.lock(order_id).await;
        let mut order = self.store.get(order_id).await?;

        ensure_refundable(&order)?;

        if order.charge().is_auth_only() && !order.charge().is_partially_captured() {
            return self.refund_by_void(&mut order, amount, reason).await;
        }

        let amount = order
            .charge()
            .plan_refund(amount)
            .inspect_err(|e| warn!("refund rejected: {}", e))?;
        let charge_id = charge_id_of(&order)?;
        let key = idempotency_key(
            &charge_id,
            LedgerOperation::Refund,
            amount,
            order.charge().ledger().refunded_total,
        );

        let result = match self
            .api
            .refund(&charge_id, amount, order.currency.country(), &key)
            .await
        {
            Ok(Some(result)) => result,
            Ok(None) => {
                let message = "Refund failed: The order had been authorized and captured, but refunding the order unexpectedly failed.";
                warn!(charge_id = %charge_id, amount, "refund declined");
                self.reporter.report(
                    TransactionStep::Refund,
                    Some(&order),
                    ErrorKind::TransactionDeclined,
                    None,
                    Some(message),
                );
                return Err(PaymentError::RefundFailed {
                    reason: message.to_string(),
                });
            }
            Err(e) => {
                error!("refund call failed: {}", e);
                self.report_failure(TransactionStep::Refund, &order, &e);
                return Err(e);
            }
        };

        if let Err(e) = order
            .charge_mut()
            .apply_refund(result.amount, result.fee_refunded)
        {
            error!("refund result rejected: {}", e);
            self.report_failure(TransactionStep::Refund, &order, &e);
            return Err(e);
        }

        order.add_note(format!(
            "Refunded {} - Refund ID: {} - Reason: {}",
            Money::from_cents(result.amount, order.currency).display(),
            result.id,
            reason
        ));
        if order.charge().state() == ChargeState::Refunded {
            order.set_status(OrderStatus::Refunded);
        }
        self.persist(TransactionStep::Refund, &mut order).await?;

        info!(refunded = result.amount, refund_id = %result.id, "refunded charge");
        Ok(RefundOutcome::Refunded(result))
    }

    async fn refund_by_void(
        &self,
        order: &mut Order,
        amount: Option<i64>,
        reason: &str,
    ) -> PaymentResult<RefundOutcome> {
        let requested = amount.unwrap_or(order.total);
        if (order.total - requested).abs() > FULL_REFUND_TOLERANCE {
            warn!(
                requested,
                total = order.total,
                "partial refund attempted before capture"
            );
            return Err(PaymentError::PartialRefundOnUncapturedOrder {
                order_id: order.id.clone(),
            });
        }

        let charge_id = order.charge().ensure_voidable()?.to_string();
        match self.api.void(&charge_id, order.currency.country()).await {
            Ok(true) => {}
            Ok(false) => {
                let message = "Refund failed: The order had been authorized, and not captured, but voiding the order unexpectedly failed.";
                warn!(charge_id = %charge_id, "void for refund declined");
                self.reporter.report(
                    TransactionStep::Void,
                    Some(order),
                    ErrorKind::TransactionDeclined,
                    None,
                    Some(message),
                );
                return Err(PaymentError::RefundFailed {
                    reason: message.to_string(),
                });
            }
            Err(e) => {
                error!("void call failed: {}", e);
                self.report_failure(TransactionStep::Void, order, &e);
                return Err(e);
            }
        }

        order.charge_mut().apply_void()?;
        order.set_status(OrderStatus::Cancelled);
        order.add_note(format!("Voided - Reason: {}", reason));
        self.persist(TransactionStep::Void, order).await?;

        info!(charge_id = %charge_id, "voided uncaptured charge for refund");
        Ok(RefundOutcome::Voided)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn persist(&self, step: TransactionStep, order: &mut Order) -> PaymentResult<()> {
        if let Err(e) = self.store.save(order).await {
            error!(order_id = %order.id, "failed to save order: {}", e);
            self.report_failure(step, order, &e);
            return Err(e);
        }
        Ok(())
    }

    /// Declines are reported with their message only; anything else carries
    /// the error and a trace.
    #[track_caller]
    fn report_failure(&self, step: TransactionStep, order: &Order, err: &PaymentError) {
        match err.tracker_kind() {
            ErrorKind::InternalServerError => self.reporter.report(
                step,
                Some(order),
                ErrorKind::InternalServerError,
                Some(err),
                None,
            ),
            kind => self
                .reporter
                .report(step, Some(order), kind, None, Some(&err.to_string())),
        }
    }
}

fn ensure_refundable(order: &Order) -> PaymentResult<()> {
    if order.can_refund() {
        Ok(())
    } else {
        warn!(order_id = %order.id, "order is neither authorized nor captured");
        Err(PaymentError::NotRefundable {
            order_id: order.id.clone(),
        })
    }
}

fn charge_id_of(order: &Order) -> PaymentResult<String> {
    order
        .charge()
        .charge_id()
        .map(str::to_string)
        .ok_or_else(|| PaymentError::Internal(format!("order {} has no charge id", order.id)))
}
