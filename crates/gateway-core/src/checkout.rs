//! # Checkout Flow
//!
//! The two legs around the provider-hosted application:
//!
//! 1. [`CheckoutFlow::begin_checkout`] issues a single-use nonce, stores it
//!    on the order and returns what the storefront needs to open the
//!    provider checkout (confirmation and cancel URLs, mode, amount).
//! 2. [`CheckoutFlow::complete_checkout`] handles the provider's return
//!    POST. A missing or stale nonce makes the request a silent no-op;
//!    every other failure becomes a shopper notice and a redirect back to
//!    checkout.

use crate::error::{PaymentError, PaymentResult};
use crate::lifecycle::{AuthorizeOutcome, ChargeLifecycle};
use crate::money::Currency;
use crate::order::Order;
use crate::settings::{CheckoutMode, StoreUrls};
use crate::tracker::{ErrorKind, TransactionStep};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// The only action the return endpoint accepts
pub const COMPLETE_CHECKOUT_ACTION: &str = "complete_checkout";

const UNSUPPORTED_ACTION_NOTICE: &str = "Sorry, but that endpoint is not supported.";

/// Derives checkout nonces from a server secret
#[derive(Clone)]
pub struct NonceIssuer {
    secret: Vec<u8>,
}

impl NonceIssuer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Fresh nonce for `order_id`; never repeats for the same order
    pub fn issue(&self, order_id: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(format!("affirm-checkout-order-{}:{}", order_id, Uuid::new_v4()).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for NonceIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceIssuer").finish_non_exhaustive()
    }
}

/// What the storefront needs to open the provider checkout
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRedirect {
    pub order_id: String,
    pub nonce: String,
    /// Provider posts the checkout token back here
    pub confirmation_url: String,
    pub cancel_url: String,
    pub checkout_mode: CheckoutMode,
    /// Order total in cents
    pub amount: i64,
    pub currency: Currency,
}

/// Query and form fields of the return leg
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteCheckout {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_key: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub checkout_token: Option<String>,
    /// Order awaiting payment in the shopper's session, used when the
    /// request carries no `order_id`
    #[serde(skip)]
    pub fallback_order_id: Option<String>,
}

/// Where the shopper goes after the return leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutReturn {
    Completed {
        redirect: String,
        outcome: AuthorizeOutcome,
    },
    Failed {
        redirect: String,
        notice: String,
    },
    /// Stale or missing nonce: nothing happened
    Ignored { redirect: String },
}

impl CheckoutReturn {
    pub fn redirect(&self) -> &str {
        match self {
            CheckoutReturn::Completed { redirect, .. }
            | CheckoutReturn::Failed { redirect, .. }
            | CheckoutReturn::Ignored { redirect } => redirect,
        }
    }
}

/// Checkout entry and return handling on top of the lifecycle
pub struct CheckoutFlow {
    lifecycle: Arc<ChargeLifecycle>,
    nonces: NonceIssuer,
    urls: StoreUrls,
}

impl CheckoutFlow {
    pub fn new(lifecycle: Arc<ChargeLifecycle>, nonces: NonceIssuer, urls: StoreUrls) -> Self {
        Self {
            lifecycle,
            nonces,
            urls,
        }
    }

    pub fn urls(&self) -> &StoreUrls {
        &self.urls
    }

    /// Start a checkout for `order_id`. The caller proves ownership with the
    /// order key; a wrong key looks like an unknown order. Issuing again
    /// replaces the previous nonce.
    #[instrument(skip(self, order_key), fields(order_id = %order_id))]
    pub async fn begin_checkout(
        &self,
        order_id: &str,
        order_key: &str,
        billing_country: &str,
    ) -> PaymentResult<CheckoutRedirect> {
        let settings = self.lifecycle.settings();
        let _guard = self.lifecycle.lock(order_id).await;
        let mut order = self.lifecycle.store().get(order_id).await?;

        if order_key.is_empty() || !order.key_is_valid(order_key) {
            warn!("checkout refused: order key does not match");
            return Err(PaymentError::OrderNotFound {
                order_id: order_id.to_string(),
            });
        }

        if !order.needs_payment() {
            return Err(PaymentError::AlreadyPaid {
                order_id: order.id.clone(),
            });
        }
        if !settings.is_available_for(order.total, billing_country) {
            return Err(PaymentError::InvalidRequest(format!(
                "payment method is not available for order {}",
                order.id
            )));
        }

        let nonce = self.nonces.issue(&order.id);
        order.charge_mut().issue_nonce(nonce.clone())?;
        self.lifecycle.store().save(&mut order).await?;

        info!(mode = ?settings.checkout_mode, "checkout started");
        Ok(CheckoutRedirect {
            order_id: order.id.clone(),
            confirmation_url: self.urls.complete_checkout_url(&order, &nonce),
            cancel_url: settings.cancel_url_for(&self.urls, &order),
            checkout_mode: settings.checkout_mode,
            amount: order.total,
            currency: order.currency,
            nonce,
        })
    }

    /// Handle the provider's return POST
    #[instrument(skip(self, request), fields(order_id = ?request.order_id))]
    pub async fn complete_checkout(&self, request: CompleteCheckout) -> CheckoutReturn {
        let checkout_url = self.urls.checkout_url();

        if request.action.as_deref() != Some(COMPLETE_CHECKOUT_ACTION) {
            warn!(action = ?request.action, "unsupported checkout action");
            self.report_declined(None, UNSUPPORTED_ACTION_NOTICE);
            return CheckoutReturn::Failed {
                redirect: checkout_url,
                notice: UNSUPPORTED_ACTION_NOTICE.to_string(),
            };
        }

        let order_id = request
            .order_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| request.fallback_order_id.clone());
        let Some(order_id) = order_id else {
            return self.fail(None, PaymentError::OrderNotFound {
                order_id: String::new(),
            });
        };

        let _guard = self.lifecycle.lock(&order_id).await;
        let mut order = match self.lifecycle.store().get(&order_id).await {
            Ok(order) => order,
            Err(e) => return self.fail(None, e),
        };

        let nonce = request.nonce.as_deref().unwrap_or_default();
        if nonce.is_empty() || !order.charge().nonce_matches(nonce) {
            info!("checkout return without a valid nonce ignored");
            return CheckoutReturn::Ignored {
                redirect: checkout_url,
            };
        }

        let token = request
            .checkout_token
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        if token.is_empty() {
            return self.fail(
                Some(&order),
                PaymentError::InvalidRequest("no checkout token provided".to_string()),
            );
        }

        if let Some(key) = request.order_key.as_deref().filter(|k| !k.is_empty()) {
            if !order.key_is_valid(key) {
                return self.fail(
                    Some(&order),
                    PaymentError::OrderNotFound {
                        order_id: order.id.clone(),
                    },
                );
            }
        }

        match self.lifecycle.authorize_locked(&mut order, token).await {
            Ok(outcome) => {
                info!(outcome = ?outcome, "checkout completed");
                CheckoutReturn::Completed {
                    redirect: self.urls.order_received_url(&order),
                    outcome,
                }
            }
            Err(e) => {
                warn!("checkout failed: {}", e);
                CheckoutReturn::Failed {
                    redirect: checkout_url,
                    notice: e.customer_message().to_string(),
                }
            }
        }
    }

    fn fail(&self, order: Option<&Order>, err: PaymentError) -> CheckoutReturn {
        warn!("checkout failed: {}", err);
        let notice = err.customer_message();
        self.report_declined(order, notice);
        CheckoutReturn::Failed {
            redirect: self.urls.checkout_url(),
            notice: notice.to_string(),
        }
    }

    fn report_declined(&self, order: Option<&Order>, message: &str) {
        self.lifecycle.reporter().report(
            TransactionStep::Auth,
            order,
            ErrorKind::TransactionDeclined,
            None,
            Some(message),
        );
    }
}
