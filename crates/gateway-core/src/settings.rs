//! # Gateway Settings
//!
//! Merchant configuration for the gateway, loaded from `config/gateway.toml`.
//! API keys are not part of this file; the provider crate reads them from
//! the environment.

use crate::money::Country;
use crate::order::Order;
use serde::{Deserialize, Serialize};

/// Default minimum order total ($1.00)
pub const DEFAULT_MIN_TOTAL: i64 = 100;
/// Default maximum order total ($300,000.00)
pub const DEFAULT_MAX_TOTAL: i64 = 30_000_000;

/// Which key pair the merchant primarily operates with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Us,
    Ca,
}

impl Region {
    pub fn country(&self) -> Country {
        match self {
            Region::Us => Country::Usa,
            Region::Ca => Country::Can,
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::Us
    }
}

/// Whether authorization is followed by an immediate capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    AuthAndCapture,
    AuthOnly,
}

impl Default for TransactionMode {
    fn default() -> Self {
        TransactionMode::AuthAndCapture
    }
}

/// How the provider checkout is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Modal,
    Redirect,
}

impl Default for CheckoutMode {
    fn default() -> Self {
        CheckoutMode::Modal
    }
}

/// Where a shopper lands after cancelling at the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelDestination {
    Cart,
    Payment,
    Checkout,
    Custom(String),
}

impl Default for CancelDestination {
    fn default() -> Self {
        CancelDestination::Checkout
    }
}

/// Merchant-facing gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_description")]
    pub description: String,

    /// Merchant's home region; tracker reports without an order use its keys
    #[serde(default)]
    pub region: Region,

    /// Sandbox (true) or live (false) provider environment
    #[serde(default = "default_true")]
    pub sandbox: bool,

    #[serde(default)]
    pub transaction_mode: TransactionMode,

    /// Allow more than one capture per charge
    #[serde(default = "default_true")]
    pub partial_capture: bool,

    #[serde(default)]
    pub checkout_mode: CheckoutMode,

    #[serde(default)]
    pub cancel_url: CancelDestination,

    /// Minimum order total in cents
    #[serde(default)]
    pub min_total: Option<i64>,

    /// Maximum order total in cents
    #[serde(default)]
    pub max_total: Option<i64>,

    /// Verbose gateway logging
    #[serde(default)]
    pub debug: bool,
}

fn default_true() -> bool {
    true
}

fn default_title() -> String {
    "Affirm".to_string()
}

fn default_description() -> String {
    "Pay over time with Affirm.".to_string()
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            title: default_title(),
            description: default_description(),
            region: Region::default(),
            sandbox: true,
            transaction_mode: TransactionMode::default(),
            partial_capture: true,
            checkout_mode: CheckoutMode::default(),
            cancel_url: CancelDestination::default(),
            min_total: None,
            max_total: None,
            debug: false,
        }
    }
}

impl GatewaySettings {
    /// Load settings from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    pub fn is_auth_only(&self) -> bool {
        self.transaction_mode == TransactionMode::AuthOnly
    }

    /// Effective minimum total (unset or zero falls back to the default)
    pub fn min_total(&self) -> i64 {
        self.min_total.filter(|v| *v > 0).unwrap_or(DEFAULT_MIN_TOTAL)
    }

    /// Effective maximum total (unset or zero falls back to the default)
    pub fn max_total(&self) -> i64 {
        self.max_total.filter(|v| *v > 0).unwrap_or(DEFAULT_MAX_TOTAL)
    }

    /// Builder: transaction mode
    pub fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    /// Builder: partial capture flag
    pub fn with_partial_capture(mut self, enabled: bool) -> Self {
        self.partial_capture = enabled;
        self
    }

    /// Builder: cancel destination
    pub fn with_cancel_url(mut self, destination: CancelDestination) -> Self {
        self.cancel_url = destination;
        self
    }

    /// Resolve the cancel URL for an order
    pub fn cancel_url_for(&self, urls: &StoreUrls, order: &Order) -> String {
        match &self.cancel_url {
            CancelDestination::Cart => urls.cart_url(),
            CancelDestination::Payment => urls.pay_for_order_url(order),
            CancelDestination::Checkout => urls.checkout_url(),
            CancelDestination::Custom(url) if !url.trim().is_empty() => url.clone(),
            CancelDestination::Custom(_) => urls.checkout_url(),
        }
    }
}

/// Storefront URLs the gateway redirects to
#[derive(Debug, Clone)]
pub struct StoreUrls {
    /// Base URL of the storefront (e.g., "https://shop.example.com")
    pub base_url: String,
}

impl StoreUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            base_url: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn cart_url(&self) -> String {
        format!("{}/cart", self.base_url)
    }

    pub fn checkout_url(&self) -> String {
        format!("{}/checkout", self.base_url)
    }

    pub fn pay_for_order_url(&self, order: &Order) -> String {
        format!(
            "{}/checkout/order-pay/{}?pay_for_order=true&key={}",
            self.base_url, order.id, order.order_key
        )
    }

    pub fn order_received_url(&self, order: &Order) -> String {
        format!(
            "{}/checkout/order-received/{}?key={}",
            self.base_url, order.id, order.order_key
        )
    }

    /// Provider return leg (`action=complete_checkout`)
    pub fn complete_checkout_url(&self, order: &Order, nonce: &str) -> String {
        format!(
            "{}/gateway/affirm?action=complete_checkout&order_id={}&order_key={}&nonce={}",
            self.base_url, order.id, order.order_key, nonce
        )
    }
}

impl Default for StoreUrls {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}
