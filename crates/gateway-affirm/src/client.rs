//! # Affirm Charge Client
//!
//! [`ChargeApi`] over the Affirm Transactions API v1.
//!
//! | Operation | Request |
//! |---|---|
//! | exchange token | `POST /transactions {transaction_id, order_id}` |
//! | capture | `POST /transactions/{id}/capture {amount}` |
//! | void | `POST /transactions/{id}/void` |
//! | refund | `POST /transactions/{id}/refund {amount}` |
//!
//! Requests use Basic auth with the region's key pair and a `Country-Code`
//! header. Capture and refund carry an `Idempotency-Key`. Transport errors,
//! timeouts and non-2xx answers on capture/void/refund are declines; on the
//! token exchange they are `TokenExchange` errors.

use crate::config::AffirmConfig;
use async_trait::async_trait;
use gateway_core::{
    CaptureResult, ChargeApi, Country, ExpectedCharge, PaymentError, PaymentResult, RefundResult,
    TokenExchange,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

/// Affirm Transactions API client
pub struct AffirmChargeClient {
    config: AffirmConfig,
    client: Client,
}

impl AffirmChargeClient {
    /// Create a new client
    pub fn new(config: AffirmConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        Self::new(AffirmConfig::from_env()?)
    }

    pub fn config(&self) -> &AffirmConfig {
        &self.config
    }

    async fn post(
        &self,
        country: Country,
        path: &str,
        body: Option<serde_json::Value>,
        idempotency_key: Option<&str>,
    ) -> PaymentResult<(StatusCode, String)> {
        let keys = self.config.keys_for(country)?;
        let url = format!("{}{}", self.config.api_base_url(country), path);

        let mut request = self
            .client
            .post(&url)
            .basic_auth(&keys.public_key, Some(&keys.private_key))
            .header("Country-Code", country.alpha3());
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        debug!(%status, path, "affirm response");
        Ok((status, body))
    }

    /// POST and parse a 2xx JSON body; `None` on anything else
    async fn post_for<T: for<'de> Deserialize<'de>>(
        &self,
        country: Country,
        path: &str,
        body: Option<serde_json::Value>,
        idempotency_key: Option<&str>,
    ) -> PaymentResult<Option<T>> {
        let (status, body) = match self.post(country, path, body, idempotency_key).await {
            Ok(answer) => answer,
            Err(PaymentError::NetworkError(e)) => {
                warn!(path, "affirm request failed: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !status.is_success() {
            warn!(path, %status, "affirm declined: {}", provider_message(&body));
            return Ok(None);
        }

        match serde_json::from_str(&body) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                error!(path, "unexpected affirm response: {}", e);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ChargeApi for AffirmChargeClient {
    #[instrument(skip(self, token, expected), fields(order_id = %expected.order_id))]
    async fn exchange_token(
        &self,
        token: &str,
        country: Country,
        expected: &ExpectedCharge,
    ) -> PaymentResult<TokenExchange> {
        let body = json!({
            "transaction_id": token,
            "order_id": expected.order_id,
        });

        let (status, body) = self
            .post(country, "/transactions", Some(body), None)
            .await
            .map_err(|e| match e {
                PaymentError::Configuration(_) => e,
                other => PaymentError::TokenExchange(other.to_string()),
            })?;

        if !status.is_success() {
            error!(%status, "token exchange failed: {}", provider_message(&body));
            return Err(PaymentError::TokenExchange(format!(
                "HTTP {}: {}",
                status,
                provider_message(&body)
            )));
        }

        let transaction: AffirmTransaction = serde_json::from_str(&body).map_err(|e| {
            PaymentError::TokenExchange(format!("failed to parse Affirm response: {}", e))
        })?;

        let validates = transaction.order_id.as_deref() == Some(expected.order_id.as_str());
        let amount_validation = transaction.amount == expected.amount;
        info!(
            charge_id = %transaction.id,
            validates,
            amount_validation,
            "exchanged checkout token"
        );

        Ok(TokenExchange {
            charge_id: transaction.id,
            validates,
            amount_validation,
            authorized_amount: transaction.amount,
        })
    }

    #[instrument(skip(self))]
    async fn capture(
        &self,
        charge_id: &str,
        amount: i64,
        country: Country,
        idempotency_key: &str,
    ) -> PaymentResult<Option<CaptureResult>> {
        let path = format!("/transactions/{}/capture", charge_id);
        let event: Option<AffirmEvent> = self
            .post_for(
                country,
                &path,
                Some(json!({ "amount": amount })),
                Some(idempotency_key),
            )
            .await?;

        Ok(event.map(|event| CaptureResult {
            fee: event.fee.unwrap_or(0),
            captured_amount: event.amount,
            event_id: event.id,
        }))
    }

    #[instrument(skip(self))]
    async fn void(&self, charge_id: &str, country: Country) -> PaymentResult<bool> {
        let path = format!("/transactions/{}/void", charge_id);
        let event: Option<serde_json::Value> = self.post_for(country, &path, None, None).await?;
        Ok(event.is_some())
    }

    #[instrument(skip(self))]
    async fn refund(
        &self,
        charge_id: &str,
        amount: i64,
        country: Country,
        idempotency_key: &str,
    ) -> PaymentResult<Option<RefundResult>> {
        let path = format!("/transactions/{}/refund", charge_id);
        let event: Option<AffirmEvent> = self
            .post_for(
                country,
                &path,
                Some(json!({ "amount": amount })),
                Some(idempotency_key),
            )
            .await?;

        Ok(event.map(|event| RefundResult {
            id: event.id,
            amount: event.amount,
            fee_refunded: event.fee_refunded.unwrap_or(0),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "affirm"
    }
}

/// Best human-readable part of an error body
fn provider_message(body: &str) -> String {
    serde_json::from_str::<AffirmErrorResponse>(body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

// =============================================================================
// Affirm API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct AffirmTransaction {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct AffirmEvent {
    id: String,
    amount: i64,
    #[serde(default)]
    fee: Option<i64>,
    #[serde(default)]
    fee_refunded: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AffirmErrorResponse {
    #[serde(default)]
    message: Option<String>,
}
