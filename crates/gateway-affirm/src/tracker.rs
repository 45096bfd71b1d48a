//! # Affirm Error Tracker
//!
//! [`TrackerSink`] that posts reports to Affirm's partner-solutions
//! tracker endpoint.

use crate::config::AffirmConfig;
use async_trait::async_trait;
use gateway_core::{ErrorReport, PaymentError, PaymentResult, TrackerSink};
use reqwest::Client;

pub struct AffirmTracker {
    config: AffirmConfig,
    client: Client,
}

impl AffirmTracker {
    pub fn new(config: AffirmConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(config.tracker_timeout)
            .build()
            .map_err(|e| PaymentError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl TrackerSink for AffirmTracker {
    async fn deliver(&self, report: &ErrorReport) -> PaymentResult<()> {
        let (country, keys) = self.config.tracker_keys(report.country).ok_or_else(|| {
            PaymentError::Configuration("no Affirm API keys for the error tracker".to_string())
        })?;

        let response = self
            .client
            .post(self.config.tracker_url())
            .basic_auth(&keys.public_key, Some(&keys.private_key))
            .header("Country-Code", country.alpha3())
            .json(report)
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaymentError::ProviderError {
                provider: "affirm".to_string(),
                message: format!("tracker returned HTTP {}", status),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyPair;
    use gateway_core::testing::recording_reporter;
    use gateway_core::{Country, Currency, ErrorKind, Order, TransactionStep};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tracker(server: &MockServer) -> AffirmTracker {
        let config = AffirmConfig::new(
            Some(KeyPair::new("pub_us", "priv_us")),
            Some(KeyPair::new("pub_ca", "priv_ca")),
        )
        .with_tracker_url(format!("{}/tracker", server.uri()));
        AffirmTracker::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_deliver_uses_order_country() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tracker"))
            .and(header("Country-Code", "CAN"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (reporter, mut rx) = recording_reporter();
        let order = Order::new("7", Currency::CAD, 500);
        reporter.report(
            TransactionStep::Capture,
            Some(&order),
            ErrorKind::TransactionDeclined,
            None,
            Some("Unable to capture"),
        );
        let report = rx.try_recv().unwrap();

        tracker(&server).deliver(&report).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["transaction_step"], "capture");
        assert_eq!(body["error_data"]["error_type"], "TRANSACTION_DECLINED");
        assert_eq!(body["error_data"]["error_message"], "Unable to capture");
    }

    #[tokio::test]
    async fn test_deliver_without_order_uses_us_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tracker"))
            .and(header("Country-Code", "USA"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (reporter, mut rx) = recording_reporter();
        reporter.report(
            TransactionStep::Auth,
            None,
            ErrorKind::InternalServerError,
            None,
            None,
        );
        let report = rx.try_recv().unwrap();

        let err = tracker(&server).deliver(&report).await.unwrap_err();
        assert!(matches!(err, PaymentError::ProviderError { .. }));
    }

    #[tokio::test]
    async fn test_deliver_without_order_uses_merchant_region() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tracker"))
            .and(header("Country-Code", "CAN"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = AffirmConfig::new(
            Some(KeyPair::new("pub_us", "priv_us")),
            Some(KeyPair::new("pub_ca", "priv_ca")),
        )
        .with_region(Country::Can)
        .with_tracker_url(format!("{}/tracker", server.uri()));

        let (reporter, mut rx) = recording_reporter();
        reporter.report(
            TransactionStep::Auth,
            None,
            ErrorKind::InternalServerError,
            None,
            None,
        );
        let report = rx.try_recv().unwrap();

        AffirmTracker::new(config).unwrap().deliver(&report).await.unwrap();
    }
}
