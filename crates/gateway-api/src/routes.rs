//! # Routes
//!
//! Axum router configuration for the gateway API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Public:
///   - GET  /health - Health check
///   - GET  /api/v1/availability - Whether Affirm is offered for a cart
///   - POST /api/v1/orders/{id}/checkout - Begin checkout
///
/// - Admin (bearer token):
///   - POST /api/v1/orders - Register an order
///   - GET  /api/v1/orders/{id} - Order, charge record, dashboard link
///   - POST /api/v1/orders/{id}/capture - Capture
///   - POST /api/v1/orders/{id}/void - Void
///   - POST /api/v1/orders/{id}/refund - Refund
///
/// - Provider return leg (nonce-guarded):
///   - POST /gateway/affirm?action=complete_checkout
///
/// - Storefront pages:
///   - GET /checkout - Checkout page with failure notice
///   - GET /checkout/order-received/{id} - Order received page
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let order_routes = Router::new()
        .route("/", post(handlers::create_order))
        .route("/{order_id}", get(handlers::get_order))
        .route("/{order_id}/checkout", post(handlers::begin_checkout))
        .route("/{order_id}/capture", post(handlers::capture))
        .route("/{order_id}/void", post(handlers::void))
        .route("/{order_id}/refund", post(handlers::refund));

    let api_routes = Router::new()
        .route("/availability", get(handlers::availability))
        .nest("/orders", order_routes);

    let checkout_routes = Router::new()
        .route("/", get(handlers::checkout_page))
        .route("/order-received/{order_id}", get(handlers::order_received));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api/v1", api_routes)
        .route("/gateway/affirm", post(handlers::complete_checkout))
        .nest("/checkout", checkout_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;
    use axum::http::{header, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use gateway_affirm::{AffirmConfig, KeyPair};
    use gateway_core::testing::{recording_reporter, MockChargeApi, MockReply};
    use gateway_core::{
        ErrorReport, GatewaySettings, InMemoryOrderStore, TransactionMode,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    const ADMIN: &str = "admin-secret";

    struct Harness {
        server: TestServer,
        api: Arc<MockChargeApi>,
        reports: mpsc::Receiver<ErrorReport>,
    }

    fn harness(api: MockChargeApi, settings: GatewaySettings) -> Harness {
        let api = Arc::new(api);
        let (reporter, reports) = recording_reporter();
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: "http://shop.test".to_string(),
            environment: "test".to_string(),
            admin_token: Some(ADMIN.to_string()),
            nonce_secret: "nonce-secret".to_string(),
        };
        let affirm = AffirmConfig::new(Some(KeyPair::new("pub_us", "priv_us")), None);
        let state = AppState::with_parts(
            config,
            affirm,
            api.clone(),
            Arc::new(InMemoryOrderStore::new()),
            reporter,
            settings,
        );
        let server = TestServer::new(create_router(state)).unwrap();
        Harness {
            server,
            api,
            reports,
        }
    }

    fn bearer() -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", ADMIN)).unwrap()
    }

    async fn register(server: &TestServer, id: &str, total_cents: i64) {
        server
            .post("/api/v1/orders")
            .add_header(header::AUTHORIZATION, bearer())
            .json(&json!({
                "id": id,
                "order_key": format!("key_{}", id),
                "currency": "USD",
                "total_cents": total_cents
            }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    async fn begin(server: &TestServer, id: &str) -> Value {
        let response = server
            .post(&format!("/api/v1/orders/{}/checkout", id))
            .json(&json!({ "order_key": format!("key_{}", id), "billing_country": "US" }))
            .await;
        response.assert_status_ok();
        response.json::<Value>()
    }

    /// Return-leg path from the confirmation URL handed out at checkout
    fn return_path(checkout: &Value) -> String {
        let url = checkout["confirmation_url"].as_str().unwrap();
        url.trim_start_matches("http://shop.test").to_string()
    }

    fn location(response: &axum_test::TestResponse) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn order(server: &TestServer, id: &str) -> Value {
        let response = server
            .get(&format!("/api/v1/orders/{}", id))
            .add_header(header::AUTHORIZATION, bearer())
            .await;
        response.assert_status_ok();
        response.json::<Value>()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(MockChargeApi::new(), GatewaySettings::default());
        let response = h.server.get("/health").await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["provider"], "mock");
    }

    #[tokio::test]
    async fn test_availability() {
        let h = harness(MockChargeApi::new(), GatewaySettings::default());

        let body = h
            .server
            .get("/api/v1/availability?total_cents=5000&country=US&currency=USD")
            .await
            .json::<Value>();
        assert_eq!(body["available"], true);
        assert_eq!(body["min_total"], 100);

        let body = h
            .server
            .get("/api/v1/availability?total_cents=50&country=US")
            .await
            .json::<Value>();
        assert_eq!(body["available"], false);
        assert_eq!(body["reason"], "below_minimum");

        let body = h
            .server
            .get("/api/v1/availability?total_cents=5000&country=FR")
            .await
            .json::<Value>();
        assert_eq!(body["reason"], "unsupported_country");

        // No CA keys configured
        let body = h
            .server
            .get("/api/v1/availability?total_cents=5000&country=CA&currency=CAD")
            .await
            .json::<Value>();
        assert_eq!(body["reason"], "unsupported_currency");
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let h = harness(MockChargeApi::new(), GatewaySettings::default());

        h.server
            .post("/api/v1/orders")
            .json(&json!({ "id": "1", "currency": "USD", "total_cents": 100 }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        h.server
            .post("/api/v1/orders/1/void")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_order_from_decimal_total() {
        let h = harness(MockChargeApi::new(), GatewaySettings::default());

        let response = h
            .server
            .post("/api/v1/orders")
            .add_header(header::AUTHORIZATION, bearer())
            .json(&json!({ "id": "42", "currency": "USD", "total": "49.99" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body = response.json::<Value>();
        assert_eq!(body["order"]["total"], 4999);
        assert_eq!(body["can_refund"], false);

        // Duplicate id
        h.server
            .post("/api/v1/orders")
            .add_header(header::AUTHORIZATION, bearer())
            .json(&json!({ "id": "42", "currency": "USD", "total_cents": 100 }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        h.server
            .get("/api/v1/orders/missing")
            .add_header(header::AUTHORIZATION, bearer())
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_checkout_round_trip_captures() {
        let h = harness(
            MockChargeApi::approving("ch_1", 5000),
            GatewaySettings::default(),
        );
        register(&h.server, "1001", 5000).await;

        let checkout = begin(&h.server, "1001").await;
        assert_eq!(checkout["amount"], 5000);
        assert_eq!(checkout["cancel_url"], "http://shop.test/checkout");

        let response = h
            .server
            .post(&return_path(&checkout))
            .form(&[("checkout_token", "tok_1")])
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "http://shop.test/checkout/order-received/1001?key=key_1001"
        );

        let body = order(&h.server, "1001").await;
        assert_eq!(body["order"]["status"], "processing");
        assert_eq!(body["captured_total"], 5000);
        assert_eq!(body["meta"]["_wc_gateway_affirm_charge_id"], "ch_1");
        assert_eq!(
            body["dashboard_url"],
            "https://sandbox.affirm.com/dashboard/#/details/ch_1"
        );
        assert_eq!(h.api.capture_calls(), vec![5000]);

        // Nonce was consumed: replaying the return leg does nothing
        let replay = h
            .server
            .post(&return_path(&checkout))
            .form(&[("checkout_token", "tok_1")])
            .await;
        assert_eq!(location(&replay), "http://shop.test/checkout");
        assert_eq!(h.api.capture_calls(), vec![5000]);
    }

    #[tokio::test]
    async fn test_return_leg_falls_back_to_awaiting_order_cookie() {
        let settings = GatewaySettings::default().with_transaction_mode(TransactionMode::AuthOnly);
        let h = harness(MockChargeApi::approving("ch_2", 2500), settings);
        register(&h.server, "2002", 2500).await;

        let checkout = begin(&h.server, "2002").await;
        let nonce = checkout["nonce"].as_str().unwrap();

        let response = h
            .server
            .post(&format!(
                "/gateway/affirm?action=complete_checkout&nonce={}",
                nonce
            ))
            .add_header(header::COOKIE, HeaderValue::from_static("awaiting_order=2002"))
            .form(&[("checkout_token", "tok_2")])
            .await;
        assert_eq!(
            location(&response),
            "http://shop.test/checkout/order-received/2002?key=key_2002"
        );

        let body = order(&h.server, "2002").await;
        assert_eq!(body["order"]["status"], "on-hold");
        assert_eq!(body["auth_remaining"], 2500);
        assert!(h.api.capture_calls().is_empty());
    }

    #[tokio::test]
    async fn test_return_leg_failure_carries_notice() {
        // Exchange rejects the token
        let mut h = harness(MockChargeApi::new(), GatewaySettings::default());
        register(&h.server, "3003", 5000).await;
        let checkout = begin(&h.server, "3003").await;

        let response = h
            .server
            .post(&return_path(&checkout))
            .form(&[("checkout_token", "tok_bad")])
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        let redirect = location(&response);
        assert!(redirect.starts_with("http://shop.test/checkout?affirm_notice="));
        assert!(redirect.contains("Unable+to+exchange+token"));

        let page = h.server.get(redirect.trim_start_matches("http://shop.test")).await;
        page.assert_status_ok();
        assert!(page.text().contains("Unable to exchange token with Affirm"));

        let body = order(&h.server, "3003").await;
        assert_eq!(body["order"]["status"], "pending");

        let report = h.reports.try_recv().unwrap();
        assert_eq!(report.order_id.as_deref(), Some("3003"));
    }

    #[tokio::test]
    async fn test_unsupported_action() {
        let h = harness(MockChargeApi::new(), GatewaySettings::default());
        let response = h.server.post("/gateway/affirm?action=delete_everything").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert!(location(&response).contains("not+supported"));
    }

    #[tokio::test]
    async fn test_admin_capture_void_and_refund() {
        let settings = GatewaySettings::default().with_transaction_mode(TransactionMode::AuthOnly);
        let api = MockChargeApi::approving("ch_4", 10000);
        let h = harness(api, settings);

        for id in ["4001", "4002"] {
            register(&h.server, id, 10000).await;
            let checkout = begin(&h.server, id).await;
            h.server
                .post(&return_path(&checkout))
                .form(&[("checkout_token", "tok")])
                .await
                .assert_status(StatusCode::SEE_OTHER);
        }

        // Partial capture, then refund part of it
        let response = h
            .server
            .post("/api/v1/orders/4001/capture")
            .add_header(header::AUTHORIZATION, bearer())
            .json(&json!({ "amount_cents": 4000 }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["capture"]["captured_amount"], 4000);

        // Void is refused once anything was captured
        h.server
            .post("/api/v1/orders/4001/void")
            .add_header(header::AUTHORIZATION, bearer())
            .await
            .assert_status(StatusCode::CONFLICT);

        let response = h
            .server
            .post("/api/v1/orders/4001/refund")
            .add_header(header::AUTHORIZATION, bearer())
            .json(&json!({ "amount_cents": 1500, "reason": "damaged" }))
            .await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["outcome"], "refunded");
        assert_eq!(body["refund"]["amount"], 1500);

        // Over-refund is rejected
        h.server
            .post("/api/v1/orders/4001/refund")
            .add_header(header::AUTHORIZATION, bearer())
            .json(&json!({ "amount_cents": 9000, "reason": "too much" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        // Uncaptured order: a full refund is a void
        let response = h
            .server
            .post("/api/v1/orders/4002/refund")
            .add_header(header::AUTHORIZATION, bearer())
            .json(&json!({ "reason": "changed mind" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["outcome"], "voided");

        let body = order(&h.server, "4002").await;
        assert_eq!(body["order"]["status"], "cancelled");
        assert_eq!(h.api.void_calls(), vec!["ch_4".to_string()]);
    }

    #[tokio::test]
    async fn test_declined_capture_maps_to_payment_required() {
        let settings = GatewaySettings::default().with_transaction_mode(TransactionMode::AuthOnly);
        let h = harness(MockChargeApi::approving("ch_5", 3000), settings);
        register(&h.server, "5001", 3000).await;
        let checkout = begin(&h.server, "5001").await;
        h.server
            .post(&return_path(&checkout))
            .form(&[("checkout_token", "tok")])
            .await;

        h.api.push_capture(MockReply::Decline);
        h.server
            .post("/api/v1/orders/5001/capture")
            .add_header(header::AUTHORIZATION, bearer())
            .await
            .assert_status(StatusCode::PAYMENT_REQUIRED);

        let body = order(&h.server, "5001").await;
        assert_eq!(body["order"]["status"], "on-hold");
        assert_eq!(body["captured_total"], 0);
    }

    #[tokio::test]
    async fn test_order_received_page_checks_key() {
        let h = harness(MockChargeApi::new(), GatewaySettings::default());
        register(&h.server, "6001", 1000).await;

        h.server
            .get("/checkout/order-received/6001?key=key_6001")
            .await
            .assert_status_ok();
        h.server
            .get("/checkout/order-received/6001?key=wrong")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_begin_checkout_on_paid_order_conflicts() {
        let h = harness(
            MockChargeApi::approving("ch_7", 1000),
            GatewaySettings::default(),
        );
        register(&h.server, "7001", 1000).await;
        let checkout = begin(&h.server, "7001").await;
        h.server
            .post(&return_path(&checkout))
            .form(&[("checkout_token", "tok")])
            .await;

        h.server
            .post("/api/v1/orders/7001/checkout")
            .json(&json!({ "order_key": "key_7001" }))
            .await
            .assert_status(StatusCode::CONFLICT);

        h.server
            .post("/api/v1/orders/missing/checkout")
            .json(&json!({ "order_key": "key_missing" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_begin_checkout_requires_order_key() {
        let h = harness(MockChargeApi::new(), GatewaySettings::default());
        register(&h.server, "7101", 1000).await;

        let anonymous = h.server.post("/api/v1/orders/7101/checkout").await;
        anonymous.assert_status(StatusCode::NOT_FOUND);
        assert!(anonymous.headers().get(header::SET_COOKIE).is_none());

        let wrong = h
            .server
            .post("/api/v1/orders/7101/checkout")
            .json(&json!({ "order_key": "key_7001", "billing_country": "US" }))
            .await;
        wrong.assert_status(StatusCode::NOT_FOUND);
        assert!(wrong.json::<Value>().get("confirmation_url").is_none());

        let checkout = begin(&h.server, "7101").await;
        assert!(checkout["confirmation_url"]
            .as_str()
            .unwrap()
            .contains("key_7101"));
    }
}
