//! # Request Handlers
//!
//! Axum request handlers for the gateway API: availability, order
//! registration, the checkout entry and return leg, and the admin
//! capture/void/refund actions.

use crate::state::AppState;
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Redirect},
    Form, Json,
};
use gateway_core::{
    check_availability, constant_time_eq, CaptureResult, CheckoutRedirect, CheckoutReturn, CompleteCheckout,
    Currency, Money, Order, PaymentError, RefundOutcome, Unavailable, GATEWAY_ID,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Cookie naming the order awaiting payment in the shopper's session
pub const AWAITING_ORDER_COOKIE: &str = "awaiting_order";

/// Query parameter carrying a checkout failure notice
pub const NOTICE_PARAM: &str = "affirm_notice";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Availability query
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// Cart total in cents
    pub total_cents: i64,
    /// Billing country (ISO alpha-2); empty means unknown
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub currency: Option<Currency>,
}

/// Availability response
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub title: String,
    pub description: String,
    pub min_total: i64,
    pub max_total: i64,
}

/// Register order request
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub id: String,
    /// Order key (generated when omitted)
    #[serde(default)]
    pub order_key: Option<String>,
    pub currency: Currency,
    /// Total in cents
    #[serde(default)]
    pub total_cents: Option<i64>,
    /// Total as a decimal string ("49.99"), used when `total_cents` is absent
    #[serde(default)]
    pub total: Option<String>,
}

/// Order with its charge record and gateway metadata
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub meta: BTreeMap<String, String>,
    pub authorized_amount: i64,
    pub captured_total: i64,
    pub auth_remaining: i64,
    pub can_refund: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
}

/// Begin checkout request
#[derive(Debug, Default, Deserialize)]
pub struct BeginCheckoutRequest {
    /// Key the storefront handed the shopper with the order
    #[serde(default)]
    pub order_key: String,
    /// Billing country (ISO alpha-2)
    #[serde(default)]
    pub billing_country: String,
}

/// Form body of the provider's return POST
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutTokenForm {
    #[serde(default)]
    pub checkout_token: Option<String>,
}

/// Capture request
#[derive(Debug, Default, Deserialize)]
pub struct CaptureRequest {
    /// Cents to capture; the remaining authorization when omitted or 0
    #[serde(default)]
    pub amount_cents: Option<i64>,
}

/// Capture response
#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub order_id: String,
    pub capture: CaptureResult,
}

/// Refund request
#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    /// Cents to refund; the refundable balance when omitted
    #[serde(default)]
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub reason: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn payment_error_to_response(err: PaymentError) -> ApiError {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message, 400)),
    )
}

/// Optional JSON body: a request without a JSON content type gets the
/// default; a malformed body is still rejected
fn optional_json<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err((
            rejection.status(),
            Json(
                ErrorResponse::new("Invalid request body", rejection.status().as_u16())
                    .with_details(rejection.body_text()),
            ),
        )),
    }
}

// =============================================================================
// Admin auth
// =============================================================================

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Unauthorized", 401)),
        )
    };

    let Some(expected) = state.config.admin_token.as_deref() else {
        warn!("admin request refused: ADMIN_TOKEN is not configured");
        return Err(unauthorized());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?;

    if tokens_match(expected, presented.trim()) {
        Ok(())
    } else {
        warn!("admin request refused: bad token");
        Err(unauthorized())
    }
}

/// Compare digests so the comparison time does not depend on the token
fn tokens_match(expected: &str, presented: &str) -> bool {
    constant_time_eq(
        &Sha256::digest(expected.as_bytes()),
        &Sha256::digest(presented.as_bytes()),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "affirm-gateway",
        "provider": state.lifecycle.provider_name(),
        "sandbox": state.settings().sandbox,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Whether the payment method is offered for a cart
#[instrument(skip(state))]
pub async fn availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Json<AvailabilityResponse> {
    let settings = state.settings();

    let checked = match query.currency {
        Some(currency) if !state.affirm.is_valid_for_use(currency) => Err("unsupported_currency"),
        _ => check_availability(
            query.total_cents,
            &query.country,
            settings.min_total(),
            settings.max_total(),
            settings.enabled,
        )
        .map_err(unavailable_reason),
    };

    Json(AvailabilityResponse {
        available: checked.is_ok(),
        reason: checked.err(),
        title: settings.title.clone(),
        description: settings.description.clone(),
        min_total: settings.min_total(),
        max_total: settings.max_total(),
    })
}

fn unavailable_reason(reason: Unavailable) -> &'static str {
    match reason {
        Unavailable::Disabled => "disabled",
        Unavailable::UnsupportedCountry => "unsupported_country",
        Unavailable::BelowMinimum => "below_minimum",
        Unavailable::AboveMaximum => "above_maximum",
    }
}

/// Register an order with the gateway
#[instrument(skip(state, headers, request), fields(order_id = %request.id))]
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderView>), ApiError> {
    require_admin(&state, &headers)?;

    if request.id.trim().is_empty() {
        return Err(bad_request("Order id is required"));
    }

    let total = match (request.total_cents, request.total.as_deref()) {
        (Some(cents), _) => cents,
        (None, Some(decimal)) => Money::parse_decimal(decimal, request.currency)
            .map_err(payment_error_to_response)?
            .amount,
        (None, None) => return Err(bad_request("total_cents or total is required")),
    };
    if total <= 0 {
        return Err(bad_request("Order total must be positive"));
    }

    let mut order = Order::new(request.id, request.currency, total);
    if let Some(key) = request.order_key.filter(|k| !k.is_empty()) {
        order = order.with_order_key(key);
    }

    state
        .store()
        .insert(order.clone())
        .await
        .map_err(payment_error_to_response)?;

    info!("Registered order {} for {}", order.id, order.total_money());
    Ok((StatusCode::CREATED, Json(order_view(&state, order))))
}

/// Order, charge record and dashboard link
#[instrument(skip(state, headers))]
pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    require_admin(&state, &headers)?;

    let order = state
        .store()
        .get(&order_id)
        .await
        .map_err(payment_error_to_response)?;

    Ok(Json(order_view(&state, order)))
}

fn order_view(state: &AppState, order: Order) -> OrderView {
    let charge = order.charge();
    OrderView {
        meta: charge.meta_entries(GATEWAY_ID),
        dashboard_url: charge.charge_id().map(|id| state.affirm.dashboard_url(id)),
        authorized_amount: order.authorized_amount(),
        captured_total: order.captured_total(),
        auth_remaining: order.auth_remaining(),
        can_refund: order.can_refund(),
        order,
    }
}

/// Start the provider checkout for an order
#[instrument(skip(state, body))]
pub async fn begin_checkout(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    body: Result<Json<BeginCheckoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = optional_json(body)?;

    let redirect: CheckoutRedirect = state
        .checkout
        .begin_checkout(&order_id, &request.order_key, &request.billing_country)
        .await
        .map_err(|e| {
            warn!("Checkout not started: {}", e);
            payment_error_to_response(e)
        })?;

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        AWAITING_ORDER_COOKIE, redirect.order_id
    );
    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Json(redirect)))
}

/// Provider return leg (`POST /gateway/affirm?action=complete_checkout&...`)
#[instrument(skip(state, headers, query, form), fields(order_id = ?query.order_id))]
pub async fn complete_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CompleteCheckout>,
    form: Result<Form<CheckoutTokenForm>, FormRejection>,
) -> Redirect {
    let mut request = query;
    if let Ok(Form(CheckoutTokenForm {
        checkout_token: Some(token),
    })) = form
    {
        request.checkout_token = Some(token);
    }
    request.fallback_order_id = cookie_value(&headers, AWAITING_ORDER_COOKIE);

    let result = state.checkout.complete_checkout(request).await;
    match &result {
        CheckoutReturn::Completed { outcome, .. } => info!("Checkout completed: {:?}", outcome),
        CheckoutReturn::Failed { notice, .. } => warn!("Checkout failed: {}", notice),
        CheckoutReturn::Ignored { .. } => info!("Checkout return ignored"),
    }

    let location = match &result {
        CheckoutReturn::Failed { redirect, notice } => with_notice(redirect, notice),
        other => other.redirect().to_string(),
    };
    Redirect::to(&location)
}

/// Append the failure notice to a redirect URL
fn with_notice(redirect: &str, notice: &str) -> String {
    match reqwest::Url::parse(redirect) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(NOTICE_PARAM, notice);
            url.to_string()
        }
        Err(_) => redirect.to_string(),
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Capture an authorized charge
#[instrument(skip(state, headers, body))]
pub async fn capture(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    body: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<Json<CaptureResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let request = optional_json(body)?;

    let capture = state
        .lifecycle
        .capture(&order_id, request.amount_cents)
        .await
        .map_err(payment_error_to_response)?;

    info!("Captured {} cents on order {}", capture.captured_amount, order_id);
    Ok(Json(CaptureResponse { order_id, capture }))
}

/// Void an uncaptured authorization
#[instrument(skip(state, headers))]
pub async fn void(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers)?;

    state
        .lifecycle
        .void(&order_id)
        .await
        .map_err(payment_error_to_response)?;

    Ok(Json(serde_json::json!({
        "order_id": order_id,
        "voided": true
    })))
}

/// Refund captured funds, or void an order that was never captured
#[instrument(skip(state, headers, request))]
pub async fn refund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    Json(request): Json<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers)?;

    let outcome = state
        .lifecycle
        .refund(&order_id, request.amount_cents, &request.reason)
        .await
        .map_err(payment_error_to_response)?;

    let body = match outcome {
        RefundOutcome::Voided => serde_json::json!({
            "order_id": order_id,
            "outcome": "voided"
        }),
        RefundOutcome::Refunded(refund) => serde_json::json!({
            "order_id": order_id,
            "outcome": "refunded",
            "refund": refund
        }),
    };
    Ok(Json(body))
}

/// Order received page
pub async fn order_received(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> impl IntoResponse {
    let order = match state.store().get(&order_id).await {
        Ok(order) if params.get("key").is_some_and(|key| order.key_is_valid(key)) => order,
        _ => {
            return (
                StatusCode::NOT_FOUND,
                Html("<h1>Order not found</h1>".to_string()),
            )
        }
    };

    (
        StatusCode::OK,
        Html(format!(
            r#"
<!DOCTYPE html>
<html>
<head><title>Order Received</title></head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0;">
    <div style="padding: 60px; border-radius: 16px; text-align: center;">
        <h1>Thank you. Your order has been received.</h1>
        <p>Order: <code>{}</code></p>
        <p>Total: {}</p>
        <p style="color: #666;">Status: {:?}</p>
    </div>
</body>
</html>
"#,
            escape_html(&order.id),
            order.total_money(),
            order.status()
        )),
    )
}

/// Checkout page, showing the failure notice if any
pub async fn checkout_page(
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> impl IntoResponse {
    let notice = params
        .get(NOTICE_PARAM)
        .map(|n| format!(r#"<p style="color: #b00020;">{}</p>"#, escape_html(n)))
        .unwrap_or_default();

    Html(format!(
        r#"
<!DOCTYPE html>
<html>
<head><title>Checkout</title></head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0;">
    <div style="padding: 60px; border-radius: 16px; text-align: center;">
        <h1>Checkout</h1>
        {}
    </div>
</body>
</html>
"#,
        notice
    ))
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
