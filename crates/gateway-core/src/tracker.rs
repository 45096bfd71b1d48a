//! # Error Tracker
//!
//! Structured failure telemetry for the provider's monitoring endpoint.
//!
//! [`ErrorReporter::report`] builds the payload on the calling task and hands
//! it to a bounded channel with `try_send`; a background worker drains the
//! channel and delivers each report through a [`TrackerSink`] under a short
//! timeout. A full queue, a closed worker or a failed delivery only produce a
//! debug log.

use crate::error::{PaymentError, PaymentResult};
use crate::money::Country;
use crate::order::Order;
use async_trait::async_trait;
use serde::Serialize;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Max stack frames sent per report
pub const MAX_STACK_FRAMES: usize = 10;

/// What kind of failure is being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "INTERNAL_SERVER_ERROR")]
    InternalServerError,
    #[serde(rename = "TRANSACTION_DECLINED")]
    TransactionDeclined,
    #[serde(rename = "INVALID AMOUNT")]
    InvalidAmount,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorKind::TransactionDeclined => "TRANSACTION_DECLINED",
            ErrorKind::InvalidAmount => "INVALID AMOUNT",
        }
    }
}

/// Lifecycle step the failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStep {
    Auth,
    Capture,
    Void,
    Refund,
}

/// Provider environment the gateway runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Live,
}

impl Environment {
    pub fn from_sandbox(sandbox: bool) -> Self {
        if sandbox {
            Environment::Sandbox
        } else {
            Environment::Live
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub filename: String,
    pub lineno: u32,
    pub method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionData {
    pub platform: &'static str,
    pub environment: Environment,
    pub language: &'static str,
    pub code_version: &'static str,
    pub extension_version: &'static str,
    pub platform_version: &'static str,
}

impl ExtensionData {
    fn current(environment: Environment) -> Self {
        Self {
            platform: "affirm-gateway-rs",
            environment,
            language: "rust",
            code_version: option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown"),
            extension_version: env!("CARGO_PKG_VERSION"),
            platform_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub error_type: ErrorKind,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<StackFrame>,
}

/// One tracker payload. `country` and `order_id` route the delivery and are
/// not part of the body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub extension_data: ExtensionData,
    pub transaction_step: TransactionStep,
    pub error_data: ErrorData,
    #[serde(skip)]
    pub country: Option<Country>,
    #[serde(skip)]
    pub order_id: Option<String>,
}

/// Delivers reports to the monitoring endpoint
#[async_trait]
pub trait TrackerSink: Send + Sync {
    async fn deliver(&self, report: &ErrorReport) -> PaymentResult<()>;
}

/// Cheap, cloneable handle used by the lifecycle to queue reports
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<ErrorReport>,
    environment: Environment,
}

impl ErrorReporter {
    pub fn new(tx: mpsc::Sender<ErrorReport>, environment: Environment) -> Self {
        Self { tx, environment }
    }

    /// Reporter plus the receiving end of its queue
    pub fn channel(capacity: usize, environment: Environment) -> (Self, mpsc::Receiver<ErrorReport>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx, environment), rx)
    }

    /// Reporter whose reports go nowhere
    pub fn disabled() -> Self {
        let (reporter, _rx) = Self::channel(1, Environment::Sandbox);
        reporter
    }

    /// Reporter wired to a background delivery worker
    pub fn spawn(
        sink: Arc<dyn TrackerSink>,
        environment: Environment,
        capacity: usize,
        timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (reporter, rx) = Self::channel(capacity, environment);
        let handle = spawn_worker(rx, sink, timeout);
        (reporter, handle)
    }

    /// Queue a report. Never blocks and never fails.
    #[track_caller]
    pub fn report(
        &self,
        step: TransactionStep,
        order: Option<&Order>,
        kind: ErrorKind,
        error: Option<&PaymentError>,
        message: Option<&str>,
    ) {
        let caller = Location::caller();
        let error_message = match (message, error) {
            (Some(m), _) if !m.is_empty() => m.to_string(),
            (_, Some(e)) => e.to_string(),
            _ => kind.as_str().to_string(),
        };
        let (error_class, trace) = match error {
            Some(e) => (Some(e.class_name()), capture_frames(caller)),
            None => (None, Vec::new()),
        };

        let report = ErrorReport {
            extension_data: ExtensionData::current(self.environment),
            transaction_step: step,
            error_data: ErrorData {
                error_type: kind,
                error_message,
                error_class,
                trace,
            },
            country: order.map(|o| o.currency.country()),
            order_id: order.map(|o| o.id.clone()),
        };

        if let Err(e) = self.tx.try_send(report) {
            debug!("error tracker report dropped: {}", e);
        }
    }
}

/// Drain `rx` and deliver each report under `timeout`
pub fn spawn_worker(
    mut rx: mpsc::Receiver<ErrorReport>,
    sink: Arc<dyn TrackerSink>,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            match tokio::time::timeout(timeout, sink.deliver(&report)).await {
                Ok(Ok(())) => debug!(
                    step = ?report.transaction_step,
                    kind = report.error_data.error_type.as_str(),
                    "error tracker report delivered"
                ),
                Ok(Err(e)) => debug!("error tracker delivery failed: {}", e),
                Err(_) => debug!("error tracker delivery timed out"),
            }
        }
    })
}

/// Frames from a captured backtrace when backtraces are enabled, otherwise
/// just the reporting call site.
fn capture_frames(caller: &Location<'_>) -> Vec<StackFrame> {
    let backtrace = Backtrace::capture();
    let mut frames = match backtrace.status() {
        BacktraceStatus::Captured => parse_backtrace(&backtrace.to_string()),
        _ => Vec::new(),
    };
    if frames.is_empty() {
        frames.push(StackFrame {
            filename: caller.file().to_string(),
            lineno: caller.line(),
            method: "unknown".to_string(),
        });
    }
    frames.truncate(MAX_STACK_FRAMES);
    frames
}

fn parse_backtrace(rendered: &str) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut method: Option<String> = None;

    for line in rendered.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            let Some(name) = method.take() else { continue };
            if is_internal_frame(&name) {
                continue;
            }
            let mut parts = location.rsplitn(3, ':');
            let _column = parts.next();
            let lineno = parts.next().and_then(|l| l.parse().ok()).unwrap_or(0);
            let filename = parts.next().unwrap_or(location).to_string();
            frames.push(StackFrame {
                filename,
                lineno,
                method: name,
            });
            if frames.len() == MAX_STACK_FRAMES {
                break;
            }
        } else if let Some((index, name)) = line.split_once(": ") {
            if index.chars().all(|c| c.is_ascii_digit()) {
                method = Some(name.to_string());
            }
        }
    }
    frames
}

fn is_internal_frame(method: &str) -> bool {
    method.starts_with("std::")
        || method.starts_with("core::")
        || method.starts_with("gateway_core::tracker::")
}
