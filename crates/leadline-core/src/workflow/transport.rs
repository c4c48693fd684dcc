//! Outbound HTTP seam.
//!
//! The engine is transport-agnostic: step execution only requires this
//! call/response contract. The concrete client (reqwest) lives in
//! leadline-infra; tests use scripted fakes. The trait is object-safe via
//! boxed futures so the step executor can hold `Arc<dyn Transport>`.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A fully resolved outbound request. All `{{path}}` tokens have already
/// been substituted by the time a request reaches the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// The transport-level response. Non-2xx statuses are valid responses here;
/// mapping them to step errors is the step executor's concern.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON, falling back to the raw string.
    pub fn json_body(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Transport-level failures (the request never produced a response).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection error: {0}")]
    Connect(String),

    /// The request exceeded its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request was malformed (bad method, unparseable URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The connection broke mid-exchange.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Connection, timeout, and I/O failures are transient; a malformed
    /// request will not improve with retries.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Object-safe transport contract, implemented by leadline-infra.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + '_>>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
