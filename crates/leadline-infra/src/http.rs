//! Reqwest-backed implementation of the engine's `Transport` trait.
//!
//! One shared `reqwest::Client` per transport; the per-request timeout comes
//! from the `TransportRequest` (the step executor resolves it from the step
//! configuration or the engine default).

use std::pin::Pin;
use std::time::Duration;

use leadline_core::workflow::transport::{
    Transport, TransportError, TransportRequest, TransportResponse,
};
use leadline_types::config::HttpSettings;

/// HTTP transport for workflow steps.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the given client settings.
    pub fn new(settings: &HttpSettings) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .user_agent("leadline-workflow/0.1")
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Wrap an existing client (for callers that share one).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&HttpSettings::default())
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let method: reqwest::Method = request
                .method
                .to_uppercase()
                .parse()
                .map_err(|_| {
                    TransportError::InvalidRequest(format!(
                        "invalid HTTP method: {}",
                        request.method
                    ))
                })?;

            let mut builder = self
                .client
                .request(method, &request.url)
                .timeout(request.timeout);
            for (key, value) in &request.headers {
                builder = builder.header(key.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| map_reqwest_error(e, request.timeout))?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        v.to_str().unwrap_or("<binary>").to_string(),
                    )
                })
                .collect();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;

            tracing::debug!(url = request.url.as_str(), status, "transport request completed");

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout)
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_builder() || error.is_request() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Io(error.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
