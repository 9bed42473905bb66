use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{
    config::TransportConfig,
    error::TransportError,
    models::{
        common::VerificationEndpoint,
        wire::{ReceiptRequest, ReceiptResponse},
    },
};

/// Performs a single HTTP POST to a verification endpoint.
#[async_trait]
pub trait VerificationTransport: Send + Sync {
    async fn post_receipt(
        &self,
        endpoint: &VerificationEndpoint,
        request: &ReceiptRequest,
    ) -> Result<ReceiptResponse, TransportError>;
}

pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl VerificationTransport for HttpTransport {
    #[instrument(skip(self, request), fields(url = %endpoint.url, vendor = endpoint.is_vendor_fallback))]
    async fn post_receipt(
        &self,
        endpoint: &VerificationEndpoint,
        request: &ReceiptRequest,
    ) -> Result<ReceiptResponse, TransportError> {
        let response = self
            .http_client
            .post(&endpoint.url)
            .json(request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(TransportError::Unreachable(format!(
                "endpoint returned HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(TransportError::InvalidRequest(format!(
                "endpoint returned HTTP {status}"
            )));
        }

        let parsed: ReceiptResponse = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        debug!(status = parsed.status, "verification endpoint replied");
        Ok(parsed)
    }
}

fn classify_send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Unreachable(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else if err.is_decode() {
        TransportError::InvalidResponse(err.to_string())
    } else {
        // Interrupted transfers, resets and other mid-flight failures are
        // connectivity-shaped.
        TransportError::Unreachable(err.to_string())
    }
}
