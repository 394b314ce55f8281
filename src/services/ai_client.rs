//! HTTP client for the AI narrative service.
//!
//! The service receives the deterministic evaluation report plus bounded
//! tender/bid context and returns natural-language summary, reasons and
//! recommendation text. Transient failures (connection errors, 5xx) are
//! retried with exponential backoff inside the request timeout; everything
//! else is permanent.

use anyhow::{Context, Result};
use backoff::ExponentialBackoffBuilder;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum AiClientError {
    #[error("AI service unavailable: {0}")]
    Unavailable(String),

    #[error("AI service returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("invalid AI service response: {0}")]
    Decode(String),
}

/// Client for the AI narrative service.
#[derive(Clone)]
pub struct AiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl AiClient {
    pub fn new(base_url: &str, token: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(base_url = base_url, "AI client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Make a POST request, retrying transient failures.
    async fn post<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, AiClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "AI service request");

        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(Duration::from_secs(10)))
            .build();

        let response = backoff::future::retry(backoff, || async {
            let result = self
                .client
                .post(&url)
                .header("X-Internal-Token", &self.token)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_server_error() => {
                    Err(backoff::Error::transient(AiClientError::Status {
                        status: response.status(),
                        message: "server error".to_string(),
                    }))
                }
                Ok(response) => Ok(response),
                Err(e) => Err(backoff::Error::transient(AiClientError::Unavailable(
                    e.to_string(),
                ))),
            }
        })
        .await
        .map_err(|e| {
            error!(error = %e, "AI service request failed");
            e
        })?;

        let status = response.status();
        if status.is_success() {
            response.json::<R>().await.map_err(|e| {
                error!(error = %e, "Failed to parse AI service response");
                AiClientError::Decode(e.to_string())
            })
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "no response body".to_string());
            error!(status = %status, message = %message, "AI service error");
            Err(AiClientError::Status { status, message })
        }
    }

    /// Check AI service health.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("AI service health check failed")?
            .error_for_status()
            .context("AI service unhealthy")?;

        Ok(())
    }

    /// Generate narrative text for a bid evaluation report.
    pub async fn generate_bid_narrative<T: Serialize, R: DeserializeOwned>(
        &self,
        request: &T,
    ) -> Result<R, AiClientError> {
        self.post("/v1/tenders/bid-narrative", request).await
    }
}
