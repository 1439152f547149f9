//! HTTP sender
//!
//! [`HttpSender`] posts batches to the collector and classifies the outcome.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use logship_transport::{HttpSender, HttpSenderConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sender = HttpSender::new(HttpSenderConfig {
//!     endpoint: "https://collector.example.com".into(),
//!     app_secret: "app-secret".into(),
//!     install_id: uuid::Uuid::new_v4(),
//!     timeout: Duration::from_secs(30),
//! })?;
//! // Hand `sender` to the channel group as its ISender...
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use logship_core::config::TransportConfig;
use logship_core::domain::{IngestionError, TransportError};
use logship_core::ports::{Batch, ISender, SendResult};

use crate::retry_after;
use crate::wire::{BatchEnvelope, BatchResponse};

/// Path of the batch endpoint, relative to the configured endpoint
pub const LOGS_PATH: &str = "/v1/logs";

/// Header carrying the application secret
pub const APP_SECRET_HEADER: &str = "App-Secret";

/// Header carrying the installation id
pub const INSTALL_ID_HEADER: &str = "Install-ID";

/// Connection settings of an [`HttpSender`]
#[derive(Debug, Clone)]
pub struct HttpSenderConfig {
    /// Collector base URL, without the `/v1/logs` suffix
    pub endpoint: String,
    pub app_secret: String,
    pub install_id: Uuid,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl HttpSenderConfig {
    /// Builds sender settings from the `transport` config section.
    ///
    /// # Errors
    ///
    /// `IngestionError::Configuration` when no app secret is configured.
    pub fn from_config(config: &TransportConfig, install_id: Uuid) -> Result<Self, IngestionError> {
        let app_secret = config.app_secret.clone().ok_or_else(|| {
            IngestionError::Configuration("transport.app_secret is not set".to_string())
        })?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            app_secret,
            install_id,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

/// reqwest-based implementation of [`ISender`]
pub struct HttpSender {
    client: Client,
    url: String,
    app_secret: String,
    install_id: Uuid,
    offline: AtomicBool,
}

impl HttpSender {
    /// Creates a sender with its own connection pool
    ///
    /// # Errors
    ///
    /// `IngestionError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: HttpSenderConfig) -> Result<Self, IngestionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("logship/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestionError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}{}", config.endpoint.trim_end_matches('/'), LOGS_PATH),
            app_secret: config.app_secret,
            install_id: config.install_id,
            offline: AtomicBool::new(false),
        })
    }

    /// Full URL batches are posted to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// While offline, every send reports `ConnectionPaused` without network I/O
    pub fn set_offline(&self, offline: bool) {
        let was = self.offline.swap(offline, Ordering::AcqRel);
        if was != offline {
            info!(offline, "Transport connectivity changed");
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Acquire)
    }

    async fn post(&self, batch: &Batch) -> Result<SendResult, TransportError> {
        let body = serde_json::to_vec(&BatchEnvelope::from_batch(batch))
            .map_err(|e| TransportError::InvalidResponse(format!("encode batch: {e}")))?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(APP_SECRET_HEADER, &self.app_secret)
            .header(INSTALL_ID_HEADER, self.install_id.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = if status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::SERVICE_UNAVAILABLE
            {
                retry_after::from_headers(response.headers())
            } else {
                None
            };
            return Err(TransportError::ConnectionHttpError {
                code: status.as_u16(),
                retry_after,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        match BatchResponse::parse(&body) {
            Ok(parsed) => Ok(parsed.into_send_result(batch)),
            Err(e) => {
                // The status already says the batch was accepted
                warn!(batch_id = %batch.id, error = %e, "Ignoring unreadable success body");
                Ok(SendResult::Success)
            }
        }
    }
}

#[async_trait::async_trait]
impl ISender for HttpSender {
    async fn send(&self, batch: &Batch) -> SendResult {
        if self.is_offline() {
            debug!(batch_id = %batch.id, "Transport offline, not sending");
            return SendResult::Recoverable(TransportError::ConnectionPaused);
        }

        debug!(
            batch_id = %batch.id,
            priority = %batch.priority,
            count = batch.len(),
            "Sending batch"
        );

        match self.post(batch).await {
            Ok(result) => result,
            Err(e) => {
                let result = SendResult::from_error(e);
                match &result {
                    SendResult::Fatal(e) => warn!(batch_id = %batch.id, error = %e, "Batch rejected"),
                    _ => debug!(batch_id = %batch.id, ?result, "Batch send failed"),
                }
                result
            }
        }
    }
}
