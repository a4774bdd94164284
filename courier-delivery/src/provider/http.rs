use std::time::Duration;

use async_trait::async_trait;
use courier_common::outgoing;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{DeliveryProvider, ProviderReceipt};
use crate::error::{DeliveryError, PermanentError, SystemError, TemporaryError};

fn default_url() -> String {
    "http://localhost:3001/send".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Configuration for the HTTP delivery provider
///
/// # Example
/// ```ron
/// provider: (
///     url: "https://sms.example.com/send",
///     token: Some("secret"),
///     timeout_secs: 10,
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Endpoint receiving `POST` requests
    #[serde(default = "default_url")]
    pub url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    phone_number: &'a str,
    content: &'a str,
}

/// Provider speaking a small JSON-over-HTTP protocol
///
/// Requests are `POST {"phone_number", "content"}`; a 2xx reply carries
/// `{"message", "messageId"}`. Status codes are classified as:
///
/// - **2xx** → receipt
/// - **429** → Temporary (rate limited)
/// - **other 4xx** → Permanent
/// - **5xx and anything else** → Temporary
#[derive(Debug, Clone)]
pub struct HttpDeliveryProvider {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpDeliveryProvider {
    /// Build a provider from configuration
    ///
    /// # Errors
    /// If the HTTP client cannot be constructed
    pub fn new(config: &ProviderConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SystemError::Configuration(format!("Invalid HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn classify_status(status: StatusCode, body: String) -> DeliveryError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        TemporaryError::RateLimited(body).into()
    } else if status.is_client_error() {
        PermanentError::Rejected {
            status: status.as_u16(),
            body,
        }
        .into()
    } else {
        TemporaryError::ServerError {
            status: status.as_u16(),
            body,
        }
        .into()
    }
}

#[async_trait]
impl DeliveryProvider for HttpDeliveryProvider {
    async fn send(&self, destination: &str, body: &str) -> Result<ProviderReceipt, DeliveryError> {
        let mut request = self.client.post(&self.url).json(&SendRequest {
            phone_number: destination,
            content: body,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        outgoing!(level = DEBUG, status = %status, url = %self.url, "Provider responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        Ok(response.json::<ProviderReceipt>().await?)
    }
}
