//! HTTP client for the mail-relay function

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::{MailRelay, MailRequest, MailResponse, RelayError};

#[derive(Clone)]
pub struct HttpMailRelay {
    client: reqwest::Client,
    function_url: String,
    api_key: String,
}

impl HttpMailRelay {
    pub fn new(
        function_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Network(e.to_string()))?;
        Ok(Self {
            client,
            function_url: function_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl MailRelay for HttpMailRelay {
    async fn send(&self, request: &MailRequest) -> Result<MailResponse, RelayError> {
        debug!(to = %request.to, attachments = request.attachments.len(), "Calling mail relay");
        let response = self
            .client
            .post(&self.function_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::RateLimited(body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;

        // The function reports delivery failures as JSON with a non-2xx status
        match serde_json::from_str::<MailResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(RelayError::Status {
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(RelayError::Decode(e.to_string())),
        }
    }
}
