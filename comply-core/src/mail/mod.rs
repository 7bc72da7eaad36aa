//! Mail Relay Port
//!
//! SMTP lives behind a serverless function. This crate only shapes the
//! request payload and interprets the function's response.

mod http;
mod notifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

pub use http::HttpMailRelay;
pub use notifier::{
    DeliveryOutcome, EmailLogRow, EmailStatus, NotificationReport, NotifyError, NotifyRequest,
    QuoteNotifier, EMAIL_LOGS_TABLE,
};

/// File attached to an outgoing email (base64 content)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailAttachment {
    pub filename: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Payload accepted by the relay function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailRequest {
    pub to: String,
    pub subject: String,
    pub html: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<MailAttachment>,
}

/// Response of the relay function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MailResponse {
    /// Human-readable failure text, if the relay reported one
    pub fn failure_reason(&self) -> Option<String> {
        if self.success {
            return None;
        }
        Some(
            self.error
                .clone()
                .or_else(|| self.message.clone())
                .unwrap_or_else(|| "mail relay reported failure".to_string()),
        )
    }
}

/// Transport-level failure talking to the relay
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by mail relay: {0}")]
    RateLimited(String),

    #[error("Mail relay returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed mail relay response: {0}")]
    Decode(String),
}

impl RelayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Network(_) => ErrorCode::NetworkError,
            Self::RateLimited(_) => ErrorCode::RateLimitExceeded,
            Self::Status { .. } | Self::Decode(_) => ErrorCode::SystemError,
        }
    }
}

#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn send(&self, request: &MailRequest) -> Result<MailResponse, RelayError>;
}
