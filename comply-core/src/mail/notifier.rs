//! Quote notification workflow
//!
//! Resolve the template for a quote, fill in its placeholders, send one
//! email per recipient through the relay and write one `email_logs` row per
//! attempt. A failed delivery never aborts the rest of the batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{MailAttachment, MailRelay, MailRequest};
use crate::error::TemplateError;
use crate::model::{FormType, Modality};
use crate::persistence::Persistence;
use crate::templates::{TemplateRenderer, TemplateResolution, TemplateResolver};

pub const EMAIL_LOGS_TABLE: &str = "email_logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Enviado,
    Erro,
}

/// Row of the `email_logs` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailLogRow {
    pub destinatario: String,
    pub assunto: String,
    pub status: EmailStatus,
    pub erro: Option<String>,
    pub enviado_em: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NotifyRequest {
    pub form_type: FormType,
    pub modality: Modality,
    pub recipients: Vec<String>,
    /// Placeholder values
    pub variables: serde_json::Value,
    pub attachments: Vec<MailAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub recipient: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationReport {
    pub resolution: TemplateResolution,
    pub deliveries: Vec<DeliveryOutcome>,
}

impl NotificationReport {
    /// No template was available, nothing was sent
    pub fn skipped(&self) -> bool {
        self.resolution.template.is_none()
    }

    pub fn sent_count(&self) -> usize {
        self.deliveries.iter().filter(|d| d.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.deliveries.iter().filter(|d| !d.success).count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("No recipients given")]
    NoRecipients,

    #[error(transparent)]
    Template(#[from] TemplateError),
}

pub struct QuoteNotifier {
    resolver: Arc<TemplateResolver>,
    renderer: TemplateRenderer,
    relay: Arc<dyn MailRelay>,
    store: Arc<dyn Persistence>,
}

impl QuoteNotifier {
    pub fn new(
        resolver: Arc<TemplateResolver>,
        relay: Arc<dyn MailRelay>,
        store: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            resolver,
            renderer: TemplateRenderer::new(),
            relay,
            store,
        }
    }

    pub async fn notify(&self, request: &NotifyRequest) -> Result<NotificationReport, NotifyError> {
        if request.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let resolution = self
            .resolver
            .resolve(request.form_type, request.modality)
            .await?;

        let Some(template) = resolution.template.as_ref() else {
            warn!(
                form_type = %request.form_type,
                modality = %request.modality,
                reason = %resolution.fallback_reason,
                "No email template available, notification skipped"
            );
            return Ok(NotificationReport {
                resolution,
                deliveries: Vec::new(),
            });
        };

        let rendered = self.renderer.render(template, &request.variables)?;

        let mut deliveries = Vec::with_capacity(request.recipients.len());
        for recipient in &request.recipients {
            let mail = MailRequest {
                to: recipient.clone(),
                subject: rendered.subject.clone(),
                html: rendered.html.clone(),
                attachments: request.attachments.clone(),
            };

            let error = match self.relay.send(&mail).await {
                Ok(response) => response.failure_reason(),
                Err(e) => Some(format!("[{}] {}", e.code(), e)),
            };
            match &error {
                None => info!(to = %recipient, template_id = %template.id, "Quote email sent"),
                Some(reason) => warn!(to = %recipient, error = %reason, "Quote email failed"),
            }

            self.log_delivery(recipient, &rendered.subject, error.clone())
                .await;
            deliveries.push(DeliveryOutcome {
                recipient: recipient.clone(),
                success: error.is_none(),
                error,
            });
        }

        Ok(NotificationReport {
            resolution,
            deliveries,
        })
    }

    async fn log_delivery(&self, recipient: &str, subject: &str, error: Option<String>) {
        let row = EmailLogRow {
            destinatario: recipient.to_string(),
            assunto: subject.to_string(),
            status: if error.is_none() {
                EmailStatus::Enviado
            } else {
                EmailStatus::Erro
            },
            erro: error,
            enviado_em: Utc::now(),
        };
        let value = match serde_json::to_value(&row) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Could not encode email log row");
                return;
            }
        };
        if let Err(e) = self.store.insert(EMAIL_LOGS_TABLE, value).await {
            warn!(to = %recipient, error = %e, code = %e.code(), "Failed to write email log");
        }
    }
}
