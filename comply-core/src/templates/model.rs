//! Email template rows and resolution results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TemplateError, TemplateResult};
use crate::model::{FormType, Modality};

/// Row of the `email_templates` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: Uuid,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "assunto")]
    pub subject: String,
    /// HTML body with `{{placeholder}}` substitution points
    #[serde(rename = "corpo")]
    pub body: String,
    #[serde(rename = "formulario", default)]
    pub form_type: Option<FormType>,
    #[serde(rename = "modalidade", default)]
    pub modality: Option<Modality>,
    #[serde(rename = "ativo", default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl EmailTemplate {
    /// Does this template claim the exact `(form, modality)` pair?
    pub fn is_mapped_to(&self, form_type: FormType, modality: Modality) -> bool {
        self.form_type == Some(form_type) && self.modality == Some(modality)
    }
}

/// Fallback tier a resolution stopped at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackType {
    Specific,
    FormDefault,
    Global,
    AnyActive,
    None,
}

impl FallbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specific => "specific",
            Self::FormDefault => "formDefault",
            Self::Global => "global",
            Self::AnyActive => "anyActive",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for FallbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of [`crate::templates::TemplateResolver::resolve`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateResolution {
    pub template: Option<EmailTemplate>,
    /// A configured or last-resort template stood in for a specific mapping
    pub is_default: bool,
    /// A template was mapped to the exact form/modality pair
    pub mapping_found: bool,
    pub fallback_type: FallbackType,
    pub fallback_reason: String,
}

impl TemplateResolution {
    pub(crate) fn specific(template: EmailTemplate) -> Self {
        Self {
            template: Some(template),
            is_default: false,
            mapping_found: true,
            fallback_type: FallbackType::Specific,
            fallback_reason: "Template mapped to form type and modality".to_string(),
        }
    }

    pub(crate) fn fallback(
        template: EmailTemplate,
        fallback_type: FallbackType,
        reason: String,
    ) -> Self {
        Self {
            template: Some(template),
            is_default: true,
            mapping_found: false,
            fallback_type,
            fallback_reason: reason,
        }
    }

    pub(crate) fn none(reason: String) -> Self {
        Self {
            template: None,
            is_default: false,
            mapping_found: false,
            fallback_type: FallbackType::None,
            fallback_reason: reason,
        }
    }

    pub fn template_id(&self) -> Option<Uuid> {
        self.template.as_ref().map(|t| t.id)
    }
}

/// A requested `(form, modality)` association, parsed from raw input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingRequest {
    pub form_type: FormType,
    pub modality: Modality,
}

impl MappingRequest {
    pub fn parse(form_type: &str, modality: &str) -> TemplateResult<Self> {
        let (form_type, modality) = (form_type.trim(), modality.trim());
        if form_type.is_empty() || modality.is_empty() {
            return Err(TemplateError::InvalidMapping {
                reason: "form type and modality are both required".to_string(),
            });
        }
        Ok(Self {
            form_type: form_type
                .parse()
                .map_err(|_| TemplateError::InvalidFormType(form_type.to_string()))?,
            modality: modality
                .parse()
                .map_err(|_| TemplateError::InvalidModality(modality.to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_template_row_decoding() {
        let row = json!({
            "id": "5f0c6a3e-8f2b-4c1d-9a7e-1b2c3d4e5f60",
            "nome": "Orçamento e-DOCS SaaS",
            "assunto": "Seu orçamento {{numero}}",
            "corpo": "<p>Olá {{nome}}</p>",
            "formulario": "comply_edocs",
            "modalidade": "saas",
            "ativo": true,
            "created_at": "2026-03-01T12:00:00Z"
        });
        let template: EmailTemplate = serde_json::from_value(row).unwrap();
        assert!(template.is_mapped_to(FormType::ComplyEdocs, Modality::Saas));
        assert!(!template.is_mapped_to(FormType::ComplyEdocs, Modality::OnPremise));
    }

    #[test]
    fn test_unmapped_row_defaults() {
        let row = json!({
            "id": "5f0c6a3e-8f2b-4c1d-9a7e-1b2c3d4e5f60",
            "nome": "Genérico",
            "assunto": "Orçamento",
            "corpo": "<p>Obrigado</p>",
            "formulario": null
        });
        let template: EmailTemplate = serde_json::from_value(row).unwrap();
        assert_eq!(template.form_type, None);
        assert_eq!(template.modality, None);
        assert!(template.active);
    }

    #[test]
    fn test_mapping_request_errors() {
        let err = MappingRequest::parse("", "saas").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidMapping);

        let err = MappingRequest::parse("comply_x", "saas").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFormType);

        let err = MappingRequest::parse("comply_fiscal", "cloud").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidModality);

        let ok = MappingRequest::parse(" comply_fiscal ", "on-premise").unwrap();
        assert_eq!(ok.form_type, FormType::ComplyFiscal);
        assert_eq!(ok.modality, Modality::OnPremise);
    }
}
