//! Quote domain types shared by the guard and the template resolver.

use serde::{Deserialize, Serialize};

/// Quote form / product type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormType {
    ComplyEdocs,
    ComplyFiscal,
}

impl FormType {
    pub const ALL: [FormType; 2] = [FormType::ComplyEdocs, FormType::ComplyFiscal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComplyEdocs => "comply_edocs",
            Self::ComplyFiscal => "comply_fiscal",
        }
    }

    /// Product name as shown to customers
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ComplyEdocs => "Comply e-DOCS",
            Self::ComplyFiscal => "Comply Fiscal",
        }
    }
}

impl std::fmt::Display for FormType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FormType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comply_edocs" => Ok(Self::ComplyEdocs),
            "comply_fiscal" => Ok(Self::ComplyFiscal),
            _ => Err(format!("Unknown form type: {}", s)),
        }
    }
}

/// Delivery model of the quoted product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    #[serde(rename = "on-premise")]
    OnPremise,
    #[serde(rename = "saas")]
    Saas,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnPremise => "on-premise",
            Self::Saas => "saas",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on-premise" => Ok(Self::OnPremise),
            "saas" => Ok(Self::Saas),
            _ => Err(format!("Unknown modality: {}", s)),
        }
    }
}

/// The part of a submitted quote form the submission guard looks at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSubmission {
    /// Tenant tax identifier (CNPJ)
    pub tax_id: String,
    /// Contact email of the requester
    pub email: String,
    #[serde(default)]
    pub company_name: Option<String>,
}

impl QuoteSubmission {
    pub fn new(tax_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            tax_id: tax_id.into(),
            email: email.into(),
            company_name: None,
        }
    }

    pub fn with_company(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_type_parsing() {
        assert_eq!("comply_edocs".parse(), Ok(FormType::ComplyEdocs));
        assert_eq!("comply_fiscal".parse(), Ok(FormType::ComplyFiscal));
        assert!("comply_other".parse::<FormType>().is_err());
    }

    #[test]
    fn test_modality_serde_names() {
        let json = serde_json::to_string(&Modality::OnPremise).unwrap();
        assert_eq!(json, "\"on-premise\"");
        let parsed: Modality = serde_json::from_str("\"saas\"").unwrap();
        assert_eq!(parsed, Modality::Saas);
    }
}
