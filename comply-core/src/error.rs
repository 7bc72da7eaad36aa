//! Error taxonomy for template resolution and its collaborators
//!
//! Every error surfaced by this crate maps onto a stable [`ErrorCode`]. The
//! code drives the fixed classification table (retryable, admin-facing,
//! critical) used by callers to decide how to present a failure.

use thiserror::Error;
use uuid::Uuid;

use crate::model::{FormType, Modality};
use crate::persistence::PersistenceError;

/// Stable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    DuplicateMapping,
    TemplateNotFound,
    InvalidMapping,
    InvalidFormType,
    InvalidModality,
    MappingValidationFailed,
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseTimeout,
    DatabaseConstraintViolation,
    FallbackChainExhausted,
    ConfigurationLoadFailed,
    NetworkError,
    RateLimitExceeded,
    SystemError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateMapping => "DUPLICATE_MAPPING",
            Self::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            Self::InvalidMapping => "INVALID_MAPPING",
            Self::InvalidFormType => "INVALID_FORM_TYPE",
            Self::InvalidModality => "INVALID_MODALITY",
            Self::MappingValidationFailed => "MAPPING_VALIDATION_FAILED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::DatabaseConnectionFailed => "DATABASE_CONNECTION_FAILED",
            Self::DatabaseTimeout => "DATABASE_TIMEOUT",
            Self::DatabaseConstraintViolation => "DATABASE_CONSTRAINT_VIOLATION",
            Self::FallbackChainExhausted => "FALLBACK_CHAIN_EXHAUSTED",
            Self::ConfigurationLoadFailed => "CONFIGURATION_LOAD_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SystemError => "SYSTEM_ERROR",
        }
    }

    /// Retrying the same call later may succeed
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Self::DatabaseConnectionFailed
                | Self::DatabaseTimeout
                | Self::NetworkError
                | Self::RateLimitExceeded
        )
    }

    /// An operator must look at the system configuration or infrastructure
    pub fn requires_admin_notification(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError
                | Self::DatabaseConnectionFailed
                | Self::SystemError
                | Self::FallbackChainExhausted
                | Self::ConfigurationLoadFailed
                | Self::DatabaseConstraintViolation
        )
    }

    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::DatabaseConnectionFailed
                | Self::SystemError
                | Self::FallbackChainExhausted
                | Self::ConfigurationLoadFailed
        )
    }

    /// Input/configuration problems resolved locally and returned to the caller
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidMapping
                | Self::InvalidFormType
                | Self::InvalidModality
                | Self::MappingValidationFailed
                | Self::DuplicateMapping
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised by the template resolver and its administrative operations
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("A template is already mapped to {form_type}/{modality} (template {existing})")]
    DuplicateMapping {
        form_type: FormType,
        modality: Modality,
        existing: Uuid,
    },

    #[error("Template {template_id} not found or inactive")]
    TemplateNotFound { template_id: Uuid },

    #[error("Invalid mapping: {reason}")]
    InvalidMapping { reason: String },

    #[error("Invalid form type '{0}'")]
    InvalidFormType(String),

    #[error("Invalid modality '{0}'")]
    InvalidModality(String),

    #[error("Mapping validation failed: {reason}")]
    MappingValidationFailed { reason: String },

    #[error("Database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: PersistenceError,
    },

    #[error("No email template available for {form_type}/{modality} after all fallback tiers")]
    FallbackChainExhausted {
        form_type: FormType,
        modality: Modality,
    },

    #[error("Failed to load fallback configuration from {path}: {reason}")]
    ConfigurationLoadFailed { path: String, reason: String },

    #[error("Failed to render template {template_id}: {reason}")]
    Render { template_id: Uuid, reason: String },

    #[error("System error: {0}")]
    System(String),
}

impl TemplateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateMapping { .. } => ErrorCode::DuplicateMapping,
            Self::TemplateNotFound { .. } => ErrorCode::TemplateNotFound,
            Self::InvalidMapping { .. } => ErrorCode::InvalidMapping,
            Self::InvalidFormType(_) => ErrorCode::InvalidFormType,
            Self::InvalidModality(_) => ErrorCode::InvalidModality,
            Self::MappingValidationFailed { .. } => ErrorCode::MappingValidationFailed,
            Self::Database { source, .. } => source.code(),
            Self::FallbackChainExhausted { .. } => ErrorCode::FallbackChainExhausted,
            Self::ConfigurationLoadFailed { .. } => ErrorCode::ConfigurationLoadFailed,
            Self::Render { .. } | Self::System(_) => ErrorCode::SystemError,
        }
    }

    /// Wrap a persistence failure with the operation it interrupted
    pub fn database(operation: &'static str) -> impl FnOnce(PersistenceError) -> Self {
        move |source| Self::Database { operation, source }
    }

    pub fn is_temporary(&self) -> bool {
        self.code().is_temporary()
    }

    pub fn requires_admin_notification(&self) -> bool {
        self.code().requires_admin_notification()
    }

    pub fn is_critical(&self) -> bool {
        self.code().is_critical()
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        assert!(ErrorCode::DatabaseTimeout.is_temporary());
        assert!(ErrorCode::RateLimitExceeded.is_temporary());
        assert!(!ErrorCode::FallbackChainExhausted.is_temporary());

        assert!(ErrorCode::FallbackChainExhausted.requires_admin_notification());
        assert!(ErrorCode::DatabaseConstraintViolation.requires_admin_notification());
        assert!(!ErrorCode::DuplicateMapping.requires_admin_notification());

        assert!(ErrorCode::ConfigurationLoadFailed.is_critical());
        assert!(!ErrorCode::DatabaseTimeout.is_critical());
        assert!(!ErrorCode::DatabaseConstraintViolation.is_critical());
    }

    #[test]
    fn test_database_error_takes_code_from_source() {
        let err = TemplateError::database("resolve.specific")(PersistenceError::Timeout(
            "select email_templates".into(),
        ));
        assert_eq!(err.code(), ErrorCode::DatabaseTimeout);
        assert!(err.is_temporary());
        assert!(err.to_string().contains("resolve.specific"));
    }

    #[test]
    fn test_codes_render_screaming_case() {
        assert_eq!(
            ErrorCode::FallbackChainExhausted.to_string(),
            "FALLBACK_CHAIN_EXHAUSTED"
        );
        let err = TemplateError::TemplateNotFound {
            template_id: Uuid::nil(),
        };
        assert_eq!(err.code().as_str(), "TEMPLATE_NOT_FOUND");
    }
}
