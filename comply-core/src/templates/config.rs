//! Fallback configuration
//!
//! The configuration is always fully populated. Partial updates go through
//! [`FallbackConfigPatch`] and merge field-by-field into the existing
//! sub-objects instead of replacing them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{TemplateError, TemplateResult};
use crate::model::FormType;

/// Level fallback usage is logged at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    pub enabled: bool,
    pub log_fallback_usage: bool,
    pub log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_fallback_usage: true,
            log_level: LogLevel::Warn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BehaviorConfig {
    /// Treat an exhausted fallback chain as an error
    pub fail_when_no_template_found: bool,
    /// Try the newest active template before giving up
    pub use_any_active_template_as_fallback: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            fail_when_no_template_found: false,
            use_any_active_template_as_fallback: true,
        }
    }
}

/// Template fallback configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FallbackConfig {
    pub default_templates: BTreeMap<FormType, Uuid>,
    pub global_fallback_template: Option<Uuid>,
    pub logging: LoggingConfig,
    pub behavior: BehaviorConfig,
}

impl FallbackConfig {
    /// Load from a YAML or JSON file (by extension; YAML otherwise)
    ///
    /// Missing sections take their defaults.
    pub fn load(path: impl AsRef<Path>) -> TemplateResult<Self> {
        let path = path.as_ref();
        let load_failed = |reason: String| TemplateError::ConfigurationLoadFailed {
            path: path.display().to_string(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            serde_json::from_str(&text).map_err(|e| load_failed(e.to_string()))?
        } else {
            serde_yaml::from_str(&text).map_err(|e| load_failed(e.to_string()))?
        };
        info!(path = %path.display(), "Loaded template fallback configuration");
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingPatch {
    pub enabled: Option<bool>,
    pub log_fallback_usage: Option<bool>,
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BehaviorPatch {
    pub fail_when_no_template_found: Option<bool>,
    pub use_any_active_template_as_fallback: Option<bool>,
}

/// Partial update of [`FallbackConfig`]
///
/// `default_templates` entries are merged per form type; `None` leaves a
/// field untouched. `global_fallback_template: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackConfigPatch {
    pub default_templates: BTreeMap<FormType, Option<Uuid>>,
    pub global_fallback_template: Option<Option<Uuid>>,
    pub logging: Option<LoggingPatch>,
    pub behavior: Option<BehaviorPatch>,
}

impl FallbackConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_template(mut self, form_type: FormType, template_id: Option<Uuid>) -> Self {
        self.default_templates.insert(form_type, template_id);
        self
    }

    pub fn global_fallback_template(mut self, template_id: Option<Uuid>) -> Self {
        self.global_fallback_template = Some(template_id);
        self
    }

    pub fn logging(mut self, logging: LoggingPatch) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn behavior(mut self, behavior: BehaviorPatch) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Apply this patch onto `config` in place
    pub fn apply(&self, config: &mut FallbackConfig) {
        for (form_type, template_id) in &self.default_templates {
            match template_id {
                Some(id) => {
                    config.default_templates.insert(*form_type, *id);
                }
                None => {
                    config.default_templates.remove(form_type);
                }
            }
        }
        if let Some(global) = self.global_fallback_template {
            config.global_fallback_template = global;
        }
        if let Some(logging) = &self.logging {
            if let Some(v) = logging.enabled {
                config.logging.enabled = v;
            }
            if let Some(v) = logging.log_fallback_usage {
                config.logging.log_fallback_usage = v;
            }
            if let Some(v) = logging.log_level {
                config.logging.log_level = v;
            }
        }
        if let Some(behavior) = &self.behavior {
            if let Some(v) = behavior.fail_when_no_template_found {
                config.behavior.fail_when_no_template_found = v;
            }
            if let Some(v) = behavior.use_any_active_template_as_fallback {
                config.behavior.use_any_active_template_as_fallback = v;
            }
        }
    }
}

/// Shared, mutable holder of the active [`FallbackConfig`]
#[derive(Debug, Default)]
pub struct FallbackConfigManager {
    current: RwLock<FallbackConfig>,
}

impl FallbackConfigManager {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            current: RwLock::new(config),
        }
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> FallbackConfig {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Deep-merge `patch` and return the resulting configuration
    pub fn update(&self, patch: &FallbackConfigPatch) -> FallbackConfig {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        patch.apply(&mut current);
        debug!(?patch, "Fallback configuration updated");
        current.clone()
    }

    pub fn replace(&self, config: FallbackConfig) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    pub fn reset(&self) {
        self.replace(FallbackConfig::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::io::Write;

    #[test]
    fn test_patch_merges_sub_objects() {
        let manager = FallbackConfigManager::default();
        let id = Uuid::new_v4();

        manager.update(&FallbackConfigPatch::new().logging(LoggingPatch {
            log_level: Some(LogLevel::Info),
            ..Default::default()
        }));
        let config = manager.update(
            &FallbackConfigPatch::new()
                .default_template(FormType::ComplyEdocs, Some(id))
                .behavior(BehaviorPatch {
                    fail_when_no_template_found: Some(true),
                    ..Default::default()
                }),
        );

        assert_eq!(config.default_templates.get(&FormType::ComplyEdocs), Some(&id));
        assert_eq!(config.logging.log_level, LogLevel::Info);
        // untouched siblings keep their values
        assert!(config.logging.enabled);
        assert!(config.logging.log_fallback_usage);
        assert!(config.behavior.fail_when_no_template_found);
        assert!(config.behavior.use_any_active_template_as_fallback);
    }

    #[test]
    fn test_patch_clears_entries() {
        let manager = FallbackConfigManager::default();
        let id = Uuid::new_v4();
        manager.update(
            &FallbackConfigPatch::new()
                .default_template(FormType::ComplyFiscal, Some(id))
                .global_fallback_template(Some(id)),
        );
        let config = manager.update(
            &FallbackConfigPatch::new()
                .default_template(FormType::ComplyFiscal, None)
                .global_fallback_template(None),
        );
        assert!(config.default_templates.is_empty());
        assert_eq!(config.global_fallback_template, None);
    }

    #[test]
    fn test_load_partial_yaml_fills_defaults() {
        let id = Uuid::new_v4();
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "defaultTemplates:\n  comply_fiscal: {}\nbehavior:\n  failWhenNoTemplateFound: true",
            id
        )
        .unwrap();

        let config = FallbackConfig::load(file.path()).unwrap();
        assert_eq!(config.default_templates.get(&FormType::ComplyFiscal), Some(&id));
        assert!(config.behavior.fail_when_no_template_found);
        assert!(config.behavior.use_any_active_template_as_fallback);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"logging": {{"enabled": false}}}}"#).unwrap();

        let config = FallbackConfig::load(file.path()).unwrap();
        assert!(!config.logging.enabled);
        assert!(config.logging.log_fallback_usage);
    }

    #[test]
    fn test_load_failure_is_configuration_error() {
        let err = FallbackConfig::load("/nonexistent/fallback.yaml").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationLoadFailed);
        assert!(err.is_critical());
    }
}
