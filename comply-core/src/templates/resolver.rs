//! Template Resolver
//!
//! Picks the email template for a `(form type, modality)` pair by walking
//! the fallback tiers in order and stopping at the first hit:
//!
//! 1. `specific`    - active template mapped to exactly this pair
//! 2. `formDefault` - `defaultTemplates[form]`, if still active
//! 3. `global`      - `globalFallbackTemplate`, if still active
//! 4. `anyActive`   - newest active template (only when enabled)
//! 5. `none`        - error in strict mode, empty resolution otherwise
//!
//! Administrative writes (defaults, global fallback, mappings) check
//! existence/uniqueness right before writing. That check-then-act is only
//! sound within one process; several writers need a database uniqueness
//! constraint on `(formulario, modalidade)` instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::{FallbackConfig, FallbackConfigManager, FallbackConfigPatch, LogLevel};
use super::model::{EmailTemplate, FallbackType, TemplateResolution};
use super::repository::TemplateRepository;
use crate::error::{TemplateError, TemplateResult};
use crate::model::{FormType, Modality};

/// A resolution that did not hit the `specific` tier
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackUsage {
    pub form_type: FormType,
    pub modality: Modality,
    pub fallback_type: FallbackType,
    pub template_id: Option<Uuid>,
    pub reason: String,
    pub level: LogLevel,
    pub at: DateTime<Utc>,
}

/// Destination for fallback usage records
pub trait FallbackUsageSink: Send + Sync {
    fn record(&self, usage: &FallbackUsage);
}

/// Emits fallback usage as structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFallbackSink;

impl FallbackUsageSink for TracingFallbackSink {
    fn record(&self, usage: &FallbackUsage) {
        let template_id = usage.template_id.map(|id| id.to_string());
        macro_rules! emit {
            ($level:ident) => {
                $level!(
                    form_type = %usage.form_type,
                    modality = %usage.modality,
                    fallback_type = %usage.fallback_type,
                    template_id = ?template_id,
                    reason = %usage.reason,
                    "Email template fallback used"
                )
            };
        }
        match usage.level {
            LogLevel::Debug => emit!(debug),
            LogLevel::Info => emit!(info),
            LogLevel::Warn => emit!(warn),
            LogLevel::Error => emit!(error),
        }
    }
}

pub struct TemplateResolver {
    repo: TemplateRepository,
    config: Arc<FallbackConfigManager>,
    sink: Arc<dyn FallbackUsageSink>,
}

impl TemplateResolver {
    pub fn new(repo: TemplateRepository, config: Arc<FallbackConfigManager>) -> Self {
        Self {
            repo,
            config,
            sink: Arc::new(TracingFallbackSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn FallbackUsageSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn repository(&self) -> &TemplateRepository {
        &self.repo
    }

    pub fn config(&self) -> FallbackConfig {
        self.config.get()
    }

    pub fn update_config(&self, patch: &FallbackConfigPatch) -> FallbackConfig {
        self.config.update(patch)
    }

    pub fn reset_config(&self) {
        self.config.reset();
    }

    /// Replace the live configuration with the contents of `path`
    ///
    /// On failure the current configuration stays in place.
    pub fn load_config(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> TemplateResult<FallbackConfig> {
        let loaded = FallbackConfig::load(path)?;
        self.config.replace(loaded.clone());
        Ok(loaded)
    }

    /// Resolve the template for `(form_type, modality)`
    ///
    /// Only fails for persistence errors, or when the chain is exhausted and
    /// `behavior.failWhenNoTemplateFound` is set.
    pub async fn resolve(
        &self,
        form_type: FormType,
        modality: Modality,
    ) -> TemplateResult<TemplateResolution> {
        let config = self.config.get();

        if let Some(template) = self
            .repo
            .find_specific(form_type, modality)
            .await
            .map_err(TemplateError::database("resolve.specific"))?
        {
            debug!(%form_type, %modality, template_id = %template.id, "Specific template found");
            return Ok(TemplateResolution::specific(template));
        }

        if let Some(id) = config.default_templates.get(&form_type).copied() {
            match self
                .repo
                .get_active(id)
                .await
                .map_err(TemplateError::database("resolve.form_default"))?
            {
                Some(template) => {
                    let reason = format!(
                        "No template mapped to {}/{}; using the default template for {}",
                        form_type, modality, form_type
                    );
                    return Ok(self.report(
                        &config,
                        form_type,
                        modality,
                        TemplateResolution::fallback(template, FallbackType::FormDefault, reason),
                    ));
                }
                None => warn!(
                    %form_type,
                    template_id = %id,
                    "Configured default template is missing or inactive"
                ),
            }
        }

        if let Some(id) = config.global_fallback_template {
            match self
                .repo
                .get_active(id)
                .await
                .map_err(TemplateError::database("resolve.global"))?
            {
                Some(template) => {
                    let reason = format!(
                        "No template or form default for {}/{}; using the global fallback template",
                        form_type, modality
                    );
                    return Ok(self.report(
                        &config,
                        form_type,
                        modality,
                        TemplateResolution::fallback(template, FallbackType::Global, reason),
                    ));
                }
                None => warn!(
                    template_id = %id,
                    "Configured global fallback template is missing or inactive"
                ),
            }
        }

        if config.behavior.use_any_active_template_as_fallback {
            if let Some(template) = self
                .repo
                .latest_active()
                .await
                .map_err(TemplateError::database("resolve.any_active"))?
            {
                let reason = format!(
                    "No configured template for {}/{}; using the most recent active template",
                    form_type, modality
                );
                return Ok(self.report(
                    &config,
                    form_type,
                    modality,
                    TemplateResolution::fallback(template, FallbackType::AnyActive, reason),
                ));
            }
        }

        if config.behavior.fail_when_no_template_found {
            error!(%form_type, %modality, "Email template fallback chain exhausted");
            return Err(TemplateError::FallbackChainExhausted {
                form_type,
                modality,
            });
        }

        let reason = format!("No active template available for {}/{}", form_type, modality);
        Ok(self.report(
            &config,
            form_type,
            modality,
            TemplateResolution::none(reason),
        ))
    }

    fn report(
        &self,
        config: &FallbackConfig,
        form_type: FormType,
        modality: Modality,
        resolution: TemplateResolution,
    ) -> TemplateResolution {
        if config.logging.enabled && config.logging.log_fallback_usage {
            self.sink.record(&FallbackUsage {
                form_type,
                modality,
                fallback_type: resolution.fallback_type,
                template_id: resolution.template_id(),
                reason: resolution.fallback_reason.clone(),
                level: config.logging.log_level,
                at: Utc::now(),
            });
        }
        resolution
    }

    async fn template_exists(&self, id: Uuid, operation: &'static str) -> TemplateResult<bool> {
        Ok(self
            .repo
            .get(id)
            .await
            .map_err(TemplateError::database(operation))?
            .is_some())
    }

    /// Make `template_id` the default for `form_type`
    ///
    /// Returns `false`, leaving the configuration untouched, when the
    /// template does not exist.
    pub async fn set_default_template(
        &self,
        form_type: FormType,
        template_id: Uuid,
    ) -> TemplateResult<bool> {
        if !self
            .template_exists(template_id, "set_default_template")
            .await?
        {
            warn!(%form_type, %template_id, "Refusing default template: template does not exist");
            return Ok(false);
        }
        self.config.update(
            &FallbackConfigPatch::new().default_template(form_type, Some(template_id)),
        );
        info!(%form_type, %template_id, "Default template set");
        Ok(true)
    }

    pub fn clear_default_template(&self, form_type: FormType) {
        self.config
            .update(&FallbackConfigPatch::new().default_template(form_type, None));
        info!(%form_type, "Default template cleared");
    }

    /// Make `template_id` the last-resort template; same existence rule as
    /// [`Self::set_default_template`]
    pub async fn set_global_fallback_template(&self, template_id: Uuid) -> TemplateResult<bool> {
        if !self
            .template_exists(template_id, "set_global_fallback_template")
            .await?
        {
            warn!(%template_id, "Refusing global fallback: template does not exist");
            return Ok(false);
        }
        self.config
            .update(&FallbackConfigPatch::new().global_fallback_template(Some(template_id)));
        info!(%template_id, "Global fallback template set");
        Ok(true)
    }

    pub fn clear_global_fallback_template(&self) {
        self.config
            .update(&FallbackConfigPatch::new().global_fallback_template(None));
        info!("Global fallback template cleared");
    }

    /// True iff no active template other than `exclude_id` claims the pair
    pub async fn validate_uniqueness(
        &self,
        form_type: FormType,
        modality: Modality,
        exclude_id: Option<Uuid>,
    ) -> TemplateResult<bool> {
        Ok(self
            .conflicting_mapping(form_type, modality, exclude_id)
            .await?
            .is_none())
    }

    async fn conflicting_mapping(
        &self,
        form_type: FormType,
        modality: Modality,
        exclude_id: Option<Uuid>,
    ) -> TemplateResult<Option<EmailTemplate>> {
        let mapped = self
            .repo
            .find_mapped(form_type, modality)
            .await
            .map_err(TemplateError::database("validate_uniqueness"))?;
        Ok(mapped.into_iter().find(|t| Some(t.id) != exclude_id))
    }

    /// Map `template_id` to `(form_type, modality)`
    pub async fn assign_mapping(
        &self,
        template_id: Uuid,
        form_type: FormType,
        modality: Modality,
    ) -> TemplateResult<EmailTemplate> {
        let template = self
            .repo
            .get(template_id)
            .await
            .map_err(TemplateError::database("assign_mapping"))?
            .ok_or(TemplateError::TemplateNotFound { template_id })?;

        if !template.active {
            return Err(TemplateError::MappingValidationFailed {
                reason: format!("template {} is inactive", template_id),
            });
        }

        if let Some(existing) = self
            .conflicting_mapping(form_type, modality, Some(template_id))
            .await?
        {
            warn!(
                %form_type,
                %modality,
                existing = %existing.id,
                "Duplicate template mapping rejected"
            );
            return Err(TemplateError::DuplicateMapping {
                form_type,
                modality,
                existing: existing.id,
            });
        }

        self.repo
            .set_mapping(template_id, Some((form_type, modality)))
            .await
            .map_err(TemplateError::database("assign_mapping"))?;
        info!(%template_id, %form_type, %modality, "Template mapping assigned");

        Ok(EmailTemplate {
            form_type: Some(form_type),
            modality: Some(modality),
            ..template
        })
    }

    /// Remove any form/modality association from `template_id`
    pub async fn clear_mapping(&self, template_id: Uuid) -> TemplateResult<()> {
        if !self.template_exists(template_id, "clear_mapping").await? {
            return Err(TemplateError::TemplateNotFound { template_id });
        }
        self.repo
            .set_mapping(template_id, None)
            .await
            .map_err(TemplateError::database("clear_mapping"))
    }
}
