//! Email Templates
//!
//! Template rows, the fallback configuration, the tiered resolver and
//! placeholder rendering.

mod config;
mod model;
mod render;
mod repository;
mod resolver;

pub use config::{
    BehaviorConfig, BehaviorPatch, FallbackConfig, FallbackConfigManager, FallbackConfigPatch,
    LogLevel, LoggingConfig, LoggingPatch,
};
pub use model::{EmailTemplate, FallbackType, MappingRequest, TemplateResolution};
pub use render::{RenderedEmail, TemplateRenderer};
pub use repository::{TemplateRepository, TEMPLATES_TABLE};
pub use resolver::{FallbackUsage, FallbackUsageSink, TemplateResolver, TracingFallbackSink};
