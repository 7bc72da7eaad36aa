//! Comply Quote Core
//!
//! Server-side core of the Comply e-DOCS / Comply Fiscal quote workflow.
//!
//! Two independent mechanisms live here:
//! - [`guard`]: duplicate-submission protection (keyed lock + idempotency ledger)
//! - [`templates`]: email template resolution with a tiered fallback chain
//!
//! Both talk to the outside world only through ports:
//! - [`persistence::Persistence`] for the hosted relational backend
//! - [`mail::MailRelay`] for the serverless mail-relay function
//!
//! [`app::QuoteServices`] is the composition root that wires everything
//! together for a host process.
//!
//! # Example
//!
//! ```ignore
//! let services = QuoteServices::builder(persistence, relay).build();
//! let attempt = services.guard.new_attempt(&submission, FormType::ComplyEdocs);
//! let quote = services.guard.run(&attempt, || insert_quote(&submission)).await?;
//! ```

pub mod app;
pub mod error;
pub mod guard;
pub mod mail;
pub mod model;
pub mod persistence;
pub mod settings;
pub mod templates;

pub use app::{QuoteServices, QuoteServicesBuilder};
pub use error::{ErrorCode, TemplateError};
pub use guard::{
    GuardRejection, GuardedError, IdempotencyLedger, LedgerStats, LockStatus, SubmissionAttempt,
    SubmissionGuard, SubmissionId, SubmissionLock, SubmissionPermit,
};
pub use mail::{
    HttpMailRelay, MailAttachment, MailRelay, MailRequest, MailResponse, NotificationReport,
    NotifyError, NotifyRequest, QuoteNotifier, RelayError,
};
pub use model::{FormType, Modality, QuoteSubmission};
pub use persistence::{Filter, MemoryPersistence, Persistence, PersistenceError, RestPersistence};
pub use settings::Settings;
pub use templates::{
    EmailTemplate, FallbackConfig, FallbackConfigPatch, FallbackType, FallbackUsageSink,
    RenderedEmail, TemplateRenderer, TemplateRepository, TemplateResolution, TemplateResolver,
};
