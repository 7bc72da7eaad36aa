//! Composition root
//!
//! Owns the single instance of every component a host process needs. Tests
//! build their own [`QuoteServices`] instead of sharing process globals.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::guard::{
    IdempotencyLedger, SubmissionGuard, SubmissionLock, DEFAULT_LOCK_TIMEOUT, DEFAULT_RETENTION,
    DEFAULT_SWEEP_INTERVAL,
};
use crate::mail::{HttpMailRelay, MailRelay, QuoteNotifier};
use crate::persistence::{Persistence, RestPersistence};
use crate::settings::Settings;
use crate::templates::{
    FallbackConfig, FallbackConfigManager, FallbackUsageSink, TemplateRepository,
    TemplateResolver,
};

pub struct QuoteServices {
    pub guard: SubmissionGuard,
    pub resolver: Arc<TemplateResolver>,
    pub notifier: QuoteNotifier,
    shutdown: watch::Sender<bool>,
}

impl QuoteServices {
    pub fn builder(
        store: Arc<dyn Persistence>,
        relay: Arc<dyn MailRelay>,
    ) -> QuoteServicesBuilder {
        QuoteServicesBuilder {
            store,
            relay,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            ledger_retention: DEFAULT_RETENTION,
            ledger_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            fallback_config: FallbackConfig::default(),
            fallback_sink: None,
        }
    }

    /// Wire the REST backend and the HTTP mail relay from [`Settings`]
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = RestPersistence::new(
            settings.baas_url.clone(),
            settings.baas_key.clone(),
            settings.http_timeout,
        )
        .context("failed to build backend client")?;
        let relay = HttpMailRelay::new(
            settings.mail_function_url.clone(),
            settings.baas_key.clone(),
            settings.http_timeout,
        )
        .context("failed to build mail relay client")?;

        let fallback_config = match &settings.fallback_config_path {
            Some(path) => FallbackConfig::load(path)?,
            None => FallbackConfig::default(),
        };

        Ok(Self::builder(Arc::new(store), Arc::new(relay))
            .lock_timeout(settings.lock_timeout)
            .ledger_window(settings.ledger_retention, settings.ledger_sweep_interval)
            .fallback_config(fallback_config)
            .build())
    }

    /// Spawn the background tasks (the idempotency sweep)
    pub fn start_background(&self) -> JoinHandle<()> {
        self.guard.ledger().spawn_sweeper(self.shutdown.subscribe())
    }

    /// Signal background tasks to stop
    pub fn shutdown(&self) {
        info!("Quote services shutting down");
        self.shutdown.send_replace(true);
    }
}

pub struct QuoteServicesBuilder {
    store: Arc<dyn Persistence>,
    relay: Arc<dyn MailRelay>,
    lock_timeout: Duration,
    ledger_retention: Duration,
    ledger_sweep_interval: Duration,
    fallback_config: FallbackConfig,
    fallback_sink: Option<Arc<dyn FallbackUsageSink>>,
}

impl QuoteServicesBuilder {
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn ledger_window(mut self, retention: Duration, sweep_interval: Duration) -> Self {
        self.ledger_retention = retention;
        self.ledger_sweep_interval = sweep_interval;
        self
    }

    pub fn fallback_config(mut self, config: FallbackConfig) -> Self {
        self.fallback_config = config;
        self
    }

    pub fn fallback_sink(mut self, sink: Arc<dyn FallbackUsageSink>) -> Self {
        self.fallback_sink = Some(sink);
        self
    }

    pub fn build(self) -> QuoteServices {
        let guard = SubmissionGuard::new(
            Arc::new(SubmissionLock::new(self.lock_timeout)),
            Arc::new(IdempotencyLedger::new(
                self.ledger_retention,
                self.ledger_sweep_interval,
            )),
        );

        let mut resolver = TemplateResolver::new(
            TemplateRepository::new(Arc::clone(&self.store)),
            Arc::new(FallbackConfigManager::new(self.fallback_config)),
        );
        if let Some(sink) = self.fallback_sink {
            resolver = resolver.with_sink(sink);
        }
        let resolver = Arc::new(resolver);

        let notifier = QuoteNotifier::new(Arc::clone(&resolver), self.relay, self.store);
        let (shutdown, _) = watch::channel(false);

        QuoteServices {
            guard,
            resolver,
            notifier,
            shutdown,
        }
    }
}
