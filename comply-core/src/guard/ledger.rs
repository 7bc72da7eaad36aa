//! Idempotency Ledger
//!
//! Remembers which submission fingerprints completed, for a bounded window.
//! Entries older than the retention window are dropped by [`IdempotencyLedger::sweep`],
//! which a background task runs on a fixed interval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::model::{FormType, QuoteSubmission};

/// Maximum age of a processed entry
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(5 * 60);

/// How often the background sweep runs
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Shortest sweep interval accepted by [`IdempotencyLedger::new`]
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Length of a generated fingerprint
pub const SUBMISSION_ID_LEN: usize = 32;

/// Opaque fingerprint of one logical submission attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    /// Fresh fingerprint for `submission`
    ///
    /// The encoded input starts with a random nonce and the wall-clock
    /// millis, followed by tax id, product and email. Truncation to
    /// [`SUBMISSION_ID_LEN`] keeps only the nonce and part of the timestamp,
    /// so the id carries no tenant data and cannot be traced back to it.
    /// Two calls never return the same id even for identical input.
    /// Deduplication across retries only works when the caller generates
    /// the id once and reuses it (see [`crate::guard::SubmissionAttempt`]).
    pub fn generate(submission: &QuoteSubmission, product: FormType) -> Self {
        let nonce: u64 = rand::thread_rng().gen();
        // Volatile parts lead so they survive truncation
        let raw = format!(
            "{:016x}{}|{}|{}|{}",
            nonce,
            Utc::now().timestamp_millis(),
            submission.tax_id,
            product.as_str(),
            submission.email
        );
        let id: String = STANDARD
            .encode(raw.as_bytes())
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(SUBMISSION_ID_LEN)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubmissionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubmissionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub processed: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    marked_at: Instant,
    marked_at_utc: DateTime<Utc>,
}

/// Bounded-window record of completed submissions
#[derive(Debug)]
pub struct IdempotencyLedger {
    entries: Mutex<HashMap<SubmissionId, Entry>>,
    retention: Duration,
    sweep_interval: Duration,
}

impl Default for IdempotencyLedger {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL)
    }
}

impl IdempotencyLedger {
    /// A `sweep_interval` below [`MIN_SWEEP_INTERVAL`] is raised to it
    pub fn new(retention: Duration, sweep_interval: Duration) -> Self {
        if sweep_interval < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = sweep_interval.as_millis() as u64,
                "Sweep interval too short, using minimum"
            );
        }
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
            sweep_interval: sweep_interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<SubmissionId, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn generate_submission_id(
        &self,
        submission: &QuoteSubmission,
        product: FormType,
    ) -> SubmissionId {
        SubmissionId::generate(submission, product)
    }

    pub fn is_already_processed(&self, id: &SubmissionId) -> bool {
        self.entries().contains_key(id)
    }

    /// Record `id` as processed; a repeat call keeps the first timestamp
    pub fn mark_as_processed(&self, id: &SubmissionId) {
        let mut entries = self.entries();
        entries.entry(id.clone()).or_insert_with(|| Entry {
            marked_at: Instant::now(),
            marked_at_utc: Utc::now(),
        });
        debug!(submission_id = %id, "Submission marked as processed");
    }

    /// Roll back a mark after the guarded operation failed
    pub fn unmark_as_processed(&self, id: &SubmissionId) {
        if self.entries().remove(id).is_some() {
            debug!(submission_id = %id, "Submission unmarked");
        }
    }

    /// Drop entries older than the retention window, returning how many went
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.marked_at) <= self.retention);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Idempotency ledger swept");
        }
        removed
    }

    /// Run [`Self::sweep`] every sweep interval until `shutdown` flips to true
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_secs = ledger.sweep_interval.as_secs(),
                retention_secs = ledger.retention.as_secs(),
                "Idempotency ledger sweeper started"
            );
            let mut ticker = tokio::time::interval(ledger.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        ledger.sweep();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Idempotency ledger sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> LedgerStats {
        let entries = self.entries();
        LedgerStats {
            processed: entries.len(),
            oldest: entries.values().map(|e| e.marked_at_utc).min(),
            newest: entries.values().map(|e| e.marked_at_utc).max(),
        }
    }

    pub fn list_processed(&self) -> Vec<SubmissionId> {
        let mut ids: Vec<SubmissionId> = self.entries().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}
