//! Submission Guard
//!
//! Keeps one process from inserting the same quote twice when a user
//! double-clicks submit or a request is retried.
//!
//! - [`SubmissionLock`]: refuses a second concurrent attempt on the same key
//! - [`IdempotencyLedger`]: refuses an attempt whose fingerprint already completed
//!
//! Both are per-process memory. Two processes (or two browser tabs behind
//! two processes) can still both insert.
//!
//! # Caller contract
//!
//! A fingerprint is random on every generation, so retries must reuse the
//! [`SubmissionAttempt`] created for the first try:
//!
//! ```ignore
//! let attempt = guard.new_attempt(&submission, FormType::ComplyEdocs);
//! for _ in 0..3 {
//!     match guard.run(&attempt, || insert_quote(&submission)).await {
//!         Err(GuardedError::Operation(e)) if is_retryable(&e) => continue,
//!         other => return other,
//!     }
//! }
//! ```

mod ledger;
mod lock;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{FormType, QuoteSubmission};

pub use ledger::{
    IdempotencyLedger, LedgerStats, SubmissionId, DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL,
    MIN_SWEEP_INTERVAL, SUBMISSION_ID_LEN,
};
pub use lock::{LockStatus, SubmissionLock, DEFAULT_LOCK_TIMEOUT};

/// Why the guard refused to let an attempt proceed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardRejection {
    #[error("submission {id} was already processed")]
    AlreadyProcessed { id: SubmissionId },

    #[error("a submission for {lock_key} is already in progress")]
    InProgress { lock_key: String },
}

/// Result error of [`SubmissionGuard::run`]
#[derive(Debug)]
pub enum GuardedError<E> {
    /// The guarded operation never ran
    Rejected(GuardRejection),
    /// The guarded operation ran and failed; the attempt was rolled back
    Operation(E),
}

impl<E: std::fmt::Display> std::fmt::Display for GuardedError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(r) => write!(f, "submission rejected: {}", r),
            Self::Operation(e) => write!(f, "guarded operation failed: {}", e),
        }
    }
}

impl<E> std::error::Error for GuardedError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rejected(r) => Some(r),
            Self::Operation(e) => Some(e),
        }
    }
}

/// One logical submission, shared by all of its retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAttempt {
    pub id: SubmissionId,
    pub lock_key: String,
    pub product: FormType,
}

/// Deterministic lock key for a tenant/product/email triple
pub fn lock_key(submission: &QuoteSubmission, product: FormType) -> String {
    format!(
        "submit_{}_{}_{}",
        submission.tax_id.trim(),
        product.as_str(),
        submission.email.trim().to_lowercase()
    )
}

/// Lock + ledger composition
#[derive(Debug, Clone)]
pub struct SubmissionGuard {
    lock: Arc<SubmissionLock>,
    ledger: Arc<IdempotencyLedger>,
}

impl Default for SubmissionGuard {
    fn default() -> Self {
        Self::new(
            Arc::new(SubmissionLock::default()),
            Arc::new(IdempotencyLedger::default()),
        )
    }
}

impl SubmissionGuard {
    pub fn new(lock: Arc<SubmissionLock>, ledger: Arc<IdempotencyLedger>) -> Self {
        Self { lock, ledger }
    }

    pub fn lock(&self) -> &Arc<SubmissionLock> {
        &self.lock
    }

    pub fn ledger(&self) -> &Arc<IdempotencyLedger> {
        &self.ledger
    }

    /// Start a logical submission; generate once, reuse across retries
    pub fn new_attempt(
        &self,
        submission: &QuoteSubmission,
        product: FormType,
    ) -> SubmissionAttempt {
        SubmissionAttempt {
            id: self.ledger.generate_submission_id(submission, product),
            lock_key: lock_key(submission, product),
            product,
        }
    }

    /// Take the lock for `attempt` unless it already completed or is in flight
    pub fn begin<'a>(
        &'a self,
        attempt: &'a SubmissionAttempt,
    ) -> Result<SubmissionPermit<'a>, GuardRejection> {
        if self.ledger.is_already_processed(&attempt.id) {
            debug!(submission_id = %attempt.id, "Rejecting already processed submission");
            return Err(GuardRejection::AlreadyProcessed {
                id: attempt.id.clone(),
            });
        }
        if !self.lock.acquire(&attempt.lock_key) {
            debug!(lock_key = %attempt.lock_key, "Rejecting concurrent submission");
            return Err(GuardRejection::InProgress {
                lock_key: attempt.lock_key.clone(),
            });
        }
        // A run holding the lock marks before it releases, so a completion
        // that slipped in between the first check and the acquire shows up here
        if self.ledger.is_already_processed(&attempt.id) {
            self.lock.release(&attempt.lock_key);
            debug!(submission_id = %attempt.id, "Submission completed while acquiring lock");
            return Err(GuardRejection::AlreadyProcessed {
                id: attempt.id.clone(),
            });
        }
        Ok(SubmissionPermit {
            guard: self,
            attempt,
            marked: false,
            finished: false,
        })
    }

    /// Run `op` under the guard
    ///
    /// The attempt is marked processed before `op` runs so a concurrent retry
    /// of the same attempt is refused; a failing `op` unmarks it so a later
    /// retry may proceed. The lock is released on every path.
    pub async fn run<T, E, F, Fut>(
        &self,
        attempt: &SubmissionAttempt,
        op: F,
    ) -> Result<T, GuardedError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut permit = self.begin(attempt).map_err(GuardedError::Rejected)?;
        permit.mark();

        match op().await {
            Ok(value) => {
                permit.complete();
                Ok(value)
            }
            Err(e) => {
                warn!(
                    submission_id = %attempt.id,
                    error = %e,
                    "Guarded submission failed, rolling back"
                );
                permit.abort();
                Err(GuardedError::Operation(e))
            }
        }
    }
}

/// Held lock for one attempt
///
/// Dropping an unfinished permit behaves like [`SubmissionPermit::abort`].
#[derive(Debug)]
pub struct SubmissionPermit<'a> {
    guard: &'a SubmissionGuard,
    attempt: &'a SubmissionAttempt,
    marked: bool,
    finished: bool,
}

impl SubmissionPermit<'_> {
    pub fn attempt(&self) -> &SubmissionAttempt {
        self.attempt
    }

    /// Record the attempt in the ledger while still holding the lock
    pub fn mark(&mut self) {
        self.guard.ledger.mark_as_processed(&self.attempt.id);
        self.marked = true;
    }

    /// The guarded work succeeded
    pub fn complete(mut self) {
        if !self.marked {
            self.mark();
        }
        self.guard.lock.release(&self.attempt.lock_key);
        self.finished = true;
    }

    /// The guarded work failed; forget the attempt and release the lock
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        if self.marked {
            self.guard.ledger.unmark_as_processed(&self.attempt.id);
            self.marked = false;
        }
        self.guard.lock.release(&self.attempt.lock_key);
        self.finished = true;
    }
}

impl Drop for SubmissionPermit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> QuoteSubmission {
        QuoteSubmission::new("123", "Compras@Cliente.com.br")
    }

    #[test]
    fn test_lock_key_is_deterministic() {
        let key = lock_key(&submission(), FormType::ComplyEdocs);
        assert_eq!(key, "submit_123_comply_edocs_compras@cliente.com.br");
        assert_eq!(key, lock_key(&submission(), FormType::ComplyEdocs));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_blocks_second_begin_until_complete() {
        let guard = SubmissionGuard::default();
        let attempt = guard.new_attempt(&submission(), FormType::ComplyEdocs);

        let permit = guard.begin(&attempt).unwrap();
        assert!(matches!(
            guard.begin(&attempt),
            Err(GuardRejection::InProgress { .. })
        ));

        permit.complete();
        assert!(!guard.lock().is_locked(&attempt.lock_key));
        assert_eq!(
            guard.begin(&attempt).unwrap_err(),
            GuardRejection::AlreadyProcessed {
                id: attempt.id.clone()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_permit_rolls_back() {
        let guard = SubmissionGuard::default();
        let attempt = guard.new_attempt(&submission(), FormType::ComplyFiscal);

        {
            let mut permit = guard.begin(&attempt).unwrap();
            permit.mark();
        }

        assert!(!guard.lock().is_locked(&attempt.lock_key));
        assert!(!guard.ledger().is_already_processed(&attempt.id));
        assert!(guard.begin(&attempt).is_ok());
    }
}
