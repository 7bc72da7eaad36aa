//! Keyed, time-boxed, non-blocking mutual exclusion
//!
//! A held key carries a deadline on the tokio monotonic clock. An expired
//! deadline is equivalent to an automatic release; expired entries are
//! pruned lazily by every operation that looks at the map.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

/// Default auto-release timeout
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline used when `now + timeout` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Snapshot of currently held keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub locks: Vec<String>,
    pub count: usize,
}

/// Advisory lock set keyed by string
///
/// `acquire` never waits: it either takes the key or reports that somebody
/// else holds it.
#[derive(Debug)]
pub struct SubmissionLock {
    held: Mutex<HashMap<String, Instant>>,
    default_timeout: Duration,
}

impl Default for SubmissionLock {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl SubmissionLock {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire `key` with the default timeout
    pub fn acquire(&self, key: &str) -> bool {
        self.acquire_with_timeout(key, self.default_timeout)
    }

    /// Acquire `key`, auto-releasing after `timeout`
    ///
    /// Returns `false` without side effects if the key is already held.
    pub fn acquire_with_timeout(&self, key: &str, timeout: Duration) -> bool {
        let now = Instant::now();
        let mut held = self.entries();

        if let Some(deadline) = held.get(key) {
            if *deadline > now {
                debug!(key, "Lock already held");
                return false;
            }
            debug!(key, "Previous lock on key expired");
        }

        let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);
        held.insert(key.to_string(), deadline);
        debug!(key, timeout_ms = timeout.as_millis() as u64, "Lock acquired");
        true
    }

    /// Release `key`; releasing an unheld key is a no-op
    pub fn release(&self, key: &str) {
        if self.entries().remove(key).is_some() {
            debug!(key, "Lock released");
        }
    }

    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut held = self.entries();
        match held.get(key) {
            Some(deadline) if *deadline > now => true,
            Some(_) => {
                held.remove(key);
                debug!(key, "Lock expired");
                false
            }
            None => false,
        }
    }

    /// Release every held key
    pub fn clear(&self) {
        let mut held = self.entries();
        let count = held.len();
        held.clear();
        debug!(count, "All locks cleared");
    }

    pub fn status(&self) -> LockStatus {
        let now = Instant::now();
        let mut held = self.entries();
        held.retain(|_, deadline| *deadline > now);

        let mut locks: Vec<String> = held.keys().cloned().collect();
        locks.sort();
        let count = locks.len();
        LockStatus { locks, count }
    }
}
