//! Submission guard behaviour through the public API
//!
//! Time-dependent tests run on a paused tokio clock so lock expiry and
//! ledger sweeps are driven by virtual time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use comply_core::guard::{
    GuardRejection, GuardedError, IdempotencyLedger, SubmissionGuard, SubmissionLock,
};
use comply_core::{FormType, QuoteSubmission};

fn submission() -> QuoteSubmission {
    QuoteSubmission::new("12.345.678/0001-90", "compras@cliente.com.br")
        .with_company("Cliente SA")
}

#[tokio::test(start_paused = true)]
async fn lock_scenario_acquire_twice_release_acquire() {
    let lock = SubmissionLock::default();
    let key = "submit_123_comply_edocs";

    assert!(lock.acquire(key));
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(!lock.acquire(key));

    lock.release(key);
    assert!(lock.acquire(key));
}

#[tokio::test(start_paused = true)]
async fn lock_expires_without_release() {
    let lock = SubmissionLock::default();
    let key = "submit_123_comply_fiscal";

    assert!(lock.acquire_with_timeout(key, Duration::from_secs(5)));
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!lock.is_locked(key));
}

#[tokio::test(start_paused = true)]
async fn retry_of_successful_attempt_is_rejected() {
    let guard = SubmissionGuard::default();
    let attempt = guard.new_attempt(&submission(), FormType::ComplyEdocs);

    let quote_id = guard
        .run(&attempt, || async { Ok::<_, String>(42) })
        .await
        .unwrap();
    assert_eq!(quote_id, 42);

    let retry = guard
        .run(&attempt, || async { Ok::<_, String>(43) })
        .await
        .unwrap_err();
    assert!(matches!(
        retry,
        GuardedError::Rejected(GuardRejection::AlreadyProcessed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_attempt_can_be_retried_with_same_id() {
    let guard = SubmissionGuard::default();
    let attempt = guard.new_attempt(&submission(), FormType::ComplyFiscal);

    let first = guard
        .run(&attempt, || async { Err::<u32, _>("insert failed".to_string()) })
        .await
        .unwrap_err();
    assert!(matches!(first, GuardedError::Operation(ref e) if e == "insert failed"));
    assert!(!guard.ledger().is_already_processed(&attempt.id));
    assert!(!guard.lock().is_locked(&attempt.lock_key));

    let second = guard
        .run(&attempt, || async { Ok::<_, String>(7) })
        .await
        .unwrap();
    assert_eq!(second, 7);
    assert!(guard.ledger().is_already_processed(&attempt.id));
}

#[tokio::test(start_paused = true)]
async fn concurrent_attempt_for_same_tenant_is_in_progress() {
    let guard = SubmissionGuard::default();
    let first = guard.new_attempt(&submission(), FormType::ComplyEdocs);
    // a double-click produces a second, distinct attempt for the same key
    let second = guard.new_attempt(&submission(), FormType::ComplyEdocs);
    assert_ne!(first.id, second.id);
    assert_eq!(first.lock_key, second.lock_key);

    let _permit = guard.begin(&first).unwrap();
    let err = guard
        .run(&second, || async { Ok::<_, String>(()) })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GuardedError::Rejected(GuardRejection::InProgress { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn other_product_is_not_blocked() {
    let guard = SubmissionGuard::default();
    let edocs = guard.new_attempt(&submission(), FormType::ComplyEdocs);
    let fiscal = guard.new_attempt(&submission(), FormType::ComplyFiscal);

    let _permit = guard.begin(&edocs).unwrap();
    assert!(guard.begin(&fiscal).is_ok());
}

#[tokio::test(start_paused = true)]
async fn processed_entries_disappear_after_sweep() {
    let ledger = Arc::new(IdempotencyLedger::default());
    let guard = SubmissionGuard::new(Arc::new(SubmissionLock::default()), Arc::clone(&ledger));
    let (tx, rx) = tokio::sync::watch::channel(false);
    let sweeper = ledger.spawn_sweeper(rx);

    let attempt = guard.new_attempt(&submission(), FormType::ComplyEdocs);
    guard
        .run(&attempt, || async { Ok::<_, String>(()) })
        .await
        .unwrap();
    assert_eq!(ledger.list_processed(), vec![attempt.id.clone()]);

    tokio::time::sleep(Duration::from_secs(7 * 60)).await;
    assert!(ledger.list_processed().is_empty());

    // once forgotten, the same attempt may run again
    assert!(guard.begin(&attempt).is_ok());

    tx.send(true).unwrap();
    sweeper.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retries_of_one_attempt_run_once() {
    let guard = Arc::new(SubmissionGuard::default());
    let attempt = guard.new_attempt(&submission(), FormType::ComplyEdocs);
    let inserts = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..64 {
        let guard = Arc::clone(&guard);
        let attempt = attempt.clone();
        let inserts = Arc::clone(&inserts);
        tasks.push(tokio::spawn(async move {
            let _ = guard
                .run(&attempt, || async {
                    tokio::task::yield_now().await;
                    inserts.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                })
                .await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(inserts.load(Ordering::SeqCst), 1);
    assert!(guard.ledger().is_already_processed(&attempt.id));
    assert!(!guard.lock().is_locked(&attempt.lock_key));
}
