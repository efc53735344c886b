//! Sync scheduler
//!
//! The periodic timer and manual export requests share one gate, so at
//! most one reconciliation pass runs at any time. A trigger that finds the
//! gate taken is dropped and reported as [`TriggerOutcome::Skipped`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ExportError;
use crate::reconciler::ExportReconciler;
use crate::report::{ReconciliationReport, SyncTrigger};

/// Default interval between scheduled passes
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Reconciling,
}

/// Result of a trigger
#[derive(Debug)]
pub enum TriggerOutcome {
    /// The pass ran to completion (individual batches may still have failed)
    Completed(ReconciliationReport),
    /// Another pass was already running
    Skipped,
    /// The pass aborted
    Failed(ExportError),
}

/// Runs reconciliation passes on an interval and on demand
pub struct SyncScheduler {
    reconciler: Arc<ExportReconciler>,
    interval: Duration,
    gate: Mutex<()>,
    reconciling: AtomicBool,
    shutdown: CancellationToken,
}

/// Resets the state flag when a pass ends, however it ends
struct Running<'a>(&'a AtomicBool);

impl<'a> Running<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncScheduler {
    pub fn new(reconciler: Arc<ExportReconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            gate: Mutex::new(()),
            reconciling: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        if self.reconciling.load(Ordering::SeqCst) {
            SchedulerState::Reconciling
        } else {
            SchedulerState::Idle
        }
    }

    /// Runs a pass now unless one is already running
    pub async fn trigger(&self, trigger: SyncTrigger) -> TriggerOutcome {
        let Ok(_guard) = self.gate.try_lock() else {
            info!(%trigger, "Reconciliation already running, trigger skipped");
            return TriggerOutcome::Skipped;
        };
        let _running = Running::enter(&self.reconciling);

        match self.reconciler.reconcile_until(trigger, &self.shutdown).await {
            Ok(report) => {
                if report.requires_reauthorization() {
                    warn!(
                        run_id = %report.run_id,
                        "Ledger connection requires reauthorization; waiting for next interval"
                    );
                }
                TriggerOutcome::Completed(report)
            }
            Err(e) => {
                error!(%trigger, error = %e, "Reconciliation pass failed");
                TriggerOutcome::Failed(e)
            }
        }
    }

    /// Starts the interval loop; it ends when `cancel` fires
    ///
    /// Cancelling also stops an in-flight pass once its current batch is
    /// written and marked.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        // the tick arm does not poll `cancel` while a pass runs
        {
            let cancel = cancel.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                shutdown.cancel();
            });
        }

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;

            info!(interval_secs = self.interval.as_secs(), "Sync scheduler started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let TriggerOutcome::Completed(report) = self.trigger(SyncTrigger::Scheduled).await {
                            info!(
                                run_id = %report.run_id,
                                summary = %report.message(),
                                "Scheduled reconciliation finished"
                            );
                        }
                    }
                }
            }
            info!("Sync scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::InMemoryLedger;
    use crate::reconciler::ReconcilerConfig;
    use chrono::{NaiveDate, Utc};
    use core_kernel::{Amount, UserId};
    use domain_expense::ports::mock::{InMemoryExpenseStore, InMemoryUserDirectory};
    use domain_expense::{Expense, ExpenseCategory, ExternalSignals, NewExpense, PolicyEvaluator, Role, User};
    use rust_decimal_macros::dec;

    async fn scheduler(ledger: Arc<InMemoryLedger>) -> (Arc<SyncScheduler>, Arc<InMemoryExpenseStore>) {
        let claimant = User::new("Alice", "alice@example.com", Role::Employee);
        let mut expense = Expense::submit(
            NewExpense {
                claimant_id: claimant.id,
                description: "Train".to_string(),
                amount: Amount::new(dec!(42)).unwrap(),
                category: ExpenseCategory::Travel,
                expense_date: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
                notes: None,
                receipt: None,
                signals: ExternalSignals::none(),
            },
            &PolicyEvaluator::default(),
        )
        .unwrap();
        expense.approve(UserId::new_v7(), None, Utc::now()).unwrap();

        let store = Arc::new(InMemoryExpenseStore::with_expenses(vec![expense]).await);
        let users = Arc::new(InMemoryUserDirectory::with_users(vec![claimant]).await);
        let reconciler = Arc::new(ExportReconciler::new(
            store.clone(),
            users,
            ledger,
            ReconcilerConfig::default(),
        ));
        (Arc::new(SyncScheduler::new(reconciler, DEFAULT_SYNC_INTERVAL)), store)
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_delay(Duration::from_millis(200)).await;
        let (scheduler, _) = scheduler(ledger.clone()).await;

        let background = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger(SyncTrigger::Scheduled).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.state(), SchedulerState::Reconciling);

        let manual = scheduler.trigger(SyncTrigger::Manual).await;
        assert!(matches!(manual, TriggerOutcome::Skipped));

        let first = background.await.unwrap();
        assert!(matches!(first, TriggerOutcome::Completed(_)));
        assert_eq!(ledger.calls(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_returns_to_idle_after_failure() {
        let ledger = Arc::new(InMemoryLedger::new());
        let (scheduler, store) = scheduler(ledger.clone()).await;
        store.fail_mark_exported(true);

        let outcome = scheduler.trigger(SyncTrigger::Manual).await;
        match outcome {
            TriggerOutcome::Completed(report) => assert_eq!(report.failures.len(), 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        store.fail_mark_exported(false);
        let retry = scheduler.trigger(SyncTrigger::Manual).await;
        assert!(matches!(retry, TriggerOutcome::Completed(ref r) if r.successes.len() == 1));
    }

    #[tokio::test]
    async fn test_shutdown_stops_scheduled_pass_between_batches() {
        let mut claimants = Vec::new();
        let mut expenses = Vec::new();
        for n in 0..4 {
            let claimant = User::new(format!("Claimant {n}"), format!("c{n}@example.com"), Role::Employee);
            let mut expense = Expense::submit(
                NewExpense {
                    claimant_id: claimant.id,
                    description: "Taxi".to_string(),
                    amount: Amount::new(dec!(25)).unwrap(),
                    category: ExpenseCategory::Travel,
                    expense_date: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
                    notes: None,
                    receipt: None,
                    signals: ExternalSignals::none(),
                },
                &PolicyEvaluator::default(),
            )
            .unwrap();
            expense.approve(UserId::new_v7(), None, Utc::now()).unwrap();
            claimants.push(claimant);
            expenses.push(expense);
        }

        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_delay(Duration::from_millis(300)).await;
        let store = Arc::new(InMemoryExpenseStore::with_expenses(expenses).await);
        let reconciler = Arc::new(ExportReconciler::new(
            store.clone(),
            Arc::new(InMemoryUserDirectory::with_users(claimants).await),
            ledger.clone(),
            ReconcilerConfig::default(),
        ));
        let scheduler = Arc::new(SyncScheduler::new(reconciler, Duration::from_millis(100)));
        let cancel = CancellationToken::new();
        let handle = scheduler.clone().spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(scheduler.state(), SchedulerState::Reconciling);
        cancel.cancel();
        handle.await.unwrap();

        // the batch in flight completes, the remaining three wait
        assert_eq!(ledger.calls(), 1);
        let exported = store.all().await.iter().filter(|e| e.exported_to_ledger).count();
        assert_eq!(exported, 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_loop_runs_and_stops() {
        let ledger = Arc::new(InMemoryLedger::new());
        let (scheduler, store) = scheduler(ledger.clone()).await;
        let cancel = CancellationToken::new();

        let handle = scheduler.clone().spawn(cancel.clone());
        tokio::time::sleep(DEFAULT_SYNC_INTERVAL + Duration::from_secs(1)).await;

        assert_eq!(ledger.calls(), 1);
        assert!(store.all().await.iter().all(|e| e.exported_to_ledger));

        cancel.cancel();
        handle.await.unwrap();
    }
}
