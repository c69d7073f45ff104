//! Reconcile Worker
//!
//! Fires [`Reconciler::run_once`] on a fixed period. A tick that arrives
//! while the previous run is still going is skipped, never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::reconciler::Reconciler;

pub struct ReconcileWorker {
    reconciler: Arc<Reconciler>,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when the run ends, including on panic
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReconcileWorker {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tick until `shutdown` turns true, then wait for the run in flight
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.reconciler.config().interval();
        info!(
            interval_secs = period.as_secs(),
            page_size = self.reconciler.config().page_size,
            refund_policy = ?self.reconciler.config().refund_policy,
            "Starting reconcile worker"
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.trigger();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // A credit refund must not stop between the status flip and the credit
        while self.is_running() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        info!("Reconcile worker stopped");
    }

    /// Start a run in the background unless one is in flight.
    /// Returns whether a run was started.
    pub fn trigger(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous reconciliation still running, tick skipped");
            return false;
        }

        let guard = RunGuard(self.running.clone());
        let reconciler = self.reconciler.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = reconciler.run_once().await {
                error!(code = e.code(), error = %e, "Reconciliation run failed");
            }
        });
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::{BalanceService, MemoryLedger, MemoryTransactionLog};
    use crate::catalog::MockCatalog;
    use crate::config::ReconcileConfig;
    use crate::orders::{MemoryOrderStore, Order, OrderStatus};
    use crate::provider::{MockProvider, MockProviderFactory};
    use crate::retry::RetryPolicy;
    use crate::task_lock::MemoryTaskLock;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn worker(provider: Arc<MockProvider>, store: Arc<MemoryOrderStore>) -> ReconcileWorker {
        let catalog = Arc::new(MockCatalog::new());
        catalog.add_provider(1, true);
        let factory = Arc::new(MockProviderFactory::new());
        factory.register(1, provider);
        let balance = Arc::new(BalanceService::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryTaskLock::new()),
            Arc::new(MemoryTransactionLog::new()),
            Duration::from_secs(60),
            RetryPolicy::default(),
        ));
        ReconcileWorker::new(Arc::new(Reconciler::new(
            catalog,
            store,
            factory,
            balance,
            ReconcileConfig::default(),
        )))
    }

    fn submitted_order() -> Order {
        let now = Utc::now();
        Order {
            order_id: 1,
            user_id: 1,
            service_id: 1,
            category_id: 1,
            provider_id: 1,
            quantity: 10,
            price: Decimal::ONE,
            link: "https://x".into(),
            status: OrderStatus::Pending,
            provider_order_id: 9,
            provider_order_response: "Order: 9".into(),
            start_counter: 0,
            remains: 10,
            note: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_overlapping_tick_skipped() {
        let provider = Arc::new(MockProvider::new(1));
        provider.set_delay(Duration::from_millis(100));
        provider.set_status(9, "COMPLETED", 0, 0);
        let store = Arc::new(MemoryOrderStore::new());
        store.insert(submitted_order());
        let w = worker(provider.clone(), store.clone());

        assert!(w.trigger());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(w.is_running());
        assert!(!w.trigger());

        for _ in 0..100 {
            if !w.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!w.is_running());
        assert_eq!(provider.status_batches().len(), 1);
        assert_eq!(store.snapshot(1).unwrap().status, OrderStatus::Completed);

        // Free again once the run finished
        assert!(w.trigger());
    }

    #[tokio::test]
    async fn test_failed_run_clears_flag() {
        let store = Arc::new(MemoryOrderStore::new());
        store.set_fail_find(true);
        let w = worker(Arc::new(MockProvider::new(1)), store.clone());

        assert!(w.trigger());
        for _ in 0..100 {
            if !w.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!w.is_running());
        assert_eq!(store.find_calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_run_in_flight() {
        let provider = Arc::new(MockProvider::new(1));
        provider.set_delay(Duration::from_millis(100));
        provider.set_status(9, "COMPLETED", 0, 0);
        let store = Arc::new(MemoryOrderStore::new());
        store.insert(submitted_order());
        let w = Arc::new(worker(provider, store.clone()));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn({
            let w = w.clone();
            async move { w.run(rx).await }
        });

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(w.is_running());
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!w.is_running());
        assert_eq!(store.snapshot(1).unwrap().status, OrderStatus::Completed);
    }
}
