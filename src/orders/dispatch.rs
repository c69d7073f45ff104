//! Detached provider submission
//!
//! Orders are handed to a bounded queue drained by a fixed pool of workers.
//! A submission outlives the HTTP request that created it; its outcome is
//! written back to the order as `provider_order_id` / `provider_order_response`.
//!
//! A worker re-reads the order before calling the provider and only submits
//! orders that are still open and unsubmitted, so an order the reconciler has
//! already refunded never reaches the provider.

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::models::SubmissionOutcome;
use super::store::OrderStore;
use crate::catalog::Provider;
use crate::config::DispatchConfig;
use crate::core_types::OrderId;
use crate::provider::{ProviderGatewayFactory, SubmitOrder, SubmitReply};
use crate::retry::{RetryPolicy, retry};

#[derive(Debug, Clone)]
pub struct SubmissionJob {
    pub order_id: OrderId,
    pub provider: Provider,
    pub order: SubmitOrder,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("submission queue full")]
    QueueFull,

    #[error("submission queue closed")]
    Closed,
}

/// Handle to the submission pool. Dropping every handle closes the queue;
/// workers finish what is queued and exit.
pub struct Dispatcher {
    tx: mpsc::Sender<SubmissionJob>,
    store: Arc<dyn OrderStore>,
    enqueue_timeout: Duration,
    outstanding: Arc<AtomicUsize>,
}

/// Worker tasks of a [`Dispatcher`], kept by the owner for shutdown
pub struct DispatchWorkers {
    handles: Vec<JoinHandle<()>>,
    outstanding: Arc<AtomicUsize>,
}

struct Worker {
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<SubmissionJob>>>,
    factory: Arc<dyn ProviderGatewayFactory>,
    store: Arc<dyn OrderStore>,
    submit_timeout: Duration,
    writeback: RetryPolicy,
    outstanding: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Spawn the worker pool
    pub fn start(
        config: &DispatchConfig,
        factory: Arc<dyn ProviderGatewayFactory>,
        store: Arc<dyn OrderStore>,
    ) -> (Arc<Self>, DispatchWorkers) {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let outstanding = Arc::new(AtomicUsize::new(0));

        let handles = (0..config.workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    rx: rx.clone(),
                    factory: factory.clone(),
                    store: store.clone(),
                    submit_timeout: config.submit_timeout(),
                    writeback: RetryPolicy::new(
                        config.writeback_attempts,
                        Duration::from_millis(100),
                    ),
                    outstanding: outstanding.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            workers = config.workers,
            queue_size = config.queue_size,
            "Submission dispatcher started"
        );

        (
            Arc::new(Self {
                tx,
                store,
                enqueue_timeout: config.enqueue_timeout(),
                outstanding: outstanding.clone(),
            }),
            DispatchWorkers {
                handles,
                outstanding,
            },
        )
    }

    /// Queue a submission, waiting up to the enqueue timeout for capacity.
    ///
    /// On failure the order is marked with `"Error: <cause>"` so it is not
    /// left looking like an in-flight submission.
    pub async fn enqueue(&self, job: SubmissionJob) -> Result<(), DispatchError> {
        let order_id = job.order_id;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let err = match self.tx.send_timeout(job, self.enqueue_timeout).await {
            Ok(()) => return Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => DispatchError::QueueFull,
            Err(mpsc::error::SendTimeoutError::Closed(_)) => DispatchError::Closed,
        };
        self.outstanding.fetch_sub(1, Ordering::SeqCst);

        warn!(order_id, error = %err, "Order not dispatched");
        let outcome = SubmissionOutcome::Rejected(err.to_string());
        if let Err(e) = self.store.set_provider_result(order_id, &outcome).await {
            error!(order_id, error = %e, "Failed to record dispatch failure");
        }
        Err(err)
    }
}

impl DispatchWorkers {
    /// Jobs queued or being submitted
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Wait for the workers to work off the queue and exit.
    ///
    /// Only finishes once every [`Dispatcher`] handle is dropped. Returns how
    /// many jobs were still outstanding when `timeout` ran out.
    pub async fn drain(self, timeout: Duration) -> usize {
        let outstanding = self.outstanding.clone();
        info!(
            outstanding = outstanding.load(Ordering::SeqCst),
            "Draining submission queue"
        );

        match tokio::time::timeout(timeout, join_all(self.handles)).await {
            Ok(results) => {
                for e in results.into_iter().filter_map(Result::err) {
                    error!(error = %e, "Submission worker panicked");
                }
                info!("Submission queue drained");
                0
            }
            Err(_) => {
                let left = outstanding.load(Ordering::SeqCst);
                warn!(
                    outstanding = left,
                    timeout_ms = timeout.as_millis() as u64,
                    "Submission drain timed out, remaining orders stay unsubmitted"
                );
                left
            }
        }
    }
}

impl Worker {
    async fn run(self) {
        loop {
            // Lock only while waiting; released before the provider call
            let job = { self.rx.lock().await.recv().await };
            let Some(job) = job else {
                debug!(worker = self.id, "Submission queue closed, worker exiting");
                return;
            };
            self.process(job).await;
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Whether the order still wants a provider call
    async fn still_pending(&self, order_id: OrderId) -> bool {
        match self.store.get(order_id).await {
            Ok(Some(order)) if order.status.is_open() && !order.is_submitted() => true,
            Ok(Some(order)) => {
                warn!(
                    order_id,
                    status = %order.status,
                    provider_order_id = order.provider_order_id,
                    "Order no longer awaiting submission, skipped"
                );
                false
            }
            Ok(None) => {
                warn!(order_id, "Order vanished before submission, skipped");
                false
            }
            // Left unsubmitted; the stale rule settles it
            Err(e) => {
                error!(order_id, error = %e, "Failed to re-read order, submission skipped");
                false
            }
        }
    }

    async fn process(&self, job: SubmissionJob) {
        if !self.still_pending(job.order_id).await {
            return;
        }

        let gateway = self.factory.gateway(&job.provider);

        let outcome = match tokio::time::timeout(self.submit_timeout, gateway.submit(&job.order))
            .await
        {
            Ok(Ok(SubmitReply::Accepted(id))) => SubmissionOutcome::Accepted(id),
            Ok(Ok(SubmitReply::Error(msg))) => SubmissionOutcome::Rejected(msg),
            Ok(Err(e)) => SubmissionOutcome::Rejected(e.to_string()),
            Err(_) => SubmissionOutcome::Rejected("provider request timed out".to_string()),
        };

        match &outcome {
            SubmissionOutcome::Accepted(id) => info!(
                order_id = job.order_id,
                provider_id = job.provider.provider_id,
                provider_order_id = id,
                "Order accepted by provider"
            ),
            SubmissionOutcome::Rejected(msg) => warn!(
                order_id = job.order_id,
                provider_id = job.provider.provider_id,
                error = %msg,
                "Order rejected by provider"
            ),
        }

        let store = &self.store;
        let order_id = job.order_id;
        let written = retry(self.writeback, "order_writeback", || {
            store.set_provider_result(order_id, &outcome)
        })
        .await;

        match (written, &outcome) {
            (Ok(true), _) => {}
            // Refunded while the provider call was in flight
            (Ok(false), SubmissionOutcome::Accepted(id)) => error!(
                order_id,
                provider_id = job.provider.provider_id,
                provider_order_id = id,
                "CRITICAL: provider accepted an order that is no longer open"
            ),
            (Ok(false), SubmissionOutcome::Rejected(_)) => {
                warn!(order_id, "Order no longer open, submission outcome dropped")
            }
            (Err(e), _) => error!(
                order_id,
                response = %outcome.response_text(),
                error = %e,
                "Failed to write submission outcome"
            ),
        }
    }
}
