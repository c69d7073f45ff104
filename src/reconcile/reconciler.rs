//! One reconciliation pass over open orders

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::balance::BalanceService;
use crate::catalog::{Catalog, Provider};
use crate::config::{ReconcileConfig, RefundPolicy};
use crate::core_types::{ProviderId, ProviderOrderId};
use crate::db::StoreError;
use crate::orders::{
    Order, OrderFilter, OrderMatch, OrderPatch, OrderSort, OrderStatus, OrderStore, OrderUpdate,
};
use crate::provider::{ProviderError, ProviderGatewayFactory, StatusEntry};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to load providers: {0}")]
    Providers(StoreError),

    #[error("Failed to fetch open orders after id {after_id:?}: {source}")]
    FetchPage {
        after_id: Option<i64>,
        source: StoreError,
    },
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Providers(_) => "RECONCILE_PROVIDERS_FAILED",
            ReconcileError::FetchPage { .. } => "RECONCILE_FETCH_FAILED",
        }
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub pages: usize,
    pub scanned: usize,
    /// Stale unsubmitted orders flipped to `Refunded`
    pub refunded: usize,
    /// Status results turned into updates
    pub status_updates: usize,
    /// Orders not looked at this run (young unsubmitted, inactive provider)
    pub skipped: usize,
    /// Failed or timed-out provider requests
    pub provider_errors: usize,
    pub rows_modified: u64,
    pub write_failures: usize,
}

/// Orders of one provider within a page
struct ProviderBatch {
    provider: Provider,
    ids: Vec<ProviderOrderId>,
}

pub struct Reconciler {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn OrderStore>,
    factory: Arc<dyn ProviderGatewayFactory>,
    balance: Arc<BalanceService>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn OrderStore>,
        factory: Arc<dyn ProviderGatewayFactory>,
        balance: Arc<BalanceService>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            factory,
            balance,
            config,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Page through every open order once.
    ///
    /// Provider and write failures are logged and counted; only a failure to
    /// read the next page ends the run early.
    pub async fn run_once(&self) -> Result<ReconcileStats, ReconcileError> {
        let providers: HashMap<ProviderId, Provider> = self
            .catalog
            .active_providers()
            .await
            .map_err(ReconcileError::Providers)?
            .into_iter()
            .map(|p| (p.provider_id, p))
            .collect();

        let stale_before = Utc::now() - self.config.stale_after();
        let page_size = self.config.page_size.max(1);
        let mut filter = OrderFilter::open();
        let mut stats = ReconcileStats::default();

        loop {
            let page = self
                .store
                .find_page(&filter, OrderSort::IdAsc, page_size)
                .await
                .map_err(|source| ReconcileError::FetchPage {
                    after_id: filter.after_id,
                    source,
                })?;

            let Some(last) = page.last() else {
                break;
            };
            filter.after_id = Some(last.order_id);
            stats.pages += 1;
            stats.scanned += page.len();

            self.reconcile_page(&page, &providers, stale_before, &mut stats)
                .await;

            if page.len() < page_size {
                break;
            }
        }

        info!(
            pages = stats.pages,
            scanned = stats.scanned,
            refunded = stats.refunded,
            status_updates = stats.status_updates,
            provider_errors = stats.provider_errors,
            write_failures = stats.write_failures,
            "Reconciliation run finished"
        );
        Ok(stats)
    }

    async fn reconcile_page(
        &self,
        page: &[Order],
        providers: &HashMap<ProviderId, Provider>,
        stale_before: DateTime<Utc>,
        stats: &mut ReconcileStats,
    ) {
        let mut updates = Vec::new();
        let mut credit_refunds = Vec::new();
        let mut batches: HashMap<ProviderId, ProviderBatch> = HashMap::new();

        for order in page {
            if !order.is_submitted() {
                if order.created_at < stale_before {
                    match self.config.refund_policy {
                        RefundPolicy::StatusOnly => updates.push(refund_update(order)),
                        RefundPolicy::CreditBalance => credit_refunds.push(order),
                    }
                } else {
                    stats.skipped += 1;
                }
                continue;
            }

            match providers.get(&order.provider_id) {
                Some(provider) => batches
                    .entry(order.provider_id)
                    .or_insert_with(|| ProviderBatch {
                        provider: provider.clone(),
                        ids: Vec::new(),
                    })
                    .ids
                    .push(order.provider_order_id),
                None => stats.skipped += 1,
            }
        }

        stats.refunded += updates.len();

        let results = join_all(batches.into_values().map(|batch| self.fetch_statuses(batch))).await;
        for (provider_id, entries, errors) in results {
            stats.provider_errors += errors;
            for entry in entries {
                if let Some(update) = status_update(provider_id, &entry) {
                    updates.push(update);
                    stats.status_updates += 1;
                }
            }
        }

        if !updates.is_empty() {
            let count = updates.len();
            match self.store.bulk_update(updates).await {
                Ok(result) => {
                    stats.rows_modified += result.modified;
                    stats.write_failures += result.failed;
                    debug!(
                        updates = count,
                        modified = result.modified,
                        unmatched = result.unmatched,
                        "Page written"
                    );
                }
                Err(e) => {
                    stats.write_failures += count;
                    error!(updates = count, error = %e, "Bulk order write failed");
                }
            }
        }

        for order in credit_refunds {
            self.refund_with_credit(order, stats).await;
        }
    }

    /// Every chunk of one provider's ids, sequentially, each under the timeout.
    /// Returns what arrived and how many requests failed.
    async fn fetch_statuses(&self, batch: ProviderBatch) -> (ProviderId, Vec<StatusEntry>, usize) {
        let provider_id = batch.provider.provider_id;
        let gateway = self.factory.gateway(&batch.provider);
        let mut entries = Vec::new();
        let mut errors = 0;

        for chunk in batch.ids.chunks(self.config.status_batch_size.max(1)) {
            let result =
                match tokio::time::timeout(self.config.provider_timeout(), gateway.order_statuses(chunk))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout),
                };
            match result {
                Ok(mut got) => entries.append(&mut got),
                Err(e) => {
                    errors += 1;
                    warn!(
                        provider_id,
                        orders = chunk.len(),
                        code = e.code(),
                        error = %e,
                        "Provider status request failed"
                    );
                }
            }
        }

        (provider_id, entries, errors)
    }

    /// Flip one stale order and give the money back, only if the flip won
    /// against a late submission write-back.
    async fn refund_with_credit(&self, order: &Order, stats: &mut ReconcileStats) {
        let written = match self.store.bulk_update(vec![refund_update(order)]).await {
            Ok(result) => result,
            Err(e) => {
                stats.write_failures += 1;
                error!(order_id = order.order_id, error = %e, "Refund write failed");
                return;
            }
        };
        stats.rows_modified += written.modified;
        if written.modified == 0 {
            debug!(order_id = order.order_id, "Order submitted meanwhile, no refund");
            return;
        }
        stats.refunded += 1;

        match self
            .balance
            .refund(order.user_id, order.price, order.order_id)
            .await
        {
            Ok(balance) => info!(
                order_id = order.order_id,
                user_id = order.user_id,
                price = %order.price,
                %balance,
                "Stale order refunded"
            ),
            // Status already says Refunded; the credit must be replayed by hand
            Err(e) => error!(
                order_id = order.order_id,
                user_id = order.user_id,
                price = %order.price,
                code = e.code(),
                error = %e,
                "CRITICAL: refund credit failed"
            ),
        }
    }
}

fn refund_update(order: &Order) -> OrderUpdate {
    OrderUpdate {
        target: OrderMatch::Unsubmitted(order.order_id),
        patch: OrderPatch {
            status: Some(OrderStatus::Refunded),
            ..Default::default()
        },
    }
}

/// Provider result → update. An entry carrying an error only records the
/// text; an unrecognised status string leaves the status alone.
fn status_update(provider_id: ProviderId, entry: &StatusEntry) -> Option<OrderUpdate> {
    if entry.order == 0 {
        return None;
    }

    let patch = match entry.error.as_deref().filter(|e| !e.is_empty()) {
        Some(error) => OrderPatch {
            provider_order_response: Some(error.to_string()),
            ..Default::default()
        },
        None => {
            let status = OrderStatus::from_provider(&entry.status);
            if status.is_none() {
                warn!(
                    provider_id,
                    provider_order_id = entry.order,
                    status = %entry.status,
                    "Unknown provider status"
                );
            }
            OrderPatch {
                status,
                remains: Some(entry.remains),
                start_counter: Some(entry.start_counter),
                ..Default::default()
            }
        }
    };

    Some(OrderUpdate {
        target: OrderMatch::ProviderOrder {
            provider_id,
            provider_order_id: entry.order,
        },
        patch,
    })
}
