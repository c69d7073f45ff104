//! Order creation and lookup
//!
//! Shared by the internal API (service by id) and the third-party API
//! (service by seq, caller resolved from an API key).

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::dispatch::{Dispatcher, SubmissionJob};
use super::error::OrderError;
use super::models::{NewOrder, Order, OrderFilter, OrderPatch, OrderSort, order_price};
use super::state::OrderStatus;
use super::store::OrderStore;
use crate::balance::{BalanceService, NewTransaction, TransactionKind};
use crate::catalog::{Catalog, ServiceLookup};
use crate::core_types::{OrderId, UserId};
use crate::provider::SubmitOrder;

/// Upper bound on a single listing page
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub user_id: UserId,
    pub service: ServiceLookup,
    pub quantity: i64,
    pub link: String,
}

pub struct OrderService {
    catalog: Arc<dyn Catalog>,
    balance: Arc<BalanceService>,
    store: Arc<dyn OrderStore>,
    dispatcher: Arc<Dispatcher>,
}

impl OrderService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        balance: Arc<BalanceService>,
        store: Arc<dyn OrderStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            catalog,
            balance,
            store,
            dispatcher,
        }
    }

    /// Validate, charge, persist and hand off to the provider.
    ///
    /// Returns once the order row exists; the provider call happens later on
    /// the dispatcher and does not depend on the caller staying connected.
    pub async fn create_order(&self, req: CreateOrder) -> Result<Order, OrderError> {
        if req.quantity <= 0 {
            return Err(OrderError::InvalidRequest(
                "quantity must be positive".into(),
            ));
        }
        if req.link.trim().is_empty() {
            return Err(OrderError::InvalidRequest("link is required".into()));
        }

        let service = self
            .catalog
            .service(req.service)
            .await?
            .filter(|s| s.is_active())
            .ok_or(OrderError::ServiceNotFound)?;

        if !service.accepts_quantity(req.quantity) {
            return Err(OrderError::QuantityInvalid {
                min: service.min_amount,
                max: service.max_amount,
            });
        }

        let provider = self
            .catalog
            .provider(service.provider_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or(OrderError::ProviderNotFound)?;

        let rate = match self.catalog.custom_rate(req.user_id, service.service_id).await? {
            Some(custom) => custom.rate,
            None => service.rate,
        };
        let price = order_price(req.quantity, rate);

        self.balance.debit(req.user_id, price).await?;

        let new_order = NewOrder {
            user_id: req.user_id,
            service_id: service.service_id,
            category_id: service.category_id,
            provider_id: provider.provider_id,
            quantity: req.quantity,
            price,
            link: req.link.clone(),
        };

        let order = match self.store.create(new_order).await {
            Ok(order) => order,
            Err(e) => {
                error!(user_id = req.user_id, %price, error = %e, "Order insert failed after debit");
                self.compensate(req.user_id, price).await;
                return Err(e.into());
            }
        };

        self.balance
            .audit(NewTransaction {
                user_id: req.user_id,
                amount: price,
                kind: TransactionKind::PlayOrder,
                order_id: Some(order.order_id),
            })
            .await;

        info!(
            order_id = order.order_id,
            user_id = order.user_id,
            service_id = service.service_id,
            provider_id = provider.provider_id,
            quantity = order.quantity,
            %price,
            "Order created"
        );

        let job = SubmissionJob {
            order_id: order.order_id,
            order: SubmitOrder {
                provider_service_id: service.provider_service_id,
                link: order.link.clone(),
                quantity: order.quantity,
            },
            provider,
        };
        // Failure is already recorded on the order; the charge stands and the
        // stale-order rule refunds it later.
        let _ = self.dispatcher.enqueue(job).await;

        Ok(order)
    }

    /// Undo a debit whose order row never got written
    async fn compensate(&self, user_id: UserId, price: Decimal) {
        if price <= Decimal::ZERO {
            return;
        }
        match self.balance.credit(user_id, price).await {
            Ok(balance) => info!(user_id, %price, %balance, "Debit compensated"),
            // Money is gone from the user with no order; needs manual repair
            Err(e) => error!(user_id, %price, error = %e, "CRITICAL: compensation failed"),
        }
    }

    /// Order owned by `user_id`
    pub async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order, OrderError> {
        self.store
            .get(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or(OrderError::OrderNotFound)
    }

    /// Orders owned by `user_id` among `ids`; unknown or foreign ids are skipped.
    pub async fn get_orders(
        &self,
        user_id: UserId,
        ids: &[OrderId],
    ) -> Result<Vec<Order>, OrderError> {
        let mut orders = Vec::with_capacity(ids.len());
        for &id in ids.iter().take(MAX_PAGE_SIZE) {
            if let Some(order) = self.store.get(id).await?.filter(|o| o.user_id == user_id) {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    /// Newest-first page of a user's orders; `before_id` continues a previous page
    pub async fn list_orders(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
        before_id: Option<OrderId>,
        limit: usize,
    ) -> Result<Vec<Order>, OrderError> {
        let filter = OrderFilter {
            statuses: status.into_iter().collect(),
            user_id: Some(user_id),
            before_id,
            ..Default::default()
        };
        Ok(self
            .store
            .find_page(&filter, OrderSort::IdDesc, limit.clamp(1, MAX_PAGE_SIZE))
            .await?)
    }

    /// Operator override of status, counters, note or link
    pub async fn admin_update(
        &self,
        order_id: OrderId,
        patch: OrderPatch,
    ) -> Result<Order, OrderError> {
        if patch.is_empty() {
            return Err(OrderError::InvalidRequest("nothing to update".into()));
        }
        let order = self
            .store
            .update_by_id(order_id, &patch)
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        warn!(
            order_id,
            status = %order.status,
            "Order overridden by operator"
        );
        Ok(order)
    }
}
