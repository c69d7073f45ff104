//! Order persistence
//!
//! `orders_tb` holds the order lifecycle. All writes bump `updated_at`.

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::warn;

use super::models::{
    BulkWriteResult, NewOrder, Order, OrderFilter, OrderMatch, OrderPatch, OrderSort, OrderUpdate,
    SubmissionOutcome,
};
use super::state::OrderStatus;
use crate::core_types::OrderId;
use crate::db::StoreError;

/// Concurrent statements per bulk write
const BULK_CONCURRENCY: usize = 8;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert in `Processing` with `provider_order_id = 0`
    async fn create(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn find_page(
        &self,
        filter: &OrderFilter,
        sort: OrderSort,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError>;

    /// Apply every update independently; a failing update does not stop the rest.
    async fn bulk_update(&self, updates: Vec<OrderUpdate>) -> Result<BulkWriteResult, StoreError>;

    /// Record the detached submission outcome on an order that is still open
    /// and unsubmitted. Returns false when no such order matched.
    async fn set_provider_result(
        &self,
        order_id: OrderId,
        outcome: &SubmissionOutcome,
    ) -> Result<bool, StoreError>;

    /// Operator override; returns the updated order
    async fn update_by_id(
        &self,
        order_id: OrderId,
        patch: &OrderPatch,
    ) -> Result<Option<Order>, StoreError>;
}

const ORDER_COLUMNS: &str = r#"order_id, user_id, service_id, category_id, provider_id, quantity,
    price, link, status, provider_order_id, provider_order_response, start_counter,
    remains, note, created_at, updated_at"#;

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &PgRow) -> Result<Order, StoreError> {
        let status_id: i16 = row.try_get("status")?;
        let status = OrderStatus::from_id(status_id)
            .ok_or_else(|| StoreError::Database(format!("Invalid order status: {}", status_id)))?;

        Ok(Order {
            order_id: row.try_get("order_id")?,
            user_id: row.try_get("user_id")?,
            service_id: row.try_get("service_id")?,
            category_id: row.try_get("category_id")?,
            provider_id: row.try_get("provider_id")?,
            quantity: row.try_get("quantity")?,
            price: row.try_get("price")?,
            link: row.try_get("link")?,
            status,
            provider_order_id: row.try_get("provider_order_id")?,
            provider_order_response: row.try_get("provider_order_response")?,
            start_counter: row.try_get("start_counter")?,
            remains: row.try_get("remains")?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn push_patch(qb: &mut QueryBuilder<'_, Postgres>, patch: &OrderPatch) {
        qb.push("UPDATE orders_tb SET updated_at = NOW()");
        if let Some(status) = patch.status {
            qb.push(", status = ").push_bind(status.id());
        }
        if let Some(remains) = patch.remains {
            qb.push(", remains = ").push_bind(remains);
        }
        if let Some(start_counter) = patch.start_counter {
            qb.push(", start_counter = ").push_bind(start_counter);
        }
        if let Some(resp) = &patch.provider_order_response {
            qb.push(", provider_order_response = ")
                .push_bind(resp.clone());
        }
        if let Some(note) = &patch.note {
            qb.push(", note = ").push_bind(note.clone());
        }
        if let Some(link) = &patch.link {
            qb.push(", link = ").push_bind(link.clone());
        }
    }

    fn push_match(qb: &mut QueryBuilder<'_, Postgres>, target: &OrderMatch) {
        match target {
            OrderMatch::Id(id) => {
                qb.push(" WHERE order_id = ").push_bind(*id);
            }
            OrderMatch::Unsubmitted(id) => {
                qb.push(" WHERE order_id = ")
                    .push_bind(*id)
                    .push(" AND provider_order_id = 0");
            }
            OrderMatch::ProviderOrder {
                provider_id,
                provider_order_id,
            } => {
                qb.push(" WHERE provider_id = ")
                    .push_bind(*provider_id)
                    .push(" AND provider_order_id = ")
                    .push_bind(*provider_order_id);
            }
        }
    }

    async fn apply_update(&self, update: &OrderUpdate) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::new("");
        Self::push_patch(&mut qb, &update.patch);
        Self::push_match(&mut qb, &update.target);
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order, StoreError> {
        let sql = format!(
            r#"INSERT INTO orders_tb
                   (user_id, service_id, category_id, provider_id, quantity, price, link, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING {}"#,
            ORDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(order.user_id)
            .bind(order.service_id)
            .bind(order.category_id)
            .bind(order.provider_id)
            .bind(order.quantity)
            .bind(order.price)
            .bind(&order.link)
            .bind(OrderStatus::Processing.id())
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_order(&row)
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {} FROM orders_tb WHERE order_id = $1", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn find_page(
        &self,
        filter: &OrderFilter,
        sort: OrderSort,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM orders_tb WHERE TRUE", ORDER_COLUMNS));

        if !filter.statuses.is_empty() {
            let ids: Vec<i16> = filter.statuses.iter().map(|s| s.id()).collect();
            qb.push(" AND status = ANY(").push_bind(ids).push(")");
        }
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(provider_id) = filter.provider_id {
            qb.push(" AND provider_id = ").push_bind(provider_id);
        }
        if let Some(after) = filter.after_id {
            qb.push(" AND order_id > ").push_bind(after);
        }
        if let Some(before) = filter.before_id {
            qb.push(" AND order_id < ").push_bind(before);
        }

        qb.push(match sort {
            OrderSort::IdAsc => " ORDER BY order_id ASC",
            OrderSort::IdDesc => " ORDER BY order_id DESC",
        });
        qb.push(" LIMIT ").push_bind(limit as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(Self::row_to_order(row)?);
        }
        Ok(orders)
    }

    async fn bulk_update(&self, updates: Vec<OrderUpdate>) -> Result<BulkWriteResult, StoreError> {
        let results: Vec<(OrderMatch, Result<u64, StoreError>)> = futures::stream::iter(updates)
            .map(|update| {
                async move {
                    let result = self.apply_update(&update).await;
                    (update.target, result)
                }
                .boxed()
            })
            .buffer_unordered(BULK_CONCURRENCY)
            .collect()
            .await;

        let mut summary = BulkWriteResult::default();
        for (target, result) in results {
            match result {
                Ok(0) => summary.unmatched += 1,
                Ok(n) => summary.modified += n,
                Err(e) => {
                    summary.failed += 1;
                    warn!(target_match = ?target, error = %e, "Order update failed");
                }
            }
        }
        Ok(summary)
    }

    async fn set_provider_result(
        &self,
        order_id: OrderId,
        outcome: &SubmissionOutcome,
    ) -> Result<bool, StoreError> {
        let open: Vec<i16> = OrderStatus::OPEN.iter().map(|s| s.id()).collect();
        let result = sqlx::query(
            r#"UPDATE orders_tb
               SET provider_order_id = $2, provider_order_response = $3, updated_at = NOW()
               WHERE order_id = $1 AND provider_order_id = 0 AND status = ANY($4)"#,
        )
        .bind(order_id)
        .bind(outcome.provider_order_id())
        .bind(outcome.response_text())
        .bind(open)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_by_id(
        &self,
        order_id: OrderId,
        patch: &OrderPatch,
    ) -> Result<Option<Order>, StoreError> {
        let mut qb = QueryBuilder::new("");
        Self::push_patch(&mut qb, patch);
        Self::push_match(&mut qb, &OrderMatch::Id(order_id));
        qb.push(" RETURNING ").push(ORDER_COLUMNS);

        let row = qb.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }
}
