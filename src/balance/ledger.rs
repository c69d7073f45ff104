use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::core_types::UserId;
use crate::db::StoreError;

/// Per-user spendable balance.
///
/// Only absolute reads and writes: callers must hold the `balance_update`
/// task lock across a read-check-write, see [`super::BalanceService`].
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// `None` when the user does not exist
    async fn balance(&self, user_id: UserId) -> Result<Option<Decimal>, StoreError>;

    async fn set_balance(&self, user_id: UserId, balance: Decimal) -> Result<(), StoreError>;
}

pub struct PgBalanceLedger {
    pool: PgPool,
}

impl PgBalanceLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BalanceLedger for PgBalanceLedger {
    async fn balance(&self, user_id: UserId) -> Result<Option<Decimal>, StoreError> {
        let row = sqlx::query("SELECT balance FROM users_tb WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.try_get("balance")).transpose()?)
    }

    async fn set_balance(&self, user_id: UserId, balance: Decimal) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users_tb SET balance = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(balance)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!("user {} not found", user_id)));
        }
        Ok(())
    }
}
