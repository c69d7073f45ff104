use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::ledger::BalanceLedger;
use super::transaction::{NewTransaction, Transaction, TransactionKind, TransactionLog};
use crate::core_types::{MONEY_SCALE, OrderId, UserId};
use crate::db::StoreError;
use crate::retry::{RetryPolicy, retry};
use crate::task_lock::{LockKind, TaskLock, TaskLockError};

#[derive(Error, Debug, Clone)]
pub enum BalanceError {
    #[error("Balance update already in progress for user {0}")]
    LockHeld(UserId),

    #[error("Not enough balance: available {available}, required {required}")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Amount must be greater than zero with at most 4 decimal places")]
    InvalidAmount,

    #[error("Balance persistence error: {0}")]
    Persistence(String),
}

impl BalanceError {
    pub fn code(&self) -> &'static str {
        match self {
            BalanceError::LockHeld(_) => "BACKGROUND_TASK_EXISTS",
            BalanceError::InsufficientFunds { .. } => "NOT_ENOUGH_BALANCE",
            BalanceError::UserNotFound(_) => "USER_NOT_FOUND",
            BalanceError::InvalidAmount => "INVALID_AMOUNT",
            BalanceError::Persistence(_) => "BALANCE_PERSISTENCE",
        }
    }
}

impl From<StoreError> for BalanceError {
    fn from(e: StoreError) -> Self {
        BalanceError::Persistence(e.to_string())
    }
}

impl From<TaskLockError> for BalanceError {
    fn from(e: TaskLockError) -> Self {
        match e {
            TaskLockError::AlreadyHeld { user_id, .. } => BalanceError::LockHeld(user_id),
            TaskLockError::Database(msg) => BalanceError::Persistence(msg),
        }
    }
}

/// Finer amounts would be rounded by the balance column on write
fn on_money_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}

/// Single entry point for every balance mutation.
///
/// Each call holds the user's `balance_update` lock across
/// read → check → write, and releases it whatever the outcome.
pub struct BalanceService {
    ledger: Arc<dyn BalanceLedger>,
    lock: Arc<dyn TaskLock>,
    transactions: Arc<dyn TransactionLog>,
    lock_ttl: Duration,
    release_policy: RetryPolicy,
}

impl BalanceService {
    pub fn new(
        ledger: Arc<dyn BalanceLedger>,
        lock: Arc<dyn TaskLock>,
        transactions: Arc<dyn TransactionLog>,
        lock_ttl: Duration,
        release_policy: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            lock,
            transactions,
            lock_ttl,
            release_policy,
        }
    }

    /// Unlocked read, for display only
    pub async fn balance(&self, user_id: UserId) -> Result<Decimal, BalanceError> {
        self.ledger
            .balance(user_id)
            .await?
            .ok_or(BalanceError::UserNotFound(user_id))
    }

    /// Deduct `amount`; returns the new balance.
    pub async fn debit(&self, user_id: UserId, amount: Decimal) -> Result<Decimal, BalanceError> {
        if !on_money_scale(amount) {
            return Err(BalanceError::InvalidAmount);
        }
        self.mutate(user_id, |current| {
            if current < amount {
                return Err(BalanceError::InsufficientFunds {
                    available: current,
                    required: amount,
                });
            }
            Ok(current - amount)
        })
        .await
    }

    /// Add `amount` (top-up, refund, compensation); returns the new balance.
    pub async fn credit(&self, user_id: UserId, amount: Decimal) -> Result<Decimal, BalanceError> {
        if amount <= Decimal::ZERO || !on_money_scale(amount) {
            return Err(BalanceError::InvalidAmount);
        }
        self.mutate(user_id, |current| Ok(current + amount)).await
    }

    /// Operator top-up, audited as `AddBalance`
    pub async fn top_up(&self, user_id: UserId, amount: Decimal) -> Result<Decimal, BalanceError> {
        let balance = self.credit(user_id, amount).await?;
        self.audit(NewTransaction {
            user_id,
            amount,
            kind: TransactionKind::AddBalance,
            order_id: None,
        })
        .await;
        Ok(balance)
    }

    /// Give back the price of an order, audited as `Refund`
    pub async fn refund(
        &self,
        user_id: UserId,
        amount: Decimal,
        order_id: OrderId,
    ) -> Result<Decimal, BalanceError> {
        let balance = self.credit(user_id, amount).await?;
        self.audit(NewTransaction {
            user_id,
            amount,
            kind: TransactionKind::Refund,
            order_id: Some(order_id),
        })
        .await;
        Ok(balance)
    }

    /// Append an audit record. The balance has already moved, so a failure
    /// here is logged and swallowed.
    pub async fn audit(&self, tx: NewTransaction) -> Option<Transaction> {
        let (user_id, kind, amount) = (tx.user_id, tx.kind, tx.amount);
        match self.transactions.record(tx).await {
            Ok(record) => Some(record),
            Err(e) => {
                error!(user_id, kind = %kind, %amount, error = %e, "Failed to record transaction");
                None
            }
        }
    }

    async fn mutate<F>(&self, user_id: UserId, apply: F) -> Result<Decimal, BalanceError>
    where
        F: FnOnce(Decimal) -> Result<Decimal, BalanceError>,
    {
        let handle = self
            .lock
            .acquire(user_id, LockKind::BalanceUpdate, self.lock_ttl)
            .await?;

        let result = self.read_apply_write(user_id, apply).await;

        let lock = &self.lock;
        if let Err(e) = retry(self.release_policy, "release_balance_lock", || {
            lock.release(&handle)
        })
        .await
        {
            // Row stays until expires_at; the user is blocked until then
            error!(
                user_id,
                token = handle.token,
                error = %e,
                "Failed to release balance lock"
            );
        }

        result
    }

    async fn read_apply_write<F>(&self, user_id: UserId, apply: F) -> Result<Decimal, BalanceError>
    where
        F: FnOnce(Decimal) -> Result<Decimal, BalanceError>,
    {
        let current = self
            .ledger
            .balance(user_id)
            .await?
            .ok_or(BalanceError::UserNotFound(user_id))?;

        let next = match apply(current) {
            Ok(next) => next,
            Err(e) => {
                warn!(user_id, %current, error = %e, "Balance update rejected");
                return Err(e);
            }
        };

        self.ledger.set_balance(user_id, next).await?;
        debug!(user_id, from = %current, to = %next, "Balance updated");
        Ok(next)
    }
}
