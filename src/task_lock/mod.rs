//! Exclusive Task Lock
//!
//! Advisory mutex keyed by `(user_id, kind)`, persisted as a row in
//! `background_tasks_tb`. The unique constraint on `(user_id, kind)` is what
//! makes it exclusive across processes. Rows carry `expires_at`, so a holder
//! that crashes before release blocks the user only until the TTL elapses.

pub mod postgres;

pub use postgres::PgTaskLock;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::core_types::UserId;

/// What the lock protects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// Read-check-write of a user's balance
    BalanceUpdate,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::BalanceUpdate => "balance_update",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof of a held lock. `token` identifies this holder's row, so a late
/// release never deletes a lock that was reclaimed and re-acquired by someone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub user_id: UserId,
    pub kind: LockKind,
    pub token: i64,
}

#[derive(Error, Debug, Clone)]
pub enum TaskLockError {
    #[error("Task {kind} already running for user {user_id}")]
    AlreadyHeld { user_id: UserId, kind: LockKind },

    #[error("Task lock storage error: {0}")]
    Database(String),
}

impl TaskLockError {
    pub fn code(&self) -> &'static str {
        match self {
            TaskLockError::AlreadyHeld { .. } => "TASK_ALREADY_RUNNING",
            TaskLockError::Database(_) => "TASK_LOCK_STORAGE",
        }
    }
}

impl From<sqlx::Error> for TaskLockError {
    fn from(e: sqlx::Error) -> Self {
        TaskLockError::Database(e.to_string())
    }
}

#[async_trait]
pub trait TaskLock: Send + Sync {
    /// Create the lock row. Fails with `AlreadyHeld` while an unexpired row exists.
    async fn acquire(
        &self,
        user_id: UserId,
        kind: LockKind,
        ttl: Duration,
    ) -> Result<LockHandle, TaskLockError>;

    /// Delete the lock row. Releasing an already-gone lock is not an error.
    async fn release(&self, handle: &LockHandle) -> Result<(), TaskLockError>;
}


#[cfg(test)]
pub use mock::MemoryTaskLock;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_rejected_until_release() {
        let lock = MemoryTaskLock::new();
        let ttl = Duration::from_secs(60);

        let handle = lock.acquire(1, LockKind::BalanceUpdate, ttl).await.unwrap();
        let err = lock
            .acquire(1, LockKind::BalanceUpdate, ttl)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskLockError::AlreadyHeld { user_id: 1, .. }));
        assert_eq!(err.code(), "TASK_ALREADY_RUNNING");

        // Different user is independent
        assert!(lock.acquire(2, LockKind::BalanceUpdate, ttl).await.is_ok());

        lock.release(&handle).await.unwrap();
        assert!(lock.acquire(1, LockKind::BalanceUpdate, ttl).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_lock_is_reclaimed() {
        let lock = MemoryTaskLock::new();

        let stale = lock
            .acquire(1, LockKind::BalanceUpdate, Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let fresh = lock
            .acquire(1, LockKind::BalanceUpdate, Duration::from_secs(60))
            .await
            .unwrap();
        assert_ne!(stale.token, fresh.token);

        // The stale holder's release must not drop the new holder's lock
        lock.release(&stale).await.unwrap();
        assert!(lock.is_held(1, LockKind::BalanceUpdate));
    }

    #[test]
    fn test_lock_kind_name() {
        assert_eq!(LockKind::BalanceUpdate.to_string(), "balance_update");
    }
}
