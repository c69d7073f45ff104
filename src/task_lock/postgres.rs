use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::debug;

use super::{LockHandle, LockKind, TaskLock, TaskLockError};
use crate::core_types::UserId;

/// `background_tasks_tb`-backed lock
pub struct PgTaskLock {
    pool: PgPool,
}

impl PgTaskLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskLock for PgTaskLock {
    async fn acquire(
        &self,
        user_id: UserId,
        kind: LockKind,
        ttl: Duration,
    ) -> Result<LockHandle, TaskLockError> {
        let mut tx = self.pool.begin().await?;

        // Reclaim a lock whose holder never released it
        let reclaimed = sqlx::query(
            "DELETE FROM background_tasks_tb WHERE user_id = $1 AND kind = $2 AND expires_at <= NOW()",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if reclaimed > 0 {
            debug!(user_id, kind = %kind, "Reclaimed expired task lock");
        }

        let row = sqlx::query(
            r#"INSERT INTO background_tasks_tb (user_id, kind, expires_at)
               VALUES ($1, $2, NOW() + make_interval(secs => $3))
               ON CONFLICT (user_id, kind) DO NOTHING
               RETURNING task_id"#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(ttl.as_secs_f64())
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        match row {
            Some(row) => Ok(LockHandle {
                user_id,
                kind,
                token: row.try_get("task_id")?,
            }),
            None => Err(TaskLockError::AlreadyHeld { user_id, kind }),
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<(), TaskLockError> {
        sqlx::query("DELETE FROM background_tasks_tb WHERE task_id = $1")
            .bind(handle.token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
