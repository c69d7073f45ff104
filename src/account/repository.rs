//! Repository layer for user lookups

use super::models::{User, UserStatus};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::core_types::UserId;

/// Resolves callers of the internal and third-party APIs.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_id(&self, user_id: UserId) -> Result<Option<User>, sqlx::Error>;

    async fn get_by_api_key(&self, api_key: &str) -> Result<Option<User>, sqlx::Error>;
}

/// User repository backed by `users_tb`
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(r: &sqlx::postgres::PgRow) -> User {
        User {
            user_id: r.get("user_id"),
            username: r.get("username"),
            api_key: r.get("api_key"),
            balance: r.get("balance"),
            status: UserStatus::from(r.get::<i16, _>("status")),
            created_at: r.get("created_at"),
        }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn get_by_id(&self, user_id: UserId) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT user_id, username, api_key, balance, status, created_at
               FROM users_tb WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn get_by_api_key(&self, api_key: &str) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT user_id, username, api_key, balance, status, created_at
               FROM users_tb WHERE api_key = $1"#,
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }
}
