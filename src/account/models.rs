//! Data models for user accounts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core_types::UserId;

/// User status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum UserStatus {
    Disabled = 0,
    Active = 1,
}

impl From<i16> for UserStatus {
    fn from(v: i16) -> Self {
        match v {
            0 => UserStatus::Disabled,
            _ => UserStatus::Active,
        }
    }
}

/// User account with its prepaid balance
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub username: String,
    /// Credential for the third-party API
    pub api_key: Option<String>,
    pub balance: Decimal,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_status_from_i16() {
        assert_eq!(UserStatus::from(0), UserStatus::Disabled);
        assert_eq!(UserStatus::from(1), UserStatus::Active);
        assert_eq!(UserStatus::from(99), UserStatus::Active);
    }
}
