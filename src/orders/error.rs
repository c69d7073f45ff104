//! Order Error Types
//!
//! Caller-facing failures of the order flows, each with a stable code.

use thiserror::Error;

use crate::balance::BalanceError;
use crate::db::StoreError;

/// Coarse classification used by the HTTP layer and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Conflict,
    InsufficientFunds,
    Upstream,
    Persistence,
}

#[derive(Error, Debug, Clone)]
pub enum OrderError {
    #[error("Service not found")]
    ServiceNotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Quantity must be between {min} and {max}")]
    QuantityInvalid { min: i64, max: i64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Background task already running")]
    BackgroundTaskExists,

    #[error("Not enough balance")]
    NotEnoughBalance,

    #[error("Provider error: {0}")]
    Upstream(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::ServiceNotFound
            | OrderError::ProviderNotFound
            | OrderError::OrderNotFound
            | OrderError::UserNotFound => ErrorKind::NotFound,
            OrderError::QuantityInvalid { .. } | OrderError::InvalidRequest(_) => {
                ErrorKind::Invalid
            }
            OrderError::BackgroundTaskExists => ErrorKind::Conflict,
            OrderError::NotEnoughBalance => ErrorKind::InsufficientFunds,
            OrderError::Upstream(_) => ErrorKind::Upstream,
            OrderError::Persistence(_) => ErrorKind::Persistence,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OrderError::ServiceNotFound => "SERVICE_NOT_FOUND",
            OrderError::ProviderNotFound => "PROVIDER_NOT_FOUND",
            OrderError::OrderNotFound => "ORDER_NOT_FOUND",
            OrderError::UserNotFound => "USER_NOT_FOUND",
            OrderError::QuantityInvalid { .. } => "QUANTITY_INVALID",
            OrderError::InvalidRequest(_) => "INVALID_REQUEST",
            OrderError::BackgroundTaskExists => "BACKGROUND_TASK_EXISTS",
            OrderError::NotEnoughBalance => "NOT_ENOUGH_BALANCE",
            OrderError::Upstream(_) => "UPSTREAM_ERROR",
            OrderError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Numeric code carried in the `ApiResponse` envelope
    pub fn api_code(&self) -> i32 {
        match self {
            OrderError::ServiceNotFound => 600,
            OrderError::ProviderNotFound => 700,
            OrderError::OrderNotFound => 800,
            OrderError::QuantityInvalid { .. } => 801,
            OrderError::BackgroundTaskExists => 900,
            OrderError::NotEnoughBalance => 205,
            OrderError::UserNotFound => 204,
            OrderError::InvalidRequest(_) => 1001,
            OrderError::Upstream(_) => 1100,
            OrderError::Persistence(_) => 1200,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Invalid => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::InsufficientFunds => 422,
            ErrorKind::Upstream => 502,
            ErrorKind::Persistence => 500,
        }
    }

    /// Caller can fix the request and retry
    pub fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Upstream | ErrorKind::Persistence)
    }
}

impl From<StoreError> for OrderError {
    fn from(e: StoreError) -> Self {
        OrderError::Persistence(e.to_string())
    }
}

impl From<BalanceError> for OrderError {
    fn from(e: BalanceError) -> Self {
        match e {
            BalanceError::LockHeld(_) => OrderError::BackgroundTaskExists,
            BalanceError::InsufficientFunds { .. } => OrderError::NotEnoughBalance,
            BalanceError::UserNotFound(_) => OrderError::UserNotFound,
            BalanceError::InvalidAmount => {
                OrderError::InvalidRequest("amount must be greater than zero".into())
            }
            BalanceError::Persistence(msg) => OrderError::Persistence(msg),
        }
    }
}
