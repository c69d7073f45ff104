//! Core types used throughout the system
//!
//! Identifiers are PostgreSQL `BIGSERIAL` keys, so they stay signed.

/// User ID - primary key of `users_tb`.
///
/// # Usage:
/// - Subject of the balance ledger and of exclusive task locks
/// - Owner of orders and audit transactions
pub type UserId = i64;

/// Order ID - primary key of `orders_tb`, returned to callers on creation
pub type OrderId = i64;

/// Catalog service ID (opaque id used by the internal API)
pub type ServiceId = i64;

/// Catalog service sequence number (integer id used by the third-party API)
pub type ServiceSeq = i32;

/// Upstream provider ID
pub type ProviderId = i64;

/// Catalog category ID
pub type CategoryId = i64;

/// Order id assigned by the upstream provider. `0` means "not yet assigned".
pub type ProviderOrderId = i64;

/// Sentinel for an order that the provider has not accepted (yet)
pub const PROVIDER_ORDER_UNSET: ProviderOrderId = 0;

/// Decimal places of every stored money column (`NUMERIC(20, 4)`)
pub const MONEY_SCALE: u32 = 4;
