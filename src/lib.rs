//! smm_relay - prepaid order relay for upstream engagement providers
//!
//! Users pay for catalog services out of a prepaid balance; orders are
//! forwarded to an upstream provider and reconciled against it until they
//! complete or are refunded.
//!
//! # Modules
//!
//! - [`core_types`] - Id aliases shared across modules
//! - [`config`] / [`logging`] - YAML configuration and tracing setup
//! - [`db`] - PostgreSQL pool, migrations, store errors
//! - [`task_lock`] - Expiring per-user exclusive task lock
//! - [`balance`] - Balance ledger, audit transactions, locked mutations
//! - [`account`] - User lookups (by id, by API key)
//! - [`catalog`] - Services, providers, custom rates
//! - [`provider`] - Upstream provider HTTP client
//! - [`orders`] - Order creation, state machine, store, detached submission
//! - [`reconcile`] - Periodic reconciliation against provider state
//! - [`gateway`] - axum HTTP surface

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod logging;
pub mod retry;

// Persistence and collaborators
pub mod account;
pub mod balance;
pub mod catalog;
pub mod db;
pub mod provider;
pub mod task_lock;

// Order lifecycle
pub mod orders;
pub mod reconcile;

pub mod gateway;

// Convenient re-exports at crate root
pub use core_types::{OrderId, ProviderId, ProviderOrderId, ServiceId, UserId};
pub use orders::{Order, OrderError, OrderService, OrderStatus, order_price};
pub use reconcile::{ReconcileWorker, Reconciler};
