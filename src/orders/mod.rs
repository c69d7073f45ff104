//! Order lifecycle
//!
//! # Flow
//!
//! ```text
//! request → catalog lookup → rate → lock(balance_update) → check & debit → unlock
//!         → insert order (PROCESSING) → audit PlayOrder → enqueue submission → return id
//!
//! dispatcher worker → provider "add" → provider_order_id / "Order: <id>" | "Error: <text>"
//! ```
//!
//! # States
//!
//! ```text
//! PROCESSING ─┬→ AWAITING / PENDING / INPROGRESS / PARTIAL ─→ COMPLETED | CANCELED | REFUNDED
//!             └→ REFUNDED   (never accepted by the provider within the grace period)
//! ```

pub mod dispatch;
pub mod error;
pub mod models;
pub mod service;
pub mod state;
pub mod store;

mod integration_tests;

pub use dispatch::{DispatchError, DispatchWorkers, Dispatcher, SubmissionJob};
pub use error::{ErrorKind, OrderError};
pub use models::{
    BulkWriteResult, NewOrder, Order, OrderFilter, OrderMatch, OrderPatch, OrderSort, OrderUpdate,
    SubmissionOutcome, order_price,
};
pub use service::{CreateOrder, OrderService};
pub use state::OrderStatus;
pub use store::{OrderStore, PgOrderStore};

#[cfg(test)]
pub use store::mock::MemoryOrderStore;
