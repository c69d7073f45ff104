//! Reconciliation of open orders against provider state
//!
//! ```text
//! active providers ─┐
//!                   ▼
//! page open orders (id > cursor) ─┬→ unsubmitted & older than grace → REFUNDED
//!                                 ├→ unsubmitted & young           → skip
//!                                 └→ group by provider → bulk status (chunked, concurrent)
//!                                                        → status / remains / start_counter
//!                                                        | provider_order_response on error
//!                   one unordered bulk write per page ◄──┘
//! ```

pub mod reconciler;
pub mod worker;

pub use reconciler::{ReconcileError, ReconcileStats, Reconciler};
pub use worker::ReconcileWorker;
