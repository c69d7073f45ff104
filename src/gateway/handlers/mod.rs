//! HTTP handlers

pub mod admin;
pub mod health;
pub mod orders;
pub mod third_party;

pub use admin::{top_up, update_order};
pub use health::health_check;
pub use orders::{create_order, get_order, list_orders};
