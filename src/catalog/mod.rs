//! Service catalog
//!
//! Services, the providers that fulfill them and per-user rate overrides.
//! Read-only from the order and reconciliation paths.

pub mod models;
pub mod repository;

pub use models::{CatalogStatus, CustomRate, Provider, Service, ServiceLookup};
pub use repository::{Catalog, PgCatalog};

#[cfg(test)]
pub use repository::mock::MockCatalog;
