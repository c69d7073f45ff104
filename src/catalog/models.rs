//! Catalog entities: services, providers and per-user rate overrides

use rust_decimal::Decimal;
use serde::Serialize;

use crate::core_types::{CategoryId, ProviderId, ServiceId, ServiceSeq, UserId};

/// Shared on/off flag of services and providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i16)]
pub enum CatalogStatus {
    Disabled = 0,
    Active = 1,
}

impl From<i16> for CatalogStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => CatalogStatus::Active,
            _ => CatalogStatus::Disabled,
        }
    }
}

/// A sellable catalog entry. `rate` is the price per 1000 units.
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub service_id: ServiceId,
    pub seq: ServiceSeq,
    pub title: String,
    pub description: String,
    pub service_type: String,
    pub min_amount: i64,
    pub max_amount: i64,
    pub rate: Decimal,
    /// Service number on the upstream provider
    pub provider_service_id: i64,
    pub provider_id: ProviderId,
    pub category_id: CategoryId,
    pub category_name: String,
    pub status: CatalogStatus,
}

impl Service {
    pub fn is_active(&self) -> bool {
        self.status == CatalogStatus::Active
    }

    pub fn accepts_quantity(&self, quantity: i64) -> bool {
        self.min_amount <= quantity && quantity <= self.max_amount
    }
}

/// Upstream provider endpoint
#[derive(Debug, Clone)]
pub struct Provider {
    pub provider_id: ProviderId,
    pub name: String,
    pub url: String,
    pub api_key: String,
    pub status: CatalogStatus,
}

impl Provider {
    pub fn is_active(&self) -> bool {
        self.status == CatalogStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct CustomRate {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub rate: Decimal,
}

/// How a caller refers to a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLookup {
    /// Internal API
    ById(ServiceId),
    /// Third-party API
    BySeq(ServiceSeq),
}
