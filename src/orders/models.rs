use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::state::OrderStatus;
use crate::core_types::{
    CategoryId, MONEY_SCALE, OrderId, PROVIDER_ORDER_UNSET, ProviderId, ProviderOrderId, ServiceId,
    UserId,
};

/// Units per priced block: `rate` is the price of 1000 units
pub const RATE_UNIT: i64 = 1000;

/// `quantity * rate / 1000`, rounded up to the stored money scale so the
/// debited amount and the persisted price are the same number
pub fn order_price(quantity: i64, rate: Decimal) -> Decimal {
    (Decimal::from(quantity) * rate / Decimal::from(RATE_UNIT))
        .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::AwayFromZero)
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub category_id: CategoryId,
    pub provider_id: ProviderId,
    pub quantity: i64,
    pub price: Decimal,
    pub link: String,
    pub status: OrderStatus,
    /// 0 until the provider accepts the order
    pub provider_order_id: ProviderOrderId,
    /// `"Order: <id>"` or `"Error: <text>"`
    pub provider_order_response: String,
    pub start_counter: i64,
    pub remains: i64,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_submitted(&self) -> bool {
        self.provider_order_id != PROVIDER_ORDER_UNSET
    }
}

/// Insert payload; the store assigns id, timestamps and `Processing`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub category_id: CategoryId,
    pub provider_id: ProviderId,
    pub quantity: i64,
    pub price: Decimal,
    pub link: String,
}

/// Outcome of a detached provider submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted(ProviderOrderId),
    /// Provider-reported error or transport failure
    Rejected(String),
}

impl SubmissionOutcome {
    pub fn provider_order_id(&self) -> ProviderOrderId {
        match self {
            SubmissionOutcome::Accepted(id) => *id,
            SubmissionOutcome::Rejected(_) => PROVIDER_ORDER_UNSET,
        }
    }

    /// Text stored in `provider_order_response`
    pub fn response_text(&self) -> String {
        match self {
            SubmissionOutcome::Accepted(id) => format!("Order: {}", id),
            SubmissionOutcome::Rejected(msg) => format!("Error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSort {
    /// Keyset scans (reconciliation)
    #[default]
    IdAsc,
    /// Newest first (user listings)
    IdDesc,
}

/// Conjunctive filter for [`super::OrderStore::find_page`].
/// `after_id`/`before_id` are keyset cursors.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub statuses: Vec<OrderStatus>,
    pub user_id: Option<UserId>,
    pub provider_id: Option<ProviderId>,
    pub after_id: Option<OrderId>,
    pub before_id: Option<OrderId>,
}

impl OrderFilter {
    pub fn open() -> Self {
        Self {
            statuses: OrderStatus::OPEN.to_vec(),
            ..Default::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&order.status))
            && self.user_id.is_none_or(|u| order.user_id == u)
            && self.provider_id.is_none_or(|p| order.provider_id == p)
            && self.after_id.is_none_or(|id| order.order_id > id)
            && self.before_id.is_none_or(|id| order.order_id < id)
    }
}

/// Which row(s) an update applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderMatch {
    Id(OrderId),
    /// `order_id = id AND provider_order_id = 0`; loses to a concurrent submission write-back
    Unsubmitted(OrderId),
    ProviderOrder {
        provider_id: ProviderId,
        provider_order_id: ProviderOrderId,
    },
}

/// Field changes; `updated_at` is always bumped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub remains: Option<i64>,
    pub start_counter: Option<i64>,
    pub provider_order_response: Option<String>,
    pub note: Option<String>,
    pub link: Option<String>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, order: &mut Order, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(remains) = self.remains {
            order.remains = remains;
        }
        if let Some(start_counter) = self.start_counter {
            order.start_counter = start_counter;
        }
        if let Some(resp) = &self.provider_order_response {
            order.provider_order_response = resp.clone();
        }
        if let Some(note) = &self.note {
            order.note = note.clone();
        }
        if let Some(link) = &self.link {
            order.link = link.clone();
        }
        order.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub target: OrderMatch,
    pub patch: OrderPatch,
}

/// Result of an unordered bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// Rows changed
    pub modified: u64,
    /// Updates that matched nothing
    pub unmatched: usize,
    pub failed: usize,
}
