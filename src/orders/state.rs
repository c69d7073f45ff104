//! Order lifecycle states
//!
//! State IDs are stored as SMALLINT in `orders_tb.status`.

use serde::{Serialize, Serializer};
use std::fmt;

/// Order status.
///
/// Created orders start in `Processing`. Terminal: `Completed`, `Canceled`,
/// `Refunded`. Everything else is reconciled against the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum OrderStatus {
    Awaiting = 0,
    Pending = 1,
    Processing = 2,
    InProgress = 3,
    Completed = 4,
    Partial = 5,
    Canceled = 6,
    Refunded = 7,
}

impl OrderStatus {
    /// States the reconciliation loop polls
    pub const OPEN: [OrderStatus; 5] = [
        OrderStatus::Awaiting,
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::InProgress,
        OrderStatus::Partial,
    ];

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Canceled | OrderStatus::Refunded
        )
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(OrderStatus::Awaiting),
            1 => Some(OrderStatus::Pending),
            2 => Some(OrderStatus::Processing),
            3 => Some(OrderStatus::InProgress),
            4 => Some(OrderStatus::Completed),
            5 => Some(OrderStatus::Partial),
            6 => Some(OrderStatus::Canceled),
            7 => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Awaiting => "AWAITING",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::InProgress => "INPROGRESS",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Partial => "PARTIAL",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    /// Map a provider-reported status string. Case-insensitive; spaces,
    /// underscores and hyphens are ignored ("In progress", "IN_PROGRESS").
    /// Returns `None` for strings outside the vocabulary.
    pub fn from_provider(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match normalized.as_str() {
            "AWAITING" => Some(OrderStatus::Awaiting),
            "PENDING" => Some(OrderStatus::Pending),
            "PROCESSING" => Some(OrderStatus::Processing),
            "INPROGRESS" => Some(OrderStatus::InProgress),
            "COMPLETED" => Some(OrderStatus::Completed),
            "PARTIAL" => Some(OrderStatus::Partial),
            "CANCELED" | "CANCELLED" => Some(OrderStatus::Canceled),
            "REFUNDED" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
