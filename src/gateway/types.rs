//! API envelope, error mapping and request/response DTOs
//!
//! - `ApiResponse<T>`: `{code, msg, data}` wrapper of the internal API
//! - `ApiError`: any failure, rendered into the same envelope
//! - request DTOs validated with `validator`

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::core_types::{OrderId, ServiceId};
use crate::orders::{Order, OrderError, OrderPatch, OrderStatus};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: payload on success
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Codes outside the order domain; order failures use [`OrderError::api_code`]
pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            msg,
        )
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_codes::MISSING_AUTH, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error_codes::AUTH_FAILED, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            msg,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        if !e.is_client_error() {
            tracing::error!(code = e.code(), error = %e, "Order request failed");
        }
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.api_code(), e.to_string())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        Self::bad_request(e.to_string())
    }
}

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

pub fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(range(min = 1))]
    pub service_id: ServiceId,
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[validate(url)]
    pub link: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListOrdersQuery {
    /// Status name, e.g. `INPROGRESS`
    pub status: Option<String>,
    /// Continue below this id (newest first)
    pub before_id: Option<OrderId>,
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<usize>,
}

/// Operator override; at least one field must be set
#[derive(Debug, Default, Deserialize, Validate)]
pub struct AdminOrderUpdateRequest {
    pub status: Option<String>,
    #[validate(range(min = 0))]
    pub start_counter: Option<i64>,
    #[validate(range(min = 0))]
    pub remains: Option<i64>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    #[validate(url)]
    pub link: Option<String>,
}

impl AdminOrderUpdateRequest {
    pub fn into_patch(self) -> Result<OrderPatch, ApiError> {
        let status = self.status.as_deref().map(parse_status).transpose()?;
        Ok(OrderPatch {
            status,
            remains: self.remains,
            start_counter: self.start_counter,
            note: self.note,
            link: self.link,
            provider_order_response: None,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct TopUpRequest {
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
}

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("amount_not_positive"))
    }
}

/// Status name as accepted from callers; same vocabulary as providers use
pub fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    OrderStatus::from_provider(raw)
        .ok_or_else(|| ApiError::bad_request(format!("unknown order status: {}", raw)))
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub service_id: ServiceId,
    pub quantity: i64,
    pub price: String,
    pub link: String,
    pub status: String,
    pub start_counter: i64,
    pub remains: i64,
    pub provider_order_response: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderView {
    fn from(o: Order) -> Self {
        Self {
            order_id: o.order_id,
            service_id: o.service_id,
            quantity: o.quantity,
            price: o.price.normalize().to_string(),
            link: o.link,
            status: o.status.as_str().to_string(),
            start_counter: o.start_counter,
            remains: o.remains,
            provider_order_response: o.provider_order_response,
            note: o.note,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceView {
    pub user_id: i64,
    pub balance: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_maps_to_envelope() {
        let e = ApiError::from(OrderError::NotEnoughBalance);
        assert_eq!(e.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(e.code, 205);

        let e = ApiError::from(OrderError::BackgroundTaskExists);
        assert_eq!(e.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_create_request_validation() {
        let ok = CreateOrderRequest {
            service_id: 1,
            quantity: 100,
            link: "https://instagram.com/p/abc".into(),
        };
        assert!(ok.validate().is_ok());

        let bad = CreateOrderRequest {
            service_id: 0,
            quantity: 0,
            link: "not a link".into(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("service_id"));
        assert!(fields.contains_key("quantity"));
        assert!(fields.contains_key("link"));
    }

    #[test]
    fn test_top_up_must_be_positive() {
        assert!(TopUpRequest { amount: Decimal::ONE }.validate().is_ok());
        assert!(
            TopUpRequest {
                amount: Decimal::ZERO
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn test_admin_patch_parses_status() {
        let patch = AdminOrderUpdateRequest {
            status: Some("in progress".into()),
            remains: Some(5),
            ..Default::default()
        }
        .into_patch()
        .unwrap();
        assert_eq!(patch.status, Some(OrderStatus::InProgress));
        assert_eq!(patch.remains, Some(5));

        assert!(
            AdminOrderUpdateRequest {
                status: Some("shipped".into()),
                ..Default::default()
            }
            .into_patch()
            .is_err()
        );
    }
}
