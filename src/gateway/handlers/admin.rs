//! Operator routes, behind `X-Admin-Secret`

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;
use validator::Validate;

use super::super::state::AppState;
use super::super::types::{
    AdminOrderUpdateRequest, ApiResult, BalanceView, OrderView, TopUpRequest, ok,
};
use crate::core_types::{OrderId, UserId};
use crate::orders::OrderError;

/// PUT /api/v1/admin/orders/{order_id}
pub async fn update_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
    Json(req): Json<AdminOrderUpdateRequest>,
) -> ApiResult<OrderView> {
    req.validate()?;
    let patch = req.into_patch()?;
    let order = state.orders.admin_update(order_id, patch).await?;
    ok(order.into())
}

/// POST /api/v1/admin/users/{user_id}/balance
pub async fn top_up(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(req): Json<TopUpRequest>,
) -> ApiResult<BalanceView> {
    req.validate()?;
    let balance = state
        .balance
        .top_up(user_id, req.amount)
        .await
        .map_err(OrderError::from)?;

    info!(user_id, amount = %req.amount, %balance, "Balance topped up");
    ok(BalanceView {
        user_id,
        balance: balance.normalize().to_string(),
    })
}
