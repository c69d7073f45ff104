//! Internal order API

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use validator::Validate;

use super::super::Caller;
use super::super::state::AppState;
use super::super::types::{
    ApiResult, CreateOrderRequest, ListOrdersQuery, OrderView, created, ok, parse_status,
};
use crate::catalog::ServiceLookup;
use crate::core_types::OrderId;
use crate::orders::CreateOrder;

const DEFAULT_PAGE_SIZE: usize = 50;

/// POST /api/v1/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<OrderView> {
    req.validate()?;

    let order = state
        .orders
        .create_order(CreateOrder {
            user_id: caller.user_id,
            service: ServiceLookup::ById(req.service_id),
            quantity: req.quantity,
            link: req.link,
        })
        .await?;

    created(order.into())
}

/// GET /api/v1/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<Vec<OrderView>> {
    query.validate()?;
    let status = query.status.as_deref().map(parse_status).transpose()?;

    let orders = state
        .orders
        .list_orders(
            caller.user_id,
            status,
            query.before_id,
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    ok(orders.into_iter().map(OrderView::from).collect())
}

/// GET /api/v1/orders/{order_id}
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(order_id): Path<OrderId>,
) -> ApiResult<OrderView> {
    let order = state.orders.get_order(caller.user_id, order_id).await?;
    ok(order.into())
}
