//! Reseller API (`POST /api/v2`)
//!
//! Single endpoint in the common SMM panel shape: the JSON body carries the
//! caller's `key` and an `action`. Failures are `{"error": "..."}` with 422.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::super::state::AppState;
use crate::account::User;
use crate::catalog::ServiceLookup;
use crate::core_types::{OrderId, ServiceSeq};
use crate::orders::{CreateOrder, Order, OrderError};
use crate::provider::wire::{lenient_i64, lenient_opt_string};

/// Upper bound on ids accepted by one `orders` call
const MAX_STATUS_IDS: usize = 100;

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    key: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    action: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    service: i64,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    link: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    quantity: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    order: i64,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    orders: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Add,
    Status,
    Orders,
    Services,
    Balance,
}

impl Action {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "add" => Some(Action::Add),
            "status" => Some(Action::Status),
            "orders" => Some(Action::Orders),
            "services" => Some(Action::Services),
            "balance" => Some(Action::Balance),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThirdPartyError {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddReply {
    pub status: String,
    pub order: OrderId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderId>,
    pub quantity: i64,
    pub status: String,
    pub start_counter: i64,
    pub remains: i64,
    pub currency: String,
    pub charge: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceReply {
    pub service: ServiceSeq,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub category: String,
    pub rate: String,
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceReply {
    pub status: String,
    pub balance: String,
    pub currency: String,
}

fn reject(msg: impl Into<String>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ThirdPartyError { error: msg.into() }),
    )
        .into_response()
}

/// Wording third-party clients match on
fn order_error_text(e: &OrderError) -> String {
    match e {
        OrderError::ServiceNotFound => "service not found".to_string(),
        OrderError::ProviderNotFound => "provider not found".to_string(),
        OrderError::OrderNotFound => "order not found".to_string(),
        OrderError::QuantityInvalid { .. } => "quantity invalid".to_string(),
        OrderError::NotEnoughBalance => "not enough balance".to_string(),
        OrderError::BackgroundTaskExists => "another balance update is in progress".to_string(),
        OrderError::UserNotFound => "user not found".to_string(),
        OrderError::InvalidRequest(msg) => msg.clone(),
        OrderError::Upstream(_) | OrderError::Persistence(_) => {
            warn!(code = e.code(), error = %e, "Third-party request failed");
            "internal error".to_string()
        }
    }
}

fn status_reply(order: Order, with_id: bool, currency: &str) -> StatusReply {
    StatusReply {
        order: with_id.then_some(order.order_id),
        quantity: order.quantity,
        status: order.status.as_str().to_string(),
        start_counter: order.start_counter,
        remains: order.remains,
        currency: currency.to_string(),
        charge: None,
    }
}

/// POST /api/v2
pub async fn dispatch(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Ok(req) = serde_json::from_slice::<Envelope>(&body) else {
        return reject("body wrong format");
    };

    let Some(action) = req.action.as_deref().and_then(Action::parse) else {
        return reject("the selected action is invalid");
    };

    let user = match authenticate(&state, req.key.as_deref()).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match action {
        Action::Add => add(&state, &user, req).await,
        Action::Status => status(&state, &user, req.order).await,
        Action::Orders => orders(&state, &user, req.orders.as_deref()).await,
        Action::Services => services(&state).await,
        Action::Balance => balance(&state, &user).await,
    }
}

async fn authenticate(state: &AppState, key: Option<&str>) -> Result<User, Response> {
    let Some(key) = key else {
        return Err(reject("invalid api key"));
    };
    match state.users.get_by_api_key(key).await {
        Ok(Some(user)) if user.is_active() => Ok(user),
        Ok(_) => Err(reject("invalid api key")),
        Err(e) => {
            warn!(error = %e, "API key lookup failed");
            Err(reject("internal error"))
        }
    }
}

async fn add(state: &AppState, user: &User, req: Envelope) -> Response {
    if req.service <= 0 {
        return reject("service not found");
    }
    if req.quantity <= 0 {
        return reject("quantity invalid");
    }
    let Some(link) = req.link else {
        return reject("link is required");
    };
    let Ok(seq) = ServiceSeq::try_from(req.service) else {
        return reject("service not found");
    };

    let created = state
        .orders
        .create_order(CreateOrder {
            user_id: user.user_id,
            service: ServiceLookup::BySeq(seq),
            quantity: req.quantity,
            link,
        })
        .await;

    match created {
        Ok(order) => (
            StatusCode::CREATED,
            Json(AddReply {
                status: "success".to_string(),
                order: order.order_id,
            }),
        )
            .into_response(),
        Err(e) => reject(order_error_text(&e)),
    }
}

async fn status(state: &AppState, user: &User, order_id: OrderId) -> Response {
    if order_id <= 0 {
        return reject("order not found");
    }
    match state.orders.get_order(user.user_id, order_id).await {
        Ok(order) => Json(status_reply(order, false, &state.currency)).into_response(),
        Err(e) => reject(order_error_text(&e)),
    }
}

async fn orders(state: &AppState, user: &User, ids: Option<&str>) -> Response {
    let Some(ids) = ids else {
        return reject("orders is required");
    };
    // Unparseable ids are dropped, not rejected
    let ids: Vec<OrderId> = ids
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .take(MAX_STATUS_IDS)
        .collect();

    match state.orders.get_orders(user.user_id, &ids).await {
        Ok(found) => Json(
            found
                .into_iter()
                .map(|o| status_reply(o, true, &state.currency))
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => reject(order_error_text(&e)),
    }
}

async fn services(state: &AppState) -> Response {
    match state.catalog.list_active_services().await {
        Ok(list) => Json(
            list.into_iter()
                .map(|s| ServiceReply {
                    service: s.seq,
                    name: s.title,
                    service_type: s.service_type,
                    category: s.category_name,
                    rate: s.rate.normalize().to_string(),
                    min: s.min_amount,
                    max: s.max_amount,
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => reject(order_error_text(&OrderError::from(e))),
    }
}

async fn balance(state: &AppState, user: &User) -> Response {
    match state.balance.balance(user.user_id).await {
        Ok(balance) => Json(BalanceReply {
            status: "success".to_string(),
            balance: balance.normalize().to_string(),
            currency: state.currency.clone(),
        })
        .into_response(),
        Err(e) => reject(order_error_text(&OrderError::from(e))),
    }
}
