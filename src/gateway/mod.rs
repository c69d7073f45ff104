pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{Next, from_fn_with_state},
    response::Response,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::core_types::UserId;
use state::AppState;
use types::ApiError;

/// Set by the fronting auth layer on every internal API request
pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Resolved caller of the internal API, injected by [`user_middleware`]
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: UserId,
}

/// Resolve `X-User-Id` to an active user.
async fn user_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<UserId>().ok())
        .ok_or_else(|| ApiError::unauthorized("missing or invalid X-User-Id"))?;

    let user = state.users.get_by_id(user_id).await.map_err(|e| {
        error!(user_id, error = %e, "User lookup failed");
        ApiError::internal("user lookup failed")
    })?;
    if !user.is_some_and(|u| u.is_active()) {
        return Err(ApiError::forbidden("user not found or disabled"));
    }

    request.extensions_mut().insert(Caller { user_id });
    Ok(next.run(request).await)
}

/// Compare `X-Admin-Secret` with configuration; no secret configured means no access.
async fn admin_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_secret.as_deref() else {
        return Err(ApiError::forbidden("admin api disabled"));
    };
    let given = request
        .headers()
        .get(ADMIN_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if given != Some(expected) {
        return Err(ApiError::unauthorized("invalid admin secret"));
    }
    Ok(next.run(request).await)
}

pub fn router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // User Routes (X-User-Id)
    // ==========================================================================
    let user_routes = Router::new()
        .route(
            "/orders",
            post(handlers::create_order).get(handlers::list_orders),
        )
        .route("/orders/{order_id}", get(handlers::get_order))
        .layer(from_fn_with_state(state.clone(), user_middleware));

    // ==========================================================================
    // Operator Routes (X-Admin-Secret)
    // ==========================================================================
    let admin_routes = Router::new()
        .route("/orders/{order_id}", put(handlers::update_order))
        .route("/users/{user_id}/balance", post(handlers::top_up))
        .layer(from_fn_with_state(state.clone(), admin_middleware));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        // Reseller API authenticates by the `key` in the body
        .route("/api/v2", post(handlers::third_party::dispatch))
        .nest("/api/v1/admin", admin_routes)
        .nest("/api/v1", user_routes)
        .with_state(state)
}

/// Serve until the listener fails or `shutdown` resolves. On shutdown,
/// in-flight requests finish before this returns.
pub async fn run_server<F>(
    config: &GatewayConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.inspect_err(|e| {
        error!(%addr, error = %e, "Failed to bind gateway; is the port already in use?");
    })?;

    info!(%addr, "Gateway listening");
    info!("Internal API: /api/v1/orders (X-User-Id)");
    info!("Reseller API: POST /api/v2");
    if state.admin_secret.is_none() {
        info!("Admin routes disabled (no admin_secret configured)");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Gateway stopped");
    Ok(())
}
