use std::sync::Arc;

use crate::account::UserDirectory;
use crate::balance::BalanceService;
use crate::catalog::Catalog;
use crate::config::GatewayConfig;
use crate::db::Database;
use crate::orders::OrderService;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub balance: Arc<BalanceService>,
    pub users: Arc<dyn UserDirectory>,
    pub catalog: Arc<dyn Catalog>,
    /// Pinged by the health check; absent in tests
    pub db: Option<Arc<Database>>,
    /// Currency code reported by the third-party API
    pub currency: String,
    /// `None` disables the admin routes
    pub admin_secret: Option<String>,
}

impl AppState {
    pub fn new(
        orders: Arc<OrderService>,
        balance: Arc<BalanceService>,
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn Catalog>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            orders,
            balance,
            users,
            catalog,
            db: None,
            currency: config.currency.clone(),
            admin_secret: config.admin_secret.clone(),
        }
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.db = Some(db);
        self
    }
}
