pub mod carts;
pub mod common;
pub mod orders;
pub mod perfumes;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        commerce::{CartService, CatalogService, CheckoutService},
        orders::OrderService,
        pricing::OrderNumberGenerator,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let order_numbers = Arc::new(OrderNumberGenerator::new());

        let catalog = Arc::new(CatalogService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let cart = Arc::new(CartService::new(db_pool.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.clone(),
            order_numbers,
        ));
        let orders = Arc::new(OrderService::new(db_pool, event_sender, config));

        Self {
            catalog,
            cart,
            checkout,
            orders,
        }
    }
}
