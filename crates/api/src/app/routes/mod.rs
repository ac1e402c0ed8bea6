use axum::{routing::{get, post}, Router};

pub mod inventory;
pub mod orders;
pub mod pickup;
pub mod system;

/// Router for every endpoint that needs a caller identity.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .route("/stores/:id/orders", get(orders::store_orders))
        .route("/stores/:id/orders/pending-count", get(orders::store_pending_count))
        .route("/stores/:id/inventory", get(inventory::store_inventory))
        .route("/consumers/:id/orders", get(orders::consumer_orders))
        .route("/pickup/validate", post(pickup::validate_pickup))
        .nest("/inventory", inventory::router())
}
