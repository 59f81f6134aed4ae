use axum::Router;

pub mod common;
pub mod inventory;
pub mod production;
pub mod restocks;
pub mod sales;
pub mod shipments;
pub mod system;

/// Router for every endpoint that acts on behalf of an actor.
pub fn router() -> Router {
    Router::new()
        .nest("/inventory", inventory::router())
        .nest("/shipments", shipments::router())
        .nest("/restocks", restocks::router())
        .nest("/production", production::router())
        .nest("/sales", sales::router())
}
