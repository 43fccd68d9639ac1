use axum::Router;

use crate::state::AppState;

pub mod cart;
pub mod checkout;
pub mod discounts;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod payments;
pub mod products;
pub mod vendor;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart::router())
        .nest("/checkout", checkout::router())
        .nest("/products", products::router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/vendor", vendor::router())
        .nest("/discounts", discounts::router())
}
