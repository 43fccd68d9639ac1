use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::{cart::CheckoutPreview, orders::OrderDetail},
    error::AppResult,
    middleware::auth::{AuthUser, Identity},
    response::ApiResponse,
    services::checkout_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(preview).post(checkout))
}

#[utoipa::path(
    get,
    path = "/api/checkout",
    responses(
        (status = 200, description = "Priced cart and any out-of-stock items", body = ApiResponse<CheckoutPreview>),
        (status = 400, description = "Cart is empty")
    ),
    security(("bearer_auth" = []), ()),
    tag = "Checkout"
)]
pub async fn preview(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<Json<ApiResponse<CheckoutPreview>>> {
    Ok(Json(checkout_service::preview(&state, &identity).await?))
}

#[utoipa::path(
    post,
    path = "/api/checkout",
    responses(
        (status = 200, description = "Order placed", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Cart is empty"),
        (status = 409, description = "Insufficient stock or coupon no longer applicable")
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    Ok(Json(checkout_service::checkout(&state, &user).await?))
}
