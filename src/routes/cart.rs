use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, ApplyCouponRequest, CartView, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, Identity, SESSION_HEADER},
    response::ApiResponse,
    services::{cart_service, coupon_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/{item_id}", patch(update_item).delete(remove_item))
        .route("/coupon", post(apply_coupon).delete(remove_coupon))
        .route("/merge", post(merge_guest_cart))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("x-session-id" = Option<String>, Header, description = "Guest session when not signed in")
    ),
    responses(
        (status = 200, description = "Current cart grouped by vendor", body = ApiResponse<CartView>),
        (status = 401, description = "Neither a bearer token nor a session id")
    ),
    security(("bearer_auth" = []), ()),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<Json<ApiResponse<CartView>>> {
    Ok(Json(cart_service::get_cart(&state, &identity).await?))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Item added, quantity increased if already present", body = ApiResponse<CartView>),
        (status = 422, description = "Quantity below 1"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = []), ()),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    identity: Identity,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    Ok(Json(cart_service::add_item(&state, &identity, payload).await?))
}

#[utoipa::path(
    patch,
    path = "/api/cart/items/{item_id}",
    params(("item_id" = Uuid, Path, description = "Cart item ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity set", body = ApiResponse<CartView>),
        (status = 404, description = "Cart item not found")
    ),
    security(("bearer_auth" = []), ()),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    identity: Identity,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    Ok(Json(
        cart_service::update_item(&state, &identity, item_id, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{item_id}",
    params(("item_id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Item removed", body = ApiResponse<CartView>),
        (status = 404, description = "Cart item not found")
    ),
    security(("bearer_auth" = []), ()),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    identity: Identity,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    Ok(Json(
        cart_service::remove_item(&state, &identity, item_id).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart cleared", body = ApiResponse<serde_json::Value>)
    ),
    security(("bearer_auth" = []), ()),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(cart_service::clear_cart(&state, &identity).await?))
}

#[utoipa::path(
    post,
    path = "/api/cart/coupon",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon attached to the cart", body = ApiResponse<CartView>),
        (status = 404, description = "Unknown coupon code"),
        (status = 409, description = "Coupon not applicable to this cart")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ApplyCouponRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    Ok(Json(
        coupon_service::apply_to_cart(&state, &user, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/cart/coupon",
    responses(
        (status = 200, description = "Coupon detached", body = ApiResponse<CartView>),
        (status = 400, description = "No coupon attached")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_coupon(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartView>>> {
    Ok(Json(coupon_service::remove_from_cart(&state, &user).await?))
}

#[utoipa::path(
    post,
    path = "/api/cart/merge",
    params(
        ("x-session-id" = String, Header, description = "Guest session whose cart is merged")
    ),
    responses(
        (status = 200, description = "User cart after the merge", body = ApiResponse<CartView>),
        (status = 400, description = "Missing session id")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn merge_guest_cart(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing x-session-id header"))?;

    match cart_service::merge_guest_cart(&state, session_id, user.user_id).await? {
        Some(merged) => Ok(Json(merged)),
        None => Ok(Json(
            cart_service::get_cart(&state, &Identity::User(user)).await?,
        )),
    }
}
