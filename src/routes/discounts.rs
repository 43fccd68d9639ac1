use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::discounts::{DiscountList, ProductDiscounts},
    error::AppResult,
    response::ApiResponse,
    routes::params::Pagination,
    services::discount_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_active))
        .route("/products/{product_id}", get(product_discounts))
}

#[utoipa::path(
    get,
    path = "/api/discounts",
    params(Pagination),
    responses(
        (status = 200, description = "Discounts currently in effect", body = ApiResponse<DiscountList>)
    ),
    security(()),
    tag = "Discounts"
)]
pub async fn list_active(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<DiscountList>>> {
    Ok(Json(
        discount_service::list_active_discounts(&state, pagination).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/discounts/products/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Active discounts applicable to the product", body = ApiResponse<ProductDiscounts>),
        (status = 404, description = "Product not found")
    ),
    security(()),
    tag = "Discounts"
)]
pub async fn product_discounts(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductDiscounts>>> {
    Ok(Json(
        discount_service::product_discounts(&state, product_id).await?,
    ))
}
