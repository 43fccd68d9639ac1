use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use uuid::Uuid;

use crate::{
    dto::{
        coupons::{CouponList, CouponRequest},
        discounts::{DiscountList, DiscountRequest},
        orders::{UpdateVendorStatusRequest, VendorOrder, VendorOrderList},
        products::{CreateProductRequest, ProductList},
    },
    error::AppResult,
    middleware::auth::VendorUser,
    models::{Coupon, Discount, Product},
    response::ApiResponse,
    routes::params::Pagination,
    services::{coupon_service, discount_service, product_service, vendor_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{order_id}", get(get_order))
        .route("/orders/{order_id}/status", patch(update_status))
        .route("/products", get(list_products).post(create_product))
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route(
            "/coupons/{id}",
            get(get_coupon).put(update_coupon).delete(delete_coupon),
        )
        .route("/discounts", get(list_discounts).post(create_discount))
        .route(
            "/discounts/{id}",
            get(get_discount)
                .put(update_discount)
                .delete(delete_discount),
        )
}

#[utoipa::path(
    get,
    path = "/api/vendor/orders",
    params(Pagination),
    responses(
        (status = 200, description = "Orders containing the vendor's items", body = ApiResponse<VendorOrderList>),
        (status = 403, description = "Not a vendor account")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    vendor: VendorUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<VendorOrderList>>> {
    Ok(Json(
        vendor_service::list_orders(&state, &vendor, pagination).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/vendor/orders/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "The vendor's share of the order", body = ApiResponse<VendorOrder>),
        (status = 403, description = "Order belongs to other vendors"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn get_order(
    State(state): State<AppState>,
    vendor: VendorUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<VendorOrder>>> {
    Ok(Json(
        vendor_service::get_order(&state, &vendor, order_id).await?,
    ))
}

#[utoipa::path(
    patch,
    path = "/api/vendor/orders/{order_id}/status",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateVendorStatusRequest,
    responses(
        (status = 200, description = "Vendor status updated and order status re-aggregated", body = ApiResponse<VendorOrder>),
        (status = 403, description = "Order belongs to other vendors"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn update_status(
    State(state): State<AppState>,
    vendor: VendorUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateVendorStatusRequest>,
) -> AppResult<Json<ApiResponse<VendorOrder>>> {
    Ok(Json(
        vendor_service::update_status(&state, &vendor, order_id, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/vendor/coupons",
    responses(
        (status = 200, description = "Coupons owned by the vendor", body = ApiResponse<CouponList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    vendor: VendorUser,
) -> AppResult<Json<ApiResponse<CouponList>>> {
    Ok(Json(
        coupon_service::list_vendor_coupons(&state, &vendor).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/vendor/coupons",
    request_body = CouponRequest,
    responses(
        (status = 200, description = "Coupon created", body = ApiResponse<Coupon>),
        (status = 400, description = "Invalid coupon"),
        (status = 403, description = "Product belongs to another vendor"),
        (status = 409, description = "Code already taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    vendor: VendorUser,
    Json(payload): Json<CouponRequest>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    Ok(Json(
        coupon_service::create_coupon(&state, &vendor, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/vendor/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon deleted", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Coupon belongs to another vendor"),
        (status = 409, description = "Coupon has already been used")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    vendor: VendorUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(
        coupon_service::delete_coupon(&state, &vendor, id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/vendor/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "The vendor's coupon", body = ApiResponse<Coupon>),
        (status = 403, description = "Coupon belongs to another vendor"),
        (status = 404, description = "Coupon not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    vendor: VendorUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    Ok(Json(
        coupon_service::get_vendor_coupon(&state, &vendor, id).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/vendor/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    request_body = CouponRequest,
    responses(
        (status = 200, description = "Coupon updated", body = ApiResponse<Coupon>),
        (status = 400, description = "Invalid coupon"),
        (status = 403, description = "Coupon or product belongs to another vendor"),
        (status = 409, description = "Code already taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    vendor: VendorUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CouponRequest>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    Ok(Json(
        coupon_service::update_coupon(&state, &vendor, id, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/vendor/products",
    params(Pagination),
    responses(
        (status = 200, description = "Products listed by the vendor", body = ApiResponse<ProductList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn list_products(
    State(state): State<AppState>,
    vendor: VendorUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    Ok(Json(
        product_service::list_vendor_products(&state, &vendor, pagination).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/vendor/products",
    request_body = CreateProductRequest,
    responses(
        (status = 200, description = "Product created", body = ApiResponse<Product>),
        (status = 422, description = "Invalid product")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn create_product(
    State(state): State<AppState>,
    vendor: VendorUser,
    Json(payload): Json<CreateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    Ok(Json(
        product_service::create_product(&state, &vendor, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/vendor/discounts",
    params(Pagination),
    responses(
        (status = 200, description = "Discounts owned by the vendor", body = ApiResponse<DiscountList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn list_discounts(
    State(state): State<AppState>,
    vendor: VendorUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<DiscountList>>> {
    Ok(Json(
        discount_service::list_vendor_discounts(&state, &vendor, pagination).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/vendor/discounts",
    request_body = DiscountRequest,
    responses(
        (status = 200, description = "Discount created", body = ApiResponse<Discount>),
        (status = 400, description = "Invalid discount"),
        (status = 403, description = "Product belongs to another vendor")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn create_discount(
    State(state): State<AppState>,
    vendor: VendorUser,
    Json(payload): Json<DiscountRequest>,
) -> AppResult<Json<ApiResponse<Discount>>> {
    Ok(Json(
        discount_service::create_discount(&state, &vendor, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/vendor/discounts/{id}",
    params(("id" = Uuid, Path, description = "Discount ID")),
    responses(
        (status = 200, description = "The vendor's discount", body = ApiResponse<Discount>),
        (status = 403, description = "Discount belongs to another vendor"),
        (status = 404, description = "Discount not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn get_discount(
    State(state): State<AppState>,
    vendor: VendorUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Discount>>> {
    Ok(Json(
        discount_service::get_vendor_discount(&state, &vendor, id).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/vendor/discounts/{id}",
    params(("id" = Uuid, Path, description = "Discount ID")),
    request_body = DiscountRequest,
    responses(
        (status = 200, description = "Discount updated", body = ApiResponse<Discount>),
        (status = 400, description = "Invalid discount"),
        (status = 403, description = "Discount or product belongs to another vendor"),
        (status = 404, description = "Discount not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn update_discount(
    State(state): State<AppState>,
    vendor: VendorUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<DiscountRequest>,
) -> AppResult<Json<ApiResponse<Discount>>> {
    Ok(Json(
        discount_service::update_discount(&state, &vendor, id, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/vendor/discounts/{id}",
    params(("id" = Uuid, Path, description = "Discount ID")),
    responses(
        (status = 200, description = "Discount deleted", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Discount belongs to another vendor"),
        (status = 404, description = "Discount not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn delete_discount(
    State(state): State<AppState>,
    vendor: VendorUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(
        discount_service::delete_discount(&state, &vendor, id).await?,
    ))
}
