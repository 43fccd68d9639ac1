//! Product catalog: public browsing and vendor listings.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{CreateProductRequest, ProductList},
    entity::{Products, Vendors, products, vendors},
    error::{AppError, AppResult},
    middleware::auth::VendorUser,
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{Pagination, ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

fn with_vendor((product, vendor): (products::Model, Option<vendors::Model>)) -> Product {
    Product::new(product, vendor.map(|v| v.name).unwrap_or_default())
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, per_page, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        condition = condition.add(products::Column::Name.contains(search));
    }
    if let Some(min_price) = query.min_price {
        condition = condition.add(products::Column::Price.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        condition = condition.add(products::Column::Price.lte(max_price));
    }
    if let Some(vendor_id) = query.vendor_id {
        condition = condition.add(products::Column::VendorId.eq(vendor_id));
    }

    let sort_col = match query.sort_by.unwrap_or_default() {
        ProductSortBy::CreatedAt => products::Column::CreatedAt,
        ProductSortBy::Price => products::Column::Price,
        ProductSortBy::Name => products::Column::Name,
    };
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let finder = Products::find()
        .filter(condition)
        .order_by(sort_col, sort_order.into())
        .order_by_asc(products::Column::Id);
    let total = finder.clone().count(&state.orm).await?;

    let items = finder
        .find_also_related(Vendors)
        .limit(per_page)
        .offset(offset)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(with_vendor)
        .collect();

    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let product = Products::find_by_id(id)
        .find_also_related(Vendors)
        .one(&state.orm)
        .await?
        .map(with_vendor)
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Product", product, None))
}

pub async fn create_product(
    state: &AppState,
    vendor: &VendorUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    let shop = Vendors::find_by_id(vendor.vendor_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::Forbidden)?;

    let product = products::ActiveModel {
        id: Set(Uuid::new_v4()),
        vendor_id: Set(shop.id),
        name: Set(payload.name().to_string()),
        description: Set(payload.description().map(str::to_string)),
        price: Set(payload.price()),
        stock: Set(payload.stock()),
        created_at: Set(state.clock.now_fixed()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        state,
        Some(vendor.user.user_id),
        "product_created",
        "products",
        Some(product.id),
        serde_json::json!({ "vendor_id": shop.id, "price": product.price }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::new(product, shop.name),
        Some(Meta::empty()),
    ))
}

/// The vendor's own products, newest first.
pub async fn list_vendor_products(
    state: &AppState,
    vendor: &VendorUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, per_page, offset) = pagination.normalize();
    let finder = Products::find()
        .filter(products::Column::VendorId.eq(vendor.vendor_id))
        .order_by_desc(products::Column::CreatedAt)
        .order_by_asc(products::Column::Id);
    let total = finder.clone().count(&state.orm).await?;

    let items = finder
        .find_also_related(Vendors)
        .limit(per_page)
        .offset(offset)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(with_vendor)
        .collect();

    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}
