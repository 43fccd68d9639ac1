use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::discounts::{DiscountFields, DiscountList, DiscountOffer, DiscountRequest, ProductDiscounts},
    entity::{Discounts, Products, discounts, products},
    error::{AppError, AppResult},
    middleware::auth::VendorUser,
    models::Discount,
    pricing::{DiscountTerms, discount_amount},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

/// Discounts that target this product, its vendor, or everything.
fn scope_condition(product_id: Uuid, vendor_id: Uuid) -> Condition {
    let product_scoped = discounts::Column::ProductId.eq(product_id);
    let vendor_or_global = Condition::all()
        .add(discounts::Column::ProductId.is_null())
        .add(
            Condition::any()
                .add(discounts::Column::VendorId.eq(vendor_id))
                .add(discounts::Column::VendorId.is_null()),
        );
    Condition::any().add(product_scoped).add(vendor_or_global)
}

/// Active discounts applicable to a product and what each takes off its price.
///
/// Informational only: checkout prices orders with the cart's coupon alone.
pub async fn product_discounts(
    state: &AppState,
    product_id: Uuid,
) -> AppResult<ApiResponse<ProductDiscounts>> {
    let now = state.clock.now();
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let candidates = Discounts::find()
        .filter(discounts::Column::IsActive.eq(true))
        .filter(scope_condition(product.id, product.vendor_id))
        .order_by_asc(discounts::Column::CreatedAt)
        .order_by_asc(discounts::Column::Id)
        .all(&state.orm)
        .await?;

    let offers: Vec<DiscountOffer> = candidates
        .into_iter()
        .filter_map(|discount| {
            let terms = DiscountTerms::from(&discount);
            if !terms.applies_at(now) {
                return None;
            }
            let amount = discount_amount(product.price, &terms, now);
            Some(DiscountOffer {
                discount_id: discount.id,
                name: discount.name,
                kind: discount.kind,
                value: discount.value,
                discount_amount: amount,
                final_price: product.price - amount,
            })
        })
        .collect();

    let best_price = offers
        .iter()
        .map(|offer| offer.final_price)
        .min()
        .unwrap_or(product.price);

    Ok(ApiResponse::success(
        "OK",
        ProductDiscounts {
            product_id: product.id,
            price: product.price,
            discounts: offers,
            best_price,
        },
        Some(Meta::empty()),
    ))
}

/// Discounts that are switched on and inside their validity window.
pub async fn list_active_discounts(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<DiscountList>> {
    let (page, per_page, offset) = pagination.normalize();
    let now = state.clock.now();

    let active: Vec<Discount> = Discounts::find()
        .filter(discounts::Column::IsActive.eq(true))
        .order_by_desc(discounts::Column::CreatedAt)
        .order_by_asc(discounts::Column::Id)
        .all(&state.orm)
        .await?
        .into_iter()
        .filter(|discount| DiscountTerms::from(discount).applies_at(now))
        .map(Discount::from)
        .collect();

    let total = active.len() as u64;
    let items = active
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(per_page).unwrap_or(usize::MAX))
        .collect();

    Ok(ApiResponse::success(
        "Discounts",
        DiscountList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}

pub async fn list_vendor_discounts(
    state: &AppState,
    vendor: &VendorUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<DiscountList>> {
    let (page, per_page, offset) = pagination.normalize();
    let finder = Discounts::find()
        .filter(discounts::Column::VendorId.eq(vendor.vendor_id))
        .order_by_desc(discounts::Column::CreatedAt)
        .order_by_asc(discounts::Column::Id);
    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(per_page)
        .offset(offset)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Discount::from)
        .collect();

    Ok(ApiResponse::success(
        "Discounts",
        DiscountList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}

/// A product-scoped discount may only target the vendor's own products.
async fn ensure_own_product<C: ConnectionTrait>(
    db: &C,
    vendor: &VendorUser,
    product_id: Option<Uuid>,
) -> AppResult<()> {
    let Some(product_id) = product_id else {
        return Ok(());
    };
    Products::find_by_id(product_id)
        .filter(products::Column::VendorId.eq(vendor.vendor_id))
        .one(db)
        .await?
        .map(|_| ())
        .ok_or(AppError::Forbidden)
}

async fn owned_discount<C: ConnectionTrait>(
    db: &C,
    vendor: &VendorUser,
    discount_id: Uuid,
) -> AppResult<discounts::Model> {
    let discount = Discounts::find_by_id(discount_id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound)?;
    if discount.vendor_id != Some(vendor.vendor_id) {
        return Err(AppError::Forbidden);
    }
    Ok(discount)
}

fn replace_terms(active: &mut discounts::ActiveModel, fields: DiscountFields) {
    active.name = Set(fields.name);
    active.description = Set(fields.description);
    active.kind = Set(fields.kind);
    active.value = Set(fields.value);
    active.min_order_amount = Set(fields.min_order_amount);
    active.max_discount_amount = Set(fields.max_discount_amount);
    active.product_id = Set(fields.product_id);
    active.is_active = Set(fields.is_active);
    active.starts_at = Set(fields.starts_at.map(|dt| dt.fixed_offset()));
    active.expires_at = Set(fields.expires_at.map(|dt| dt.fixed_offset()));
}

pub async fn create_discount(
    state: &AppState,
    vendor: &VendorUser,
    payload: DiscountRequest,
) -> AppResult<ApiResponse<Discount>> {
    let fields = payload.validate()?;
    ensure_own_product(&state.orm, vendor, fields.product_id).await?;

    let created = discounts::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(fields.name),
        description: Set(fields.description),
        kind: Set(fields.kind),
        value: Set(fields.value),
        min_order_amount: Set(fields.min_order_amount),
        max_discount_amount: Set(fields.max_discount_amount),
        vendor_id: Set(Some(vendor.vendor_id)),
        product_id: Set(fields.product_id),
        is_active: Set(fields.is_active),
        starts_at: Set(fields.starts_at.map(|dt| dt.fixed_offset())),
        expires_at: Set(fields.expires_at.map(|dt| dt.fixed_offset())),
        created_at: Set(state.clock.now_fixed()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        state,
        Some(vendor.user.user_id),
        "discount_created",
        "discounts",
        Some(created.id),
        serde_json::json!({ "vendor_id": vendor.vendor_id, "product_id": created.product_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Discount created",
        Discount::from(created),
        Some(Meta::empty()),
    ))
}

pub async fn get_vendor_discount(
    state: &AppState,
    vendor: &VendorUser,
    discount_id: Uuid,
) -> AppResult<ApiResponse<Discount>> {
    let discount = owned_discount(&state.orm, vendor, discount_id).await?;
    Ok(ApiResponse::success("Discount", Discount::from(discount), None))
}

/// Replace a vendor discount's definition.
pub async fn update_discount(
    state: &AppState,
    vendor: &VendorUser,
    discount_id: Uuid,
    payload: DiscountRequest,
) -> AppResult<ApiResponse<Discount>> {
    let fields = payload.validate()?;
    let existing = owned_discount(&state.orm, vendor, discount_id).await?;
    ensure_own_product(&state.orm, vendor, fields.product_id).await?;

    let mut active = existing.into_active_model();
    replace_terms(&mut active, fields);
    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(vendor.user.user_id),
        "discount_updated",
        "discounts",
        Some(updated.id),
        serde_json::json!({ "is_active": updated.is_active }),
    )
    .await;

    Ok(ApiResponse::success(
        "Discount updated",
        Discount::from(updated),
        Some(Meta::empty()),
    ))
}

pub async fn delete_discount(
    state: &AppState,
    vendor: &VendorUser,
    discount_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let discount = owned_discount(&state.orm, vendor, discount_id).await?;
    Discounts::delete_by_id(discount.id).exec(&state.orm).await?;

    audit::record(
        state,
        Some(vendor.user.user_id),
        "discount_deleted",
        "discounts",
        Some(discount.id),
        serde_json::json!({ "name": discount.name }),
    )
    .await;

    Ok(ApiResponse::success(
        "Discount deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
