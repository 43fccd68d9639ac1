//! Coupon Ledger: eligibility checks, usage recording and vendor coupon
//! management.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        cart::{ApplyCouponRequest, CartView},
        coupons::{CouponList, CouponRequest, generate_code},
    },
    entity::{
        Carts, CouponUsages, Coupons, Products, Vendors, carts, coupon_usages, coupons,
        products,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, Identity, VendorUser},
    models::Coupon,
    pricing::DiscountTerms,
    response::{ApiResponse, Meta},
    services::cart_service::{self, CartEntry},
    state::AppState,
};

const INVALID_COUPON: &str = "This coupon is not valid or has expired";

/// Active, inside its validity window and below its global usage limit.
pub fn is_valid(coupon: &coupons::Model, now: DateTime<Utc>) -> bool {
    let terms = DiscountTerms::from(coupon);
    terms.applies_at(now)
}

pub async fn user_usage_count<C: ConnectionTrait>(
    db: &C,
    coupon_id: Uuid,
    user_id: Uuid,
) -> AppResult<u64> {
    Ok(CouponUsages::find()
        .filter(
            Condition::all()
                .add(coupon_usages::Column::CouponId.eq(coupon_id))
                .add(coupon_usages::Column::UserId.eq(user_id)),
        )
        .count(db)
        .await?)
}

/// [`is_valid`] and the user is still below the per-user usage limit.
pub async fn is_valid_for_user<C: ConnectionTrait>(
    db: &C,
    coupon: &coupons::Model,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    if !is_valid(coupon, now) {
        return Ok(false);
    }
    if let Some(limit) = coupon.usage_limit_per_user {
        let used = user_usage_count(db, coupon.id, user_id).await?;
        if used >= u64::try_from(limit).unwrap_or(0) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Record that `user_id` redeemed `coupon` on `order_id`.
///
/// Returns `false` without writing when the coupon is no longer valid for the
/// user, including when a concurrent redemption took the last global use.
/// Must run inside the transaction that creates the order.
pub async fn apply<C: ConnectionTrait>(
    db: &C,
    coupon: &coupons::Model,
    user_id: Uuid,
    order_id: Uuid,
    discount_amount: i64,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    if !is_valid_for_user(db, coupon, user_id, now).await? {
        return Ok(false);
    }

    let incremented = Coupons::update_many()
        .col_expr(
            coupons::Column::UsedCount,
            Expr::col(coupons::Column::UsedCount).add(1),
        )
        .filter(coupons::Column::Id.eq(coupon.id))
        .filter(
            Condition::any()
                .add(coupons::Column::UsageLimit.is_null())
                .add(
                    Expr::col(coupons::Column::UsedCount)
                        .lt(Expr::col(coupons::Column::UsageLimit)),
                ),
        )
        .exec(db)
        .await?;
    if incremented.rows_affected != 1 {
        return Ok(false);
    }

    coupon_usages::ActiveModel {
        id: Set(Uuid::new_v4()),
        coupon_id: Set(coupon.id),
        user_id: Set(user_id),
        order_id: Set(order_id),
        discount_amount: Set(discount_amount),
        used_at: Set(now.fixed_offset()),
    }
    .insert(db)
    .await?;

    Ok(true)
}

/// The pre-checkout rules for attaching `coupon` to a cart holding `entries`.
/// Each failed rule yields its own conflict message.
pub(crate) async fn check_cart_eligibility<C: ConnectionTrait>(
    db: &C,
    coupon: &coupons::Model,
    user_id: Uuid,
    entries: &[CartEntry],
    now: DateTime<Utc>,
) -> AppResult<()> {
    if entries.is_empty() {
        return Err(AppError::bad_request("Your cart is empty"));
    }
    if !is_valid_for_user(db, coupon, user_id, now).await? {
        return Err(AppError::conflict(INVALID_COUPON));
    }

    let subtotal: i64 = entries.iter().map(|e| e.price_line().subtotal()).sum();
    if let Some(min) = coupon.min_order_amount {
        if subtotal < min {
            return Err(AppError::conflict(format!(
                "The minimum order amount for this coupon is {min}"
            )));
        }
    }

    if let Some(product_id) = coupon.product_id {
        if !entries.iter().any(|e| e.product.id == product_id) {
            let name = Products::find_by_id(product_id)
                .one(db)
                .await?
                .map(|product| product.name)
                .unwrap_or_default();
            return Err(AppError::conflict(format!(
                "This coupon only applies to the product {name}"
            )));
        }
    }

    if let Some(vendor_id) = coupon.vendor_id {
        if !entries.iter().any(|e| e.product.vendor_id == vendor_id) {
            let name = Vendors::find_by_id(vendor_id)
                .one(db)
                .await?
                .map(|vendor| vendor.name)
                .unwrap_or_default();
            return Err(AppError::conflict(format!(
                "This coupon only applies to products of the vendor {name}"
            )));
        }
    }

    Ok(())
}

pub(crate) async fn find_by_code<C: ConnectionTrait>(
    db: &C,
    code: &str,
) -> AppResult<Option<coupons::Model>> {
    Ok(Coupons::find()
        .filter(coupons::Column::Code.eq(code))
        .one(db)
        .await?)
}

pub async fn apply_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: ApplyCouponRequest,
) -> AppResult<ApiResponse<CartView>> {
    let code = payload.code();
    let now = state.clock.now();
    let identity = Identity::User(user.clone());

    let txn = state.orm.begin().await?;
    let coupon = find_by_code(&txn, code).await?.ok_or(AppError::NotFound)?;
    let cart = cart_service::get_or_create_cart(&txn, &identity, now.fixed_offset()).await?;
    let entries = cart_service::load_entries(&txn, cart.id).await?;
    check_cart_eligibility(&txn, &coupon, user.user_id, &entries, now).await?;

    let mut active = cart.into_active_model();
    active.coupon_id = Set(Some(coupon.id));
    active.updated_at = Set(now.fixed_offset());
    let cart = active.update(&txn).await?;
    let view = cart_service::build_view(&txn, &cart, &entries, now).await?;
    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, coupon = %coupon.code, "coupon applied to cart");
    Ok(ApiResponse::success(
        "Coupon applied",
        view,
        Some(Meta::empty()),
    ))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CartView>> {
    let now = state.clock.now();
    let identity = Identity::User(user.clone());

    let txn = state.orm.begin().await?;
    let cart = cart_service::find_cart(&txn, &identity)
        .await?
        .filter(|cart| cart.coupon_id.is_some())
        .ok_or_else(|| AppError::bad_request("No coupon is applied to the cart"))?;

    let mut active = cart.into_active_model();
    active.coupon_id = Set(None);
    active.updated_at = Set(now.fixed_offset());
    let cart = active.update(&txn).await?;
    let entries = cart_service::load_entries(&txn, cart.id).await?;
    let view = cart_service::build_view(&txn, &cart, &entries, now).await?;
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Coupon removed",
        view,
        Some(Meta::empty()),
    ))
}

pub async fn create_coupon(
    state: &AppState,
    vendor: &VendorUser,
    payload: CouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    let coupon = payload.validate()?;
    let now = state.clock.now_fixed();

    let txn = state.orm.begin().await?;
    if let Some(product_id) = coupon.product_id {
        let owned = Products::find_by_id(product_id)
            .filter(products::Column::VendorId.eq(vendor.vendor_id))
            .one(&txn)
            .await?;
        if owned.is_none() {
            return Err(AppError::Forbidden);
        }
    }

    let code = match coupon.code {
        Some(code) => {
            if find_by_code(&txn, &code).await?.is_some() {
                return Err(AppError::conflict("Coupon code already exists"));
            }
            code
        }
        None => unique_generated_code(&txn).await?,
    };

    let created = coupons::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code),
        name: Set(coupon.name),
        description: Set(coupon.description),
        kind: Set(coupon.kind),
        value: Set(coupon.value),
        min_order_amount: Set(coupon.min_order_amount),
        max_discount_amount: Set(coupon.max_discount_amount),
        vendor_id: Set(Some(vendor.vendor_id)),
        product_id: Set(coupon.product_id),
        usage_limit: Set(coupon.usage_limit),
        usage_limit_per_user: Set(coupon.usage_limit_per_user),
        used_count: Set(0),
        is_active: Set(coupon.is_active),
        starts_at: Set(coupon.starts_at.map(|dt| dt.fixed_offset())),
        expires_at: Set(coupon.expires_at.map(|dt| dt.fixed_offset())),
        created_at: Set(now),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(vendor.user.user_id),
        "coupon_created",
        "coupons",
        Some(created.id),
        serde_json::json!({ "code": created.code, "vendor_id": vendor.vendor_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon created",
        Coupon::from(created),
        Some(Meta::empty()),
    ))
}

async fn unique_generated_code<C: ConnectionTrait>(db: &C) -> AppResult<String> {
    for _ in 0..5 {
        let code = generate_code();
        if find_by_code(db, &code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(AppError::Internal(anyhow::anyhow!(
        "could not generate a unique coupon code"
    )))
}

pub async fn list_vendor_coupons(
    state: &AppState,
    vendor: &VendorUser,
) -> AppResult<ApiResponse<CouponList>> {
    let items: Vec<Coupon> = Coupons::find()
        .filter(coupons::Column::VendorId.eq(vendor.vendor_id))
        .order_by_desc(coupons::Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Coupon::from)
        .collect();

    let total = items.len() as u64;
    Ok(ApiResponse::success(
        "OK",
        CouponList { items },
        Some(Meta::new(1, total, total)),
    ))
}

async fn owned_coupon<C: ConnectionTrait>(
    db: &C,
    vendor: &VendorUser,
    coupon_id: Uuid,
) -> AppResult<coupons::Model> {
    let coupon = Coupons::find_by_id(coupon_id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound)?;
    if coupon.vendor_id != Some(vendor.vendor_id) {
        return Err(AppError::Forbidden);
    }
    Ok(coupon)
}

pub async fn get_vendor_coupon(
    state: &AppState,
    vendor: &VendorUser,
    coupon_id: Uuid,
) -> AppResult<ApiResponse<Coupon>> {
    let coupon = owned_coupon(&state.orm, vendor, coupon_id).await?;
    Ok(ApiResponse::success("Coupon", Coupon::from(coupon), None))
}

/// Replace a vendor coupon's definition. Redemption counters are kept and an
/// absent code keeps the current one.
pub async fn update_coupon(
    state: &AppState,
    vendor: &VendorUser,
    coupon_id: Uuid,
    payload: CouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    let fields = payload.validate()?;

    let txn = state.orm.begin().await?;
    let existing = owned_coupon(&txn, vendor, coupon_id).await?;
    if let Some(product_id) = fields.product_id {
        let owned = Products::find_by_id(product_id)
            .filter(products::Column::VendorId.eq(vendor.vendor_id))
            .one(&txn)
            .await?;
        if owned.is_none() {
            return Err(AppError::Forbidden);
        }
    }

    let code = match fields.code {
        Some(code) if code != existing.code => {
            if find_by_code(&txn, &code).await?.is_some() {
                return Err(AppError::conflict("Coupon code already exists"));
            }
            code
        }
        _ => existing.code.clone(),
    };

    let mut active = existing.into_active_model();
    active.code = Set(code);
    active.name = Set(fields.name);
    active.description = Set(fields.description);
    active.kind = Set(fields.kind);
    active.value = Set(fields.value);
    active.min_order_amount = Set(fields.min_order_amount);
    active.max_discount_amount = Set(fields.max_discount_amount);
    active.product_id = Set(fields.product_id);
    active.usage_limit = Set(fields.usage_limit);
    active.usage_limit_per_user = Set(fields.usage_limit_per_user);
    active.is_active = Set(fields.is_active);
    active.starts_at = Set(fields.starts_at.map(|dt| dt.fixed_offset()));
    active.expires_at = Set(fields.expires_at.map(|dt| dt.fixed_offset()));
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(vendor.user.user_id),
        "coupon_updated",
        "coupons",
        Some(updated.id),
        serde_json::json!({ "code": updated.code }),
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon updated",
        Coupon::from(updated),
        Some(Meta::empty()),
    ))
}

/// Delete a vendor's coupon. Redeemed coupons stay for the order history.
pub async fn delete_coupon(
    state: &AppState,
    vendor: &VendorUser,
    coupon_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    let coupon = owned_coupon(&txn, vendor, coupon_id).await?;
    if coupon.used_count > 0 {
        return Err(AppError::conflict(
            "Coupon has already been used and cannot be deleted",
        ));
    }

    Carts::update_many()
        .col_expr(carts::Column::CouponId, Expr::value(Option::<Uuid>::None))
        .filter(carts::Column::CouponId.eq(coupon.id))
        .exec(&txn)
        .await?;
    Coupons::delete_by_id(coupon.id).exec(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(vendor.user.user_id),
        "coupon_deleted",
        "coupons",
        Some(coupon.id),
        serde_json::json!({ "code": coupon.code }),
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
