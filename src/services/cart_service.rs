use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{LockType, OnConflict},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest, VendorGroup},
    entity::{
        CartItems, Carts, Coupons, Products, Vendors, cart_items, carts, products, vendors,
    },
    error::{AppError, AppResult},
    middleware::auth::Identity,
    pricing::{self, DiscountTerms, PriceLine, Quote},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// A cart item joined with its live product row.
#[derive(Debug, Clone)]
pub(crate) struct CartEntry {
    pub item: cart_items::Model,
    pub product: products::Model,
}

impl CartEntry {
    pub fn price_line(&self) -> PriceLine {
        PriceLine {
            unit_price: self.product.price,
            quantity: self.item.quantity,
        }
    }
}

fn owner_condition(identity: &Identity) -> Condition {
    match identity {
        Identity::User(user) => Condition::all().add(carts::Column::UserId.eq(user.user_id)),
        Identity::Guest(session_id) => {
            Condition::all().add(carts::Column::SessionId.eq(session_id.as_str()))
        }
    }
}

pub(crate) async fn find_cart<C: ConnectionTrait>(
    db: &C,
    identity: &Identity,
) -> AppResult<Option<carts::Model>> {
    Ok(Carts::find()
        .filter(owner_condition(identity))
        .one(db)
        .await?)
}

/// The owner's cart, locked until the surrounding transaction ends.
pub(crate) async fn lock_cart<C: ConnectionTrait>(
    db: &C,
    identity: &Identity,
) -> AppResult<Option<carts::Model>> {
    Ok(Carts::find()
        .filter(owner_condition(identity))
        .lock(LockType::Update)
        .one(db)
        .await?)
}

/// The owner's cart, created on first access. Concurrent first accesses
/// converge on the same row through the unique owner columns.
pub(crate) async fn get_or_create_cart<C: ConnectionTrait>(
    db: &C,
    identity: &Identity,
    now: DateTime<FixedOffset>,
) -> AppResult<carts::Model> {
    if let Some(cart) = find_cart(db, identity).await? {
        return Ok(cart);
    }

    let (user_id, session_id, owner_column) = match identity {
        Identity::User(user) => (Some(user.user_id), None, carts::Column::UserId),
        Identity::Guest(session_id) => (None, Some(session_id.clone()), carts::Column::SessionId),
    };

    let cart = carts::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        session_id: Set(session_id),
        coupon_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Carts::insert(cart)
        .on_conflict(OnConflict::column(owner_column).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;

    find_cart(db, identity)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("cart could not be created")))
}

pub(crate) async fn load_entries<C: ConnectionTrait>(
    db: &C,
    cart_id: Uuid,
) -> AppResult<Vec<CartEntry>> {
    let rows = CartItems::find()
        .filter(cart_items::Column::CartId.eq(cart_id))
        .order_by_asc(cart_items::Column::CreatedAt)
        .order_by_asc(cart_items::Column::Id)
        .find_also_related(Products)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item, product)| product.map(|product| CartEntry { item, product }))
        .collect())
}

pub(crate) fn quote_entries(
    entries: &[CartEntry],
    terms: Option<&DiscountTerms>,
    now: DateTime<Utc>,
) -> Quote {
    let lines: Vec<PriceLine> = entries.iter().map(CartEntry::price_line).collect();
    pricing::quote(&lines, terms, now)
}

/// Render the cart with its lines grouped by vendor and priced with the
/// attached coupon, if any.
pub(crate) async fn build_view<C: ConnectionTrait>(
    db: &C,
    cart: &carts::Model,
    entries: &[CartEntry],
    now: DateTime<Utc>,
) -> AppResult<CartView> {
    let coupon = match cart.coupon_id {
        Some(coupon_id) => Coupons::find_by_id(coupon_id).one(db).await?,
        None => None,
    };
    let terms = coupon.as_ref().map(DiscountTerms::from);
    let quote = quote_entries(entries, terms.as_ref(), now);

    let mut vendor_ids: Vec<Uuid> = entries.iter().map(|e| e.product.vendor_id).collect();
    vendor_ids.sort();
    vendor_ids.dedup();
    let vendor_names: HashMap<Uuid, String> = if vendor_ids.is_empty() {
        HashMap::new()
    } else {
        Vendors::find()
            .filter(vendors::Column::Id.is_in(vendor_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|vendor| (vendor.id, vendor.name))
            .collect()
    };

    let lines: Vec<CartLine> = entries.iter().map(cart_line).collect();
    let mut items_by_vendor: Vec<VendorGroup> = Vec::new();
    for line in &lines {
        match items_by_vendor
            .iter_mut()
            .find(|group| group.vendor_id == line.vendor_id)
        {
            Some(group) => {
                group.subtotal += line.line_total;
                group.items.push(line.clone());
            }
            None => items_by_vendor.push(VendorGroup {
                vendor_id: line.vendor_id,
                vendor_name: vendor_names
                    .get(&line.vendor_id)
                    .cloned()
                    .unwrap_or_default(),
                items: vec![line.clone()],
                subtotal: line.line_total,
            }),
        }
    }

    Ok(CartView {
        id: cart.id,
        coupon_code: coupon.map(|coupon| coupon.code),
        items: lines,
        items_by_vendor,
        subtotal: quote.subtotal,
        discount: quote.discount,
        total: quote.total,
    })
}

fn cart_line(entry: &CartEntry) -> CartLine {
    CartLine {
        id: entry.item.id,
        product_id: entry.product.id,
        product_name: entry.product.name.clone(),
        vendor_id: entry.product.vendor_id,
        unit_price: entry.product.price,
        quantity: entry.item.quantity,
        line_total: entry.price_line().subtotal(),
        available_stock: entry.product.stock,
    }
}

async fn current_view(state: &AppState, identity: &Identity) -> AppResult<CartView> {
    let now = state.clock.now();
    let cart = get_or_create_cart(&state.orm, identity, now.fixed_offset()).await?;
    let entries = load_entries(&state.orm, cart.id).await?;
    build_view(&state.orm, &cart, &entries, now).await
}

pub async fn get_cart(state: &AppState, identity: &Identity) -> AppResult<ApiResponse<CartView>> {
    let view = current_view(state, identity).await?;
    Ok(ApiResponse::success("OK", view, Some(Meta::empty())))
}

/// Add `quantity` of a product; a product already in the cart has its
/// quantity increased.
pub async fn add_item(
    state: &AppState,
    identity: &Identity,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    let now = state.clock.now_fixed();

    let txn = state.orm.begin().await?;
    Products::find_by_id(payload.product_id())
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let cart = get_or_create_cart(&txn, identity, now).await?;
    add_quantity(&txn, cart.id, payload.product_id(), payload.quantity(), now).await?;
    touch(&txn, cart, now).await?;
    txn.commit().await?;

    tracing::debug!(
        product_id = %payload.product_id(),
        quantity = payload.quantity(),
        "cart item added"
    );

    let view = current_view(state, identity).await?;
    Ok(ApiResponse::success("Added to cart", view, Some(Meta::empty())))
}

async fn add_quantity<C: ConnectionTrait>(
    db: &C,
    cart_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    now: DateTime<FixedOffset>,
) -> AppResult<()> {
    let existing = CartItems::find()
        .filter(
            Condition::all()
                .add(cart_items::Column::CartId.eq(cart_id))
                .add(cart_items::Column::ProductId.eq(product_id)),
        )
        .one(db)
        .await?;

    match existing {
        Some(item) => {
            let new_quantity = item
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| AppError::bad_request("quantity is too large"))?;
            let mut active = item.into_active_model();
            active.quantity = Set(new_quantity);
            active.update(db).await?;
        }
        None => {
            cart_items::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                created_at: Set(now),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

async fn touch<C: ConnectionTrait>(
    db: &C,
    cart: carts::Model,
    now: DateTime<FixedOffset>,
) -> AppResult<carts::Model> {
    let mut active = cart.into_active_model();
    active.updated_at = Set(now);
    Ok(active.update(db).await?)
}

async fn owned_item<C: ConnectionTrait>(
    db: &C,
    identity: &Identity,
    item_id: Uuid,
) -> AppResult<(carts::Model, cart_items::Model)> {
    let cart = find_cart(db, identity).await?.ok_or(AppError::NotFound)?;
    let item = CartItems::find_by_id(item_id)
        .filter(cart_items::Column::CartId.eq(cart.id))
        .one(db)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok((cart, item))
}

/// Set an absolute quantity on one of the caller's cart items.
pub async fn update_item(
    state: &AppState,
    identity: &Identity,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    let now = state.clock.now_fixed();

    let txn = state.orm.begin().await?;
    let (cart, item) = owned_item(&txn, identity, item_id).await?;
    let mut active = item.into_active_model();
    active.quantity = Set(payload.quantity());
    active.update(&txn).await?;
    touch(&txn, cart, now).await?;
    txn.commit().await?;

    let view = current_view(state, identity).await?;
    Ok(ApiResponse::success("Cart updated", view, Some(Meta::empty())))
}

pub async fn remove_item(
    state: &AppState,
    identity: &Identity,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let now = state.clock.now_fixed();

    let txn = state.orm.begin().await?;
    let (cart, item) = owned_item(&txn, identity, item_id).await?;
    CartItems::delete_by_id(item.id).exec(&txn).await?;
    touch(&txn, cart, now).await?;
    txn.commit().await?;

    let view = current_view(state, identity).await?;
    Ok(ApiResponse::success("Removed from cart", view, Some(Meta::empty())))
}

/// Delete the cart and everything in it. The next access starts a fresh one.
pub async fn clear_cart(
    state: &AppState,
    identity: &Identity,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    if let Some(cart) = find_cart(&txn, identity).await? {
        delete_cart(&txn, cart.id).await?;
    }
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Returns whether the cart row was still there to delete.
pub(crate) async fn delete_cart<C: ConnectionTrait>(db: &C, cart_id: Uuid) -> AppResult<bool> {
    CartItems::delete_many()
        .filter(cart_items::Column::CartId.eq(cart_id))
        .exec(db)
        .await?;
    let deleted = Carts::delete_by_id(cart_id).exec(db).await?;
    Ok(deleted.rows_affected == 1)
}

/// Move a guest cart into the user's cart after sign-in, summing the
/// quantities of products present in both. Returns `None` when the guest had
/// nothing to move.
pub async fn merge_guest_cart(
    state: &AppState,
    session_id: &str,
    user_id: Uuid,
) -> AppResult<Option<ApiResponse<CartView>>> {
    let guest = Identity::Guest(session_id.to_string());
    let user = Identity::User(crate::middleware::auth::AuthUser::customer(user_id));
    let now = state.clock.now_fixed();

    let txn = state.orm.begin().await?;
    let Some(guest_cart) = find_cart(&txn, &guest).await? else {
        return Ok(None);
    };
    let guest_items = CartItems::find()
        .filter(cart_items::Column::CartId.eq(guest_cart.id))
        .all(&txn)
        .await?;
    if guest_items.is_empty() {
        return Ok(None);
    }

    let user_cart = get_or_create_cart(&txn, &user, now).await?;
    for item in &guest_items {
        add_quantity(&txn, user_cart.id, item.product_id, item.quantity, now).await?;
    }
    delete_cart(&txn, guest_cart.id).await?;
    touch(&txn, user_cart, now).await?;
    txn.commit().await?;

    tracing::info!(
        %user_id,
        merged_items = guest_items.len(),
        "guest cart merged"
    );

    let view = current_view(state, &user).await?;
    Ok(Some(ApiResponse::success(
        "Guest cart merged",
        view,
        Some(Meta::empty()),
    )))
}
