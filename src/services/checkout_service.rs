//! Order Assembler: turns the caller's cart into an order in one transaction.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{cart::CheckoutPreview, orders::OrderDetail},
    entity::{
        Coupons, Products, carts, coupons, order_items, order_vendor_statuses, orders, products,
        sea_orm_active_enums::{OrderStatus, VendorStatus},
    },
    error::{AppError, AppResult, StockShortage},
    middleware::auth::{AuthUser, Identity},
    models::{Order, OrderItem, VendorOrderStatus},
    pricing::{DiscountTerms, allocate_discount},
    response::{ApiResponse, Meta},
    services::{
        cart_service::{self, CartEntry},
        coupon_service,
    },
    state::AppState,
};

const EMPTY_CART: &str = "Your cart is empty";

/// Every cart line whose quantity exceeds current stock.
pub(crate) fn stock_shortages(entries: &[CartEntry]) -> Vec<StockShortage> {
    entries
        .iter()
        .filter(|entry| entry.item.quantity > entry.product.stock)
        .map(|entry| StockShortage {
            product_id: entry.product.id,
            product_name: entry.product.name.clone(),
            requested_quantity: entry.item.quantity,
            available_stock: entry.product.stock,
        })
        .collect()
}

/// Distinct vendors in order of first appearance.
fn vendors_in_order(entries: &[CartEntry]) -> Vec<Uuid> {
    let mut vendors: Vec<Uuid> = Vec::new();
    for entry in entries {
        if !vendors.contains(&entry.product.vendor_id) {
            vendors.push(entry.product.vendor_id);
        }
    }
    vendors
}

/// What checkout would produce right now. Never writes.
pub async fn preview(
    state: &AppState,
    identity: &Identity,
) -> AppResult<ApiResponse<CheckoutPreview>> {
    let now = state.clock.now();
    let cart = cart_service::find_cart(&state.orm, identity)
        .await?
        .ok_or_else(|| AppError::bad_request(EMPTY_CART))?;
    let entries = cart_service::load_entries(&state.orm, cart.id).await?;
    if entries.is_empty() {
        return Err(AppError::bad_request(EMPTY_CART));
    }

    let out_of_stock_items = stock_shortages(&entries);
    let view = cart_service::build_view(&state.orm, &cart, &entries, now).await?;
    let message = if out_of_stock_items.is_empty() {
        "OK"
    } else {
        "Some items in the cart do not have enough stock"
    };

    Ok(ApiResponse::success(
        message,
        CheckoutPreview {
            can_checkout: out_of_stock_items.is_empty(),
            cart: view,
            out_of_stock_items,
        },
        Some(Meta::empty()),
    ))
}

/// What checkout read and verified before its first write.
pub(crate) struct CheckoutPlan {
    cart: carts::Model,
    entries: Vec<CartEntry>,
    coupon: Option<coupons::Model>,
}

/// The rows written for a placed order.
pub(crate) struct PlacedOrder {
    order: orders::Model,
    items: Vec<OrderItem>,
    vendor_statuses: Vec<VendorOrderStatus>,
}

/// Lock the user's cart and check it can become an order: not empty, every
/// line in stock and the attached coupon still eligible.
///
/// A second checkout of the same cart waits on the lock and then finds the
/// cart gone.
pub(crate) async fn prepare<C: ConnectionTrait>(
    db: &C,
    user: &AuthUser,
    now: DateTime<Utc>,
) -> AppResult<CheckoutPlan> {
    let cart = cart_service::lock_cart(db, &Identity::User(user.clone()))
        .await?
        .ok_or_else(|| AppError::bad_request(EMPTY_CART))?;
    let entries = cart_service::load_entries(db, cart.id).await?;
    if entries.is_empty() {
        return Err(AppError::bad_request(EMPTY_CART));
    }

    let shortages = stock_shortages(&entries);
    if !shortages.is_empty() {
        tracing::info!(
            user_id = %user.user_id,
            short_items = shortages.len(),
            "checkout rejected: insufficient stock"
        );
        return Err(AppError::OutOfStock(shortages));
    }

    let coupon = match cart.coupon_id {
        Some(coupon_id) => Coupons::find_by_id(coupon_id).one(db).await?,
        None => None,
    };
    if let Some(coupon) = &coupon {
        coupon_service::check_cart_eligibility(db, coupon, user.user_id, &entries, now).await?;
    }

    Ok(CheckoutPlan {
        cart,
        entries,
        coupon,
    })
}

/// Write the order described by `plan`. Any error leaves partial writes in
/// `db`; the caller's transaction must be dropped, not committed.
pub(crate) async fn place_order<C: ConnectionTrait>(
    db: &C,
    user: &AuthUser,
    plan: CheckoutPlan,
    now: DateTime<Utc>,
) -> AppResult<PlacedOrder> {
    let now_fixed = now.fixed_offset();
    let CheckoutPlan {
        cart,
        entries,
        coupon,
    } = plan;

    let terms = coupon.as_ref().map(DiscountTerms::from);
    let quote = cart_service::quote_entries(&entries, terms.as_ref(), now);

    let order = orders::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        subtotal: Set(quote.subtotal),
        discount_amount: Set(quote.discount),
        total_price: Set(quote.total),
        coupon_id: Set(coupon.as_ref().map(|coupon| coupon.id)),
        status: Set(OrderStatus::Pending),
        created_at: Set(now_fixed),
        updated_at: Set(now_fixed),
    }
    .insert(db)
    .await?;

    let mut vendor_statuses = Vec::new();
    for vendor_id in vendors_in_order(&entries) {
        let status = order_vendor_statuses::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            vendor_id: Set(vendor_id),
            status: Set(VendorStatus::Pending),
            notes: Set(None),
            created_at: Set(now_fixed),
            updated_at: Set(now_fixed),
        }
        .insert(db)
        .await?;
        vendor_statuses.push(VendorOrderStatus::from(status));
    }

    let line_subtotals: Vec<i64> = entries
        .iter()
        .map(|entry| entry.price_line().subtotal())
        .collect();
    let shares = allocate_discount(&line_subtotals, quote.discount);

    let mut items = Vec::with_capacity(entries.len());
    for ((entry, subtotal), share) in entries.iter().zip(line_subtotals).zip(shares) {
        let item = order_items::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(entry.product.id),
            vendor_id: Set(entry.product.vendor_id),
            quantity: Set(entry.item.quantity),
            unit_price: Set(entry.product.price),
            subtotal: Set(subtotal),
            discount_amount: Set(share),
            total_price: Set(subtotal - share),
            created_at: Set(now_fixed),
        }
        .insert(db)
        .await?;
        items.push(OrderItem::from(item));

        reserve_stock(db, entry).await?;
    }

    if let Some(coupon) = &coupon {
        let redeemed =
            coupon_service::apply(db, coupon, user.user_id, order.id, quote.discount, now)
                .await?;
        if !redeemed {
            tracing::info!(
                user_id = %user.user_id,
                coupon = %coupon.code,
                "checkout rejected: coupon usage limit reached"
            );
            return Err(AppError::conflict(
                "This coupon has already been used the maximum number of times",
            ));
        }
    }

    if !cart_service::delete_cart(db, cart.id).await? {
        tracing::warn!(
            user_id = %user.user_id,
            cart_id = %cart.id,
            "checkout rejected: cart already checked out"
        );
        return Err(AppError::conflict("This cart has already been checked out"));
    }

    Ok(PlacedOrder {
        order,
        items,
        vendor_statuses,
    })
}

/// Convert the caller's cart into a pending order.
///
/// Stock check, pricing, order and vendor-status rows, stock decrement,
/// coupon redemption and cart deletion all commit together or not at all.
pub async fn checkout(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<OrderDetail>> {
    let now = state.clock.now();

    let txn = state.orm.begin().await?;
    let plan = prepare(&txn, user, now).await?;
    let PlacedOrder {
        order,
        items,
        vendor_statuses,
    } = place_order(&txn, user, plan, now).await?;
    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        total_price = order.total_price,
        vendors = vendor_statuses.len(),
        "order placed"
    );
    audit::record(
        state,
        Some(user.user_id),
        "checkout",
        "orders",
        Some(order.id),
        serde_json::json!({
            "subtotal": order.subtotal,
            "discount_amount": order.discount_amount,
            "total_price": order.total_price,
            "coupon_id": order.coupon_id,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order placed",
        OrderDetail {
            order: Order::from(order),
            items,
            vendor_statuses,
        },
        Some(Meta::empty()),
    ))
}

/// Take `quantity` units of stock only if that many are still available.
async fn reserve_stock<C: ConnectionTrait>(db: &C, entry: &CartEntry) -> AppResult<()> {
    let quantity = entry.item.quantity;
    let result = Products::update_many()
        .col_expr(
            products::Column::Stock,
            Expr::col(products::Column::Stock).sub(quantity),
        )
        .filter(products::Column::Id.eq(entry.product.id))
        .filter(products::Column::Stock.gte(quantity))
        .exec(db)
        .await?;

    if result.rows_affected == 1 {
        return Ok(());
    }

    let available_stock = Products::find_by_id(entry.product.id)
        .one(db)
        .await?
        .map_or(0, |product| product.stock);
    Err(AppError::OutOfStock(vec![StockShortage {
        product_id: entry.product.id,
        product_name: entry.product.name.clone(),
        requested_quantity: quantity,
        available_stock,
    }]))
}
