use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{OrderDetail, OrderList},
    entity::{
        OrderItems, OrderVendorStatuses, Orders, Products, order_items, order_vendor_statuses,
        orders, products,
        sea_orm_active_enums::{OrderStatus, VendorStatus},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, VendorOrderStatus},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(orders::Column::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(orders::Column::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or_default();
    let finder = Orders::find()
        .filter(condition)
        .order_by(orders::Column::CreatedAt, sort_order.into())
        .order_by_asc(orders::Column::Id);

    let total = finder.clone().count(&state.orm).await?;

    let orders = finder
        .limit(limit)
        .offset(offset)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Load an order with its items and vendor statuses.
pub(crate) async fn load_detail<C: ConnectionTrait>(
    db: &C,
    order: orders::Model,
) -> AppResult<OrderDetail> {
    let items = OrderItems::find()
        .filter(order_items::Column::OrderId.eq(order.id))
        .order_by_asc(order_items::Column::CreatedAt)
        .order_by_asc(order_items::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    let vendor_statuses = OrderVendorStatuses::find()
        .filter(order_vendor_statuses::Column::OrderId.eq(order.id))
        .order_by_asc(order_vendor_statuses::Column::CreatedAt)
        .order_by_asc(order_vendor_statuses::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(VendorOrderStatus::from)
        .collect();

    Ok(OrderDetail {
        order: Order::from(order),
        items,
        vendor_statuses,
    })
}

async fn find_owned<C: ConnectionTrait>(
    db: &C,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<orders::Model> {
    Orders::find()
        .filter(
            Condition::all()
                .add(orders::Column::UserId.eq(user.user_id))
                .add(orders::Column::Id.eq(id)),
        )
        .one(db)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = find_owned(&state.orm, user, id).await?;
    let detail = load_detail(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", detail, Some(Meta::empty())))
}

/// Cancel an order that is neither completed nor already cancelled: every
/// item's quantity goes back to stock and every vendor status is cancelled.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let now = state.clock.now_fixed();
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(orders::Column::UserId.eq(user.user_id))
                .add(orders::Column::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    match order.status {
        OrderStatus::Completed => {
            return Err(AppError::conflict("Completed orders cannot be cancelled"));
        }
        OrderStatus::Cancelled => {
            return Err(AppError::conflict("Order is already cancelled"));
        }
        _ => {}
    }

    let updated = Orders::update_many()
        .col_expr(orders::Column::Status, Expr::value(OrderStatus::Cancelled))
        .col_expr(orders::Column::UpdatedAt, Expr::value(now))
        .filter(orders::Column::Id.eq(order.id))
        .filter(orders::Column::Status.eq(order.status))
        .exec(&txn)
        .await?;
    if updated.rows_affected != 1 {
        return Err(AppError::conflict("Order status changed, please retry"));
    }

    let items = OrderItems::find()
        .filter(order_items::Column::OrderId.eq(order.id))
        .all(&txn)
        .await?;
    for item in &items {
        Products::update_many()
            .col_expr(
                products::Column::Stock,
                Expr::col(products::Column::Stock).add(item.quantity),
            )
            .filter(products::Column::Id.eq(item.product_id))
            .exec(&txn)
            .await?;
    }

    OrderVendorStatuses::update_many()
        .col_expr(
            order_vendor_statuses::Column::Status,
            Expr::value(VendorStatus::Cancelled),
        )
        .col_expr(order_vendor_statuses::Column::UpdatedAt, Expr::value(now))
        .filter(order_vendor_statuses::Column::OrderId.eq(order.id))
        .exec(&txn)
        .await?;

    let order = Orders::find_by_id(order.id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let detail = load_detail(&txn, order).await?;
    txn.commit().await?;

    tracing::info!(
        order_id = %id,
        user_id = %user.user_id,
        restocked_items = items.len(),
        "order cancelled"
    );
    audit::record(
        state,
        Some(user.user_id),
        "order_cancelled",
        "orders",
        Some(id),
        serde_json::json!({ "restocked_items": items.len() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order cancelled",
        detail,
        Some(Meta::empty()),
    ))
}
