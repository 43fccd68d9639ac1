//! Vendor Status Aggregator and the vendor's view of their orders.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{UpdateVendorStatusRequest, VendorOrder, VendorOrderList},
    entity::{
        OrderItems, OrderVendorStatuses, Orders, order_items, order_vendor_statuses, orders,
        sea_orm_active_enums::{OrderStatus, VendorStatus},
    },
    error::{AppError, AppResult},
    middleware::auth::VendorUser,
    models::{OrderItem, VendorOrderStatus},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

/// Overall order status implied by the vendor statuses, if any.
///
/// Only convergence is aggregated: once every vendor is completed or
/// cancelled the order is cancelled (all cancelled) or completed (at least one
/// completed). Anything still open leaves the order as it is.
pub fn aggregate_order_status(statuses: &[VendorStatus]) -> Option<OrderStatus> {
    if statuses.is_empty() || !statuses.iter().all(|status| status.is_terminal()) {
        return None;
    }
    if statuses
        .iter()
        .all(|status| *status == VendorStatus::Cancelled)
    {
        Some(OrderStatus::Cancelled)
    } else {
        Some(OrderStatus::Completed)
    }
}

fn vendor_order(
    order: &orders::Model,
    status: order_vendor_statuses::Model,
    items: Vec<order_items::Model>,
) -> VendorOrder {
    let vendor_total = items.iter().map(|item| item.total_price).sum();
    VendorOrder {
        order_id: order.id,
        order_status: order.status,
        placed_at: order.created_at.with_timezone(&Utc),
        vendor_status: VendorOrderStatus::from(status),
        items: items.into_iter().map(OrderItem::from).collect(),
        vendor_total,
    }
}

async fn vendor_items<C: ConnectionTrait>(
    db: &C,
    order_ids: Vec<Uuid>,
    vendor_id: Uuid,
) -> AppResult<HashMap<Uuid, Vec<order_items::Model>>> {
    let mut grouped: HashMap<Uuid, Vec<order_items::Model>> = HashMap::new();
    if order_ids.is_empty() {
        return Ok(grouped);
    }
    let items = OrderItems::find()
        .filter(order_items::Column::OrderId.is_in(order_ids))
        .filter(order_items::Column::VendorId.eq(vendor_id))
        .order_by_asc(order_items::Column::CreatedAt)
        .order_by_asc(order_items::Column::Id)
        .all(db)
        .await?;
    for item in items {
        grouped.entry(item.order_id).or_default().push(item);
    }
    Ok(grouped)
}

/// Orders containing the vendor's items, newest first.
pub async fn list_orders(
    state: &AppState,
    vendor: &VendorUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<VendorOrderList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = OrderVendorStatuses::find()
        .filter(order_vendor_statuses::Column::VendorId.eq(vendor.vendor_id))
        .order_by_desc(order_vendor_statuses::Column::CreatedAt)
        .order_by_asc(order_vendor_statuses::Column::Id);
    let total = finder.clone().count(&state.orm).await?;

    let rows = finder
        .limit(limit)
        .offset(offset)
        .find_also_related(Orders)
        .all(&state.orm)
        .await?;

    let order_ids = rows.iter().map(|(status, _)| status.order_id).collect();
    let mut items = vendor_items(&state.orm, order_ids, vendor.vendor_id).await?;

    let orders = rows
        .into_iter()
        .filter_map(|(status, order)| {
            let order = order?;
            let order_items = items.remove(&order.id).unwrap_or_default();
            Some(vendor_order(&order, status, order_items))
        })
        .collect();

    Ok(ApiResponse::success(
        "OK",
        VendorOrderList { items: orders },
        Some(Meta::new(page, limit, total)),
    ))
}

/// The vendor's status row for `order_id`. A row owned by another vendor is
/// forbidden; an order the vendor has no part in is not found.
async fn owned_status<C: ConnectionTrait>(
    db: &C,
    vendor: &VendorUser,
    order_id: Uuid,
) -> AppResult<order_vendor_statuses::Model> {
    let owned = OrderVendorStatuses::find()
        .filter(
            Condition::all()
                .add(order_vendor_statuses::Column::OrderId.eq(order_id))
                .add(order_vendor_statuses::Column::VendorId.eq(vendor.vendor_id)),
        )
        .one(db)
        .await?;
    if let Some(status) = owned {
        return Ok(status);
    }

    let order_exists = Orders::find_by_id(order_id).one(db).await?.is_some();
    if order_exists {
        Err(AppError::Forbidden)
    } else {
        Err(AppError::NotFound)
    }
}

pub async fn get_order(
    state: &AppState,
    vendor: &VendorUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<VendorOrder>> {
    let status = owned_status(&state.orm, vendor, order_id).await?;
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let mut items = vendor_items(&state.orm, vec![order_id], vendor.vendor_id).await?;
    let data = vendor_order(&order, status, items.remove(&order_id).unwrap_or_default());
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

/// Move the vendor's share of an order forward, then fold every vendor status
/// into the overall order status.
///
/// The order row is locked first so vendors finishing at the same time are
/// aggregated one after the other and the last one sees every final status.
pub async fn update_status(
    state: &AppState,
    vendor: &VendorUser,
    order_id: Uuid,
    payload: UpdateVendorStatusRequest,
) -> AppResult<ApiResponse<VendorOrder>> {
    let now = state.clock.now_fixed();
    let next = payload.status();

    let txn = state.orm.begin().await?;
    let mut order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let current = owned_status(&txn, vendor, order_id).await?;
    let previous = current.status;
    if !previous.can_transition_to(next) {
        return Err(AppError::conflict(format!(
            "Cannot change vendor status from {previous} to {next}"
        )));
    }

    let mut update = OrderVendorStatuses::update_many()
        .col_expr(order_vendor_statuses::Column::Status, Expr::value(next))
        .col_expr(order_vendor_statuses::Column::UpdatedAt, Expr::value(now));
    if let Some(notes) = payload.notes() {
        update = update.col_expr(
            order_vendor_statuses::Column::Notes,
            Expr::value(notes.to_string()),
        );
    }
    let result = update
        .filter(order_vendor_statuses::Column::Id.eq(current.id))
        .filter(order_vendor_statuses::Column::Status.eq(previous))
        .exec(&txn)
        .await?;
    if result.rows_affected != 1 {
        return Err(AppError::conflict("Vendor status changed, please retry"));
    }

    let statuses: Vec<VendorStatus> = OrderVendorStatuses::find()
        .filter(order_vendor_statuses::Column::OrderId.eq(order_id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|row| row.status)
        .collect();

    if let Some(aggregate) = aggregate_order_status(&statuses) {
        if aggregate != order.status {
            let mut active = order.into_active_model();
            active.status = Set(aggregate);
            active.updated_at = Set(now);
            order = active.update(&txn).await?;
            tracing::info!(%order_id, status = %aggregate, "order status aggregated");
        }
    }

    let status = OrderVendorStatuses::find_by_id(current.id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let mut items = vendor_items(&txn, vec![order_id], vendor.vendor_id).await?;
    txn.commit().await?;

    tracing::info!(
        %order_id,
        vendor_id = %vendor.vendor_id,
        from = %previous,
        to = %next,
        "vendor status updated"
    );
    audit::record(
        state,
        Some(vendor.user.user_id),
        "vendor_status_updated",
        "order_vendor_statuses",
        Some(status.id),
        serde_json::json!({
            "order_id": order_id,
            "from": previous,
            "to": next,
        }),
    )
    .await;

    let data = vendor_order(&order, status, items.remove(&order_id).unwrap_or_default());
    Ok(ApiResponse::success(
        "Vendor status updated",
        data,
        Some(Meta::empty()),
    ))
}
