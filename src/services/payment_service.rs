//! Payment State Machine.
//!
//! pending -> successful | failed, and successful -> refunded. Every
//! transition out of a state is a conditional update on that state, so of two
//! concurrent writers only one observes an affected row.

use chrono::{DateTime, FixedOffset};
use rand::{Rng, distributions::Alphanumeric};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, LockType},
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    audit,
    dto::payments::{CreatePaymentRequest, PaymentList, PaymentRedirect, RefundRequest},
    entity::{
        Orders, Payments, orders, payments,
        sea_orm_active_enums::{GatewayKind, OrderStatus, PaymentStatus},
    },
    error::{AppError, AppResult},
    gateways::{CallbackPayload, PaymentGateway},
    middleware::auth::{AuthUser, ensure_admin},
    models::Payment,
    response::{ApiResponse, Meta},
    routes::params::PaymentListQuery,
    state::AppState,
};

pub const REFERENCE_ID_LEN: usize = 32;

pub fn generate_reference_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFERENCE_ID_LEN)
        .map(char::from)
        .collect()
}

/// Start a payment for one of the caller's orders and hand back where to pay.
///
/// The pending payment is committed before the gateway is contacted.
pub async fn create_payment(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentRequest,
) -> AppResult<ApiResponse<PaymentRedirect>> {
    let gateway = state
        .gateways
        .get(payload.gateway)
        .ok_or_else(|| AppError::bad_request("Unsupported payment gateway"))?;
    let now = state.clock.now_fixed();

    let txn = state.orm.begin().await?;
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(orders::Column::Id.eq(payload.order_id))
                .add(orders::Column::UserId.eq(user.user_id)),
        )
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    match order.status {
        OrderStatus::Cancelled => return Err(AppError::conflict("Order is cancelled")),
        OrderStatus::Pending => {}
        _ => return Err(AppError::conflict("Order is already paid")),
    }
    if has_successful_payment(&txn, order.id, None).await? {
        return Err(AppError::conflict("Order is already paid"));
    }

    let payment = Payments::insert(payments::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        user_id: Set(user.user_id),
        amount: Set(order.total_price),
        status: Set(PaymentStatus::Pending),
        gateway: Set(payload.gateway),
        reference_id: Set(generate_reference_id()),
        transaction_id: Set(None),
        paid_at: Set(None),
        details: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    })
    .exec_with_returning(&txn)
    .await?;
    txn.commit().await?;

    let callback_url = state
        .gateways
        .callback_url(payload.gateway, &payment.reference_id)?;
    let redirect = match gateway.build_redirect(&payment, &callback_url).await {
        Ok(redirect) => redirect,
        Err(err) => {
            tracing::error!(
                error = %err,
                payment_id = %payment.id,
                gateway = %payload.gateway,
                "payment redirect failed"
            );
            let details = json!({ "error": "gateway request failed" });
            transition(
                &state.orm,
                payment.id,
                PaymentStatus::Pending,
                PaymentStatus::Failed,
                Resolution::failed(details),
                state.clock.now_fixed(),
            )
            .await?;
            return Err(err);
        }
    };

    tracing::info!(
        payment_id = %payment.id,
        order_id = %order.id,
        gateway = %payload.gateway,
        amount = payment.amount,
        "payment created"
    );

    Ok(ApiResponse::success(
        "Payment created",
        PaymentRedirect {
            payment: Payment::from(payment),
            redirect,
        },
        Some(Meta::empty()),
    ))
}

async fn has_successful_payment<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
    except: Option<Uuid>,
) -> AppResult<bool> {
    let mut condition = Condition::all()
        .add(payments::Column::OrderId.eq(order_id))
        .add(payments::Column::Status.eq(PaymentStatus::Successful));
    if let Some(payment_id) = except {
        condition = condition.add(payments::Column::Id.ne(payment_id));
    }
    Ok(Payments::find().filter(condition).count(db).await? > 0)
}

/// Column values written alongside a status transition.
struct Resolution {
    transaction_id: Option<String>,
    details: Value,
    paid: bool,
}

impl Resolution {
    fn failed(details: Value) -> Self {
        Self {
            transaction_id: None,
            details,
            paid: false,
        }
    }
}

/// Move `payment_id` from `from` to `to`. `false` means another writer got
/// there first.
async fn transition<C: ConnectionTrait>(
    db: &C,
    payment_id: Uuid,
    from: PaymentStatus,
    to: PaymentStatus,
    resolution: Resolution,
    now: DateTime<FixedOffset>,
) -> AppResult<bool> {
    let mut update = Payments::update_many()
        .col_expr(payments::Column::Status, Expr::value(to))
        .col_expr(payments::Column::Details, Expr::value(resolution.details))
        .col_expr(payments::Column::UpdatedAt, Expr::value(now));
    if let Some(transaction_id) = resolution.transaction_id {
        update = update.col_expr(
            payments::Column::TransactionId,
            Expr::value(transaction_id),
        );
    }
    if resolution.paid {
        update = update.col_expr(payments::Column::PaidAt, Expr::value(now));
    }

    let result = update
        .filter(payments::Column::Id.eq(payment_id))
        .filter(payments::Column::Status.eq(from))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Apply a gateway callback exactly once per reference id.
///
/// Anything that cannot be matched to a still-pending payment of this gateway
/// (malformed payload, unknown or already resolved reference) is answered with
/// [`AppError::PaymentUnresolved`] and leaves all state untouched.
pub async fn handle_callback(
    state: &AppState,
    kind: GatewayKind,
    payload: CallbackPayload,
) -> AppResult<ApiResponse<Payment>> {
    let Some(gateway) = state.gateways.get(kind) else {
        tracing::warn!(gateway = %kind, "callback for unconfigured gateway");
        return Err(AppError::PaymentUnresolved);
    };
    let outcome = gateway.classify(&payload).map_err(|err| {
        tracing::warn!(gateway = %kind, error = %err, "malformed payment callback");
        AppError::PaymentUnresolved
    })?;
    let now = state.clock.now_fixed();

    let txn = state.orm.begin().await?;
    let Some(payment) = Payments::find()
        .filter(
            Condition::all()
                .add(payments::Column::ReferenceId.eq(outcome.reference_id.as_str()))
                .add(payments::Column::Gateway.eq(kind))
                .add(payments::Column::Status.eq(PaymentStatus::Pending)),
        )
        .one(&txn)
        .await?
    else {
        tracing::warn!(
            gateway = %kind,
            reference_id = %outcome.reference_id,
            "callback matched no pending payment"
        );
        return Err(AppError::PaymentUnresolved);
    };

    // Success callbacks for two payments of one order queue here, so the
    // second one sees the first as successful.
    Orders::find_by_id(payment.order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let (status, resolution, message) = if !outcome.success {
        (
            PaymentStatus::Failed,
            Resolution {
                transaction_id: outcome.transaction_id.clone(),
                details: outcome.details.clone(),
                paid: false,
            },
            "Payment failed",
        )
    } else if has_successful_payment(&txn, payment.order_id, Some(payment.id)).await? {
        let mut details = outcome.details.clone();
        if let Some(map) = details.as_object_mut() {
            map.insert("error".into(), json!("duplicate_payment"));
        }
        (
            PaymentStatus::Failed,
            Resolution {
                transaction_id: outcome.transaction_id.clone(),
                details,
                paid: false,
            },
            "Order was already paid",
        )
    } else {
        (
            PaymentStatus::Successful,
            Resolution {
                transaction_id: outcome.transaction_id.clone(),
                details: outcome.details.clone(),
                paid: true,
            },
            "Payment successful",
        )
    };

    let resolved = transition(
        &txn,
        payment.id,
        PaymentStatus::Pending,
        status,
        resolution,
        now,
    )
    .await?;
    if !resolved {
        tracing::warn!(
            gateway = %kind,
            reference_id = %outcome.reference_id,
            "callback lost the race for a pending payment"
        );
        return Err(AppError::PaymentUnresolved);
    }

    if status == PaymentStatus::Successful {
        let paid = Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(OrderStatus::Paid))
            .col_expr(orders::Column::UpdatedAt, Expr::value(now))
            .filter(orders::Column::Id.eq(payment.order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Pending))
            .exec(&txn)
            .await?;
        if paid.rows_affected == 0 {
            tracing::warn!(
                order_id = %payment.order_id,
                payment_id = %payment.id,
                "payment succeeded for an order that is no longer pending"
            );
        }
    }

    let payment = Payments::find_by_id(payment.id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    txn.commit().await?;

    if payment.status == PaymentStatus::Successful {
        tracing::info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            gateway = %kind,
            "payment successful"
        );
    } else {
        tracing::warn!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            gateway = %kind,
            "payment failed"
        );
    }
    audit::record(
        state,
        Some(payment.user_id),
        "payment_resolved",
        "payments",
        Some(payment.id),
        json!({ "status": payment.status, "gateway": kind, "order_id": payment.order_id }),
    )
    .await;

    Ok(ApiResponse::success(
        message,
        Payment::from(payment),
        Some(Meta::empty()),
    ))
}

/// The caller's payments, newest first.
pub async fn list_payments(
    state: &AppState,
    user: &AuthUser,
    query: PaymentListQuery,
) -> AppResult<ApiResponse<PaymentList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(payments::Column::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(payments::Column::Status.eq(status));
    }

    let finder = Payments::find()
        .filter(condition)
        .order_by_desc(payments::Column::CreatedAt)
        .order_by_asc(payments::Column::Id);
    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(limit)
        .offset(offset)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Payment::from)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        PaymentList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_payment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Payment>> {
    let payment = Payments::find_by_id(id)
        .filter(payments::Column::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success(
        "OK",
        Payment::from(payment),
        Some(Meta::empty()),
    ))
}

/// Admin-only: record that a successful payment was refunded out of band.
pub async fn mark_refunded(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
    payload: RefundRequest,
) -> AppResult<ApiResponse<Payment>> {
    ensure_admin(admin)?;
    let now = state.clock.now_fixed();

    let txn = state.orm.begin().await?;
    let payment = Payments::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut details = payment.details.clone().unwrap_or_else(|| json!({}));
    if let Some(map) = details.as_object_mut() {
        map.insert(
            "refund".into(),
            json!({ "note": payload.note, "by": admin.user_id, "at": now }),
        );
    }
    let refunded = transition(
        &txn,
        payment.id,
        PaymentStatus::Successful,
        PaymentStatus::Refunded,
        Resolution {
            transaction_id: None,
            details,
            paid: false,
        },
        now,
    )
    .await?;
    if !refunded {
        return Err(AppError::conflict("Only successful payments can be refunded"));
    }

    let payment = Payments::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    txn.commit().await?;

    tracing::info!(payment_id = %id, admin_id = %admin.user_id, "payment marked refunded");
    audit::record(
        state,
        Some(admin.user_id),
        "payment_refunded",
        "payments",
        Some(id),
        json!({ "note": payload.note }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment refunded",
        Payment::from(payment),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_ids_are_long_and_alphanumeric() {
        let reference = generate_reference_id();
        assert_eq!(reference.len(), REFERENCE_ID_LEN);
        assert!(reference.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(reference, generate_reference_id());
    }
}
