mod common;

use marketplace_api::{
    dto::payments::{CreatePaymentRequest, RefundRequest},
    entity::{
        Orders, Payments, payments,
        sea_orm_active_enums::{GatewayKind, OrderStatus, PaymentStatus},
    },
    error::AppError,
    gateways::CallbackPayload,
    middleware::auth::AuthUser,
    models::Payment,
    routes::params::PaymentListQuery,
    services::{checkout_service, payment_service},
    state::AppState,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, sea_query::Expr};
use uuid::Uuid;

use common::{add_to_cart, create_customer, create_product, create_user, create_vendor, setup_state};

async fn placed_order(state: &AppState, customer: &AuthUser) -> anyhow::Result<Uuid> {
    let vendor = create_vendor(state, &format!("Vendor {}", Uuid::new_v4())).await?;
    let product = create_product(state, &vendor, "Widget", 1_250, 10).await?;
    add_to_cart(state, customer, &product, 2).await?;
    let detail = checkout_service::checkout(state, customer)
        .await?
        .into_data()
        .expect("order");
    Ok(detail.order.id)
}

async fn start_payment(
    state: &AppState,
    customer: &AuthUser,
    order_id: Uuid,
    gateway: GatewayKind,
) -> anyhow::Result<Payment> {
    let created = payment_service::create_payment(
        state,
        customer,
        CreatePaymentRequest { order_id, gateway },
    )
    .await?
    .into_data()
    .expect("payment redirect");
    Ok(created.payment)
}

fn zarinpal(reference_id: &str, status: &str) -> CallbackPayload {
    [
        ("reference_id", reference_id),
        ("Status", status),
        ("Authority", "A00000000000000000000000000123456789"),
    ]
    .into_iter()
    .collect()
}

async fn order_status(state: &AppState, order_id: Uuid) -> anyhow::Result<OrderStatus> {
    Ok(Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .expect("order")
        .status)
}

#[tokio::test]
async fn create_payment_commits_pending_row_and_redirect() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Payer").await?;
    let order_id = placed_order(&state, &customer).await?;

    let created = payment_service::create_payment(
        &state,
        &customer,
        CreatePaymentRequest {
            order_id,
            gateway: GatewayKind::Idpay,
        },
    )
    .await?
    .into_data()
    .expect("payment redirect");

    assert_eq!(created.payment.status, PaymentStatus::Pending);
    assert_eq!(created.payment.amount, 2_500);
    assert_eq!(created.payment.reference_id.len(), 32);
    assert_eq!(created.redirect.display_amount, "25.00");
    assert!(created.redirect.url.contains(&created.payment.reference_id));
    assert_eq!(Payments::find().count(&state.orm).await?, 1);
    Ok(())
}

#[tokio::test]
async fn successful_callback_pays_order_once() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Payer").await?;
    let order_id = placed_order(&state, &customer).await?;
    let payment = start_payment(&state, &customer, order_id, GatewayKind::Zarinpal).await?;

    let resolved = payment_service::handle_callback(
        &state,
        GatewayKind::Zarinpal,
        zarinpal(&payment.reference_id, "OK"),
    )
    .await?
    .into_data()
    .expect("payment");
    assert_eq!(resolved.status, PaymentStatus::Successful);
    assert!(resolved.paid_at.is_some());
    assert_eq!(
        resolved.transaction_id.as_deref(),
        Some("A00000000000000000000000000123456789")
    );
    assert_eq!(order_status(&state, order_id).await?, OrderStatus::Paid);

    // Gateways retry; the replay must not apply twice.
    let replay = payment_service::handle_callback(
        &state,
        GatewayKind::Zarinpal,
        zarinpal(&payment.reference_id, "OK"),
    )
    .await;
    assert!(matches!(replay, Err(AppError::PaymentUnresolved)));

    let again = payment_service::create_payment(
        &state,
        &customer,
        CreatePaymentRequest {
            order_id,
            gateway: GatewayKind::Payir,
        },
    )
    .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    Ok(())
}

#[tokio::test]
async fn unknown_or_misrouted_callbacks_change_nothing() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Payer").await?;
    let order_id = placed_order(&state, &customer).await?;
    let payment = start_payment(&state, &customer, order_id, GatewayKind::Zarinpal).await?;

    let unknown = payment_service::handle_callback(
        &state,
        GatewayKind::Zarinpal,
        zarinpal("no-such-reference", "OK"),
    )
    .await;
    assert!(matches!(unknown, Err(AppError::PaymentUnresolved)));

    let misrouted: CallbackPayload = [
        ("reference_id", payment.reference_id.as_str()),
        ("status", "1"),
        ("transId", "T-1"),
    ]
    .into_iter()
    .collect();
    let result = payment_service::handle_callback(&state, GatewayKind::Payir, misrouted).await;
    assert!(matches!(result, Err(AppError::PaymentUnresolved)));

    let empty = payment_service::handle_callback(
        &state,
        GatewayKind::Zarinpal,
        CallbackPayload::default(),
    )
    .await;
    assert!(matches!(empty, Err(AppError::PaymentUnresolved)));

    let stored = Payments::find_by_id(payment.id)
        .one(&state.orm)
        .await?
        .expect("payment");
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert_eq!(order_status(&state, order_id).await?, OrderStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn failed_callback_leaves_order_payable() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Payer").await?;
    let order_id = placed_order(&state, &customer).await?;
    let payment = start_payment(&state, &customer, order_id, GatewayKind::Zarinpal).await?;

    let failed = payment_service::handle_callback(
        &state,
        GatewayKind::Zarinpal,
        zarinpal(&payment.reference_id, "NOK"),
    )
    .await?
    .into_data()
    .expect("payment");
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert!(failed.paid_at.is_none());
    assert!(failed.details.expect("details").get("error").is_some());
    assert_eq!(order_status(&state, order_id).await?, OrderStatus::Pending);

    let retry = start_payment(&state, &customer, order_id, GatewayKind::Zarinpal).await?;
    assert_ne!(retry.reference_id, payment.reference_id);
    Ok(())
}

#[tokio::test]
async fn second_success_for_same_order_is_marked_duplicate() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Payer").await?;
    let order_id = placed_order(&state, &customer).await?;
    let first = start_payment(&state, &customer, order_id, GatewayKind::Zarinpal).await?;
    let second = start_payment(&state, &customer, order_id, GatewayKind::Zarinpal).await?;

    payment_service::handle_callback(
        &state,
        GatewayKind::Zarinpal,
        zarinpal(&first.reference_id, "OK"),
    )
    .await?;
    let late = payment_service::handle_callback(
        &state,
        GatewayKind::Zarinpal,
        zarinpal(&second.reference_id, "OK"),
    )
    .await?
    .into_data()
    .expect("payment");

    assert_eq!(late.status, PaymentStatus::Failed);
    assert_eq!(late.details.expect("details")["error"], "duplicate_payment");
    assert_eq!(order_status(&state, order_id).await?, OrderStatus::Paid);

    // Storage refuses a second successful payment for the order outright.
    let forced = Payments::update_many()
        .col_expr(
            payments::Column::Status,
            Expr::value(PaymentStatus::Successful),
        )
        .filter(payments::Column::Id.eq(second.id))
        .exec(&state.orm)
        .await;
    assert!(forced.is_err());
    Ok(())
}

#[tokio::test]
async fn cancelled_order_cannot_be_paid() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Payer").await?;
    let order_id = placed_order(&state, &customer).await?;
    marketplace_api::services::order_service::cancel_order(&state, &customer, order_id).await?;

    let result = payment_service::create_payment(
        &state,
        &customer,
        CreatePaymentRequest {
            order_id,
            gateway: GatewayKind::Zarinpal,
        },
    )
    .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let stranger = create_customer(&state, "Stranger").await?;
    let result = payment_service::create_payment(
        &state,
        &stranger,
        CreatePaymentRequest {
            order_id,
            gateway: GatewayKind::Zarinpal,
        },
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound)));
    Ok(())
}

#[tokio::test]
async fn admin_refunds_only_successful_payments() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Payer").await?;
    let admin = create_user(&state, "Admin", "admin").await?;
    let order_id = placed_order(&state, &customer).await?;
    let payment = start_payment(&state, &customer, order_id, GatewayKind::Zarinpal).await?;

    let pending = payment_service::mark_refunded(
        &state,
        &admin,
        payment.id,
        RefundRequest::default(),
    )
    .await;
    assert!(matches!(pending, Err(AppError::Conflict(_))));

    payment_service::handle_callback(
        &state,
        GatewayKind::Zarinpal,
        zarinpal(&payment.reference_id, "OK"),
    )
    .await?;

    let by_customer = payment_service::mark_refunded(
        &state,
        &customer,
        payment.id,
        RefundRequest::default(),
    )
    .await;
    assert!(matches!(by_customer, Err(AppError::Forbidden)));

    let refunded = payment_service::mark_refunded(
        &state,
        &admin,
        payment.id,
        RefundRequest {
            note: Some("returned goods".into()),
        },
    )
    .await?
    .into_data()
    .expect("payment");
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(
        refunded.details.expect("details")["refund"]["note"],
        "returned goods"
    );

    let history = payment_service::list_payments(
        &state,
        &customer,
        PaymentListQuery {
            status: Some(PaymentStatus::Refunded),
            ..Default::default()
        },
    )
    .await?
    .into_data()
    .expect("payments");
    assert_eq!(history.items.len(), 1);

    let missing = payment_service::get_payment(&state, &admin, payment.id).await;
    assert!(matches!(missing, Err(AppError::NotFound)));
    Ok(())
}
