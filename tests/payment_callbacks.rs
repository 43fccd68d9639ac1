mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use marketplace_api::{
    dto::payments::CreatePaymentRequest,
    entity::{
        Orders, Payments,
        sea_orm_active_enums::{GatewayKind, OrderStatus, PaymentStatus},
    },
    routes::create_api_router,
    services::{checkout_service, payment_service},
    state::AppState,
};
use sea_orm::EntityTrait;
use serde_json::Value;
use tower::ServiceExt;

use common::{add_to_cart, create_customer, create_product, create_vendor, setup_state};

fn app(state: &AppState) -> Router {
    Router::new()
        .nest("/api", create_api_router())
        .with_state(state.clone())
}

async fn send(
    state: &AppState,
    uri: &str,
    content_type: &str,
    body: &'static str,
) -> anyhow::Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))?;
    let response: Response = app(state).oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

/// A pending IDPay payment for a fresh order; returns (order id, reference id).
async fn pending_idpay_payment(state: &AppState) -> anyhow::Result<(uuid::Uuid, String)> {
    let customer = create_customer(state, "Payer").await?;
    let vendor = create_vendor(state, "Shop").await?;
    let product = create_product(state, &vendor, "Widget", 1_000, 5).await?;
    add_to_cart(state, &customer, &product, 1).await?;
    let order_id = checkout_service::checkout(state, &customer)
        .await?
        .into_data()
        .expect("order")
        .order
        .id;
    let created = payment_service::create_payment(
        state,
        &customer,
        CreatePaymentRequest {
            order_id,
            gateway: GatewayKind::Idpay,
        },
    )
    .await?
    .into_data()
    .expect("payment redirect");
    Ok((order_id, created.payment.reference_id))
}

#[tokio::test]
async fn json_callback_gets_generic_not_found_envelope() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let (order_id, reference_id) = pending_idpay_payment(&state).await?;

    let (status, body) = send(
        &state,
        "/api/payments/callback/idpay",
        "application/json",
        r#"{"order_id":"nope","status":"100"}"#,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Payment not found or already processed");

    let (status, _) = send(
        &state,
        "/api/payments/callback/bitpay",
        "application/x-www-form-urlencoded",
        "status=100",
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let payments = Payments::find().all(&state.orm).await?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].reference_id, reference_id);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .expect("order");
    assert_eq!(order.status, OrderStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn form_callback_resolves_with_reference_from_url() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let (order_id, reference_id) = pending_idpay_payment(&state).await?;

    // The posted order_id is ignored in favour of the reference we put in the URL.
    let uri = format!("/api/payments/callback/idpay?reference_id={reference_id}");
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("status=100&track_id=T-77&order_id=forged"))?;
    let response = app(&state).oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["data"]["status"], "successful");
    assert_eq!(body["data"]["transaction_id"], "T-77");

    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .expect("order");
    assert_eq!(order.status, OrderStatus::Paid);
    Ok(())
}
