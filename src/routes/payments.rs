use axum::{
    Form, Json, Router,
    extract::{
        Path, Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    routing::{get, post},
};
use sea_orm::Iterable;
use uuid::Uuid;

use crate::{
    dto::payments::{CreatePaymentRequest, PaymentList, PaymentRedirect, RefundRequest},
    entity::sea_orm_active_enums::GatewayKind,
    error::{AppError, AppResult},
    gateways::CallbackPayload,
    middleware::auth::AuthUser,
    models::Payment,
    response::ApiResponse,
    routes::params::PaymentListQuery,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments).post(create_payment))
        .route("/{id}", get(get_payment))
        .route("/{id}/refund", post(mark_refunded))
        .route(
            "/callback/{gateway}",
            get(callback_query).post(callback_form),
        )
}

/// Unknown gateway names are answered like unknown references.
fn parse_gateway(name: &str) -> AppResult<GatewayKind> {
    GatewayKind::iter()
        .find(|kind| kind.to_string() == name)
        .ok_or_else(|| {
            tracing::warn!(gateway = %name, "callback for unknown gateway");
            AppError::PaymentUnresolved
        })
}

/// A callback body or query string we cannot read gets the same reply as an
/// unknown reference.
fn readable<T>(
    gateway: &str,
    part: &'static str,
    extracted: Result<T, impl std::fmt::Display>,
) -> AppResult<T> {
    extracted.map_err(|rejection| {
        tracing::warn!(%gateway, part, error = %rejection, "unreadable payment callback");
        AppError::PaymentUnresolved
    })
}

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Pending payment and gateway redirect", body = ApiResponse<PaymentRedirect>),
        (status = 400, description = "Unsupported gateway"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order already paid or cancelled")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> AppResult<Json<ApiResponse<PaymentRedirect>>> {
    Ok(Json(
        payment_service::create_payment(&state, &user, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/payments",
    params(PaymentListQuery),
    responses(
        (status = 200, description = "Payments of the current user, newest first", body = ApiResponse<PaymentList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PaymentListQuery>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    Ok(Json(
        payment_service::list_payments(&state, &user, query).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = ApiResponse<Payment>),
        (status = 404, description = "Payment not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    Ok(Json(payment_service::get_payment(&state, &user, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/payments/{id}/refund",
    params(("id" = Uuid, Path, description = "Payment ID")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Payment marked refunded", body = ApiResponse<Payment>),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Payment is not successful")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn mark_refunded(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    Ok(Json(
        payment_service::mark_refunded(&state, &admin, id, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/payments/callback/{gateway}",
    params(
        ("gateway" = GatewayKind, Path, description = "Gateway that issued the callback"),
        ("reference_id" = String, Query, description = "Reference embedded in the callback URL")
    ),
    responses(
        (status = 200, description = "Payment resolved", body = ApiResponse<Payment>),
        (status = 404, description = "Payment not found or already processed")
    ),
    security(()),
    tag = "Payments"
)]
pub async fn callback_query(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    query: Result<Query<CallbackPayload>, QueryRejection>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let kind = parse_gateway(&gateway)?;
    let Query(payload) = readable(&gateway, "query", query)?;
    Ok(Json(
        payment_service::handle_callback(&state, kind, payload).await?,
    ))
}

/// Form-posted callbacks. Query parameters we put in the callback URL take
/// precedence over posted fields of the same name.
#[utoipa::path(
    post,
    path = "/api/payments/callback/{gateway}",
    params(
        ("gateway" = GatewayKind, Path, description = "Gateway that issued the callback"),
        ("reference_id" = String, Query, description = "Reference embedded in the callback URL")
    ),
    responses(
        (status = 200, description = "Payment resolved", body = ApiResponse<Payment>),
        (status = 404, description = "Payment not found or already processed")
    ),
    security(()),
    tag = "Payments"
)]
pub async fn callback_form(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    query: Result<Query<CallbackPayload>, QueryRejection>,
    form: Result<Form<CallbackPayload>, FormRejection>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let kind = parse_gateway(&gateway)?;
    let Query(query) = readable(&gateway, "query", query)?;
    let Form(mut payload) = readable(&gateway, "body", form)?;
    payload.0.extend(query.0);
    Ok(Json(
        payment_service::handle_callback(&state, kind, payload).await?,
    ))
}
