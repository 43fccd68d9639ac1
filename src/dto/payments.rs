use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{entity::sea_orm_active_enums::GatewayKind, gateways::Redirect, models::Payment};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    pub gateway: GatewayKind,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentRedirect {
    pub payment: Payment,
    pub redirect: Redirect,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentList {
    pub items: Vec<Payment>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RefundRequest {
    pub note: Option<String>,
}
