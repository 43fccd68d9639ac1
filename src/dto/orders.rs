use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::sea_orm_active_enums::{OrderStatus, VendorStatus},
    error::{AppError, AppResult},
    models::{Order, OrderItem, VendorOrderStatus},
};

const MAX_NOTES_LEN: usize = 1000;

/// An order with its items and per-vendor statuses, loaded in one call.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub vendor_statuses: Vec<VendorOrderStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

/// A vendor's slice of a customer order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VendorOrder {
    pub order_id: Uuid,
    pub order_status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub vendor_status: VendorOrderStatus,
    pub items: Vec<OrderItem>,
    pub vendor_total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VendorOrderList {
    pub items: Vec<VendorOrder>,
}

#[derive(Deserialize)]
struct UpdateVendorStatusFields {
    status: VendorStatus,
    notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(try_from = "UpdateVendorStatusFields")]
pub struct UpdateVendorStatusRequest {
    status: VendorStatus,
    notes: Option<String>,
}

impl UpdateVendorStatusRequest {
    pub fn new(status: VendorStatus, notes: Option<String>) -> AppResult<Self> {
        if notes
            .as_deref()
            .is_some_and(|notes| notes.chars().count() > MAX_NOTES_LEN)
        {
            return Err(AppError::bad_request(format!(
                "notes must be at most {MAX_NOTES_LEN} characters"
            )));
        }
        Ok(Self { status, notes })
    }

    pub fn status(&self) -> VendorStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

impl TryFrom<UpdateVendorStatusFields> for UpdateVendorStatusRequest {
    type Error = AppError;

    fn try_from(fields: UpdateVendorStatusFields) -> AppResult<Self> {
        Self::new(fields.status, fields.notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_notes_are_rejected() {
        let notes = "x".repeat(MAX_NOTES_LEN + 1);
        assert!(UpdateVendorStatusRequest::new(VendorStatus::Shipped, Some(notes)).is_err());
        assert!(UpdateVendorStatusRequest::new(VendorStatus::Shipped, None).is_ok());
    }
}
