//! API views of the stored entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    coupons, discounts, order_items, order_vendor_statuses, orders, payments, products,
    sea_orm_active_enums::{DiscountKind, GatewayKind, OrderStatus, PaymentStatus, VendorStatus},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_price: i64,
    pub coupon_id: Option<Uuid>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            subtotal: model.subtotal,
            discount_amount: model.discount_amount,
            total_price: model.total_price,
            coupon_id: model.coupon_id,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            vendor_id: model.vendor_id,
            quantity: model.quantity,
            unit_price: model.unit_price,
            subtotal: model.subtotal,
            discount_amount: model.discount_amount,
            total_price: model.total_price,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VendorOrderStatus {
    pub id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub status: VendorStatus,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<order_vendor_statuses::Model> for VendorOrderStatus {
    fn from(model: order_vendor_statuses::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            vendor_id: model.vendor_id,
            status: model.status,
            notes: model.notes,
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    /// Minor units for fixed coupons, hundredths of a percent otherwise.
    pub value: i64,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    pub vendor_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub usage_limit: Option<i32>,
    pub usage_limit_per_user: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<coupons::Model> for Coupon {
    fn from(model: coupons::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            name: model.name,
            description: model.description,
            kind: model.kind,
            value: model.value,
            min_order_amount: model.min_order_amount,
            max_discount_amount: model.max_discount_amount,
            vendor_id: model.vendor_id,
            product_id: model.product_id,
            usage_limit: model.usage_limit,
            usage_limit_per_user: model.usage_limit_per_user,
            used_count: model.used_count,
            is_active: model.is_active,
            starts_at: model.starts_at.map(|dt| dt.with_timezone(&Utc)),
            expires_at: model.expires_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub status: PaymentStatus,
    pub gateway: GatewayKind,
    pub reference_id: String,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<payments::Model> for Payment {
    fn from(model: payments::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            user_id: model.user_id,
            amount: model.amount,
            status: model.status,
            gateway: model.gateway,
            reference_id: model.reference_id,
            transaction_id: model.transaction_id,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            details: model.details,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(model: products::Model, vendor_name: String) -> Self {
        Self {
            id: model.id,
            vendor_id: model.vendor_id,
            vendor_name,
            name: model.name,
            description: model.description,
            price: model.price,
            stock: model.stock,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Discount {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: i64,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    pub vendor_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<discounts::Model> for Discount {
    fn from(model: discounts::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            kind: model.kind,
            value: model.value,
            min_order_amount: model.min_order_amount,
            max_discount_amount: model.max_discount_amount,
            vendor_id: model.vendor_id,
            product_id: model.product_id,
            is_active: model.is_active,
            starts_at: model.starts_at.map(|dt| dt.with_timezone(&Utc)),
            expires_at: model.expires_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
