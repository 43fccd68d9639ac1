use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::coupons::{check_offer_terms, checked_name},
    entity::sea_orm_active_enums::DiscountKind,
    error::AppResult,
    models::Discount,
};

/// Body for creating a vendor discount or replacing one's definition.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DiscountRequest {
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    /// Minor units for fixed discounts, hundredths of a percent otherwise.
    pub value: i64,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    /// Restrict to one of the vendor's products; otherwise the whole shop.
    pub product_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscountFields {
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: i64,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    pub product_id: Option<Uuid>,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DiscountRequest {
    pub fn validate(self) -> AppResult<DiscountFields> {
        let name = checked_name(&self.name)?;
        check_offer_terms(
            self.kind,
            self.value,
            self.min_order_amount,
            self.max_discount_amount,
            self.starts_at,
            self.expires_at,
        )?;
        Ok(DiscountFields {
            name,
            description: self.description.filter(|d| !d.trim().is_empty()),
            kind: self.kind,
            value: self.value,
            min_order_amount: self.min_order_amount,
            max_discount_amount: self.max_discount_amount,
            product_id: self.product_id,
            is_active: self.is_active.unwrap_or(true),
            starts_at: self.starts_at,
            expires_at: self.expires_at,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountList {
    pub items: Vec<Discount>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DiscountOffer {
    pub discount_id: Uuid,
    pub name: String,
    pub kind: DiscountKind,
    pub value: i64,
    pub discount_amount: i64,
    pub final_price: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductDiscounts {
    pub product_id: Uuid,
    pub price: i64,
    pub discounts: Vec<DiscountOffer>,
    /// Lowest price any single active discount yields.
    pub best_price: i64,
}
