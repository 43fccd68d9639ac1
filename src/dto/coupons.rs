use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::sea_orm_active_enums::DiscountKind,
    error::{AppError, AppResult},
    models::Coupon,
};

pub const GENERATED_CODE_LEN: usize = 8;

/// Percentages are stored in hundredths, so this is 100%.
const MAX_PERCENTAGE_VALUE: i64 = 10_000;

/// Body for creating a coupon or replacing one's definition.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CouponRequest {
    /// Generated when absent on create; kept as is when absent on update.
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: i64,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    pub product_id: Option<Uuid>,
    pub usage_limit: Option<i32>,
    pub usage_limit_per_user: Option<i32>,
    pub is_active: Option<bool>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A coupon definition that passed every field check.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponFields {
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: i64,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    pub product_id: Option<Uuid>,
    pub usage_limit: Option<i32>,
    pub usage_limit_per_user: Option<i32>,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CouponRequest {
    pub fn validate(self) -> AppResult<CouponFields> {
        let code = match self.code.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(code) => {
                if code.len() > 50 {
                    return Err(AppError::bad_request("code must be at most 50 characters"));
                }
                if !code
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                {
                    return Err(AppError::bad_request(
                        "code may only contain letters, digits, '-' and '_'",
                    ));
                }
                Some(code.to_uppercase())
            }
        };

        let name = checked_name(&self.name)?;
        check_offer_terms(
            self.kind,
            self.value,
            self.min_order_amount,
            self.max_discount_amount,
            self.starts_at,
            self.expires_at,
        )?;
        if self.usage_limit.is_some_and(|limit| limit < 1) {
            return Err(AppError::bad_request("usage_limit must be at least 1"));
        }
        if self.usage_limit_per_user.is_some_and(|limit| limit < 1) {
            return Err(AppError::bad_request(
                "usage_limit_per_user must be at least 1",
            ));
        }

        Ok(CouponFields {
            code,
            name,
            description: self.description.filter(|d| !d.trim().is_empty()),
            kind: self.kind,
            value: self.value,
            min_order_amount: self.min_order_amount,
            max_discount_amount: self.max_discount_amount,
            product_id: self.product_id,
            usage_limit: self.usage_limit,
            usage_limit_per_user: self.usage_limit_per_user,
            is_active: self.is_active.unwrap_or(true),
            starts_at: self.starts_at,
            expires_at: self.expires_at,
        })
    }
}

pub(crate) fn checked_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 255 {
        return Err(AppError::bad_request("name must be 1 to 255 characters"));
    }
    Ok(name.to_string())
}

/// Rules shared by coupons and automatic discounts.
pub(crate) fn check_offer_terms(
    kind: DiscountKind,
    value: i64,
    min_order_amount: Option<i64>,
    max_discount_amount: Option<i64>,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
) -> AppResult<()> {
    if value <= 0 {
        return Err(AppError::bad_request("value must be positive"));
    }
    if kind == DiscountKind::Percentage && value > MAX_PERCENTAGE_VALUE {
        return Err(AppError::bad_request("percentage cannot exceed 100%"));
    }
    if min_order_amount.is_some_and(|amount| amount < 0) {
        return Err(AppError::bad_request("min_order_amount cannot be negative"));
    }
    if max_discount_amount.is_some_and(|amount| amount <= 0) {
        return Err(AppError::bad_request("max_discount_amount must be positive"));
    }
    if let (Some(starts_at), Some(expires_at)) = (starts_at, expires_at) {
        if expires_at < starts_at {
            return Err(AppError::bad_request(
                "expires_at must not be before starts_at",
            ));
        }
    }
    Ok(())
}

pub fn generate_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_CODE_LEN)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponList {
    pub items: Vec<Coupon>,
}
