use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult, StockShortage};

/// Wire shape of [`AddToCartRequest`] before validation.
#[derive(Deserialize)]
struct AddToCartFields {
    product_id: Uuid,
    quantity: i32,
}

/// Requests are checked while they are built, so a value of this type always
/// carries a positive quantity.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(try_from = "AddToCartFields")]
pub struct AddToCartRequest {
    product_id: Uuid,
    quantity: i32,
}

impl AddToCartRequest {
    pub fn new(product_id: Uuid, quantity: i32) -> AppResult<Self> {
        validate_quantity(quantity)?;
        Ok(Self {
            product_id,
            quantity,
        })
    }

    pub fn product_id(&self) -> Uuid {
        self.product_id
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }
}

impl TryFrom<AddToCartFields> for AddToCartRequest {
    type Error = AppError;

    fn try_from(fields: AddToCartFields) -> AppResult<Self> {
        Self::new(fields.product_id, fields.quantity)
    }
}

#[derive(Deserialize)]
struct UpdateCartItemFields {
    quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(try_from = "UpdateCartItemFields")]
pub struct UpdateCartItemRequest {
    quantity: i32,
}

impl UpdateCartItemRequest {
    pub fn new(quantity: i32) -> AppResult<Self> {
        validate_quantity(quantity)?;
        Ok(Self { quantity })
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }
}

impl TryFrom<UpdateCartItemFields> for UpdateCartItemRequest {
    type Error = AppError;

    fn try_from(fields: UpdateCartItemFields) -> AppResult<Self> {
        Self::new(fields.quantity)
    }
}

fn validate_quantity(quantity: i32) -> AppResult<()> {
    if quantity < 1 {
        return Err(AppError::bad_request("quantity must be at least 1"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct ApplyCouponFields {
    code: String,
}

/// Codes are matched case-insensitively and kept upper-case.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(try_from = "ApplyCouponFields")]
pub struct ApplyCouponRequest {
    code: String,
}

impl ApplyCouponRequest {
    pub fn new(code: &str) -> AppResult<Self> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::bad_request("coupon code is required"));
        }
        if code.len() > 64 {
            return Err(AppError::bad_request("coupon code is too long"));
        }
        Ok(Self {
            code: code.to_uppercase(),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl TryFrom<ApplyCouponFields> for ApplyCouponRequest {
    type Error = AppError;

    fn try_from(fields: ApplyCouponFields) -> AppResult<Self> {
        Self::new(&fields.code)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub vendor_id: Uuid,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
    pub available_stock: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VendorGroup {
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub items: Vec<CartLine>,
    pub subtotal: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartView {
    pub id: Uuid,
    pub coupon_code: Option<String>,
    pub items: Vec<CartLine>,
    pub items_by_vendor: Vec<VendorGroup>,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutPreview {
    pub can_checkout: bool,
    pub cart: CartView,
    pub out_of_stock_items: Vec<StockShortage>,
}
