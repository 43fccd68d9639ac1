use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::coupons::checked_name,
    error::{AppError, AppResult},
    models::Product,
};

#[derive(Deserialize)]
struct CreateProductFields {
    name: String,
    description: Option<String>,
    price: i64,
    stock: i32,
}

/// A product listing a vendor adds to their shop. Price is in minor units.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(try_from = "CreateProductFields")]
pub struct CreateProductRequest {
    name: String,
    description: Option<String>,
    price: i64,
    stock: i32,
}

impl CreateProductRequest {
    pub fn new(
        name: &str,
        description: Option<String>,
        price: i64,
        stock: i32,
    ) -> AppResult<Self> {
        let name = checked_name(name)?;
        if price < 0 {
            return Err(AppError::bad_request("price cannot be negative"));
        }
        if stock < 0 {
            return Err(AppError::bad_request("stock cannot be negative"));
        }
        Ok(Self {
            name,
            description: description.filter(|d| !d.trim().is_empty()),
            price,
            stock,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn price(&self) -> i64 {
        self.price
    }

    pub fn stock(&self) -> i32 {
        self.stock
    }
}

impl TryFrom<CreateProductFields> for CreateProductRequest {
    type Error = AppError;

    fn try_from(fields: CreateProductFields) -> AppResult<Self> {
        Self::new(&fields.name, fields.description, fields.price, fields.stock)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn negative_price_or_stock_is_rejected() {
        assert!(CreateProductRequest::new("Mug", None, -1, 3).is_err());
        assert!(CreateProductRequest::new("Mug", None, 100, -3).is_err());
        assert!(CreateProductRequest::new("", None, 100, 3).is_err());
        assert!(
            serde_json::from_value::<CreateProductRequest>(
                json!({ "name": "Mug", "price": -5, "stock": 1 })
            )
            .is_err()
        );
    }

    #[test]
    fn free_items_without_stock_are_allowed() {
        let request: CreateProductRequest =
            serde_json::from_value(json!({ "name": " Sticker ", "price": 0, "stock": 0 }))
                .expect("valid body");
        assert_eq!(request.name(), "Sticker");
        assert_eq!(request.price(), 0);
    }
}
