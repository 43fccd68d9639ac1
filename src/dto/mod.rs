pub mod cart;
pub mod coupons;
pub mod discounts;
pub mod orders;
pub mod payments;
pub mod products;
