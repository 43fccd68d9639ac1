pub mod cart_service;
pub mod checkout_service;
pub mod coupon_service;
pub mod discount_service;
pub mod order_service;
pub mod payment_service;
pub mod product_service;
pub mod vendor_service;
