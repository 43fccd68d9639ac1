pub mod audit_logs;
pub mod cart_items;
pub mod carts;
pub mod coupon_usages;
pub mod coupons;
pub mod discounts;
pub mod order_items;
pub mod order_vendor_statuses;
pub mod orders;
pub mod payments;
pub mod products;
pub mod sea_orm_active_enums;
pub mod users;
pub mod vendors;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use coupon_usages::Entity as CouponUsages;
pub use coupons::Entity as Coupons;
pub use discounts::Entity as Discounts;
pub use order_items::Entity as OrderItems;
pub use order_vendor_statuses::Entity as OrderVendorStatuses;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use products::Entity as Products;
pub use users::Entity as Users;
pub use vendors::Entity as Vendors;
