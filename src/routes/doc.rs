use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{
            AddToCartRequest, ApplyCouponRequest, CartLine, CartView, CheckoutPreview,
            UpdateCartItemRequest, VendorGroup,
        },
        coupons::{CouponList, CouponRequest},
        discounts::{DiscountList, DiscountOffer, DiscountRequest, ProductDiscounts},
        orders::{OrderDetail, OrderList, UpdateVendorStatusRequest, VendorOrder, VendorOrderList},
        payments::{CreatePaymentRequest, PaymentList, PaymentRedirect, RefundRequest},
        products::{CreateProductRequest, ProductList},
    },
    entity::sea_orm_active_enums::{
        DiscountKind, GatewayKind, OrderStatus, PaymentStatus, VendorStatus,
    },
    error::StockShortage,
    gateways::Redirect,
    models::{Coupon, Discount, Order, OrderItem, Payment, Product, VendorOrderStatus},
    response::{ApiResponse, Meta},
    routes::{cart, checkout, discounts, health, orders, params, payments, products, vendor},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        cart::apply_coupon,
        cart::remove_coupon,
        cart::merge_guest_cart,
        checkout::preview,
        checkout::checkout,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        vendor::list_orders,
        vendor::get_order,
        vendor::update_status,
        vendor::list_coupons,
        vendor::create_coupon,
        vendor::get_coupon,
        vendor::update_coupon,
        vendor::delete_coupon,
        vendor::list_products,
        vendor::create_product,
        vendor::list_discounts,
        vendor::create_discount,
        vendor::get_discount,
        vendor::update_discount,
        vendor::delete_discount,
        products::list_products,
        products::get_product,
        payments::create_payment,
        payments::list_payments,
        payments::get_payment,
        payments::mark_refunded,
        payments::callback_query,
        payments::callback_form,
        discounts::list_active,
        discounts::product_discounts
    ),
    components(
        schemas(
            Order,
            OrderItem,
            VendorOrderStatus,
            Coupon,
            Payment,
            Product,
            Discount,
            OrderStatus,
            VendorStatus,
            PaymentStatus,
            DiscountKind,
            GatewayKind,
            StockShortage,
            Redirect,
            AddToCartRequest,
            UpdateCartItemRequest,
            ApplyCouponRequest,
            CartLine,
            VendorGroup,
            CartView,
            CheckoutPreview,
            OrderDetail,
            OrderList,
            VendorOrder,
            VendorOrderList,
            UpdateVendorStatusRequest,
            CouponRequest,
            CouponList,
            CreatePaymentRequest,
            PaymentRedirect,
            PaymentList,
            RefundRequest,
            DiscountOffer,
            ProductDiscounts,
            DiscountRequest,
            DiscountList,
            CreateProductRequest,
            ProductList,
            params::Pagination,
            params::SortOrder,
            params::OrderListQuery,
            params::PaymentListQuery,
            params::ProductQuery,
            params::ProductSortBy,
            Meta,
            ApiResponse<CartView>,
            ApiResponse<OrderDetail>,
            ApiResponse<PaymentRedirect>,
            ApiResponse<Payment>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Discount>,
            ApiResponse<DiscountList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Cart endpoints, for signed-in users and guest sessions"),
        (name = "Checkout", description = "Checkout preview and order placement"),
        (name = "Orders", description = "Customer order endpoints"),
        (name = "Products", description = "Public product catalog"),
        (name = "Vendor", description = "Vendor fulfilment, products, coupons and discounts"),
        (name = "Payments", description = "Payments and gateway callbacks"),
        (name = "Discounts", description = "Active discounts and per-product offers"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
