#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use marketplace_api::{
    clock::FixedClock,
    config::{AppConfig, GatewayConfig},
    db::{create_orm_conn, run_migrations},
    dto::cart::AddToCartRequest,
    entity::{
        Products, coupons, products, sea_orm_active_enums::DiscountKind, users, vendors,
    },
    middleware::auth::{AuthUser, Identity, VendorUser},
    services::cart_service,
    state::AppState,
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 8, 12, 0, 0).unwrap()
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 3000,
        jwt_secret: "test-secret".into(),
        public_base_url: "http://shop.test".into(),
        gateways: GatewayConfig::default(),
    }
}

/// Fresh in-memory database with the schema applied and the clock pinned.
pub async fn setup_state() -> anyhow::Result<AppState> {
    let config = test_config();
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    Ok(AppState::new(orm, &config)?.with_clock(FixedClock(now())))
}

pub async fn create_user(state: &AppState, name: &str, role: &str) -> anyhow::Result<AuthUser> {
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        phone: Set(format!("0912{}", &Uuid::new_v4().simple().to_string()[..7])),
        role: Set(role.to_string()),
        created_at: Set(now().fixed_offset()),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
        vendor_id: None,
    })
}

pub async fn create_customer(state: &AppState, name: &str) -> anyhow::Result<AuthUser> {
    create_user(state, name, "user").await
}

pub async fn create_vendor(state: &AppState, name: &str) -> anyhow::Result<VendorUser> {
    let owner = create_user(state, &format!("{name} owner"), "vendor").await?;
    let vendor = vendors::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(owner.user_id),
        name: Set(name.to_string()),
        created_at: Set(now().fixed_offset()),
    }
    .insert(&state.orm)
    .await?;

    Ok(VendorUser {
        user: AuthUser {
            vendor_id: Some(vendor.id),
            ..owner
        },
        vendor_id: vendor.id,
    })
}

pub async fn create_product(
    state: &AppState,
    vendor: &VendorUser,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<products::Model> {
    Ok(products::ActiveModel {
        id: Set(Uuid::new_v4()),
        vendor_id: Set(vendor.vendor_id),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        stock: Set(stock),
        created_at: Set(now().fixed_offset()),
    }
    .insert(&state.orm)
    .await?)
}

pub async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .expect("product exists");
    Ok(product.stock)
}

/// A global coupon with no limits; tweak the returned model via `customize`.
pub async fn create_coupon(
    state: &AppState,
    code: &str,
    kind: DiscountKind,
    value: i64,
    customize: impl FnOnce(&mut coupons::ActiveModel),
) -> anyhow::Result<coupons::Model> {
    let mut coupon = coupons::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        name: Set(code.to_string()),
        description: Set(None),
        kind: Set(kind),
        value: Set(value),
        min_order_amount: Set(None),
        max_discount_amount: Set(None),
        vendor_id: Set(None),
        product_id: Set(None),
        usage_limit: Set(None),
        usage_limit_per_user: Set(None),
        used_count: Set(0),
        is_active: Set(true),
        starts_at: Set(None),
        expires_at: Set(None),
        created_at: Set(now().fixed_offset()),
    };
    customize(&mut coupon);
    Ok(coupon.insert(&state.orm).await?)
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    product: &products::Model,
    quantity: i32,
) -> anyhow::Result<()> {
    cart_service::add_item(
        state,
        &Identity::User(user.clone()),
        AddToCartRequest::new(product.id, quantity)?,
    )
    .await?;
    Ok(())
}
