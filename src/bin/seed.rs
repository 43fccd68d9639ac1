use chrono::{Duration, Utc};
use marketplace_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        Coupons, Discounts, Products, Users, Vendors, coupons, discounts, products,
        sea_orm_active_enums::DiscountKind, users, vendors,
    },
    middleware::auth::{AuthUser, issue_token},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "Admin", "09120000000", "admin").await?;
    let customer_id = ensure_user(&orm, "Customer", "09120000001", "user").await?;
    let vendor_user_id = ensure_user(&orm, "Vendor Owner", "09120000002", "vendor").await?;
    let vendor_id = ensure_vendor(&orm, vendor_user_id, "Ferris Goods").await?;
    seed_products(&orm, vendor_id).await?;
    seed_coupon(&orm).await?;
    seed_discount(&orm, vendor_id).await?;

    let ttl = Duration::days(7);
    let tokens = [
        ("admin", AuthUser {
            user_id: admin_id,
            role: "admin".into(),
            vendor_id: None,
        }),
        ("customer", AuthUser::customer(customer_id)),
        ("vendor", AuthUser {
            user_id: vendor_user_id,
            role: "vendor".into(),
            vendor_id: Some(vendor_id),
        }),
    ];
    for (label, user) in tokens {
        let token = issue_token(&config.jwt_secret, &user, ttl)?;
        println!("{label} token: {token}");
    }

    println!("Seed completed. Vendor ID: {vendor_id}");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    name: &str,
    phone: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(users::Column::Phone.eq(phone))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        phone: Set(phone.to_string()),
        role: Set(role.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(orm)
    .await?;
    Ok(user.id)
}

async fn ensure_vendor(
    orm: &DatabaseConnection,
    user_id: Uuid,
    name: &str,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Vendors::find()
        .filter(vendors::Column::UserId.eq(user_id))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let vendor = vendors::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        name: Set(name.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(orm)
    .await?;
    Ok(vendor.id)
}

async fn seed_products(orm: &DatabaseConnection, vendor_id: Uuid) -> anyhow::Result<()> {
    let products = vec![
        ("Axum Hoodie", "Warm hoodie for Rustaceans", 550000, 50),
        ("Ferris Mug", "Coffee tastes better with Ferris", 120000, 100),
        ("Rust Sticker Pack", "Decorate your laptop", 50000, 200),
        ("E-book: Async Rust", "Learn async Rust patterns", 250000, 75),
    ];

    for (name, desc, price, stock) in products {
        let exists = Products::find()
            .filter(products::Column::VendorId.eq(vendor_id))
            .filter(products::Column::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }
        products::ActiveModel {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor_id),
            name: Set(name.to_string()),
            description: Set(Some(desc.to_string())),
            price: Set(price),
            stock: Set(stock),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}

async fn seed_coupon(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let code = "WELCOME20";
    let exists = Coupons::find()
        .filter(coupons::Column::Code.eq(code))
        .one(orm)
        .await?
        .is_some();
    if exists {
        return Ok(());
    }

    coupons::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        name: Set("Welcome 20%".to_string()),
        description: Set(Some("20% off, once per customer".to_string())),
        kind: Set(DiscountKind::Percentage),
        value: Set(2000),
        min_order_amount: Set(None),
        max_discount_amount: Set(Some(200000)),
        vendor_id: Set(None),
        product_id: Set(None),
        usage_limit: Set(Some(1000)),
        usage_limit_per_user: Set(Some(1)),
        used_count: Set(0),
        is_active: Set(true),
        starts_at: Set(None),
        expires_at: Set(None),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(orm)
    .await?;

    println!("Seeded coupon {code}");
    Ok(())
}

async fn seed_discount(orm: &DatabaseConnection, vendor_id: Uuid) -> anyhow::Result<()> {
    let name = "Ferris Goods launch week";
    let exists = Discounts::find()
        .filter(discounts::Column::Name.eq(name))
        .one(orm)
        .await?
        .is_some();
    if exists {
        return Ok(());
    }

    let now = Utc::now().fixed_offset();
    discounts::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        kind: Set(DiscountKind::Percentage),
        value: Set(1000),
        min_order_amount: Set(None),
        max_discount_amount: Set(None),
        vendor_id: Set(Some(vendor_id)),
        product_id: Set(None),
        is_active: Set(true),
        starts_at: Set(Some(now)),
        expires_at: Set(Some(now + Duration::days(7))),
        created_at: Set(now),
    }
    .insert(orm)
    .await?;

    println!("Seeded discount");
    Ok(())
}
