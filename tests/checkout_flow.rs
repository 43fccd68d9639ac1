mod common;

use marketplace_api::{
    dto::cart::ApplyCouponRequest,
    entity::{
        CouponUsages, Coupons, Orders,
        sea_orm_active_enums::{DiscountKind, OrderStatus, VendorStatus},
    },
    error::AppError,
    middleware::auth::Identity,
    services::{cart_service, checkout_service, coupon_service},
};
use sea_orm::{EntityTrait, PaginatorTrait, Set};

use common::{
    add_to_cart, create_coupon, create_customer, create_product, create_vendor, setup_state,
    stock_of,
};

fn code(code: &str) -> ApplyCouponRequest {
    ApplyCouponRequest::new(code).expect("well-formed code")
}

#[tokio::test]
async fn coupon_checkout_snapshots_prices_and_reserves_stock() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Sara").await?;
    let vendor = create_vendor(&state, "Ferris Goods").await?;
    let a = create_product(&state, &vendor, "Mug", 100, 10).await?;
    let b = create_product(&state, &vendor, "Hoodie", 200, 5).await?;
    let coupon = create_coupon(&state, "SAVE20", DiscountKind::Percentage, 2_000, |_| {}).await?;

    add_to_cart(&state, &customer, &a, 2).await?;
    add_to_cart(&state, &customer, &b, 1).await?;
    let view = coupon_service::apply_to_cart(&state, &customer, code("save20"))
        .await?
        .into_data()
        .expect("cart view");
    assert_eq!(view.subtotal, 400);
    assert_eq!(view.discount, 80);
    assert_eq!(view.total, 320);
    assert_eq!(view.coupon_code.as_deref(), Some("SAVE20"));

    let detail = checkout_service::checkout(&state, &customer)
        .await?
        .into_data()
        .expect("order detail");

    assert_eq!(detail.order.subtotal, 400);
    assert_eq!(detail.order.discount_amount, 80);
    assert_eq!(detail.order.total_price, 320);
    assert_eq!(detail.order.status, OrderStatus::Pending);
    assert_eq!(detail.order.coupon_id, Some(coupon.id));
    assert_eq!(detail.vendor_statuses.len(), 1);
    assert_eq!(detail.vendor_statuses[0].status, VendorStatus::Pending);
    assert_eq!(
        detail.items.iter().map(|item| item.total_price).sum::<i64>(),
        320
    );

    assert_eq!(stock_of(&state, a.id).await?, 8);
    assert_eq!(stock_of(&state, b.id).await?, 4);

    let coupon = Coupons::find_by_id(coupon.id)
        .one(&state.orm)
        .await?
        .expect("coupon");
    assert_eq!(coupon.used_count, 1);
    assert_eq!(CouponUsages::find().count(&state.orm).await?, 1);

    // The cart was consumed; the next access starts empty.
    let cart = cart_service::get_cart(&state, &Identity::User(customer.clone()))
        .await?
        .into_data()
        .expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.coupon_code, None);
    Ok(())
}

#[tokio::test]
async fn shortage_rejects_whole_checkout_and_lists_every_short_item() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Ali").await?;
    let vendor = create_vendor(&state, "Bits").await?;
    let scarce = create_product(&state, &vendor, "Scarce", 100, 2).await?;
    let gone = create_product(&state, &vendor, "Gone", 50, 1).await?;
    let plenty = create_product(&state, &vendor, "Plenty", 10, 100).await?;

    add_to_cart(&state, &customer, &scarce, 3).await?;
    add_to_cart(&state, &customer, &gone, 5).await?;
    add_to_cart(&state, &customer, &plenty, 1).await?;

    let preview = checkout_service::preview(&state, &Identity::User(customer.clone()))
        .await?
        .into_data()
        .expect("preview");
    assert!(!preview.can_checkout);
    assert_eq!(preview.out_of_stock_items.len(), 2);

    match checkout_service::checkout(&state, &customer).await {
        Err(AppError::OutOfStock(items)) => {
            assert_eq!(items.len(), 2);
            let scarce_line = items
                .iter()
                .find(|item| item.product_id == scarce.id)
                .expect("scarce reported");
            assert_eq!(scarce_line.requested_quantity, 3);
            assert_eq!(scarce_line.available_stock, 2);
            assert!(items.iter().any(|item| item.product_id == gone.id));
        }
        other => panic!("expected out of stock, got {other:?}"),
    }

    assert_eq!(Orders::find().count(&state.orm).await?, 0);
    assert_eq!(stock_of(&state, scarce.id).await?, 2);
    assert_eq!(stock_of(&state, gone.id).await?, 1);
    assert_eq!(stock_of(&state, plenty.id).await?, 100);

    let cart = cart_service::get_cart(&state, &Identity::User(customer))
        .await?
        .into_data()
        .expect("cart");
    assert_eq!(cart.items.len(), 3);
    Ok(())
}

#[tokio::test]
async fn multi_vendor_items_reconcile_with_order_total() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Neda").await?;
    let north = create_vendor(&state, "North").await?;
    let south = create_vendor(&state, "South").await?;
    let p1 = create_product(&state, &north, "One", 333, 10).await?;
    let p2 = create_product(&state, &north, "Two", 333, 10).await?;
    let p3 = create_product(&state, &south, "Three", 334, 10).await?;
    create_coupon(&state, "TAKE100", DiscountKind::Fixed, 100, |_| {}).await?;

    for product in [&p1, &p2, &p3] {
        add_to_cart(&state, &customer, product, 1).await?;
    }
    coupon_service::apply_to_cart(&state, &customer, code("TAKE100")).await?;

    let detail = checkout_service::checkout(&state, &customer)
        .await?
        .into_data()
        .expect("order detail");

    assert_eq!(detail.order.subtotal, 1_000);
    assert_eq!(detail.order.discount_amount, 100);
    assert_eq!(detail.order.total_price, 900);
    assert_eq!(detail.vendor_statuses.len(), 2);
    assert_eq!(
        detail.items.iter().map(|item| item.total_price).sum::<i64>(),
        detail.order.total_price
    );
    assert_eq!(
        detail
            .items
            .iter()
            .map(|item| item.discount_amount)
            .sum::<i64>(),
        detail.order.discount_amount
    );
    for item in &detail.items {
        assert_eq!(item.total_price, item.subtotal - item.discount_amount);
    }
    Ok(())
}

#[tokio::test]
async fn per_user_limit_blocks_second_use() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Reza").await?;
    let vendor = create_vendor(&state, "Once").await?;
    let product = create_product(&state, &vendor, "Widget", 500, 10).await?;
    create_coupon(&state, "ONCE", DiscountKind::Fixed, 50, |coupon| {
        coupon.usage_limit_per_user = Set(Some(1));
    })
    .await?;

    add_to_cart(&state, &customer, &product, 1).await?;
    coupon_service::apply_to_cart(&state, &customer, code("ONCE")).await?;
    checkout_service::checkout(&state, &customer).await?;

    add_to_cart(&state, &customer, &product, 1).await?;
    match coupon_service::apply_to_cart(&state, &customer, code("ONCE")).await {
        Err(AppError::Conflict(message)) => {
            assert_eq!(message, "This coupon is not valid or has expired");
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn global_limit_admits_exactly_one_checkout() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let first = create_customer(&state, "First").await?;
    let second = create_customer(&state, "Second").await?;
    let vendor = create_vendor(&state, "Limited").await?;
    let product = create_product(&state, &vendor, "Widget", 500, 10).await?;
    let coupon = create_coupon(&state, "LAST1", DiscountKind::Percentage, 1_000, |coupon| {
        coupon.usage_limit = Set(Some(1));
    })
    .await?;

    for customer in [&first, &second] {
        add_to_cart(&state, customer, &product, 1).await?;
        coupon_service::apply_to_cart(&state, customer, code("LAST1")).await?;
    }

    let placed = checkout_service::checkout(&state, &first)
        .await?
        .into_data()
        .expect("order");
    assert_eq!(placed.order.total_price, 450);

    let rejected = checkout_service::checkout(&state, &second).await;
    assert!(matches!(rejected, Err(AppError::Conflict(_))));

    let coupon = Coupons::find_by_id(coupon.id)
        .one(&state.orm)
        .await?
        .expect("coupon");
    assert_eq!(coupon.used_count, 1);
    assert_eq!(Orders::find().count(&state.orm).await?, 1);
    assert_eq!(stock_of(&state, product.id).await?, 9);
    Ok(())
}

#[tokio::test]
async fn coupon_scope_and_minimum_are_enforced_on_apply() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Mina").await?;
    let vendor = create_vendor(&state, "Scoped").await?;
    let other_vendor = create_vendor(&state, "Elsewhere").await?;
    let product = create_product(&state, &vendor, "Widget", 100, 10).await?;
    create_coupon(&state, "BIGSPEND", DiscountKind::Fixed, 10, |coupon| {
        coupon.min_order_amount = Set(Some(1_000));
    })
    .await?;
    create_coupon(&state, "ELSEWHERE", DiscountKind::Fixed, 10, |coupon| {
        coupon.vendor_id = Set(Some(other_vendor.vendor_id));
    })
    .await?;

    assert!(matches!(
        coupon_service::apply_to_cart(&state, &customer, code("BIGSPEND")).await,
        Err(AppError::BadRequest(_))
    ));

    add_to_cart(&state, &customer, &product, 1).await?;
    assert!(matches!(
        coupon_service::apply_to_cart(&state, &customer, code("BIGSPEND")).await,
        Err(AppError::Conflict(message)) if message.contains("minimum order amount")
    ));
    assert!(matches!(
        coupon_service::apply_to_cart(&state, &customer, code("ELSEWHERE")).await,
        Err(AppError::Conflict(message)) if message.contains("Elsewhere")
    ));
    assert!(matches!(
        coupon_service::apply_to_cart(&state, &customer, code("NOPE")).await,
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        coupon_service::remove_from_cart(&state, &customer).await,
        Err(AppError::BadRequest(_))
    ));
    Ok(())
}

#[tokio::test]
async fn empty_cart_cannot_check_out() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Empty").await?;
    assert!(matches!(
        checkout_service::checkout(&state, &customer).await,
        Err(AppError::BadRequest(_))
    ));
    Ok(())
}
