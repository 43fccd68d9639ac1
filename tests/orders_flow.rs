mod common;

use chrono::Duration;
use marketplace_api::{
    dto::{
        cart::AddToCartRequest,
        orders::UpdateVendorStatusRequest,
    },
    entity::{
        OrderVendorStatuses, discounts, order_vendor_statuses,
        sea_orm_active_enums::{DiscountKind, OrderStatus, VendorStatus},
    },
    error::AppError,
    middleware::auth::Identity,
    routes::params::{OrderListQuery, Pagination},
    services::{cart_service, checkout_service, discount_service, order_service, vendor_service},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use common::{
    add_to_cart, create_customer, create_product, create_vendor, now, setup_state, stock_of,
};

#[tokio::test]
async fn cancellation_restores_stock_and_cancels_every_vendor() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Sara").await?;
    let north = create_vendor(&state, "North").await?;
    let south = create_vendor(&state, "South").await?;
    let a = create_product(&state, &north, "A", 100, 5).await?;
    let b = create_product(&state, &south, "B", 200, 3).await?;

    add_to_cart(&state, &customer, &a, 2).await?;
    add_to_cart(&state, &customer, &b, 3).await?;
    let order = checkout_service::checkout(&state, &customer)
        .await?
        .into_data()
        .expect("order")
        .order;
    assert_eq!(stock_of(&state, a.id).await?, 3);
    assert_eq!(stock_of(&state, b.id).await?, 0);

    let cancelled = order_service::cancel_order(&state, &customer, order.id)
        .await?
        .into_data()
        .expect("detail");
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert!(
        cancelled
            .vendor_statuses
            .iter()
            .all(|status| status.status == VendorStatus::Cancelled)
    );
    assert_eq!(stock_of(&state, a.id).await?, 5);
    assert_eq!(stock_of(&state, b.id).await?, 3);

    let again = order_service::cancel_order(&state, &customer, order.id).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let stranger = create_customer(&state, "Stranger").await?;
    let foreign = order_service::cancel_order(&state, &stranger, order.id).await;
    assert!(matches!(foreign, Err(AppError::NotFound)));
    Ok(())
}

#[tokio::test]
async fn vendor_statuses_aggregate_into_order_status() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Ali").await?;
    let north = create_vendor(&state, "North").await?;
    let south = create_vendor(&state, "South").await?;
    let outsider = create_vendor(&state, "Outsider").await?;
    let a = create_product(&state, &north, "A", 100, 5).await?;
    let b = create_product(&state, &south, "B", 200, 5).await?;

    add_to_cart(&state, &customer, &a, 1).await?;
    add_to_cart(&state, &customer, &b, 1).await?;
    let order_id = checkout_service::checkout(&state, &customer)
        .await?
        .into_data()
        .expect("order")
        .order
        .id;

    let shipped = vendor_service::update_status(
        &state,
        &north,
        order_id,
        UpdateVendorStatusRequest::new(VendorStatus::Shipped, Some("tracking 42".into()))?,
    )
    .await?
    .into_data()
    .expect("vendor order");
    assert_eq!(shipped.vendor_status.status, VendorStatus::Shipped);
    assert_eq!(shipped.vendor_status.notes.as_deref(), Some("tracking 42"));
    assert_eq!(shipped.order_status, OrderStatus::Pending);
    assert_eq!(shipped.items.len(), 1);
    assert_eq!(shipped.vendor_total, 100);

    let backwards = vendor_service::update_status(
        &state,
        &north,
        order_id,
        UpdateVendorStatusRequest::new(VendorStatus::Processing, None)?,
    )
    .await;
    assert!(matches!(backwards, Err(AppError::Conflict(_))));

    let forbidden = vendor_service::get_order(&state, &outsider, order_id).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));
    let missing = vendor_service::get_order(&state, &outsider, Uuid::new_v4()).await;
    assert!(matches!(missing, Err(AppError::NotFound)));
    let outsider_update = vendor_service::update_status(
        &state,
        &outsider,
        order_id,
        UpdateVendorStatusRequest::new(VendorStatus::Shipped, None)?,
    )
    .await;
    assert!(matches!(outsider_update, Err(AppError::Forbidden)));
    let missing_update = vendor_service::update_status(
        &state,
        &north,
        Uuid::new_v4(),
        UpdateVendorStatusRequest::new(VendorStatus::Shipped, None)?,
    )
    .await;
    assert!(matches!(missing_update, Err(AppError::NotFound)));

    vendor_service::update_status(
        &state,
        &north,
        order_id,
        UpdateVendorStatusRequest::new(VendorStatus::Completed, None)?,
    )
    .await?;
    let last = vendor_service::update_status(
        &state,
        &south,
        order_id,
        UpdateVendorStatusRequest::new(VendorStatus::Cancelled, None)?,
    )
    .await?
    .into_data()
    .expect("vendor order");
    assert_eq!(last.order_status, OrderStatus::Completed);

    let terminal = vendor_service::update_status(
        &state,
        &south,
        order_id,
        UpdateVendorStatusRequest::new(VendorStatus::Completed, None)?,
    )
    .await;
    assert!(matches!(terminal, Err(AppError::Conflict(_))));

    let completed = order_service::cancel_order(&state, &customer, order_id).await;
    assert!(matches!(completed, Err(AppError::Conflict(_))));

    let rows = OrderVendorStatuses::find()
        .filter(order_vendor_statuses::Column::OrderId.eq(order_id))
        .all(&state.orm)
        .await?;
    assert_eq!(rows.len(), 2);

    let listed = vendor_service::list_orders(&state, &north, Pagination::default())
        .await?
        .into_data()
        .expect("vendor orders");
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].order_id, order_id);
    Ok(())
}

#[tokio::test]
async fn all_vendors_cancelling_cancels_order() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Neda").await?;
    let vendor = create_vendor(&state, "Solo").await?;
    let product = create_product(&state, &vendor, "A", 100, 5).await?;

    add_to_cart(&state, &customer, &product, 1).await?;
    let order_id = checkout_service::checkout(&state, &customer)
        .await?
        .into_data()
        .expect("order")
        .order
        .id;

    let cancelled = vendor_service::update_status(
        &state,
        &vendor,
        order_id,
        UpdateVendorStatusRequest::new(VendorStatus::Cancelled, None)?,
    )
    .await?
    .into_data()
    .expect("vendor order");
    assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
    // Vendor-driven cancellation does not return stock.
    assert_eq!(stock_of(&state, product.id).await?, 4);
    Ok(())
}

#[tokio::test]
async fn orders_are_listed_per_user_with_status_filter() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Reza").await?;
    let vendor = create_vendor(&state, "Shop").await?;
    let product = create_product(&state, &vendor, "A", 100, 10).await?;

    for _ in 0..3 {
        add_to_cart(&state, &customer, &product, 1).await?;
        checkout_service::checkout(&state, &customer).await?;
    }
    let first = order_service::list_orders(&state, &customer, OrderListQuery::default())
        .await?
        .into_data()
        .expect("orders");
    assert_eq!(first.items.len(), 3);
    order_service::cancel_order(&state, &customer, first.items[0].id).await?;

    let pending = order_service::list_orders(
        &state,
        &customer,
        OrderListQuery {
            status: Some(OrderStatus::Pending),
            per_page: Some(1),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(pending.meta.as_ref().and_then(|meta| meta.total), Some(2));
    assert_eq!(pending.into_data().expect("orders").items.len(), 1);

    let other = create_customer(&state, "Other").await?;
    let none = order_service::list_orders(&state, &other, OrderListQuery::default())
        .await?
        .into_data()
        .expect("orders");
    assert!(none.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn guest_cart_merges_into_user_cart() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let customer = create_customer(&state, "Mina").await?;
    let vendor = create_vendor(&state, "Shop").await?;
    let a = create_product(&state, &vendor, "A", 100, 10).await?;
    let b = create_product(&state, &vendor, "B", 50, 10).await?;
    let guest = Identity::Guest("guest-session-1".into());

    cart_service::add_item(&state, &guest, AddToCartRequest::new(a.id, 2)?).await?;
    cart_service::add_item(&state, &guest, AddToCartRequest::new(b.id, 1)?).await?;
    add_to_cart(&state, &customer, &a, 1).await?;

    let merged = cart_service::merge_guest_cart(&state, "guest-session-1", customer.user_id)
        .await?
        .expect("merged")
        .into_data()
        .expect("cart");
    assert_eq!(merged.items.len(), 2);
    let a_line = merged
        .items
        .iter()
        .find(|line| line.product_id == a.id)
        .expect("a line");
    assert_eq!(a_line.quantity, 3);
    assert_eq!(merged.subtotal, 350);
    assert_eq!(merged.items_by_vendor.len(), 1);
    assert_eq!(merged.items_by_vendor[0].vendor_name, "Shop");

    let guest_cart = cart_service::get_cart(&state, &guest)
        .await?
        .into_data()
        .expect("cart");
    assert!(guest_cart.items.is_empty());

    let nothing = cart_service::merge_guest_cart(&state, "unknown-session", customer.user_id)
        .await?;
    assert!(nothing.is_none());
    Ok(())
}

#[tokio::test]
async fn product_discounts_list_active_offers_in_scope() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let vendor = create_vendor(&state, "Shop").await?;
    let other = create_vendor(&state, "Other").await?;
    let product = create_product(&state, &vendor, "A", 1_000, 10).await?;

    let discount = |name: &str, kind, value, vendor_id: Option<Uuid>, active: bool| {
        discounts::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            kind: Set(kind),
            value: Set(value),
            min_order_amount: Set(None),
            max_discount_amount: Set(None),
            vendor_id: Set(vendor_id),
            product_id: Set(None),
            is_active: Set(active),
            starts_at: Set(Some((now() - Duration::days(1)).fixed_offset())),
            expires_at: Set(Some((now() + Duration::days(1)).fixed_offset())),
            created_at: Set(now().fixed_offset()),
        }
    };
    discount("Vendor 10%", DiscountKind::Percentage, 1_000, Some(vendor.vendor_id), true)
        .insert(&state.orm)
        .await?;
    discount("Global 300", DiscountKind::Fixed, 300, None, true)
        .insert(&state.orm)
        .await?;
    discount("Other vendor", DiscountKind::Fixed, 900, Some(other.vendor_id), true)
        .insert(&state.orm)
        .await?;
    discount("Switched off", DiscountKind::Fixed, 999, None, false)
        .insert(&state.orm)
        .await?;

    let offers = discount_service::product_discounts(&state, product.id)
        .await?
        .into_data()
        .expect("discounts");
    assert_eq!(offers.discounts.len(), 2);
    assert_eq!(offers.best_price, 700);
    let vendor_offer = offers
        .discounts
        .iter()
        .find(|offer| offer.name == "Vendor 10%")
        .expect("vendor offer");
    assert_eq!(vendor_offer.discount_amount, 100);
    assert_eq!(vendor_offer.final_price, 900);

    let missing = discount_service::product_discounts(&state, Uuid::new_v4()).await;
    assert!(matches!(missing, Err(AppError::NotFound)));
    Ok(())
}
