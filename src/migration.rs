use sea_orm::{ConnectionTrait, EntityTrait, Schema};
use sea_orm_migration::prelude::*;

use crate::entity::{
    AuditLogs, CartItems, Carts, CouponUsages, Coupons, Discounts, OrderItems,
    OrderVendorStatuses, Orders, Payments, Products, Users, Vendors, cart_items, coupon_usages,
    order_vendor_statuses,
};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(CreateMarketplaceSchema),
            Box::new(OneSuccessfulPaymentPerOrder),
        ]
    }
}

/// Tables are generated from the entity definitions so Postgres and SQLite
/// share a single schema source.
struct CreateMarketplaceSchema;

impl MigrationName for CreateMarketplaceSchema {
    fn name(&self) -> &str {
        "m20250308_000001_create_marketplace_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateMarketplaceSchema {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());

        // Referenced tables first.
        create(manager, &schema, Users).await?;
        create(manager, &schema, Vendors).await?;
        create(manager, &schema, Products).await?;
        create(manager, &schema, Coupons).await?;
        create(manager, &schema, Discounts).await?;
        create(manager, &schema, Carts).await?;
        create(manager, &schema, CartItems).await?;
        create(manager, &schema, Orders).await?;
        create(manager, &schema, OrderItems).await?;
        create(manager, &schema, OrderVendorStatuses).await?;
        create(manager, &schema, CouponUsages).await?;
        create(manager, &schema, Payments).await?;
        create(manager, &schema, AuditLogs).await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_cart_items_cart_product")
                    .table(CartItems)
                    .col(cart_items::Column::CartId)
                    .col(cart_items::Column::ProductId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_order_vendor_statuses_order_vendor")
                    .table(OrderVendorStatuses)
                    .col(order_vendor_statuses::Column::OrderId)
                    .col(order_vendor_statuses::Column::VendorId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_coupon_user_coupon_user_order")
                    .table(CouponUsages)
                    .col(coupon_usages::Column::CouponId)
                    .col(coupon_usages::Column::UserId)
                    .col(coupon_usages::Column::OrderId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(AuditLogs).to_owned()).await?;
        manager.drop_table(Table::drop().table(Payments).to_owned()).await?;
        manager.drop_table(Table::drop().table(CouponUsages).to_owned()).await?;
        manager
            .drop_table(Table::drop().table(OrderVendorStatuses).to_owned())
            .await?;
        manager.drop_table(Table::drop().table(OrderItems).to_owned()).await?;
        manager.drop_table(Table::drop().table(Orders).to_owned()).await?;
        manager.drop_table(Table::drop().table(CartItems).to_owned()).await?;
        manager.drop_table(Table::drop().table(Carts).to_owned()).await?;
        manager.drop_table(Table::drop().table(Discounts).to_owned()).await?;
        manager.drop_table(Table::drop().table(Coupons).to_owned()).await?;
        manager.drop_table(Table::drop().table(Products).to_owned()).await?;
        manager.drop_table(Table::drop().table(Vendors).to_owned()).await?;
        manager.drop_table(Table::drop().table(Users).to_owned()).await?;
        Ok(())
    }
}

async fn create<E>(manager: &SchemaManager<'_>, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    manager
        .create_table(schema.create_table_from_entity(entity).if_not_exists().to_owned())
        .await
}

/// At most one successful payment per order, enforced by storage as well as by
/// the order lock taken while resolving callbacks.
struct OneSuccessfulPaymentPerOrder;

impl MigrationName for OneSuccessfulPaymentPerOrder {
    fn name(&self) -> &str {
        "m20250315_000002_one_successful_payment_per_order"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for OneSuccessfulPaymentPerOrder {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Partial indexes are understood by both Postgres and SQLite.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_payments_one_successful_per_order \
                 ON payments (order_id) WHERE status = 'successful'",
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS uq_payments_one_successful_per_order")
            .await?;
        Ok(())
    }
}
