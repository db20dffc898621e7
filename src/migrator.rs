use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_perfumes_table::Migration),
            Box::new(m20240301_000002_create_cart_items_table::Migration),
            Box::new(m20240301_000003_create_orders_table::Migration),
            Box::new(m20240301_000004_create_order_items_table::Migration),
        ]
    }
}

mod m20240301_000001_create_perfumes_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_perfumes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Perfumes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Perfumes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Perfumes::Name).string_len(100).not_null())
                        .col(ColumnDef::new(Perfumes::Brand).string_len(50).not_null())
                        .col(ColumnDef::new(Perfumes::Description).text().not_null())
                        .col(
                            ColumnDef::new(Perfumes::Price)
                                .decimal_len(16, 4)
                                .not_null()
                                .check(Expr::col(Perfumes::Price).gte(0)),
                        )
                        .col(ColumnDef::new(Perfumes::OriginalPrice).decimal_len(16, 4).null())
                        .col(ColumnDef::new(Perfumes::Category).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Perfumes::FragranceFamily)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Perfumes::TopNotes).json().not_null())
                        .col(ColumnDef::new(Perfumes::MiddleNotes).json().not_null())
                        .col(ColumnDef::new(Perfumes::BaseNotes).json().not_null())
                        .col(ColumnDef::new(Perfumes::SizeMl).integer().not_null())
                        .col(
                            ColumnDef::new(Perfumes::Stock)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(Perfumes::Stock).gte(0)),
                        )
                        .col(ColumnDef::new(Perfumes::ImageUrl).string().null())
                        .col(
                            ColumnDef::new(Perfumes::Rating)
                                .decimal_len(3, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Perfumes::ReviewCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Perfumes::IsFeatured)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Perfumes::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Perfumes::LaunchYear).integer().null())
                        .col(ColumnDef::new(Perfumes::Concentration).string_len(20).null())
                        .col(
                            ColumnDef::new(Perfumes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Perfumes::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_perfumes_brand", Perfumes::Brand),
                ("idx_perfumes_category", Perfumes::Category),
                ("idx_perfumes_fragrance_family", Perfumes::FragranceFamily),
                ("idx_perfumes_price", Perfumes::Price),
                ("idx_perfumes_is_featured", Perfumes::IsFeatured),
                ("idx_perfumes_is_active", Perfumes::IsActive),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Perfumes::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Perfumes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Perfumes {
        Table,
        Id,
        Name,
        Brand,
        Description,
        Price,
        OriginalPrice,
        Category,
        FragranceFamily,
        TopNotes,
        MiddleNotes,
        BaseNotes,
        SizeMl,
        Stock,
        ImageUrl,
        Rating,
        ReviewCount,
        IsFeatured,
        IsActive,
        LaunchYear,
        Concentration,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_cart_items_table {

    use super::m20240301_000001_create_perfumes_table::Perfumes;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_cart_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CartItems::UserId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::PerfumeId).uuid().not_null())
                        .col(
                            ColumnDef::new(CartItems::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(CartItems::Quantity).gte(1)),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_perfume")
                                .from(CartItems::Table, CartItems::PerfumeId)
                                .to(Perfumes::Table, Perfumes::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One line per (user, perfume); add_item merges into it.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_user_perfume")
                        .table(CartItems::Table)
                        .col(CartItems::UserId)
                        .col(CartItems::PerfumeId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        UserId,
        PerfumeId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let money = |column: Orders| {
                ColumnDef::new(column)
                    .decimal_len(16, 4)
                    .not_null()
                    .default(0)
                    .check(Expr::col(column).gte(0))
                    .to_owned()
            };

            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string_len(40).not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(money(Orders::Subtotal))
                        .col(money(Orders::TaxAmount))
                        .col(money(Orders::ShippingAmount))
                        .col(money(Orders::DiscountAmount))
                        .col(money(Orders::TotalAmount))
                        .col(ColumnDef::new(Orders::PaymentMethod).string_len(30).not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).json().not_null())
                        .col(ColumnDef::new(Orders::BillingAddress).json().not_null())
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(ColumnDef::new(Orders::TrackingNumber).string_len(100).null())
                        .col(
                            ColumnDef::new(Orders::EstimatedDelivery)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::CancellationReason).text().null())
                        .col(ColumnDef::new(Orders::IdempotencyKey).string_len(255).null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // NULL keys never collide, so orders placed without a key are unaffected.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_idempotency_key")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .col(Orders::IdempotencyKey)
                        .unique()
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_orders_user_id", Orders::UserId),
                ("idx_orders_status", Orders::Status),
                ("idx_orders_created_at", Orders::CreatedAt),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Orders::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        Status,
        Subtotal,
        TaxAmount,
        ShippingAmount,
        DiscountAmount,
        TotalAmount,
        PaymentMethod,
        PaymentStatus,
        ShippingAddress,
        BillingAddress,
        Notes,
        TrackingNumber,
        EstimatedDelivery,
        DeliveredAt,
        CancelledAt,
        CancellationReason,
        IdempotencyKey,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_order_items_table {

    use super::m20240301_000001_create_perfumes_table::Perfumes;
    use super::m20240301_000003_create_orders_table::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::PerfumeId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(OrderItems::Quantity).gte(1)),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::TotalPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Snapshot).json().not_null())
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_perfume")
                                .from(OrderItems::Table, OrderItems::PerfumeId)
                                .to(Perfumes::Table, Perfumes::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        PerfumeId,
        Quantity,
        UnitPrice,
        TotalPrice,
        Snapshot,
        CreatedAt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database};

    #[tokio::test]
    async fn migrations_run_up_and_down_on_sqlite() {
        let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
        opt.max_connections(1).min_connections(1);
        let db = Database::connect(opt).await.unwrap();

        Migrator::up(&db, None).await.unwrap();
        let manager = SchemaManager::new(&db);
        for table in ["perfumes", "cart_items", "orders", "order_items"] {
            assert!(manager.has_table(table).await.unwrap(), "missing {table}");
        }

        Migrator::down(&db, None).await.unwrap();
        assert!(!manager.has_table("orders").await.unwrap());
    }
}
