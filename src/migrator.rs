use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_catalog_tables::Migration),
            Box::new(m20240601_000002_create_orders_tables::Migration),
            Box::new(m20240601_000003_create_returns_tables::Migration),
            Box::new(m20240601_000004_create_account_tables::Migration),
        ]
    }
}

mod m20240601_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Price).decimal_len(12, 2).not_null())
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Sizes and colors share one shape.
            for (table, fk_name) in [
                (Variants::ProductSizes, "fk_product_sizes_product_id"),
                (Variants::ProductColors, "fk_product_colors_product_id"),
            ] {
                manager
                    .create_table(
                        Table::create()
                            .table(table)
                            .if_not_exists()
                            .col(ColumnDef::new(Variants::Id).uuid().primary_key().not_null())
                            .col(ColumnDef::new(Variants::ProductId).uuid().not_null())
                            .col(ColumnDef::new(Variants::Label).string().not_null())
                            .col(
                                ColumnDef::new(Variants::Stock)
                                    .integer()
                                    .not_null()
                                    .default(0),
                            )
                            .col(
                                ColumnDef::new(Variants::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .foreign_key(
                                ForeignKey::create()
                                    .name(fk_name)
                                    .from(table, Variants::ProductId)
                                    .to(Products::Table, Products::Id)
                                    .on_delete(ForeignKeyAction::Cascade)
                                    .on_update(ForeignKeyAction::Cascade),
                            )
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_sizes_product_id")
                        .table(Variants::ProductSizes)
                        .col(Variants::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_colors_product_id")
                        .table(Variants::ProductColors)
                        .col(Variants::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::SizeId).uuid().null())
                        .col(ColumnDef::new(StockMovements::ColorId).uuid().null())
                        .col(ColumnDef::new(StockMovements::Delta).integer().not_null())
                        .col(ColumnDef::new(StockMovements::Note).string().not_null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_movements_product_id")
                                .from(StockMovements::Table, StockMovements::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_product_created")
                        .table(StockMovements::Table)
                        .col(StockMovements::ProductId)
                        .col(StockMovements::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Variants::ProductColors).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Variants::ProductSizes).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Price,
        Stock,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum Variants {
        ProductSizes,
        ProductColors,
        Id,
        ProductId,
        Label,
        Stock,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        ProductId,
        SizeId,
        ColorId,
        Delta,
        Note,
        CreatedAt,
    }
}

mod m20240601_000002_create_orders_tables {
    use super::m20240601_000001_create_catalog_tables::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).integer().null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::Total).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Orders::ShippingAddressId).uuid().null())
                        .col(ColumnDef::new(Orders::ShippingName).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingPhone).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingCity).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingDistrict).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingNeighborhood).string().null())
                        .col(ColumnDef::new(Orders::ShippingAddressLine).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingPostalCode).string().null())
                        .col(ColumnDef::new(Orders::CustomerNote).string().null())
                        .col(ColumnDef::new(Orders::ContactEmail).string().null())
                        .col(ColumnDef::new(Orders::PaymentReference).string().null())
                        .col(ColumnDef::new(Orders::Carrier).string().null())
                        .col(ColumnDef::new(Orders::TrackingNumber).string().null())
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
                        .col(
                            ColumnDef::new(Orders::StatusChangedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Uniqueness of the human order number is what makes concurrent
            // allocations collide; the name must contain the column name.
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

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::Price).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(OrderItems::SizeId).uuid().null())
                        .col(ColumnDef::new(OrderItems::ColorId).uuid().null())
                        .col(ColumnDef::new(OrderItems::SizeLabel).string().null())
                        .col(ColumnDef::new(OrderItems::ColorLabel).string().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_product_id")
                                .from(OrderItems::Table, OrderItems::ProductId)
                                .to(Products::Table, Products::Id),
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
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        Status,
        Total,
        ShippingAddressId,
        ShippingName,
        ShippingPhone,
        ShippingCity,
        ShippingDistrict,
        ShippingNeighborhood,
        ShippingAddressLine,
        ShippingPostalCode,
        CustomerNote,
        ContactEmail,
        PaymentReference,
        Carrier,
        TrackingNumber,
        CreatedAt,
        UpdatedAt,
        StatusChangedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        ProductName,
        Quantity,
        Price,
        SizeId,
        ColorId,
        SizeLabel,
        ColorLabel,
    }
}

mod m20240601_000003_create_returns_tables {
    use super::m20240601_000002_create_orders_tables::{OrderItems, Orders};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_returns_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReturnRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnRequests::OrderId).uuid().not_null())
                        .col(ColumnDef::new(ReturnRequests::UserId).uuid().not_null())
                        .col(ColumnDef::new(ReturnRequests::Reason).text().not_null())
                        .col(
                            ColumnDef::new(ReturnRequests::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnRequests::AdminNote).text().null())
                        .col(
                            ColumnDef::new(ReturnRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_requests_order_id")
                                .from(ReturnRequests::Table, ReturnRequests::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ReturnItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(ReturnItems::ReturnRequestId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::OrderItemId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::Quantity).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_items_return_request_id")
                                .from(ReturnItems::Table, ReturnItems::ReturnRequestId)
                                .to(ReturnRequests::Table, ReturnRequests::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_items_order_item_id")
                                .from(ReturnItems::Table, ReturnItems::OrderItemId)
                                .to(OrderItems::Table, OrderItems::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReturnItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReturnRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ReturnRequests {
        Table,
        Id,
        OrderId,
        UserId,
        Reason,
        Status,
        AdminNote,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ReturnItems {
        Table,
        Id,
        ReturnRequestId,
        OrderItemId,
        Quantity,
    }
}

mod m20240601_000004_create_account_tables {
    use super::m20240601_000001_create_catalog_tables::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_account_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Addresses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Addresses::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Addresses::UserId).uuid().not_null())
                        .col(ColumnDef::new(Addresses::Title).string().not_null())
                        .col(ColumnDef::new(Addresses::FullName).string().not_null())
                        .col(ColumnDef::new(Addresses::Phone).string().not_null())
                        .col(ColumnDef::new(Addresses::City).string().not_null())
                        .col(ColumnDef::new(Addresses::District).string().not_null())
                        .col(ColumnDef::new(Addresses::Neighborhood).string().null())
                        .col(ColumnDef::new(Addresses::AddressLine).string().not_null())
                        .col(ColumnDef::new(Addresses::PostalCode).string().null())
                        .col(
                            ColumnDef::new(Addresses::IsDefault)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Addresses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Addresses::UpdatedAt)
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
                        .name("idx_addresses_user_id")
                        .table(Addresses::Table)
                        .col(Addresses::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CartItems::UserId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::SizeId).uuid().null())
                        .col(ColumnDef::new(CartItems::ColorId).uuid().null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
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
                                .name("fk_cart_items_product_id")
                                .from(CartItems::Table, CartItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_user_id")
                        .table(CartItems::Table)
                        .col(CartItems::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Addresses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Addresses {
        Table,
        Id,
        UserId,
        Title,
        FullName,
        Phone,
        City,
        District,
        Neighborhood,
        AddressLine,
        PostalCode,
        IsDefault,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        UserId,
        ProductId,
        SizeId,
        ColorId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}
