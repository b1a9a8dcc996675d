use sea_orm_migration::prelude::*;

use crate::m20251001_000001_create_users::Users;

#[derive(DeriveIden)]
pub(crate) enum Products {
    Table,
    Id,
    Name,
    Description,
    Image,
    Url,
    Category,
    PriceMonthly,
    PriceYearly,
    Features,
    IsPopular,
    Rating,
    Reviews,
    Tags,
    Availability,
    IsActive,
    TrialDays,
    MaxUsers,
    Storage,
    Support,
    CreatedBy,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Products::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Products::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Products::Description).text().not_null())
                    .col(ColumnDef::new(Products::Image).text().not_null())
                    .col(ColumnDef::new(Products::Url).string_len(512).not_null())
                    .col(ColumnDef::new(Products::Category).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Products::PriceMonthly)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Products::PriceYearly).big_integer().not_null())
                    .col(ColumnDef::new(Products::Features).json().not_null())
                    .col(
                        ColumnDef::new(Products::IsPopular)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Products::Rating)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Products::Reviews)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Products::Tags).json().not_null())
                    .col(
                        ColumnDef::new(Products::Availability)
                            .string_len(16)
                            .not_null()
                            .default("available"),
                    )
                    .col(
                        ColumnDef::new(Products::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Products::TrialDays)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Products::MaxUsers).integer().null())
                    .col(ColumnDef::new(Products::Storage).string_len(255).null())
                    .col(ColumnDef::new(Products::Support).string_len(255).null())
                    .col(ColumnDef::new(Products::CreatedBy).big_integer().null())
                    .col(ColumnDef::new(Products::UpdatedBy).big_integer().null())
                    .col(
                        ColumnDef::new(Products::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Products::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_created_by")
                            .from(Products::Table, Products::CreatedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_updated_by")
                            .from(Products::Table, Products::UpdatedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // url is the seed key
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_products_url")
                    .table(Products::Table)
                    .col(Products::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_products_category")
                    .table(Products::Table)
                    .col(Products::Category)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_products_active_popular")
                    .table(Products::Table)
                    .col(Products::IsActive)
                    .col(Products::IsPopular)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_products_price_monthly")
                    .table(Products::Table)
                    .col(Products::PriceMonthly)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Products::Table).to_owned())
            .await
    }
}
