use sea_orm_migration::prelude::*;

use crate::m20251001_000001_create_users::Users;
use crate::m20251001_000003_create_subscriptions::Subscriptions;

#[derive(DeriveIden)]
enum Payments {
    Table,
    Id,
    UserId,
    SubscriptionId,
    Method,
    Amount,
    Currency,
    Status,
    ExternalRef,
    FailureReason,
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
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payments::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Payments::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::SubscriptionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::Method).string_len(16).not_null())
                    .col(ColumnDef::new(Payments::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::Currency)
                            .string_len(8)
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(Payments::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Payments::ExternalRef)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::FailureReason).text().null())
                    .col(
                        ColumnDef::new(Payments::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Payments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_user")
                            .from(Payments::Table, Payments::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_subscription")
                            .from(Payments::Table, Payments::SubscriptionId)
                            .to(Subscriptions::Table, Subscriptions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_payments_external_ref")
                    .table(Payments::Table)
                    .col(Payments::ExternalRef)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_payments_user")
                    .table(Payments::Table)
                    .col(Payments::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Payments::Table).to_owned())
            .await
    }
}
