use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_uoms_table::Uoms;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // factor: canonical decimal string, never a float column
        manager
            .create_table(
                Table::create()
                    .table(UomConversions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UomConversions::FromUom)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UomConversions::ToUom)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UomConversions::Factor)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UomConversions::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(UomConversions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UomConversions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_uom_conversions")
                            .col(UomConversions::FromUom)
                            .col(UomConversions::ToUom),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_uom_conversions_from_uom")
                            .from(UomConversions::Table, UomConversions::FromUom)
                            .to(Uoms::Table, Uoms::Code)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_uom_conversions_to_uom")
                            .from(UomConversions::Table, UomConversions::ToUom)
                            .to(Uoms::Table, Uoms::Code)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_uom_conversions_to_uom")
                    .table(UomConversions::Table)
                    .col(UomConversions::ToUom)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UomConversions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UomConversions {
    Table,
    FromUom,
    ToUom,
    Factor,
    Version,
    CreatedAt,
    UpdatedAt,
}
