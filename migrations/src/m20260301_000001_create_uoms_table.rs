use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Uoms::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Uoms::Code)
                            .string_len(20)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Uoms::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Uoms::System).string_len(32).not_null())
                    .col(ColumnDef::new(Uoms::Category).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Uoms::IsPackaging)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Uoms::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Uoms::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Uoms::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Uoms::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_uoms_category_is_active")
                    .table(Uoms::Table)
                    .col(Uoms::Category)
                    .col(Uoms::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Uoms::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Uoms {
    Table,
    Code,
    Name,
    System,
    Category,
    IsPackaging,
    IsActive,
    Version,
    CreatedAt,
    UpdatedAt,
}
