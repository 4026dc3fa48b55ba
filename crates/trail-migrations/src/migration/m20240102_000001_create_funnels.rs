use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_analytics_tables::Teams;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Funnels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Funnels::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Funnels::TeamId).integer().not_null())
                    .col(ColumnDef::new(Funnels::CreatedById).integer().null())
                    .col(ColumnDef::new(Funnels::Name).string_len(400).null())
                    .col(
                        ColumnDef::new(Funnels::Deleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Funnels::Filters)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Funnels::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Funnels::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_funnels_team_id")
                            .from(Funnels::Table, Funnels::TeamId)
                            .to(Teams::Table, Teams::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_funnels_team_id_deleted")
                    .table(Funnels::Table)
                    .col(Funnels::TeamId)
                    .col(Funnels::Deleted)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Funnels::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Funnels {
    Table,
    Id,
    TeamId,
    CreatedById,
    Name,
    Deleted,
    Filters,
    CreatedAt,
    UpdatedAt,
}
