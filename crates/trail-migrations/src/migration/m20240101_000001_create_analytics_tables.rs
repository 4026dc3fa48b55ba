use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========================================
        // TEAMS
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(Teams::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Teams::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Teams::Name).string_len(400).not_null())
                    .col(
                        ColumnDef::new(Teams::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // ========================================
        // PERSONS
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(Persons::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Persons::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Persons::TeamId).integer().not_null())
                    .col(
                        ColumnDef::new(Persons::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Persons::Properties)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Persons::IsIdentified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_persons_team_id")
                            .from(Persons::Table, Persons::TeamId)
                            .to(Teams::Table, Teams::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PersonDistinctIds::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PersonDistinctIds::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PersonDistinctIds::TeamId).integer().not_null())
                    .col(ColumnDef::new(PersonDistinctIds::PersonId).integer().not_null())
                    .col(
                        ColumnDef::new(PersonDistinctIds::DistinctId)
                            .string_len(400)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_person_distinct_ids_person_id")
                            .from(PersonDistinctIds::Table, PersonDistinctIds::PersonId)
                            .to(Persons::Table, Persons::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // A distinct id belongs to exactly one person within a team
        manager
            .create_index(
                Index::create()
                    .name("idx_person_distinct_ids_team_distinct_id")
                    .table(PersonDistinctIds::Table)
                    .col(PersonDistinctIds::TeamId)
                    .col(PersonDistinctIds::DistinctId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ========================================
        // EVENTS
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Events::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Events::TeamId).integer().not_null())
                    .col(ColumnDef::new(Events::Event).string_len(400).not_null())
                    .col(ColumnDef::new(Events::DistinctId).string_len(400).not_null())
                    .col(
                        ColumnDef::new(Events::Properties)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Events::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Events::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_events_team_id")
                            .from(Events::Table, Events::TeamId)
                            .to(Teams::Table, Teams::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Step sub-queries filter on team + event name + time range
        manager
            .create_index(
                Index::create()
                    .name("idx_events_team_event_timestamp")
                    .table(Events::Table)
                    .col(Events::TeamId)
                    .col(Events::Event)
                    .col(Events::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_team_distinct_id")
                    .table(Events::Table)
                    .col(Events::TeamId)
                    .col(Events::DistinctId)
                    .to_owned(),
            )
            .await?;

        // ========================================
        // ACTIONS
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(Actions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Actions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Actions::TeamId).integer().not_null())
                    .col(ColumnDef::new(Actions::Name).string_len(400).not_null())
                    .col(
                        ColumnDef::new(Actions::Deleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Actions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_actions_team_id")
                            .from(Actions::Table, Actions::TeamId)
                            .to(Teams::Table, Teams::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ActionEvents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ActionEvents::ActionId).integer().not_null())
                    .col(ColumnDef::new(ActionEvents::EventId).big_integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(ActionEvents::ActionId)
                            .col(ActionEvents::EventId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_action_events_action_id")
                            .from(ActionEvents::Table, ActionEvents::ActionId)
                            .to(Actions::Table, Actions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_action_events_event_id")
                            .from(ActionEvents::Table, ActionEvents::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse dependency order
        manager
            .drop_table(Table::drop().table(ActionEvents::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Actions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Events::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(PersonDistinctIds::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Persons::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Teams::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
pub(super) enum Teams {
    Table,
    Id,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Persons {
    Table,
    Id,
    TeamId,
    CreatedAt,
    Properties,
    IsIdentified,
}

#[derive(DeriveIden)]
enum PersonDistinctIds {
    Table,
    Id,
    TeamId,
    PersonId,
    DistinctId,
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
    TeamId,
    Event,
    DistinctId,
    Properties,
    Timestamp,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Actions {
    Table,
    Id,
    TeamId,
    Name,
    Deleted,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ActionEvents {
    Table,
    ActionId,
    EventId,
}
