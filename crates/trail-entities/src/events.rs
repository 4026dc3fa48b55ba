//! `SeaORM` Entity for captured events

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use trail_core::UtcDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub team_id: i32,
    /// Event name, e.g. `$pageview` or a custom name
    pub event: String,
    pub distinct_id: String,
    pub properties: Json,
    pub timestamp: UtcDateTime,
    pub created_at: UtcDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::teams::Entity",
        from = "Column::TeamId",
        to = "super::teams::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Teams,
    #[sea_orm(has_many = "super::action_events::Entity")]
    ActionEvents,
}

impl Related<super::teams::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teams.def()
    }
}

impl Related<super::action_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActionEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
