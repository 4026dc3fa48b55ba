//! Named actions: saved groupings of events, resolved per team

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use trail_core::UtcDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "actions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub team_id: i32,
    pub name: String,
    pub deleted: bool,
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
