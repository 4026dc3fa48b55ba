//! `SeaORM` Entity for persons (deduplicated actors)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use trail_core::UtcDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "persons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub team_id: i32,
    pub created_at: UtcDateTime,
    pub properties: Json,
    /// Set once the actor has been tied to a known user identity
    pub is_identified: bool,
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
    #[sea_orm(has_many = "super::person_distinct_ids::Entity")]
    PersonDistinctIds,
}

impl Related<super::teams::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teams.def()
    }
}

impl Related<super::person_distinct_ids::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PersonDistinctIds.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
