use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use trail_core::UtcDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "teams")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub created_at: UtcDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::events::Entity")]
    Events,
    #[sea_orm(has_many = "super::persons::Entity")]
    Persons,
    #[sea_orm(has_many = "super::funnels::Entity")]
    Funnels,
}

impl Related<super::events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl Related<super::persons::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Persons.def()
    }
}

impl Related<super::funnels::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Funnels.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
