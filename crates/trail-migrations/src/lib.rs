//! Database migrations for the Trail analytics schema

pub use sea_orm_migration::prelude::*;

mod migration;
pub use migration::Migrator;
