pub mod database;
pub mod funnel;
pub mod migrate;

pub use database::DatabaseArgs;
pub use funnel::{FunnelAction, FunnelCommand};
pub use migrate::MigrateCommand;
