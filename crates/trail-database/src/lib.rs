//! Database connection and test utilities

pub use sea_orm;
mod connection;

pub use connection::{establish_connection, DbConnection};

// Exported so other crates can use the shared container in their tests
pub mod test_utils;
