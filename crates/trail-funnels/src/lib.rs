//! Funnel analysis engine
//!
//! Turns a stored funnel filter into one set-at-a-time SQL statement that
//! finds, per actor, the earliest time each step happened after the
//! previous one, then shapes the rows into step summaries and conversion
//! trends.

pub mod error;
pub mod filter;
pub mod query;
pub mod rows;
pub mod services;
pub mod summary;
pub mod trends;
pub mod types;

pub use error::FunnelError;
pub use filter::{Entity, EntityRef, EntityType, Filter, Interval, PropertyFilter};
pub use services::FunnelService;
pub use types::{FunnelStepSummary, TrendSeries};
