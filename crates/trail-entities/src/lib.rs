pub mod action_events;
pub mod actions;
pub mod events;
pub mod funnels;
pub mod person_distinct_ids;
pub mod persons;
pub mod teams;

pub mod prelude;
