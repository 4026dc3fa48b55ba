pub use super::action_events::Entity as ActionEvents;
pub use super::actions::Entity as Actions;
pub use super::events::Entity as Events;
pub use super::funnels::Entity as Funnels;
pub use super::person_distinct_ids::Entity as PersonDistinctIds;
pub use super::persons::Entity as Persons;
pub use super::teams::Entity as Teams;
