//! SQL construction for funnels
//!
//! Every step becomes a grouped sub-select over `events`. The sub-selects
//! are chained with `LEFT JOIN LATERAL`, each one reading the previous
//! step's actor and matched timestamp through its alias.

mod funnel;
mod properties;
mod step;

use sea_orm::sea_query::Alias;

pub use funnel::{build_steps_query, build_trends_query, PERSON_COLUMNS};
pub use properties::{properties_condition, property_condition};
pub use step::{build_step_query, StepBound};

/// Alias of the `person_distinct_ids` join inside each step.
pub const PDI: &str = "pdi";
/// Actor column produced by a step sub-select.
pub const PERSON_ID: &str = "person_id";
/// Earliest matching timestamp produced by a step sub-select.
pub const STEP_TS: &str = "step_ts";
/// Bucket column produced by the trends query.
pub const BUCKET_DATE: &str = "date";

/// Name of step `n`, used both as the sub-select alias and as the
/// aggregated output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepAlias(pub usize);

impl StepAlias {
    pub fn name(&self) -> String {
        format!("step_{}", self.0)
    }

    pub fn count_column(&self) -> String {
        format!("step_{}_count", self.0)
    }

    pub fn alias(&self) -> Alias {
        Alias::new(self.name())
    }

    pub fn person_id(&self) -> (Alias, Alias) {
        (self.alias(), Alias::new(PERSON_ID))
    }

    pub fn step_ts(&self) -> (Alias, Alias) {
        (self.alias(), Alias::new(STEP_TS))
    }
}
