//! Typed decoding of funnel query rows.

use sea_orm::{DbErr, FromQueryResult, QueryResult};
use serde_json::Value;
use trail_core::UtcDateTime;

use crate::query::{StepAlias, BUCKET_DATE};

#[derive(Debug, Clone, PartialEq, FromQueryResult)]
pub struct PersonRow {
    pub id: i32,
    pub created_at: UtcDateTime,
    pub team_id: i32,
    pub properties: Value,
    pub is_identified: bool,
}

/// One actor and the timestamp matched for each step, `None` from the
/// first step they never reached.
#[derive(Debug, Clone, PartialEq)]
pub struct StepMatchRow {
    pub person: PersonRow,
    pub steps: Vec<Option<UtcDateTime>>,
}

impl StepMatchRow {
    pub fn decode(row: &QueryResult, step_count: usize) -> Result<Self, DbErr> {
        let person = PersonRow::from_query_result(row, "")?;
        let steps = (0..step_count)
            .map(|index| row.try_get::<Option<UtcDateTime>>("", &StepAlias(index).name()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { person, steps })
    }

    pub fn reached(&self, index: usize) -> Option<UtcDateTime> {
        self.steps.get(index).copied().flatten()
    }

    /// Number of steps matched.
    pub fn depth(&self) -> usize {
        self.steps.iter().filter(|step| step.is_some()).count()
    }
}

/// Actors per step for one trend bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketCounts {
    pub date: UtcDateTime,
    pub counts: Vec<i64>,
}

impl BucketCounts {
    pub fn decode(row: &QueryResult, step_count: usize) -> Result<Self, DbErr> {
        let date = row.try_get::<UtcDateTime>("", BUCKET_DATE)?;
        let counts = (0..step_count)
            .map(|index| row.try_get::<i64>("", &StepAlias(index).count_column()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { date, counts })
    }

    pub fn count(&self, step: usize) -> i64 {
        self.counts.get(step).copied().unwrap_or(0)
    }
}
