//! Step summaries for `get_steps`.

use std::cmp::Reverse;

use crate::filter::Entity;
use crate::rows::StepMatchRow;
use crate::types::FunnelStepSummary;

/// Cap on the people listed per step; `count` is never capped.
pub const PEOPLE_SAMPLE_SIZE: usize = 100;

/// Mean seconds from step `index - 1` to step `index` over actors who
/// reached both. Zero when nobody did.
pub fn average_transition_seconds(rows: &[StepMatchRow], index: usize) -> f64 {
    let Some(previous) = index.checked_sub(1) else {
        return 0.0;
    };

    let (total_ms, people) = rows
        .iter()
        .filter_map(|row| Some((row.reached(previous)?, row.reached(index)?)))
        .map(|(from, to)| (to - from).num_milliseconds())
        .filter(|ms| *ms >= 0)
        .fold((0i64, 0u32), |(total, people), ms| (total.saturating_add(ms), people + 1));

    if people == 0 {
        return 0.0;
    }
    total_ms as f64 / 1000.0 / f64::from(people)
}

/// Builds one summary per step, in step order.
///
/// `names` holds the display name resolved for each step.
pub fn summarize_steps(
    entities: &[Entity],
    names: Vec<String>,
    rows: &[StepMatchRow],
) -> Vec<FunnelStepSummary> {
    entities
        .iter()
        .zip(names)
        .enumerate()
        .map(|(index, (entity, name))| {
            let mut reached: Vec<(usize, i32)> = rows
                .iter()
                .filter(|row| row.reached(index).is_some())
                .map(|row| (row.depth(), row.person.id))
                .collect();
            let count = reached.len();

            reached.sort_by_key(|(depth, id)| (Reverse(*depth), *id));
            reached.truncate(PEOPLE_SAMPLE_SIZE);

            FunnelStepSummary {
                action_id: entity.reference.clone(),
                name,
                order: entity.order,
                people: reached.into_iter().map(|(_, id)| id).collect(),
                count,
                entity_type: entity.entity_type(),
                average_time: (index > 0).then(|| average_transition_seconds(rows, index)),
            }
        })
        .collect()
}
