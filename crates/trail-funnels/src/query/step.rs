use sea_orm::sea_query::{Alias, Condition, Expr, JoinType, Query, SelectStatement};
use trail_entities::{action_events, events, person_distinct_ids};

use super::properties::properties_condition;
use super::{StepAlias, PDI, PERSON_ID, STEP_TS};
use crate::error::FunnelError;
use crate::filter::{Entity, EntityRef, Filter};

/// How a step relates to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepBound {
    /// The first step only sees the filter's own constraints.
    First,
    /// Same actor as `step_{n}`, at or after its matched timestamp.
    After(StepAlias),
}

fn reference_condition(reference: &EntityRef) -> Condition {
    match reference {
        EntityRef::Event(name) => {
            Condition::all().add(Expr::col((events::Entity, events::Column::Event)).eq(name.as_str()))
        }
        EntityRef::Action(action_id) => {
            let mut matching = Query::select();
            matching
                .column(action_events::Column::EventId)
                .from(action_events::Entity)
                .and_where(Expr::col(action_events::Column::ActionId).eq(*action_id));
            Condition::all()
                .add(Expr::col((events::Entity, events::Column::Id)).in_subquery(matching))
        }
    }
}

/// Builds the sub-select for one step:
///
/// ```sql
/// SELECT pdi.person_id, MIN(events.timestamp) AS step_ts
/// FROM events JOIN person_distinct_ids pdi ON ...
/// WHERE <team> AND <reference> AND <date range> [AND <previous step>] AND <predicates>
/// GROUP BY pdi.person_id
/// ```
pub fn build_step_query(
    team_id: i32,
    filter: &Filter,
    entity: &Entity,
    bound: StepBound,
) -> Result<SelectStatement, FunnelError> {
    let pdi = Alias::new(PDI);
    let timestamp = (events::Entity, events::Column::Timestamp);

    let mut query = Query::select();
    query
        .expr_as(
            Expr::col((pdi.clone(), person_distinct_ids::Column::PersonId)),
            Alias::new(PERSON_ID),
        )
        .expr_as(Expr::col(timestamp).min(), Alias::new(STEP_TS))
        .from(events::Entity)
        .join_as(
            JoinType::InnerJoin,
            person_distinct_ids::Entity,
            pdi.clone(),
            Condition::all()
                .add(
                    Expr::col((pdi.clone(), person_distinct_ids::Column::DistinctId))
                        .equals((events::Entity, events::Column::DistinctId)),
                )
                .add(
                    Expr::col((pdi.clone(), person_distinct_ids::Column::TeamId))
                        .equals((events::Entity, events::Column::TeamId)),
                ),
        )
        .and_where(Expr::col((events::Entity, events::Column::TeamId)).eq(team_id))
        .cond_where(reference_condition(&entity.reference));

    if let Some(date_from) = filter.date_from {
        query.and_where(Expr::col(timestamp).gte(date_from));
    }
    if let Some(date_to) = filter.date_to {
        query.and_where(Expr::col(timestamp).lte(date_to));
    }

    if let StepBound::After(previous) = bound {
        query
            .and_where(
                Expr::col((pdi.clone(), person_distinct_ids::Column::PersonId))
                    .equals(previous.person_id()),
            )
            .and_where(Expr::col(timestamp).gte(Expr::col(previous.step_ts())));
    }

    let predicates = properties_condition(
        team_id,
        filter.properties.iter().chain(entity.properties.iter()),
    )?;
    if !predicates.is_empty() {
        query.cond_where(predicates);
    }

    query.group_by_col((pdi, person_distinct_ids::Column::PersonId));
    Ok(query)
}
