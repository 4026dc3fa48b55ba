use sea_orm::sea_query::{Alias, Expr, Func, JoinType, Order, Query, SelectStatement};
use trail_entities::persons;

use super::step::{build_step_query, StepBound};
use super::{StepAlias, BUCKET_DATE};
use crate::error::FunnelError;
use crate::filter::{Filter, Interval};

/// Person fields carried on every funnel row.
pub const PERSON_COLUMNS: [persons::Column; 5] = [
    persons::Column::Id,
    persons::Column::CreatedAt,
    persons::Column::TeamId,
    persons::Column::Properties,
    persons::Column::IsIdentified,
];

/// One row per actor who matched the first step, with `step_0..step_n`
/// holding the matched timestamps (NULL from the first missed step on).
pub fn build_steps_query(team_id: i32, filter: &Filter) -> Result<SelectStatement, FunnelError> {
    filter.ensure_steps()?;

    let person_columns = PERSON_COLUMNS.map(|column| (persons::Entity, column));
    let first = StepAlias(0);

    let mut query = Query::select();
    query.columns(person_columns);
    for index in 0..filter.step_count() {
        let step = StepAlias(index);
        query.expr_as(Expr::col(step.step_ts()).min(), step.alias());
    }

    for (index, entity) in filter.entities.iter().enumerate() {
        let step = StepAlias(index);
        match index.checked_sub(1) {
            None => {
                query.from_subquery(
                    build_step_query(team_id, filter, entity, StepBound::First)?,
                    step.alias(),
                );
            }
            Some(previous) => {
                query.join_lateral(
                    JoinType::LeftJoin,
                    build_step_query(team_id, filter, entity, StepBound::After(StepAlias(previous)))?,
                    step.alias(),
                    Expr::cust("TRUE"),
                );
            }
        }
    }

    query
        .join(
            JoinType::InnerJoin,
            persons::Entity,
            Expr::col((persons::Entity, persons::Column::Id)).equals(first.person_id()),
        )
        .and_where(Expr::col(first.person_id()).is_not_null())
        .group_by_columns(person_columns)
        .order_by((persons::Entity, persons::Column::Id), Order::Asc);

    Ok(query)
}

/// Buckets the funnel rows by when each actor entered the funnel and counts
/// how many reached every step.
pub fn build_trends_query(
    team_id: i32,
    filter: &Filter,
    interval: Interval,
) -> Result<SelectStatement, FunnelError> {
    let steps = build_steps_query(team_id, filter)?;
    let bucket = Alias::new(BUCKET_DATE);

    let mut query = Query::select();
    query.expr_as(
        Func::cust(Alias::new("date_trunc"))
            .arg(interval.as_str())
            .arg(Expr::col(StepAlias(0).alias())),
        bucket.clone(),
    );
    for index in 0..filter.step_count() {
        let step = StepAlias(index);
        query.expr_as(Expr::col(step.alias()).count(), Alias::new(step.count_column()));
    }
    query
        .from_subquery(steps, Alias::new("steps_at_dates"))
        .group_by_col(bucket.clone())
        .order_by(bucket, Order::Asc);

    Ok(query)
}
