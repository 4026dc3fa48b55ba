use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Alias, Condition, Expr, Query, SimpleExpr};
use serde_json::Value;
use trail_entities::{events, person_distinct_ids, persons};

use super::PDI;
use crate::error::FunnelError;
use crate::filter::{Comparand, PropertyFilter, PropertyOperator, PropertyType};

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Renders one predicate against a JSON `document` column.
///
/// Fails with `InvalidFilter` when the value cannot be compared with the
/// operator, e.g. a list with `icontains` or a non-numeric value with `gt`.
pub fn property_condition(
    property: &PropertyFilter,
    document: SimpleExpr,
) -> Result<Condition, FunnelError> {
    let key = property.key.as_str();
    let text = || Expr::expr(document.clone()).cast_json_field(key);
    let json = || Expr::expr(document.clone()).get_json_field(key);

    let condition = match (property.operator, property.comparand()?) {
        (PropertyOperator::IsSet, _) => Condition::all().add(Expr::expr(json()).is_not_null()),
        (PropertyOperator::IsNotSet, _) => Condition::all().add(Expr::expr(json()).is_null()),
        (PropertyOperator::Exact, Comparand::Missing) => {
            Condition::all().add(Expr::expr(text()).is_null())
        }
        (PropertyOperator::Exact, Comparand::List(values)) => {
            Condition::all().add(Expr::expr(text()).is_in(values))
        }
        (PropertyOperator::Exact, Comparand::Text(value)) => {
            Condition::all().add(Expr::expr(text()).eq(value))
        }
        (PropertyOperator::IsNot, Comparand::Missing) => {
            Condition::all().add(Expr::expr(text()).is_not_null())
        }
        (PropertyOperator::IsNot, Comparand::List(values)) => Condition::any()
            .add(Expr::expr(text()).is_null())
            .add(Expr::expr(text()).is_not_in(values)),
        (PropertyOperator::IsNot, Comparand::Text(value)) => Condition::any()
            .add(Expr::expr(text()).is_null())
            .add(Expr::expr(text()).ne(value)),
        (PropertyOperator::Icontains, Comparand::Text(value)) => {
            let pattern = format!("%{}%", escape_like(&value));
            Condition::all().add(Expr::expr(text()).ilike(pattern))
        }
        (PropertyOperator::NotIcontains, Comparand::Text(value)) => {
            let pattern = format!("%{}%", escape_like(&value));
            Condition::any()
                .add(Expr::expr(text()).is_null())
                .add(Expr::expr(text()).not_ilike(pattern))
        }
        // jsonb ordering keeps non-numeric properties from erroring out
        (PropertyOperator::Gt, Comparand::Number(n)) => {
            Condition::all().add(Expr::expr(json()).gt(Value::Number(n)))
        }
        (PropertyOperator::Lt, Comparand::Number(n)) => {
            Condition::all().add(Expr::expr(json()).lt(Value::Number(n)))
        }
        (operator, comparand) => {
            return Err(FunnelError::InvalidFilter(format!(
                "Property '{}': {:?} cannot be used with operator {:?}",
                key, comparand, operator
            )))
        }
    };

    Ok(condition)
}

/// ANDs every predicate for one step.
///
/// Event predicates read `events.properties`. Person predicates are
/// collected into a single `pdi.person_id IN (SELECT id FROM persons ...)`.
pub fn properties_condition<'a, I>(team_id: i32, properties: I) -> Result<Condition, FunnelError>
where
    I: IntoIterator<Item = &'a PropertyFilter>,
{
    let event_document: SimpleExpr = Expr::col((events::Entity, events::Column::Properties)).into();
    let person_document: SimpleExpr =
        Expr::col((persons::Entity, persons::Column::Properties)).into();

    let mut condition = Condition::all();
    let mut person_condition = Condition::all();

    for property in properties {
        match property.property_type {
            PropertyType::Event => {
                condition = condition.add(property_condition(property, event_document.clone())?)
            }
            PropertyType::Person => {
                person_condition =
                    person_condition.add(property_condition(property, person_document.clone())?)
            }
        }
    }

    if !person_condition.is_empty() {
        let mut persons_query = Query::select();
        persons_query
            .column((persons::Entity, persons::Column::Id))
            .from(persons::Entity)
            .and_where(Expr::col((persons::Entity, persons::Column::TeamId)).eq(team_id))
            .cond_where(person_condition);
        condition = condition.add(
            Expr::col((Alias::new(PDI), person_distinct_ids::Column::PersonId))
                .in_subquery(persons_query),
        );
    }

    Ok(condition)
}
