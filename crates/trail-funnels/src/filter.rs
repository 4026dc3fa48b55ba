//! Funnel filter model
//!
//! A funnel persists its configuration as the JSON blob dashboards send:
//!
//! ```json
//! {
//!   "events":  [{"id": "$pageview", "type": "events", "order": 0}],
//!   "actions": [{"id": 3, "type": "actions", "order": 1}],
//!   "properties": [{"key": "$browser", "value": "Chrome"}],
//!   "date_from": "-7d",
//!   "interval": "day"
//! }
//! ```
//!
//! [`Filter::parse`] turns that blob into ordered steps, property predicates
//! and a resolved date range. Relative dates are resolved against the `now`
//! handed in by the caller.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use trail_core::{DateTime, UtcDateTime};
use utoipa::ToSchema;

use crate::error::FunnelError;

/// Kind of thing a funnel step points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum EntityType {
    #[serde(rename = "events")]
    Events,
    #[serde(rename = "actions")]
    Actions,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Events => "events",
            EntityType::Actions => "actions",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an event name or an action id.
///
/// Serializes untagged, so an event step reports its name and an action
/// step reports its numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum EntityRef {
    Action(i32),
    Event(String),
}

impl EntityRef {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRef::Event(_) => EntityType::Events,
            EntityRef::Action(_) => EntityType::Actions,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Event(name) => f.write_str(name),
            EntityRef::Action(id) => write!(f, "{}", id),
        }
    }
}

/// One funnel step.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub reference: EntityRef,
    pub order: u32,
    pub name: Option<String>,
    /// Aggregation hint carried through untouched; funnels always count actors.
    pub math: Option<String>,
    pub properties: Vec<PropertyFilter>,
}

impl Entity {
    pub fn entity_type(&self) -> EntityType {
        self.reference.entity_type()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOperator {
    #[default]
    Exact,
    IsNot,
    Icontains,
    NotIcontains,
    Gt,
    Lt,
    IsSet,
    IsNotSet,
}

impl FromStr for PropertyOperator {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(PropertyOperator::Exact),
            "is_not" => Ok(PropertyOperator::IsNot),
            "icontains" => Ok(PropertyOperator::Icontains),
            "not_icontains" => Ok(PropertyOperator::NotIcontains),
            "gt" => Ok(PropertyOperator::Gt),
            "lt" => Ok(PropertyOperator::Lt),
            "is_set" => Ok(PropertyOperator::IsSet),
            "is_not_set" => Ok(PropertyOperator::IsNotSet),
            other => Err(FunnelError::InvalidFilter(format!(
                "Unknown property operator '{}'",
                other
            ))),
        }
    }
}

/// Which JSON document a predicate reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    #[default]
    Event,
    Person,
}

/// Predicate over event or person properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PropertyFilter {
    pub key: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub value: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub operator: PropertyOperator,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub property_type: PropertyType,
}

impl PropertyFilter {
    pub fn event(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            operator: PropertyOperator::Exact,
            property_type: PropertyType::Event,
        }
    }

    pub fn person(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            property_type: PropertyType::Person,
            ..Self::event(key, value)
        }
    }

    pub fn with_operator(mut self, operator: PropertyOperator) -> Self {
        self.operator = operator;
        self
    }

    /// Checks the value against the operator and returns what the
    /// predicate compares with.
    pub fn comparand(&self) -> Result<Comparand, FunnelError> {
        let comparand = match self.operator {
            PropertyOperator::IsSet | PropertyOperator::IsNotSet => Some(Comparand::Presence),
            PropertyOperator::Exact | PropertyOperator::IsNot => match &self.value {
                Value::Null => Some(Comparand::Missing),
                Value::Array(items) if !items.is_empty() => items
                    .iter()
                    .map(scalar_text)
                    .collect::<Option<Vec<_>>>()
                    .map(Comparand::List),
                other => scalar_text(other).map(Comparand::Text),
            },
            PropertyOperator::Icontains | PropertyOperator::NotIcontains => {
                scalar_text(&self.value).map(Comparand::Text)
            }
            PropertyOperator::Gt | PropertyOperator::Lt => match &self.value {
                Value::Number(n) => Some(Comparand::Number(n.clone())),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Comparand::Number),
                _ => None,
            },
        };

        comparand.ok_or_else(|| {
            FunnelError::InvalidFilter(format!(
                "Property '{}': value {} cannot be used with operator {:?}",
                self.key, self.value, self.operator
            ))
        })
    }
}

/// Right-hand side of a property predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparand {
    /// `is_set` / `is_not_set` ignore the value.
    Presence,
    /// `null` with `exact` / `is_not` tests for a missing property.
    Missing,
    Text(String),
    List(Vec<String>),
    Number(serde_json::Number),
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Width of a trend bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl Interval {
    /// Unit name understood by Postgres `date_trunc`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute => "minute",
            Interval::Hour => "hour",
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
        }
    }

    /// Start of the bucket containing `at`. Weeks start on Monday and
    /// months on the 1st, matching `date_trunc` in UTC.
    pub fn truncate(&self, at: UtcDateTime) -> UtcDateTime {
        let date = at.date_naive();
        match self {
            Interval::Minute => {
                midnight(date)
                    + Duration::hours(i64::from(at.hour()))
                    + Duration::minutes(i64::from(at.minute()))
            }
            Interval::Hour => midnight(date) + Duration::hours(i64::from(at.hour())),
            Interval::Day => midnight(date),
            Interval::Week => {
                midnight(date) - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Interval::Month => midnight(date) - Duration::days(i64::from(date.day0())),
        }
    }

    /// Start of the bucket after the one beginning at `bucket`.
    pub fn next(&self, bucket: UtcDateTime) -> Option<UtcDateTime> {
        match self {
            Interval::Minute => bucket.checked_add_signed(Duration::minutes(1)),
            Interval::Hour => bucket.checked_add_signed(Duration::hours(1)),
            Interval::Day => bucket.checked_add_signed(Duration::days(1)),
            Interval::Week => bucket.checked_add_signed(Duration::weeks(1)),
            Interval::Month => bucket.checked_add_months(Months::new(1)),
        }
    }

    /// Every bucket start from the bucket containing `from` up to `to`
    /// inclusive.
    pub fn buckets(&self, from: UtcDateTime, to: UtcDateTime) -> Vec<UtcDateTime> {
        let mut buckets = Vec::new();
        let mut current = Some(self.truncate(from));
        while let Some(bucket) = current {
            if bucket > to {
                break;
            }
            buckets.push(bucket);
            current = self.next(bucket);
        }
        buckets
    }

    /// Whether bucket keys carry a time of day.
    pub fn is_sub_daily(&self) -> bool {
        matches!(self, Interval::Minute | Interval::Hour)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(Interval::Minute),
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            "week" => Ok(Interval::Week),
            "month" => Ok(Interval::Month),
            other => Err(FunnelError::InvalidFilter(format!(
                "Unknown interval '{}', expected one of minute, hour, day, week, month",
                other
            ))),
        }
    }
}

fn midnight(date: NaiveDate) -> UtcDateTime {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Resolves the relative date forms dashboards use (`-7d`, `-2w`, `-1m`,
/// `-1y`, `-6h`, `dStart`, `mStart`, `yStart`).
///
/// Everything except `-Nh` lands on the start of a day.
pub fn relative_date_parse(input: &str, now: UtcDateTime) -> Option<UtcDateTime> {
    let today = midnight(now.date_naive());
    match input {
        "dStart" => return Some(today),
        "mStart" => return Some(Interval::Month.truncate(now)),
        "yStart" => return today.checked_sub_signed(Duration::days(i64::from(now.ordinal0()))),
        _ => {}
    }

    let body = input.strip_prefix('-')?;
    let unit = body.chars().last()?;
    let amount: u32 = body[..body.len() - unit.len_utf8()].parse().ok()?;

    let amount_i64 = i64::from(amount);
    match unit {
        'h' => now.checked_sub_signed(Duration::try_hours(amount_i64)?),
        'd' => today.checked_sub_signed(Duration::try_days(amount_i64)?),
        'w' => today.checked_sub_signed(Duration::try_weeks(amount_i64)?),
        'm' => today.checked_sub_months(Months::new(amount)),
        'y' => today.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    From,
    To,
}

impl Bound {
    fn field(&self) -> &'static str {
        match self {
            Bound::From => "date_from",
            Bound::To => "date_to",
        }
    }
}

/// Resolves `date_from` / `date_to`. A date-only `date_to` covers the whole day.
fn resolve_date(
    bound: Bound,
    raw: Option<&str>,
    now: UtcDateTime,
) -> Result<Option<UtcDateTime>, FunnelError> {
    let raw = match raw.map(str::trim) {
        None | Some("") | Some("all") => return Ok(None),
        Some(raw) => raw,
    };

    if let Some(resolved) = relative_date_parse(raw, now) {
        return Ok(Some(resolved));
    }

    let parsed = DateTime::parse(raw).map(|dt| dt.0).ok_or_else(|| {
        FunnelError::InvalidFilter(format!("Invalid {} '{}'", bound.field(), raw))
    })?;

    let date_only = NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok();
    if bound == Bound::To && date_only {
        return Ok(parsed.checked_add_signed(Duration::days(1) - Duration::microseconds(1)));
    }
    Ok(Some(parsed))
}

/// Parsed funnel configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Steps in ascending `order`.
    pub entities: Vec<Entity>,
    pub properties: Vec<PropertyFilter>,
    pub date_from: Option<UtcDateTime>,
    pub date_to: Option<UtcDateTime>,
    pub interval: Option<Interval>,
    pub display: Option<String>,
    pub breakdown: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFilter {
    #[serde(default)]
    events: Option<Vec<RawEntity>>,
    #[serde(default)]
    actions: Option<Vec<RawEntity>>,
    #[serde(default)]
    properties: Option<RawProperties>,
    #[serde(default)]
    date_from: Option<String>,
    #[serde(default)]
    date_to: Option<String>,
    #[serde(default)]
    interval: Option<String>,
    #[serde(default)]
    display: Option<String>,
    #[serde(default)]
    breakdown: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    id: Value,
    #[serde(default, rename = "type")]
    entity_type: Option<EntityType>,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    math: Option<String>,
    #[serde(default)]
    properties: Option<RawProperties>,
}

/// Predicate lists, or the older `{"key__operator": value}` map form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawProperties {
    List(Vec<PropertyFilter>),
    Map(serde_json::Map<String, Value>),
}

impl RawProperties {
    fn into_filters(self) -> Vec<PropertyFilter> {
        match self {
            RawProperties::List(list) => list,
            RawProperties::Map(map) => map
                .into_iter()
                .map(|(key, value)| {
                    let split = key.rsplit_once("__").and_then(|(base, suffix)| {
                        suffix
                            .parse::<PropertyOperator>()
                            .ok()
                            .map(|operator| (base.to_string(), operator))
                    });
                    let (key, operator) = split.unwrap_or((key, PropertyOperator::Exact));
                    PropertyFilter::event(key, value).with_operator(operator)
                })
                .collect(),
        }
    }
}

fn parse_properties(raw: Option<RawProperties>) -> Result<Vec<PropertyFilter>, FunnelError> {
    let properties = raw.map(RawProperties::into_filters).unwrap_or_default();
    if let Some(empty) = properties.iter().find(|p| p.key.trim().is_empty()) {
        return Err(FunnelError::InvalidFilter(format!(
            "Property predicate has an empty key: {:?}",
            empty
        )));
    }
    for property in &properties {
        property.comparand()?;
    }
    Ok(properties)
}

impl RawEntity {
    fn into_entity(self, list_type: EntityType, position: usize) -> Result<Entity, FunnelError> {
        let entity_type = self.entity_type.unwrap_or(list_type);
        let reference = match entity_type {
            EntityType::Events => match &self.id {
                Value::String(name) if !name.is_empty() => EntityRef::Event(name.clone()),
                other => {
                    return Err(FunnelError::InvalidFilter(format!(
                        "Event step id must be a non-empty string, got {}",
                        other
                    )))
                }
            },
            EntityType::Actions => {
                let id = match &self.id {
                    Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
                    Value::String(s) => s.trim().parse::<i32>().ok(),
                    _ => None,
                };
                EntityRef::Action(id.ok_or_else(|| {
                    FunnelError::InvalidFilter(format!(
                        "Action step id must be an integer, got {}",
                        self.id
                    ))
                })?)
            }
        };

        let order = match self.order {
            Some(order) => u32::try_from(order).map_err(|_| {
                FunnelError::InvalidFilter(format!("Step order must be non-negative, got {}", order))
            })?,
            None => u32::try_from(position)
                .map_err(|_| FunnelError::InvalidFilter("Too many funnel steps".into()))?,
        };

        Ok(Entity {
            reference,
            order,
            name: self.name,
            math: self.math,
            properties: parse_properties(self.properties)?,
        })
    }
}

impl Filter {
    /// Parses a stored filter blob. `null` is treated as an empty filter.
    pub fn parse(blob: &Value, now: UtcDateTime) -> Result<Self, FunnelError> {
        let raw: RawFilter = match blob {
            Value::Null => serde_json::from_value(Value::Object(Default::default())),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| FunnelError::InvalidFilter(e.to_string()))?;

        let raw_events = raw.events.unwrap_or_default();
        let raw_actions = raw.actions.unwrap_or_default();
        let event_count = raw_events.len();

        let mut entities = Vec::with_capacity(event_count + raw_actions.len());
        for (position, entity) in raw_events.into_iter().enumerate() {
            entities.push(entity.into_entity(EntityType::Events, position)?);
        }
        for (position, entity) in raw_actions.into_iter().enumerate() {
            entities.push(entity.into_entity(EntityType::Actions, event_count + position)?);
        }
        entities.sort_by_key(|entity| entity.order);

        if let Some(pair) = entities.windows(2).find(|w| w[0].order == w[1].order) {
            return Err(FunnelError::InvalidFilter(format!(
                "Duplicate step order {}",
                pair[0].order
            )));
        }

        let interval = raw
            .interval
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Interval::from_str)
            .transpose()?;

        let date_from = resolve_date(Bound::From, raw.date_from.as_deref(), now)?;
        let date_to = resolve_date(Bound::To, raw.date_to.as_deref(), now)?;
        if let (Some(from), Some(to)) = (date_from, date_to) {
            if from > to {
                return Err(FunnelError::InvalidFilter(format!(
                    "date_from {} is after date_to {}",
                    from.to_rfc3339(),
                    to.to_rfc3339()
                )));
            }
        }

        Ok(Filter {
            entities,
            properties: parse_properties(raw.properties)?,
            date_from,
            date_to,
            interval,
            display: raw.display,
            breakdown: raw.breakdown,
        })
    }

    pub fn step_count(&self) -> usize {
        self.entities.len()
    }

    /// Funnel computations need at least one step.
    pub fn ensure_steps(&self) -> Result<(), FunnelError> {
        if self.entities.is_empty() {
            return Err(FunnelError::InvalidFilter(
                "Funnel filter has no steps".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_date_range(mut self, from: UtcDateTime, to: UtcDateTime) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }
}
