use chrono::Utc;
use sea_orm::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use trail_core::UtcDateTime;
use trail_entities::{actions, events, funnels};
use tracing::debug;

use crate::error::FunnelError;
use crate::filter::{Entity, EntityRef, Filter, Interval};
use crate::query::{build_steps_query, build_trends_query};
use crate::rows::{BucketCounts, StepMatchRow};
use crate::summary::summarize_steps;
use crate::trends::{build_trend_series, ensure_bucket_limit, RequestedSteps, StepRange};
use crate::types::{CreateFunnelRequest, FunnelStepSummary, TrendSeries, UpdateFunnelRequest};

/// Interval used for trends when the filter does not name one.
pub const DEFAULT_TREND_INTERVAL: Interval = Interval::Week;

pub struct FunnelService {
    db: Arc<DatabaseConnection>,
}

impl FunnelService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// List a team's funnels, oldest first
    pub async fn list_funnels(&self, team_id: i32) -> Result<Vec<funnels::Model>, FunnelError> {
        let funnels = funnels::Entity::find()
            .filter(funnels::Column::TeamId.eq(team_id))
            .filter(funnels::Column::Deleted.eq(false))
            .order_by_asc(funnels::Column::CreatedAt)
            .order_by_asc(funnels::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(funnels)
    }

    /// Get a funnel that belongs to the team and is not deleted
    pub async fn get_funnel(
        &self,
        team_id: i32,
        funnel_id: i32,
    ) -> Result<funnels::Model, FunnelError> {
        funnels::Entity::find_by_id(funnel_id)
            .filter(funnels::Column::TeamId.eq(team_id))
            .filter(funnels::Column::Deleted.eq(false))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| FunnelError::NotFound(format!("Funnel {} not found", funnel_id)))
    }

    /// Create a funnel. The filter blob is stored as given once it parses.
    pub async fn create_funnel(
        &self,
        team_id: i32,
        created_by_id: Option<i32>,
        request: CreateFunnelRequest,
    ) -> Result<funnels::Model, FunnelError> {
        Filter::parse(&request.filters, Utc::now())?;

        let funnel = funnels::ActiveModel {
            team_id: Set(team_id),
            created_by_id: Set(created_by_id),
            name: Set(request.name),
            deleted: Set(false),
            filters: Set(request.filters),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        debug!("Created funnel {} for team {}", funnel.id, team_id);
        Ok(funnel)
    }

    /// Update name and/or filters of an existing funnel
    pub async fn update_funnel(
        &self,
        team_id: i32,
        funnel_id: i32,
        request: UpdateFunnelRequest,
    ) -> Result<funnels::Model, FunnelError> {
        let funnel = self.get_funnel(team_id, funnel_id).await?;

        let mut funnel: funnels::ActiveModel = funnel.into();
        if let Some(filters) = request.filters {
            Filter::parse(&filters, Utc::now())?;
            funnel.filters = Set(filters);
        }
        if let Some(name) = request.name {
            funnel.name = Set(Some(name));
        }

        Ok(funnel.update(self.db.as_ref()).await?)
    }

    /// Delete a funnel (soft delete)
    pub async fn delete_funnel(&self, team_id: i32, funnel_id: i32) -> Result<(), FunnelError> {
        let funnel = self.get_funnel(team_id, funnel_id).await?;

        let mut funnel: funnels::ActiveModel = funnel.into();
        funnel.deleted = Set(true);
        funnel.update(self.db.as_ref()).await?;

        debug!("Deleted funnel {} for team {}", funnel_id, team_id);
        Ok(())
    }

    /// Step summaries for a stored funnel, one per step in step order.
    pub async fn get_steps(
        &self,
        team_id: i32,
        funnel_id: i32,
    ) -> Result<Vec<FunnelStepSummary>, FunnelError> {
        let funnel = self.get_funnel(team_id, funnel_id).await?;
        let filter = Filter::parse(&funnel.filters, Utc::now())?;
        self.calculate_steps(team_id, &filter).await
    }

    /// Step summaries for a filter blob that has not been saved.
    pub async fn preview_steps(
        &self,
        team_id: i32,
        filters: &Value,
    ) -> Result<Vec<FunnelStepSummary>, FunnelError> {
        let filter = Filter::parse(filters, Utc::now())?;
        self.calculate_steps(team_id, &filter).await
    }

    /// Conversion over time between two steps of a stored funnel.
    ///
    /// `from_step` / `to_step` arrive as raw strings and must be given
    /// together; without them the whole funnel is measured.
    pub async fn get_trends(
        &self,
        team_id: i32,
        funnel_id: i32,
        from_step: Option<&str>,
        to_step: Option<&str>,
    ) -> Result<Vec<TrendSeries>, FunnelError> {
        let requested = RequestedSteps::parse(from_step, to_step)?;
        let funnel = self.get_funnel(team_id, funnel_id).await?;

        let now = Utc::now();
        let filter = Filter::parse(&funnel.filters, now)?;
        let range = requested.resolve(filter.step_count())?;

        let series = self
            .calculate_trends(team_id, funnel.name.unwrap_or_default(), filter, range, now)
            .await?;
        Ok(vec![series])
    }

    async fn calculate_steps(
        &self,
        team_id: i32,
        filter: &Filter,
    ) -> Result<Vec<FunnelStepSummary>, FunnelError> {
        filter.ensure_steps()?;

        let names = self.step_names(team_id, &filter.entities).await?;
        let rows = self.fetch_step_rows(team_id, filter).await?;

        Ok(summarize_steps(&filter.entities, names, &rows))
    }

    async fn calculate_trends(
        &self,
        team_id: i32,
        label: String,
        filter: Filter,
        range: StepRange,
        now: UtcDateTime,
    ) -> Result<TrendSeries, FunnelError> {
        // unknown actions are not found, not an empty series
        self.step_names(team_id, &filter.entities).await?;

        let interval = filter.interval.unwrap_or(DEFAULT_TREND_INTERVAL);
        let date_to = filter.date_to.unwrap_or(now);
        let date_from = match filter.date_from {
            Some(date_from) => date_from,
            None => self
                .earliest_event_day(team_id)
                .await?
                .unwrap_or_else(|| Interval::Day.truncate(now)),
        };

        ensure_bucket_limit(interval, date_from, date_to)?;

        let filter = filter
            .with_date_range(date_from, date_to)
            .with_interval(interval);
        let buckets = self.fetch_bucket_rows(team_id, &filter, interval).await?;

        Ok(build_trend_series(
            label, interval, date_from, date_to, &buckets, range,
        ))
    }

    /// Display names per step: the event name, or the action's name.
    async fn step_names(
        &self,
        team_id: i32,
        entities: &[Entity],
    ) -> Result<Vec<String>, FunnelError> {
        let action_ids: Vec<i32> = entities
            .iter()
            .filter_map(|entity| match entity.reference {
                EntityRef::Action(id) => Some(id),
                EntityRef::Event(_) => None,
            })
            .collect();

        let action_names: HashMap<i32, String> = if action_ids.is_empty() {
            HashMap::new()
        } else {
            actions::Entity::find()
                .filter(actions::Column::TeamId.eq(team_id))
                .filter(actions::Column::Id.is_in(action_ids))
                .all(self.db.as_ref())
                .await?
                .into_iter()
                .map(|action| (action.id, action.name))
                .collect()
        };

        entities
            .iter()
            .map(|entity| match &entity.reference {
                EntityRef::Event(name) => Ok(name.clone()),
                EntityRef::Action(id) => action_names.get(id).cloned().ok_or_else(|| {
                    FunnelError::NotFound(format!("Action {} not found for team {}", id, team_id))
                }),
            })
            .collect()
    }

    async fn fetch_step_rows(
        &self,
        team_id: i32,
        filter: &Filter,
    ) -> Result<Vec<StepMatchRow>, FunnelError> {
        let db = self.db.as_ref();
        let statement = db
            .get_database_backend()
            .build(&build_steps_query(team_id, filter)?);
        debug!("Funnel steps query: {}", statement.sql);

        let rows = db.query_all(statement).await?;
        debug!(
            "Funnel steps query returned {} actors for team {}",
            rows.len(),
            team_id
        );

        let step_count = filter.step_count();
        Ok(rows
            .iter()
            .map(|row| StepMatchRow::decode(row, step_count))
            .collect::<Result<Vec<_>, DbErr>>()?)
    }

    async fn fetch_bucket_rows(
        &self,
        team_id: i32,
        filter: &Filter,
        interval: Interval,
    ) -> Result<Vec<BucketCounts>, FunnelError> {
        let db = self.db.as_ref();
        let statement = db
            .get_database_backend()
            .build(&build_trends_query(team_id, filter, interval)?);
        debug!("Funnel trends query: {}", statement.sql);

        let rows = db.query_all(statement).await?;
        debug!("Funnel trends query returned {} buckets", rows.len());

        let step_count = filter.step_count();
        Ok(rows
            .iter()
            .map(|row| BucketCounts::decode(row, step_count))
            .collect::<Result<Vec<_>, DbErr>>()?)
    }

    /// Day start of the team's first event, if it has any.
    async fn earliest_event_day(&self, team_id: i32) -> Result<Option<UtcDateTime>, FunnelError> {
        let earliest = events::Entity::find()
            .filter(events::Column::TeamId.eq(team_id))
            .order_by_asc(events::Column::Timestamp)
            .one(self.db.as_ref())
            .await?;
        Ok(earliest.map(|event| Interval::Day.truncate(event.timestamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, TimeZone};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> UtcDateTime {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn funnel_model(id: i32, team_id: i32, filters: Value) -> funnels::Model {
        funnels::Model {
            id,
            team_id,
            created_by_id: None,
            name: Some("Signup funnel".to_string()),
            deleted: false,
            filters,
            created_at: at(2024, 1, 1, 0, 0),
            updated_at: at(2024, 1, 1, 0, 0),
        }
    }

    fn step_row(
        person_id: i32,
        steps: &[Option<UtcDateTime>],
    ) -> BTreeMap<&'static str, sea_orm::Value> {
        const STEP_COLUMNS: [&str; 3] = ["step_0", "step_1", "step_2"];
        let mut row = BTreeMap::new();
        row.insert("id", person_id.into());
        row.insert("created_at", at(2024, 1, 1, 0, 0).into());
        row.insert("team_id", 1i32.into());
        row.insert("properties", json!({}).into());
        row.insert("is_identified", false.into());
        for (column, step) in STEP_COLUMNS.iter().zip(steps) {
            row.insert(*column, (*step).into());
        }
        row
    }

    fn bucket_row(date: UtcDateTime, counts: &[i64]) -> BTreeMap<&'static str, sea_orm::Value> {
        const COUNT_COLUMNS: [&str; 3] = ["step_0_count", "step_1_count", "step_2_count"];
        let mut row = BTreeMap::new();
        row.insert("date", date.into());
        for (column, count) in COUNT_COLUMNS.iter().zip(counts) {
            row.insert(*column, (*count).into());
        }
        row
    }

    fn two_step_filters() -> Value {
        json!({
            "events": [
                {"id": "$pageview", "type": "events", "order": 0},
                {"id": "signup", "type": "events", "order": 1}
            ]
        })
    }

    fn mock_service(db: MockDatabase) -> FunnelService {
        FunnelService::new(Arc::new(db.into_connection()))
    }

    #[tokio::test]
    async fn test_get_steps_summarizes_rows() {
        let t = at(2024, 1, 10, 9, 0);
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, two_step_filters())]])
                .append_query_results([vec![
                    step_row(1, &[Some(t), Some(t + Duration::seconds(30))]),
                    step_row(2, &[Some(t), None]),
                    step_row(3, &[Some(t), Some(t + Duration::seconds(90))]),
                ]]),
        );

        let steps = service.get_steps(1, 1).await.unwrap();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].action_id, EntityRef::Event("$pageview".into()));
        assert_eq!(steps[0].name, "$pageview");
        assert_eq!(steps[0].count, 3);
        assert_eq!(steps[0].people, vec![1, 3, 2]);
        assert_eq!(steps[1].count, 2);
        assert_eq!(steps[1].people, vec![1, 3]);
        assert_eq!(steps[1].average_time, Some(60.0));
    }

    #[tokio::test]
    async fn test_get_steps_resolves_action_names() {
        let filters = json!({
            "events": [{"id": "$pageview", "order": 0}],
            "actions": [{"id": 5, "order": 1}]
        });
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, filters)]])
                .append_query_results([vec![actions::Model {
                    id: 5,
                    team_id: 1,
                    name: "Signed up".to_string(),
                    deleted: false,
                    created_at: at(2024, 1, 1, 0, 0),
                }]])
                .append_query_results([Vec::<BTreeMap<&str, sea_orm::Value>>::new()]),
        );

        let steps = service.get_steps(1, 1).await.unwrap();

        assert_eq!(steps[1].action_id, EntityRef::Action(5));
        assert_eq!(steps[1].name, "Signed up");
        assert_eq!(steps[1].entity_type, crate::filter::EntityType::Actions);
        assert!(steps.iter().all(|s| s.count == 0));
    }

    #[tokio::test]
    async fn test_get_steps_unknown_action_is_not_found() {
        let filters = json!({"actions": [{"id": 99}]});
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, filters)]])
                .append_query_results([Vec::<actions::Model>::new()]),
        );

        let err = service.get_steps(1, 1).await.unwrap_err();
        assert!(matches!(err, FunnelError::NotFound(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_get_steps_missing_funnel_is_not_found() {
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<funnels::Model>::new()]),
        );

        let err = service.get_steps(1, 42).await.unwrap_err();
        assert!(matches!(err, FunnelError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_steps_without_steps_is_invalid_filter() {
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, json!({}))]]),
        );

        let err = service.get_steps(1, 1).await.unwrap_err();
        assert!(matches!(err, FunnelError::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn test_preview_steps_uses_unsaved_filters() {
        let t = at(2024, 2, 1, 12, 0);
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![
                step_row(7, &[Some(t), Some(t + Duration::seconds(10))]),
            ]]),
        );

        let steps = service
            .preview_steps(1, &two_step_filters())
            .await
            .unwrap();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].name, "signup");
        assert_eq!(steps[1].people, vec![7]);
        assert_eq!(steps[1].average_time, Some(10.0));

        let err = service
            .preview_steps(1, &json!({"events": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn test_get_trends_rejects_unpaired_steps_before_querying() {
        let service = mock_service(MockDatabase::new(DatabaseBackend::Postgres));

        let err = service.get_trends(1, 1, Some("0"), None).await.unwrap_err();
        assert!(matches!(err, FunnelError::InvalidArgument(_)));

        let err = service.get_trends(1, 1, Some("a"), Some("1")).await.unwrap_err();
        assert!(matches!(err, FunnelError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_get_trends_rejects_out_of_range_step() {
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, two_step_filters())]]),
        );

        let err = service
            .get_trends(1, 1, Some("0"), Some("2"))
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_get_trends_fills_weekly_buckets() {
        let mut filters = two_step_filters();
        filters["date_from"] = json!("2024-01-01");
        filters["date_to"] = json!("2024-01-21");
        filters["interval"] = json!("week");

        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, filters)]])
                .append_query_results([vec![
                    bucket_row(at(2024, 1, 1, 0, 0), &[10, 4]),
                    bucket_row(at(2024, 1, 15, 0, 0), &[4, 1]),
                ]]),
        );

        let series = service.get_trends(1, 1, None, None).await.unwrap();

        assert_eq!(series.len(), 1);
        let series = &series[0];
        assert_eq!(series.label, "Signup funnel");
        assert_eq!(series.days, vec!["2024-01-01", "2024-01-08", "2024-01-15"]);
        assert_eq!(series.data, vec![40.0, 0.0, 25.0]);
        assert_eq!(series.labels[0], "Mon. 1 January");
        assert_eq!(series.count, 65.0);
    }

    #[tokio::test]
    async fn test_get_trends_defaults_range_to_first_event() {
        let first_event = events::Model {
            id: 1,
            team_id: 1,
            event: "$pageview".to_string(),
            distinct_id: "a".to_string(),
            properties: json!({}),
            timestamp: Utc::now() - Duration::days(20),
            created_at: Utc::now(),
        };
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, two_step_filters())]])
                .append_query_results([vec![first_event.clone()]])
                .append_query_results([Vec::<BTreeMap<&str, sea_orm::Value>>::new()]),
        );

        let series = service.get_trends(1, 1, None, None).await.unwrap();

        let first_week = Interval::Week.truncate(first_event.timestamp);
        assert_eq!(series[0].days[0], first_week.format("%Y-%m-%d").to_string());
        assert!(series[0].days.len() >= 3);
        assert!(series[0].data.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_get_trends_without_events_starts_today() {
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, two_step_filters())]])
                .append_query_results([Vec::<events::Model>::new()])
                .append_query_results([Vec::<BTreeMap<&str, sea_orm::Value>>::new()]),
        );

        let series = service.get_trends(1, 1, None, None).await.unwrap();

        let today = Utc::now();
        let this_week = Interval::Week.truncate(today);
        assert_eq!(series[0].days, vec![this_week.format("%Y-%m-%d").to_string()]);
        assert_eq!(series[0].data, vec![0.0]);
        assert_eq!(this_week.weekday(), chrono::Weekday::Mon);
    }

    #[tokio::test]
    async fn test_create_funnel_rejects_invalid_filters() {
        let service = mock_service(MockDatabase::new(DatabaseBackend::Postgres));

        let err = service
            .create_funnel(
                1,
                None,
                CreateFunnelRequest {
                    name: Some("Broken".into()),
                    filters: json!({"interval": "fortnight"}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn test_get_trends_unknown_action_is_not_found() {
        let filters = json!({
            "events": [{"id": "$pageview", "order": 0}],
            "actions": [{"id": 99, "order": 1}],
            "date_from": "2024-01-01"
        });
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, filters)]])
                .append_query_results([Vec::<actions::Model>::new()]),
        );

        let err = service.get_trends(1, 1, None, None).await.unwrap_err();
        assert!(matches!(err, FunnelError::NotFound(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_get_trends_rejects_too_many_buckets() {
        let mut filters = two_step_filters();
        filters["interval"] = json!("minute");
        filters["date_from"] = json!("2023-01-01");
        filters["date_to"] = json!("2024-01-01");
        let service = mock_service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![funnel_model(1, 1, filters)]]),
        );

        let err = service.get_trends(1, 1, None, None).await.unwrap_err();
        assert!(matches!(err, FunnelError::InvalidFilter(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_create_funnel_rejects_mistyped_predicate() {
        let service = mock_service(MockDatabase::new(DatabaseBackend::Postgres));

        let err = service
            .create_funnel(
                1,
                None,
                CreateFunnelRequest {
                    name: Some("Big spenders".into()),
                    filters: json!({
                        "events": [{
                            "id": "purchase",
                            "properties": [{"key": "revenue", "operator": "gt", "value": "lots"}]
                        }]
                    }),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::InvalidFilter(_)), "{:?}", err);
    }

    mod postgres {
        use super::*;
        use trail_database::test_utils::TestDatabase;
        use trail_entities::{action_events, person_distinct_ids, persons, teams};

        struct Seed {
            db: Arc<DatabaseConnection>,
            team_id: i32,
        }

        impl Seed {
            async fn new(db: Arc<DatabaseConnection>) -> Self {
                let team = teams::ActiveModel {
                    name: Set("Test Team".to_string()),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(db.as_ref())
                .await
                .expect("Failed to insert team");
                Self {
                    db,
                    team_id: team.id,
                }
            }

            async fn person(&self, distinct_ids: &[&str], properties: Value) -> i32 {
                let person = persons::ActiveModel {
                    team_id: Set(self.team_id),
                    created_at: Set(Utc::now()),
                    properties: Set(properties),
                    is_identified: Set(false),
                    ..Default::default()
                }
                .insert(self.db.as_ref())
                .await
                .expect("Failed to insert person");

                for distinct_id in distinct_ids {
                    person_distinct_ids::ActiveModel {
                        team_id: Set(self.team_id),
                        person_id: Set(person.id),
                        distinct_id: Set((*distinct_id).to_owned()),
                        ..Default::default()
                    }
                    .insert(self.db.as_ref())
                    .await
                    .expect("Failed to insert distinct id");
                }
                person.id
            }

            async fn event(&self, distinct_id: &str, event: &str, timestamp: UtcDateTime) -> i64 {
                self.event_with(distinct_id, event, timestamp, json!({})).await
            }

            async fn event_with(
                &self,
                distinct_id: &str,
                event: &str,
                timestamp: UtcDateTime,
                properties: Value,
            ) -> i64 {
                events::ActiveModel {
                    team_id: Set(self.team_id),
                    event: Set(event.to_string()),
                    distinct_id: Set(distinct_id.to_string()),
                    properties: Set(properties),
                    timestamp: Set(timestamp),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(self.db.as_ref())
                .await
                .expect("Failed to insert event")
                .id
            }

            async fn action(&self, name: &str, event_ids: &[i64]) -> i32 {
                let action = actions::ActiveModel {
                    team_id: Set(self.team_id),
                    name: Set(name.to_string()),
                    deleted: Set(false),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(self.db.as_ref())
                .await
                .expect("Failed to insert action");

                action_events::Entity::insert_many(event_ids.iter().map(|event_id| {
                    action_events::ActiveModel {
                        action_id: Set(action.id),
                        event_id: Set(*event_id),
                    }
                }))
                .exec_without_returning(self.db.as_ref())
                .await
                .expect("Failed to link action events");
                action.id
            }

            async fn funnel(&self, service: &FunnelService, filters: Value) -> i32 {
                service
                    .create_funnel(
                        self.team_id,
                        None,
                        CreateFunnelRequest {
                            name: Some("Signup funnel".to_string()),
                            filters,
                        },
                    )
                    .await
                    .expect("Failed to create funnel")
                    .id
            }
        }

        async fn setup() -> (Seed, FunnelService) {
            let test_db = TestDatabase::with_migrations()
                .await
                .expect("Failed to create test database");
            let db = test_db.db.clone();
            (Seed::new(db.clone()).await, FunnelService::new(db))
        }

        #[tokio::test]
        async fn test_pageview_to_signup_funnel() {
            let (seed, service) = setup().await;
            let start = at(2024, 1, 10, 9, 0);

            // 10 viewers, the first 4 sign up 1..4 minutes later
            let mut converted = Vec::new();
            for i in 0..10 {
                let distinct_id = format!("viewer-{}", i);
                let person_id = seed.person(&[&distinct_id], json!({})).await;
                seed.event(&distinct_id, "$pageview", start).await;
                if i < 4 {
                    seed.event(&distinct_id, "signup", start + Duration::minutes(i + 1))
                        .await;
                    converted.push(person_id);
                }
            }
            let funnel_id = seed.funnel(&service, two_step_filters()).await;

            let steps = service.get_steps(seed.team_id, funnel_id).await.unwrap();

            assert_eq!(steps.len(), 2);
            assert_eq!(steps[0].count, 10);
            assert_eq!(steps[1].count, 4);
            assert_eq!(steps[1].average_time, Some(150.0));
            // converters rank first on step 0
            assert_eq!(&steps[0].people[..4], converted.as_slice());
            assert_eq!(steps[1].people, converted);

            let trends = service
                .get_trends(seed.team_id, funnel_id, Some("0"), Some("1"))
                .await
                .unwrap();
            let week = Interval::Week.truncate(start).format("%Y-%m-%d").to_string();
            let index = trends[0].days.iter().position(|d| *d == week).unwrap();
            assert_eq!(trends[0].data[index], 40.0);
            assert_eq!(trends[0].count, 40.0);
        }

        #[tokio::test]
        async fn test_second_step_alone_does_not_count() {
            let (seed, service) = setup().await;
            let t = at(2024, 2, 1, 12, 0);

            seed.person(&["only-signup"], json!({})).await;
            seed.event("only-signup", "signup", t).await;
            seed.person(&["viewer"], json!({})).await;
            seed.event("viewer", "$pageview", t).await;
            let funnel_id = seed.funnel(&service, two_step_filters()).await;

            let steps = service.get_steps(seed.team_id, funnel_id).await.unwrap();

            assert_eq!(steps[0].count, 1);
            assert_eq!(steps[1].count, 0);
            assert_eq!(steps[1].average_time, Some(0.0));
        }

        #[tokio::test]
        async fn test_steps_must_happen_in_order() {
            let (seed, service) = setup().await;
            let t = at(2024, 2, 1, 12, 0);

            // signed up before viewing: not converted
            let early = seed.person(&["early"], json!({})).await;
            seed.event("early", "signup", t).await;
            seed.event("early", "$pageview", t + Duration::minutes(5)).await;

            // earliest signup after the first view is used
            let both = seed.person(&["both"], json!({})).await;
            seed.event("both", "signup", t - Duration::minutes(10)).await;
            seed.event("both", "$pageview", t).await;
            seed.event("both", "signup", t + Duration::seconds(45)).await;
            seed.event("both", "signup", t + Duration::minutes(30)).await;

            let funnel_id = seed.funnel(&service, two_step_filters()).await;
            let steps = service.get_steps(seed.team_id, funnel_id).await.unwrap();

            assert_eq!(steps[0].count, 2);
            assert_eq!(steps[1].people, vec![both]);
            assert!(!steps[1].people.contains(&early));
            assert_eq!(steps[1].average_time, Some(45.0));
        }

        #[tokio::test]
        async fn test_three_steps_chain_on_the_previous_step() {
            let (seed, service) = setup().await;
            let t = at(2024, 2, 5, 9, 0);

            // view, signup after 3 minutes, paid 2 minutes after signup
            let full = seed.person(&["full"], json!({})).await;
            seed.event("full", "$pageview", t).await;
            seed.event("full", "signup", t + Duration::minutes(3)).await;
            seed.event("full", "paid", t + Duration::minutes(5)).await;

            // paid without signing up: stops at step 0
            let skipper = seed.person(&["skipper"], json!({})).await;
            seed.event("skipper", "$pageview", t).await;
            seed.event("skipper", "paid", t + Duration::minutes(1)).await;

            let funnel_id = seed
                .funnel(
                    &service,
                    json!({
                        "events": [
                            {"id": "$pageview", "order": 0},
                            {"id": "signup", "order": 1},
                            {"id": "paid", "order": 2}
                        ]
                    }),
                )
                .await;
            let steps = service.get_steps(seed.team_id, funnel_id).await.unwrap();

            assert_eq!(
                steps.iter().map(|s| s.count).collect::<Vec<_>>(),
                vec![2, 1, 1]
            );
            assert_eq!(steps[0].people, vec![full, skipper]);
            assert_eq!(steps[1].people, vec![full]);
            assert_eq!(steps[2].people, vec![full]);
            assert_eq!(steps[0].average_time, None);
            assert_eq!(steps[1].average_time, Some(180.0));
            // measured from signup, not from the first view
            assert_eq!(steps[2].average_time, Some(120.0));
        }

        #[tokio::test]
        async fn test_distinct_ids_of_one_person_are_merged() {
            let (seed, service) = setup().await;
            let t = at(2024, 2, 3, 8, 0);

            let person = seed.person(&["anon-123", "user@example.com"], json!({})).await;
            seed.event("anon-123", "$pageview", t).await;
            seed.event("user@example.com", "signup", t + Duration::minutes(2)).await;

            let funnel_id = seed.funnel(&service, two_step_filters()).await;
            let steps = service.get_steps(seed.team_id, funnel_id).await.unwrap();

            assert_eq!(steps[0].people, vec![person]);
            assert_eq!(steps[1].people, vec![person]);
            assert_eq!(steps[1].average_time, Some(120.0));
        }

        #[tokio::test]
        async fn test_action_step_and_property_predicates() {
            let (seed, service) = setup().await;
            let t = at(2024, 3, 5, 10, 0);

            let pro = seed.person(&["pro-user"], json!({"plan": "pro"})).await;
            seed.event_with("pro-user", "$pageview", t, json!({"$browser": "Chrome"}))
                .await;
            let pro_click = seed
                .event("pro-user", "$autocapture", t + Duration::minutes(1))
                .await;

            let free = seed.person(&["free-user"], json!({"plan": "free"})).await;
            seed.event_with("free-user", "$pageview", t, json!({"$browser": "Chrome"}))
                .await;
            let free_click = seed
                .event("free-user", "$autocapture", t + Duration::minutes(1))
                .await;

            let safari = seed.person(&["safari-user"], json!({"plan": "pro"})).await;
            seed.event_with("safari-user", "$pageview", t, json!({"$browser": "Safari"}))
                .await;

            let action_id = seed
                .action("Clicked upgrade", &[pro_click, free_click])
                .await;

            let funnel_id = seed
                .funnel(
                    &service,
                    json!({
                        "events": [{
                            "id": "$pageview",
                            "order": 0,
                            "properties": [{"key": "$browser", "value": "Chrome"}]
                        }],
                        "actions": [{
                            "id": action_id,
                            "order": 1,
                            "properties": [{"key": "plan", "value": "pro", "type": "person"}]
                        }]
                    }),
                )
                .await;

            let steps = service.get_steps(seed.team_id, funnel_id).await.unwrap();

            assert_eq!(steps[0].people, vec![pro, free]);
            assert!(!steps[0].people.contains(&safari));
            assert_eq!(steps[1].name, "Clicked upgrade");
            assert_eq!(steps[1].action_id, EntityRef::Action(action_id));
            assert_eq!(steps[1].people, vec![pro]);
        }

        #[tokio::test]
        async fn test_trends_weekly_buckets_with_gap() {
            let (seed, service) = setup().await;

            // weeks of 2024-01-01, 2024-01-08 (empty) and 2024-01-15
            for (i, day) in [(0, 2), (1, 3), (2, 16), (3, 17)] {
                let id = format!("p{}", i);
                seed.person(&[&id], json!({})).await;
                seed.event(&id, "$pageview", at(2024, 1, day, 10, 0)).await;
                if i != 1 {
                    seed.event(&id, "signup", at(2024, 1, day, 11, 0)).await;
                }
            }

            let mut filters = two_step_filters();
            filters["date_from"] = json!("2024-01-01");
            filters["date_to"] = json!("2024-01-21");
            let funnel_id = seed.funnel(&service, filters).await;

            let trends = service
                .get_trends(seed.team_id, funnel_id, None, None)
                .await
                .unwrap();

            assert_eq!(trends[0].days, vec!["2024-01-01", "2024-01-08", "2024-01-15"]);
            assert_eq!(trends[0].data, vec![50.0, 0.0, 100.0]);
            assert_eq!(trends[0].count, 150.0);
        }

        #[tokio::test]
        async fn test_funnel_crud() {
            let (seed, service) = setup().await;

            let funnel_id = seed.funnel(&service, two_step_filters()).await;
            let funnel = service.get_funnel(seed.team_id, funnel_id).await.unwrap();
            assert_eq!(funnel.name.as_deref(), Some("Signup funnel"));
            assert!(!funnel.deleted);

            let updated = service
                .update_funnel(
                    seed.team_id,
                    funnel_id,
                    UpdateFunnelRequest {
                        name: Some("Renamed".into()),
                        filters: None,
                    },
                )
                .await
                .unwrap();
            assert_eq!(updated.name.as_deref(), Some("Renamed"));
            assert_eq!(updated.filters, two_step_filters());
            assert!(updated.updated_at >= funnel.updated_at);

            let listed = service.list_funnels(seed.team_id).await.unwrap();
            assert_eq!(listed.iter().map(|f| f.id).collect::<Vec<_>>(), vec![funnel_id]);

            // other teams cannot see it
            assert!(matches!(
                service.get_funnel(seed.team_id + 100_000, funnel_id).await,
                Err(FunnelError::NotFound(_))
            ));

            service.delete_funnel(seed.team_id, funnel_id).await.unwrap();
            assert!(matches!(
                service.get_steps(seed.team_id, funnel_id).await,
                Err(FunnelError::NotFound(_))
            ));
            assert!(service.list_funnels(seed.team_id).await.unwrap().is_empty());
        }
    }
}
