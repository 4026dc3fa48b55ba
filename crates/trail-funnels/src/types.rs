use serde::{Deserialize, Serialize};
use serde_json::Value;
use trail_core::UtcDateTime;
use trail_entities::funnels;
use utoipa::ToSchema;

use crate::filter::{EntityRef, EntityType};

/// Per-step funnel result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FunnelStepSummary {
    /// Event name for event steps, action id for action steps
    #[schema(value_type = Object)]
    pub action_id: EntityRef,
    pub name: String,
    pub order: u32,
    /// Up to 100 person ids, deepest progress first
    pub people: Vec<i32>,
    /// Every person who reached this step
    pub count: usize,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Mean seconds since the previous step; absent on the first step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_time: Option<f64>,
}

/// Conversion between two steps over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrendSeries {
    pub label: String,
    pub count: f64,
    pub data: Vec<f64>,
    pub labels: Vec<String>,
    pub days: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateFunnelRequest {
    pub name: Option<String>,
    #[schema(value_type = Object)]
    pub filters: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateFunnelRequest {
    pub name: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub filters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FunnelResponse {
    pub id: i32,
    pub team_id: i32,
    pub name: Option<String>,
    pub created_by_id: Option<i32>,
    #[schema(value_type = Object)]
    pub filters: Value,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: UtcDateTime,
}

impl From<funnels::Model> for FunnelResponse {
    fn from(funnel: funnels::Model) -> Self {
        Self {
            id: funnel.id,
            team_id: funnel.team_id,
            name: funnel.name,
            created_by_id: funnel.created_by_id,
            filters: funnel.filters,
            created_at: funnel.created_at,
            updated_at: funnel.updated_at,
        }
    }
}
