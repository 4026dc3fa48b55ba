//! Conversion trends for `get_trends`.

use std::collections::HashMap;

use trail_core::UtcDateTime;

use crate::error::FunnelError;
use crate::filter::Interval;
use crate::rows::BucketCounts;
use crate::types::TrendSeries;

/// Step pair requested by the caller, before it is checked against the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedSteps {
    /// First to last step.
    Full,
    Between(i64, i64),
}

impl RequestedSteps {
    /// Both bounds or neither, and each must be an integer.
    pub fn parse(from_step: Option<&str>, to_step: Option<&str>) -> Result<Self, FunnelError> {
        match (from_step, to_step) {
            (None, None) => Ok(RequestedSteps::Full),
            (Some(from), Some(to)) => Ok(RequestedSteps::Between(
                parse_step("from_step", from)?,
                parse_step("to_step", to)?,
            )),
            _ => Err(FunnelError::InvalidArgument(
                "from_step and to_step must be given together".to_string(),
            )),
        }
    }

    pub fn resolve(self, step_count: usize) -> Result<StepRange, FunnelError> {
        let last = step_count
            .checked_sub(1)
            .ok_or_else(|| FunnelError::InvalidFilter("Funnel filter has no steps".to_string()))?;

        match self {
            RequestedSteps::Full => Ok(StepRange {
                from_step: 0,
                to_step: last,
            }),
            RequestedSteps::Between(from, to) => Ok(StepRange {
                from_step: step_index("from_step", from, step_count)?,
                to_step: step_index("to_step", to, step_count)?,
            }),
        }
    }
}

fn parse_step(field: &str, raw: &str) -> Result<i64, FunnelError> {
    raw.trim().parse::<i64>().map_err(|_| {
        FunnelError::InvalidArgument(format!("{} must be an integer, got '{}'", field, raw))
    })
}

fn step_index(field: &str, value: i64, step_count: usize) -> Result<usize, FunnelError> {
    usize::try_from(value)
        .ok()
        .filter(|index| *index < step_count)
        .ok_or_else(|| {
            FunnelError::InvalidArgument(format!(
                "{} {} is out of range for a funnel with {} steps",
                field, value, step_count
            ))
        })
}

/// Validated step pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRange {
    pub from_step: usize,
    pub to_step: usize,
}

/// `round(100 * to / from, 1)`, or 0.0 when nobody entered.
pub fn conversion_percentage(from_count: i64, to_count: i64) -> f64 {
    if from_count <= 0 {
        return 0.0;
    }
    let percentage = to_count as f64 / from_count as f64 * 100.0;
    (percentage * 10.0).round() / 10.0
}

pub fn format_label(interval: Interval, bucket: UtcDateTime) -> String {
    if interval.is_sub_daily() {
        bucket.format("%a. %-d %B, %H:%M").to_string()
    } else {
        bucket.format("%a. %-d %B").to_string()
    }
}

pub fn format_day(interval: Interval, bucket: UtcDateTime) -> String {
    if interval.is_sub_daily() {
        bucket.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        bucket.format("%Y-%m-%d").to_string()
    }
}

/// Most buckets one trend series may span.
pub const MAX_TREND_BUCKETS: usize = 10_000;

/// Rejects ranges whose bucket count at `interval` exceeds
/// [`MAX_TREND_BUCKETS`], e.g. minute buckets over months of history.
pub fn ensure_bucket_limit(
    interval: Interval,
    date_from: UtcDateTime,
    date_to: UtcDateTime,
) -> Result<(), FunnelError> {
    let spanned = std::iter::successors(Some(interval.truncate(date_from)), |bucket| {
        interval.next(*bucket)
    })
    .take_while(|bucket| *bucket <= date_to)
    .take(MAX_TREND_BUCKETS + 1)
    .count();

    if spanned > MAX_TREND_BUCKETS {
        return Err(FunnelError::InvalidFilter(format!(
            "Range {} to {} spans more than {} {} buckets",
            date_from, date_to, MAX_TREND_BUCKETS, interval
        )));
    }
    Ok(())
}

/// Lays bucket conversions out over every bucket from `date_from` to
/// `date_to`, zero-filling buckets without rows.
pub fn build_trend_series(
    label: String,
    interval: Interval,
    date_from: UtcDateTime,
    date_to: UtcDateTime,
    buckets: &[BucketCounts],
    range: StepRange,
) -> TrendSeries {
    let conversions: HashMap<UtcDateTime, f64> = buckets
        .iter()
        .map(|bucket| {
            (
                interval.truncate(bucket.date),
                conversion_percentage(bucket.count(range.from_step), bucket.count(range.to_step)),
            )
        })
        .collect();

    let keys = interval.buckets(date_from, date_to);
    let data: Vec<f64> = keys
        .iter()
        .map(|key| conversions.get(key).copied().unwrap_or(0.0))
        .collect();

    TrendSeries {
        label,
        count: data.iter().sum(),
        labels: keys.iter().map(|key| format_label(interval, *key)).collect(),
        days: keys.iter().map(|key| format_day(interval, *key)).collect(),
        data,
    }
}
