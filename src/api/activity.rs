use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::api::CURRENT_USER;
use crate::client::FitbitClient;
use crate::error::{ApiError, ApiResult};
use crate::executor::outcome::ApiRequest;
use crate::helpers::time::{elapsed_secs, get_instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityMetric {
    Steps,
    Calories,
    Heart,
    MinutesVeryActive,
    MinutesFairlyActive,
}

impl ActivityMetric {
    pub fn resource(&self) -> &'static str {
        match self {
            ActivityMetric::Steps => "steps",
            ActivityMetric::Calories => "calories",
            ActivityMetric::Heart => "heart",
            ActivityMetric::MinutesVeryActive => "minutesVeryActive",
            ActivityMetric::MinutesFairlyActive => "minutesFairlyActive",
        }
    }

    /// Key of the series array in the response body.
    pub fn series_key(&self) -> String {
        format!("activities-{}", self.resource())
    }
}

/// One day of the combined activity report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDay {
    pub date_time: String,
    pub steps: u64,
    pub activity_calories: u64,
    /// fat burn + 2 x cardio + 2 x peak
    pub zone_activity_minutes: u64,
    pub very_active_minutes: u64,
    pub fairly_active_minutes: u64,
}

impl FitbitClient {
    /// `period` is one of the provider ranges: 1d, 7d, 30d, 1w, 1m, 3m, 6m, 1y.
    pub async fn time_series(&self, metric: ActivityMetric, base_date: &str, period: &str) -> ApiResult<Vec<Value>> {
        let request = ApiRequest::get(format!(
            "/1/user/{}/activities/{}/date/{}/{}.json",
            CURRENT_USER,
            metric.resource(),
            base_date,
            period
        ));
        let body = self.execute_with_retry(&request).await?;
        series(&body, &metric.series_key())
    }

    pub async fn calories_in(&self, days: u32) -> ApiResult<Vec<Value>> {
        let request = ApiRequest::get(format!(
            "/1/user/{}/foods/log/caloriesIn/date/today/{}d.json",
            CURRENT_USER, days
        ));
        let body = self.execute_with_retry(&request).await?;
        series(&body, "foods-log-caloriesIn")
    }

    pub async fn weight(&self, days: u32) -> ApiResult<Vec<Value>> {
        let request = ApiRequest::get(format!(
            "/1/user/{}/body/weight/date/today/{}d.json",
            CURRENT_USER, days
        ));
        let body = self.execute_with_retry(&request).await?;
        series(&body, "body-weight")
    }

    /// Fetches the five activity series concurrently and joins them per day.
    pub async fn activity_report(&self, before_date: &str, period: &str) -> ApiResult<Vec<ActivityDay>> {
        let start = get_instant();
        let (steps, calories, heart, very_active, fairly_active) = tokio::try_join!(
            self.time_series(ActivityMetric::Steps, before_date, period),
            self.time_series(ActivityMetric::Calories, before_date, period),
            self.time_series(ActivityMetric::Heart, before_date, period),
            self.time_series(ActivityMetric::MinutesVeryActive, before_date, period),
            self.time_series(ActivityMetric::MinutesFairlyActive, before_date, period),
        )?;
        let days = combine_activity(&steps, &calories, &heart, &very_active, &fairly_active);
        info!(
            "activity report for {} days before {} built in {:.3}s",
            days.len(),
            before_date,
            elapsed_secs(start)
        );
        Ok(days)
    }
}

fn series(body: &Value, key: &str) -> ApiResult<Vec<Value>> {
    match body.get(key) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(ApiError::Decode(format!("'{}' is not an array: {}", key, other))),
        None => Ok(Vec::new()),
    }
}

/// Steps drive the day list; other series are matched by `dateTime`, missing days count as 0.
pub fn combine_activity(
    steps: &[Value],
    calories: &[Value],
    heart: &[Value],
    very_active: &[Value],
    fairly_active: &[Value],
) -> Vec<ActivityDay> {
    let calories = by_date(calories);
    let heart = by_date(heart);
    let very_active = by_date(very_active);
    let fairly_active = by_date(fairly_active);

    steps
        .iter()
        .filter_map(|item| {
            let date = item.get("dateTime")?.as_str()?.to_owned();
            Some(ActivityDay {
                steps: number(item.get("value")),
                activity_calories: number(calories.get(date.as_str()).copied()),
                zone_activity_minutes: heart
                    .get(date.as_str())
                    .map(|v| zone_minutes(v))
                    .unwrap_or(0),
                very_active_minutes: number(very_active.get(date.as_str()).copied()),
                fairly_active_minutes: number(fairly_active.get(date.as_str()).copied()),
                date_time: date,
            })
        })
        .collect()
}

fn by_date(items: &[Value]) -> HashMap<&str, &Value> {
    items
        .iter()
        .filter_map(|item| Some((item.get("dateTime")?.as_str()?, item.get("value")?)))
        .collect()
}

/// Series values arrive as strings ("1234") or numbers.
fn number(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|v| v.max(0.0) as u64).unwrap_or(0),
        Some(Value::Number(n)) => n.as_f64().map(|v| v.max(0.0) as u64).unwrap_or(0),
        _ => 0,
    }
}

fn zone_minutes(value: &Value) -> u64 {
    let Some(zones) = value.get("heartRateZones").and_then(Value::as_array) else {
        return 0;
    };
    zones
        .iter()
        .map(|zone| {
            let minutes = number(zone.get("minutes"));
            match zone.get("name").and_then(Value::as_str) {
                Some("Fat Burn") => minutes,
                Some("Cardio") | Some("Peak") => minutes * 2,
                _ => 0,
            }
        })
        .sum()
}
