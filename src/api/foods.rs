use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::CURRENT_USER;
use crate::client::FitbitClient;
use crate::error::{ApiError, ApiResult};
use crate::executor::outcome::ApiRequest;

/// One food to log, field names as the provider expects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodLogEntry {
    pub food_id: u64,
    pub meal_type_id: u32,
    pub unit_id: u32,
    pub amount: f64,
    /// yyyy-MM-dd
    pub date: String,
}

impl FoodLogEntry {
    pub fn for_today(food_id: u64, meal_type_id: u32, unit_id: u32, amount: f64) -> Self {
        Self {
            food_id,
            meal_type_id,
            unit_id,
            amount,
            date: Local::now().format("%Y-%m-%d").to_string(),
        }
    }

    fn to_request(&self) -> ApiRequest {
        ApiRequest::post(format!("/1/user/{}/foods/log.json", CURRENT_USER))
            .param("foodId", self.food_id)
            .param("mealTypeId", self.meal_type_id)
            .param("unitId", self.unit_id)
            .param("amount", self.amount)
            .param("date", &self.date)
    }
}

// Reads use caller-side transport retry; mutations never do, a retried POST
// could log the same food twice.
impl FitbitClient {
    pub async fn search_foods(&self, query: &str) -> ApiResult<Value> {
        let request = ApiRequest::get("/1/foods/search.json").param("query", query.trim());
        self.execute_with_retry(&request).await
    }

    pub async fn food_units(&self) -> ApiResult<Value> {
        self.execute_with_retry(&ApiRequest::get("/1/foods/units.json"))
            .await
    }

    pub async fn food_log(&self, date: &str) -> ApiResult<Value> {
        let request = ApiRequest::get(format!("/1/user/{}/foods/log/date/{}.json", CURRENT_USER, date));
        self.execute_with_retry(&request).await
    }

    pub async fn food_log_summary(&self, date: &str) -> ApiResult<Value> {
        let log = self.food_log(date).await?;
        Ok(log.get("summary").cloned().unwrap_or_else(|| json!({})))
    }

    /// Logs entries in order and stops at the first failure.
    pub async fn log_food(&self, entries: &[FoodLogEntry]) -> ApiResult<Vec<Value>> {
        let mut logged = Vec::with_capacity(entries.len());
        for entry in entries {
            let response = self.execute(&entry.to_request()).await.into_result().inspect_err(|e| {
                warn!(
                    "logging food {} failed after {} of {} entries: {}",
                    entry.food_id,
                    logged.len(),
                    entries.len(),
                    e
                );
            })?;
            let food_log = response.get("foodLog").cloned().ok_or_else(|| {
                ApiError::Decode(format!("log food response without 'foodLog': {}", response))
            })?;
            logged.push(food_log);
        }
        info!("logged {} food entries", logged.len());
        Ok(logged)
    }

    pub async fn update_food_log(&self, log_id: u64, amount: f64, unit_id: u32) -> ApiResult<Value> {
        let request = ApiRequest::post(format!("/1/user/{}/foods/log/{}.json", CURRENT_USER, log_id))
            .param("amount", amount)
            .param("unitId", unit_id);
        self.execute(&request).await.into_result()
    }

    pub async fn delete_food_log(&self, log_id: u64) -> ApiResult<()> {
        let request = ApiRequest::delete(format!("/1/user/{}/foods/log/{}.json", CURRENT_USER, log_id));
        self.execute(&request).await.into_result().map(|_| ())
    }
}
