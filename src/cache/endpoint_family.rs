use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Groups of provider endpoints that share a TTL and are invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointFamily {
    FoodSearch,
    FoodUnits,
    FoodLog,
    Calories,
    Activity,
    Body,
    Other,
}

impl EndpointFamily {
    pub const ALL: [EndpointFamily; 7] = [
        EndpointFamily::FoodSearch,
        EndpointFamily::FoodUnits,
        EndpointFamily::FoodLog,
        EndpointFamily::Calories,
        EndpointFamily::Activity,
        EndpointFamily::Body,
        EndpointFamily::Other,
    ];

    /// Classify an API path (no host, no query string).
    pub fn classify(path: &str) -> Self {
        let path = path.split('?').next().unwrap_or(path);
        routes()
            .iter()
            .find(|(re, _)| re.is_match(path))
            .map(|(_, family)| *family)
            .unwrap_or(EndpointFamily::Other)
    }

    /// Families whose cached reads a successful mutation on `self` makes stale.
    pub fn invalidated_by_mutation(&self) -> &'static [EndpointFamily] {
        use EndpointFamily::*;
        match self {
            FoodLog | Calories => &[FoodLog, Calories],
            FoodSearch => &[FoodSearch],
            FoodUnits => &[FoodUnits],
            Activity => &[Activity, Calories],
            Body => &[Body],
            Other => &EndpointFamily::ALL,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        let secs = match self {
            EndpointFamily::FoodSearch => 300,
            EndpointFamily::FoodUnits => 86_400,
            EndpointFamily::FoodLog => 60,
            EndpointFamily::Calories => 60,
            EndpointFamily::Activity => 600,
            EndpointFamily::Body => 600,
            EndpointFamily::Other => 60,
        };
        Duration::from_secs(secs)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointFamily::FoodSearch => "food_search",
            EndpointFamily::FoodUnits => "food_units",
            EndpointFamily::FoodLog => "food_log",
            EndpointFamily::Calories => "calories",
            EndpointFamily::Activity => "activity",
            EndpointFamily::Body => "body",
            EndpointFamily::Other => "other",
        }
    }
}

impl fmt::Display for EndpointFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// first match wins, so the calorie series sit ahead of the broader prefixes
fn routes() -> &'static Vec<(Regex, EndpointFamily)> {
    static ROUTES: OnceLock<Vec<(Regex, EndpointFamily)>> = OnceLock::new();
    ROUTES.get_or_init(|| {
        [
            (r"^/1/foods/search\.json$", EndpointFamily::FoodSearch),
            (r"^/1/foods/units\.json$", EndpointFamily::FoodUnits),
            (r"^/1/user/[^/]+/foods\.json$", EndpointFamily::FoodSearch),
            (r"^/1/user/[^/]+/foods/log/caloriesIn(/|\.json$)", EndpointFamily::Calories),
            (r"^/1/user/[^/]+/activities/calories(/|\.json$)", EndpointFamily::Calories),
            (r"^/1/user/[^/]+/foods/log(/|\.json$)", EndpointFamily::FoodLog),
            (r"^/1/user/[^/]+/activities(/|\.json$)", EndpointFamily::Activity),
            (r"^/1/user/[^/]+/body(/|\.json$)", EndpointFamily::Body),
        ]
        .into_iter()
        .map(|(pattern, family)| (Regex::new(pattern).expect("static route regex"), family))
        .collect()
    })
}
