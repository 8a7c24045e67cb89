use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One entry of a shuttle's append-only position history.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PositionSample {
    pub position_id: i64, // bigserial
    pub shuttle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
