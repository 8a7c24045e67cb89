use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::TrackerError;
use crate::models::position::Coordinates;

pub const UNNAMED_SHUTTLE: &str = "Unnamed Shuttle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuttleStatus {
    NotStarted,
    InProgress,
    Ended,
}

impl ShuttleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShuttleStatus::NotStarted => "not_started",
            ShuttleStatus::InProgress => "in_progress",
            ShuttleStatus::Ended => "ended",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ShuttleStatus::NotStarted => "Not Started",
            ShuttleStatus::InProgress => "In Progress",
            ShuttleStatus::Ended => "Trip Ended",
        }
    }
}

impl fmt::Display for ShuttleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ShuttleStatus {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" | "Not Started" | "Available" => Ok(ShuttleStatus::NotStarted),
            "in_progress" | "In Progress" => Ok(ShuttleStatus::InProgress),
            "ended" | "Trip Ended" => Ok(ShuttleStatus::Ended),
            other => Err(TrackerError::validation(format!("unknown shuttle status '{}'", other))),
        }
    }
}

impl TryFrom<String> for ShuttleStatus {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One tracked vehicle. Keyed by the owning driver's account id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Shuttle {
    pub shuttle_id: String,
    pub code: String, // operator-facing id painted on the vehicle
    pub name: String,
    pub driver_name: String,
    pub capacity: i32,
    pub occupied: i32,
    #[sqlx(try_from = "String")]
    pub status: ShuttleStatus,
    pub latitude: Option<f64>, // NULL until the first sample
    pub longitude: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Shuttle {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            UNNAMED_SHUTTLE
        } else {
            &self.name
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == ShuttleStatus::InProgress
    }

    pub fn position(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        }
    }

    /// Seat load in percent, for progress bars.
    pub fn load_percent(&self) -> f64 {
        if self.capacity <= 0 || self.occupied <= 0 {
            return 0.0;
        }
        f64::from(self.occupied) / f64::from(self.capacity) * 100.0
    }

    pub fn seats_label(&self) -> String {
        format!("{}/{} seats", self.occupied, self.capacity)
    }
}

/// Form input for registering a driver's shuttle.
#[derive(Debug, Clone, Deserialize)]
pub struct ShuttleRegistration {
    pub code: String,
    pub name: String,
    pub capacity: i32,
    pub driver_name: String,
}

impl ShuttleRegistration {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.code.trim().is_empty()
            || self.name.trim().is_empty()
            || self.driver_name.trim().is_empty()
        {
            return Err(TrackerError::validation("Please fill all fields."));
        }
        if self.capacity <= 0 {
            return Err(TrackerError::validation("Capacity must be a positive number."));
        }
        Ok(())
    }

    /// The record a fresh registration produces: not started, empty.
    pub fn into_shuttle(self, shuttle_id: &str) -> Shuttle {
        Shuttle {
            shuttle_id: shuttle_id.to_string(),
            code: self.code.trim().to_string(),
            name: self.name.trim().to_string(),
            driver_name: self.driver_name.trim().to_string(),
            capacity: self.capacity,
            occupied: 0,
            status: ShuttleStatus::NotStarted,
            latitude: None,
            longitude: None,
            last_updated: None,
        }
    }
}
