use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::models::position::Coordinates;

/// Telemetry envelope published by the on-board GPS units.
#[derive(Debug, Deserialize)]
pub struct GpsMessage {
    pub data: GpsData,
    #[serde(default)]
    pub metadata: GpsMetadata,
}

#[derive(Debug, Deserialize)]
pub struct GpsData {
    #[serde(rename = "DEVICE_ID")]
    pub device_id: Option<String>,
    #[serde(rename = "GPS_DATETIME")]
    pub gps_datetime: Option<String>,
    #[serde(rename = "LATITUD", default, deserialize_with = "parse_f64_option")]
    pub latitude: Option<f64>,
    #[serde(rename = "LONGITUD", default, deserialize_with = "parse_f64_option")]
    pub longitude: Option<f64>,
    #[serde(rename = "FIX_")]
    pub fix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GpsMetadata {
    #[serde(rename = "DEVICE_ID")]
    pub device_id: Option<String>,
}

/// A usable position report.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    pub coordinates: Coordinates,
    pub captured_at: DateTime<Utc>,
}

impl GpsMessage {
    pub fn device_id(&self) -> Option<&String> {
        self.data.device_id.as_ref().or(self.metadata.device_id.as_ref())
    }

    /// Returns `None` for messages without a device, without coordinates,
    /// or flagged as having no satellite fix.
    pub fn into_fix(self) -> Option<GpsFix> {
        self.device_id()?;
        if self.data.fix.as_deref().map(str::trim) == Some("0") {
            return None;
        }
        let latitude = self.data.latitude?;
        let longitude = self.data.longitude?;
        let captured_at = self
            .data
            .gps_datetime
            .as_deref()
            .and_then(parse_gps_datetime)
            .unwrap_or_else(Utc::now);

        Some(GpsFix {
            coordinates: Coordinates { latitude, longitude },
            captured_at,
        })
    }
}

fn parse_gps_datetime(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|t| t.and_utc())
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        String(String),
        Float(f64),
    }

    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsing_string_coordinates() {
        let payload = r#"
        {
            "data": {
                "DEVICE_ID": "0848086072",
                "FIX_": "1",
                "GPS_DATETIME": "2025-11-29 06:15:15",
                "LATITUD": "+5.650494",
                "LONGITUD": "-0.186404",
                "SATELLITES": "9",
                "SPEED": "0.00"
            },
            "metadata": {
                "CLIENT_PORT": 47884,
                "WORKER_ID": 3
            },
            "uuid": "d52b1454-d43d-50fa-99ca-79515c904162"
        }
        "#;

        let msg: GpsMessage = serde_json::from_str(payload).unwrap();
        assert_eq!(msg.device_id().map(String::as_str), Some("0848086072"));
        let fix = msg.into_fix().unwrap();
        assert_eq!(fix.coordinates.latitude, 5.650494);
        assert_eq!(fix.coordinates.longitude, -0.186404);
        assert_eq!(fix.captured_at.to_rfc3339(), "2025-11-29T06:15:15+00:00");
    }

    #[test]
    fn test_device_id_from_metadata_and_numeric_coordinates() {
        let payload = r#"
        {
            "data": { "LATITUD": 5.65, "LONGITUD": -0.18, "GPS_DATETIME": "2025-11-29T06:15:15" },
            "metadata": { "DEVICE_ID": "bus-3" }
        }
        "#;

        let msg: GpsMessage = serde_json::from_str(payload).unwrap();
        assert_eq!(msg.device_id().map(String::as_str), Some("bus-3"));
        let fix = msg.into_fix().unwrap();
        assert_eq!(fix.coordinates, Coordinates { latitude: 5.65, longitude: -0.18 });
    }

    #[test]
    fn test_no_fix_is_dropped() {
        let payload = r#"
        { "data": { "DEVICE_ID": "bus-3", "FIX_": "0", "LATITUD": "", "LONGITUD": "" } }
        "#;

        let msg: GpsMessage = serde_json::from_str(payload).unwrap();
        assert!(msg.data.latitude.is_none());
        assert!(msg.into_fix().is_none());
    }
}
