use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, TrackerError};
use crate::location::LocationProvider;
use crate::models::Coordinates;

#[derive(Debug, Clone, PartialEq)]
pub struct Weather {
    pub temperature_c: f64,
    pub humidity: f64,
    pub description: String,
    pub city: String,
}

impl Weather {
    /// "light rain" -> "Light rain"
    pub fn headline(&self) -> String {
        let mut chars = self.description.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

pub trait WeatherProvider: Send + Sync {
    fn current(&self, at: Coordinates) -> BoxFuture<'_, Result<Weather>>;
}

#[derive(Debug, Deserialize)]
struct OpenWeatherResponse {
    cod: Value, // 200 on success; errors come back as strings like "401"
    main: Option<OpenWeatherMain>,
    #[serde(default)]
    weather: Vec<OpenWeatherCondition>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherCondition {
    description: String,
}

impl OpenWeatherResponse {
    fn into_weather(self) -> Result<Weather> {
        let ok = match &self.cod {
            Value::Number(n) => n.as_i64() == Some(200),
            Value::String(s) => s == "200",
            _ => false,
        };
        if !ok {
            return Err(TrackerError::remote(format!("weather service answered {}", self.cod)));
        }

        let main = self
            .main
            .ok_or_else(|| TrackerError::remote("weather response without readings"))?;
        let description = self
            .weather
            .into_iter()
            .next()
            .map(|c| c.description)
            .unwrap_or_default();

        Ok(Weather {
            temperature_c: main.temp,
            humidity: main.humidity,
            description,
            city: self.name,
        })
    }
}

/// Current conditions from an OpenWeather-compatible endpoint, metric units.
pub struct OpenWeatherClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    async fn fetch(&self, at: Coordinates) -> Result<Weather> {
        let url = Url::parse_with_params(
            &self.url,
            &[
                ("lat", at.latitude.to_string()),
                ("lon", at.longitude.to_string()),
                ("units", "metric".to_string()),
                ("appid", self.api_key.clone()),
            ],
        )
        .map_err(|e| TrackerError::remote(format!("bad weather url: {}", e)))?;

        let body: OpenWeatherResponse = self.http.get(url).send().await?.json().await?;
        debug!("Weather response code {}", body.cod);
        body.into_weather()
    }
}

impl WeatherProvider for OpenWeatherClient {
    fn current(&self, at: Coordinates) -> BoxFuture<'_, Result<Weather>> {
        self.fetch(at).boxed()
    }
}

/// The rider dashboard's weather card. Any failure, including denied
/// location access, yields `None` ("Weather data unavailable").
pub async fn weather_card(
    location: &dyn LocationProvider,
    weather: &dyn WeatherProvider,
) -> Option<Weather> {
    let permission = match location.request_permission().await {
        Ok(permission) => permission,
        Err(e) => {
            warn!("Error requesting location for weather: {}", e);
            return None;
        }
    };
    if !permission.is_granted() {
        return None;
    }

    let result = async {
        let at = location.current_position().await?;
        weather.current(at).await
    }
    .await;

    match result {
        Ok(current) => Some(current),
        Err(e) => {
            warn!("Error fetching weather or location: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::StaticLocation;

    struct FixedWeather(Option<Weather>);

    impl WeatherProvider for FixedWeather {
        fn current(&self, _at: Coordinates) -> BoxFuture<'_, Result<Weather>> {
            let answer = self
                .0
                .clone()
                .ok_or_else(|| TrackerError::remote("timeout"));
            async move { answer }.boxed()
        }
    }

    fn sunny() -> Weather {
        Weather {
            temperature_c: 31.4,
            humidity: 70.0,
            description: "scattered clouds".to_string(),
            city: "Accra".to_string(),
        }
    }

    #[test]
    fn test_parse_success_response() {
        let body = r#"{
            "cod": 200,
            "name": "Accra",
            "main": { "temp": 29.6, "humidity": 78, "pressure": 1011 },
            "weather": [{ "id": 802, "main": "Clouds", "description": "scattered clouds", "icon": "03d" }]
        }"#;
        let response: OpenWeatherResponse = serde_json::from_str(body).unwrap();
        let weather = response.into_weather().unwrap();
        assert_eq!(weather.temperature_c, 29.6);
        assert_eq!(weather.humidity, 78.0);
        assert_eq!(weather.city, "Accra");
        assert_eq!(weather.headline(), "Scattered clouds");
    }

    #[test]
    fn test_error_code_is_rejected() {
        let body = r#"{ "cod": "401", "message": "Invalid API key" }"#;
        let response: OpenWeatherResponse = serde_json::from_str(body).unwrap();
        assert!(response.into_weather().is_err());
    }

    #[tokio::test]
    async fn test_weather_card_swallows_failures() {
        let here = StaticLocation::new(Coordinates {
            latitude: 5.65,
            longitude: -0.18,
        });
        assert_eq!(
            weather_card(&here, &FixedWeather(Some(sunny()))).await,
            Some(sunny())
        );
        assert_eq!(weather_card(&here, &FixedWeather(None)).await, None);
        assert_eq!(
            weather_card(&StaticLocation::denied(), &FixedWeather(Some(sunny()))).await,
            None
        );
    }
}
