//! National Weather Service forecasts
//!
//! Two chained lookups: `GET /points/{lat},{lon}` yields the gridpoint forecast
//! URL, and that URL yields the forecast periods. The overnight low is the first
//! period named "Tonight"/"Overnight", else the first night-time period.

use std::time::Duration;

use async_trait::async_trait;
use freezealert_shared::{config, Coordinates};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_API_BASE: &str = "https://api.weather.gov";
const DEFAULT_USER_AGENT: &str = "FreezeAlert/1.0 (alerts@example.com)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("NWS {stage} API error: {status}")]
    Status { stage: &'static str, status: u16 },

    #[error("NWS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed NWS response: {0}")]
    Malformed(String),

    #[error("Could not find overnight forecast period")]
    NoOvernightPeriod,

    #[error("Temperature data missing from forecast period")]
    MissingTemperature,
}

/// Source of overnight low forecasts
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Tonight's low in whole degrees Fahrenheit
    async fn overnight_low(&self, coordinates: Coordinates) -> Result<i32, WeatherError>;
}

#[derive(Debug, Clone)]
pub struct NwsConfig {
    pub api_base: String,
    pub user_agent: String,
}

impl NwsConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: config::trim_base_url(&config::or_default("NWS_API_BASE", DEFAULT_API_BASE)),
            user_agent: config::or_default("NWS_USER_AGENT", DEFAULT_USER_AGENT),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    properties: PointsProperties,
}

#[derive(Debug, Deserialize)]
struct PointsProperties {
    forecast: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    pub name: String,
    pub temperature: Option<f64>,
    #[serde(default)]
    pub temperature_unit: Option<String>,
    pub is_daytime: bool,
}

/// Pick the overnight period and return its low in rounded Fahrenheit
pub fn select_overnight_low(periods: &[ForecastPeriod]) -> Result<i32, WeatherError> {
    let period = periods
        .iter()
        .find(|p| {
            let name = p.name.to_lowercase();
            name.contains("tonight") || name.contains("overnight")
        })
        .or_else(|| periods.iter().find(|p| !p.is_daytime))
        .ok_or(WeatherError::NoOvernightPeriod)?;

    let temperature = period.temperature.ok_or(WeatherError::MissingTemperature)?;
    let fahrenheit = match period.temperature_unit.as_deref() {
        Some("C") => temperature * 9.0 / 5.0 + 32.0,
        _ => temperature,
    };

    // Halves round up, so -2.5 becomes -2
    Ok((fahrenheit + 0.5).floor() as i32)
}

/// NWS API client
#[derive(Clone)]
pub struct NwsClient {
    http: reqwest::Client,
    config: NwsConfig,
}

impl NwsClient {
    pub fn new(config: NwsConfig) -> Result<Self, WeatherError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        stage: &'static str,
    ) -> Result<T, WeatherError> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/geo+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status {
                stage,
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| WeatherError::Malformed(format!("{}: {}", stage, e)))
    }
}

#[async_trait]
impl WeatherProvider for NwsClient {
    async fn overnight_low(&self, coordinates: Coordinates) -> Result<i32, WeatherError> {
        let points_url = format!(
            "{}/points/{},{}",
            self.config.api_base, coordinates.lat, coordinates.lon
        );
        let points: PointsResponse = self.get_json(&points_url, "points").await?;
        let forecast_url = points
            .properties
            .forecast
            .ok_or_else(|| WeatherError::Malformed("points: no forecast URL".to_string()))?;

        let forecast: ForecastResponse = self.get_json(&forecast_url, "forecast").await?;
        select_overnight_low(&forecast.properties.periods)
    }
}
