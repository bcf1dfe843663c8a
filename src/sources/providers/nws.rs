use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SourceError;
use crate::registry::Entity;
use crate::sources::http;
use crate::sources::types::{Fetched, SourceFields, SourceKind, Upstream, WeatherFields};

pub const DEFAULT_NWS_BASE_URL: &str = "https://api.weather.gov";

#[derive(Debug, Deserialize)]
struct Points {
    properties: PointsProps,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointsProps {
    forecast: String,
    #[serde(default)]
    forecast_grid_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    properties: ForecastProps,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastProps {
    #[serde(default, alias = "updated")]
    update_time: Option<DateTime<Utc>>,
    periods: Vec<Period>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Period {
    temperature: Option<f64>,
    #[serde(default)]
    temperature_unit: Option<String>,
    #[serde(default)]
    wind_speed: Option<String>,
    #[serde(default)]
    wind_direction: Option<String>,
    #[serde(default)]
    short_forecast: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Grid {
    properties: GridProps,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProps {
    #[serde(default)]
    relative_humidity: Option<GridSeries>,
}
#[derive(Debug, Deserialize)]
struct GridSeries {
    #[serde(default)]
    values: Vec<GridValue>,
}
#[derive(Debug, Deserialize)]
struct GridValue {
    value: Option<f64>,
}

/// National Weather Service: `points` → `forecast` (+ `forecastGridData` for humidity).
pub struct NwsWeather {
    base_url: String,
    client: reqwest::Client,
}

impl NwsWeather {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn points_url(&self, entity: &Entity) -> String {
        format!("{}/points/{:.4},{:.4}", self.base_url, entity.lat, entity.lon)
    }

    /// Humidity is optional: a failed grid lookup degrades to `None`.
    async fn humidity(&self, grid_url: Option<&str>, entity: &Entity) -> Option<f64> {
        let url = grid_url?;
        match http::get_text(&self.client, url).await {
            Ok(body) => parse_grid_humidity(&body),
            Err(e) => {
                tracing::debug!(
                    target: "source",
                    entity = %entity.name, error = %e,
                    "nws grid humidity unavailable"
                );
                None
            }
        }
    }
}

#[async_trait]
impl Upstream for NwsWeather {
    async fn request(&self, entity: &Entity) -> Result<Fetched, SourceError> {
        let points: Points = http::get_json(&self.client, &self.points_url(entity)).await?;
        let forecast_body = http::get_text(&self.client, &points.properties.forecast).await?;
        let mut fetched = parse_forecast(&forecast_body)?;
        let humidity = self
            .humidity(points.properties.forecast_grid_data.as_deref(), entity)
            .await;
        if let SourceFields::Weather(w) = &mut fetched.fields {
            w.relative_humidity = humidity;
        }
        Ok(fetched)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Weather
    }

    fn name(&self) -> &'static str {
        "nws"
    }
}

/// Current conditions from the first forecast period. Humidity is left empty.
pub fn parse_forecast(body: &str) -> Result<Fetched, SourceError> {
    let forecast: Forecast = http::decode_json("nws forecast", body)?;
    let props = forecast.properties;
    let current = props
        .periods
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::UpstreamSchema("nws forecast has no periods".into()))?;

    let temperature_f = current.temperature.map(|t| {
        match current.temperature_unit.as_deref() {
            Some(u) if u.eq_ignore_ascii_case("C") => t * 9.0 / 5.0 + 32.0,
            _ => t,
        }
    });

    Ok(Fetched {
        fields: SourceFields::Weather(WeatherFields {
            temperature_f,
            wind_speed: non_empty(current.wind_speed),
            wind_direction: non_empty(current.wind_direction),
            relative_humidity: None,
            conditions: non_empty(current.short_forecast),
        }),
        issued_at: props.update_time,
    })
}

/// First non-null relative humidity value from gridpoint data.
pub fn parse_grid_humidity(body: &str) -> Option<f64> {
    let grid: Grid = serde_json::from_str(body).ok()?;
    grid.properties
        .relative_humidity?
        .values
        .into_iter()
        .find_map(|v| v.value)
        .filter(|h| (0.0..=100.0).contains(h))
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
