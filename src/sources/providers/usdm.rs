//! US Drought Monitor county statistics (percent area per D-category).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::error::SourceError;
use crate::registry::Entity;
use crate::sources::http;
use crate::sources::types::{
    DroughtFields, DroughtLevel, Fetched, SourceFields, SourceKind, Upstream,
};

pub const DEFAULT_USDM_BASE_URL: &str = "https://usdmdataservices.unl.edu/api";

/// Maps are weekly; two weeks always covers the latest one.
const LOOKBACK_DAYS: i64 = 14;

pub struct UsdmDrought {
    base_url: String,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl UsdmDrought {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            clock,
        }
    }

    fn url(&self, fips: &str) -> String {
        let end = self.clock.now().date_naive();
        let start = end - Duration::days(LOOKBACK_DAYS);
        format!(
            "{}/CountyStatistics/GetDroughtSeverityStatisticsByAreaPercent?aoi={}&startdate={}&enddate={}&statisticsType=1",
            self.base_url,
            fips,
            start.format("%-m/%-d/%Y"),
            end.format("%-m/%-d/%Y"),
        )
    }
}

#[async_trait]
impl Upstream for UsdmDrought {
    async fn request(&self, entity: &Entity) -> Result<Fetched, SourceError> {
        let fips = entity
            .fips
            .as_deref()
            .filter(|f| f.len() == 5 && f.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| {
                SourceError::Misconfigured(format!("{} has no valid FIPS code", entity.name))
            })?;
        let body = http::get_json::<Value>(&self.client, &self.url(fips)).await?;
        parse_statistics(&body)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Drought
    }

    fn name(&self) -> &'static str {
        "usdm"
    }
}

/// Pick the latest map in the response and report its highest non-zero category.
pub fn parse_statistics(body: &Value) -> Result<Fetched, SourceError> {
    let rows = body
        .as_array()
        .ok_or_else(|| SourceError::UpstreamSchema("usdm: expected a JSON array".into()))?;

    let latest = rows
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|row| map_date(row).map(|d| (d, row)))
        .max_by_key(|(d, _)| *d)
        .ok_or_else(|| SourceError::UpstreamSchema("usdm: no dated rows".into()))?;

    let (date, row) = latest;
    let mut level = DroughtLevel::None;
    for (key, candidate) in [
        ("D0", DroughtLevel::AbnormallyDry),
        ("D1", DroughtLevel::Moderate),
        ("D2", DroughtLevel::Severe),
        ("D3", DroughtLevel::Extreme),
        ("D4", DroughtLevel::Exceptional),
    ] {
        match number(row, key) {
            Some(v) if v > 0.0 => level = candidate,
            Some(_) => {}
            None => {
                return Err(SourceError::UpstreamSchema(format!(
                    "usdm: row missing {key}"
                )))
            }
        }
    }

    Ok(Fetched {
        fields: SourceFields::Drought(DroughtFields::new(level)),
        issued_at: date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
    })
}

fn field<'a>(row: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn number(row: &Map<String, Value>, key: &str) -> Option<f64> {
    match field(row, key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn map_date(row: &Map<String, Value>) -> Option<NaiveDate> {
    let raw = match field(row, "MapDate").or_else(|| field(row, "ValidStart"))? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    NaiveDate::parse_from_str(&raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(&raw, "%Y-%m-%d"))
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S").map(|d| d.date()))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn highest_nonzero_category_wins_on_latest_map() {
        let body = json!([
            {"MapDate": "20250722", "None": "0.00", "D0": "100.00", "D1": "100.00",
             "D2": "80.00", "D3": "12.50", "D4": "0.00"},
            {"MapDate": "20250729", "None": 0.0, "D0": 100.0, "D1": 90.0,
             "D2": 40.0, "D3": 0.0, "D4": 0.0}
        ]);
        let f = parse_statistics(&body).unwrap();
        assert_eq!(
            f.fields,
            SourceFields::Drought(DroughtFields::new(DroughtLevel::Severe))
        );
        assert_eq!(f.issued_at.unwrap().date_naive().to_string(), "2025-07-29");
    }

    #[test]
    fn all_zero_is_no_drought() {
        let body = json!([{"MapDate": "2025-07-29", "None": 100, "D0": 0, "D1": 0,
                           "D2": 0, "D3": 0, "D4": 0}]);
        let f = parse_statistics(&body).unwrap();
        assert_eq!(
            f.fields,
            SourceFields::Drought(DroughtFields::new(DroughtLevel::None))
        );
    }

    #[test]
    fn empty_array_is_schema_error() {
        assert!(matches!(
            parse_statistics(&json!([])),
            Err(SourceError::UpstreamSchema(_))
        ));
    }
}
