//! CAL FIRE statewide incident list, attributed to counties by name.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::SourceError;
use crate::registry::Entity;
use crate::sources::http;
use crate::sources::types::{Fetched, IncidentFields, SourceFields, SourceKind, Upstream};

pub const DEFAULT_CALFIRE_URL: &str =
    "https://www.fire.ca.gov/umbraco/api/IncidentApi/List?inactive=false";

/// Every county task within one cycle reuses the same statewide download, or its failure.
const SNAPSHOT_REUSE: Duration = Duration::from_secs(60);

static COUNTY_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:[,;/&]|\band\b)\s*").expect("county separator regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub name: String,
    /// Lowercased county names, without a trailing "county".
    pub counties: Vec<String>,
    pub acres_burned: f64,
}

type Snapshot = (Instant, Result<Arc<Vec<Incident>>, SourceError>);

pub struct CalFireIncidents {
    url: String,
    client: reqwest::Client,
    snapshot: Mutex<Option<Snapshot>>,
}

impl CalFireIncidents {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
            snapshot: Mutex::new(None),
        }
    }

    /// Single flight: the lock is held across the download, so concurrent callers
    /// wait for one request instead of issuing their own. A failed download is
    /// replayed to every caller until the reuse window ends.
    async fn incidents(&self) -> Result<Arc<Vec<Incident>>, SourceError> {
        let mut slot = self.snapshot.lock().await;
        if let Some((taken, outcome)) = slot.as_ref() {
            if taken.elapsed() < SNAPSHOT_REUSE {
                return outcome.clone();
            }
        }
        let outcome = self.download().await;
        match &outcome {
            Ok(list) => {
                tracing::debug!(target: "source", incidents = list.len(), "calfire snapshot refreshed")
            }
            Err(e) => tracing::warn!(target: "source", error = %e, "calfire download failed"),
        }
        *slot = Some((Instant::now(), outcome.clone()));
        outcome
    }

    async fn download(&self) -> Result<Arc<Vec<Incident>>, SourceError> {
        let body = http::get_json::<Value>(&self.client, &self.url).await?;
        Ok(Arc::new(parse_incidents(&body)?))
    }
}

#[async_trait]
impl Upstream for CalFireIncidents {
    async fn request(&self, entity: &Entity) -> Result<Fetched, SourceError> {
        let incidents = self.incidents().await?;
        Ok(Fetched::now(SourceFields::IncidentFeed(fields_for(
            entity, &incidents,
        ))))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::IncidentFeed
    }

    fn name(&self) -> &'static str {
        "calfire"
    }
}

/// Active incidents from the list endpoint. Accepts a bare array or `{"Incidents": [...]}`.
pub fn parse_incidents(body: &Value) -> Result<Vec<Incident>, SourceError> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Object(obj) => field(obj, "Incidents")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::UpstreamSchema("calfire: no incident list".into()))?,
        _ => {
            return Err(SourceError::UpstreamSchema(
                "calfire: expected an array or object".into(),
            ))
        }
    };

    Ok(rows
        .iter()
        .filter_map(Value::as_object)
        .filter(|row| is_active(row))
        .map(|row| Incident {
            name: field(row, "Name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            counties: counties(row),
            acres_burned: number(row, "AcresBurned").unwrap_or(0.0).max(0.0),
        })
        .collect())
}

/// Per-county view of a statewide list.
pub fn fields_for(entity: &Entity, incidents: &[Incident]) -> IncidentFields {
    let county = normalize_county(&entity.name);
    let mut out = IncidentFields {
        statewide_active_incidents: incidents.len() as u32,
        ..IncidentFields::default()
    };
    for inc in incidents.iter().filter(|i| i.counties.contains(&county)) {
        out.county_active_incidents += 1;
        out.county_acres_burned += inc.acres_burned;
    }
    out
}

fn is_active(row: &Map<String, Value>) -> bool {
    match field(row, "IsActive").or_else(|| field(row, "Active")) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "true"),
        _ => true,
    }
}

fn counties(row: &Map<String, Value>) -> Vec<String> {
    let mut out = Vec::new();
    for key in ["Counties", "County"] {
        match field(row, key) {
            Some(Value::String(s)) => out.extend(COUNTY_SPLIT.split(s).map(normalize_county)),
            Some(Value::Array(items)) => out.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .flat_map(|s| COUNTY_SPLIT.split(s))
                    .map(normalize_county),
            ),
            _ => {}
        }
    }
    out.retain(|c| !c.is_empty());
    out.sort();
    out.dedup();
    out
}

fn normalize_county(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    lower
        .strip_suffix(" county")
        .unwrap_or(&lower)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn field<'a>(row: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn number(row: &Map<String, Value>, key: &str) -> Option<f64> {
    match field(row, key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}
