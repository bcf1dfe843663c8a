// src/sources/types.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, SourceError};
use crate::registry::Entity;

/// One upstream capability. Weather is mandatory for an entity to be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Weather,
    Drought,
    ActiveFire,
    IncidentFeed,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Weather,
        SourceKind::Drought,
        SourceKind::ActiveFire,
        SourceKind::IncidentFeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Weather => "weather",
            SourceKind::Drought => "drought",
            SourceKind::ActiveFire => "active_fire",
            SourceKind::IncidentFeed => "incident_feed",
        }
    }

    /// Upstream data older than this (by its own issuance time) is served as `Stale`.
    pub fn max_age(&self) -> Option<Duration> {
        match self {
            SourceKind::Weather => Some(Duration::from_secs(12 * 3600)),
            SourceKind::Drought => Some(Duration::from_secs(14 * 24 * 3600)),
            SourceKind::ActiveFire | SourceKind::IncidentFeed => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherFields {
    pub temperature_f: Option<f64>,
    /// Raw forecast text, e.g. "10 to 15 mph".
    pub wind_speed: Option<String>,
    pub wind_direction: Option<String>,
    pub relative_humidity: Option<f64>,
    /// Short forecast, e.g. "Mostly Sunny".
    pub conditions: Option<String>,
}

/// US Drought Monitor category, lowest to highest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DroughtLevel {
    None,
    AbnormallyDry,
    Moderate,
    Severe,
    Extreme,
    Exceptional,
    #[default]
    Unknown,
}

impl DroughtLevel {
    /// D0..D4 index as 1..5; `None` and `Unknown` are 0.
    pub fn severity(&self) -> u8 {
        match self {
            DroughtLevel::None | DroughtLevel::Unknown => 0,
            DroughtLevel::AbnormallyDry => 1,
            DroughtLevel::Moderate => 2,
            DroughtLevel::Severe => 3,
            DroughtLevel::Extreme => 4,
            DroughtLevel::Exceptional => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DroughtLevel::None => "None",
            DroughtLevel::AbnormallyDry => "Abnormally Dry",
            DroughtLevel::Moderate => "Moderate",
            DroughtLevel::Severe => "Severe",
            DroughtLevel::Extreme => "Extreme",
            DroughtLevel::Exceptional => "Exceptional",
            DroughtLevel::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroughtFields {
    pub level: DroughtLevel,
    pub severity: u8,
}

impl DroughtFields {
    pub fn new(level: DroughtLevel) -> Self {
        Self {
            level,
            severity: level.severity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveFireFields {
    pub active_fires_nearby: u32,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentFields {
    pub county_active_incidents: u32,
    pub county_acres_burned: f64,
    pub statewide_active_incidents: u32,
}

/// Typed payload of one source; also the cached value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "fields", rename_all = "snake_case")]
pub enum SourceFields {
    Weather(WeatherFields),
    Drought(DroughtFields),
    ActiveFire(ActiveFireFields),
    IncidentFeed(IncidentFields),
}

impl SourceFields {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceFields::Weather(_) => SourceKind::Weather,
            SourceFields::Drought(_) => SourceKind::Drought,
            SourceFields::ActiveFire(_) => SourceKind::ActiveFire,
            SourceFields::IncidentFeed(_) => SourceKind::IncidentFeed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "kind")]
pub enum ReadingStatus {
    Ok,
    Stale,
    Failed(FailureKind),
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Ok => "ok",
            ReadingStatus::Stale => "stale",
            ReadingStatus::Failed(_) => "failed",
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, ReadingStatus::Ok | ReadingStatus::Stale)
    }
}

/// Outcome of one (entity, source) fetch within a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReading {
    pub source: SourceKind,
    pub entity: String,
    pub fetched_at: DateTime<Utc>,
    /// Absent exactly when `status` is `Failed`.
    pub fields: Option<SourceFields>,
    pub status: ReadingStatus,
    pub from_cache: bool,
    pub attempts: u32,
}

impl SourceReading {
    pub fn failed(
        source: SourceKind,
        entity: &str,
        fetched_at: DateTime<Utc>,
        kind: FailureKind,
        attempts: u32,
    ) -> Self {
        Self {
            source,
            entity: entity.to_string(),
            fetched_at,
            fields: None,
            status: ReadingStatus::Failed(kind),
            from_cache: false,
            attempts,
        }
    }
}

/// A successful upstream answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub fields: SourceFields,
    /// When the upstream says its data was produced, if it says so.
    pub issued_at: Option<DateTime<Utc>>,
}

impl Fetched {
    pub fn now(fields: SourceFields) -> Self {
        Self {
            fields,
            issued_at: None,
        }
    }
}

/// One request against an upstream API. Retry, timeout and caching live in `SourceClient`.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn request(&self, entity: &Entity) -> Result<Fetched, SourceError>;
    fn kind(&self) -> SourceKind;
    fn name(&self) -> &'static str;
}
