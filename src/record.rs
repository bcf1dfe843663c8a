//! Published per-entity result and its flat row rendering for API and export.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::{Contributions, MergedFields, RiskAssessment, RiskLevel};
use crate::sources::{ReadingStatus, SourceKind};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub entity: String,
    pub collected_at: DateTime<Utc>,
    pub fields: MergedFields,
    /// Always in 0..=10.
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub contributions: Contributions,
    pub sources: BTreeMap<SourceKind, ReadingStatus>,
}

impl RiskRecord {
    pub fn new(
        entity: impl Into<String>,
        collected_at: DateTime<Utc>,
        fields: MergedFields,
        assessment: RiskAssessment,
        sources: BTreeMap<SourceKind, ReadingStatus>,
    ) -> Self {
        Self {
            entity: entity.into(),
            collected_at,
            fields,
            risk_score: assessment.score,
            risk_level: assessment.level,
            contributions: assessment.contributions,
            sources,
        }
    }

    pub fn to_row(&self) -> RiskRow {
        let w = self.fields.weather.clone().unwrap_or_default();
        RiskRow {
            county: self.entity.clone(),
            timestamp: self.collected_at.format(TIMESTAMP_FORMAT).to_string(),
            temperature_f: w.temperature_f,
            wind_speed: w.wind_speed,
            wind_direction: w.wind_direction,
            relative_humidity: w.relative_humidity,
            conditions: w.conditions,
            drought_level: self.fields.drought_level().label().to_string(),
            active_fires_nearby: self.fields.active_fires_nearby(),
            risk_score: self.risk_score,
            fire_danger_level: self.risk_level.label().to_string(),
        }
    }
}

/// Flat view with a stable field order; `None` renders as JSON `null` or an empty CSV cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRow {
    pub county: String,
    pub timestamp: String,
    pub temperature_f: Option<f64>,
    pub wind_speed: Option<String>,
    pub wind_direction: Option<String>,
    pub relative_humidity: Option<f64>,
    pub conditions: Option<String>,
    pub drought_level: String,
    pub active_fires_nearby: Option<u32>,
    pub risk_score: u8,
    pub fire_danger_level: String,
}
