//! Risk scorer: additive contributions from merged source fields, capped at 10.
//!
//! Pure and deterministic. The month is an explicit input so the same field set
//! always scores the same.

use serde::{Deserialize, Serialize};

use crate::sources::{
    ActiveFireFields, DroughtFields, DroughtLevel, IncidentFields, ReadingStatus, SourceFields,
    SourceReading, WeatherFields,
};

pub const MAX_SCORE: u8 = 10;

/// Humidity assumed from the short forecast when the grid value is missing.
pub const HUMIDITY_CLEAR_OR_SUNNY: f64 = 35.0;
pub const HUMIDITY_FOG_OR_CLOUDY: f64 = 65.0;
pub const HUMIDITY_DEFAULT: f64 = 50.0;

/// One entity's fields for one cycle, absent where the source failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedFields {
    pub weather: Option<WeatherFields>,
    pub drought: Option<DroughtFields>,
    pub active_fire: Option<ActiveFireFields>,
    pub incidents: Option<IncidentFields>,
}

impl MergedFields {
    /// Fold usable readings into one field set. A fresh reading beats a stale one.
    pub fn merge(readings: &[SourceReading]) -> Self {
        let mut ordered: Vec<&SourceReading> =
            readings.iter().filter(|r| r.status.is_usable()).collect();
        // Ok after Stale so it overwrites.
        ordered.sort_by_key(|r| matches!(r.status, ReadingStatus::Ok));

        let mut out = MergedFields::default();
        for r in ordered {
            match &r.fields {
                Some(SourceFields::Weather(w)) => out.weather = Some(w.clone()),
                Some(SourceFields::Drought(d)) => out.drought = Some(d.clone()),
                Some(SourceFields::ActiveFire(a)) => out.active_fire = Some(a.clone()),
                Some(SourceFields::IncidentFeed(i)) => out.incidents = Some(i.clone()),
                None => {}
            }
        }
        out
    }

    pub fn drought_level(&self) -> DroughtLevel {
        self.drought
            .as_ref()
            .map(|d| d.level)
            .unwrap_or(DroughtLevel::Unknown)
    }

    pub fn active_fires_nearby(&self) -> Option<u32> {
        self.active_fire.as_ref().map(|a| a.active_fires_nearby)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            8..=u8::MAX => RiskLevel::VeryHigh,
            6..=7 => RiskLevel::High,
            4..=5 => RiskLevel::Elevated,
            2..=3 => RiskLevel::Moderate,
            _ => RiskLevel::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::Elevated => "Elevated",
            RiskLevel::High => "High",
            RiskLevel::VeryHigh => "Very High",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-factor points plus the derived inputs they were computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contributions {
    pub temperature: u8,
    pub humidity: u8,
    pub wind: u8,
    pub season: u8,
    pub red_flag: u8,
    pub drought: u8,
    pub active_fire: u8,
    pub effective_humidity: f64,
    pub humidity_estimated: bool,
    pub max_wind_mph: u32,
}

impl Contributions {
    pub fn total(&self) -> u32 {
        [
            self.temperature,
            self.humidity,
            self.wind,
            self.season,
            self.red_flag,
            self.drought,
            self.active_fire,
        ]
        .iter()
        .map(|&p| u32::from(p))
        .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub level: RiskLevel,
    pub contributions: Contributions,
}

/// Score `fields` for calendar `month` (1 = January).
pub fn score(fields: &MergedFields, month: u32) -> RiskAssessment {
    let weather = fields.weather.clone().unwrap_or_default();

    let (effective_humidity, humidity_estimated) = match weather.relative_humidity {
        Some(h) => (h, false),
        None => (estimate_humidity(weather.conditions.as_deref()), true),
    };
    let max_wind = weather
        .wind_speed
        .as_deref()
        .map(parse_max_wind)
        .unwrap_or(0);

    let mut c = Contributions {
        temperature: weather.temperature_f.map(temperature_points).unwrap_or(0),
        humidity: humidity_points(effective_humidity),
        wind: wind_points(max_wind),
        season: u8::from((6..=11).contains(&month)),
        drought: drought_points(fields.drought_level()),
        active_fire: if fields.active_fires_nearby().unwrap_or(0) > 0 {
            2
        } else {
            0
        },
        effective_humidity,
        humidity_estimated,
        max_wind_mph: max_wind,
        ..Contributions::default()
    };

    let hot = weather.temperature_f.is_some_and(|t| t >= 70.0);
    if hot && effective_humidity <= 30.0 && max_wind >= 15 {
        c.red_flag = 2;
    }

    let score = c.total().min(u32::from(MAX_SCORE)) as u8;
    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        contributions: c,
    }
}

fn temperature_points(t: f64) -> u8 {
    if t >= 90.0 {
        3
    } else if t >= 75.0 {
        2
    } else if t >= 60.0 {
        1
    } else {
        0
    }
}

fn humidity_points(h: f64) -> u8 {
    if h <= 20.0 {
        3
    } else if h <= 35.0 {
        2
    } else if h <= 50.0 {
        1
    } else {
        0
    }
}

fn wind_points(mph: u32) -> u8 {
    match mph {
        30..=u32::MAX => 3,
        20..=29 => 2,
        10..=19 => 1,
        _ => 0,
    }
}

fn drought_points(level: DroughtLevel) -> u8 {
    match level {
        DroughtLevel::Extreme | DroughtLevel::Exceptional => 2,
        DroughtLevel::Severe | DroughtLevel::Moderate => 1,
        _ => 0,
    }
}

/// Largest whitespace-separated all-digit token: "10 to 15 mph" → 15. Nothing parseable → 0.
pub fn parse_max_wind(text: &str) -> u32 {
    text.split_whitespace()
        .filter(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|t| t.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

pub fn estimate_humidity(conditions: Option<&str>) -> f64 {
    let text = conditions.unwrap_or_default().to_lowercase();
    if text.contains("clear") || text.contains("sunny") {
        HUMIDITY_CLEAR_OR_SUNNY
    } else if text.contains("fog") || text.contains("cloudy") {
        HUMIDITY_FOG_OR_CLOUDY
    } else {
        HUMIDITY_DEFAULT
    }
}
