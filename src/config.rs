// src/config.rs
//! Engine configuration: TOML file, then environment overrides, then sanitizing.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::TtlPolicy;
use crate::coordinator::CycleConfig;
use crate::sources::providers::{calfire, firms, nws, usdm};
use crate::sources::RetryPolicy;

const ENV_PATH: &str = "WILDFIRE_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/engine.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSection {
    pub interval_secs: u64,
    pub deadline_secs: u64,
    pub max_concurrency: usize,
}

impl Default for CycleSection {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
            deadline_secs: 120,
            max_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub call_timeout_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            call_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlSection {
    pub weather_mins: u64,
    pub drought_mins: u64,
    pub active_fire_mins: u64,
    pub incident_mins: u64,
}

impl Default for TtlSection {
    fn default() -> Self {
        Self {
            weather_mins: 60,
            drought_mins: 1_440,
            active_fire_mins: 120,
            incident_mins: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub backend: CacheBackend,
    pub dir: PathBuf,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            dir: PathBuf::from("cache"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSection {
    pub nws_base_url: String,
    pub usdm_base_url: String,
    pub firms_base_url: String,
    pub calfire_url: String,
    /// NWS rejects requests without an identifying User-Agent.
    pub user_agent: String,
    pub firms_source: String,
    pub firms_day_range: u8,
    pub firms_radius_km: f64,
    /// Usually supplied through `NASA_FIRMS_API_KEY` rather than the file.
    #[serde(skip_serializing)]
    pub firms_api_key: Option<String>,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            nws_base_url: nws::DEFAULT_NWS_BASE_URL.to_string(),
            usdm_base_url: usdm::DEFAULT_USDM_BASE_URL.to_string(),
            firms_base_url: firms::DEFAULT_FIRMS_BASE_URL.to_string(),
            calfire_url: calfire::DEFAULT_CALFIRE_URL.to_string(),
            user_agent: concat!("wildfire-risk/", env!("CARGO_PKG_VERSION")).to_string(),
            firms_source: "VIIRS_SNPP_NRT".to_string(),
            firms_day_range: 1,
            firms_radius_km: 50.0,
            firms_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cycle: CycleSection,
    pub retry: RetrySection,
    pub ttl: TtlSection,
    pub cache: CacheSection,
    pub upstream: UpstreamSection,
    /// Built-in California counties when unset.
    pub registry_path: Option<PathBuf>,
    pub export_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Parse TOML, apply env overrides and sanitize.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(s).context("parsing engine config")?;
        Ok(cfg.with_env_overrides().sanitized())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks:
    /// 1) $WILDFIRE_CONFIG_PATH
    /// 2) config/engine.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default().with_env_overrides().sanitized())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(key) = env_str("NASA_FIRMS_API_KEY") {
            self.upstream.firms_api_key = Some(key);
        }
        if let Some(n) = env_parse::<usize>("WILDFIRE_MAX_CONCURRENCY") {
            self.cycle.max_concurrency = n;
        }
        if let Some(s) = env_parse::<u64>("WILDFIRE_CYCLE_DEADLINE_SECS") {
            self.cycle.deadline_secs = s;
        }
        if let Some(p) = env_str("WILDFIRE_REGISTRY_PATH") {
            self.registry_path = Some(PathBuf::from(p));
        }
        if let Some(p) = env_str("WILDFIRE_EXPORT_PATH") {
            self.export_path = Some(PathBuf::from(p));
        }
        self
    }

    /// Out-of-range values fall back to defaults.
    pub fn sanitized(mut self) -> Self {
        let d = EngineConfig::default();
        if self.cycle.interval_secs == 0 {
            self.cycle.interval_secs = d.cycle.interval_secs;
        }
        if self.cycle.deadline_secs == 0 {
            self.cycle.deadline_secs = d.cycle.deadline_secs;
        }
        if !(1..=256).contains(&self.cycle.max_concurrency) {
            self.cycle.max_concurrency = d.cycle.max_concurrency;
        }
        if !(1..=10).contains(&self.retry.max_attempts) {
            self.retry.max_attempts = d.retry.max_attempts;
        }
        if self.retry.call_timeout_secs == 0 {
            self.retry.call_timeout_secs = d.retry.call_timeout_secs;
        }
        for (v, dv) in [
            (&mut self.ttl.weather_mins, d.ttl.weather_mins),
            (&mut self.ttl.drought_mins, d.ttl.drought_mins),
            (&mut self.ttl.active_fire_mins, d.ttl.active_fire_mins),
            (&mut self.ttl.incident_mins, d.ttl.incident_mins),
        ] {
            if *v == 0 {
                *v = dv;
            }
        }
        if !(1..=10).contains(&self.upstream.firms_day_range) {
            self.upstream.firms_day_range = d.upstream.firms_day_range;
        }
        if !self.upstream.firms_radius_km.is_finite() || self.upstream.firms_radius_km <= 0.0 {
            self.upstream.firms_radius_km = d.upstream.firms_radius_km;
        }
        if self.upstream.user_agent.trim().is_empty() {
            self.upstream.user_agent = d.upstream.user_agent;
        }
        self.upstream.firms_api_key = self
            .upstream
            .firms_api_key
            .take()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self
    }

    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            max_concurrency: self.cycle.max_concurrency,
            deadline: Duration::from_secs(self.cycle.deadline_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            call_timeout: Duration::from_secs(self.retry.call_timeout_secs),
        }
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        let mins = |m: u64| Duration::from_secs(m * 60);
        TtlPolicy {
            weather: mins(self.ttl.weather_mins),
            drought: mins(self.ttl.drought_mins),
            active_fire: mins(self.ttl.active_fire_mins),
            incident_feed: mins(self.ttl.incident_mins),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.cycle.interval_secs)
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_str(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    const OVERRIDES: [&str; 5] = [
        "NASA_FIRMS_API_KEY",
        "WILDFIRE_MAX_CONCURRENCY",
        "WILDFIRE_CYCLE_DEADLINE_SECS",
        "WILDFIRE_REGISTRY_PATH",
        "WILDFIRE_EXPORT_PATH",
    ];

    fn clear_env() {
        env::remove_var(ENV_PATH);
        for k in OVERRIDES {
            env::remove_var(k);
        }
    }

    #[serial_test::serial]
    #[test]
    fn partial_file_keeps_defaults_and_sanitizes() {
        clear_env();
        let cfg = EngineConfig::from_toml_str(
            r#"
            export_path = "out/risk.csv"
            [cycle]
            max_concurrency = 0
            deadline_secs = 30
            [ttl]
            weather_mins = 15
            [cache]
            backend = "file"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cycle.max_concurrency, 8);
        assert_eq!(cfg.cycle.deadline_secs, 30);
        assert_eq!(cfg.cycle.interval_secs, 3_600);
        assert_eq!(cfg.ttl_policy().weather, Duration::from_secs(900));
        assert_eq!(cfg.ttl_policy().drought, Duration::from_secs(86_400));
        assert_eq!(cfg.cache.backend, CacheBackend::File);
        assert_eq!(cfg.export_path, Some(PathBuf::from("out/risk.csv")));
        assert_eq!(cfg.upstream.firms_api_key, None);
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_file_values() {
        clear_env();
        env::set_var("WILDFIRE_MAX_CONCURRENCY", "3");
        env::set_var("WILDFIRE_CYCLE_DEADLINE_SECS", "not-a-number");
        env::set_var("NASA_FIRMS_API_KEY", "  abc123 ");
        let cfg = EngineConfig::from_toml_str("[cycle]\nmax_concurrency = 16\n").unwrap();
        clear_env();
        assert_eq!(cfg.cycle.max_concurrency, 3);
        assert_eq!(cfg.cycle.deadline_secs, 120);
        assert_eq!(cfg.upstream.firms_api_key.as_deref(), Some("abc123"));
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        clear_env();
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        assert_eq!(EngineConfig::load_default().unwrap(), EngineConfig::default());

        fs::create_dir_all("config").unwrap();
        fs::write(DEFAULT_PATH, "[retry]\nmax_attempts = 5\n").unwrap();
        assert_eq!(EngineConfig::load_default().unwrap().retry.max_attempts, 5);

        let explicit = tmp.path().join("other.toml");
        fs::write(&explicit, "[retry]\nmax_attempts = 2\n").unwrap();
        env::set_var(ENV_PATH, explicit.display().to_string());
        assert_eq!(EngineConfig::load_default().unwrap().retry.max_attempts, 2);

        env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(EngineConfig::load_default().is_err());

        clear_env();
        env::set_current_dir(&old).unwrap();
    }
}
