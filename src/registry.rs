//! Entity registry: the fixed set of counties a cycle scores.
//!
//! Loaded once at startup, from a TOML/JSON file or the built-in California table.
//! Lookup is case-insensitive; iteration keeps load order.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// 5-digit county FIPS code, needed by the drought source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fips: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
            fips: None,
        }
    }

    pub fn with_fips(mut self, fips: impl Into<String>) -> Self {
        self.fips = Some(fips.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl EntityRegistry {
    /// Validate and index. Fails on empty input, blank or duplicate names, out-of-range coordinates.
    pub fn from_entities(entities: Vec<Entity>) -> Result<Self, EngineError> {
        if entities.is_empty() {
            return Err(EngineError::RegistryEmpty);
        }
        let mut index = HashMap::with_capacity(entities.len());
        for (i, e) in entities.iter().enumerate() {
            let key = normalize(&e.name);
            if key.is_empty() {
                return Err(EngineError::InvalidRegistry(format!(
                    "entity #{i} has a blank name"
                )));
            }
            if !(-90.0..=90.0).contains(&e.lat) || !(-180.0..=180.0).contains(&e.lon) {
                return Err(EngineError::InvalidRegistry(format!(
                    "{}: coordinates out of range ({}, {})",
                    e.name, e.lat, e.lon
                )));
            }
            if index.insert(key, i).is_some() {
                return Err(EngineError::InvalidRegistry(format!(
                    "duplicate entity name: {}",
                    e.name
                )));
            }
        }
        Ok(Self { entities, index })
    }

    pub fn lookup(&self, name: &str) -> Result<&Entity, EngineError> {
        self.index
            .get(&normalize(name))
            .map(|&i| &self.entities[i])
            .ok_or_else(|| EngineError::NotFound(name.trim().to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All 58 California counties with a representative point and FIPS code.
    pub fn california() -> Self {
        let entities = CALIFORNIA_COUNTIES
            .iter()
            .map(|&(name, lat, lon, fips)| Entity::new(name, lat, lon).with_fips(fips))
            .collect();
        // Static table, validated by `california_table_is_valid`.
        match Self::from_entities(entities) {
            Ok(r) => r,
            Err(e) => unreachable!("built-in registry invalid: {e}"),
        }
    }

    /// Load from an explicit path. Supports TOML (`[[entities]]`) or a JSON array.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading entity registry from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let entities = parse_entities(&content, ext.as_str())?;
        Self::from_entities(entities)
            .with_context(|| format!("validating entity registry {}", path.display()))
    }
}

fn parse_entities(s: &str, hint_ext: &str) -> Result<Vec<Entity>> {
    let try_toml = hint_ext == "toml" || s.contains("[[entities]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str::<Vec<Entity>>(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported entity registry format"))
}

fn parse_toml(s: &str) -> Result<Vec<Entity>> {
    #[derive(Deserialize)]
    struct TomlRegistry {
        #[serde(default)]
        entities: Vec<Entity>,
    }
    let v: TomlRegistry = toml::from_str(s)?;
    Ok(v.entities)
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

const CALIFORNIA_COUNTIES: &[(&str, f64, f64, &str)] = &[
    // Southern California
    ("Los Angeles", 34.0522, -118.2437, "06037"),
    ("San Diego", 32.7157, -117.1611, "06073"),
    ("Orange", 33.7175, -117.8311, "06059"),
    ("Riverside", 33.9533, -117.3962, "06065"),
    ("San Bernardino", 34.1083, -117.2898, "06071"),
    ("Ventura", 34.3705, -119.1391, "06111"),
    ("Santa Barbara", 34.4208, -119.6982, "06083"),
    ("Imperial", 32.8474, -115.5694, "06025"),
    ("San Luis Obispo", 35.2828, -120.6596, "06079"),
    // Central Valley
    ("Fresno", 36.7378, -119.7871, "06019"),
    ("Kern", 35.3733, -119.0187, "06029"),
    ("Kings", 36.0853, -119.8197, "06031"),
    ("Tulare", 36.2078, -118.8398, "06107"),
    ("Madera", 37.0549, -119.7703, "06039"),
    ("Merced", 37.3022, -120.4830, "06047"),
    ("Stanislaus", 37.5091, -120.9876, "06099"),
    ("San Joaquin", 37.9577, -121.2908, "06077"),
    // Bay Area
    ("San Francisco", 37.7749, -122.4194, "06075"),
    ("Alameda", 37.6017, -121.7195, "06001"),
    ("Contra Costa", 37.9161, -121.9544, "06013"),
    ("San Mateo", 37.5630, -122.3255, "06081"),
    ("Santa Clara", 37.3541, -121.9552, "06085"),
    ("Marin", 38.0834, -122.7633, "06041"),
    ("Sonoma", 38.2910, -122.4580, "06097"),
    ("Napa", 38.5025, -122.2654, "06055"),
    ("Solano", 38.2494, -121.9018, "06095"),
    // Sacramento region
    ("Sacramento", 38.5816, -121.4944, "06067"),
    ("Placer", 39.0916, -120.8039, "06061"),
    ("El Dorado", 38.7296, -120.5357, "06017"),
    ("Yolo", 38.6846, -121.9018, "06113"),
    ("Sutter", 39.0270, -121.6922, "06101"),
    ("Yuba", 39.2696, -121.2617, "06115"),
    // North State
    ("Shasta", 40.5865, -122.3917, "06089"),
    ("Tehama", 40.1278, -122.3044, "06103"),
    ("Butte", 39.6519, -121.5991, "06007"),
    ("Glenn", 39.5985, -122.3916, "06021"),
    ("Colusa", 39.1796, -122.2411, "06011"),
    ("Siskiyou", 41.5982, -122.4719, "06093"),
    ("Modoc", 41.4452, -120.7397, "06049"),
    ("Lassen", 40.6613, -120.5572, "06035"),
    ("Plumas", 40.0049, -120.8326, "06063"),
    ("Trinity", 40.6666, -123.1108, "06105"),
    ("Humboldt", 40.7450, -123.8695, "06023"),
    ("Del Norte", 41.7437, -124.1120, "06015"),
    ("Mendocino", 39.4318, -123.3514, "06045"),
    ("Lake", 39.0935, -122.7594, "06033"),
    // Sierra Nevada
    ("Nevada", 39.2969, -120.7989, "06057"),
    ("Sierra", 39.5771, -120.5244, "06091"),
    ("Alpine", 38.5985, -119.8183, "06003"),
    ("Amador", 38.3496, -120.6538, "06005"),
    ("Calaveras", 38.1908, -120.5383, "06009"),
    ("Tuolumne", 37.9833, -119.9489, "06109"),
    ("Mariposa", 37.4849, -119.9663, "06043"),
    ("Mono", 37.9468, -118.9595, "06051"),
    ("Inyo", 36.5885, -117.4796, "06027"),
    // Central Coast
    ("Monterey", 36.5946, -121.8946, "06053"),
    ("San Benito", 36.5761, -121.0724, "06069"),
    ("Santa Cruz", 37.0510, -121.9952, "06087"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn california_table_is_valid() {
        let entities: Vec<Entity> = CALIFORNIA_COUNTIES
            .iter()
            .map(|&(n, lat, lon, f)| Entity::new(n, lat, lon).with_fips(f))
            .collect();
        let r = EntityRegistry::from_entities(entities).unwrap();
        assert_eq!(r.len(), 58);
        assert!(r.iter().all(|e| e.fips.as_deref().is_some_and(|f| f.len() == 5)));
    }

    #[test]
    fn lookup_is_case_and_space_insensitive() {
        let r = EntityRegistry::california();
        assert_eq!(r.lookup("  los   angeles ").unwrap().name, "Los Angeles");
        assert_eq!(r.lookup("SAN DIEGO").unwrap().fips.as_deref(), Some("06073"));
    }

    #[test]
    fn duplicate_and_out_of_range_rejected() {
        let dup = vec![Entity::new("Kern", 35.0, -119.0), Entity::new("kern", 35.1, -119.1)];
        assert!(matches!(
            EntityRegistry::from_entities(dup),
            Err(EngineError::InvalidRegistry(_))
        ));
        let bad = vec![Entity::new("Nowhere", 95.0, 0.0)];
        assert!(matches!(
            EntityRegistry::from_entities(bad),
            Err(EngineError::InvalidRegistry(_))
        ));
    }

    #[test]
    fn toml_and_json_formats_parse() {
        let toml = r#"
[[entities]]
name = "Butte"
lat = 39.6519
lon = -121.5991
fips = "06007"
"#;
        let json = r#"[{"name": "Napa", "lat": 38.5025, "lon": -122.2654}]"#;
        let t = parse_entities(toml, "toml").unwrap();
        assert_eq!(t[0].fips.as_deref(), Some("06007"));
        let j = parse_entities(json, "json").unwrap();
        assert_eq!(j[0].name, "Napa");
        assert!(j[0].fips.is_none());
    }

    #[test]
    fn empty_registry_is_an_error() {
        assert_eq!(
            EntityRegistry::from_entities(vec![]).unwrap_err(),
            EngineError::RegistryEmpty
        );
    }
}
