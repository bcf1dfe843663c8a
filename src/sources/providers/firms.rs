//! NASA FIRMS satellite hotspots, counted within a radius of the entity centroid.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::registry::Entity;
use crate::sources::http;
use crate::sources::types::{ActiveFireFields, Fetched, SourceFields, SourceKind, Upstream};

pub const DEFAULT_FIRMS_BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov/api/area/csv";

const EARTH_RADIUS_KM: f64 = 6_371.0;
const KM_PER_DEG_LAT: f64 = 111.32;

pub struct FirmsActiveFire {
    base_url: String,
    map_key: Option<String>,
    /// Satellite product, e.g. `VIIRS_SNPP_NRT`.
    source: String,
    day_range: u8,
    radius_km: f64,
    client: reqwest::Client,
}

impl FirmsActiveFire {
    pub fn new(
        base_url: impl Into<String>,
        map_key: Option<String>,
        source: impl Into<String>,
        day_range: u8,
        radius_km: f64,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            map_key: map_key.filter(|k| !k.trim().is_empty()),
            source: source.into(),
            day_range: day_range.clamp(1, 10),
            radius_km,
            client,
        }
    }

    fn url(&self, key: &str, entity: &Entity) -> String {
        let (west, south, east, north) = bounding_box(entity.lat, entity.lon, self.radius_km);
        format!(
            "{}/{}/{}/{:.4},{:.4},{:.4},{:.4}/{}",
            self.base_url, key, self.source, west, south, east, north, self.day_range
        )
    }
}

#[async_trait]
impl Upstream for FirmsActiveFire {
    async fn request(&self, entity: &Entity) -> Result<Fetched, SourceError> {
        let key = self
            .map_key
            .as_deref()
            .ok_or_else(|| SourceError::Misconfigured("NASA_FIRMS_API_KEY is not set".into()))?;
        let body = http::get_text(&self.client, &self.url(key, entity)).await?;
        parse_area_csv(&body, entity, self.radius_km)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ActiveFire
    }

    fn name(&self) -> &'static str {
        "firms"
    }
}

/// Count detections in a FIRMS area CSV that fall within `radius_km` of `entity`.
///
/// FIRMS answers bad keys and quota errors with a 200 and a plain-text body, so a
/// missing `latitude`/`longitude` header is a schema error rather than zero fires.
pub fn parse_area_csv(body: &str, entity: &Entity, radius_km: f64) -> Result<Fetched, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| SourceError::UpstreamSchema(format!("firms: {e}")))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (lat_ix, lon_ix) = match (column("latitude"), column("longitude")) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(SourceError::UpstreamSchema(format!(
                "firms: no latitude/longitude columns; body: {}",
                http::preview(body)
            )))
        }
    };

    let mut nearby = 0u32;
    for record in rdr.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(target: "source", error = %e, "firms: skipping malformed row");
                continue;
            }
        };
        let point = record
            .get(lat_ix)
            .and_then(|v| v.parse::<f64>().ok())
            .zip(record.get(lon_ix).and_then(|v| v.parse::<f64>().ok()));
        if let Some((lat, lon)) = point {
            if haversine_km(entity.lat, entity.lon, lat, lon) <= radius_km {
                nearby += 1;
            }
        }
    }

    Ok(Fetched::now(SourceFields::ActiveFire(ActiveFireFields {
        active_fires_nearby: nearby,
        radius_km,
    })))
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = (lat2 - lat1).to_radians();
    let dl = (lon2 - lon1).to_radians();
    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// (west, south, east, north) box enclosing the radius, clamped to valid coordinates.
fn bounding_box(lat: f64, lon: f64, radius_km: f64) -> (f64, f64, f64, f64) {
    let dlat = radius_km / KM_PER_DEG_LAT;
    let cos = lat.to_radians().cos().abs().max(0.01);
    let dlon = radius_km / (KM_PER_DEG_LAT * cos);
    (
        (lon - dlon).max(-180.0),
        (lat - dlat).max(-90.0),
        (lon + dlon).min(180.0),
        (lat + dlat).min(90.0),
    )
}
