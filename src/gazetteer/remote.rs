//! Remote stores: GeoNames `searchJSON` and the BLM CadNSDI PLSS service.
//!
//! Both use a ureq agent with a bounded timeout. Network failures map to
//! `GazetteerUnavailable`; retries are the index's job. GeoNames calls are
//! rate limited: the next call slot is reserved under a lock, and the wait
//! and the request itself happen with the lock released.

use serde::Deserialize;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{GazetteerFeature, GazetteerStore, StoreKind};
use crate::error::ResolveError;
use crate::geometry::Shape;

const USER_AGENT: &str = "locality-georef/0.1 (specimen-georeferencing)";

fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

// ─── GeoNames ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    geonames: Vec<GeoNamesRecord>,
    #[serde(default)]
    status: Option<GeoNamesStatus>,
}

#[derive(Deserialize)]
struct GeoNamesStatus {
    message: String,
    value: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoNamesRecord {
    geoname_id: i64,
    name: String,
    lat: String,
    lng: String,
    #[serde(default)]
    fcode: Option<String>,
    #[serde(default)]
    country_id: Option<String>,
    #[serde(default)]
    admin_id1: Option<String>,
    #[serde(default)]
    admin_id2: Option<String>,
    #[serde(default)]
    admin_id3: Option<String>,
    #[serde(default)]
    alternate_names: Vec<AlternateName>,
    #[serde(default)]
    bbox: Option<BoundingBox>,
}

#[derive(Deserialize)]
struct AlternateName {
    name: String,
}

#[derive(Deserialize)]
struct BoundingBox {
    east: f64,
    west: f64,
    north: f64,
    south: f64,
}

/// GeoNames web service store.
pub struct GeoNamesStore {
    agent: ureq::Agent,
    base_url: String,
    username: String,
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl GeoNamesStore {
    pub fn new(username: impl Into<String>, timeout: Duration, min_interval: Duration) -> Self {
        Self {
            agent: agent(timeout),
            base_url: "http://api.geonames.org".into(),
            username: username.into(),
            min_interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Block until this caller's reserved slot comes up.
    fn throttle(&self) {
        let wait = {
            let mut next = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.min_interval;
            slot - now
        };
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}

fn geonames_feature(r: GeoNamesRecord) -> Option<GazetteerFeature> {
    let lat: f64 = r.lat.parse().ok()?;
    let lon: f64 = r.lng.parse().ok()?;
    let geometry = match r.bbox {
        Some(b) if b.east > b.west && b.north > b.south => Shape::bbox(b.west, b.south, b.east, b.north),
        _ => Shape::point(lat, lon),
    };
    let ancestors = [r.country_id, r.admin_id1, r.admin_id2, r.admin_id3]
        .into_iter()
        .flatten()
        .filter(|id| !id.is_empty())
        .map(|id| format!("geonames:{}", id))
        .collect();
    Some(GazetteerFeature {
        id: format!("geonames:{}", r.geoname_id),
        name: r.name,
        alt_names: r.alternate_names.into_iter().map(|a| a.name).collect(),
        feature_code: r.fcode.unwrap_or_default(),
        geometry,
        ancestors,
    })
}

impl GazetteerStore for GeoNamesStore {
    fn kind(&self) -> StoreKind {
        StoreKind::GeoNames
    }

    fn query(&self, name: &str) -> Result<Vec<GazetteerFeature>, ResolveError> {
        self.throttle();
        let url = format!("{}/searchJSON", self.base_url);
        let response: SearchResponse = self
            .agent
            .get(&url)
            .query("name_equals", name)
            .query("style", "FULL")
            .query("maxRows", "100")
            .query("username", &self.username)
            .call()
            .map_err(|e| ResolveError::unavailable(StoreKind::GeoNames, e.to_string()))?
            .into_json()
            .map_err(|e| ResolveError::unavailable(StoreKind::GeoNames, format!("bad response: {}", e)))?;

        if let Some(status) = response.status {
            return Err(ResolveError::unavailable(
                StoreKind::GeoNames,
                format!("{} (code {})", status.message, status.value),
            ));
        }
        debug!("geonames '{}' → {} record(s)", name, response.geonames.len());
        Ok(response.geonames.into_iter().filter_map(geonames_feature).collect())
    }

    fn ping(&self) -> Result<(), ResolveError> {
        self.query("London").map(|_| ())
    }
}

// ─── BLM PLSS (CadNSDI) ─────────────────────────────────────────

#[derive(Deserialize)]
struct ArcGisResponse {
    #[serde(default)]
    features: Vec<ArcGisFeature>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ArcGisFeature {
    attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    geometry: Option<ArcGisGeometry>,
}

#[derive(Deserialize)]
struct ArcGisGeometry {
    rings: Vec<Vec<[f64; 2]>>,
}

/// Parsed form of a `plss_key` query.
#[derive(Debug, PartialEq)]
struct SectionQuery {
    state: String,
    twp_no: String,
    twp_dir: char,
    rng_no: String,
    rng_dir: char,
    section: String,
}

fn parse_section_query(key: &str) -> Option<SectionQuery> {
    let parts: Vec<&str> = key.split_whitespace().collect();
    let [state, twp, rng, sec] = parts.as_slice() else {
        return None;
    };
    let split = |token: &str, prefix: char| -> Option<(String, char)> {
        let body = token.strip_prefix(prefix)?;
        let dir = body.chars().last()?;
        let num = &body[..body.len() - dir.len_utf8()];
        num.parse::<u32>().ok()?;
        Some((format!("{:0>3}", num), dir))
    };
    let (twp_no, twp_dir) = split(&twp.to_uppercase(), 'T')?;
    let (rng_no, rng_dir) = split(&rng.to_uppercase(), 'R')?;
    let section: u32 = sec.to_uppercase().strip_prefix('S')?.parse().ok()?;
    Some(SectionQuery {
        state: state.to_uppercase(),
        twp_no,
        twp_dir,
        rng_no,
        rng_dir,
        section: format!("{:02}", section),
    })
}

/// Section polygons from the BLM National PLSS CadNSDI map service.
pub struct PlssService {
    agent: ureq::Agent,
    base_url: String,
}

impl PlssService {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: agent(timeout),
            base_url: "https://gis.blm.gov/arcgis/rest/services/Cadastral/BLM_Natl_PLSS_CadNSDI/MapServer"
                .into(),
        }
    }

    fn arcgis_query(&self, layer: u8, filter: &str, out_fields: &str, geometry: bool) -> Result<ArcGisResponse, ResolveError> {
        let url = format!("{}/{}/query", self.base_url, layer);
        let response: ArcGisResponse = self
            .agent
            .get(&url)
            .query("where", filter)
            .query("outFields", out_fields)
            .query("returnGeometry", if geometry { "true" } else { "false" })
            .query("outSR", "4326")
            .query("f", "json")
            .call()
            .map_err(|e| ResolveError::unavailable(StoreKind::Plss, e.to_string()))?
            .into_json()
            .map_err(|e| ResolveError::unavailable(StoreKind::Plss, format!("bad response: {}", e)))?;
        if let Some(err) = &response.error {
            return Err(ResolveError::unavailable(StoreKind::Plss, err.to_string()));
        }
        Ok(response)
    }

    /// PLSSIDs of townships matching the query.
    fn townships(&self, q: &SectionQuery) -> Result<Vec<String>, ResolveError> {
        let filter = format!(
            "STATEABBR='{}' AND TWNSHPNO='{}' AND TWNSHPDIR='{}' AND RANGENO='{}' AND RANGEDIR='{}'",
            q.state, q.twp_no, q.twp_dir, q.rng_no, q.rng_dir
        );
        let response = self.arcgis_query(1, &filter, "PLSSID,STATEABBR,TWNSHPNO,TWNSHPDIR,RANGENO,RANGEDIR", false)?;
        Ok(response
            .features
            .into_iter()
            .filter_map(|f| f.attributes.get("PLSSID")?.as_str().map(str::to_string))
            .collect())
    }

    /// Bounding box of one section in one township.
    fn section(&self, plss_id: &str, section: &str) -> Result<Option<Shape>, ResolveError> {
        let filter = format!(
            "PLSSID='{}' AND FRSTDIVNO='{}' AND FRSTDIVTYP='SN'",
            plss_id, section
        );
        let response = self.arcgis_query(2, &filter, "FRSTDIVNO", true)?;
        for feature in response.features {
            let number = feature.attributes.get("FRSTDIVNO").and_then(|v| v.as_str());
            if number != Some(section) {
                continue;
            }
            let Some(geometry) = feature.geometry else { continue };
            let coords: Vec<[f64; 2]> = geometry.rings.into_iter().flatten().collect();
            if coords.is_empty() {
                continue;
            }
            let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
            let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
            for [x, y] in coords {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
            return Ok(Some(Shape::bbox(min_x, min_y, max_x, max_y)));
        }
        Ok(None)
    }
}

impl GazetteerStore for PlssService {
    fn kind(&self) -> StoreKind {
        StoreKind::Plss
    }

    fn query(&self, key: &str) -> Result<Vec<GazetteerFeature>, ResolveError> {
        let Some(q) = parse_section_query(key) else {
            return Ok(Vec::new());
        };
        let mut features = Vec::new();
        for plss_id in self.townships(&q)? {
            if let Some(geometry) = self.section(&plss_id, &q.section)? {
                features.push(GazetteerFeature {
                    id: format!("plss:{}:{}", plss_id, q.section),
                    name: key.to_string(),
                    alt_names: Vec::new(),
                    feature_code: "PLSS".into(),
                    geometry,
                    ancestors: Vec::new(),
                });
            }
        }
        Ok(features)
    }
}
