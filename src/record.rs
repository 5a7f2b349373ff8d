//! Specimen locality records as seen by the resolution engine.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use crate::error::ResolveError;

static MARINE_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:ocean|seas?|gulf\s+of|bay\s+of|offshore|off\s+(?:the\s+)?(?:coast|shore)\s+of|off\s+cape)\b|^\s*(?:just\s+)?off\s",
    )
    .unwrap()
});

/// Phrasing that puts a locality off a coast rather than on land.
static OFFSHORE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\boffshore\b|\boff\s+(?:the\s+)?(?:coast|shore)\s+of\b|\boff\s+cape\b")
        .unwrap()
});

/// Named terrestrial features. A description naming one is not marine.
static TERRESTRIAL_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:county|parish|township|mine|quarry|cave|mountains?|mount|hills?|ridge|valley|canyon|creek|river|lake|road|highway|trail|ranch|farm|park|forest|airport)\b|\b(?:co|twp|mt|rd|hwy)\.",
    )
    .unwrap()
});

static MEASURED_PROTOCOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(collector|gps|unknown)\b").unwrap());

/// Structured hint fields that can accompany a locality description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintField {
    Locality,
    Mine,
    Volcano,
    Island,
    IslandGroup,
    WaterBody,
    BaySound,
    Municipality,
    County,
    StateProvince,
    Country,
    SeaGulf,
    Ocean,
    Continent,
}

impl HintField {
    pub const ALL: [HintField; 14] = [
        HintField::Locality,
        HintField::Mine,
        HintField::Volcano,
        HintField::Island,
        HintField::IslandGroup,
        HintField::WaterBody,
        HintField::BaySound,
        HintField::Municipality,
        HintField::County,
        HintField::StateProvince,
        HintField::Country,
        HintField::SeaGulf,
        HintField::Ocean,
        HintField::Continent,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Locality => "locality",
            Self::Mine => "mine",
            Self::Volcano => "volcano",
            Self::Island => "island",
            Self::IslandGroup => "island_group",
            Self::WaterBody => "water_body",
            Self::BaySound => "bay_sound",
            Self::Municipality => "municipality",
            Self::County => "county",
            Self::StateProvince => "state_province",
            Self::Country => "country",
            Self::SeaGulf => "sea_gulf",
            Self::Ocean => "ocean",
            Self::Continent => "continent",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }
}

impl fmt::Display for HintField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Locality context carried by a record's description and hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// No continent, country, ocean or sea.
    Missing,
    /// Only broad admin or marine units. Enough when the smallest named
    /// unit is small; see [`LocalityRecord::admin_radius_limit_km`].
    AdminOnly,
    Specific,
}

/// How existing coordinates were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Determination {
    Measured,
    Georeferenced,
    Unknown,
}

/// Coordinates already attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
    pub determination: Determination,
    /// Declared coordinate uncertainty in meters.
    #[serde(default)]
    pub precision_m: Option<f64>,
    #[serde(default)]
    pub datum: Option<String>,
}

impl Coordinates {
    /// Range and format check.
    pub fn validate(&self) -> Result<(), ResolveError> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(ResolveError::InvalidCoordinate(format!(
                "non-numeric coordinates ({}, {})",
                self.lat, self.lon
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(ResolveError::InvalidCoordinate(format!(
                "latitude {} outside -90..90",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(ResolveError::InvalidCoordinate(format!(
                "longitude {} outside -180..180",
                self.lon
            )));
        }
        if let Some(p) = self.precision_m {
            if !p.is_finite() || p < 0.0 {
                return Err(ResolveError::InvalidCoordinate(format!(
                    "declared precision {} m is not a non-negative number",
                    p
                )));
            }
        }
        Ok(())
    }
}

/// One record to georeference. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalityRecord {
    pub id: String,
    /// Verbatim locality description.
    pub description: String,
    #[serde(default)]
    pub hints: BTreeMap<HintField, String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl LocalityRecord {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            hints: BTreeMap::new(),
            coordinates: None,
        }
    }

    pub fn with_hint(mut self, field: HintField, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.hints.insert(field, value.trim().to_string());
        }
        self
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn hint(&self, field: HintField) -> Option<&str> {
        self.hints.get(&field).map(|s| s.as_str())
    }

    /// Build a record from a raw key/value row.
    ///
    /// `id_key` names the identifier column; rows without it are numbered
    /// by position. The description comes from `verbatim_locality`,
    /// `description` or `locality`, in that order.
    pub fn from_raw(raw: &Map<String, Value>, id_key: &str, position: usize) -> Self {
        let text = |key: &str| -> Option<String> {
            match raw.get(key)? {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };

        let id = text(id_key).unwrap_or_else(|| format!("row-{}", position));
        let description = text("verbatim_locality")
            .or_else(|| text("description"))
            .or_else(|| text("locality"))
            .unwrap_or_default();

        let mut record = LocalityRecord::new(id, description);
        for field in HintField::ALL {
            if let Some(value) = text(field.key()) {
                record = record.with_hint(field, value);
            }
        }

        let lat = parse_number(raw.get("decimal_latitude").or_else(|| raw.get("lat")));
        let lon = parse_number(raw.get("decimal_longitude").or_else(|| raw.get("lon")));
        // Blank on both sides means no coordinates. A half-filled or garbled
        // pair is kept as NaN and fails validation for this record alone.
        if lat.is_some() || lon.is_some() {
            let determination = match text("determination").map(|d| d.to_lowercase()).as_deref() {
                Some("measured") => Determination::Measured,
                Some("georeferenced") => Determination::Georeferenced,
                _ => match text("georeference_protocol") {
                    Some(p) if !MEASURED_PROTOCOL.is_match(&p) => Determination::Georeferenced,
                    Some(_) => Determination::Measured,
                    None => Determination::Unknown,
                },
            };
            record = record.with_coordinates(Coordinates {
                lat: lat.unwrap_or(f64::NAN),
                lon: lon.unwrap_or(f64::NAN),
                determination,
                precision_m: parse_number(raw.get("coordinate_uncertainty_m")),
                datum: text("geodetic_datum"),
            });
        }
        record
    }

    /// How much locality context the record carries, ignoring coordinates.
    pub fn context(&self) -> Context {
        let broad = [
            HintField::Continent,
            HintField::Country,
            HintField::Ocean,
            HintField::SeaGulf,
        ];
        if !broad.iter().any(|f| self.hints.contains_key(f)) {
            return Context::Missing;
        }
        let specific = [
            HintField::Locality,
            HintField::WaterBody,
            HintField::County,
            HintField::Municipality,
            HintField::Island,
            HintField::IslandGroup,
            HintField::Mine,
            HintField::Volcano,
            HintField::BaySound,
        ];
        if !self.description.trim().is_empty() || specific.iter().any(|f| self.hints.contains_key(f)) {
            Context::Specific
        } else {
            Context::AdminOnly
        }
    }

    /// Too little context to georeference with confidence, before any
    /// gazetteer is consulted. See [`Context::AdminOnly`].
    pub fn is_sparse(&self) -> bool {
        self.context() != Context::Specific
    }

    /// Largest admin unit that still counts as specific context on its own.
    pub fn admin_radius_limit_km(&self) -> f64 {
        if self.hints.contains_key(&HintField::Ocean) || self.hints.contains_key(&HintField::SeaGulf) {
            1000.0
        } else {
            500.0
        }
    }

    /// Text and hint heuristic for marine localities.
    ///
    /// Marine wording or an ocean/sea/bay hint marks a record as marine
    /// unless it has an island hint, or its description names a terrestrial
    /// feature without offshore phrasing.
    pub fn looks_marine(&self) -> bool {
        if self.hints.contains_key(&HintField::Island) {
            return false;
        }
        let marine = self.hints.contains_key(&HintField::Ocean)
            || self.hints.contains_key(&HintField::SeaGulf)
            || self.hints.contains_key(&HintField::BaySound)
            || MARINE_TERMS.is_match(&self.description);
        if !marine {
            return false;
        }
        OFFSHORE_PHRASE.is_match(&self.description) || !TERRESTRIAL_TERMS.is_match(&self.description)
    }

    /// The description plus hints, for log lines and failure descriptions.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.description.is_empty() {
            parts.push(format!("\"{}\"", self.description));
        }
        for (field, value) in &self.hints {
            parts.push(format!("{}={}", field, value));
        }
        parts.join("; ")
    }
}

/// `None` for a missing, null or blank value; NaN for anything unreadable.
fn parse_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Null => None,
        Value::Number(n) => Some(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().parse().unwrap_or(f64::NAN)),
        _ => Some(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_from_raw_with_hints_and_coords() {
        let row = raw(json!({
            "catalog_id": "USNM 1234",
            "verbatim_locality": "5 km N of Springfield",
            "state_province": "Illinois",
            "country": "United States",
            "decimal_latitude": "38.5",
            "decimal_longitude": -92.2,
            "coordinate_uncertainty_m": 250,
            "georeference_protocol": "GEOLocate"
        }));
        let rec = LocalityRecord::from_raw(&row, "catalog_id", 0);
        assert_eq!(rec.id, "USNM 1234");
        assert_eq!(rec.description, "5 km N of Springfield");
        assert_eq!(rec.hint(HintField::StateProvince), Some("Illinois"));
        let coords = rec.coordinates.unwrap();
        assert_eq!(coords.lat, 38.5);
        assert_eq!(coords.precision_m, Some(250.0));
        assert_eq!(coords.determination, Determination::Georeferenced);
    }

    #[test]
    fn test_from_raw_missing_id_uses_position() {
        let rec = LocalityRecord::from_raw(&raw(json!({"locality": "Springfield"})), "id", 7);
        assert_eq!(rec.id, "row-7");
        assert_eq!(rec.description, "Springfield");
    }

    #[test]
    fn test_from_raw_gps_protocol_is_measured() {
        let row = raw(json!({"lat": 1.0, "lon": 2.0, "georeference_protocol": "Collector GPS"}));
        let rec = LocalityRecord::from_raw(&row, "id", 0);
        assert_eq!(rec.coordinates.unwrap().determination, Determination::Measured);
    }

    #[test]
    fn test_unparseable_coordinates_fail_validation() {
        let row = raw(json!({"lat": "north-ish", "lon": 2.0}));
        let rec = LocalityRecord::from_raw(&row, "id", 0);
        assert!(matches!(
            rec.coordinates.unwrap().validate(),
            Err(ResolveError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_coordinate_range() {
        let ok = Coordinates { lat: 38.5, lon: -92.2, determination: Determination::Measured, precision_m: None, datum: None };
        assert!(ok.validate().is_ok());
        let bad = Coordinates { lat: 138.5, ..ok };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_blank_coordinates_mean_none() {
        for (lat, lon) in [(json!(null), json!(null)), (json!(""), json!("  ")), (json!(null), json!(""))] {
            let row = raw(json!({"locality": "Springfield", "lat": lat, "lon": lon}));
            assert!(LocalityRecord::from_raw(&row, "id", 0).coordinates.is_none());
        }
    }

    #[test]
    fn test_half_or_garbled_coordinates_are_kept_invalid() {
        for row in [
            json!({"lat": 38.5, "lon": null}),
            json!({"lat": true, "lon": -92.2}),
            json!({"decimal_latitude": [38.5], "decimal_longitude": -92.2}),
        ] {
            let rec = LocalityRecord::from_raw(&raw(row), "id", 0);
            assert!(rec.coordinates.unwrap().validate().is_err());
        }
    }

    #[test]
    fn test_determination_field_is_case_insensitive() {
        let row = raw(json!({"lat": 1.0, "lon": 2.0, "determination": " Measured "}));
        let rec = LocalityRecord::from_raw(&row, "id", 0);
        assert_eq!(rec.coordinates.unwrap().determination, Determination::Measured);
        let row = raw(json!({"lat": 1.0, "lon": 2.0, "determination": "GEOREFERENCED"}));
        let rec = LocalityRecord::from_raw(&row, "id", 0);
        assert_eq!(rec.coordinates.unwrap().determination, Determination::Georeferenced);
    }

    #[test]
    fn test_sparse() {
        assert!(LocalityRecord::new("a", "somewhere").is_sparse());
        assert_eq!(LocalityRecord::new("a", "somewhere").context(), Context::Missing);
        let country_only = LocalityRecord::new("b", "").with_hint(HintField::Country, "United States");
        assert!(country_only.is_sparse());
        assert_eq!(country_only.context(), Context::AdminOnly);
        assert_eq!(country_only.admin_radius_limit_km(), 500.0);
        let with_desc = LocalityRecord::new("c", "Springfield").with_hint(HintField::Country, "United States");
        assert!(!with_desc.is_sparse());
        let sea = LocalityRecord::new("d", "").with_hint(HintField::SeaGulf, "Gulf of Mexico");
        assert_eq!(sea.admin_radius_limit_km(), 1000.0);
    }

    #[test]
    fn test_terrestrial_text_is_not_marine() {
        for text in [
            "60 km S of Port Fourchon, southern Louisiana",
            "Bay County, 3 mi E of Panama City",
            "off Route 9 near the ridge",
            "5 km N of Ocean City, Worcester Co.",
            "Atlantic Highlands",
        ] {
            assert!(!LocalityRecord::new("t", text).looks_marine(), "{}", text);
        }
    }

    #[test]
    fn test_looks_marine() {
        assert!(LocalityRecord::new("a", "Gulf of Mexico, 20 mi offshore").looks_marine());
        assert!(LocalityRecord::new("a", "off Cape Hatteras").looks_marine());
        assert!(LocalityRecord::new("a", "offshore of Cape May County").looks_marine());
        assert!(LocalityRecord::new("a", "Bay of Fundy").looks_marine());
        let hinted = LocalityRecord::new("a", "station 12").with_hint(HintField::Ocean, "Atlantic Ocean");
        assert!(hinted.looks_marine());
        assert!(!LocalityRecord::new("b", "Springfield").looks_marine());
        let island = LocalityRecord::new("c", "Pacific Ocean").with_hint(HintField::Island, "Oahu");
        assert!(!island.looks_marine());
    }
}
