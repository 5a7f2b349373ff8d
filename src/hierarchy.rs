//! Hierarchy resolver: narrows name-matched features using the record's
//! contextual fields.
//!
//! The ordered field list runs from most specific (locality, mine) to
//! broadest (ocean, continent). For each field present on the record the
//! field's text is looked up, restricted to its feature codes, and every
//! candidate is checked against what was found:
//!
//! - contained (ancestry or geometry) → the level counts as matched
//! - the level is the candidate itself, or narrower than it → not applicable
//! - otherwise → the candidate is contradicted and dropped
//!
//! A hint that resolves to nothing is treated as absent.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConfigError, ResolveError};
use crate::gazetteer::{feature_codes, GazetteerFeature, GazetteerIndex, StoreKind};
use crate::geometry::distance_km;
use crate::record::{HintField, LocalityRecord};

// ─── Field list ─────────────────────────────────────────────────

/// One entry of the ordered field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: HintField,
    /// Acceptable feature codes (single-letter classes allowed before expansion).
    pub codes: Vec<String>,
    /// Stores consulted for this field. Empty means the field's default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stores: Vec<StoreKind>,
}

impl FieldSpec {
    pub fn new(field: HintField, codes: &[&str]) -> Self {
        Self {
            field,
            codes: codes.iter().map(|c| c.to_string()).collect(),
            stores: Vec::new(),
        }
    }

    pub fn stores(&self) -> Vec<StoreKind> {
        if !self.stores.is_empty() {
            return self.stores.clone();
        }
        match self.field {
            HintField::Ocean | HintField::SeaGulf | HintField::BaySound | HintField::WaterBody => {
                vec![StoreKind::Oceans, StoreKind::GeoNames]
            }
            HintField::Continent => vec![StoreKind::NaturalEarth, StoreKind::GeoNames],
            HintField::Municipality | HintField::County | HintField::StateProvince | HintField::Country => {
                vec![StoreKind::Admin, StoreKind::GeoNames]
            }
            _ => vec![StoreKind::Custom, StoreKind::GeoNames],
        }
    }
}

pub fn default_field_list() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(HintField::Locality, &["P", "L", "S", "T", "H", "V", "R"]),
        FieldSpec::new(HintField::Mine, &["MN", "MNQ", "MNAU"]),
        FieldSpec::new(HintField::Volcano, &["VLC", "MT", "MTS"]),
        FieldSpec::new(HintField::Island, &["ISL", "ISLS"]),
        FieldSpec::new(HintField::IslandGroup, &["ISLS"]),
        FieldSpec::new(HintField::WaterBody, &["H"]),
        FieldSpec::new(HintField::BaySound, &["BAY", "COVE", "SD", "GULF"]),
        FieldSpec::new(HintField::Municipality, &["P", "ADM3", "ADM4"]),
        FieldSpec::new(HintField::County, &["ADM2"]),
        FieldSpec::new(HintField::StateProvince, &["ADM1"]),
        FieldSpec::new(HintField::Country, &["PCLI", "PCLD", "PCLS"]),
        FieldSpec::new(HintField::SeaGulf, &["SEA", "GULF", "BAY"]),
        FieldSpec::new(HintField::Ocean, &["OCN"]),
        FieldSpec::new(HintField::Continent, &["CONT"]),
    ]
}

/// Check an ordered field list and expand its feature classes. Order is kept.
pub fn validate_field_list(list: Vec<FieldSpec>) -> Result<Vec<FieldSpec>, ConfigError> {
    if list.is_empty() {
        return Err(ConfigError::FieldList("list is empty".into()));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(list.len());
    for mut spec in list {
        if !seen.insert(spec.field) {
            return Err(ConfigError::FieldList(format!("field '{}' listed twice", spec.field)));
        }
        if spec.codes.is_empty() {
            return Err(ConfigError::FieldList(format!("field '{}' has no feature codes", spec.field)));
        }
        spec.codes = feature_codes::expand(&spec.codes)
            .map_err(|e| ConfigError::FieldList(format!("field '{}': {}", spec.field, e)))?;
        out.push(spec);
    }
    Ok(out)
}

// ─── Candidates ─────────────────────────────────────────────────

/// A gazetteer feature narrowed against one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub feature: GazetteerFeature,
    pub store: StoreKind,
    /// Record fields that confirmed this candidate.
    pub matched: Vec<HintField>,
    pub specificity: u8,
    pub area_km2: f64,
}

impl Candidate {
    pub fn new(feature: GazetteerFeature, store: StoreKind) -> Self {
        Self {
            specificity: feature.specificity(),
            area_km2: feature.geometry.area_km2(),
            feature,
            store,
            matched: Vec::new(),
        }
    }

    /// Ranking order: more levels matched, then more specific, then smaller, then id.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .matched
            .len()
            .cmp(&self.matched.len())
            .then(other.specificity.cmp(&self.specificity))
            .then(self.area_km2.total_cmp(&other.area_km2))
            .then(self.feature.id.cmp(&other.feature.id))
    }

    fn ties_with(&self, other: &Self) -> bool {
        self.matched.len() == other.matched.len()
            && self.specificity == other.specificity
            && (self.area_km2 - other.area_km2).abs() <= 1e-9 * self.area_km2.max(1.0)
    }
}

enum LevelCheck {
    Matched,
    NotApplicable,
    Contradicted,
}

fn check_level(candidate: &GazetteerFeature, level: &[GazetteerFeature]) -> LevelCheck {
    if level.iter().any(|l| l.id == candidate.id) {
        return LevelCheck::NotApplicable;
    }
    let center = candidate.centroid();
    let contains = |l: &GazetteerFeature| {
        if candidate.ancestors.contains(&l.id) {
            return true;
        }
        if l.geometry.is_point() {
            distance_km(&l.centroid(), &center) <= l.extent_km()
        } else {
            l.geometry.contains(&center)
        }
    };
    if level.iter().any(contains) {
        return LevelCheck::Matched;
    }
    let own = candidate.specificity();
    if level.iter().all(|l| l.specificity() >= own) {
        LevelCheck::NotApplicable
    } else {
        LevelCheck::Contradicted
    }
}

/// A selected candidate plus how many features shared its name.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub candidate: Candidate,
    pub same_name: usize,
}

// ─── Resolver ───────────────────────────────────────────────────

pub struct HierarchyResolver {
    index: Arc<GazetteerIndex>,
    fields: Vec<FieldSpec>,
}

impl HierarchyResolver {
    pub fn new(index: Arc<GazetteerIndex>, fields: Vec<FieldSpec>) -> Self {
        Self { index, fields }
    }

    pub fn index(&self) -> &GazetteerIndex {
        &self.index
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, field: HintField) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.field == field)
    }

    /// Features found for one field's text across that field's stores.
    fn level_features(&self, spec: &FieldSpec, value: &str) -> Result<Vec<GazetteerFeature>, ResolveError> {
        let mut out = Vec::new();
        for store in spec.stores() {
            out.extend(self.index.lookup(value, store, Some(&spec.codes))?);
        }
        Ok(out)
    }

    /// Filter and rank `candidates` against the record's hierarchy fields.
    ///
    /// `exclude` names fields whose text produced the candidates themselves.
    pub fn narrow(
        &self,
        candidates: Vec<Candidate>,
        record: &LocalityRecord,
        exclude: &[HintField],
    ) -> Result<Vec<Candidate>, ResolveError> {
        let mut survivors = candidates;
        for spec in &self.fields {
            if exclude.contains(&spec.field) {
                continue;
            }
            let Some(value) = record.hint(spec.field) else {
                continue;
            };
            let level = self.level_features(spec, value)?;
            if level.is_empty() {
                debug!("{}: {}='{}' resolved nothing; ignored", record.id, spec.field, value);
                continue;
            }
            survivors.retain_mut(|c| match check_level(&c.feature, &level) {
                LevelCheck::Matched => {
                    c.matched.push(spec.field);
                    true
                }
                LevelCheck::NotApplicable => true,
                LevelCheck::Contradicted => {
                    debug!("{}: {} contradicted by {}='{}'", record.id, c.feature.id, spec.field, value);
                    false
                }
            });
        }
        survivors.sort_by(|a, b| a.rank_cmp(b));
        Ok(survivors)
    }

    /// The confident top candidate, or `Ambiguous` when the top two tie.
    pub fn select(&self, query: &str, ranked: Vec<Candidate>) -> Result<Candidate, ResolveError> {
        let mut iter = ranked.into_iter();
        let Some(top) = iter.next() else {
            return Err(ResolveError::NoMatch(format!("no candidate for '{}' survived", query)));
        };
        let rivals: Vec<Candidate> = iter.take_while(|c| c.ties_with(&top)).collect();
        if rivals.is_empty() {
            return Ok(top);
        }
        let mut candidates = vec![top.feature.id];
        candidates.extend(rivals.into_iter().map(|c| c.feature.id));
        Err(ResolveError::Ambiguous {
            query: query.to_string(),
            candidates,
        })
    }

    /// Look `name` up in `stores`, narrow against `record`, and select.
    pub fn resolve(
        &self,
        name: &str,
        stores: &[StoreKind],
        codes: Option<&[String]>,
        record: &LocalityRecord,
        exclude: &[HintField],
    ) -> Result<Resolution, ResolveError> {
        let mut candidates = Vec::new();
        for &store in stores {
            for feature in self.index.lookup(name, store, codes)? {
                candidates.push(Candidate::new(feature, store));
            }
        }
        if candidates.is_empty() {
            return Err(ResolveError::NoMatch(format!("'{}' not found", name)));
        }
        let same_name = candidates.len();
        let ranked = self.narrow(candidates, record, exclude)?;
        let candidate = self.select(name, ranked)?;
        Ok(Resolution { candidate, same_name })
    }
}
