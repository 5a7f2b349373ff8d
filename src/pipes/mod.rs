//! Pipe framework: one strategy object per category of locality phrase.
//!
//! A `PipeChain` tries its pipes strictly in order and stops at the first
//! match. Outcomes of one attempt:
//!
//! - `Ok(Some(_))`: matched, no further pipes run
//! - `Ok(None)`: the phrase is not this pipe's kind
//! - `Err(NoMatch | Ambiguous)`: recognized but unresolved, fall through
//! - `Err(GazetteerUnavailable)`: stop the chain for this record
//! - any other error: hard failure, logged, fall through

pub mod between;
pub mod border;
pub mod custom;
pub mod direction;
pub mod geonames;
pub mod grammar;
pub mod manual;
pub mod offshore;
pub mod plss;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::gazetteer::{GazetteerIndex, StoreKind};
use crate::geometry::Shape;
use crate::hierarchy::{HierarchyResolver, Resolution};
use crate::record::{HintField, LocalityRecord};
use crate::uncertainty::UncertaintyParams;

pub use between::BetweenPipe;
pub use border::BorderPipe;
pub use custom::CustomPipe;
pub use direction::DirectionPipe;
pub use geonames::GeoNamesPipe;
pub use manual::ManualPipe;
pub use offshore::OffshorePipe;
pub use plss::PlssPipe;

/// Stores searched for places named inside a phrase ("5 km N of X").
pub const PLACE_STORES: [StoreKind; 3] = [StoreKind::Custom, StoreKind::GeoNames, StoreKind::Admin];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipeKind {
    Manual,
    Plss,
    Between,
    Border,
    Offshore,
    Direction,
    Custom,
    GeoNames,
}

impl fmt::Display for PipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Plss => write!(f, "plss"),
            Self::Between => write!(f, "between"),
            Self::Border => write!(f, "border"),
            Self::Offshore => write!(f, "offshore"),
            Self::Direction => write!(f, "direction"),
            Self::Custom => write!(f, "custom"),
            Self::GeoNames => write!(f, "geonames"),
        }
    }
}

/// One gazetteer feature a result relied on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub store: StoreKind,
    pub feature_id: String,
    pub name: String,
}

impl Citation {
    pub fn from_resolution(r: &Resolution) -> Self {
        Self {
            store: r.candidate.store,
            feature_id: r.candidate.feature.id.clone(),
            name: r.candidate.feature.name.clone(),
        }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} in {})", self.name, self.feature_id, self.store)
    }
}

/// A resolved locality. Only built through `MatchResult::new`, which
/// checks the geometry and the radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub geometry: Shape,
    pub radius_km: f64,
    pub description: String,
    pub pipe: PipeKind,
    pub sources: Vec<Citation>,
}

impl MatchResult {
    pub fn new(
        pipe: PipeKind,
        geometry: Shape,
        radius_km: f64,
        reasoning: &str,
        sources: Vec<Citation>,
    ) -> Result<Self, ResolveError> {
        geometry.validate().map_err(ResolveError::InvalidGeometry)?;
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(ResolveError::InvalidGeometry(format!("radius {} km", radius_km)));
        }
        let mut description = format!("{} [{} pipe, radius {:.2} km]", reasoning, pipe, radius_km);
        if !sources.is_empty() {
            let cited: Vec<String> = sources.iter().map(|c| c.to_string()).collect();
            description.push_str(&format!("; sources: {}", cited.join(", ")));
        }
        Ok(Self {
            geometry,
            radius_km,
            description,
            pipe,
            sources,
        })
    }
}

/// Shared, read-only collaborators of every pipe.
pub struct PipeContext {
    pub resolver: Arc<HierarchyResolver>,
    pub params: UncertaintyParams,
}

impl PipeContext {
    pub fn new(resolver: Arc<HierarchyResolver>, params: UncertaintyParams) -> Self {
        Self { resolver, params }
    }

    pub fn index(&self) -> &GazetteerIndex {
        self.resolver.index()
    }

    /// Resolve a place named inside a phrase. "Shelbyville, Illinois" is
    /// tried whole, then as "Shelbyville".
    pub fn resolve_place(&self, place: &str, record: &LocalityRecord) -> Result<Resolution, ResolveError> {
        let mut variants = vec![place.trim().to_string()];
        if let Some((head, _)) = place.split_once(',') {
            variants.push(head.trim().to_string());
        }
        let mut last = ResolveError::NoMatch(format!("'{}' not found", place));
        for name in variants.iter().filter(|n| !n.is_empty()) {
            match self.resolver.resolve(name, &PLACE_STORES, None, record, &[]) {
                Ok(found) => return Ok(found),
                Err(ResolveError::NoMatch(msg)) => last = ResolveError::NoMatch(msg),
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    /// Extent of the most specific state or country named in the hints,
    /// when it resolves to a single feature.
    pub fn admin_radius_km(&self, record: &LocalityRecord) -> Option<f64> {
        for field in [HintField::StateProvince, HintField::Country] {
            let (Some(value), Some(spec)) = (record.hint(field), self.resolver.field(field)) else {
                continue;
            };
            match self.resolver.resolve(value, &spec.stores(), Some(&spec.codes), record, &[field]) {
                Ok(found) => return Some(found.candidate.feature.extent_km()),
                Err(e) => debug!("{}: {} '{}' not resolved: {}", record.id, field, value, e),
            }
        }
        None
    }
}

pub trait Pipe: Send + Sync {
    fn kind(&self) -> PipeKind;

    fn attempt(&self, record: &LocalityRecord, ctx: &PipeContext) -> Result<Option<MatchResult>, ResolveError>;
}

/// Ordered, immutable list of pipes.
pub struct PipeChain {
    pipes: Vec<Box<dyn Pipe>>,
    ctx: PipeContext,
}

impl PipeChain {
    pub fn new(pipes: Vec<Box<dyn Pipe>>, ctx: PipeContext) -> Self {
        Self { pipes, ctx }
    }

    /// Manual, PLSS, Between, Border, Offshore, Direction, Custom, GeoNames.
    pub fn standard(ctx: PipeContext) -> Self {
        Self::new(
            vec![
                Box::new(ManualPipe),
                Box::new(PlssPipe),
                Box::new(BetweenPipe),
                Box::new(BorderPipe),
                Box::new(OffshorePipe),
                Box::new(DirectionPipe),
                Box::new(CustomPipe),
                Box::new(GeoNamesPipe),
            ],
            ctx,
        )
    }

    pub fn kinds(&self) -> Vec<PipeKind> {
        self.pipes.iter().map(|p| p.kind()).collect()
    }

    pub fn context(&self) -> &PipeContext {
        &self.ctx
    }

    /// First pipe to match wins.
    pub fn resolve(&self, record: &LocalityRecord) -> Result<MatchResult, ResolveError> {
        let mut ambiguous = None;
        for pipe in &self.pipes {
            match pipe.attempt(record, &self.ctx) {
                Ok(Some(result)) => {
                    debug!("{}: matched by {} pipe", record.id, pipe.kind());
                    return Ok(result);
                }
                Ok(None) => {}
                Err(e @ ResolveError::GazetteerUnavailable { .. }) => {
                    warn!("{}: {} pipe stopped: {}", record.id, pipe.kind(), e);
                    return Err(e);
                }
                Err(e @ ResolveError::Ambiguous { .. }) => {
                    debug!("{}: {} pipe: {}", record.id, pipe.kind(), e);
                    ambiguous.get_or_insert(e);
                }
                Err(ResolveError::NoMatch(msg)) => {
                    debug!("{}: {} pipe: {}", record.id, pipe.kind(), msg);
                }
                Err(e) => {
                    warn!("{}: {} pipe failed: {}", record.id, pipe.kind(), e);
                }
            }
        }
        Err(ambiguous.unwrap_or_else(|| ResolveError::NoMatch(format!("nothing matched {}", record.summary()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Coordinates, Determination, HintField};
    use crate::testing;

    pub(crate) fn context() -> PipeContext {
        PipeContext::new(Arc::new(testing::resolver()), UncertaintyParams::default())
    }

    fn chain() -> PipeChain {
        PipeChain::standard(context())
    }

    #[test]
    fn test_standard_order() {
        assert_eq!(
            chain().kinds(),
            vec![
                PipeKind::Manual,
                PipeKind::Plss,
                PipeKind::Between,
                PipeKind::Border,
                PipeKind::Offshore,
                PipeKind::Direction,
                PipeKind::Custom,
                PipeKind::GeoNames,
            ]
        );
    }

    #[test]
    fn test_higher_priority_pipe_wins() {
        // Manual and Direction could both answer; Manual comes first
        let record = LocalityRecord::new("r1", "5 km N of Springfield")
            .with_hint(HintField::StateProvince, "Illinois")
            .with_coordinates(Coordinates {
                lat: 39.85,
                lon: -89.64,
                determination: Determination::Measured,
                precision_m: Some(100.0),
                datum: None,
            });
        let chain = chain();
        for _ in 0..3 {
            assert_eq!(chain.resolve(&record).unwrap().pipe, PipeKind::Manual);
        }

        // Direction and GeoNames could both answer; Direction comes first
        let record = LocalityRecord::new("r2", "5 km N of Springfield").with_hint(HintField::StateProvince, "Illinois");
        assert_eq!(chain.resolve(&record).unwrap().pipe, PipeKind::Direction);
    }

    #[test]
    fn test_ambiguity_reported_when_nothing_matches() {
        let record = LocalityRecord::new("r1", "Springfield").with_hint(HintField::Country, "United States");
        let err = chain().resolve(&record).unwrap_err();
        assert!(matches!(err, ResolveError::Ambiguous { .. }), "got {:?}", err);
    }

    #[test]
    fn test_no_match() {
        let record = LocalityRecord::new("r1", "Atlantis").with_hint(HintField::Country, "Nowhere");
        assert!(matches!(chain().resolve(&record), Err(ResolveError::NoMatch(_))));
    }

    #[test]
    fn test_match_result_rejects_invalid_geometry() {
        let bad = Shape::Polygon(vec![vec![[0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]]);
        let err = MatchResult::new(PipeKind::Custom, bad, 1.0, "x", vec![]).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidGeometry(_)));
        let err = MatchResult::new(PipeKind::Custom, Shape::point(0.0, 0.0), -1.0, "x", vec![]).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidGeometry(_)));
    }

    #[test]
    fn test_resolve_place_strips_trailing_qualifier() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "");
        let found = ctx.resolve_place("Shelbyville, Illinois", &record).unwrap();
        assert_eq!(found.candidate.feature.id, testing::SHELBYVILLE);
    }

    #[test]
    fn test_admin_radius_from_most_specific_hint() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "")
            .with_hint(HintField::StateProvince, "Illinois")
            .with_hint(HintField::Country, "United States");
        let radius = ctx.admin_radius_km(&record).unwrap();
        assert!(radius > 200.0 && radius < 500.0, "{}", radius);

        let country = LocalityRecord::new("r2", "").with_hint(HintField::Country, "United States");
        assert!(ctx.admin_radius_km(&country).unwrap() > 1000.0);

        let unknown = LocalityRecord::new("r3", "").with_hint(HintField::StateProvince, "Atlantis");
        assert_eq!(ctx.admin_radius_km(&unknown), None);
    }
}
