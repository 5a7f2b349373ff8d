//! Curated local localities. Only the custom store is consulted.

use crate::error::ResolveError;
use crate::gazetteer::StoreKind;
use crate::hierarchy::Resolution;
use crate::record::{HintField, LocalityRecord};
use crate::uncertainty::{estimate, Strategy};

use super::{Citation, MatchResult, Pipe, PipeContext, PipeKind};

/// Hint fields that may name a curated site, after the description.
const SITE_FIELDS: [HintField; 7] = [
    HintField::Locality,
    HintField::Mine,
    HintField::Volcano,
    HintField::Island,
    HintField::IslandGroup,
    HintField::WaterBody,
    HintField::BaySound,
];

/// Describe a single-feature resolution as a match. Shared with the
/// general gazetteer pipe.
pub(super) fn feature_match(
    pipe: PipeKind,
    ctx: &PipeContext,
    found: &Resolution,
    matched_on: &str,
) -> Result<MatchResult, ResolveError> {
    let feature = &found.candidate.feature;
    let strategy = Strategy::Feature {
        point_radius_km: feature.extent_km(),
        same_name: found.same_name,
    };
    let radius = estimate(&feature.geometry, &strategy, &ctx.params);
    let mut reasoning = format!("Matched '{}' to {} ({})", matched_on, feature.name, feature.feature_code);
    if !found.candidate.matched.is_empty() {
        let levels: Vec<&str> = found.candidate.matched.iter().map(|f| f.key()).collect();
        reasoning.push_str(&format!(", confirmed by {}", levels.join(", ")));
    }
    if found.same_name > 1 {
        reasoning.push_str(&format!(", {} features share the name", found.same_name));
    }
    MatchResult::new(pipe, feature.geometry.clone(), radius, &reasoning, vec![Citation::from_resolution(found)])
}

pub struct CustomPipe;

impl Pipe for CustomPipe {
    fn kind(&self) -> PipeKind {
        PipeKind::Custom
    }

    fn attempt(&self, record: &LocalityRecord, ctx: &PipeContext) -> Result<Option<MatchResult>, ResolveError> {
        if !ctx.index().has_store(StoreKind::Custom) {
            return Ok(None);
        }
        let mut names: Vec<(&str, Option<HintField>)> = Vec::new();
        if !record.description.trim().is_empty() {
            names.push((record.description.as_str(), None));
        }
        for field in SITE_FIELDS {
            if let Some(value) = record.hint(field) {
                names.push((value, Some(field)));
            }
        }
        if names.is_empty() {
            return Ok(None);
        }

        for (name, field) in &names {
            let exclude: Vec<HintField> = field.iter().copied().collect();
            match ctx.resolver.resolve(name, &[StoreKind::Custom], None, record, &exclude) {
                Ok(found) => return feature_match(PipeKind::Custom, ctx, &found, name).map(Some),
                Err(ResolveError::NoMatch(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ResolveError::NoMatch(format!("no curated locality for {}", record.summary())))
    }
}
