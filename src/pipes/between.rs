//! "between A and B"

use crate::error::ResolveError;
use crate::geometry::{distance_km, span, Shape};
use crate::record::LocalityRecord;
use crate::uncertainty::{estimate, Strategy};

use super::grammar::parse_between;
use super::{Citation, MatchResult, Pipe, PipeContext, PipeKind};

pub struct BetweenPipe;

impl Pipe for BetweenPipe {
    fn kind(&self) -> PipeKind {
        PipeKind::Between
    }

    fn attempt(&self, record: &LocalityRecord, ctx: &PipeContext) -> Result<Option<MatchResult>, ResolveError> {
        let Some(pair) = parse_between(&record.description) else {
            return Ok(None);
        };
        let a = ctx.resolve_place(&pair.a, record)?;
        let b = ctx.resolve_place(&pair.b, record)?;
        let (fa, fb) = (&a.candidate.feature, &b.candidate.feature);
        if fa.id == fb.id {
            return Err(ResolveError::Malformed(format!(
                "'{}' and '{}' are the same place ({})",
                pair.a, pair.b, fa.id
            )));
        }

        let geometry = Shape::from_polygon(&span(&fa.geometry, &fb.geometry, ctx.params.between_min_buffer_km));
        let distance = distance_km(&fa.centroid(), &fb.centroid());
        let radius = estimate(&geometry, &Strategy::Between { distance_km: distance }, &ctx.params);

        let reasoning = format!("Between {} and {} ({:.1} km apart)", fa.name, fb.name, distance);
        let sources = vec![Citation::from_resolution(&a), Citation::from_resolution(&b)];
        MatchResult::new(PipeKind::Between, geometry, radius, &reasoning, sources).map(Some)
    }
}
