//! "border of A and B", "A/B line"

use crate::error::ResolveError;
use crate::geometry::{buffer, overlap, Shape};
use crate::record::LocalityRecord;
use crate::uncertainty::{estimate, Strategy};

use super::grammar::parse_border;
use super::{Citation, MatchResult, Pipe, PipeContext, PipeKind};

pub struct BorderPipe;

impl Pipe for BorderPipe {
    fn kind(&self) -> PipeKind {
        PipeKind::Border
    }

    fn attempt(&self, record: &LocalityRecord, ctx: &PipeContext) -> Result<Option<MatchResult>, ResolveError> {
        let Some(pair) = parse_border(&record.description) else {
            return Ok(None);
        };
        let a = ctx.resolve_place(&pair.a, record)?;
        let b = ctx.resolve_place(&pair.b, record)?;
        let (fa, fb) = (&a.candidate.feature, &b.candidate.feature);

        let width = ctx.params.border_buffer_km;
        let shared = overlap(&buffer(&fa.geometry, width), &buffer(&fb.geometry, width)).ok_or_else(|| {
            ResolveError::NoMatch(format!("{} and {} do not meet within {} km", fa.id, fb.id, width))
        })?;
        let geometry = Shape::from_polygon(&shared);
        let radius = estimate(&geometry, &Strategy::Border { buffer_km: width }, &ctx.params);

        let reasoning = format!("Border of {} and {}", fa.name, fb.name);
        let sources = vec![Citation::from_resolution(&a), Citation::from_resolution(&b)];
        MatchResult::new(PipeKind::Border, geometry, radius, &reasoning, sources).map(Some)
    }
}
