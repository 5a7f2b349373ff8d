//! "off X", "offshore of X", "off the coast of X"

use crate::error::ResolveError;
use crate::geometry::{buffer, Shape};
use crate::record::LocalityRecord;
use crate::uncertainty::{estimate, Strategy};

use super::grammar::parse_offshore;
use super::{Citation, MatchResult, Pipe, PipeContext, PipeKind};

pub struct OffshorePipe;

impl Pipe for OffshorePipe {
    fn kind(&self) -> PipeKind {
        PipeKind::Offshore
    }

    fn attempt(&self, record: &LocalityRecord, ctx: &PipeContext) -> Result<Option<MatchResult>, ResolveError> {
        let Some(place) = parse_offshore(&record.description) else {
            return Ok(None);
        };
        let found = ctx.resolve_place(&place, record)?;
        let feature = &found.candidate.feature;

        let reach = ctx.params.dist_km_to_extend_sites_offshore;
        let geometry = Shape::from_polygon(&buffer(&feature.geometry, reach));
        let radius = estimate(
            &geometry,
            &Strategy::Offshore {
                reference_km: feature.extent_km(),
            },
            &ctx.params,
        );

        let reasoning = format!("Within {} km offshore of {}", reach, feature.name);
        MatchResult::new(PipeKind::Offshore, geometry, radius, &reasoning, vec![Citation::from_resolution(&found)])
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipes::tests::context;
    use crate::testing;
    use approx::assert_abs_diff_eq;
    use geo::Point;

    #[test]
    fn test_offshore_of_coastal_town() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "offshore of Port Fourchon");
        let result = OffshorePipe.attempt(&record, &ctx).unwrap().unwrap();
        assert!(result.geometry.contains(&Point::new(-90.195, 29.0)));
        assert!(!result.geometry.contains(&Point::new(-90.195, 28.5)));
        assert_abs_diff_eq!(result.radius_km, (5.0 + 20.0) * 1.1, epsilon = 1e-9);
        assert_eq!(result.sources[0].feature_id, testing::PORT_FOURCHON);
    }

    #[test]
    fn test_unknown_place() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "off Cape Nowhere");
        assert!(matches!(OffshorePipe.attempt(&record, &ctx), Err(ResolveError::NoMatch(_))));
    }
}
