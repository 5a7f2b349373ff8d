//! "<distance> <bearing> of <place>"
//!
//! The point is projected from the reference feature's centroid. When a
//! terrestrial record's point lands in an ocean feature it is kept only if
//! land lies within `dist_km_to_extend_sites_offshore` back along the
//! bearing; the distance into the water is added to the radius.

use geo::Point;
use tracing::debug;

use crate::error::ResolveError;
use crate::gazetteer::StoreKind;
use crate::geometry::{destination, Shape};
use crate::record::LocalityRecord;
use crate::uncertainty::{estimate, Strategy};

use super::grammar::{parse_direction, Distance};
use super::{Citation, MatchResult, Pipe, PipeContext, PipeKind};

/// Walk-back step when measuring how far a point lies offshore.
const OFFSHORE_STEP_KM: f64 = 1.0;

pub struct DirectionPipe;

impl DirectionPipe {
    /// Km the point lies into open water, `None` past the cap.
    fn offshore_km(
        ctx: &PipeContext,
        point: &Point<f64>,
        back_bearing: f64,
        travelled_km: f64,
    ) -> Result<Option<f64>, ResolveError> {
        let cap = ctx.params.dist_km_to_extend_sites_offshore;
        let mut walked = 0.0;
        loop {
            let step = destination(point, back_bearing, walked);
            if ctx.index().containing(&step, StoreKind::Oceans)?.is_empty() {
                return Ok(Some(walked));
            }
            walked += OFFSHORE_STEP_KM;
            if walked > cap || walked > travelled_km {
                return Ok(None);
            }
        }
    }
}

impl Pipe for DirectionPipe {
    fn kind(&self) -> PipeKind {
        PipeKind::Direction
    }

    fn attempt(&self, record: &LocalityRecord, ctx: &PipeContext) -> Result<Option<MatchResult>, ResolveError> {
        let Some(phrase) = parse_direction(&record.description) else {
            return Ok(None);
        };
        let found = ctx.resolve_place(&phrase.place, record)?;
        let reference = &found.candidate.feature;

        let distance = phrase
            .distance
            .unwrap_or_else(|| Distance::undirected(ctx.params.undirected_max_dist_km));
        let travelled = distance.center_km();
        let point = destination(&reference.centroid(), phrase.bearing.degrees, travelled);

        let mut offshore = 0.0;
        if !record.looks_marine() {
            let back = (phrase.bearing.degrees + 180.0) % 360.0;
            match Self::offshore_km(ctx, &point, back, travelled)? {
                Some(km) => offshore = km,
                None => {
                    return Err(ResolveError::NoMatch(format!(
                        "{:.1} km {} of {} is more than {} km offshore",
                        travelled, phrase.bearing.letters, reference.id, ctx.params.dist_km_to_extend_sites_offshore
                    )));
                }
            }
        }
        if offshore > 0.0 {
            debug!("{}: projected point lies {} km offshore", record.id, offshore);
        }

        let geometry = Shape::point(point.y(), point.x());
        let strategy = Strategy::Direction {
            distance_km: travelled,
            precision_km: distance.precision_km,
            half_width_deg: phrase.bearing.half_width_deg(),
            reference_km: reference.extent_km(),
            offshore_km: offshore,
        };
        let radius = estimate(&geometry, &strategy, &ctx.params);

        let mut reasoning = match phrase.distance {
            Some(_) => format!("{:.2} km {} of {}", travelled, phrase.bearing.letters, reference.name),
            None => format!(
                "{} of {} (0-{} km assumed)",
                phrase.bearing.letters, reference.name, ctx.params.undirected_max_dist_km
            ),
        };
        if phrase.by_route {
            reasoning.push_str(", distance by route");
        }
        if offshore > 0.0 {
            reasoning.push_str(&format!(", extended {} km offshore", offshore));
        }
        MatchResult::new(PipeKind::Direction, geometry, radius, &reasoning, vec![Citation::from_resolution(&found)])
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distance_km;
    use crate::pipes::tests::context;
    use crate::record::HintField;
    use crate::testing;
    use approx::assert_abs_diff_eq;

    fn springfield_il() -> Point<f64> {
        Point::new(-89.6437, 39.8017)
    }

    fn point_of(result: &MatchResult) -> Point<f64> {
        match result.geometry {
            Shape::Point([lon, lat]) => Point::new(lon, lat),
            _ => panic!("expected a point"),
        }
    }

    #[test]
    fn test_five_km_north_of_springfield() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "5 km N of Springfield").with_hint(HintField::StateProvince, "Illinois");
        let result = DirectionPipe.attempt(&record, &ctx).unwrap().unwrap();
        let p = point_of(&result);
        assert_abs_diff_eq!(distance_km(&springfield_il(), &p), 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.x(), -89.6437, epsilon = 1e-9);
        assert!(p.y() > 39.8017);
        assert!(result.description.contains(testing::SPRINGFIELD_IL));
        // stated distance and bearing sector both widen the radius
        let expected = (0.5f64.hypot(5.0 * 45f64.to_radians().sin()) + 5.0) * 1.1;
        assert_abs_diff_eq!(result.radius_km, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_radius_monotonic_in_distance() {
        let ctx = context();
        let mut last = 0.0;
        for d in ["1", "4", "5", "9", "10", "25", "40"] {
            let text = format!("{} km NE of Springfield", d);
            let record = LocalityRecord::new("r1", text).with_hint(HintField::StateProvince, "Illinois");
            let result = DirectionPipe.attempt(&record, &ctx).unwrap().unwrap();
            assert!(result.radius_km >= last, "radius shrank at {} km", d);
            last = result.radius_km;
        }
    }

    #[test]
    fn test_bearing_coarseness_widens_radius() {
        let ctx = context();
        let resolve = |text: &str| {
            let record = LocalityRecord::new("r1", text).with_hint(HintField::StateProvince, "Illinois");
            DirectionPipe.attempt(&record, &ctx).unwrap().unwrap().radius_km
        };
        assert!(resolve("10 km N of Springfield") > resolve("10 km NNE of Springfield"));
    }

    #[test]
    fn test_undirected_uses_default_range() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "W of Shelbyville");
        let result = DirectionPipe.attempt(&record, &ctx).unwrap().unwrap();
        let p = point_of(&result);
        assert_abs_diff_eq!(distance_km(&Point::new(-88.7901, 39.4064), &p), 8.0, epsilon = 1e-6);
        assert!(result.description.contains("0-16 km"));
    }

    #[test]
    fn test_point_just_offshore_is_extended() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "20 km S of Port Fourchon");
        let result = DirectionPipe.attempt(&record, &ctx).unwrap().unwrap();
        assert!(result.description.contains("offshore"));
        let on_land = DirectionPipe
            .attempt(&LocalityRecord::new("r2", "20 km N of Port Fourchon"), &ctx)
            .unwrap()
            .unwrap();
        assert!(result.radius_km > on_land.radius_km + 5.0);
    }

    #[test]
    fn test_point_far_offshore_is_rejected() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "60 km S of Port Fourchon");
        assert!(matches!(DirectionPipe.attempt(&record, &ctx), Err(ResolveError::NoMatch(_))));
    }

    #[test]
    fn test_regional_adjective_is_not_marine() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "60 km S of Port Fourchon, southern Louisiana")
            .with_hint(HintField::Country, "United States");
        let err = DirectionPipe.attempt(&record, &ctx).unwrap_err();
        assert!(matches!(&err, ResolveError::NoMatch(msg) if msg.contains("offshore")), "got {:?}", err);
    }

    #[test]
    fn test_marine_record_stays_in_water() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "60 km S of Port Fourchon").with_hint(HintField::Ocean, "Atlantic Ocean");
        let result = DirectionPipe.attempt(&record, &ctx).unwrap().unwrap();
        assert!(!result.description.contains("offshore"));
    }

    #[test]
    fn test_not_applicable() {
        let ctx = context();
        assert!(DirectionPipe
            .attempt(&LocalityRecord::new("r1", "Springfield"), &ctx)
            .unwrap()
            .is_none());
    }
}
