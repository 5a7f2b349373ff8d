//! Records that already carry coordinates.

use crate::error::ResolveError;
use crate::geometry::Shape;
use crate::record::LocalityRecord;
use crate::uncertainty::{estimate, Strategy};

use super::{MatchResult, Pipe, PipeContext, PipeKind};

pub struct ManualPipe;

impl Pipe for ManualPipe {
    fn kind(&self) -> PipeKind {
        PipeKind::Manual
    }

    fn attempt(&self, record: &LocalityRecord, ctx: &PipeContext) -> Result<Option<MatchResult>, ResolveError> {
        let Some(coords) = &record.coordinates else {
            return Ok(None);
        };
        coords.validate()?;

        let geometry = Shape::point(coords.lat, coords.lon);
        let declared_km = coords.precision_m.map(|m| m / 1000.0);
        let radius = estimate(&geometry, &Strategy::Manual { declared_km }, &ctx.params);

        let mut reasoning = format!("Recorded coordinates ({:.5}, {:.5})", coords.lat, coords.lon);
        if let Some(datum) = &coords.datum {
            reasoning.push_str(&format!(" ({})", datum));
        }
        if declared_km.is_none() {
            reasoning.push_str(", no declared precision");
        }
        MatchResult::new(PipeKind::Manual, geometry, radius, &reasoning, Vec::new()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipes::tests::context;
    use crate::record::{Coordinates, Determination};
    use approx::assert_abs_diff_eq;

    fn coords(lat: f64, lon: f64, precision_m: Option<f64>) -> Coordinates {
        Coordinates {
            lat,
            lon,
            determination: Determination::Measured,
            precision_m,
            datum: Some("WGS84".into()),
        }
    }

    #[test]
    fn test_existing_coordinates_use_declared_precision() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "Jefferson City").with_coordinates(coords(38.5, -92.2, Some(250.0)));
        let result = ManualPipe.attempt(&record, &ctx).unwrap().unwrap();
        assert_eq!(result.geometry, Shape::point(38.5, -92.2));
        assert_abs_diff_eq!(result.radius_km, 0.25);
        assert!(result.description.contains("WGS84"));
    }

    #[test]
    fn test_default_radius_without_precision() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "").with_coordinates(coords(38.5, -92.2, None));
        let result = ManualPipe.attempt(&record, &ctx).unwrap().unwrap();
        assert_abs_diff_eq!(result.radius_km, ctx.params.manual_default_radius_km);
    }

    #[test]
    fn test_not_applicable_without_coordinates() {
        let ctx = context();
        assert!(ManualPipe.attempt(&LocalityRecord::new("r1", "Springfield"), &ctx).unwrap().is_none());
    }

    #[test]
    fn test_out_of_range_is_invalid() {
        let ctx = context();
        let record = LocalityRecord::new("r1", "").with_coordinates(coords(98.5, -92.2, None));
        assert!(matches!(
            ManualPipe.attempt(&record, &ctx),
            Err(ResolveError::InvalidCoordinate(_))
        ));
    }
}
