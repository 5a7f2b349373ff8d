//! Uncertainty radius model.
//!
//! Every strategy starts from the resolved geometry's own extent (or the
//! distances stated in the text) and is then widened by
//! `resize_when_testing_intersection`. Manual coordinates are the one
//! exception: their radius is the declared precision, unscaled.

use serde::{Deserialize, Serialize};

use crate::geometry::Shape;

/// Tunable parameters of the model and of the pipes that feed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UncertaintyParams {
    pub resize_when_testing_intersection: f64,
    pub dist_km_to_extend_sites_offshore: f64,
    pub border_buffer_km: f64,
    pub between_min_buffer_km: f64,
    pub manual_default_radius_km: f64,
    /// Distance range upper bound assumed for "N of X" with no distance.
    pub undirected_max_dist_km: f64,
}

impl Default for UncertaintyParams {
    fn default() -> Self {
        Self {
            resize_when_testing_intersection: 1.1,
            dist_km_to_extend_sites_offshore: 20.0,
            border_buffer_km: 2.0,
            between_min_buffer_km: 1.0,
            manual_default_radius_km: 0.1,
            undirected_max_dist_km: 16.0,
        }
    }
}

/// What produced the geometry, with the numbers each rule needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Manual {
        declared_km: Option<f64>,
    },
    Plss,
    Between {
        distance_km: f64,
    },
    Border {
        buffer_km: f64,
    },
    Offshore {
        reference_km: f64,
    },
    Direction {
        distance_km: f64,
        /// Uncertainty of the stated distance itself.
        precision_km: f64,
        /// Half-width of the compass sector named by the bearing.
        half_width_deg: f64,
        /// Extent of the reference feature.
        reference_km: f64,
        /// Distance the point was pulled back from open water.
        offshore_km: f64,
    },
    /// A single gazetteer feature (custom or general gazetteer).
    Feature {
        point_radius_km: f64,
        /// Features sharing the matched name before narrowing.
        same_name: usize,
    },
}

/// Radius in km. Always finite and non-negative.
pub fn estimate(geometry: &Shape, strategy: &Strategy, params: &UncertaintyParams) -> f64 {
    let resize = params.resize_when_testing_intersection.max(1.0);
    let radius = match strategy {
        Strategy::Manual { declared_km } => {
            return clamp(declared_km.unwrap_or(params.manual_default_radius_km));
        }
        Strategy::Plss => geometry.bounding_radius_km() * resize,
        Strategy::Between { distance_km } => distance_km / 2.0 * resize,
        Strategy::Border { buffer_km } => geometry.bounding_radius_km().max(*buffer_km) * resize,
        Strategy::Offshore { reference_km } => {
            (reference_km + params.dist_km_to_extend_sites_offshore) * resize
        }
        Strategy::Direction {
            distance_km,
            precision_km,
            half_width_deg,
            reference_km,
            offshore_km,
        } => {
            let lateral = distance_km * half_width_deg.to_radians().sin();
            (precision_km.hypot(lateral) + reference_km + offshore_km) * resize
        }
        Strategy::Feature {
            point_radius_km,
            same_name,
        } => {
            let base = if geometry.is_point() {
                point_radius_km * ((*same_name).max(1) as f64).sqrt()
            } else {
                geometry.bounding_radius_km()
            };
            base * resize
        }
    };
    clamp(radius)
}

fn clamp(radius: f64) -> f64 {
    if radius.is_finite() {
        radius.max(0.0)
    } else {
        0.0
    }
}

/// Precision of a single stated distance: half its order of magnitude.
pub fn distance_precision(distance: f64) -> f64 {
    if distance <= 0.0 || !distance.is_finite() {
        return 0.0;
    }
    0.5 * 10f64.powf(distance.log10().floor())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn direction(distance_km: f64, half_width_deg: f64) -> Strategy {
        Strategy::Direction {
            distance_km,
            precision_km: distance_precision(distance_km),
            half_width_deg,
            reference_km: 5.0,
            offshore_km: 0.0,
        }
    }

    #[test]
    fn test_manual_uses_declared_precision_only() {
        let params = UncertaintyParams::default();
        let point = Shape::point(38.5, -92.2);
        let r = estimate(&point, &Strategy::Manual { declared_km: Some(0.25) }, &params);
        assert_abs_diff_eq!(r, 0.25);
        let r = estimate(&point, &Strategy::Manual { declared_km: None }, &params);
        assert_abs_diff_eq!(r, params.manual_default_radius_km);
    }

    #[test]
    fn test_between_is_half_distance_resized() {
        let params = UncertaintyParams::default();
        let r = estimate(&Shape::point(0.0, 0.0), &Strategy::Between { distance_km: 40.0 }, &params);
        assert_abs_diff_eq!(r, 22.0, epsilon = 1e-9);
    }

    #[test]
    fn test_direction_grows_with_distance() {
        let params = UncertaintyParams::default();
        let p = Shape::point(0.0, 0.0);
        let mut last = 0.0;
        for d in [0.5, 1.0, 2.0, 5.0, 9.0, 10.0, 25.0, 99.0, 100.0, 400.0] {
            let r = estimate(&p, &direction(d, 22.5), &params);
            assert!(r >= last, "radius shrank at {} km", d);
            last = r;
        }
    }

    #[test]
    fn test_direction_coarse_bearing_is_wider() {
        let params = UncertaintyParams::default();
        let p = Shape::point(0.0, 0.0);
        let n = estimate(&p, &direction(5.0, 45.0), &params);
        let nne = estimate(&p, &direction(5.0, 11.25), &params);
        assert!(n > nne);
    }

    #[test]
    fn test_offshore_adds_extension() {
        let params = UncertaintyParams::default();
        let r = estimate(&Shape::point(0.0, 0.0), &Strategy::Offshore { reference_km: 5.0 }, &params);
        assert_abs_diff_eq!(r, 25.0 * 1.1, epsilon = 1e-9);
    }

    #[test]
    fn test_feature_point_scales_with_name_ambiguity() {
        let params = UncertaintyParams::default();
        let p = Shape::point(0.0, 0.0);
        let one = estimate(&p, &Strategy::Feature { point_radius_km: 5.0, same_name: 1 }, &params);
        let four = estimate(&p, &Strategy::Feature { point_radius_km: 5.0, same_name: 4 }, &params);
        assert_abs_diff_eq!(four, one * 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_feature_polygon_uses_extent() {
        let params = UncertaintyParams::default();
        let square = Shape::bbox(-0.5, -0.5, 0.5, 0.5);
        let r = estimate(&square, &Strategy::Feature { point_radius_km: 1.0, same_name: 9 }, &params);
        assert_abs_diff_eq!(r, square.bounding_radius_km() * 1.1, epsilon = 1e-9);
    }

    #[test]
    fn test_radius_never_negative() {
        let params = UncertaintyParams::default();
        let r = estimate(&Shape::point(0.0, 0.0), &Strategy::Manual { declared_km: Some(-3.0) }, &params);
        assert_eq!(r, 0.0);
        let r = estimate(&Shape::point(0.0, 0.0), &Strategy::Between { distance_km: f64::NAN }, &params);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn test_distance_precision() {
        assert_abs_diff_eq!(distance_precision(5.0), 0.5);
        assert_abs_diff_eq!(distance_precision(40.0), 5.0);
        assert_abs_diff_eq!(distance_precision(0.25), 0.05);
        assert_eq!(distance_precision(0.0), 0.0);
    }
}
