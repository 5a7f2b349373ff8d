//! Geometry helpers for resolved localities.
//!
//! `Shape` is the geometry carried on gazetteer features and match results.
//! It serializes as a GeoJSON geometry object (`{"type": .., "coordinates": ..}`)
//! with `[lon, lat]` coordinate order. All distances are haversine, in km.

use geo::{
    BooleanOps, Centroid, ChamberlainDuquetteArea, Contains, ConvexHull, HaversineDestination,
    HaversineDistance, Intersects, Line, LineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use serde::{Deserialize, Serialize};

/// Vertices used to approximate a circle.
const CIRCLE_SEGMENTS: usize = 32;

/// A point or polygon geometry in WGS84.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Shape {
    /// `[lon, lat]`
    Point([f64; 2]),
    /// Rings of `[lon, lat]`, exterior first. Rings are closed.
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl Shape {
    pub fn point(lat: f64, lon: f64) -> Self {
        Shape::Point([lon, lat])
    }

    pub fn from_polygon(poly: &Polygon<f64>) -> Self {
        let mut rings = vec![ring_coords(poly.exterior())];
        rings.extend(poly.interiors().iter().map(ring_coords));
        Shape::Polygon(rings)
    }

    /// Axis-aligned box from its corners.
    pub fn bbox(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Shape::Polygon(vec![vec![
            [min_lon, min_lat],
            [max_lon, min_lat],
            [max_lon, max_lat],
            [min_lon, max_lat],
            [min_lon, min_lat],
        ]])
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Shape::Point(_))
    }

    pub fn to_polygon(&self) -> Option<Polygon<f64>> {
        match self {
            Shape::Point(_) => None,
            Shape::Polygon(rings) => {
                let mut iter = rings.iter().map(|ring| {
                    LineString::from(ring.iter().map(|c| (c[0], c[1])).collect::<Vec<_>>())
                });
                let exterior = iter.next()?;
                Some(Polygon::new(exterior, iter.collect()))
            }
        }
    }

    /// Exterior vertices (the point itself for a point).
    pub fn vertices(&self) -> Vec<Point<f64>> {
        match self {
            Shape::Point([lon, lat]) => vec![Point::new(*lon, *lat)],
            Shape::Polygon(rings) => rings
                .first()
                .map(|ring| ring.iter().map(|c| Point::new(c[0], c[1])).collect())
                .unwrap_or_default(),
        }
    }

    pub fn centroid(&self) -> Point<f64> {
        match self {
            Shape::Point([lon, lat]) => Point::new(*lon, *lat),
            Shape::Polygon(_) => self
                .to_polygon()
                .and_then(|p| p.centroid())
                .or_else(|| self.vertices().first().copied())
                .unwrap_or_else(|| Point::new(0.0, 0.0)),
        }
    }

    /// Radius of the circle around the centroid that encloses every vertex.
    pub fn bounding_radius_km(&self) -> f64 {
        let center = self.centroid();
        self.vertices()
            .iter()
            .map(|v| distance_km(&center, v))
            .fold(0.0, f64::max)
    }

    pub fn area_km2(&self) -> f64 {
        self.to_polygon()
            .map(|p| p.chamberlain_duquette_unsigned_area() / 1_000_000.0)
            .unwrap_or(0.0)
    }

    pub fn contains(&self, point: &Point<f64>) -> bool {
        match self {
            Shape::Point([lon, lat]) => *lon == point.x() && *lat == point.y(),
            Shape::Polygon(_) => self
                .to_polygon()
                .map(|p| p.contains(point))
                .unwrap_or(false),
        }
    }

    /// Checks that the geometry is non-empty, in range and not self-intersecting.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Shape::Point([lon, lat]) => check_coord(*lon, *lat),
            Shape::Polygon(rings) => {
                if rings.is_empty() {
                    return Err("polygon has no rings".into());
                }
                for ring in rings {
                    if ring.len() < 4 {
                        return Err(format!("ring has {} coordinates (minimum 4)", ring.len()));
                    }
                    if ring.first() != ring.last() {
                        return Err("ring is not closed".into());
                    }
                    for c in ring {
                        check_coord(c[0], c[1])?;
                    }
                    if ring_self_intersects(ring) {
                        return Err("ring self-intersects".into());
                    }
                }
                if self.area_km2() <= 0.0 {
                    return Err("polygon has zero area".into());
                }
                Ok(())
            }
        }
    }
}

fn ring_coords(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

fn check_coord(lon: f64, lat: f64) -> Result<(), String> {
    if !lon.is_finite() || !lat.is_finite() {
        return Err("non-finite coordinate".into());
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinate out of range: ({}, {})", lat, lon));
    }
    Ok(())
}

fn ring_self_intersects(ring: &[[f64; 2]]) -> bool {
    let segments: Vec<Line<f64>> = ring
        .windows(2)
        .map(|w| Line::new((w[0][0], w[0][1]), (w[1][0], w[1][1])))
        .collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 2)..n {
            // first and last segments share the closing vertex
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments[i].intersects(&segments[j]) {
                return true;
            }
        }
    }
    false
}

// ─── Spherical helpers ──────────────────────────────────────────

pub fn distance_km(a: &Point<f64>, b: &Point<f64>) -> f64 {
    a.haversine_distance(b) / 1000.0
}

/// Point reached travelling `km` from `from` along `bearing_deg` (clockwise from north).
pub fn destination(from: &Point<f64>, bearing_deg: f64, km: f64) -> Point<f64> {
    from.haversine_destination(bearing_deg, km * 1000.0)
}

pub fn circle(center: &Point<f64>, radius_km: f64) -> Polygon<f64> {
    let coords: Vec<(f64, f64)> = (0..CIRCLE_SEGMENTS)
        .map(|i| {
            let bearing = 360.0 * i as f64 / CIRCLE_SEGMENTS as f64;
            let p = destination(center, bearing, radius_km);
            (p.x(), p.y())
        })
        .collect();
    Polygon::new(LineString::from(coords), vec![])
}

/// Outline grown by `km` on every side.
///
/// A polygon is unioned with a capsule around each of its edges, so bays
/// and notches stay open. A point becomes a circle.
pub fn buffer(shape: &Shape, km: f64) -> Polygon<f64> {
    let Some(poly) = shape.to_polygon() else {
        return circle(&shape.centroid(), km);
    };
    let mut grown = MultiPolygon::new(vec![poly.clone()]);
    for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
        for edge in ring.lines() {
            let capsule = hull_of_circles(&[edge.start_point(), edge.end_point()], km);
            grown = grown.union(&MultiPolygon::new(vec![capsule]));
        }
    }
    // the buffer of a connected outline is connected; drop slivers
    grown
        .into_iter()
        .max_by(|a, b| {
            a.chamberlain_duquette_unsigned_area()
                .total_cmp(&b.chamberlain_duquette_unsigned_area())
        })
        .unwrap_or(poly)
}

/// Buffered convex hull spanning two shapes (the "between" corridor).
pub fn span(a: &Shape, b: &Shape, km: f64) -> Polygon<f64> {
    let mut vertices = a.vertices();
    vertices.extend(b.vertices());
    hull_of_circles(&vertices, km)
}

fn hull_of_circles(vertices: &[Point<f64>], km: f64) -> Polygon<f64> {
    let points: Vec<Point<f64>> = vertices
        .iter()
        .flat_map(|v| circle(v, km).exterior().points().collect::<Vec<_>>())
        .collect();
    MultiPoint::from(points).convex_hull()
}

/// Overlap of two polygons, reduced to its convex hull. `None` when the
/// polygons themselves do not intersect.
pub fn overlap(a: &Polygon<f64>, b: &Polygon<f64>) -> Option<Polygon<f64>> {
    let shared: MultiPolygon<f64> = a.intersection(b);
    let points: Vec<Point<f64>> = shared
        .iter()
        .flat_map(|p| p.exterior().points().collect::<Vec<_>>())
        .collect();
    if points.len() < 3 {
        return None;
    }
    let hull = MultiPoint::from(points).convex_hull();
    if hull.chamberlain_duquette_unsigned_area() <= 0.0 {
        return None;
    }
    Some(hull)
}
