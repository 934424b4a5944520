//! # Geographic Utilities
//!
//! Core geographic computation utilities for ski area features.
//!
//! This module provides the geometric primitives used by the clustering resolver and the
//! statistics aggregator. All functions operate on WGS84 coordinates (longitude/latitude in
//! degrees) and treat a third coordinate component, when present, as elevation in meters.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two positions |
//! | [`line_length_meters`] | Total length of a vertex sequence in meters |
//! | [`geometry_length_km`] | Length of a geometry (polygon perimeters included) in km |
//! | [`compute_bounds`] | Bounding box of a set of positions |
//! | [`compute_center`] | Coordinate-wise mean of a set of positions |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`contains_point`] | Containment test with hole support |
//! | [`areas_overlap`] | Check if two polygon footprints share interior area |
//! | [`geometry_distance`] | Minimum distance between two geometries |
//! | [`descent_sum`] | Summed descending elevation steps along a sequence |
//!
//! ## Example
//!
//! ```rust
//! use ski_area_clustering::{Geometry, Position, geo_utils};
//!
//! let run = Geometry::LineString(vec![
//!     Position::with_elevation(0.0, 0.0, 100.0),
//!     Position::with_elevation(1.0, 0.0, 90.0),
//! ]);
//!
//! let length = geo_utils::geometry_length_km(&run);
//! assert!((length - 111.195).abs() < 0.01);
//!
//! let descent = geo_utils::descent_sum(&[
//!     Position::with_elevation(0.0, 0.0, 100.0),
//!     Position::with_elevation(1.0, 0.0, 90.0),
//! ]);
//! assert_eq!(descent, Some(10.0));
//! ```
//!
//! ## Algorithm Notes
//!
//! Lengths use the haversine formula on a sphere of mean Earth radius. Distances and
//! topological relations between geometries are computed with `geo` in a local
//! equirectangular projection centered on the first geometry.

use geo::{
    Contains, Coord, Distance, Euclidean, Haversine, Intersects, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon, Relate,
};

use crate::{Bounds, Geometry, Position};

/// Approximate meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two positions using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface. Elevation is ignored.
///
/// # Example
///
/// ```rust
/// use ski_area_clustering::{Position, geo_utils};
///
/// let a = Position::new(0.0, 0.0);
/// let b = Position::new(1.0, 0.0);
///
/// let distance = geo_utils::haversine_distance(&a, &b);
/// assert!((distance - 111_195.08).abs() < 1.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &Position, p2: &Position) -> f64 {
    let point1 = Point::new(p1.lng(), p1.lat());
    let point2 = Point::new(p2.lng(), p2.lat());
    Haversine::distance(point1, point2)
}

/// Calculate the total length of a vertex sequence in meters.
///
/// Sums the haversine distance between consecutive positions. Empty or single-vertex
/// sequences return 0.0.
pub fn line_length_meters(points: &[Position]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Geodesic length of a geometry in kilometers.
///
/// Lines contribute their length, polygons the perimeter of every ring, points nothing.
/// Sequences are summed in geometry order so the result is reproducible.
pub fn geometry_length_km(geometry: &Geometry) -> f64 {
    geometry
        .vertex_sequences()
        .into_iter()
        .map(line_length_meters)
        .sum::<f64>()
        / 1000.0
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Returns a single value suitable for bounding box calculations where a square search
/// area is acceptable. The longitude scale is clamped so the result stays bounded close
/// to the poles.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = METERS_PER_DEGREE * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Planar Geometry
// =============================================================================

/// Equirectangular projection to meters around an origin position.
///
/// Accurate for the sub-kilometer tolerances used while clustering. Relations such as
/// containment are unaffected by the projection since it is affine.
struct LocalFrame {
    origin: Coord,
    scale_x: f64,
}

impl LocalFrame {
    fn around(origin: &Position) -> Self {
        Self {
            origin: Coord { x: origin.lng(), y: origin.lat() },
            scale_x: METERS_PER_DEGREE * origin.lat().to_radians().cos(),
        }
    }

    fn coord(&self, p: &Position) -> Coord {
        Coord {
            x: (p.lng() - self.origin.x) * self.scale_x,
            y: (p.lat() - self.origin.y) * METERS_PER_DEGREE,
        }
    }

    fn point(&self, p: &Position) -> Point {
        Point(self.coord(p))
    }

    /// A single vertex becomes a zero-length line so it still has a body.
    fn line_string(&self, sequence: &[Position]) -> LineString {
        let mut coords: Vec<Coord> = sequence.iter().map(|p| self.coord(p)).collect();
        if coords.len() == 1 {
            coords.push(coords[0]);
        }
        LineString::new(coords)
    }

    fn polygon(&self, rings: &[Vec<Position>]) -> Polygon {
        let mut rings = rings.iter().map(|ring| self.line_string(ring));
        let exterior = rings.next().unwrap_or_else(|| LineString::new(vec![]));
        Polygon::new(exterior, rings.collect())
    }

    fn multi_polygon(&self, polygons: &[&[Vec<Position>]]) -> MultiPolygon {
        MultiPolygon::new(
            polygons
                .iter()
                .filter(|rings| !rings.is_empty())
                .map(|rings| self.polygon(rings))
                .collect(),
        )
    }

    fn geometry(&self, geometry: &Geometry) -> geo::Geometry {
        match geometry {
            Geometry::Point(p) => geo::Geometry::Point(self.point(p)),
            Geometry::MultiPoint(points) => {
                geo::Geometry::MultiPoint(MultiPoint::new(points.iter().map(|p| self.point(p)).collect()))
            }
            Geometry::LineString(line) => geo::Geometry::LineString(self.line_string(line)),
            Geometry::MultiLineString(lines) => geo::Geometry::MultiLineString(MultiLineString::new(
                lines.iter().map(|line| self.line_string(line)).collect(),
            )),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
                geo::Geometry::MultiPolygon(self.multi_polygon(&geometry.polygons()))
            }
        }
    }
}

fn first_vertex(geometry: &Geometry) -> Option<&Position> {
    geometry.vertex_sequences().into_iter().flatten().next()
}

// =============================================================================
// Containment and Proximity
// =============================================================================

/// Check whether a position lies in the interior of one of the geometry's polygons.
///
/// Positions inside a hole, or on a boundary, are outside. Non-areal geometries contain nothing.
pub fn contains_point(area: &Geometry, p: &Position) -> bool {
    let polygons = area.polygons();
    if polygons.is_empty() || !area.is_valid() {
        return false;
    }
    let frame = LocalFrame::around(p);
    frame.multi_polygon(&polygons).contains(&frame.point(p))
}

/// Check whether two areal geometries share interior area.
///
/// Polygons that only touch along an edge or at a corner do not overlap.
pub fn areas_overlap(a: &Geometry, b: &Geometry) -> bool {
    if !a.is_areal() || !b.is_areal() || !a.is_valid() || !b.is_valid() {
        return false;
    }
    let Some(origin) = first_vertex(a) else {
        return false;
    };
    let frame = LocalFrame::around(origin);
    let matrix = frame.geometry(a).relate(&frame.geometry(b));
    matrix.is_intersects() && !matrix.is_touches()
}

/// Minimum distance in meters between two geometries.
///
/// Returns 0.0 when the geometries intersect, which covers lines crossing between their
/// vertices and features lying inside a polygon. Invalid geometries are infinitely far
/// from everything.
pub fn geometry_distance(a: &Geometry, b: &Geometry) -> f64 {
    if !a.is_valid() || !b.is_valid() {
        return f64::INFINITY;
    }
    let Some(origin) = first_vertex(a) else {
        return f64::INFINITY;
    };

    let frame = LocalFrame::around(origin);
    let (a, b) = (frame.geometry(a), frame.geometry(b));
    if a.intersects(&b) {
        return 0.0;
    }
    Euclidean::distance(&a, &b)
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a set of positions.
///
/// Returns `None` for empty input.
///
/// # Example
///
/// ```rust
/// use ski_area_clustering::{Position, geo_utils};
///
/// let points = vec![
///     Position::new(11.12, 47.55),
///     Position::new(11.13, 47.56),
/// ];
///
/// let bounds = geo_utils::compute_bounds(points.iter()).unwrap();
/// assert_eq!(bounds.min_lng, 11.12);
/// assert_eq!(bounds.max_lat, 47.56);
/// ```
pub fn compute_bounds<'a>(points: impl IntoIterator<Item = &'a Position>) -> Option<Bounds> {
    let mut iter = points.into_iter().peekable();
    iter.peek()?;

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in iter {
        min_lat = min_lat.min(p.lat());
        max_lat = max_lat.max(p.lat());
        min_lng = min_lng.min(p.lng());
        max_lng = max_lng.max(p.lng());
    }

    Some(Bounds { min_lat, max_lat, min_lng, max_lng })
}

/// Bounding box of every vertex of a geometry.
pub fn geometry_bounds(geometry: &Geometry) -> Option<Bounds> {
    compute_bounds(geometry.vertex_sequences().into_iter().flatten())
}

// =============================================================================
// Center/Centroid Functions
// =============================================================================

/// Compute the coordinate-wise mean of a set of positions, ignoring elevation.
///
/// Returns `None` for empty input. Positions are summed in iteration order.
///
/// # Example
///
/// ```rust
/// use ski_area_clustering::{Position, geo_utils};
///
/// let points = vec![
///     Position::with_elevation(0.0, 0.0, 100.0),
///     Position::with_elevation(1.0, 0.0, 90.0),
/// ];
///
/// let center = geo_utils::compute_center(points.iter()).unwrap();
/// assert_eq!(center, Position::new(0.5, 0.0));
/// ```
pub fn compute_center<'a>(points: impl IntoIterator<Item = &'a Position>) -> Option<Position> {
    let mut sum_lng = 0.0;
    let mut sum_lat = 0.0;
    let mut n = 0usize;

    for p in points {
        sum_lng += p.lng();
        sum_lat += p.lat();
        n += 1;
    }

    if n == 0 {
        return None;
    }

    Some(Position::new(sum_lng / n as f64, sum_lat / n as f64))
}

// =============================================================================
// Elevation Functions
// =============================================================================

/// Minimum and maximum elevation over every vertex that carries one.
pub fn elevation_range(geometry: &Geometry) -> Option<(f64, f64)> {
    geometry
        .vertex_sequences()
        .into_iter()
        .flatten()
        .filter_map(Position::elevation)
        .fold(None, |range, e| match range {
            None => Some((e, e)),
            Some((min, max)) => Some((min.min(e), max.max(e))),
        })
}

/// Sum the magnitude of every descending step between consecutive elevation samples.
///
/// Vertices without elevation are skipped; ascents are ignored rather than subtracted.
/// Returns `None` when the sequence carries no elevation at all.
pub fn descent_sum(points: &[Position]) -> Option<f64> {
    let mut samples = points.iter().filter_map(Position::elevation);
    let mut previous = samples.next()?;
    let mut descent = 0.0;

    for elevation in samples {
        if elevation < previous {
            descent += previous - elevation;
        }
        previous = elevation;
    }

    Some(descent)
}

/// [`descent_sum`] over every vertex sequence of a geometry.
pub fn geometry_descent(geometry: &Geometry) -> Option<f64> {
    geometry
        .vertex_sequences()
        .into_iter()
        .filter_map(descent_sum)
        .fold(None, |total, d| Some(total.unwrap_or(0.0) + d))
}

// =============================================================================
// Unit Tests
// =============================================================================
