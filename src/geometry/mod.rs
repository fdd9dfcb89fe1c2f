// src/geometry/mod.rs - Pure geometric predicates over property and search-area coordinates
//!
//! Everything here is synchronous and allocation-light. Distances are in
//! kilometres, coordinates in degrees. GeoJSON positions arrive as `[lng, lat]`
//! and are converted to [`GeoPoint`] by the search-area parser before they get here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Builds a point from a GeoJSON position (`[lng, lat]`).
    pub fn from_position(position: [f64; 2]) -> Self {
        Self {
            lat: position[1],
            lng: position[0],
        }
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self.lat, self.lng, other.lat, other.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("coordinate out of range or not finite: lat={lat}, lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },
    #[error("ring has {vertices} distinct vertices, at least 3 required")]
    DegenerateRing { vertices: usize },
    #[error("line has {vertices} vertices, at least 2 required")]
    DegenerateLine { vertices: usize },
    #[error("geometry contains no shapes")]
    Empty,
    #[error("search area is malformed: {0}")]
    Malformed(String),
}

/// Great-circle distance between two coordinates in km.
pub fn haversine_distance(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64) -> f64 {
    let (phi1, phi2) = (lat_a.to_radians(), lat_b.to_radians());
    let (delta_phi, delta_lambda) = ((lat_b - lat_a).to_radians(), (lng_b - lng_a).to_radians());
    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

pub fn validate_point(point: &GeoPoint) -> Result<(), GeometryError> {
    let valid = point.lat.is_finite()
        && point.lng.is_finite()
        && (-90.0..=90.0).contains(&point.lat)
        && (-180.0..=180.0).contains(&point.lng);
    if valid {
        Ok(())
    } else {
        Err(GeometryError::InvalidCoordinate {
            lat: point.lat,
            lng: point.lng,
        })
    }
}

/// A ring needs three distinct vertices; the closing vertex may or may not repeat the first.
pub fn validate_ring(ring: &[GeoPoint]) -> Result<(), GeometryError> {
    for point in ring {
        validate_point(point)?;
    }
    let vertices = open_ring(ring).len();
    if vertices < 3 {
        return Err(GeometryError::DegenerateRing { vertices });
    }
    Ok(())
}

/// Drops the explicit closing vertex GeoJSON rings carry.
fn open_ring(ring: &[GeoPoint]) -> &[GeoPoint] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

/// Even-odd ray casting against a single ring. Longitude is x, latitude is y.
pub fn point_in_ring(point: &GeoPoint, ring: &[GeoPoint]) -> bool {
    let ring = open_ring(ring);
    if ring.len() < 3 {
        return false;
    }
    let (x, y) = (point.lng, point.lat);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].lng, ring[i].lat);
        let (xj, yj) = (ring[j].lng, ring[j].lat);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Containment in a GeoJSON polygon: inside the outer ring (first) and outside every hole.
pub fn point_in_polygon(point: &GeoPoint, rings: &[Vec<GeoPoint>]) -> bool {
    let Some((outer, holes)) = rings.split_first() else {
        return false;
    };
    point_in_ring(point, outer) && !holes.iter().any(|hole| point_in_ring(point, hole))
}

/// Projects `p` onto a local plane (km) centred on `origin`.
fn project(origin: &GeoPoint, p: &GeoPoint) -> (f64, f64) {
    let km_per_degree = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;
    let x = (p.lng - origin.lng) * origin.lat.to_radians().cos() * km_per_degree;
    let y = (p.lat - origin.lat) * km_per_degree;
    (x, y)
}

/// Shortest distance (km) from `point` to the segment `a`-`b`.
pub fn distance_point_to_segment(point: &GeoPoint, a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (ax, ay) = project(point, a);
    let (bx, by) = project(point, b);
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        // point is the origin of the projection, so (px, py) = (0, 0)
        (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

/// Shortest distance (km) from `point` to a polyline.
pub fn distance_point_to_line(point: &GeoPoint, line: &[GeoPoint]) -> Result<f64, GeometryError> {
    if line.len() < 2 {
        return Err(GeometryError::DegenerateLine {
            vertices: line.len(),
        });
    }
    Ok(line
        .windows(2)
        .map(|segment| distance_point_to_segment(point, &segment[0], &segment[1]))
        .fold(f64::INFINITY, f64::min))
}

/// Shortest distance (km) from `point` to any ring of a polygon, closing segment included.
pub fn distance_to_polygon_boundary(
    point: &GeoPoint,
    rings: &[Vec<GeoPoint>],
) -> Result<f64, GeometryError> {
    if rings.is_empty() {
        return Err(GeometryError::Empty);
    }
    let mut best = f64::INFINITY;
    for ring in rings {
        validate_ring(ring)?;
        let open = open_ring(ring);
        let mut closed: Vec<GeoPoint> = open.to_vec();
        closed.push(open[0]);
        best = best.min(distance_point_to_line(point, &closed)?);
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min_lat: f64, min_lng: f64, size: f64) -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(min_lat, min_lng),
            GeoPoint::new(min_lat, min_lng + size),
            GeoPoint::new(min_lat + size, min_lng + size),
            GeoPoint::new(min_lat + size, min_lng),
            GeoPoint::new(min_lat, min_lng),
        ]
    }

    #[test]
    fn test_haversine_reference_distance() {
        // Milano Duomo -> Roma Colosseo, roughly 477 km
        let d = haversine_distance(45.4641, 9.1919, 41.8902, 12.4922);
        assert!((d - 477.0).abs() < 5.0, "got {}", d);
        assert_eq!(haversine_distance(45.0, 9.0, 45.0, 9.0), 0.0);
    }

    #[test]
    fn test_point_in_polygon_with_hole() {
        let outer = square(45.0, 9.0, 0.1);
        let hole = square(45.04, 9.04, 0.02);
        let rings = vec![outer, hole];

        assert!(point_in_polygon(&GeoPoint::new(45.01, 9.01), &rings));
        assert!(!point_in_polygon(&GeoPoint::new(45.05, 9.05), &rings));
        assert!(!point_in_polygon(&GeoPoint::new(45.2, 9.01), &rings));
    }

    #[test]
    fn test_degenerate_polygons_are_never_inside() {
        assert!(!point_in_polygon(&GeoPoint::new(45.0, 9.0), &[]));
        let line_ring = vec![GeoPoint::new(45.0, 9.0), GeoPoint::new(45.1, 9.1), GeoPoint::new(45.0, 9.0)];
        assert!(!point_in_ring(&GeoPoint::new(45.05, 9.05), &line_ring));
        assert!(matches!(
            validate_ring(&line_ring),
            Err(GeometryError::DegenerateRing { vertices: 2 })
        ));
    }

    #[test]
    fn test_distance_point_to_line() {
        let line = vec![GeoPoint::new(45.0, 9.0), GeoPoint::new(45.0, 9.1)];
        // 0.01 degrees of latitude north of the line is about 1.11 km
        let d = distance_point_to_line(&GeoPoint::new(45.01, 9.05), &line).unwrap();
        assert!((d - 1.112).abs() < 0.01, "got {}", d);

        // Beyond the end of the segment the distance is to the endpoint
        let past_end = GeoPoint::new(45.0, 9.2);
        let d_end = distance_point_to_line(&past_end, &line).unwrap();
        let expected = past_end.distance_km(&GeoPoint::new(45.0, 9.1));
        assert!((d_end - expected).abs() < 0.05);

        assert!(distance_point_to_line(&past_end, &line[..1]).is_err());
    }

    #[test]
    fn test_distance_to_polygon_boundary_uses_closing_edge() {
        // Ring without the explicit closing vertex
        let ring = vec![
            GeoPoint::new(45.0, 9.0),
            GeoPoint::new(45.0, 9.1),
            GeoPoint::new(45.1, 9.1),
            GeoPoint::new(45.1, 9.0),
        ];
        // West of the western edge, which is the implicit closing segment
        let d = distance_to_polygon_boundary(&GeoPoint::new(45.05, 8.99), &[ring]).unwrap();
        assert!(d > 0.7 && d < 0.8, "got {}", d);
    }

    #[test]
    fn test_validate_point_rejects_out_of_range() {
        assert!(validate_point(&GeoPoint::new(91.0, 9.0)).is_err());
        assert!(validate_point(&GeoPoint::new(45.0, f64::NAN)).is_err());
        assert!(validate_point(&GeoPoint::new(45.0, 9.0)).is_ok());
    }
}
