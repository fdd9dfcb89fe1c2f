// src/matching/geography.rs - Search-area containment with tolerance bands
use crate::geometry::{
    distance_to_polygon_boundary, point_in_polygon, validate_point, GeoPoint, GeometryError,
};
use crate::models::search_area::{SearchArea, ZoneFeature};
use crate::utils::constants::{
    BAND_EPSILON, CIRCLE_DISTANCE_MAX_PENALTY, DEFAULT_CIRCLE_RADIUS_KM,
    DEFAULT_POINT_ZONE_RADIUS_KM, GEO_TOLERANCE_KM, POINT_ZONE_MAX_PENALTY,
    ZONE_TOLERANCE_MAX_PENALTY,
};

/// Outcome of checking one location against a search area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeoVerdict {
    Inside { penalty: f64 },
    /// Just outside, accepted at a penalty.
    Tolerance { penalty: f64 },
    Outside,
}

impl GeoVerdict {
    pub fn penalty(&self) -> Option<f64> {
        match self {
            GeoVerdict::Inside { penalty } | GeoVerdict::Tolerance { penalty } => Some(*penalty),
            GeoVerdict::Outside => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            GeoVerdict::Inside { .. } => 2,
            GeoVerdict::Tolerance { .. } => 1,
            GeoVerdict::Outside => 0,
        }
    }

    /// Inside beats tolerance beats outside; ties go to the smaller penalty.
    fn better(self, other: GeoVerdict) -> GeoVerdict {
        match self.rank().cmp(&other.rank()) {
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Equal => {
                if other.penalty().unwrap_or(f64::INFINITY) < self.penalty().unwrap_or(f64::INFINITY) {
                    other
                } else {
                    self
                }
            }
        }
    }
}

pub fn evaluate_area(area: &SearchArea, location: &GeoPoint) -> Result<GeoVerdict, GeometryError> {
    validate_point(location)?;
    match area {
        SearchArea::Zones { features } => {
            if features.is_empty() {
                return Err(GeometryError::Empty);
            }
            let mut best = GeoVerdict::Outside;
            for feature in features {
                best = best.better(evaluate_feature(feature, location)?);
            }
            Ok(best)
        }
        SearchArea::Circle { center, radius_km } => Ok(radius_verdict(
            center,
            radius_km.unwrap_or(DEFAULT_CIRCLE_RADIUS_KM),
            location,
        )),
        SearchArea::Point { point } => Ok(radius_verdict(point, DEFAULT_CIRCLE_RADIUS_KM, location)),
        SearchArea::Malformed { reason } => Err(GeometryError::Malformed(reason.clone())),
    }
}

fn radius_verdict(center: &GeoPoint, radius_km: f64, location: &GeoPoint) -> GeoVerdict {
    let distance = center.distance_km(location);
    if distance <= radius_km + BAND_EPSILON {
        GeoVerdict::Inside {
            penalty: CIRCLE_DISTANCE_MAX_PENALTY * (distance / radius_km).min(1.0),
        }
    } else {
        GeoVerdict::Outside
    }
}

fn evaluate_feature(feature: &ZoneFeature, location: &GeoPoint) -> Result<GeoVerdict, GeometryError> {
    match feature {
        ZoneFeature::Polygon { rings } => polygon_verdict(std::slice::from_ref(rings), location),
        ZoneFeature::MultiPolygon { polygons } => polygon_verdict(polygons, location),
        ZoneFeature::Point { point, radius_km } => {
            let radius = radius_km.unwrap_or(DEFAULT_POINT_ZONE_RADIUS_KM);
            let distance = point.distance_km(location);
            if distance <= radius + BAND_EPSILON {
                Ok(GeoVerdict::Inside {
                    penalty: POINT_ZONE_MAX_PENALTY * (distance / radius).min(1.0),
                })
            } else if distance - radius <= GEO_TOLERANCE_KM + BAND_EPSILON {
                Ok(GeoVerdict::Tolerance {
                    penalty: ZONE_TOLERANCE_MAX_PENALTY,
                })
            } else {
                Ok(GeoVerdict::Outside)
            }
        }
    }
}

fn polygon_verdict(polygons: &[Vec<Vec<GeoPoint>>], location: &GeoPoint) -> Result<GeoVerdict, GeometryError> {
    if polygons.is_empty() {
        return Err(GeometryError::Empty);
    }
    if polygons.iter().any(|rings| point_in_polygon(location, rings)) {
        return Ok(GeoVerdict::Inside { penalty: 0.0 });
    }
    let mut nearest = f64::INFINITY;
    for rings in polygons {
        nearest = nearest.min(distance_to_polygon_boundary(location, rings)?);
    }
    if nearest <= GEO_TOLERANCE_KM + BAND_EPSILON {
        Ok(GeoVerdict::Tolerance {
            penalty: ZONE_TOLERANCE_MAX_PENALTY * (nearest / GEO_TOLERANCE_KM).min(1.0),
        })
    } else {
        Ok(GeoVerdict::Outside)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone_square() -> SearchArea {
        // Roughly 1.1 km x 0.8 km block around central Milan
        let ring = vec![
            GeoPoint::new(45.46, 9.18),
            GeoPoint::new(45.46, 9.19),
            GeoPoint::new(45.47, 9.19),
            GeoPoint::new(45.47, 9.18),
            GeoPoint::new(45.46, 9.18),
        ];
        SearchArea::Zones {
            features: vec![ZoneFeature::Polygon { rings: vec![ring] }],
        }
    }

    #[test]
    fn test_polygon_inside_and_tolerance_band() {
        let area = zone_square();
        assert_eq!(
            evaluate_area(&area, &GeoPoint::new(45.465, 9.185)).unwrap(),
            GeoVerdict::Inside { penalty: 0.0 }
        );

        // ~0.33 km north of the northern edge
        match evaluate_area(&area, &GeoPoint::new(45.473, 9.185)).unwrap() {
            GeoVerdict::Tolerance { penalty } => assert!(penalty > 0.0 && penalty < ZONE_TOLERANCE_MAX_PENALTY),
            other => panic!("expected tolerance, got {:?}", other),
        }

        // ~1.1 km north: outside
        assert_eq!(
            evaluate_area(&area, &GeoPoint::new(45.48, 9.185)).unwrap(),
            GeoVerdict::Outside
        );
    }

    #[test]
    fn test_best_feature_wins() {
        let SearchArea::Zones { mut features } = zone_square() else {
            unreachable!()
        };
        features.push(ZoneFeature::Point {
            point: GeoPoint::new(45.50, 9.20),
            radius_km: Some(0.3),
        });
        let area = SearchArea::Zones { features };
        assert_eq!(
            evaluate_area(&area, &GeoPoint::new(45.465, 9.185)).unwrap(),
            GeoVerdict::Inside { penalty: 0.0 }
        );
        assert!(matches!(
            evaluate_area(&area, &GeoPoint::new(45.501, 9.20)).unwrap(),
            GeoVerdict::Inside { .. }
        ));
    }

    #[test]
    fn test_point_zone_tolerance_is_capped() {
        let area = SearchArea::Zones {
            features: vec![ZoneFeature::Point {
                point: GeoPoint::new(45.0, 9.0),
                radius_km: None,
            }],
        };
        // 0.8 km away: beyond the 0.5 km zone but within the extra 0.5 km band
        let near = GeoPoint::new(45.0072, 9.0);
        assert_eq!(
            evaluate_area(&area, &near).unwrap(),
            GeoVerdict::Tolerance {
                penalty: ZONE_TOLERANCE_MAX_PENALTY
            }
        );
        // 1.5 km away
        assert_eq!(
            evaluate_area(&area, &GeoPoint::new(45.0135, 9.0)).unwrap(),
            GeoVerdict::Outside
        );
    }

    #[test]
    fn test_circle_defaults_to_one_km() {
        let area = SearchArea::Circle {
            center: GeoPoint::new(41.9, 12.5),
            radius_km: None,
        };
        // ~0.56 km
        let verdict = evaluate_area(&area, &GeoPoint::new(41.905, 12.5)).unwrap();
        let penalty = verdict.penalty().unwrap();
        assert!(penalty > 5.0 && penalty < 6.0, "got {}", penalty);
        // ~1.1 km
        assert_eq!(
            evaluate_area(&area, &GeoPoint::new(41.91, 12.5)).unwrap(),
            GeoVerdict::Outside
        );
    }

    #[test]
    fn test_malformed_area_is_an_error() {
        let area = SearchArea::Malformed {
            reason: "bad".into(),
        };
        assert!(evaluate_area(&area, &GeoPoint::new(45.0, 9.0)).is_err());
        assert!(evaluate_area(&zone_square(), &GeoPoint::new(f64::NAN, 9.0)).is_err());
    }
}
