// src/models/search_area.rs - Buyer search areas as an explicit tagged union
//!
//! Stored search areas come in several historical shapes (GeoJSON collections,
//! single features, `{center, radius}` circles, bare `{lat, lng}` points, and
//! any of those serialized inside a JSON string). They are converted once, at
//! the storage boundary, into [`SearchArea`]. Payloads that cannot be
//! understood become [`SearchArea::Malformed`] so the buyer keeps a geographic
//! constraint that can never be satisfied instead of silently losing it.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::geometry::{validate_point, validate_ring, GeoPoint, GeometryError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchArea {
    /// Drawn zones: polygons and small point-centred zones.
    Zones { features: Vec<ZoneFeature> },
    Circle {
        center: GeoPoint,
        #[serde(default)]
        radius_km: Option<f64>,
    },
    Point { point: GeoPoint },
    Malformed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ZoneFeature {
    /// Outer ring first, holes after.
    Polygon { rings: Vec<Vec<GeoPoint>> },
    MultiPolygon { polygons: Vec<Vec<Vec<GeoPoint>>> },
    Point {
        point: GeoPoint,
        #[serde(default)]
        radius_km: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchAreaError {
    #[error("search area is not a JSON object")]
    NotAnObject,
    #[error("search area string is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("unrecognised search area shape")]
    UnknownShape,
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(String),
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl SearchArea {
    /// Parses any known stored representation.
    pub fn from_json(value: &Value) -> Result<SearchArea, SearchAreaError> {
        let area = match value {
            Value::String(raw) => {
                let inner: Value = serde_json::from_str(raw)
                    .map_err(|e| SearchAreaError::InvalidJson(e.to_string()))?;
                if inner.is_string() {
                    return Err(SearchAreaError::NotAnObject);
                }
                return Self::from_json(&inner);
            }
            Value::Object(map) if map.contains_key("kind") => {
                serde_json::from_value::<SearchArea>(value.clone())
                    .map_err(|e| SearchAreaError::InvalidCoordinates(e.to_string()))?
            }
            Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                Some("FeatureCollection") => {
                    let features = map
                        .get("features")
                        .and_then(Value::as_array)
                        .ok_or(SearchAreaError::UnknownShape)?
                        .iter()
                        .map(parse_feature)
                        .collect::<Result<Vec<_>, _>>()?;
                    SearchArea::Zones { features }
                }
                Some("Feature") => SearchArea::Zones {
                    features: vec![parse_feature(value)?],
                },
                Some("Point") => SearchArea::Point {
                    point: parse_position(map.get("coordinates"))?,
                },
                Some("Polygon") | Some("MultiPolygon") => SearchArea::Zones {
                    features: vec![parse_geometry(value, None)?],
                },
                Some(other) => return Err(SearchAreaError::UnsupportedGeometry(other.to_string())),
                None => parse_legacy_shape(map)?,
            },
            _ => return Err(SearchAreaError::NotAnObject),
        };
        area.validate()?;
        Ok(area)
    }

    /// Storage-boundary conversion: never fails, unparseable payloads become `Malformed`.
    pub fn from_stored(value: &Value) -> SearchArea {
        match Self::from_json(value) {
            Ok(area) => area,
            Err(e) => {
                warn!("Unparseable search area, geography will fail closed: {}", e);
                SearchArea::Malformed {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), SearchAreaError> {
        match self {
            SearchArea::Zones { features } => {
                if features.is_empty() {
                    return Err(GeometryError::Empty.into());
                }
                features.iter().try_for_each(ZoneFeature::validate)
            }
            SearchArea::Circle { center, radius_km } => {
                validate_point(center)?;
                validate_radius(*radius_km)
            }
            SearchArea::Point { point } => Ok(validate_point(point)?),
            SearchArea::Malformed { .. } => Ok(()),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, SearchArea::Malformed { .. })
    }
}

impl ZoneFeature {
    fn validate(&self) -> Result<(), SearchAreaError> {
        match self {
            ZoneFeature::Polygon { rings } => validate_polygon(rings),
            ZoneFeature::MultiPolygon { polygons } => {
                if polygons.is_empty() {
                    return Err(GeometryError::Empty.into());
                }
                polygons.iter().try_for_each(|rings| validate_polygon(rings))
            }
            ZoneFeature::Point { point, radius_km } => {
                validate_point(point)?;
                validate_radius(*radius_km)
            }
        }
    }
}

fn validate_polygon(rings: &[Vec<GeoPoint>]) -> Result<(), SearchAreaError> {
    if rings.is_empty() {
        return Err(GeometryError::Empty.into());
    }
    for ring in rings {
        validate_ring(ring)?;
    }
    Ok(())
}

fn validate_radius(radius_km: Option<f64>) -> Result<(), SearchAreaError> {
    match radius_km {
        Some(r) if !r.is_finite() || r <= 0.0 => Err(SearchAreaError::InvalidCoordinates(
            format!("radius must be positive, got {}", r),
        )),
        _ => Ok(()),
    }
}

fn parse_feature(feature: &Value) -> Result<ZoneFeature, SearchAreaError> {
    let geometry = feature
        .get("geometry")
        .filter(|g| !g.is_null())
        .ok_or(SearchAreaError::UnknownShape)?;
    let radius_km = feature.get("properties").and_then(radius_from_properties);
    parse_geometry(geometry, radius_km)
}

fn radius_from_properties(properties: &Value) -> Option<f64> {
    if let Some(km) = properties.get("radius_km").and_then(as_number) {
        return Some(km);
    }
    // Map widgets store feature radii in metres
    properties.get("radius").and_then(as_number).map(|m| m / 1000.0)
}

fn parse_geometry(geometry: &Value, radius_km: Option<f64>) -> Result<ZoneFeature, SearchAreaError> {
    let coordinates = geometry.get("coordinates");
    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => Ok(ZoneFeature::Polygon {
            rings: parse_rings(coordinates)?,
        }),
        Some("MultiPolygon") => {
            let polygons = coordinates
                .and_then(Value::as_array)
                .ok_or_else(|| SearchAreaError::InvalidCoordinates("multipolygon".into()))?
                .iter()
                .map(|polygon| parse_rings(Some(polygon)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ZoneFeature::MultiPolygon { polygons })
        }
        Some("Point") => Ok(ZoneFeature::Point {
            point: parse_position(coordinates)?,
            radius_km,
        }),
        Some(other) => Err(SearchAreaError::UnsupportedGeometry(other.to_string())),
        None => Err(SearchAreaError::UnknownShape),
    }
}

fn parse_rings(coordinates: Option<&Value>) -> Result<Vec<Vec<GeoPoint>>, SearchAreaError> {
    coordinates
        .and_then(Value::as_array)
        .ok_or_else(|| SearchAreaError::InvalidCoordinates("polygon".into()))?
        .iter()
        .map(|ring| {
            ring.as_array()
                .ok_or_else(|| SearchAreaError::InvalidCoordinates("ring".into()))?
                .iter()
                .map(|position| parse_position(Some(position)))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

/// GeoJSON position: `[lng, lat]`, optional altitude ignored.
fn parse_position(position: Option<&Value>) -> Result<GeoPoint, SearchAreaError> {
    let values = position
        .and_then(Value::as_array)
        .filter(|values| values.len() >= 2)
        .ok_or_else(|| SearchAreaError::InvalidCoordinates("position".into()))?;
    match (as_number(&values[0]), as_number(&values[1])) {
        (Some(lng), Some(lat)) => Ok(GeoPoint::from_position([lng, lat])),
        _ => Err(SearchAreaError::InvalidCoordinates(format!("{:?}", values))),
    }
}

/// `{center: {lat, lng}, radius}` circles and bare `{lat, lng}` points.
fn parse_legacy_shape(map: &Map<String, Value>) -> Result<SearchArea, SearchAreaError> {
    if let Some(center) = map.get("center") {
        let center = parse_lat_lng(center).ok_or(SearchAreaError::UnknownShape)?;
        let radius_km = map
            .get("radius_km")
            .or_else(|| map.get("radiusKm"))
            .and_then(as_number)
            .or_else(|| map.get("radius").and_then(as_number).map(|m| m / 1000.0));
        return Ok(SearchArea::Circle { center, radius_km });
    }
    let object = Value::Object(map.clone());
    parse_lat_lng(&object)
        .map(|point| SearchArea::Point { point })
        .ok_or(SearchAreaError::UnknownShape)
}

fn parse_lat_lng(value: &Value) -> Option<GeoPoint> {
    let lat = value.get("lat").and_then(as_number)?;
    let lng = value
        .get("lng")
        .or_else(|| value.get("lon"))
        .and_then(as_number)?;
    Some(GeoPoint::new(lat, lng))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_collection_with_polygon_and_point() {
        let raw = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[9.0, 45.0], [9.1, 45.0], [9.1, 45.1], [9.0, 45.1], [9.0, 45.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "radius": 300 },
                    "geometry": { "type": "Point", "coordinates": [9.19, 45.46, 120.0] }
                }
            ]
        });

        let area = SearchArea::from_json(&raw).unwrap();
        let SearchArea::Zones { features } = area else {
            panic!("expected zones");
        };
        assert_eq!(features.len(), 2);
        assert!(matches!(&features[0], ZoneFeature::Polygon { rings } if rings[0].len() == 5));
        match &features[1] {
            ZoneFeature::Point { point, radius_km } => {
                assert_eq!(*point, GeoPoint::new(45.46, 9.19));
                assert_eq!(*radius_km, Some(0.3));
            }
            other => panic!("unexpected feature {:?}", other),
        }
    }

    #[test]
    fn test_legacy_circle_radius_is_in_metres() {
        let raw = json!({ "center": { "lat": 45.46, "lng": 9.19 }, "radius": 1500 });
        assert_eq!(
            SearchArea::from_json(&raw).unwrap(),
            SearchArea::Circle {
                center: GeoPoint::new(45.46, 9.19),
                radius_km: Some(1.5)
            }
        );

        let no_radius = json!({ "center": { "lat": "45.46", "lng": "9.19" } });
        assert!(matches!(
            SearchArea::from_json(&no_radius).unwrap(),
            SearchArea::Circle { radius_km: None, .. }
        ));
    }

    #[test]
    fn test_json_encoded_inside_string() {
        let raw = Value::String(r#"{"lat": 45.46, "lng": 9.19}"#.to_string());
        assert_eq!(
            SearchArea::from_json(&raw).unwrap(),
            SearchArea::Point {
                point: GeoPoint::new(45.46, 9.19)
            }
        );
    }

    #[test]
    fn test_tagged_form_is_read_back() {
        let area = SearchArea::Circle {
            center: GeoPoint::new(41.9, 12.49),
            radius_km: Some(2.0),
        };
        let stored = serde_json::to_value(&area).unwrap();
        assert_eq!(stored["kind"], "circle");
        assert_eq!(SearchArea::from_json(&stored).unwrap(), area);
    }

    #[test]
    fn test_unparseable_payloads_become_malformed() {
        let degenerate = json!({
            "type": "Feature",
            "geometry": { "type": "Polygon", "coordinates": [[[9.0, 45.0], [9.1, 45.0], [9.0, 45.0]]] }
        });
        assert!(SearchArea::from_stored(&degenerate).is_malformed());
        assert!(SearchArea::from_stored(&json!({ "foo": 1 })).is_malformed());
        assert!(SearchArea::from_stored(&json!([1, 2, 3])).is_malformed());
        assert!(SearchArea::from_stored(&Value::String("not json".into())).is_malformed());
        assert!(SearchArea::from_stored(&json!({ "type": "FeatureCollection", "features": [] })).is_malformed());
        assert!(SearchArea::from_stored(&json!({ "type": "LineString", "coordinates": [] })).is_malformed());
    }
}
