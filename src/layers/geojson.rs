//! Conversion between GeoJSON features and vector features.

use super::vector::{Polygon, Ring, VectorFeature};
use crate::projection::GeoPos;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use thiserror::Error;

/// Errors that can occur while reading GeoJSON geometry.
#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    /// The feature has no geometry.
    #[error("Feature has no geometry")]
    MissingGeometry,

    /// The geometry is not a polygon type.
    #[error("Unsupported geometry type `{0}`")]
    Unsupported(String),

    /// A position has less than two coordinates.
    #[error("Position with {0} coordinates")]
    InvalidPosition(usize),

    /// A ring has less than three distinct vertices.
    #[error("Ring with {0} vertices")]
    DegenerateRing(usize),
}

fn geo_pos_to_vec(gp: &GeoPos) -> Vec<f64> {
    vec![gp.lon, gp.lat]
}

fn vec_to_geo_pos(pos: &[f64]) -> Result<GeoPos, GeometryError> {
    match pos {
        [lon, lat, ..] => Ok(GeoPos {
            lon: *lon,
            lat: *lat,
        }),
        _ => Err(GeometryError::InvalidPosition(pos.len())),
    }
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Result<Ring, GeometryError> {
    let mut ring = positions
        .iter()
        .map(|pos| vec_to_geo_pos(pos))
        .collect::<Result<Ring, _>>()?;

    // GeoJSON rings are closed, ours don't repeat the first vertex.
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        return Err(GeometryError::DegenerateRing(ring.len()));
    }
    Ok(ring)
}

fn ring_to_positions(ring: &Ring) -> Vec<Vec<f64>> {
    ring.iter()
        // GeoJSON polygons must be closed, so the first and last points must be the same.
        .chain(ring.first())
        .map(geo_pos_to_vec)
        .collect()
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Polygon, GeometryError> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or(GeometryError::DegenerateRing(0))?;
    Ok(Polygon {
        exterior: ring_from_positions(exterior)?,
        interiors: interiors
            .iter()
            .map(|ring| ring_from_positions(ring))
            .collect::<Result<_, _>>()?,
    })
}

fn polygon_to_rings(polygon: &Polygon) -> Vec<Vec<Vec<f64>>> {
    polygon.rings().map(ring_to_positions).collect()
}

fn polygons_from_value(value: &Value) -> Result<Vec<Polygon>, GeometryError> {
    match value {
        Value::Polygon(rings) => Ok(vec![polygon_from_rings(rings)?]),
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .map(|rings| polygon_from_rings(rings))
            .collect(),
        Value::GeometryCollection(geometries) => {
            let mut polygons = Vec::new();
            for geometry in geometries {
                polygons.extend(polygons_from_value(&geometry.value)?);
            }
            Ok(polygons)
        }
        Value::Point(_) => Err(GeometryError::Unsupported("Point".to_string())),
        Value::MultiPoint(_) => Err(GeometryError::Unsupported("MultiPoint".to_string())),
        Value::LineString(_) => Err(GeometryError::Unsupported("LineString".to_string())),
        Value::MultiLineString(_) => {
            Err(GeometryError::Unsupported("MultiLineString".to_string()))
        }
    }
}

impl TryFrom<Feature> for VectorFeature {
    type Error = GeometryError;

    fn try_from(feature: Feature) -> Result<Self, Self::Error> {
        let geometry = feature.geometry.ok_or(GeometryError::MissingGeometry)?;
        Ok(VectorFeature {
            polygons: polygons_from_value(&geometry.value)?,
            properties: feature.properties.unwrap_or_default(),
        })
    }
}

impl From<&VectorFeature> for Feature {
    fn from(feature: &VectorFeature) -> Self {
        let value = match feature.polygons.as_slice() {
            [polygon] => Value::Polygon(polygon_to_rings(polygon)),
            polygons => Value::MultiPolygon(polygons.iter().map(polygon_to_rings).collect()),
        };
        Feature {
            geometry: Some(Geometry::new(value)),
            properties: Some(feature.properties.clone()),
            ..Default::default()
        }
    }
}

/// Reads all features of a collection. Fails on the first feature that is not a polygon.
pub fn features_from_collection(
    collection: FeatureCollection,
) -> Result<Vec<VectorFeature>, GeometryError> {
    collection
        .features
        .into_iter()
        .map(VectorFeature::try_from)
        .collect()
}

/// Serializes a feature as a GeoJSON `Feature` object.
pub fn to_geojson_string(feature: &VectorFeature) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Feature::from(feature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collection(value: serde_json::Value) -> FeatureCollection {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn reads_polygon_and_multipolygon() {
        let features = features_from_collection(collection(json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"NAME": "Hebei", "SMID": 15},
                    "geometry": {"type": "Polygon", "coordinates": [
                        [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]],
                        [[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]]
                    ]}
                },
                {
                    "type": "Feature",
                    "properties": null,
                    "geometry": {"type": "MultiPolygon", "coordinates": [
                        [[[10.0, 0.0], [11.0, 0.0], [11.0, 1.0], [10.0, 0.0]]],
                        [[[20.0, 0.0], [21.0, 0.0], [21.0, 1.0], [20.0, 0.0]]]
                    ]}
                }
            ]
        })))
        .unwrap();

        assert_eq!(features.len(), 2);
        assert_eq!(features[0].polygons.len(), 1);
        assert_eq!(features[0].polygons[0].exterior.len(), 4);
        assert_eq!(features[0].polygons[0].interiors.len(), 1);
        assert_eq!(features[0].properties["NAME"], "Hebei");
        assert_eq!(features[1].polygons.len(), 2);
        assert!(features[1].properties.is_empty());
    }

    #[test]
    fn rejects_non_polygon_geometry() {
        let result = features_from_collection(collection(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}
            }]
        })));
        assert_eq!(result, Err(GeometryError::Unsupported("Point".to_string())));
    }

    #[test]
    fn rejects_degenerate_ring_and_missing_geometry() {
        let degenerate = features_from_collection(collection(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]}
            }]
        })));
        assert_eq!(degenerate, Err(GeometryError::DegenerateRing(2)));

        let missing = VectorFeature::try_from(Feature::default());
        assert_eq!(missing, Err(GeometryError::MissingGeometry));
    }

    #[test]
    fn serializes_feature_object() {
        let mut feature = VectorFeature::from_polygon(Polygon::new(vec![
            GeoPos { lon: 0.0, lat: 0.0 },
            GeoPos { lon: 1.0, lat: 0.0 },
            GeoPos { lon: 1.0, lat: 1.0 },
        ]));
        feature.properties.insert("NAME".to_string(), json!("drawn"));
        let value: serde_json::Value =
            serde_json::from_str(&to_geojson_string(&feature).unwrap()).unwrap();
        assert_eq!(value["type"], "Feature");
        assert_eq!(value["geometry"]["type"], "Polygon");
        assert_eq!(value["properties"]["NAME"], "drawn");
    }

    #[test]
    fn written_polygons_are_closed() {
        let feature = VectorFeature::from_polygon(Polygon::new(vec![
            GeoPos { lon: 0.0, lat: 0.0 },
            GeoPos { lon: 1.0, lat: 0.0 },
            GeoPos { lon: 1.0, lat: 1.0 },
        ]));
        let geojson = Feature::from(&feature);
        match geojson.geometry.map(|g| g.value) {
            Some(Value::Polygon(rings)) => {
                assert_eq!(rings[0].len(), 4);
                assert_eq!(rings[0].first(), rings[0].last());
            }
            other => panic!("unexpected geometry {:?}", other),
        }
    }
}
