//! Client for the feature query endpoint of a SuperMap iServer data service.
//!
//! Features are queried with an SQL attribute filter. iServer answers with its own feature
//! format (field names and values next to a geometry made of points, parts and part topology),
//! which is converted to a GeoJSON [`FeatureCollection`] here, so the rest of the crate only
//! deals with GeoJSON.

use geojson::{Feature, FeatureCollection, Geometry, Value as GeometryValue, feature::Id};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use crate::CLIENT;
use crate::config::{DataCrs, ViewerConfig};
use crate::layers::point_in_ring;
use crate::projection::GeoPos;
use crate::regions::Smid;

/// Errors that can occur while querying features.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    Connection(#[from] reqwest::Error),

    /// The service answered with an error status and no error description.
    #[error("Feature query failed. HTTP Status: `{0}`")]
    Status(String),

    /// The service reported an error.
    #[error("Feature service error {code}: {message}")]
    Service {
        /// The error code reported by the service.
        code: i64,
        /// The error message reported by the service.
        message: String,
    },

    /// The response is not in a known feature format.
    #[error("Unable to decode feature query results")]
    Decode(#[from] serde_json::Error),

    /// A feature has a geometry that can't be converted.
    #[error("Invalid feature geometry: {0}")]
    Geometry(String),
}

/// Selects the features of a dataset with an attribute filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameter {
    /// The queried layer, as `dataset@datasource`.
    pub name: String,
    /// SQL `WHERE` clause.
    pub attribute_filter: String,
}

/// Parameters of an SQL feature query.
#[derive(Clone, Debug, PartialEq)]
pub struct FeaturesBySqlParameters {
    /// The queried datasets, as `datasource:dataset`.
    pub dataset_names: Vec<String>,
    /// The filter.
    pub query_parameter: QueryParameter,
    /// Whether only features, without the query metadata, are returned.
    pub return_features_only: bool,
    /// Index of the first returned feature.
    pub from_index: u32,
    /// Index of the last returned feature.
    pub to_index: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SqlRequestBody<'a> {
    get_feature_mode: &'static str,
    dataset_names: &'a [String],
    query_parameter: &'a QueryParameter,
}

impl FeaturesBySqlParameters {
    fn by_smid(dataset: &str, query_name: &str, smid: Smid, max_features: u32) -> Self {
        Self {
            dataset_names: vec![dataset.to_string()],
            query_parameter: QueryParameter {
                name: query_name.to_string(),
                attribute_filter: format!("SMID = {}", smid),
            },
            return_features_only: true,
            from_index: 0,
            to_index: max_features.saturating_sub(1),
        }
    }

    /// Query for a province polygon.
    pub fn for_province(config: &ViewerConfig, smid: Smid) -> Self {
        Self::by_smid(
            &config.province_dataset,
            &config.province_query_name,
            smid,
            config.max_features,
        )
    }

    /// Query for a continent polygon.
    pub fn for_continent(config: &ViewerConfig, smid: Smid) -> Self {
        Self::by_smid(
            &config.continent_dataset,
            &config.continent_query_name,
            smid,
            config.max_features,
        )
    }

    /// Query for a province, or for the default continent when no region is given.
    pub fn for_region(config: &ViewerConfig, region: Option<Smid>) -> Self {
        match region {
            Some(smid) => Self::for_province(config, smid),
            None => Self::for_continent(config, config.default_continent),
        }
    }

    /// The JSON body of the query request.
    pub fn request_body(&self) -> JsonValue {
        serde_json::to_value(SqlRequestBody {
            get_feature_mode: "SQL",
            dataset_names: &self.dataset_names,
            query_parameter: &self.query_parameter,
        })
        .unwrap_or_default()
    }

    /// The query string of the request.
    pub fn query_string(&self) -> String {
        format!(
            "returnContent=true&returnFeaturesOnly={}&fromIndex={}&toIndex={}",
            self.return_features_only, self.from_index, self.to_index
        )
    }
}

/// A service that answers feature queries.
pub trait FeatureService: Send + Sync {
    /// Runs an SQL query and returns the matching features, with coordinates in longitude and
    /// latitude. Blocks until the answer arrives.
    fn get_features_by_sql(
        &self,
        params: &FeaturesBySqlParameters,
    ) -> Result<FeatureCollection, ServiceError>;
}

/// A [`FeatureService`] backed by an iServer data service.
#[derive(Clone, Debug)]
pub struct IServerFeatureService {
    base_url: String,
    data_crs: DataCrs,
}

impl IServerFeatureService {
    /// Creates a client for the data service at `base_url`, e.g.
    /// `https://host/iserver/services/data-China100/rest/data`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            data_crs: DataCrs::default(),
        }
    }

    /// Sets the coordinate system the service answers in. Web Mercator by default.
    pub fn with_data_crs(mut self, data_crs: DataCrs) -> Self {
        self.data_crs = data_crs;
        self
    }

    /// The URL the query is posted to.
    pub fn request_url(&self, params: &FeaturesBySqlParameters) -> String {
        format!(
            "{}/featureResults.json?{}",
            self.base_url.trim_end_matches('/'),
            params.query_string()
        )
    }
}

impl FeatureService for IServerFeatureService {
    fn get_features_by_sql(
        &self,
        params: &FeaturesBySqlParameters,
    ) -> Result<FeatureCollection, ServiceError> {
        let url = self.request_url(params);
        debug!(
            "Querying {} with `{}`",
            url, params.query_parameter.attribute_filter
        );

        let response = CLIENT.post(&url).json(&params.request_body()).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(service_error(&body).unwrap_or(ServiceError::Status(status.to_string())));
        }
        parse_feature_results(&body, self.data_crs)
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    succeed: bool,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    error_msg: String,
}

/// Reads an iServer error document, `{"succeed": false, "error": {...}}`.
fn service_error(body: &str) -> Option<ServiceError> {
    let response: ErrorResponse = serde_json::from_str(body).ok()?;
    if response.succeed {
        return None;
    }
    let detail = response.error.unwrap_or(ErrorDetail {
        code: 0,
        error_msg: String::new(),
    });
    Some(ServiceError::Service {
        code: detail.code,
        message: detail.error_msg,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerFeature {
    #[serde(rename = "ID", default)]
    id: Option<i64>,
    #[serde(default)]
    field_names: Vec<String>,
    #[serde(default)]
    field_values: Vec<JsonValue>,
    #[serde(default)]
    geometry: Option<ServerGeometry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    points: Vec<ServerPoint>,
    #[serde(default)]
    parts: Vec<usize>,
    #[serde(default)]
    part_topo: Vec<i32>,
}

#[derive(Deserialize)]
struct ServerPoint {
    x: f64,
    y: f64,
}

impl ServerGeometry {
    /// Splits the points into parts, converted to longitude and latitude. Without part counts all
    /// points form one part.
    fn split_parts(&self, crs: DataCrs) -> Result<Vec<Vec<Vec<f64>>>, ServiceError> {
        let points: Vec<Vec<f64>> = self
            .points
            .iter()
            .map(|p| {
                let pos = crs.to_geo(p.x, p.y);
                vec![pos.lon, pos.lat]
            })
            .collect();
        if self.parts.is_empty() {
            return Ok(vec![points]);
        }

        let total: usize = self.parts.iter().sum();
        if total != points.len() {
            return Err(ServiceError::Geometry(format!(
                "parts count {} points, geometry has {}",
                total,
                points.len()
            )));
        }

        let mut rest = points.as_slice();
        let mut parts = Vec::with_capacity(self.parts.len());
        for count in &self.parts {
            let (part, tail) = rest.split_at(*count);
            parts.push(part.to_vec());
            rest = tail;
        }
        Ok(parts)
    }

    fn into_geojson(self, crs: DataCrs) -> Result<GeometryValue, ServiceError> {
        let parts = self.split_parts(crs)?;
        match self.kind.as_str() {
            "REGION" => {
                // A part topology of -1 marks a hole.
                let mut polygons: Vec<Vec<Vec<Vec<f64>>>> = Vec::new();
                let mut holes = Vec::new();
                for (i, mut ring) in parts.into_iter().enumerate() {
                    if ring.len() < 3 {
                        return Err(ServiceError::Geometry(format!(
                            "ring {} has {} points",
                            i,
                            ring.len()
                        )));
                    }
                    if ring.first() != ring.last() {
                        let first = ring[0].clone();
                        ring.push(first);
                    }
                    if self.part_topo.get(i) == Some(&-1) {
                        holes.push(ring);
                    } else {
                        polygons.push(vec![ring]);
                    }
                }
                // A hole belongs to the island containing it, the innermost if islands nest.
                for hole in holes {
                    let owner = polygons
                        .iter()
                        .rposition(|polygon| ring_contains(&polygon[0], &hole[0]));
                    match owner.or_else(|| polygons.len().checked_sub(1)) {
                        Some(index) => polygons[index].push(hole),
                        None => polygons.push(vec![hole]),
                    }
                }
                match polygons.len() {
                    0 => Err(ServiceError::Geometry("region without points".to_string())),
                    1 => Ok(GeometryValue::Polygon(polygons.remove(0))),
                    _ => Ok(GeometryValue::MultiPolygon(polygons)),
                }
            }
            "LINE" => match parts.len() {
                1 => Ok(GeometryValue::LineString(parts.into_iter().flatten().collect())),
                _ => Ok(GeometryValue::MultiLineString(parts)),
            },
            "POINT" => parts
                .into_iter()
                .flatten()
                .next()
                .map(GeometryValue::Point)
                .ok_or_else(|| ServiceError::Geometry("point without coordinates".to_string())),
            other => Err(ServiceError::Geometry(format!(
                "unsupported geometry type `{}`",
                other
            ))),
        }
    }
}

fn ring_contains(ring: &[Vec<f64>], point: &[f64]) -> bool {
    let ring: Vec<GeoPos> = ring
        .iter()
        .map(|p| GeoPos {
            lon: p[0],
            lat: p[1],
        })
        .collect();
    point_in_ring(
        GeoPos {
            lon: point[0],
            lat: point[1],
        },
        &ring,
    )
}

fn reproject_position(position: &mut [f64], crs: DataCrs) {
    if let [x, y, ..] = position {
        let pos = crs.to_geo(*x, *y);
        *x = pos.lon;
        *y = pos.lat;
    }
}

/// Converts all positions of a GeoJSON geometry to longitude and latitude.
fn reproject(value: &mut GeometryValue, crs: DataCrs) {
    match value {
        GeometryValue::Point(position) => reproject_position(position, crs),
        GeometryValue::MultiPoint(positions) | GeometryValue::LineString(positions) => {
            for position in positions {
                reproject_position(position, crs);
            }
        }
        GeometryValue::MultiLineString(lines) | GeometryValue::Polygon(lines) => {
            for position in lines.iter_mut().flatten() {
                reproject_position(position, crs);
            }
        }
        GeometryValue::MultiPolygon(polygons) => {
            for position in polygons.iter_mut().flatten().flatten() {
                reproject_position(position, crs);
            }
        }
        GeometryValue::GeometryCollection(geometries) => {
            for geometry in geometries {
                reproject(&mut geometry.value, crs);
            }
        }
    }
}

impl ServerFeature {
    fn into_geojson(self, crs: DataCrs) -> Result<Feature, ServiceError> {
        let properties: JsonMap<String, JsonValue> = self
            .field_names
            .into_iter()
            .zip(self.field_values)
            .collect();
        let geometry = match self.geometry {
            Some(geometry) => Some(Geometry::new(geometry.into_geojson(crs)?)),
            None => None,
        };
        Ok(Feature {
            id: self.id.map(|id| Id::Number(id.into())),
            geometry,
            properties: Some(properties),
            ..Default::default()
        })
    }
}

/// Reads the answer of a feature query.
///
/// Accepts iServer features, either as a bare array or wrapped in an object with a `features`
/// member, and GeoJSON feature collections. An iServer error document becomes
/// [`ServiceError::Service`]. Coordinates are converted from `crs` to longitude and latitude.
pub fn parse_feature_results(body: &str, crs: DataCrs) -> Result<FeatureCollection, ServiceError> {
    if let Some(error) = service_error(body) {
        return Err(error);
    }

    let mut value: JsonValue = serde_json::from_str(body)?;
    if value.get("type").and_then(JsonValue::as_str) == Some("FeatureCollection") {
        let mut collection: FeatureCollection = serde_json::from_value(value)?;
        for geometry in collection.features.iter_mut().filter_map(|f| f.geometry.as_mut()) {
            reproject(&mut geometry.value, crs);
        }
        return Ok(collection);
    }

    let features = match value {
        JsonValue::Array(_) => value,
        _ => value
            .get_mut("features")
            .map(JsonValue::take)
            .unwrap_or(JsonValue::Null),
    };
    let features: Vec<ServerFeature> = serde_json::from_value(features)?;

    Ok(FeatureCollection {
        bbox: None,
        features: features
            .into_iter()
            .map(|feature| feature.into_geojson(crs))
            .collect::<Result<_, _>>()?,
        foreign_members: None,
    })
}
