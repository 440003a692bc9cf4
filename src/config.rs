//! Configuration of the viewer and of tile providers.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::TileId;
use crate::projection::GeoPos;
use crate::regions::Smid;

/// Configuration for a map tile provider.
pub trait MapConfig {
    /// Returns the URL for a given tile.
    fn tile_url(&self, tile: &TileId) -> String;

    /// Returns the attribution text to be displayed on the map. If returns `None`, no attribution is shown.
    fn attribution(&self) -> Option<&String>;

    /// Returns the attribution URL to be linked from the attribution text.
    fn attribution_url(&self) -> Option<&String>;
}

/// Attribution text shown in the corner of the map.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribution {
    /// The text.
    pub text: String,
    /// Where the text links to.
    pub url: Option<String>,
}

impl Attribution {
    /// Takes the attribution of a tile provider, if it has one.
    pub fn from_config(config: &dyn MapConfig) -> Option<Self> {
        config.attribution().map(|text| Self {
            text: text.clone(),
            url: config.attribution_url().cloned(),
        })
    }
}

/// Configuration for the OpenStreetMap tile server. Used as the basemap when the style document
/// has no raster source.
///
/// # Example
///
/// ```
/// use region_map_view::config::OpenStreetMapConfig;
/// let config = OpenStreetMapConfig::default();
/// ```
pub struct OpenStreetMapConfig {
    base_url: String,
    attribution: String,
    attribution_url: String,
}

impl Default for OpenStreetMapConfig {
    fn default() -> Self {
        Self {
            base_url: "https://tile.openstreetmap.org".to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            attribution_url: "https://www.openstreetmap.org".to_string(),
        }
    }
}

impl MapConfig for OpenStreetMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!("{}/{}/{}/{}.png", self.base_url, tile.z, tile.x, tile.y)
    }

    fn attribution(&self) -> Option<&String> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&String> {
        Some(&self.attribution_url)
    }
}

/// Errors that can occur while loading the viewer configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Unable to read configuration file")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON or has unexpected fields.
    #[error("Invalid configuration")]
    Json(#[from] serde_json::Error),

    /// The zoom bounds do not make sense.
    #[error("Invalid zoom bounds: min {min} > max {max}")]
    ZoomBounds {
        /// Configured minimum zoom.
        min: u8,
        /// Configured maximum zoom.
        max: u8,
    },
}

/// Initial view and navigation bounds of the map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewOptions {
    /// Initial center of the view.
    pub center: GeoPos,
    /// Initial zoom level.
    pub zoom: u8,
    /// The lowest zoom level the user can reach.
    pub min_zoom: u8,
    /// The highest zoom level the user can reach.
    pub max_zoom: u8,
    /// Whether double-clicking the map zooms in. Off by default, double-clicks finish drawings.
    pub double_click_zoom: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            center: GeoPos {
                lon: 116.0678288,
                lat: 35.9384171,
            },
            zoom: 5,
            min_zoom: 1,
            max_zoom: 10,
            double_click_zoom: false,
        }
    }
}

// Radius of the sphere Web Mercator projects from, in metres.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Coordinate reference system of the geometries a feature service answers with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataCrs {
    /// Web Mercator metres.
    #[default]
    #[serde(rename = "EPSG:3857")]
    WebMercator,
    /// Longitude and latitude in degrees.
    #[serde(rename = "EPSG:4326")]
    Wgs84,
}

impl DataCrs {
    /// Converts a position given in this system to longitude and latitude.
    pub fn to_geo(self, x: f64, y: f64) -> GeoPos {
        match self {
            DataCrs::WebMercator => GeoPos {
                lon: (x / WEB_MERCATOR_RADIUS).to_degrees(),
                lat: (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
                    .to_degrees(),
            },
            DataCrs::Wgs84 => GeoPos { lon: x, lat: y },
        }
    }
}

/// Space in screen points kept free around a region when the view is fitted to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitPadding {
    /// Top padding.
    pub top: f32,
    /// Right padding.
    pub right: f32,
    /// Bottom padding.
    pub bottom: f32,
    /// Left padding, wide enough for the region selector.
    pub left: f32,
}

impl Default for FitPadding {
    fn default() -> Self {
        Self {
            top: 20.0,
            right: 20.0,
            bottom: 20.0,
            left: 260.0,
        }
    }
}

/// Configuration of the region viewer.
///
/// Every field has a default, so a configuration file only needs the values it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Base URL of the iServer data service.
    pub service_url: String,
    /// Dataset holding the province polygons, as `datasource:dataset`.
    pub province_dataset: String,
    /// Query parameter name for the province dataset, as `dataset@datasource`.
    pub province_query_name: String,
    /// Dataset holding the continent polygons.
    pub continent_dataset: String,
    /// Query parameter name for the continent dataset.
    pub continent_query_name: String,
    /// The continent shown when no region is selected.
    pub default_continent: Smid,
    /// The region loaded on start. `None` loads the default continent.
    pub default_region: Option<Smid>,
    /// Coordinate system of the service's geometries.
    pub data_crs: DataCrs,
    /// Upper bound of features requested per query.
    pub max_features: u32,
    /// Initial view and navigation bounds.
    pub view: ViewOptions,
    /// Padding used when fitting the view to a loaded region.
    pub fit_padding: FitPadding,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            service_url: "https://iserver.supermap.io/iserver/services/data-China100/rest/data"
                .to_string(),
            province_dataset: "China:China_Province_pg".to_string(),
            province_query_name: "China_Province_pg@China".to_string(),
            continent_dataset: "World:Continent_pg".to_string(),
            continent_query_name: "Continent_pg@World".to_string(),
            default_continent: Smid(1),
            default_region: Some(Smid(15)),
            data_crs: DataCrs::WebMercator,
            max_features: 1000,
            view: ViewOptions::default(),
            fit_padding: FitPadding::default(),
        }
    }
}

impl ViewerConfig {
    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.view.min_zoom > self.view.max_zoom || self.view.max_zoom > crate::MAX_ZOOM {
            return Err(ConfigError::ZoomBounds {
                min: self.view.min_zoom,
                max: self.view.max_zoom,
            });
        }
        Ok(())
    }
}
