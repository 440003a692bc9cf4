//! The style document of the map.
//!
//! The document follows the Mapbox GL style format, of which a small subset is understood:
//! `background` and `raster` layers make up the basemap, `fill`, `line` and `circle` layers style
//! the region polygons and their vertex handles. Other layer and source types are ignored.

use std::collections::BTreeMap;

use egui::{Color32, Stroke};
use log::warn;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use crate::config::{MapConfig, OpenStreetMapConfig};
use crate::layers::tile::TileLayer;
use crate::layers::vector::VectorStyle;
use crate::{TILE_SIZE, TileId};

const EMBEDDED_STYLE: &str = include_str!("../assets/basemap_style.json");

// Painted where no tile covers the map.
const DEFAULT_BACKGROUND: Color32 = Color32::from_gray(220);

/// Errors that can occur while reading a style document.
#[derive(Error, Debug)]
pub enum StyleError {
    /// The document is not valid JSON or misses required members.
    #[error("Invalid style document")]
    Json(#[from] serde_json::Error),

    /// Only version 8 documents are understood.
    #[error("Unsupported style version {0}")]
    Version(u64),

    /// A paint property holds something that is not a color.
    #[error("Layer `{layer}` has invalid color `{value}`")]
    Color {
        /// The layer id.
        layer: String,
        /// The rejected value.
        value: String,
    },

    /// A layer refers to a source the document does not define.
    #[error("Layer `{layer}` uses unknown source `{source_id}`")]
    MissingSource {
        /// The layer id.
        layer: String,
        /// The missing source id.
        source_id: String,
    },
}

/// A data source of the style.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StyleSource {
    /// Raster tiles.
    #[serde(rename_all = "camelCase")]
    Raster {
        /// Tile URL templates with `{z}`, `{x}` and `{y}` placeholders.
        tiles: Vec<String>,
        /// Tile size in pixels.
        #[serde(default = "default_tile_size")]
        tile_size: u32,
        /// Attribution text.
        #[serde(default)]
        attribution: Option<String>,
        /// Where the attribution links to.
        #[serde(default)]
        attribution_url: Option<String>,
    },
    /// Inline GeoJSON. The region layer fills it at runtime.
    #[serde(rename = "geojson")]
    GeoJson {
        /// The initial data.
        #[serde(default)]
        data: JsonValue,
    },
    /// Any other source type.
    #[serde(other)]
    Other,
}

fn default_tile_size() -> u32 {
    TILE_SIZE
}

/// The kind of a style layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleLayerType {
    /// Fills the whole map.
    Background,
    /// Raster tiles.
    Raster,
    /// Polygon fill.
    Fill,
    /// Polygon outline.
    Line,
    /// Points, used for vertex handles.
    Circle,
    /// Any other layer type.
    #[serde(other)]
    Other,
}

/// A layer of the style.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StyleLayer {
    /// Unique id.
    pub id: String,
    /// What the layer draws.
    #[serde(rename = "type")]
    pub kind: StyleLayerType,
    /// The source drawn, if the type needs one.
    #[serde(default)]
    pub source: Option<String>,
    /// Paint properties.
    #[serde(default)]
    pub paint: JsonMap<String, JsonValue>,
}

impl StyleLayer {
    fn color(&self, key: &str) -> Option<Color32> {
        let value = self.paint.get(key)?.as_str()?;
        parse_color(value)
    }

    fn number(&self, key: &str) -> Option<f32> {
        self.paint.get(key)?.as_f64().map(|n| n as f32)
    }

    /// A color property with its matching opacity property applied.
    fn color_with_opacity(&self, color_key: &str, opacity_key: &str) -> Option<Color32> {
        let color = self.color(color_key)?;
        Some(match self.number(opacity_key) {
            Some(opacity) => color.gamma_multiply(opacity.clamp(0.0, 1.0)),
            None => color,
        })
    }
}

/// A parsed style document.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MapStyle {
    /// Format version, always 8.
    pub version: u64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Sources by id.
    #[serde(default)]
    pub sources: BTreeMap<String, StyleSource>,
    /// Layers, bottom first.
    #[serde(default)]
    pub layers: Vec<StyleLayer>,
}

/// A tile provider taken from a raster source of the style.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterSource {
    /// URL template with `{z}`, `{x}` and `{y}` placeholders.
    pub template: String,
    /// Attribution text.
    pub attribution: Option<String>,
    /// Where the attribution links to.
    pub attribution_url: Option<String>,
    /// Opacity of the raster layer.
    pub opacity: f32,
}

impl MapConfig for RasterSource {
    fn tile_url(&self, tile: &TileId) -> String {
        self.template
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }

    fn attribution(&self) -> Option<&String> {
        self.attribution.as_ref()
    }

    fn attribution_url(&self) -> Option<&String> {
        self.attribution_url.as_ref()
    }
}

impl MapStyle {
    /// Parses and checks a style document.
    pub fn from_json_str(json: &str) -> Result<Self, StyleError> {
        let style: Self = serde_json::from_str(json)?;
        style.validate()?;
        Ok(style)
    }

    /// The style shipped with the crate.
    pub fn embedded() -> Result<Self, StyleError> {
        Self::from_json_str(EMBEDDED_STYLE)
    }

    fn validate(&self) -> Result<(), StyleError> {
        if self.version != 8 {
            return Err(StyleError::Version(self.version));
        }
        for layer in &self.layers {
            if let Some(source) = &layer.source {
                if !self.sources.contains_key(source) {
                    return Err(StyleError::MissingSource {
                        layer: layer.id.clone(),
                        source_id: source.clone(),
                    });
                }
            }
            for (key, value) in &layer.paint {
                if !key.ends_with("-color") {
                    continue;
                }
                if value.as_str().and_then(parse_color).is_none() {
                    return Err(StyleError::Color {
                        layer: layer.id.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn first_layer(&self, kind: StyleLayerType) -> Option<&StyleLayer> {
        self.layers.iter().find(|layer| layer.kind == kind)
    }

    /// The color painted below the tiles.
    pub fn background_color(&self) -> Color32 {
        self.first_layer(StyleLayerType::Background)
            .and_then(|layer| layer.color_with_opacity("background-color", "background-opacity"))
            .unwrap_or(DEFAULT_BACKGROUND)
    }

    /// The tile provider of the first raster layer.
    pub fn raster_source(&self) -> Option<RasterSource> {
        let layer = self.first_layer(StyleLayerType::Raster)?;
        let source = self.sources.get(layer.source.as_ref()?)?;
        let StyleSource::Raster {
            tiles,
            tile_size,
            attribution,
            attribution_url,
        } = source
        else {
            warn!("Raster layer `{}` uses a non-raster source", layer.id);
            return None;
        };
        if *tile_size != TILE_SIZE {
            warn!(
                "Raster source of `{}` has {}px tiles, drawing them at {}px",
                layer.id, tile_size, TILE_SIZE
            );
        }
        Some(RasterSource {
            template: tiles.first()?.clone(),
            attribution: attribution.clone(),
            attribution_url: attribution_url.clone(),
            opacity: layer.number("raster-opacity").unwrap_or(1.0).clamp(0.0, 1.0),
        })
    }

    /// The basemap layer. Falls back to OpenStreetMap when the style has no raster layer.
    pub fn basemap_layer(&self) -> TileLayer {
        match self.raster_source() {
            Some(source) => {
                let tint = Color32::WHITE.gamma_multiply(source.opacity);
                let mut layer = TileLayer::new(source);
                layer.tint = tint;
                layer
            }
            None => {
                warn!("Style has no raster layer, using OpenStreetMap");
                TileLayer::new(OpenStreetMapConfig::default())
            }
        }
    }

    /// The style of region polygons, from the first `fill`, `line` and `circle` layers.
    pub fn region_style(&self) -> VectorStyle {
        let mut style = VectorStyle::default();
        if let Some(fill) = self.first_layer(StyleLayerType::Fill) {
            if let Some(color) = fill.color_with_opacity("fill-color", "fill-opacity") {
                style.fill = color;
            }
        }
        if let Some(line) = self.first_layer(StyleLayerType::Line) {
            let color = line
                .color_with_opacity("line-color", "line-opacity")
                .unwrap_or(style.stroke.color);
            let width = line.number("line-width").unwrap_or(style.stroke.width);
            style.stroke = Stroke::new(width, color);
        }
        if let Some(circle) = self.first_layer(StyleLayerType::Circle) {
            if let Some(color) = circle.color_with_opacity("circle-color", "circle-opacity") {
                style.vertex_fill = color;
            }
            if let Some(radius) = circle.number("circle-radius") {
                style.vertex_radius = radius;
            }
        }
        style
    }
}

/// Parses `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)` and `rgba(r, g, b, a)` colors.
pub fn parse_color(value: &str) -> Option<Color32> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    rgb[i] = v * 17;
                }
                Some(Color32::from_rgb(rgb[0], rgb[1], rgb[2]))
            }
            6 => Some(Color32::from_rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Color32::from_rgba_unmultiplied(
                channel(0)?,
                channel(2)?,
                channel(4)?,
                channel(6)?,
            )),
            _ => None,
        };
    }

    let (args, has_alpha) = if let Some(rest) = value.strip_prefix("rgba(") {
        (rest.strip_suffix(')')?, true)
    } else if let Some(rest) = value.strip_prefix("rgb(") {
        (rest.strip_suffix(')')?, false)
    } else {
        return None;
    };

    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let rgb = |i: usize| parts.get(i)?.parse::<u8>().ok();
    match (parts.len(), has_alpha) {
        (3, false) => Some(Color32::from_rgb(rgb(0)?, rgb(1)?, rgb(2)?)),
        (4, true) => {
            let alpha = parts[3].parse::<f32>().ok()?.clamp(0.0, 1.0);
            Some(Color32::from_rgba_unmultiplied(
                rgb(0)?,
                rgb(1)?,
                rgb(2)?,
                (alpha * 255.0).round() as u8,
            ))
        }
        _ => None,
    }
}
