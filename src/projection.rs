//! Map projection.

use egui::Rect;
use serde::{Deserialize, Serialize};

use crate::{TILE_SIZE, lat_to_y, lon_to_x, x_to_lon, y_to_lat};

/// A geographical position in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    /// Longitude.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
}

impl From<(f64, f64)> for GeoPos {
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

impl From<GeoPos> for (f64, f64) {
    fn from(pos: GeoPos) -> Self {
        (pos.lon, pos.lat)
    }
}

/// An axis aligned geographical bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    /// South-west corner.
    pub min: GeoPos,
    /// North-east corner.
    pub max: GeoPos,
}

impl Extent {
    /// An extent covering a single position.
    pub fn from_pos(pos: GeoPos) -> Self {
        Self { min: pos, max: pos }
    }

    /// The smallest extent covering all positions, `None` when there are none.
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a GeoPos>) -> Option<Self> {
        let mut positions = positions.into_iter();
        let mut extent = Self::from_pos(*positions.next()?);
        for pos in positions {
            extent.extend(*pos);
        }
        Some(extent)
    }

    /// Grows the extent to cover `pos`.
    pub fn extend(&mut self, pos: GeoPos) {
        self.min.lon = self.min.lon.min(pos.lon);
        self.min.lat = self.min.lat.min(pos.lat);
        self.max.lon = self.max.lon.max(pos.lon);
        self.max.lat = self.max.lat.max(pos.lat);
    }

    /// The smallest extent covering both.
    pub fn union(mut self, other: Extent) -> Self {
        self.extend(other.min);
        self.extend(other.max);
        self
    }

    /// Whether `pos` lies inside or on the border of the extent.
    pub fn contains(&self, pos: GeoPos) -> bool {
        (self.min.lon..=self.max.lon).contains(&pos.lon)
            && (self.min.lat..=self.max.lat).contains(&pos.lat)
    }
}

/// A helper for converting between geographical and screen coordinates.
pub struct MapProjection {
    zoom: u8,
    center: GeoPos,
    widget_rect: Rect,
}

impl MapProjection {
    /// Creates a new `MapProjection`.
    pub(crate) fn new(zoom: u8, center: GeoPos, widget_rect: Rect) -> Self {
        Self {
            zoom,
            center,
            widget_rect,
        }
    }

    /// The zoom level the projection was created for.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// The screen rectangle of the map widget.
    pub fn widget_rect(&self) -> Rect {
        self.widget_rect
    }

    /// The center of the view in tile coordinates.
    pub(crate) fn center_tile(&self) -> (f64, f64) {
        (
            lon_to_x(self.center.lon, self.zoom),
            lat_to_y(self.center.lat, self.zoom),
        )
    }

    /// Projects a geographical coordinate to a screen coordinate.
    pub fn project(&self, geo_pos: GeoPos) -> egui::Pos2 {
        let (center_x, center_y) = self.center_tile();

        let tile_x = lon_to_x(geo_pos.lon, self.zoom);
        let tile_y = lat_to_y(geo_pos.lat, self.zoom);

        let dx = (tile_x - center_x) * TILE_SIZE as f64;
        let dy = (tile_y - center_y) * TILE_SIZE as f64;

        let widget_center = self.widget_rect.center();
        widget_center + egui::vec2(dx as f32, dy as f32)
    }

    /// Un-projects a screen coordinate to a geographical coordinate.
    pub fn unproject(&self, screen_pos: egui::Pos2) -> GeoPos {
        let rel_pos = screen_pos - self.widget_rect.center();
        let (center_x, center_y) = self.center_tile();

        let target_x = center_x + rel_pos.x as f64 / TILE_SIZE as f64;
        let target_y = center_y + rel_pos.y as f64 / TILE_SIZE as f64;

        GeoPos {
            lon: x_to_lon(target_x, self.zoom),
            lat: y_to_lat(target_y, self.zoom),
        }
    }
}
