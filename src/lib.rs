#![warn(missing_docs)]

//! A map viewer for administrative regions served by a SuperMap iServer data service.
//!
//! The crate provides a `Map` widget for `egui` that renders a raster basemap and vector layers,
//! a set of editing interactions (select, modify, translate, draw, snap), a feature service client
//! and the `RegionViewer` application that wires them together: pick a region from the dropdown,
//! the region's polygons are fetched, displayed and framed, and the edit button toggles the
//! interactions on the loaded features.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use region_map_view::{
//!     config::ViewerConfig, regions::RegionTable, service::IServerFeatureService, style::MapStyle,
//!     viewer::RegionViewer,
//! };
//!
//! let config = ViewerConfig::default();
//! let service = Arc::new(IServerFeatureService::new(config.service_url.clone()));
//! let mut viewer = RegionViewer::new(
//!     config,
//!     MapStyle::embedded().unwrap(),
//!     RegionTable::embedded().unwrap(),
//!     service,
//! );
//! viewer.mount();
//! ```

pub mod config;
pub mod controls;
pub mod interactions;
pub mod layers;
pub mod loader;
pub mod projection;
pub mod regions;
pub mod service;
pub mod style;
pub mod viewer;

use eframe::egui;
use egui::{Color32, Rect, Response, Sense, Ui, Vec2, Widget, vec2};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::config::{FitPadding, MapConfig, ViewOptions};
use crate::interactions::{Interaction, InteractionEvent, PointerInput};
use crate::layers::Layer;
use crate::projection::{Extent, GeoPos, MapProjection};

// The size of a map tile in pixels.
pub(crate) const TILE_SIZE: u32 = 256;
/// The lowest zoom level any map accepts.
pub const MIN_ZOOM: u8 = 0;
/// The highest zoom level any map accepts.
pub const MAX_ZOOM: u8 = 19;

// Assumed widget size until the map has been laid out once.
const DEFAULT_VIEW_SIZE: Vec2 = vec2(800.0, 600.0);

// Reuse the reqwest client for tile downloads and feature queries by making it a static variable.
pub(crate) static CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .expect("Failed to build reqwest client")
});

/// Errors that can occur while using the map widget.
#[derive(Error, Debug)]
pub enum MapError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),
}

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

impl TileId {
    fn to_url(self, config: &dyn MapConfig) -> String {
        config.tile_url(&self)
    }
}

/// The map widget.
///
/// Layers are drawn in insertion order (the first one at the bottom). Interactions get the
/// pointer input in reverse insertion order, the last added one first.
pub struct Map {
    /// The geographical center of the map.
    pub center: GeoPos,

    /// The zoom level of the map.
    pub zoom: u8,

    /// The geographical position under the mouse pointer, if any.
    pub mouse_pos: Option<GeoPos>,

    /// The color painted below all layers.
    pub background: Color32,

    options: ViewOptions,
    layers: Vec<(String, Box<dyn Layer>)>,
    interactions: Vec<(String, Box<dyn Interaction>)>,
    events: Vec<InteractionEvent>,
    last_rect: Option<Rect>,
    // A fit requested before the first layout, repeated once the real size is known.
    pending_fit: Option<(Extent, FitPadding)>,
}

impl Map {
    /// Creates a new `Map` widget with the given view options.
    pub fn new(options: ViewOptions) -> Self {
        let zoom = options.zoom.clamp(options.min_zoom, options.max_zoom);
        Self {
            center: options.center,
            zoom,
            mouse_pos: None,
            background: Color32::from_rgb(220, 220, 220),
            options,
            layers: Vec::new(),
            interactions: Vec::new(),
            events: Vec::new(),
            last_rect: None,
            pending_fit: None,
        }
    }

    /// The view options the map was created with.
    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    /// Adds a layer on top of the existing ones. A layer already registered under the same key is
    /// replaced in place and returned.
    pub fn add_layer(
        &mut self,
        key: impl Into<String>,
        layer: impl Layer,
    ) -> Option<Box<dyn Layer>> {
        self.add_boxed_layer(key, Box::new(layer))
    }

    /// Adds an already boxed layer, for example one previously returned by `remove_layer`.
    pub fn add_boxed_layer(
        &mut self,
        key: impl Into<String>,
        layer: Box<dyn Layer>,
    ) -> Option<Box<dyn Layer>> {
        let key = key.into();
        if let Some((_, existing)) = self.layers.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(existing, layer));
        }
        self.layers.push((key, layer));
        None
    }

    /// Removes a layer from the map and hands it back to the caller.
    pub fn remove_layer(&mut self, key: &str) -> Option<Box<dyn Layer>> {
        let index = self.layers.iter().position(|(k, _)| k == key)?;
        Some(self.layers.remove(index).1)
    }

    /// Removes all layers.
    pub fn clear_layers(&mut self) {
        self.layers.clear();
    }

    /// Whether a layer is registered under the given key.
    pub fn has_layer(&self, key: &str) -> bool {
        self.layers.iter().any(|(k, _)| k == key)
    }

    /// The keys of all layers, bottom to top.
    pub fn layer_keys(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(k, _)| k.as_str())
    }

    /// Gets a layer by key, downcast to its concrete type.
    pub fn layer<T: Layer>(&self, key: &str) -> Option<&T> {
        self.layers
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, layer)| layer.as_any().downcast_ref::<T>())
    }

    /// Gets a mutable layer by key, downcast to its concrete type.
    pub fn layer_mut<T: Layer>(&mut self, key: &str) -> Option<&mut T> {
        self.layers
            .iter_mut()
            .find(|(k, _)| k == key)
            .and_then(|(_, layer)| layer.as_any_mut().downcast_mut::<T>())
    }

    /// Adds an interaction. An interaction already registered under the same key is replaced in
    /// place and returned.
    pub fn add_interaction(
        &mut self,
        key: impl Into<String>,
        interaction: impl Interaction,
    ) -> Option<Box<dyn Interaction>> {
        let key = key.into();
        let interaction: Box<dyn Interaction> = Box::new(interaction);
        if let Some((_, existing)) = self.interactions.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(existing, interaction));
        }
        self.interactions.push((key, interaction));
        None
    }

    /// Removes an interaction from the map and hands it back to the caller.
    pub fn remove_interaction(&mut self, key: &str) -> Option<Box<dyn Interaction>> {
        let index = self.interactions.iter().position(|(k, _)| k == key)?;
        Some(self.interactions.remove(index).1)
    }

    /// The keys of all interactions in the order they were added.
    pub fn interaction_keys(&self) -> impl Iterator<Item = &str> {
        self.interactions.iter().map(|(k, _)| k.as_str())
    }

    /// Gets an interaction by key, downcast to its concrete type.
    pub fn interaction<T: Interaction>(&self, key: &str) -> Option<&T> {
        self.interactions
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, i)| i.as_any().downcast_ref::<T>())
    }

    /// Gets a mutable interaction by key, downcast to its concrete type.
    pub fn interaction_mut<T: Interaction>(&mut self, key: &str) -> Option<&mut T> {
        self.interactions
            .iter_mut()
            .find(|(k, _)| k == key)
            .and_then(|(_, i)| i.as_any_mut().downcast_mut::<T>())
    }

    /// Gets a mutable interaction by key without knowing its concrete type.
    pub fn interaction_dyn_mut(&mut self, key: &str) -> Option<&mut dyn Interaction> {
        self.interactions
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, i)| i.as_mut())
    }

    /// Takes the events the interactions emitted since the last call.
    pub fn take_events(&mut self) -> Vec<InteractionEvent> {
        std::mem::take(&mut self.events)
    }

    /// The size of the widget as of the last frame, or a default before the first layout.
    pub fn view_size(&self) -> Vec2 {
        self.last_rect.map_or(DEFAULT_VIEW_SIZE, |r| r.size())
    }

    /// Changes the zoom level by `delta` steps, keeping the center in place.
    pub fn zoom_by(&mut self, delta: i32) {
        self.zoom = (self.zoom as i32 + delta)
            .clamp(self.options.min_zoom as i32, self.options.max_zoom as i32) as u8;
    }

    /// Sets the zoom and center so that `extent` is fully visible inside the widget minus
    /// `padding`. The highest zoom level at which the extent fits is used, bounded by the view
    /// options.
    ///
    /// Before the first layout the widget size is a guess, so the fit is repeated when the map is
    /// laid out.
    pub fn fit_extent(&mut self, extent: &Extent, padding: &FitPadding) {
        if self.last_rect.is_none() {
            self.pending_fit = Some((*extent, padding.clone()));
        }
        let size = self.view_size();
        let available_w = (size.x - padding.left - padding.right).max(1.0) as f64;
        let available_h = (size.y - padding.top - padding.bottom).max(1.0) as f64;

        let mut zoom = self.options.min_zoom;
        for z in (self.options.min_zoom..=self.options.max_zoom).rev() {
            let width =
                (lon_to_x(extent.max.lon, z) - lon_to_x(extent.min.lon, z)) * TILE_SIZE as f64;
            let height =
                (lat_to_y(extent.min.lat, z) - lat_to_y(extent.max.lat, z)) * TILE_SIZE as f64;
            if width <= available_w && height <= available_h {
                zoom = z;
                break;
            }
        }

        let center_x = (lon_to_x(extent.min.lon, zoom) + lon_to_x(extent.max.lon, zoom)) / 2.0;
        let center_y = (lat_to_y(extent.max.lat, zoom) + lat_to_y(extent.min.lat, zoom)) / 2.0;

        // Shift the center so that the extent sits in the middle of the padded area.
        let shift_x = (padding.right - padding.left) as f64 / 2.0 / TILE_SIZE as f64;
        let shift_y = (padding.bottom - padding.top) as f64 / 2.0 / TILE_SIZE as f64;

        self.zoom = zoom;
        self.center = GeoPos {
            lon: x_to_lon(center_x + shift_x, zoom),
            lat: y_to_lat(center_y + shift_y, zoom),
        };
    }

    /// Records the screen area of the widget and applies a fit that waited for it.
    pub(crate) fn set_view_rect(&mut self, rect: Rect) {
        self.last_rect = Some(rect);
        if let Some((extent, padding)) = self.pending_fit.take() {
            self.fit_extent(&extent, &padding);
        }
    }

    /// Hands pointer input to the active interactions, the last added first, until one of them
    /// consumes it.
    pub(crate) fn dispatch_input(
        &mut self,
        input: &mut PointerInput,
        projection: &MapProjection,
    ) -> bool {
        for (_, interaction) in self.interactions.iter_mut().rev() {
            if interaction.is_active() && interaction.handle_input(input, projection, &mut self.events)
            {
                return true;
            }
        }
        false
    }

    fn projection(&self, rect: Rect) -> MapProjection {
        MapProjection::new(self.zoom, self.center, rect)
    }

    /// Handles panning by dragging. Skipped when a layer or an interaction consumed the input.
    fn handle_pan(&mut self, rect: &Rect, response: &Response) {
        if !response.dragged() {
            return;
        }
        let delta = response.drag_delta();
        let center_in_tiles_x = lon_to_x(self.center.lon, self.zoom);
        let center_in_tiles_y = lat_to_y(self.center.lat, self.zoom);

        let mut new_center_x = center_in_tiles_x - (delta.x as f64 / TILE_SIZE as f64);
        let mut new_center_y = center_in_tiles_y - (delta.y as f64 / TILE_SIZE as f64);

        // Clamp the new center to the map boundaries.
        let world_size_in_tiles = 2.0_f64.powi(self.zoom as i32);
        let view_size_in_tiles_x = rect.width() as f64 / TILE_SIZE as f64;
        let view_size_in_tiles_y = rect.height() as f64 / TILE_SIZE as f64;

        let min_center_x = view_size_in_tiles_x / 2.0;
        let max_center_x = world_size_in_tiles - view_size_in_tiles_x / 2.0;
        let min_center_y = view_size_in_tiles_y / 2.0;
        let max_center_y = world_size_in_tiles - view_size_in_tiles_y / 2.0;

        // If the map is smaller than the viewport, center it. Otherwise, clamp the center.
        new_center_x = if min_center_x > max_center_x {
            world_size_in_tiles / 2.0
        } else {
            new_center_x.clamp(min_center_x, max_center_x)
        };
        new_center_y = if min_center_y > max_center_y {
            world_size_in_tiles / 2.0
        } else {
            new_center_y.clamp(min_center_y, max_center_y)
        };

        self.center = GeoPos {
            lon: x_to_lon(new_center_x, self.zoom),
            lat: y_to_lat(new_center_y, self.zoom),
        };
    }

    /// Handles double-click zoom (when enabled), scroll zoom and the mouse position readout.
    fn handle_zoom(&mut self, ui: &Ui, rect: &Rect, response: &Response, allow_double_click: bool) {
        if allow_double_click && self.options.double_click_zoom && response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let new_zoom = (self.zoom + 1).min(self.options.max_zoom);
                if new_zoom != self.zoom {
                    // Zoom in and center the map on the clicked location.
                    self.center = self.projection(*rect).unproject(pointer_pos);
                    self.zoom = new_zoom;
                }
            }
        }

        let Some(mouse_pos) = response.hover_pos().filter(|_| response.hovered()) else {
            self.mouse_pos = None;
            return;
        };

        let target = self.projection(*rect).unproject(mouse_pos);
        self.mouse_pos = Some(target);

        let scroll = ui.input(|i| i.raw_scroll_delta.y);
        if scroll == 0.0 {
            return;
        }

        let old_zoom = self.zoom;
        let mut new_zoom = (self.zoom as i32 + scroll.signum() as i32)
            .clamp(self.options.min_zoom as i32, self.options.max_zoom as i32)
            as u8;

        // If we are zooming out, check if the new zoom level is valid.
        if scroll < 0.0 {
            let world_pixel_size = 2.0_f64.powi(new_zoom as i32) * TILE_SIZE as f64;
            // If the world size would become smaller than the widget size, reject the zoom.
            if world_pixel_size < rect.width() as f64 || world_pixel_size < rect.height() as f64 {
                new_zoom = old_zoom;
            }
        }

        if new_zoom != old_zoom {
            self.zoom = new_zoom;

            // Adjust the map center so the geo-coordinate under the mouse remains the same.
            let mouse_rel = mouse_pos - rect.center();
            let new_center_x =
                lon_to_x(target.lon, new_zoom) - mouse_rel.x as f64 / TILE_SIZE as f64;
            let new_center_y =
                lat_to_y(target.lat, new_zoom) - mouse_rel.y as f64 / TILE_SIZE as f64;

            self.center = GeoPos {
                lon: x_to_lon(new_center_x, new_zoom),
                lat: y_to_lat(new_center_y, new_zoom),
            };
        }
    }

    /// Draws the layers, the interaction overlays and the attribution.
    fn draw(&self, ui: &mut Ui, rect: &Rect) {
        let painter = ui.painter_at(*rect);
        painter.rect_filled(*rect, 0.0, self.background);

        let projection = self.projection(*rect);
        for (_, layer) in &self.layers {
            layer.draw(&painter, &projection);
        }
        for (_, interaction) in &self.interactions {
            interaction.draw(&painter, &projection);
        }

        self.draw_attribution(ui, rect);
    }

    /// Draws the attribution of the first layer that has one.
    fn draw_attribution(&self, ui: &mut Ui, rect: &Rect) {
        let Some(attribution) = self.layers.iter().find_map(|(_, l)| l.attribution()) else {
            return;
        };

        let bg_color = if ui.visuals().dark_mode {
            Color32::from_black_alpha(150)
        } else {
            Color32::from_white_alpha(150)
        };

        let frame = egui::Frame::NONE
            .inner_margin(egui::Margin::same(5))
            .fill(bg_color)
            .corner_radius(3.0);

        egui::Area::new(ui.id().with("attribution"))
            .fixed_pos(rect.left_bottom())
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(5.0, -5.0))
            .show(ui.ctx(), |ui| {
                frame.show(ui, |ui| {
                    ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                    ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend); // Don't wrap attribution text.

                    if let Some(url) = &attribution.url {
                        ui.hyperlink_to(&attribution.text, url);
                    } else {
                        ui.label(&attribution.text);
                    }
                });
            });
    }
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
pub(crate) fn lon_to_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
pub(crate) fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0
        * (2.0_f64.powi(zoom as i32))
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
pub(crate) fn x_to_lon(x: f64, zoom: u8) -> f64 {
    x / (2.0_f64.powi(zoom as i32)) * 360.0 - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
pub(crate) fn y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / (2.0_f64.powi(zoom as i32));
    n.sinh().atan().to_degrees()
}

impl Widget for &mut Map {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));
        self.set_view_rect(rect);

        let projection = self.projection(rect);

        let mut consumed = false;
        for (_, layer) in self.layers.iter_mut().rev() {
            if layer.handle_input(&response, &projection) {
                consumed = true;
                break;
            }
        }

        if !consumed {
            let mut input = PointerInput::from_response(&response);
            consumed = self.dispatch_input(&mut input, &projection);
            if let Some(icon) = input.cursor {
                ui.ctx().set_cursor_icon(icon);
            }
        }

        if !consumed {
            self.handle_pan(&rect, &response);
        }
        self.handle_zoom(ui, &rect, &response, !consumed);
        self.draw(ui, &rect);

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::vector::{FeatureSource, VectorLayer};

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_coord_conversion_roundtrip() {
        let zoom: u8 = 10;
        for (start_lon, start_lat) in [(116.0678288, 35.9384171), (-122.4194, 37.7749)] {
            let x = lon_to_x(start_lon, zoom);
            let y = lat_to_y(start_lat, zoom);

            assert!((start_lon - x_to_lon(x, zoom)).abs() < EPSILON);
            assert!((start_lat - y_to_lat(y, zoom)).abs() < EPSILON);
        }
    }

    #[test]
    fn test_y_to_lat_conversion() {
        // y, zoom, expected_lat
        let test_cases = vec![
            // Equator
            (0.5, 0, 0.0),
            (128.0, 8, 0.0),
            // Near poles (Mercator projection limits)
            (0.0, 0, 85.0511287798),
            (1.0, 0, -85.0511287798),
            (256.0, 8, -85.0511287798),
            // London
            (85.12653378959828, 8, 51.5074),
        ];

        for (y, zoom, expected_lat) in test_cases {
            assert!((y_to_lat(y, zoom) - expected_lat).abs() < EPSILON);
        }
    }

    #[test]
    fn test_lon_to_x_conversion() {
        // lon, zoom, expected_x
        let test_cases = vec![
            (0.0, 0, 0.5),
            (0.0, 8, 128.0),
            (-180.0, 0, 0.0),
            (180.0, 8, 256.0),
            (-0.1275, 8, 127.90933333333333),
        ];

        for (lon, zoom, expected_x) in test_cases {
            assert!((lon_to_x(lon, zoom) - expected_x).abs() < EPSILON);
        }
    }

    #[test]
    fn test_map_new_clamps_zoom() {
        let options = ViewOptions {
            zoom: 15,
            ..ViewOptions::default()
        };
        let map = Map::new(options.clone());
        assert_eq!(map.zoom, options.max_zoom);
        assert_eq!(map.center, options.center);
        assert!(map.mouse_pos.is_none());
        assert_eq!(map.layer_keys().count(), 0);
        assert_eq!(map.interaction_keys().count(), 0);
    }

    #[test]
    fn test_add_layer_replaces_same_key() {
        let mut map = Map::new(ViewOptions::default());
        assert!(
            map.add_layer("region", VectorLayer::new(FeatureSource::default()))
                .is_none()
        );
        assert!(
            map.add_layer("region", VectorLayer::new(FeatureSource::default()))
                .is_some()
        );
        assert_eq!(map.layer_keys().collect::<Vec<_>>(), vec!["region"]);

        assert!(map.remove_layer("region").is_some());
        assert!(map.remove_layer("region").is_none());
        assert!(!map.has_layer("region"));
    }

    #[test]
    fn test_zoom_by_respects_bounds() {
        let mut map = Map::new(ViewOptions::default());
        map.zoom_by(100);
        assert_eq!(map.zoom, map.options().max_zoom);
        map.zoom_by(-100);
        assert_eq!(map.zoom, map.options().min_zoom);
    }

    fn extent(min: (f64, f64), max: (f64, f64)) -> Extent {
        Extent {
            min: min.into(),
            max: max.into(),
        }
    }

    #[test]
    fn test_fit_extent_uses_new_extent() {
        let mut map = Map::new(ViewOptions::default());
        let padding = FitPadding::default();

        // Roughly mainland China.
        map.fit_extent(&extent((73.5, 18.2), (134.8, 53.6)), &padding);
        let large_zoom = map.zoom;

        // Roughly Beijing.
        let small = extent((115.4, 39.4), (117.5, 41.1));
        map.fit_extent(&small, &padding);
        assert!(map.zoom > large_zoom);

        // The extent must be visible within the padded area.
        let rect = Rect::from_min_size(egui::pos2(0.0, 0.0), map.view_size());
        let projection = map.projection(rect);
        let top_left = projection.project(GeoPos {
            lon: small.min.lon,
            lat: small.max.lat,
        });
        let bottom_right = projection.project(GeoPos {
            lon: small.max.lon,
            lat: small.min.lat,
        });
        assert!(top_left.x >= padding.left - 1.0);
        assert!(top_left.y >= padding.top - 1.0);
        assert!(bottom_right.x <= rect.width() - padding.right + 1.0);
        assert!(bottom_right.y <= rect.height() - padding.bottom + 1.0);
    }

    #[test]
    fn test_fit_before_layout_is_repeated_at_real_size() {
        let rect = Rect::from_min_size(egui::pos2(0.0, 0.0), vec2(1600.0, 1200.0));
        let china = extent((73.5, 18.2), (134.8, 53.6));
        let padding = FitPadding::default();

        let mut laid_out = Map::new(ViewOptions::default());
        laid_out.set_view_rect(rect);
        laid_out.fit_extent(&china, &padding);

        let mut early = Map::new(ViewOptions::default());
        early.fit_extent(&china, &padding);
        let guessed_zoom = early.zoom;
        early.set_view_rect(rect);
        assert!(early.zoom > guessed_zoom);
        assert_eq!(early.zoom, laid_out.zoom);
        assert_eq!(early.center, laid_out.center);

        // Later layouts keep the view as navigated.
        early.zoom_by(-1);
        early.set_view_rect(rect);
        assert_eq!(early.zoom, laid_out.zoom - 1);
    }

    #[test]
    fn test_fit_extent_point_uses_max_zoom() {
        let mut map = Map::new(ViewOptions::default());
        let point = extent((116.0, 40.0), (116.0, 40.0));
        map.fit_extent(&point, &FitPadding::default());
        assert_eq!(map.zoom, map.options().max_zoom);
    }

    #[test]
    fn test_tile_id_to_url() {
        let config = crate::config::OpenStreetMapConfig::default();
        let tile_id = TileId {
            z: 10,
            x: 559,
            y: 330,
        };
        assert_eq!(
            tile_id.to_url(&config),
            "https://tile.openstreetmap.org/10/559/330.png"
        );
    }
}
