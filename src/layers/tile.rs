//! A layer for raster tile maps, used for the basemap.

use eframe::egui;
use egui::{Color32, Painter, Rect, Response, Vec2, pos2};
use eyre::Context;
use log::{debug, error};
use poll_promise::Promise;
use std::{any::Any, collections::HashMap, sync::Arc};

use crate::{
    CLIENT, MapError, TILE_SIZE, TileId,
    config::{Attribution, MapConfig},
    layers::Layer,
    projection::MapProjection,
};

/// The state of a tile in the cache.
enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// A layer that manages and renders map tiles on the map view.
pub struct TileLayer {
    tiles: HashMap<TileId, Tile>,
    visible_tiles: Vec<(TileId, egui::Pos2)>,
    /// Color tint applied to the tile images when rendering
    pub tint: Color32,
    config: Box<dyn MapConfig>,
    attribution: Option<Attribution>,
}

impl TileLayer {
    /// Creates a new tile layer with the given map configuration.
    pub fn new(config: impl MapConfig + 'static) -> Self {
        let attribution = Attribution::from_config(&config);
        Self {
            tiles: Default::default(),
            visible_tiles: Default::default(),
            tint: Color32::WHITE,
            config: Box::new(config),
            attribution,
        }
    }

    /// The URL the given tile is downloaded from.
    pub fn tile_url(&self, tile: TileId) -> String {
        tile.to_url(self.config.as_ref())
    }

    fn load_tile(&mut self, ctx: &egui::Context, tile_id: TileId) {
        let config = self.config.as_ref();
        let tile_state = self.tiles.entry(tile_id).or_insert_with(|| {
            let url = tile_id.to_url(config);
            let promise =
                Promise::spawn_thread("download_tile", move || -> Result<_, Arc<eyre::Report>> {
                    let result: Result<_, eyre::Report> = (|| {
                        debug!("Downloading tile from {}", &url);
                        let response = CLIENT.get(&url).send().map_err(MapError::from)?;

                        if !response.status().is_success() {
                            return Err(MapError::TileDownloadError(response.status().to_string()));
                        }

                        let bytes = response.bytes().map_err(MapError::from)?.to_vec();
                        let image = image::load_from_memory(&bytes)
                            .map_err(MapError::from)?
                            .to_rgba8();

                        let size = [image.width() as _, image.height() as _];
                        let pixels = image.into_raw();
                        Ok(egui::ColorImage::from_rgba_unmultiplied(size, &pixels))
                    })()
                    .with_context(|| format!("Failed to download tile from {}", &url));

                    result.map_err(Arc::new)
                });
            Tile::Loading(promise)
        });

        // Turn a finished download into a texture, so it can be drawn in this very frame.
        if let Tile::Loading(promise) = tile_state {
            if let Some(result) = promise.ready() {
                match result {
                    Ok(color_image) => {
                        let texture = ctx.load_texture(
                            format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                            color_image.clone(),
                            Default::default(),
                        );
                        *tile_state = Tile::Loaded(texture);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        *tile_state = Tile::Failed(e.clone());
                    }
                }
            }
        }
    }

    fn draw_tile(&self, painter: &Painter, tile_id: &TileId, tile_pos: egui::Pos2) {
        let Some(tile_state) = self.tiles.get(tile_id) else {
            return;
        };
        let tile_rect =
            Rect::from_min_size(tile_pos, Vec2::new(TILE_SIZE as f32, TILE_SIZE as f32));

        match tile_state {
            Tile::Loading(_) => {
                draw_placeholder(painter, tile_rect, "?", Color32::ORANGE);
                // The tile is still loading, so we need to tell egui to repaint.
                painter.ctx().request_repaint();
            }
            Tile::Loaded(texture) => {
                painter.image(
                    texture.id(),
                    tile_rect,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    self.tint,
                );
            }
            Tile::Failed(_) => {
                draw_placeholder(painter, tile_rect, "!", Color32::RED);
            }
        }
    }
}

/// Draws a gray placeholder with a border and a marker in the center.
fn draw_placeholder(painter: &Painter, tile_rect: Rect, marker: &str, color: Color32) {
    painter.rect_filled(tile_rect, 0.0, Color32::from_gray(220));
    painter.rect_stroke(
        tile_rect,
        0.0,
        egui::Stroke::new(1.0, Color32::GRAY),
        egui::StrokeKind::Inside,
    );
    painter.text(
        tile_rect.center(),
        egui::Align2::CENTER_CENTER,
        marker,
        egui::FontId::proportional(40.0),
        color,
    );
}

/// Returns the tiles covering the widget, with the screen position of their top left corner.
/// Tiles outside of the world are skipped.
pub(crate) fn visible_tiles(projection: &MapProjection) -> impl Iterator<Item = (TileId, egui::Pos2)> {
    let (center_x, center_y) = projection.center_tile();
    let rect = projection.widget_rect();

    let widget_center_x = rect.width() / 2.0;
    let widget_center_y = rect.height() / 2.0;

    let x_min = (center_x - widget_center_x as f64 / TILE_SIZE as f64).floor() as i64;
    let y_min = (center_y - widget_center_y as f64 / TILE_SIZE as f64).floor() as i64;
    let x_max = (center_x + widget_center_x as f64 / TILE_SIZE as f64).ceil() as i64;
    let y_max = (center_y + widget_center_y as f64 / TILE_SIZE as f64).ceil() as i64;

    let zoom = projection.zoom();
    let world_size = 1_i64 << zoom;
    let rect_min = rect.min;
    (x_min.max(0)..=x_max.min(world_size - 1)).flat_map(move |x| {
        (y_min.max(0)..=y_max.min(world_size - 1)).map(move |y| {
            let tile_id = TileId {
                z: zoom,
                x: x as u32,
                y: y as u32,
            };
            let screen_x = widget_center_x + (x as f64 - center_x) as f32 * TILE_SIZE as f32;
            let screen_y = widget_center_y + (y as f64 - center_y) as f32 * TILE_SIZE as f32;
            (tile_id, rect_min + Vec2::new(screen_x, screen_y))
        })
    })
}

impl Layer for TileLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        self.visible_tiles = visible_tiles(projection).collect();
        let visible: Vec<TileId> = self.visible_tiles.iter().map(|(id, _)| *id).collect();
        for tile_id in visible {
            self.load_tile(&response.ctx, tile_id);
        }
        false
    }

    fn draw(&self, painter: &Painter, _: &MapProjection) {
        for (tile_id, tile_pos) in &self.visible_tiles {
            self.draw_tile(painter, tile_id, *tile_pos);
        }
    }

    fn attribution(&self) -> Option<&Attribution> {
        self.attribution.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenStreetMapConfig;
    use crate::projection::GeoPos;
    use egui::vec2;

    #[test]
    fn visible_tiles_cover_widget_and_stay_in_world() {
        let rect = Rect::from_min_size(pos2(0.0, 0.0), vec2(512.0, 512.0));
        let projection = MapProjection::new(1, GeoPos { lon: 0.0, lat: 0.0 }, rect);
        let mut tiles: Vec<(u32, u32)> = visible_tiles(&projection)
            .map(|(id, _)| (id.x, id.y))
            .collect();
        tiles.sort();
        assert_eq!(tiles, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

        let first = visible_tiles(&projection)
            .find(|(id, _)| id.x == 0 && id.y == 0)
            .map(|(_, pos)| pos)
            .unwrap();
        assert_eq!(first, pos2(0.0, 0.0));
    }

    #[test]
    fn tile_layer_attribution_comes_from_config() {
        let layer = TileLayer::new(OpenStreetMapConfig::default());
        assert_eq!(
            layer.attribution().map(|a| a.text.as_str()),
            Some("© OpenStreetMap contributors")
        );
        assert_eq!(
            layer.tile_url(TileId { z: 3, x: 4, y: 5 }),
            "https://tile.openstreetmap.org/3/4/5.png"
        );
        assert!(layer.as_any().is::<TileLayer>());
    }
}
