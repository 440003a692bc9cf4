//! Built-in map controls drawn over the map: zoom buttons, a fullscreen toggle and a readout of
//! the position under the mouse.

use eframe::egui;
use egui::{Align2, Color32, Context, Id, vec2};

use crate::Map;
use crate::projection::GeoPos;

/// Which of the built-in controls are shown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Controls {
    /// Zoom in and out buttons.
    pub zoom: bool,
    /// Fullscreen toggle.
    pub fullscreen: bool,
    /// Coordinates of the position under the mouse.
    pub mouse_position: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            zoom: true,
            fullscreen: true,
            mouse_position: true,
        }
    }
}

/// The background behind overlays on the map.
pub(crate) fn overlay_frame(ctx: &Context) -> egui::Frame {
    let fill = if ctx.style().visuals.dark_mode {
        Color32::from_black_alpha(180)
    } else {
        Color32::from_white_alpha(200)
    };
    egui::Frame::NONE
        .inner_margin(egui::Margin::same(4))
        .fill(fill)
        .corner_radius(3.0)
}

impl Controls {
    /// Draws the enabled controls in the corners of the window and applies their actions to
    /// `map`.
    pub fn show(&self, ctx: &Context, map: &mut Map) {
        if self.zoom || self.fullscreen {
            egui::Area::new(Id::new("map_controls"))
                .anchor(Align2::RIGHT_TOP, vec2(-10.0, 10.0))
                .show(ctx, |ui| {
                    overlay_frame(ctx).show(ui, |ui| {
                        ui.vertical(|ui| {
                            if self.zoom {
                                let (min_zoom, max_zoom) =
                                    (map.options().min_zoom, map.options().max_zoom);
                                if ui
                                    .add_enabled(map.zoom < max_zoom, egui::Button::new("+"))
                                    .on_hover_text("Zoom in")
                                    .clicked()
                                {
                                    map.zoom_by(1);
                                }
                                if ui
                                    .add_enabled(map.zoom > min_zoom, egui::Button::new("-"))
                                    .on_hover_text("Zoom out")
                                    .clicked()
                                {
                                    map.zoom_by(-1);
                                }
                            }
                            if self.fullscreen {
                                let fullscreen =
                                    ctx.input(|i| i.viewport().fullscreen.unwrap_or(false));
                                let label = if fullscreen { "Exit fullscreen" } else { "Fullscreen" };
                                if ui.button(label).clicked() {
                                    ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(
                                        !fullscreen,
                                    ));
                                }
                            }
                        });
                    });
                });
        }

        if self.mouse_position {
            if let Some(pos) = map.mouse_pos {
                egui::Area::new(Id::new("map_mouse_position"))
                    .anchor(Align2::RIGHT_BOTTOM, vec2(-5.0, -5.0))
                    .interactable(false)
                    .show(ctx, |ui| {
                        overlay_frame(ctx).show(ui, |ui| {
                            ui.style_mut().override_text_style = Some(egui::TextStyle::Monospace);
                            ui.label(format_coordinate(pos));
                        });
                    });
            }
        }
    }
}

/// Formats a position as `lon, lat` with five decimals.
pub fn format_coordinate(pos: GeoPos) -> String {
    format!("{:.5}, {:.5}", pos.lon, pos.lat)
}
