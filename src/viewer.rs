//! The region viewer application.
//!
//! [`RegionViewer`] owns the map and its lifecycle. It draws the map, the built-in controls and
//! its own overlays: the region selector with a loading spinner, the edit button and a status
//! message for failed loads.

use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use egui::{Align2, Color32, Context, Id, RichText, vec2};
use log::info;

use crate::Map;
use crate::config::ViewerConfig;
use crate::controls::{Controls, overlay_frame};
use crate::interactions::InteractionManager;
use crate::loader::{LoadOutcome, RegionLoader};
use crate::regions::{RegionTable, Smid};
use crate::service::FeatureService;
use crate::style::MapStyle;

/// Map key of the basemap layer.
pub const BASEMAP_LAYER: &str = "basemap";

/// Id of the map widget.
pub const MAP_ID: &str = "region_map";
/// Id of the region selector overlay.
pub const REGION_SELECTOR_ID: &str = "region_selector";
/// Id of the edit button overlay.
pub const EDIT_BUTTON_ID: &str = "edit_button";

const STATUS_ID: &str = "region_status";
const OVERVIEW_LABEL: &str = "Overview";

/// A message shown to the user until it is dismissed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// Something the user may want to know.
    Info(String),
    /// Something went wrong.
    Error(String),
}

/// The region viewer: a map of the selected region with editing tools.
pub struct RegionViewer {
    config: ViewerConfig,
    style: MapStyle,
    regions: RegionTable,
    loader: RegionLoader,
    interactions: InteractionManager,
    controls: Controls,
    map: Option<Map>,
    selected: Option<Smid>,
    // The region of the last load that reached the map, loaded or empty.
    applied: Option<Option<Smid>>,
    status: Option<Status>,
}

impl RegionViewer {
    /// Creates a viewer. Nothing happens until [`RegionViewer::mount`] is called.
    pub fn new(
        config: ViewerConfig,
        style: MapStyle,
        regions: RegionTable,
        service: Arc<dyn FeatureService>,
    ) -> Self {
        let region_style = style.region_style();
        let loader = RegionLoader::new(service, &config, region_style.clone());
        let selected = config.default_region;
        Self {
            config,
            style,
            regions,
            loader,
            interactions: InteractionManager::new(region_style),
            controls: Controls::default(),
            map: None,
            selected,
            applied: None,
            status: None,
        }
    }

    /// Creates the map with its basemap and starts loading the default region. Mounting a
    /// mounted viewer does nothing.
    pub fn mount(&mut self) {
        if self.map.is_some() {
            return;
        }
        let mut map = Map::new(self.config.view.clone());
        map.background = self.style.background_color();
        map.add_layer(BASEMAP_LAYER, self.style.basemap_layer());
        self.map = Some(map);
        info!("Map mounted");
        self.select_region(self.config.default_region);
    }

    /// Removes the interactions and layers and drops the map. Running loads are abandoned.
    /// Safe to call at any time, also repeatedly.
    pub fn teardown(&mut self) {
        self.loader.cancel();
        if let Some(mut map) = self.map.take() {
            self.interactions.set_editing(&mut map, false);
            self.interactions.uninstall(&mut map);
            map.clear_layers();
            info!("Map torn down");
        }
        self.applied = None;
    }

    /// Whether the map exists.
    pub fn is_mounted(&self) -> bool {
        self.map.is_some()
    }

    /// The map, if mounted.
    pub fn map(&self) -> Option<&Map> {
        self.map.as_ref()
    }

    /// The region picked in the selector, `None` for the overview.
    pub fn selected_region(&self) -> Option<Smid> {
        self.selected
    }

    /// Whether a region is being loaded.
    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Whether edit mode is on.
    pub fn is_editing(&self) -> bool {
        self.interactions.is_editing()
    }

    /// The current status message.
    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// Hides the status message.
    pub fn dismiss_status(&mut self) {
        self.status = None;
    }

    /// Starts loading `region`, or the overview when `None`. Returns the generation of the load,
    /// or `None` when the viewer isn't mounted.
    pub fn select_region(&mut self, region: Option<Smid>) -> Option<u64> {
        let map = self.map.as_mut()?;
        self.selected = region;
        self.status = None;
        Some(
            self.loader
                .load_region(map, &mut self.interactions, region),
        )
    }

    /// Turns edit mode on or off. Does nothing while no region is loaded.
    pub fn toggle_edit(&mut self) {
        if let Some(map) = self.map.as_mut() {
            if self.interactions.is_installed() {
                self.interactions.toggle_edit(map);
            }
        }
    }

    /// Applies finished loads and interaction events to the map. Called every frame.
    pub fn poll(&mut self) -> Vec<LoadOutcome> {
        let Some(map) = self.map.as_mut() else {
            return Vec::new();
        };
        let outcomes = self.loader.poll(map, &mut self.interactions);
        for outcome in &outcomes {
            match outcome {
                LoadOutcome::Loaded { region, .. } => self.applied = Some(*region),
                LoadOutcome::Empty { region } => {
                    self.applied = Some(*region);
                    self.status = Some(Status::Info(format!(
                        "No features found for {}",
                        region_label(&self.regions, *region)
                    )));
                }
                LoadOutcome::Failed { region, error } => {
                    if let Some(applied) = self.applied {
                        self.selected = applied;
                    }
                    self.status = Some(Status::Error(format!(
                        "Could not load {}: {}",
                        region_label(&self.regions, *region),
                        error
                    )));
                }
                LoadOutcome::Stale { .. } => {}
            }
        }
        self.interactions.handle_events(map);
        outcomes
    }

    fn show_region_selector(&mut self, ctx: &Context) {
        let loading = self.loader.is_loading();
        let mut choice = None;
        egui::Area::new(Id::new(REGION_SELECTOR_ID))
            .anchor(Align2::LEFT_TOP, vec2(10.0, 10.0))
            .show(ctx, |ui| {
                overlay_frame(ctx).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        egui::ComboBox::from_id_salt("region_select")
                            .selected_text(region_label(&self.regions, self.selected))
                            .width(200.0)
                            .show_ui(ui, |ui| {
                                if ui
                                    .selectable_label(self.selected.is_none(), OVERVIEW_LABEL)
                                    .clicked()
                                {
                                    choice = Some(None);
                                }
                                for (depth, entry) in self.regions.flatten() {
                                    let text = format!("{}{}", "    ".repeat(depth), entry.label);
                                    if entry.is_leaf() {
                                        let checked = self.selected == Some(entry.smid);
                                        if ui.selectable_label(checked, text).clicked() {
                                            choice = Some(Some(entry.smid));
                                        }
                                    } else {
                                        ui.label(RichText::new(text).strong());
                                    }
                                }
                            });
                        if loading {
                            ui.spinner();
                        }
                    });
                });
            });

        if let Some(region) = choice {
            if region != self.selected {
                self.select_region(region);
            }
        }
    }

    fn show_edit_button(&mut self, ctx: &Context) {
        let enabled = self.interactions.is_installed() && !self.loader.is_loading();
        let editing = self.interactions.is_editing();
        let mut clicked = false;
        egui::Area::new(Id::new(EDIT_BUTTON_ID))
            .anchor(Align2::LEFT_TOP, vec2(10.0, 52.0))
            .show(ctx, |ui| {
                overlay_frame(ctx).show(ui, |ui| {
                    let label = if editing { "Stop editing" } else { "Edit" };
                    clicked = ui
                        .add_enabled(enabled, egui::Button::new(label).selected(editing))
                        .on_hover_text("Select, reshape, move and draw region polygons")
                        .clicked();
                });
            });
        if clicked {
            self.toggle_edit();
        }
    }

    fn show_status(&mut self, ctx: &Context) {
        let Some(status) = &self.status else {
            return;
        };
        let mut dismissed = false;
        egui::Area::new(Id::new(STATUS_ID))
            .anchor(Align2::CENTER_BOTTOM, vec2(0.0, -40.0))
            .show(ctx, |ui| {
                overlay_frame(ctx).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        match status {
                            Status::Info(msg) => ui.label(msg),
                            Status::Error(msg) => ui.colored_label(Color32::RED, msg),
                        };
                        dismissed = ui.button("Dismiss").clicked();
                    });
                });
            });
        if dismissed {
            self.dismiss_status();
        }
    }
}

impl eframe::App for RegionViewer {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.poll();

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| match self.map.as_mut() {
                Some(map) => {
                    ui.push_id(MAP_ID, |ui| {
                        ui.add_sized(ui.available_size_before_wrap(), &mut *map);
                    });
                }
                None => {
                    ui.centered_and_justified(|ui| ui.label("No map"));
                }
            });

        if let Some(map) = self.map.as_mut() {
            self.controls.show(ctx, map);
            self.show_region_selector(ctx);
            self.show_edit_button(ctx);
            self.show_status(ctx);
        }

        // Answers arrive on another thread, keep polling for them.
        if self.loader.is_loading() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

impl Drop for RegionViewer {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// The text shown in the selector for `region`.
fn region_label(regions: &RegionTable, region: Option<Smid>) -> String {
    match region {
        None => OVERVIEW_LABEL.to_string(),
        Some(smid) => regions
            .find(smid)
            .map_or_else(|| smid.to_string(), |entry| entry.label.clone()),
    }
}
