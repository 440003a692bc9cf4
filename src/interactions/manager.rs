use log::{debug, info};
use std::rc::Rc;

use super::{Draw, Interaction, InteractionEvent, Modify, Select, Snap, Translate};
use crate::Map;
use crate::layers::geojson;
use crate::layers::vector::{SharedSource, VectorStyle};

/// Map key of the select interaction.
pub const SELECT: &str = "select";
/// Map key of the modify interaction.
pub const MODIFY: &str = "modify";
/// Map key of the translate interaction.
pub const TRANSLATE: &str = "translate";
/// Map key of the draw interaction.
pub const DRAW: &str = "draw";
/// Map key of the snap interaction.
pub const SNAP: &str = "snap";

/// The keys of all managed interactions, in the order they are added.
pub const INTERACTION_KEYS: [&str; 5] = [SELECT, MODIFY, TRANSLATE, DRAW, SNAP];

/// Owns the edit mode and the editing interactions of the current region layer.
#[derive(Debug, Default)]
pub struct InteractionManager {
    editing: bool,
    installed: bool,
    /// Style of vertex handles and of polygons being drawn.
    pub style: VectorStyle,
}

impl InteractionManager {
    /// Creates a manager whose interactions follow `style`.
    pub fn new(style: VectorStyle) -> Self {
        Self {
            editing: false,
            installed: false,
            style,
        }
    }

    /// Adds the five editing interactions bound to `source`, replacing any installed before.
    /// They start inactive unless edit mode is on.
    pub fn install(&mut self, map: &mut Map, source: SharedSource) {
        self.uninstall(map);

        let select = Select::new(Rc::clone(&source));
        let selected = select.features();

        let mut modify = Modify::new(Rc::clone(&source), Rc::clone(&selected));
        modify.vertex_radius = self.style.vertex_radius;
        modify.vertex_fill = self.style.vertex_fill;

        let translate = Translate::new(Rc::clone(&source), selected);

        let mut draw = Draw::new(Rc::clone(&source));
        draw.stroke = self.style.stroke;

        let snap = Snap::new(source);

        map.add_interaction(SELECT, select);
        map.add_interaction(MODIFY, modify);
        map.add_interaction(TRANSLATE, translate);
        map.add_interaction(DRAW, draw);
        map.add_interaction(SNAP, snap);
        self.installed = true;

        let editing = self.editing;
        self.apply(map, editing);
    }

    /// Removes the managed interactions from the map. Does nothing if none are installed.
    pub fn uninstall(&mut self, map: &mut Map) {
        for key in INTERACTION_KEYS {
            map.remove_interaction(key);
        }
        self.installed = false;
    }

    /// Flips edit mode and applies it to the installed interactions.
    pub fn toggle_edit(&mut self, map: &mut Map) {
        self.set_editing(map, !self.editing);
    }

    /// Turns edit mode on or off.
    pub fn set_editing(&mut self, map: &mut Map, editing: bool) {
        if self.editing != editing {
            info!("Edit mode {}", if editing { "on" } else { "off" });
        }
        self.editing = editing;
        self.apply(map, editing);
    }

    /// Whether edit mode is on.
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Whether the interactions are on the map.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    fn apply(&self, map: &mut Map, active: bool) {
        for key in INTERACTION_KEYS {
            if let Some(interaction) = map.interaction_dyn_mut(key) {
                interaction.set_active(active);
            }
        }
    }

    /// Takes the events the interactions emitted and reacts to them. Drawing is only possible
    /// while nothing is selected. Returns the events for further handling.
    pub fn handle_events(&mut self, map: &mut Map) -> Vec<InteractionEvent> {
        let events = map.take_events();
        for event in &events {
            match event {
                InteractionEvent::Select { .. } => {
                    let has_selection = map
                        .interaction::<Select>(SELECT)
                        .is_some_and(Select::has_selection);
                    if let Some(draw) = map.interaction_mut::<Draw>(DRAW) {
                        draw.set_active(self.editing && !has_selection);
                    }
                }
                InteractionEvent::DrawEnd { feature } => {
                    if let Some(drawn) = map
                        .interaction::<Draw>(DRAW)
                        .and_then(|draw| draw.source_feature(*feature))
                    {
                        debug!(
                            "Drew feature {:?}: {}",
                            feature,
                            geojson::to_geojson_string(&drawn).unwrap_or_default()
                        );
                    }
                }
                InteractionEvent::ModifyEnd { feature } => {
                    debug!("Modified feature {:?}", feature);
                }
                InteractionEvent::TranslateEnd { feature } => {
                    debug!("Moved feature {:?}", feature);
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewOptions;
    use crate::interactions::PointerInput;
    use crate::interactions::test_util::{projection, source};
    use crate::layers::vector::FeatureId;

    fn installed() -> (Map, InteractionManager) {
        let mut map = Map::new(ViewOptions::default());
        let mut manager = InteractionManager::default();
        manager.install(&mut map, source());
        (map, manager)
    }

    fn active_flags(map: &mut Map) -> Vec<bool> {
        INTERACTION_KEYS
            .iter()
            .map(|key| map.interaction_dyn_mut(key).map(|i| i.is_active()).unwrap())
            .collect()
    }

    #[test]
    fn install_adds_five_inactive_interactions() {
        let (mut map, manager) = installed();
        assert!(manager.is_installed());
        assert_eq!(map.interaction_keys().collect::<Vec<_>>(), INTERACTION_KEYS);
        assert_eq!(active_flags(&mut map), vec![false; 5]);
    }

    #[test]
    fn install_twice_replaces() {
        let (mut map, mut manager) = installed();
        manager.install(&mut map, source());
        assert_eq!(map.interaction_keys().count(), 5);
    }

    #[test]
    fn toggle_edit_flips_all() {
        let (mut map, mut manager) = installed();
        manager.toggle_edit(&mut map);
        assert!(manager.is_editing());
        assert_eq!(active_flags(&mut map), vec![true; 5]);
        manager.toggle_edit(&mut map);
        assert_eq!(active_flags(&mut map), vec![false; 5]);
    }

    #[test]
    fn toggle_edit_without_interactions_does_not_panic() {
        let mut map = Map::new(ViewOptions::default());
        let mut manager = InteractionManager::default();
        manager.toggle_edit(&mut map);
        assert!(manager.is_editing());
        assert!(!manager.is_installed());
        assert_eq!(map.interaction_keys().count(), 0);
    }

    #[test]
    fn selection_switches_draw_off_and_on() {
        let (mut map, mut manager) = installed();
        manager.set_editing(&mut map, true);

        let event = map
            .interaction_mut::<Select>(SELECT)
            .and_then(|s| s.select_at((0.0, 0.0).into(), false))
            .unwrap();
        map.events.push(event);
        manager.handle_events(&mut map);
        assert!(!map.interaction::<Draw>(DRAW).unwrap().is_active());

        let event = map
            .interaction_mut::<Select>(SELECT)
            .and_then(|s| s.select_at((30.0, 30.0).into(), false))
            .unwrap();
        map.events.push(event);
        let events = manager.handle_events(&mut map);
        assert_eq!(events.len(), 1);
        assert!(map.interaction::<Draw>(DRAW).unwrap().is_active());
        assert!(map.take_events().is_empty());
    }

    #[test]
    fn clicks_through_map_select_and_gate_drawing() {
        let (mut map, mut manager) = installed();
        manager.set_editing(&mut map, true);
        let projection = projection();
        let click = |lon: f64, lat: f64| PointerInput {
            pos: Some(projection.project((lon, lat).into())),
            hovered: true,
            clicked: true,
            ..Default::default()
        };

        // A click on a feature reaches select, and draw does not start a polygon.
        assert!(!map.dispatch_input(&mut click(0.0, 0.0), &projection));
        manager.handle_events(&mut map);
        let selected = map.interaction::<Select>(SELECT).unwrap().features();
        assert_eq!(*selected.borrow(), vec![FeatureId(0)]);
        let draw = map.interaction::<Draw>(DRAW).unwrap();
        assert!(!draw.is_active());
        assert!(draw.sketch().is_empty());

        // A click on empty space clears the selection and drawing is back.
        assert!(!map.dispatch_input(&mut click(30.0, 30.0), &projection));
        manager.handle_events(&mut map);
        assert!(selected.borrow().is_empty());
        assert!(map.interaction::<Draw>(DRAW).unwrap().is_active());

        // Now empty space clicks are vertices of a new polygon.
        assert!(map.dispatch_input(&mut click(30.0, 30.0), &projection));
        assert_eq!(map.interaction::<Draw>(DRAW).unwrap().sketch().len(), 1);
        assert!(manager.handle_events(&mut map).is_empty());
    }

    #[test]
    fn install_keeps_edit_mode() {
        let (mut map, mut manager) = installed();
        manager.set_editing(&mut map, true);
        manager.install(&mut map, source());
        assert_eq!(active_flags(&mut map), vec![true; 5]);

        manager.uninstall(&mut map);
        assert!(!manager.is_installed());
        assert_eq!(map.interaction_keys().count(), 0);
    }
}
