use egui::{Color32, Painter, Stroke};
use std::any::Any;
use std::rc::Rc;

use super::{Interaction, InteractionEvent, PointerInput, SelectedFeatures};
use crate::layers::vector::{FeatureId, SharedSource, paint_polygon};
use crate::projection::{GeoPos, MapProjection};

/// Selects features of one source by clicking them.
///
/// A click on a feature selects only that feature, a click on empty space clears the selection.
/// With shift held, a click toggles the feature under the pointer and keeps the rest.
pub struct Select {
    source: SharedSource,
    selected: SelectedFeatures,
    active: bool,
    /// Fill of selected features.
    pub fill: Color32,
    /// Outline of selected features.
    pub stroke: Stroke,
}

impl Select {
    /// Creates an inactive selection restricted to `source`.
    pub fn new(source: SharedSource) -> Self {
        Self {
            source,
            selected: Default::default(),
            active: false,
            fill: Color32::from_rgba_unmultiplied(255, 255, 255, 80),
            stroke: Stroke::new(3.0, Color32::from_rgb(51, 153, 204)),
        }
    }

    /// The selected features, to bind other interactions to.
    pub fn features(&self) -> SelectedFeatures {
        Rc::clone(&self.selected)
    }

    /// Whether at least one feature is selected.
    pub fn has_selection(&self) -> bool {
        !self.selected.borrow().is_empty()
    }

    /// Applies a click at `pos`. Returns the change, if anything changed.
    pub fn select_at(&mut self, pos: GeoPos, toggle: bool) -> Option<InteractionEvent> {
        let hit = self.source.borrow().feature_at(pos);
        let mut selected = self.selected.borrow_mut();

        let (added, removed) = match hit {
            Some(id) if toggle => {
                if let Some(index) = selected.iter().position(|s| *s == id) {
                    selected.remove(index);
                    (vec![], vec![id])
                } else {
                    selected.push(id);
                    (vec![id], vec![])
                }
            }
            Some(id) => {
                let removed: Vec<FeatureId> =
                    selected.iter().copied().filter(|s| *s != id).collect();
                let added = if selected.contains(&id) {
                    vec![]
                } else {
                    vec![id]
                };
                *selected = vec![id];
                (added, removed)
            }
            None if toggle => (vec![], vec![]),
            None => (vec![], std::mem::take(&mut *selected)),
        };

        if added.is_empty() && removed.is_empty() {
            None
        } else {
            Some(InteractionEvent::Select {
                selected: added,
                deselected: removed,
            })
        }
    }

    /// Deselects everything.
    pub fn clear(&mut self) -> Option<InteractionEvent> {
        let removed = std::mem::take(&mut *self.selected.borrow_mut());
        if removed.is_empty() {
            None
        } else {
            Some(InteractionEvent::Select {
                selected: vec![],
                deselected: removed,
            })
        }
    }
}

impl Interaction for Select {
    fn handle_input(
        &mut self,
        input: &mut PointerInput,
        projection: &MapProjection,
        events: &mut Vec<InteractionEvent>,
    ) -> bool {
        if input.clicked && !input.double_clicked {
            if let Some(pos) = input.pos {
                let toggle = input.modifiers.shift;
                if let Some(event) = self.select_at(projection.unproject(pos), toggle) {
                    events.push(event);
                }
            }
        }
        // Clicks carry on, a selection does not stop the map from panning.
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        let source = self.source.borrow();
        for id in self.selected.borrow().iter() {
            if let Some(feature) = source.get(*id) {
                for polygon in &feature.polygons {
                    paint_polygon(painter, projection, polygon, self.fill, self.stroke);
                }
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.selected.borrow_mut().clear();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactions::test_util::{projection, source};
    use crate::layers::vector::FeatureId;

    #[test]
    fn click_selects_and_replaces() {
        let mut select = Select::new(source());
        let event = select.select_at((0.0, 0.0).into(), false);
        assert_eq!(
            event,
            Some(InteractionEvent::Select {
                selected: vec![FeatureId(0)],
                deselected: vec![],
            })
        );

        let event = select.select_at((5.0, 0.0).into(), false);
        assert_eq!(
            event,
            Some(InteractionEvent::Select {
                selected: vec![FeatureId(1)],
                deselected: vec![FeatureId(0)],
            })
        );
        assert_eq!(*select.features().borrow(), vec![FeatureId(1)]);

        // Clicking the already selected feature changes nothing.
        assert_eq!(select.select_at((5.0, 0.0).into(), false), None);
    }

    #[test]
    fn click_on_empty_space_clears() {
        let mut select = Select::new(source());
        select.select_at((0.0, 0.0).into(), false);
        let event = select.select_at((20.0, 20.0).into(), false);
        assert_eq!(
            event,
            Some(InteractionEvent::Select {
                selected: vec![],
                deselected: vec![FeatureId(0)],
            })
        );
        assert!(!select.has_selection());
        assert_eq!(select.select_at((20.0, 20.0).into(), false), None);
    }

    #[test]
    fn shift_click_toggles() {
        let mut select = Select::new(source());
        select.select_at((0.0, 0.0).into(), true);
        select.select_at((5.0, 0.0).into(), true);
        assert_eq!(
            *select.features().borrow(),
            vec![FeatureId(0), FeatureId(1)]
        );
        select.select_at((0.0, 0.0).into(), true);
        assert_eq!(*select.features().borrow(), vec![FeatureId(1)]);
        // Shift click on empty space keeps the selection.
        assert_eq!(select.select_at((20.0, 20.0).into(), true), None);
        assert!(select.has_selection());
    }

    #[test]
    fn click_input_emits_event() {
        let mut select = Select::new(source());
        select.set_active(true);
        let projection = projection();
        let mut input = PointerInput {
            pos: Some(projection.project((0.0, 0.0).into())),
            clicked: true,
            ..Default::default()
        };
        let mut events = Vec::new();
        assert!(!select.handle_input(&mut input, &projection, &mut events));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn deactivating_clears_selection() {
        let mut select = Select::new(source());
        select.set_active(true);
        select.select_at((0.0, 0.0).into(), false);
        select.set_active(false);
        assert!(!select.has_selection());
        assert_eq!(select.clear(), None);
    }
}
