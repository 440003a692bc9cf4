use egui::{CursorIcon, Pos2, Vec2};
use std::any::Any;

use super::{Interaction, InteractionEvent, PointerInput, SelectedFeatures};
use crate::layers::vector::{FeatureId, SharedSource};
use crate::projection::MapProjection;

/// Moves selected features by dragging their interior.
///
/// The area within `pixel_tolerance` of a vertex is left to [`Modify`](super::Modify), so a drag
/// on a vertex reshapes the feature instead of moving it.
pub struct Translate {
    source: SharedSource,
    features: SelectedFeatures,
    active: bool,
    dragging: Option<FeatureId>,
    /// Distance to the vertices, in screen points, below which a drag does not move the feature.
    pub pixel_tolerance: f32,
}

impl Translate {
    /// Creates an inactive translate interaction on the `features` of `source`.
    pub fn new(source: SharedSource, features: SelectedFeatures) -> Self {
        Self {
            source,
            features,
            active: false,
            dragging: None,
            pixel_tolerance: 10.0,
        }
    }

    /// The topmost selected feature whose interior is under `screen_pos`.
    pub fn feature_at(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<FeatureId> {
        let pos = projection.unproject(screen_pos);
        let tolerance_sq = self.pixel_tolerance.powi(2);
        let source = self.source.borrow();

        self.features.borrow().iter().rev().copied().find(|id| {
            source.get(*id).is_some_and(|feature| {
                feature.contains(pos)
                    && !feature
                        .polygons
                        .iter()
                        .flat_map(|p| p.rings())
                        .flatten()
                        .any(|v| projection.project(*v).distance_sq(screen_pos) < tolerance_sq)
            })
        })
    }

    /// Moves a feature by `delta` screen points.
    pub fn translate_feature(
        &mut self,
        id: FeatureId,
        delta: Vec2,
        projection: &MapProjection,
    ) -> bool {
        match self.source.borrow_mut().get_mut(id) {
            Some(feature) => {
                feature.translate(delta, projection);
                true
            }
            None => false,
        }
    }
}

impl Interaction for Translate {
    fn handle_input(
        &mut self,
        input: &mut PointerInput,
        projection: &MapProjection,
        events: &mut Vec<InteractionEvent>,
    ) -> bool {
        if input.drag_started {
            self.dragging = input.pos.and_then(|pos| self.feature_at(pos, projection));
        }

        if input.dragged {
            if let Some(id) = self.dragging {
                if input.drag_delta != Vec2::ZERO {
                    self.translate_feature(id, input.drag_delta, projection);
                }
            }
        }

        if input.drag_stopped {
            if let Some(id) = self.dragging.take() {
                events.push(InteractionEvent::TranslateEnd { feature: id });
                return true;
            }
        }

        if self.dragging.is_some() {
            input.cursor = Some(CursorIcon::Grabbing);
            return true;
        }

        if input.hovered && input.cursor.is_none() {
            if let Some(pos) = input.pos {
                if self.feature_at(pos, projection).is_some() {
                    input.cursor = Some(CursorIcon::Move);
                }
            }
        }
        false
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.dragging = None;
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
    use egui::vec2;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn translate_first() -> (Translate, SharedSource) {
        let source = source();
        let features = Rc::new(RefCell::new(vec![FeatureId(0)]));
        (Translate::new(Rc::clone(&source), features), source)
    }

    #[test]
    fn interior_of_selected_feature_is_grabbed() {
        let (translate, _) = translate_first();
        let projection = projection();

        let center = projection.project((0.0, 0.0).into());
        assert_eq!(translate.feature_at(center, &projection), Some(FeatureId(0)));

        // Vertices belong to the modify interaction.
        let corner = projection.project((1.0, 1.0).into());
        assert_eq!(translate.feature_at(corner, &projection), None);

        // Not selected.
        let other = projection.project((5.0, 0.0).into());
        assert_eq!(translate.feature_at(other, &projection), None);
    }

    #[test]
    fn drag_moves_whole_feature() {
        let (mut translate, source) = translate_first();
        translate.set_active(true);
        let projection = projection();
        let before = source.borrow().get(FeatureId(0)).unwrap().extent().unwrap();

        let start = projection.project((0.0, 0.0).into());
        let mut events = Vec::new();
        let mut input = PointerInput {
            pos: Some(start),
            hovered: true,
            drag_started: true,
            dragged: true,
            ..Default::default()
        };
        assert!(translate.handle_input(&mut input, &projection, &mut events));

        let mut input = PointerInput {
            pos: Some(start + vec2(50.0, 0.0)),
            drag_delta: vec2(50.0, 0.0),
            hovered: true,
            dragged: true,
            ..Default::default()
        };
        assert!(translate.handle_input(&mut input, &projection, &mut events));

        let mut input = PointerInput {
            pos: Some(start + vec2(50.0, 0.0)),
            hovered: true,
            drag_stopped: true,
            ..Default::default()
        };
        assert!(translate.handle_input(&mut input, &projection, &mut events));
        assert_eq!(
            events,
            vec![InteractionEvent::TranslateEnd {
                feature: FeatureId(0)
            }]
        );

        let after = source.borrow().get(FeatureId(0)).unwrap().extent().unwrap();
        assert!(after.min.lon > before.min.lon);
        assert!((after.min.lat - before.min.lat).abs() < 1e-4);
        // The other feature stays in place.
        let other = source.borrow().get(FeatureId(1)).unwrap().extent().unwrap();
        assert!((other.min.lon - 4.0).abs() < 1e-9);
    }
}
