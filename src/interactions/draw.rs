use egui::{Color32, CursorIcon, Painter, Pos2, Shape, Stroke};
use std::any::Any;

use super::{Interaction, InteractionEvent, PointerInput};
use crate::layers::vector::{FeatureId, Polygon, SharedSource, VectorFeature};
use crate::projection::{GeoPos, MapProjection};

// Freehand points closer than this to the previous one are dropped.
const FREEHAND_MIN_DISTANCE: f32 = 2.0;

/// Draws new polygons into a source.
///
/// Every click adds a vertex. A double click, or a click on the first vertex, finishes the
/// polygon. With `freehand` set, dragging traces the outline and releasing finishes it. Finished
/// polygons with less than three vertices are discarded.
pub struct Draw {
    source: SharedSource,
    active: bool,
    sketch: Vec<GeoPos>,
    tracing: bool,
    hover: Option<GeoPos>,
    /// Whether dragging traces the outline.
    pub freehand: bool,
    /// Distance to the first vertex, in screen points, at which a click closes the polygon.
    pub snap_tolerance: f32,
    /// Outline of the polygon being drawn.
    pub stroke: Stroke,
    /// Color of the vertices of the polygon being drawn.
    pub vertex_fill: Color32,
}

impl Draw {
    /// Creates an inactive polygon draw interaction adding to `source`.
    pub fn new(source: SharedSource) -> Self {
        Self {
            source,
            active: false,
            sketch: Vec::new(),
            tracing: false,
            hover: None,
            freehand: true,
            snap_tolerance: 12.0,
            stroke: Stroke::new(2.0, Color32::from_rgb(51, 153, 204)),
            vertex_fill: Color32::WHITE,
        }
    }

    /// The vertices of the unfinished polygon.
    pub fn sketch(&self) -> &[GeoPos] {
        &self.sketch
    }

    /// Adds a vertex to the unfinished polygon.
    pub fn add_vertex(&mut self, pos: GeoPos) {
        self.sketch.push(pos);
    }

    /// Finishes the polygon. It is added to the source if it has at least three vertices,
    /// otherwise dropped.
    pub fn finish(&mut self) -> Option<FeatureId> {
        self.tracing = false;
        let ring = std::mem::take(&mut self.sketch);
        if ring.len() < 3 {
            return None;
        }
        let id = self
            .source
            .borrow_mut()
            .add(VectorFeature::from_polygon(Polygon::new(ring)));
        Some(id)
    }

    /// A copy of a feature of the source polygons are drawn into.
    pub fn source_feature(&self, id: FeatureId) -> Option<VectorFeature> {
        self.source.borrow().get(id).cloned()
    }

    /// Drops the unfinished polygon.
    pub fn abort(&mut self) {
        self.sketch.clear();
        self.tracing = false;
        self.hover = None;
    }

    fn closes_sketch(&self, screen_pos: Pos2, projection: &MapProjection) -> bool {
        self.sketch.len() >= 3
            && self.sketch.first().is_some_and(|first| {
                projection.project(*first).distance(screen_pos) <= self.snap_tolerance
            })
    }

    fn finish_into(&mut self, events: &mut Vec<InteractionEvent>) {
        if let Some(feature) = self.finish() {
            events.push(InteractionEvent::DrawEnd { feature });
        }
    }
}

impl Interaction for Draw {
    fn handle_input(
        &mut self,
        input: &mut PointerInput,
        projection: &MapProjection,
        events: &mut Vec<InteractionEvent>,
    ) -> bool {
        let Some(pos) = input.pos else {
            self.hover = None;
            return self.tracing;
        };

        // A click on an existing feature goes on to selection instead of starting a polygon.
        if self.sketch.is_empty()
            && !self.tracing
            && (input.clicked || input.double_clicked)
            && self
                .source
                .borrow()
                .feature_at(projection.unproject(pos))
                .is_some()
        {
            self.hover = None;
            return false;
        }

        if self.freehand && input.drag_started {
            self.sketch.clear();
            self.sketch.push(projection.unproject(pos));
            self.tracing = true;
        }

        if self.tracing && input.dragged {
            let far_enough = self.sketch.last().is_none_or(|last| {
                projection.project(*last).distance(pos) >= FREEHAND_MIN_DISTANCE
            });
            if far_enough {
                self.sketch.push(projection.unproject(pos));
            }
        }

        if self.tracing && input.drag_stopped {
            self.finish_into(events);
            return true;
        }

        if input.double_clicked {
            // The first click of the double click already placed the last vertex.
            self.finish_into(events);
        } else if input.clicked {
            if self.closes_sketch(pos, projection) {
                self.finish_into(events);
            } else {
                self.add_vertex(projection.unproject(pos));
            }
        }

        self.hover = input.hovered.then(|| projection.unproject(pos));
        if input.hovered {
            input.cursor = Some(CursorIcon::Crosshair);
        }

        // While drawing, all input over the map is ours, so the map does not pan.
        input.hovered || self.tracing
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        if self.sketch.is_empty() {
            return;
        }

        let mut points: Vec<Pos2> = self.sketch.iter().map(|p| projection.project(*p)).collect();
        if !self.tracing {
            if let Some(hover) = self.hover {
                points.push(projection.project(hover));
            }
        }
        if points.len() > 1 {
            painter.add(Shape::line(points.clone(), self.stroke));
        }

        for point in points.iter().take(self.sketch.len()) {
            painter.circle(*point, 4.0, self.vertex_fill, self.stroke);
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.abort();
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

    fn click(pos: Pos2) -> PointerInput {
        PointerInput {
            pos: Some(pos),
            hovered: true,
            clicked: true,
            ..Default::default()
        }
    }

    #[test]
    fn clicks_then_double_click_add_polygon() {
        let source = source();
        let mut draw = Draw::new(std::rc::Rc::clone(&source));
        draw.set_active(true);
        let projection = projection();
        let mut events = Vec::new();

        for pos in [(10.0, 10.0), (12.0, 10.0), (12.0, 12.0)] {
            let mut input = click(projection.project(pos.into()));
            assert!(draw.handle_input(&mut input, &projection, &mut events));
        }
        assert_eq!(draw.sketch().len(), 3);

        let mut input = click(projection.project((12.0, 12.0).into()));
        input.double_clicked = true;
        draw.handle_input(&mut input, &projection, &mut events);

        assert_eq!(
            events,
            vec![InteractionEvent::DrawEnd {
                feature: FeatureId(2)
            }]
        );
        assert!(draw.sketch().is_empty());
        assert_eq!(source.borrow().len(), 3);
        assert_eq!(
            source.borrow().get(FeatureId(2)).unwrap().polygons[0]
                .exterior
                .len(),
            3
        );
    }

    #[test]
    fn click_on_first_vertex_closes() {
        let source = source();
        let mut draw = Draw::new(std::rc::Rc::clone(&source));
        let projection = projection();
        let mut events = Vec::new();

        for pos in [(10.0, 10.0), (12.0, 10.0), (12.0, 12.0)] {
            draw.handle_input(&mut click(projection.project(pos.into())), &projection, &mut events);
        }
        // Within the snap tolerance of the first vertex.
        let near_first = projection.project((10.0, 10.0).into()) + vec2(5.0, 5.0);
        draw.handle_input(&mut click(near_first), &projection, &mut events);

        assert_eq!(events.len(), 1);
        assert_eq!(source.borrow().len(), 3);
    }

    #[test]
    fn too_few_vertices_are_dropped() {
        let source = source();
        let mut draw = Draw::new(std::rc::Rc::clone(&source));
        draw.add_vertex((0.0, 0.0).into());
        draw.add_vertex((1.0, 0.0).into());
        assert_eq!(draw.finish(), None);
        assert_eq!(source.borrow().len(), 2);
    }

    #[test]
    fn freehand_drag_traces_ring() {
        let source = source();
        let mut draw = Draw::new(std::rc::Rc::clone(&source));
        let projection = projection();
        let mut events = Vec::new();
        let start = projection.project((10.0, 10.0).into());

        let mut input = PointerInput {
            pos: Some(start),
            hovered: true,
            drag_started: true,
            dragged: true,
            ..Default::default()
        };
        draw.handle_input(&mut input, &projection, &mut events);
        for offset in [vec2(40.0, 0.0), vec2(40.0, 40.0), vec2(0.0, 40.0)] {
            let mut input = PointerInput {
                pos: Some(start + offset),
                hovered: true,
                dragged: true,
                ..Default::default()
            };
            draw.handle_input(&mut input, &projection, &mut events);
        }
        assert_eq!(draw.sketch().len(), 4);

        let mut input = PointerInput {
            pos: Some(start + vec2(0.0, 40.0)),
            hovered: true,
            drag_stopped: true,
            ..Default::default()
        };
        assert!(draw.handle_input(&mut input, &projection, &mut events));
        assert_eq!(events.len(), 1);
        assert_eq!(source.borrow().len(), 3);
    }

    #[test]
    fn click_on_feature_is_left_to_selection() {
        let source = source();
        let mut draw = Draw::new(std::rc::Rc::clone(&source));
        draw.set_active(true);
        let projection = projection();
        let mut events = Vec::new();

        let mut input = click(projection.project((0.0, 0.0).into()));
        assert!(!draw.handle_input(&mut input, &projection, &mut events));
        assert!(draw.sketch().is_empty());

        // Once a polygon is started, clicks inside features add vertices.
        draw.handle_input(&mut click(projection.project((3.0, 3.0).into())), &projection, &mut events);
        let mut input = click(projection.project((5.0, 0.0).into()));
        assert!(draw.handle_input(&mut input, &projection, &mut events));
        assert_eq!(draw.sketch().len(), 2);
        assert!(events.is_empty());
    }

    #[test]
    fn deactivating_drops_sketch() {
        let mut draw = Draw::new(source());
        draw.set_active(true);
        draw.add_vertex((0.0, 0.0).into());
        draw.set_active(false);
        assert!(draw.sketch().is_empty());
    }
}
