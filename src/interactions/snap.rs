use egui::Pos2;
use std::any::Any;

use super::{Interaction, InteractionEvent, PointerInput};
use crate::layers::closest_point_on_segment;
use crate::layers::vector::SharedSource;
use crate::projection::{GeoPos, MapProjection};

/// Vertices and edges of the source at the time of the last refresh.
#[derive(Debug, Default)]
struct SnapIndex {
    revision: Option<u64>,
    vertices: Vec<GeoPos>,
    segments: Vec<(GeoPos, GeoPos)>,
}

/// Pulls the pointer onto nearby vertices and edges of a source.
///
/// Snap does not consume input. It rewrites [`PointerInput::pos`] for the interactions handled
/// after it, so it has to be added last. Vertices win over edges. The index of snap targets is
/// not refreshed while a drag is in progress, so a dragged vertex never snaps to itself.
pub struct Snap {
    source: SharedSource,
    active: bool,
    index: SnapIndex,
    /// Snap distance in screen points.
    pub pixel_tolerance: f32,
}

impl Snap {
    /// Creates an inactive snap interaction on `source`.
    pub fn new(source: SharedSource) -> Self {
        Self {
            source,
            active: false,
            index: SnapIndex::default(),
            pixel_tolerance: 10.0,
        }
    }

    /// Rebuilds the index of snap targets if the source changed since the last refresh.
    pub fn refresh(&mut self) {
        let source = self.source.borrow();
        if self.index.revision == Some(source.revision()) {
            return;
        }

        let mut vertices = Vec::new();
        let mut segments = Vec::new();
        for (_, feature) in source.iter() {
            for ring in feature.polygons.iter().flat_map(|p| p.rings()) {
                vertices.extend(ring.iter().copied());
                segments.extend(
                    ring.iter()
                        .zip(ring.iter().cycle().skip(1))
                        .map(|(a, b)| (*a, *b)),
                );
            }
        }
        self.index = SnapIndex {
            revision: Some(source.revision()),
            vertices,
            segments,
        };
    }

    /// The snapped position for `screen_pos`, if a vertex or an edge is close enough.
    pub fn snap(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<Pos2> {
        let tolerance_sq = self.pixel_tolerance.powi(2);
        let nearest = |candidates: &mut dyn Iterator<Item = Pos2>| {
            candidates
                .map(|p| (p.distance_sq(screen_pos), p))
                .filter(|(d, _)| *d <= tolerance_sq)
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, p)| p)
        };

        let mut vertices = self.index.vertices.iter().map(|v| projection.project(*v));
        if let Some(vertex) = nearest(&mut vertices) {
            return Some(vertex);
        }

        let mut edges = self.index.segments.iter().map(|(a, b)| {
            closest_point_on_segment(screen_pos, projection.project(*a), projection.project(*b))
        });
        nearest(&mut edges)
    }
}

impl Interaction for Snap {
    fn handle_input(
        &mut self,
        input: &mut PointerInput,
        projection: &MapProjection,
        _events: &mut Vec<InteractionEvent>,
    ) -> bool {
        if !input.dragged {
            self.refresh();
        }
        if let Some(pos) = input.pos {
            if let Some(snapped) = self.snap(pos, projection) {
                input.pos = Some(snapped);
            }
        }
        false
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
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
    use crate::interactions::test_util::{projection, source, square};
    use egui::vec2;

    #[test]
    fn snaps_to_vertex_before_edge() {
        let mut snap = Snap::new(source());
        snap.refresh();
        let projection = projection();

        let corner = projection.project((1.0, 1.0).into());
        assert_eq!(snap.snap(corner + vec2(3.0, 4.0), &projection), Some(corner));

        // Close to the middle of the right edge, far from its vertices.
        let edge = projection.project((1.0, 0.0).into());
        let snapped = snap.snap(edge + vec2(6.0, 0.0), &projection).unwrap();
        assert!((snapped.x - edge.x).abs() < 1e-3);
        assert!((snapped.y - edge.y).abs() < 1e-3);

        assert_eq!(snap.snap(projection.project((0.0, 0.0).into()), &projection), None);
    }

    #[test]
    fn rewrites_pointer_without_consuming() {
        let mut snap = Snap::new(source());
        snap.set_active(true);
        let projection = projection();
        let corner = projection.project((-1.0, -1.0).into());
        let mut input = PointerInput {
            pos: Some(corner + vec2(2.0, 2.0)),
            hovered: true,
            ..Default::default()
        };
        assert!(!snap.handle_input(&mut input, &projection, &mut Vec::new()));
        assert_eq!(input.pos, Some(corner));
    }

    #[test]
    fn index_is_frozen_while_dragging() {
        let source = source();
        let mut snap = Snap::new(std::rc::Rc::clone(&source));
        let projection = projection();
        snap.refresh();

        source.borrow_mut().add(square(20.0, 0.0, 1.0));
        let new_corner = projection.project((21.0, 1.0).into());

        let mut dragging = PointerInput {
            pos: Some(new_corner + vec2(2.0, 0.0)),
            dragged: true,
            ..Default::default()
        };
        snap.handle_input(&mut dragging, &projection, &mut Vec::new());
        assert_eq!(dragging.pos, Some(new_corner + vec2(2.0, 0.0)));

        let mut hovering = PointerInput {
            pos: Some(new_corner + vec2(2.0, 0.0)),
            hovered: true,
            ..Default::default()
        };
        snap.handle_input(&mut hovering, &projection, &mut Vec::new());
        assert_eq!(hovering.pos, Some(new_corner));
    }
}
