use egui::{Color32, CursorIcon, Painter, Pos2};
use std::any::Any;

use super::{Interaction, InteractionEvent, PointerInput, SelectedFeatures};
use crate::layers::vector::{FeatureId, Ring, SharedSource};
use crate::layers::{dist_sq_to_segment, projection_factor, segments_intersect};
use crate::projection::MapProjection;

/// Points to a vertex (or the segment starting at it) of a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexRef {
    /// The feature.
    pub feature: FeatureId,
    /// Index of the polygon within the feature.
    pub polygon: usize,
    /// Index of the ring within the polygon, 0 being the exterior.
    pub ring: usize,
    /// Index of the vertex within the ring.
    pub vertex: usize,
}

/// Edits the vertices of the selected features.
///
/// Dragging a vertex moves it, dragging an edge inserts a new vertex there and moves that one,
/// alt-click on a vertex removes it. Rings keep at least three vertices, and moves that would
/// make a ring intersect itself are rejected.
pub struct Modify {
    source: SharedSource,
    features: SelectedFeatures,
    active: bool,
    dragged: Option<VertexRef>,
    /// Hit tolerance for vertices and edges, in screen points.
    pub pixel_tolerance: f32,
    /// Radius of the vertex handles.
    pub vertex_radius: f32,
    /// Fill color of the vertex handles.
    pub vertex_fill: Color32,
}

impl Modify {
    /// Creates an inactive modify interaction on the `features` of `source`.
    pub fn new(source: SharedSource, features: SelectedFeatures) -> Self {
        Self {
            source,
            features,
            active: false,
            dragged: None,
            pixel_tolerance: 10.0,
            vertex_radius: 5.0,
            vertex_fill: Color32::from_rgb(0, 128, 0),
        }
    }

    /// Visits the rings of the selected features, topmost feature first.
    fn for_each_ring(&self, mut f: impl FnMut(FeatureId, usize, usize, &Ring) -> bool) {
        let source = self.source.borrow();
        for id in self.features.borrow().iter().rev() {
            let Some(feature) = source.get(*id) else {
                continue;
            };
            for (polygon_idx, polygon) in feature.polygons.iter().enumerate() {
                for (ring_idx, ring) in polygon.rings().enumerate() {
                    if f(*id, polygon_idx, ring_idx, ring) {
                        return;
                    }
                }
            }
        }
    }

    /// Finds the vertex of a selected feature under `screen_pos`.
    pub fn find_vertex(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<VertexRef> {
        let tolerance_sq = self.pixel_tolerance.powi(2);
        let mut found = None;
        self.for_each_ring(|feature, polygon, ring_idx, ring| {
            found = ring
                .iter()
                .position(|p| projection.project(*p).distance_sq(screen_pos) < tolerance_sq)
                .map(|vertex| VertexRef {
                    feature,
                    polygon,
                    ring: ring_idx,
                    vertex,
                });
            found.is_some()
        });
        found
    }

    /// Finds the edge of a selected feature under `screen_pos`. The returned vertex is the one
    /// the edge starts at.
    pub fn find_segment(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<VertexRef> {
        let tolerance_sq = self.pixel_tolerance.powi(2);
        let mut found = None;
        self.for_each_ring(|feature, polygon, ring_idx, ring| {
            let n = ring.len();
            found = (0..n)
                .find(|&i| {
                    let p1 = projection.project(ring[i]);
                    let p2 = projection.project(ring[(i + 1) % n]);
                    dist_sq_to_segment(screen_pos, p1, p2) < tolerance_sq
                })
                .map(|vertex| VertexRef {
                    feature,
                    polygon,
                    ring: ring_idx,
                    vertex,
                });
            found.is_some()
        });
        found
    }

    /// Moves a vertex to `screen_pos`. Returns `false` if the vertex does not exist or the move
    /// would make its ring intersect itself.
    pub fn move_vertex(
        &mut self,
        vertex: VertexRef,
        screen_pos: Pos2,
        projection: &MapProjection,
    ) -> bool {
        let mut source = self.source.borrow_mut();
        let Some(ring) = source
            .get_mut(vertex.feature)
            .and_then(|f| f.polygons.get_mut(vertex.polygon))
            .and_then(|p| p.ring_mut(vertex.ring))
        else {
            return false;
        };
        if vertex.vertex >= ring.len() || !is_move_valid(ring, vertex.vertex, screen_pos, projection)
        {
            return false;
        }
        ring[vertex.vertex] = projection.unproject(screen_pos);
        true
    }

    /// Inserts a vertex on the edge starting at `segment`, at the point of the edge closest to
    /// `screen_pos`. Returns the new vertex.
    pub fn insert_vertex(
        &mut self,
        segment: VertexRef,
        screen_pos: Pos2,
        projection: &MapProjection,
    ) -> Option<VertexRef> {
        let mut source = self.source.borrow_mut();
        let ring = source
            .get_mut(segment.feature)?
            .polygons
            .get_mut(segment.polygon)?
            .ring_mut(segment.ring)?;
        let n = ring.len();
        if segment.vertex >= n {
            return None;
        }

        let p1 = projection.project(ring[segment.vertex]);
        let p2 = projection.project(ring[(segment.vertex + 1) % n]);
        let t = projection_factor(screen_pos, p1, p2);
        // Interpolate in screen space and unproject to get the new geographical position.
        ring.insert(segment.vertex + 1, projection.unproject(p1.lerp(p2, t)));

        Some(VertexRef {
            vertex: segment.vertex + 1,
            ..segment
        })
    }

    /// Removes a vertex. Returns `false` if the ring would be left with less than three vertices.
    pub fn delete_vertex(&mut self, vertex: VertexRef) -> bool {
        let mut source = self.source.borrow_mut();
        let Some(ring) = source
            .get_mut(vertex.feature)
            .and_then(|f| f.polygons.get_mut(vertex.polygon))
            .and_then(|p| p.ring_mut(vertex.ring))
        else {
            return false;
        };
        if ring.len() <= 3 || vertex.vertex >= ring.len() {
            return false;
        }
        ring.remove(vertex.vertex);
        true
    }
}

/// Checks if moving a vertex to a new position would cause the ring to self-intersect.
fn is_move_valid(ring: &Ring, index: usize, new_screen_pos: Pos2, projection: &MapProjection) -> bool {
    if ring.len() < 4 {
        // A triangle can't intersect itself.
        return true;
    }

    let screen_points: Vec<Pos2> = ring.iter().map(|p| projection.project(*p)).collect();
    let n = screen_points.len();
    let prev = (index + n - 1) % n;
    let next = (index + 1) % n;

    // The two edges that change with the move.
    let new_edge1 = (screen_points[prev], new_screen_pos);
    let new_edge2 = (new_screen_pos, screen_points[next]);

    for i in 0..n {
        let j = (i + 1) % n;
        if i == index || j == index {
            continue;
        }
        let edge = (screen_points[i], screen_points[j]);

        if i != prev && j != prev && segments_intersect(new_edge1.0, new_edge1.1, edge.0, edge.1) {
            return false;
        }
        if i != next && j != next && segments_intersect(new_edge2.0, new_edge2.1, edge.0, edge.1) {
            return false;
        }
    }
    true
}

impl Interaction for Modify {
    fn handle_input(
        &mut self,
        input: &mut PointerInput,
        projection: &MapProjection,
        events: &mut Vec<InteractionEvent>,
    ) -> bool {
        let Some(pos) = input.pos else {
            return self.dragged.is_some();
        };

        if input.clicked && input.modifiers.alt {
            if let Some(vertex) = self.find_vertex(pos, projection) {
                if self.delete_vertex(vertex) {
                    events.push(InteractionEvent::ModifyEnd {
                        feature: vertex.feature,
                    });
                }
                return true;
            }
        }

        if input.drag_started {
            self.dragged = match self.find_vertex(pos, projection) {
                Some(vertex) => Some(vertex),
                None => self
                    .find_segment(pos, projection)
                    .and_then(|segment| self.insert_vertex(segment, pos, projection)),
            };
        }

        if input.dragged {
            if let Some(vertex) = self.dragged {
                self.move_vertex(vertex, pos, projection);
            }
        }

        if input.drag_stopped {
            if let Some(vertex) = self.dragged.take() {
                events.push(InteractionEvent::ModifyEnd {
                    feature: vertex.feature,
                });
                return true;
            }
        }

        if self.dragged.is_some() {
            input.cursor = Some(CursorIcon::Grabbing);
            true
        } else {
            if input.hovered && self.find_vertex(pos, projection).is_some() {
                input.cursor = Some(CursorIcon::Grab);
            }
            false
        }
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        if !self.active {
            return;
        }
        let source = self.source.borrow();
        for id in self.features.borrow().iter() {
            let Some(feature) = source.get(*id) else {
                continue;
            };
            for pos in feature.polygons.iter().flat_map(|p| p.rings()).flatten() {
                painter.circle_filled(projection.project(*pos), self.vertex_radius, self.vertex_fill);
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.dragged = None;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
