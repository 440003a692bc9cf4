//! Layers for the map view that can handle input, and draw on top of the map view different kinds of data.
//!
use egui::{Painter, Pos2, Response};
use std::any::Any;

use crate::config::Attribution;
use crate::projection::{GeoPos, MapProjection};

/// GeoJSON conversion of vector features.
pub mod geojson;

/// Raster tile layer
pub mod tile;

/// Vector feature layer
pub mod vector;

/// A trait for map layers.
pub trait Layer: Any {
    /// Handles user input for the layer. Returns `true` if the input was handled and should not be
    /// processed further by the map.
    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool;

    /// Draws the layer.
    fn draw(&self, painter: &Painter, projection: &MapProjection);

    /// The attribution to show while the layer is on the map.
    fn attribution(&self) -> Option<&Attribution> {
        None
    }

    /// Gets the layer as a `dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Gets the layer as a mutable `dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Calculates the squared distance from a point to a line segment.
pub(crate) fn dist_sq_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    p.distance_sq(closest_point_on_segment(p, a, b))
}

/// The point of the segment `a`-`b` closest to `p`.
pub(crate) fn closest_point_on_segment(p: Pos2, a: Pos2, b: Pos2) -> Pos2 {
    a.lerp(b, projection_factor(p, a, b))
}

/// Calculates the projection factor of a point onto a line segment.
/// Returns a value `t` from 0.0 to 1.0.
pub(crate) fn projection_factor(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let ap = p - a;
    let l2 = ab.length_sq();

    if l2 == 0.0 {
        return 0.0;
    }

    // Project point p onto the line defined by a and b.
    (ap.dot(ab) / l2).clamp(0.0, 1.0)
}

/// Checks if two line segments intersect.
pub(crate) fn segments_intersect(p1: Pos2, q1: Pos2, p2: Pos2, q2: Pos2) -> bool {
    fn orientation(p: Pos2, q: Pos2, r: Pos2) -> i8 {
        let val = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
        if val.abs() < 1e-6 {
            0 // Collinear
        } else if val > 0.0 {
            1 // Clockwise
        } else {
            -1 // Counter-clockwise
        }
    }

    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    // Collinear overlaps are not reported, touching a neighbour edge is not a crossing.
    o1 != o2 && o3 != o4
}

/// Even-odd test of a position against a ring. The ring does not repeat its first vertex.
pub(crate) fn point_in_ring(pos: GeoPos, ring: &[GeoPos]) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.lat > pos.lat) != (b.lat > pos.lat)
            && pos.lon < (b.lon - a.lon) * (pos.lat - a.lat) / (b.lat - a.lat) + a.lon
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
