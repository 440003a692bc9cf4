//! A layer for polygon features, used for the loaded region.
//!
//! The features live in a [`FeatureSource`] that the layer shares with the interactions bound to
//! it, so edits made by the interactions show up in the layer immediately.

use crate::layers::{Layer, point_in_ring};
use crate::projection::{Extent, GeoPos, MapProjection};
use egui::{Color32, Mesh, Painter, Pos2, Response, Shape, Stroke, Vec2};
use log::warn;
use serde_json::{Map, Value as JsonValue};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// A closed ring of positions. The first position is not repeated at the end.
pub type Ring = Vec<GeoPos>;

/// A polygon with an exterior ring and optional holes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Polygon {
    /// The outer boundary.
    pub exterior: Ring,
    /// Holes cut out of the exterior.
    pub interiors: Vec<Ring>,
}

impl Polygon {
    /// A polygon without holes.
    pub fn new(exterior: Ring) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    /// The exterior followed by the holes.
    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }

    /// Ring by index, 0 being the exterior.
    pub fn ring(&self, index: usize) -> Option<&Ring> {
        match index {
            0 => Some(&self.exterior),
            i => self.interiors.get(i - 1),
        }
    }

    /// Mutable ring by index, 0 being the exterior.
    pub fn ring_mut(&mut self, index: usize) -> Option<&mut Ring> {
        match index {
            0 => Some(&mut self.exterior),
            i => self.interiors.get_mut(i - 1),
        }
    }

    /// Whether `pos` lies inside the exterior and outside all holes.
    pub fn contains(&self, pos: GeoPos) -> bool {
        point_in_ring(pos, &self.exterior)
            && !self.interiors.iter().any(|ring| point_in_ring(pos, ring))
    }
}

/// Identifier of a feature within its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u64);

/// A polygon feature with its attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorFeature {
    /// The geometry, one or more polygons.
    pub polygons: Vec<Polygon>,
    /// The attributes as returned by the service.
    pub properties: Map<String, JsonValue>,
}

impl VectorFeature {
    /// A feature with a single polygon and no attributes.
    pub fn from_polygon(polygon: Polygon) -> Self {
        Self {
            polygons: vec![polygon],
            properties: Map::new(),
        }
    }

    /// Whether any polygon of the feature contains `pos`.
    pub fn contains(&self, pos: GeoPos) -> bool {
        self.polygons.iter().any(|polygon| polygon.contains(pos))
    }

    /// The bounding box of all vertices.
    pub fn extent(&self) -> Option<Extent> {
        Extent::from_positions(
            self.polygons
                .iter()
                .flat_map(|polygon| polygon.rings())
                .flatten(),
        )
    }

    /// Moves every vertex by `delta` screen points at the given projection. Moving in screen
    /// space keeps the shape on the map unchanged.
    pub fn translate(&mut self, delta: Vec2, projection: &MapProjection) {
        for polygon in &mut self.polygons {
            for ring in std::iter::once(&mut polygon.exterior).chain(polygon.interiors.iter_mut()) {
                for pos in ring.iter_mut() {
                    *pos = projection.unproject(projection.project(*pos) + delta);
                }
            }
        }
    }
}

/// The features of a vector layer.
#[derive(Clone, Debug, Default)]
pub struct FeatureSource {
    features: Vec<(FeatureId, VectorFeature)>,
    next_id: u64,
    revision: u64,
}

/// A feature source shared between a layer and the interactions bound to it.
pub type SharedSource = Rc<RefCell<FeatureSource>>;

impl FeatureSource {
    /// A source holding the given features.
    pub fn from_features(features: impl IntoIterator<Item = VectorFeature>) -> Self {
        let mut source = Self::default();
        for feature in features {
            source.add(feature);
        }
        source
    }

    /// Adds a feature and returns its new identifier.
    pub fn add(&mut self, feature: VectorFeature) -> FeatureId {
        let id = FeatureId(self.next_id);
        self.next_id += 1;
        self.revision += 1;
        self.features.push((id, feature));
        id
    }

    /// Removes a feature.
    pub fn remove(&mut self, id: FeatureId) -> Option<VectorFeature> {
        let index = self.features.iter().position(|(fid, _)| *fid == id)?;
        self.revision += 1;
        Some(self.features.remove(index).1)
    }

    /// Gets a feature.
    pub fn get(&self, id: FeatureId) -> Option<&VectorFeature> {
        self.features
            .iter()
            .find(|(fid, _)| *fid == id)
            .map(|(_, feature)| feature)
    }

    /// Gets a feature for modification. Counts as a change of the source.
    pub fn get_mut(&mut self, id: FeatureId) -> Option<&mut VectorFeature> {
        let feature = self
            .features
            .iter_mut()
            .find(|(fid, _)| *fid == id)
            .map(|(_, feature)| feature)?;
        self.revision += 1;
        Some(feature)
    }

    /// All features in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (FeatureId, &VectorFeature)> {
        self.features.iter().map(|(id, feature)| (*id, feature))
    }

    /// The number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the source has no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// A counter that changes whenever the features change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The bounding box of all features.
    pub fn extent(&self) -> Option<Extent> {
        self.features
            .iter()
            .filter_map(|(_, feature)| feature.extent())
            .reduce(Extent::union)
    }

    /// The topmost feature containing `pos`.
    pub fn feature_at(&self, pos: GeoPos) -> Option<FeatureId> {
        self.iter()
            .rev()
            .find(|(_, feature)| feature.contains(pos))
            .map(|(id, _)| id)
    }
}

/// How the features of a vector layer are painted.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorStyle {
    /// Fill color of polygons.
    pub fill: Color32,
    /// Outline of polygons.
    pub stroke: Stroke,
    /// Radius of vertex handles shown while editing.
    pub vertex_radius: f32,
    /// Fill color of vertex handles.
    pub vertex_fill: Color32,
}

impl Default for VectorStyle {
    fn default() -> Self {
        Self {
            fill: Color32::from_rgba_unmultiplied(0, 185, 107, 60),
            stroke: Stroke::new(2.0, Color32::from_rgb(0, 185, 107)),
            vertex_radius: 5.0,
            vertex_fill: Color32::from_rgb(0, 128, 0),
        }
    }
}

/// A layer drawing the polygons of a feature source.
pub struct VectorLayer {
    source: SharedSource,
    /// How the features are painted.
    pub style: VectorStyle,
}

impl VectorLayer {
    /// Creates a layer owning the given source.
    pub fn new(source: FeatureSource) -> Self {
        Self::with_shared_source(Rc::new(RefCell::new(source)))
    }

    /// Creates a layer over a source that is already shared.
    pub fn with_shared_source(source: SharedSource) -> Self {
        Self {
            source,
            style: VectorStyle::default(),
        }
    }

    /// Sets the style.
    pub fn with_style(mut self, style: VectorStyle) -> Self {
        self.style = style;
        self
    }

    /// A handle to the layer's source, for binding interactions to it.
    pub fn source(&self) -> SharedSource {
        Rc::clone(&self.source)
    }

    /// The bounding box of all features of the layer.
    pub fn extent(&self) -> Option<Extent> {
        self.source.borrow().extent()
    }
}

impl Layer for VectorLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, _response: &Response, _projection: &MapProjection) -> bool {
        // Editing happens through the interactions bound to the source.
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        let source = self.source.borrow();
        for (_, feature) in source.iter() {
            for polygon in &feature.polygons {
                paint_polygon(painter, projection, polygon, self.style.fill, self.style.stroke);
            }
        }
    }
}

/// Fills and outlines a polygon. Rings with less than three vertices are skipped.
pub(crate) fn paint_polygon(
    painter: &Painter,
    projection: &MapProjection,
    polygon: &Polygon,
    fill: Color32,
    stroke: Stroke,
) {
    if polygon.exterior.len() < 3 {
        return;
    }

    let rings: Vec<Vec<Pos2>> = polygon
        .rings()
        .filter(|ring| ring.len() >= 3)
        .map(|ring| ring.iter().map(|p| projection.project(*p)).collect())
        .collect();

    if fill != Color32::TRANSPARENT {
        // Triangulate the exterior together with its holes for the fill.
        let mut flat_points = Vec::new();
        let mut hole_indices = Vec::new();
        for (i, ring) in rings.iter().enumerate() {
            if i > 0 {
                hole_indices.push(flat_points.len() / 2);
            }
            flat_points.extend(ring.iter().flat_map(|p| [p.x as f64, p.y as f64]));
        }

        match earcutr::earcut(&flat_points, &hole_indices, 2) {
            Ok(indices) => {
                let mut mesh = Mesh::default();
                mesh.vertices = rings
                    .iter()
                    .flatten()
                    .map(|p| egui::epaint::Vertex {
                        pos: *p,
                        uv: Default::default(),
                        color: fill,
                    })
                    .collect();
                mesh.indices = indices.into_iter().map(|i| i as u32).collect();
                painter.add(Shape::Mesh(mesh.into()));
            }
            Err(e) => warn!("Unable to triangulate polygon: {:?}", e),
        }
    }

    for ring in rings {
        painter.add(Shape::closed_line(ring, stroke));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Ring {
        [(min, min), (max, min), (max, max), (min, max)]
            .into_iter()
            .map(GeoPos::from)
            .collect()
    }

    #[test]
    fn polygon_with_hole_contains() {
        let polygon = Polygon {
            exterior: square(0.0, 10.0),
            interiors: vec![square(4.0, 6.0)],
        };
        assert!(polygon.contains((2.0, 2.0).into()));
        assert!(!polygon.contains((5.0, 5.0).into()));
        assert!(!polygon.contains((12.0, 5.0).into()));
        assert_eq!(polygon.rings().count(), 2);
        assert_eq!(polygon.ring(1), Some(&square(4.0, 6.0)));
        assert!(polygon.ring(2).is_none());
    }

    #[test]
    fn source_assigns_ids_and_tracks_revisions() {
        let mut source = FeatureSource::default();
        let a = source.add(VectorFeature::from_polygon(Polygon::new(square(0.0, 1.0))));
        let b = source.add(VectorFeature::from_polygon(Polygon::new(square(2.0, 3.0))));
        assert_ne!(a, b);
        assert_eq!(source.len(), 2);

        let revision = source.revision();
        assert!(source.get_mut(a).is_some());
        assert!(source.revision() > revision);

        assert!(source.remove(a).is_some());
        assert!(source.remove(a).is_none());
        assert!(source.get(a).is_none());
        assert!(source.get(b).is_some());
    }

    #[test]
    fn source_extent_and_hit_test() {
        let source = FeatureSource::from_features([
            VectorFeature::from_polygon(Polygon::new(square(0.0, 10.0))),
            VectorFeature::from_polygon(Polygon::new(square(5.0, 20.0))),
        ]);
        let extent = source.extent().unwrap();
        assert_eq!(extent.min, GeoPos { lon: 0.0, lat: 0.0 });
        assert_eq!(extent.max, GeoPos { lon: 20.0, lat: 20.0 });

        // The overlap belongs to the feature added last.
        assert_eq!(source.feature_at((7.0, 7.0).into()), Some(FeatureId(1)));
        assert_eq!(source.feature_at((1.0, 1.0).into()), Some(FeatureId(0)));
        assert_eq!(source.feature_at((30.0, 30.0).into()), None);

        assert!(FeatureSource::default().extent().is_none());
    }

    #[test]
    fn vector_layer_shares_its_source() {
        let layer = VectorLayer::new(FeatureSource::default());
        let source = layer.source();
        source
            .borrow_mut()
            .add(VectorFeature::from_polygon(Polygon::new(square(0.0, 1.0))));
        assert_eq!(layer.extent().unwrap().max, GeoPos { lon: 1.0, lat: 1.0 });
        assert!(layer.as_any().is::<VectorLayer>());
    }
}
