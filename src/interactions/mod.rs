//! Editing interactions on vector features.
//!
//! Interactions are registered on the [`Map`](crate::Map) next to the layers. Every frame the map
//! normalizes the pointer state into a [`PointerInput`] and hands it to the active interactions,
//! last added first. Interactions may rewrite the input for the ones after them (snapping does) or
//! consume it, in which case the map does not pan.

use egui::{CursorIcon, Modifiers, Painter, Pos2, Response, Vec2};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::layers::vector::FeatureId;
use crate::projection::MapProjection;

mod draw;
mod manager;
mod modify;
mod select;
mod snap;
mod translate;

pub use draw::Draw;
pub use manager::{DRAW, INTERACTION_KEYS, InteractionManager, MODIFY, SELECT, SNAP, TRANSLATE};
pub use modify::{Modify, VertexRef};
pub use select::Select;
pub use snap::Snap;
pub use translate::Translate;

/// Features currently held by a selection, shared with the interactions acting on it.
pub type SelectedFeatures = Rc<RefCell<Vec<FeatureId>>>;

/// The pointer state of one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointerInput {
    /// Pointer position in screen coordinates. Snapping may move it.
    pub pos: Option<Pos2>,
    /// Movement of the pointer while dragging.
    pub drag_delta: Vec2,
    /// The pointer is over the map.
    pub hovered: bool,
    /// A click without dragging ended this frame.
    pub clicked: bool,
    /// The second click of a double click ended this frame.
    pub double_clicked: bool,
    /// A drag started this frame.
    pub drag_started: bool,
    /// A drag is in progress.
    pub dragged: bool,
    /// A drag ended this frame.
    pub drag_stopped: bool,
    /// Keyboard modifiers held down.
    pub modifiers: Modifiers,
    /// Cursor an interaction asks for.
    pub cursor: Option<CursorIcon>,
}

impl PointerInput {
    /// Reads the pointer state off the map widget's response.
    pub fn from_response(response: &Response) -> Self {
        Self {
            pos: response.interact_pointer_pos().or_else(|| response.hover_pos()),
            drag_delta: response.drag_delta(),
            hovered: response.hovered(),
            clicked: response.clicked(),
            double_clicked: response.double_clicked(),
            drag_started: response.drag_started(),
            dragged: response.dragged(),
            drag_stopped: response.drag_stopped(),
            modifiers: response.ctx.input(|i| i.modifiers),
            cursor: None,
        }
    }
}

/// Something an interaction did that others may need to react to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionEvent {
    /// The selection changed.
    Select {
        /// Features that became selected.
        selected: Vec<FeatureId>,
        /// Features that were selected before and are not anymore.
        deselected: Vec<FeatureId>,
    },
    /// A vertex drag or vertex removal finished.
    ModifyEnd {
        /// The changed feature.
        feature: FeatureId,
    },
    /// A feature was moved.
    TranslateEnd {
        /// The moved feature.
        feature: FeatureId,
    },
    /// A new polygon was drawn and added to the source.
    DrawEnd {
        /// The new feature.
        feature: FeatureId,
    },
}

/// A trait for map interactions.
pub trait Interaction: Any {
    /// Handles the pointer input of a frame. Returns `true` if the input was handled and should
    /// not be processed further. Only called while the interaction is active.
    fn handle_input(
        &mut self,
        input: &mut PointerInput,
        projection: &MapProjection,
        events: &mut Vec<InteractionEvent>,
    ) -> bool;

    /// Draws feedback on top of the layers, like vertex handles or the polygon being drawn.
    fn draw(&self, _painter: &Painter, _projection: &MapProjection) {}

    /// Whether the interaction reacts to input.
    fn is_active(&self) -> bool;

    /// Activates or deactivates the interaction. Deactivating drops any unfinished gesture.
    fn set_active(&mut self, active: bool);

    /// Gets the interaction as a `dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Gets the interaction as a mutable `dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
