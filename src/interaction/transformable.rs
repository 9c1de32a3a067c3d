/// Move / resize-rotate controller for the active decoration
///
/// State machine:
///
///   idle ──pointer_down(body)────────► Move ─────────┐
///   idle ──resize_rotate_down(handle)─► ResizeRotate ─┤
///   ◄──────────────────── pointer_up ─────────────────┘
///
/// Pointers arrive in screen pixels; decorations live in natural template
/// pixels. Every move frame is computed from the drag-start snapshot, never
/// from the previous frame, so rounding never accumulates. Releasing the
/// pointer always commits.

use cgmath::{InnerSpace, Vector2};
use tracing::trace;

use crate::config::InteractionTuning;
use crate::geometry::{Point, PreviewScaling};
use crate::state::decoration::{
    DecorationId, DecorationKind, DecorationMut, DecorationRef, DecorationSet, TextMeasurer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Move,
    ResizeRotate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSelection {
    pub id: DecorationId,
    pub kind: DecorationKind,
    pub action: Option<Action>,
}

/// Pointer-down snapshot, valid while an action runs
#[derive(Debug, Clone, Copy, PartialEq)]
enum DragStart {
    Move {
        pointer: Point,
        initial_x: f32,
        initial_y: f32,
    },
    ResizeRotate {
        /// Rotation pivot in screen pixels
        center: Point,
        initial_width: f32,
        initial_height: f32,
        initial_rotation: f32,
        /// Pointer-to-center distance in natural pixels
        initial_distance: f32,
        initial_font_size: f32,
    },
}

/// Snap guide lines currently shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Guides {
    /// Item is horizontally centered
    pub vertical: bool,
    /// Item rotation snapped to 0°
    pub horizontal: bool,
}

#[derive(Debug, Default)]
pub struct TransformableEngine {
    tuning: InteractionTuning,
    active: Option<ActiveSelection>,
    drag: Option<DragStart>,
    guides: Guides,
    /// Text box whose content is being edited in place
    editing: Option<DecorationId>,
}

impl TransformableEngine {
    pub fn new(tuning: InteractionTuning) -> Self {
        Self { tuning, ..Default::default() }
    }

    pub fn active(&self) -> Option<ActiveSelection> {
        self.active
    }

    pub fn guides(&self) -> Guides {
        self.guides
    }

    pub fn editing(&self) -> Option<DecorationId> {
        self.editing
    }

    /// Enter or leave in-place text editing
    pub fn set_editing(&mut self, id: Option<DecorationId>) {
        self.editing = id;
    }

    /// Pointer pressed on a decoration body. Returns whether the selection changed.
    pub fn pointer_down(&mut self, id: DecorationId, decorations: &DecorationSet, pointer: Point) -> bool {
        if self.drag.is_some() || self.editing == Some(id) {
            return false;
        }
        let Some(item) = decorations.get(id) else {
            return false;
        };

        let changed = self.active.map(|a| a.id) != Some(id);
        let placement = item.placement();
        self.active = Some(ActiveSelection { id, kind: item.kind(), action: Some(Action::Move) });
        self.drag = Some(DragStart::Move {
            pointer,
            initial_x: placement.x,
            initial_y: placement.y,
        });
        changed
    }

    /// Pointer pressed on the resize-rotate handle of a decoration
    pub fn resize_rotate_down(
        &mut self,
        id: DecorationId,
        decorations: &DecorationSet,
        pointer: Point,
        scaling: &PreviewScaling,
    ) -> bool {
        if self.drag.is_some() {
            return false;
        }
        let Some(item) = decorations.get(id) else {
            return false;
        };

        let changed = self.active.map(|a| a.id) != Some(id);
        let placement = item.placement();
        let center = scaling.to_screen(placement.center());
        let initial_font_size = match item {
            DecorationRef::Text(t) => t.font_size,
            DecorationRef::Sticker(_) => 0.0,
        };

        self.active = Some(ActiveSelection { id, kind: item.kind(), action: Some(Action::ResizeRotate) });
        self.drag = Some(DragStart::ResizeRotate {
            center,
            initial_width: placement.width,
            initial_height: placement.height,
            initial_rotation: placement.rotation,
            initial_distance: (pointer - center).magnitude() / scaling.scale,
            initial_font_size,
        });
        changed
    }

    /// Pointer moved with the button held. Returns whether the active item changed.
    pub fn pointer_move(
        &mut self,
        decorations: &mut DecorationSet,
        pointer: Point,
        scaling: &PreviewScaling,
        measurer: &dyn TextMeasurer,
    ) -> bool {
        let (Some(active), Some(drag)) = (self.active, self.drag) else {
            return false;
        };
        let Some(mut item) = decorations.get_mut(active.id) else {
            // Deleted mid-drag
            self.active = None;
            self.drag = None;
            self.guides = Guides::default();
            return false;
        };

        match drag {
            DragStart::Move { pointer: start, initial_x, initial_y } => {
                let placement = item.placement_mut();
                placement.x = initial_x + (pointer.x - start.x) / scaling.scale;
                placement.y = initial_y + (pointer.y - start.y) / scaling.scale;

                let screen_center_x =
                    scaling.offset_x + (placement.x + placement.width / 2.0) * scaling.scale;
                if (screen_center_x - scaling.center_x()).abs() < self.tuning.center_snap_px {
                    placement.x = scaling.natural_width() / 2.0 - placement.width / 2.0;
                    self.guides.vertical = true;
                } else {
                    self.guides.vertical = false;
                }
            }
            DragStart::ResizeRotate {
                center,
                initial_width,
                initial_height,
                initial_rotation,
                initial_distance,
                initial_font_size,
            } => {
                let v: Vector2<f32> = pointer - center;
                let distance = v.magnitude() / scaling.scale;

                let rotation = if distance > f32::EPSILON {
                    let pointer_angle = v.y.atan2(v.x).to_degrees();
                    let diagonal_angle = initial_height.atan2(initial_width).to_degrees();
                    normalize_degrees(pointer_angle - diagonal_angle)
                } else {
                    initial_rotation
                };
                let (rotation, snapped) = if rotation.abs() < self.tuning.rotation_snap_deg {
                    (0.0, true)
                } else {
                    (rotation, false)
                };
                self.guides.horizontal = snapped;

                let factor = if initial_distance > f32::EPSILON { distance / initial_distance } else { 1.0 };
                let pivot = scaling.to_natural(center);

                match &mut item {
                    DecorationMut::Sticker(sticker) => {
                        let floor = self.tuning.min_sticker_px / scaling.scale;
                        sticker.placement.width = (initial_width * factor).max(floor);
                        sticker.placement.height = (initial_height * factor).max(floor);
                    }
                    DecorationMut::Text(text) => {
                        text.font_size = (initial_font_size * factor).max(self.tuning.min_font_size);
                        text.remeasure(measurer);
                    }
                }
                let placement = item.placement_mut();
                placement.rotation = rotation;
                placement.recenter(pivot);
            }
        }
        trace!(id = active.id.0, "transform frame");
        true
    }

    /// Commit the current action; the item stays selected
    pub fn pointer_up(&mut self) {
        if let Some(active) = &mut self.active {
            active.action = None;
        }
        self.drag = None;
        self.guides = Guides::default();
    }

    /// Click on empty canvas. Ignored while an action is running.
    pub fn deselect(&mut self) -> bool {
        if self.drag.is_some() || self.active.is_none() {
            return false;
        }
        self.active = None;
        self.editing = None;
        true
    }

    /// Forget selection state, e.g. after the active item was deleted
    pub fn reset(&mut self) {
        self.active = None;
        self.drag = None;
        self.editing = None;
        self.guides = Guides::default();
    }
}

/// Wrap into (-180, 180]
fn normalize_degrees(deg: f32) -> f32 {
    let r = deg.rem_euclid(360.0);
    if r > 180.0 {
        r - 360.0
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::state::decoration::EstimatedTextMeasurer;

    fn identity() -> PreviewScaling {
        PreviewScaling::contain(Size::new(1000.0, 1000.0), Size::new(1000.0, 1000.0)).unwrap()
    }

    fn engine() -> TransformableEngine {
        TransformableEngine::new(InteractionTuning::default())
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn resize_doubles_size_around_fixed_center() {
        let mut set = DecorationSet::new();
        let id = set.push_sticker_at(1, 150.0, 150.0, 100.0, 100.0);
        let scaling = identity();
        let mut e = engine();

        e.resize_rotate_down(id, &set, Point::new(250.0, 250.0), &scaling);
        assert!(e.pointer_move(&mut set, Point::new(300.0, 300.0), &scaling, &EstimatedTextMeasurer));

        let p = *set.get(id).unwrap().placement();
        assert!(close(p.width, 200.0) && close(p.height, 200.0));
        assert!(close(p.center().x, 200.0) && close(p.center().y, 200.0));
        assert_eq!(p.rotation, 0.0);
    }

    #[test]
    fn resize_works_through_letterboxed_scaling() {
        // Natural 2000x1000 in a 1000x1000 box: scale 0.5, offset_y 250
        let scaling = PreviewScaling::contain(Size::new(2000.0, 1000.0), Size::new(1000.0, 1000.0)).unwrap();
        let mut set = DecorationSet::new();
        let id = set.push_sticker_at(1, 900.0, 400.0, 200.0, 200.0);
        let mut e = engine();

        // Center (1000, 500) natural is (500, 500) on screen; handle corner at (550, 550)
        e.resize_rotate_down(id, &set, Point::new(550.0, 550.0), &scaling);
        e.pointer_move(&mut set, Point::new(575.0, 575.0), &scaling, &EstimatedTextMeasurer);

        let p = *set.get(id).unwrap().placement();
        assert!(close(p.width, 300.0));
        assert!(close(p.center().x, 1000.0) && close(p.center().y, 500.0));
    }

    #[test]
    fn sticker_never_shrinks_below_floor() {
        let mut set = DecorationSet::new();
        let id = set.push_sticker_at(1, 150.0, 150.0, 100.0, 100.0);
        let scaling = identity();
        let mut e = engine();

        e.resize_rotate_down(id, &set, Point::new(250.0, 250.0), &scaling);
        e.pointer_move(&mut set, Point::new(201.0, 201.0), &scaling, &EstimatedTextMeasurer);
        assert_eq!(set.get(id).unwrap().placement().width, 20.0);
    }

    #[test]
    fn text_resize_scales_font_and_remeasures() {
        let mut set = DecorationSet::new();
        let id = set.push_text_at(1, "abcd", 100.0, 100.0, 40.0);
        let scaling = identity();
        let mut e = engine();
        let start = *set.get(id).unwrap().placement();
        let c = start.center();

        e.resize_rotate_down(id, &set, Point::new(start.x + start.width, start.y + start.height), &scaling);
        e.pointer_move(
            &mut set,
            Point::new(c.x + start.width * 0.75, c.y + start.height * 0.75),
            &scaling,
            &EstimatedTextMeasurer,
        );

        let Some(DecorationRef::Text(t)) = set.get(id) else {
            panic!("text expected");
        };
        assert!(close(t.font_size, 60.0));
        assert!(close(t.placement.width, 4.0 * 60.0 * 0.6));
        assert!(close(t.placement.center().x, c.x));
    }

    #[test]
    fn text_font_has_a_floor() {
        let mut set = DecorationSet::new();
        let id = set.push_text_at(1, "ab", 100.0, 100.0, 40.0);
        let scaling = identity();
        let mut e = engine();
        let p = *set.get(id).unwrap().placement();

        e.resize_rotate_down(id, &set, Point::new(p.x + p.width, p.y + p.height), &scaling);
        e.pointer_move(&mut set, Point::new(p.center().x + 0.5, p.center().y + 0.5), &scaling, &EstimatedTextMeasurer);
        let Some(DecorationRef::Text(t)) = set.get(id) else {
            panic!("text expected");
        };
        assert_eq!(t.font_size, 10.0);
    }

    #[test]
    fn rotation_follows_handle_and_snaps_near_zero() {
        let mut set = DecorationSet::new();
        let id = set.push_sticker_at(1, 150.0, 150.0, 100.0, 100.0);
        let scaling = identity();
        let mut e = engine();
        e.resize_rotate_down(id, &set, Point::new(250.0, 250.0), &scaling);

        // Handle straight below the center: 90° - 45° diagonal
        e.pointer_move(&mut set, Point::new(200.0, 300.0), &scaling, &EstimatedTextMeasurer);
        assert!(close(set.get(id).unwrap().placement().rotation, 45.0));
        assert!(!e.guides().horizontal);

        // 3° off the diagonal snaps back to exactly 0
        let angle = (45.0f32 + 3.0).to_radians();
        let pointer = Point::new(200.0 + 70.0 * angle.cos(), 200.0 + 70.0 * angle.sin());
        e.pointer_move(&mut set, pointer, &scaling, &EstimatedTextMeasurer);
        assert_eq!(set.get(id).unwrap().placement().rotation, 0.0);
        assert!(e.guides().horizontal);

        e.pointer_up();
        assert_eq!(e.guides(), Guides::default());
    }

    #[test]
    fn move_applies_delta_from_start_snapshot() {
        let mut set = DecorationSet::new();
        let id = set.push_sticker_at(1, 10.0, 10.0, 50.0, 50.0);
        let scaling = PreviewScaling::contain(Size::new(2000.0, 2000.0), Size::new(1000.0, 1000.0)).unwrap();
        let mut e = engine();

        assert!(e.pointer_down(id, &set, Point::new(100.0, 100.0)));
        e.pointer_move(&mut set, Point::new(110.0, 105.0), &scaling, &EstimatedTextMeasurer);
        e.pointer_move(&mut set, Point::new(120.0, 110.0), &scaling, &EstimatedTextMeasurer);

        let p = *set.get(id).unwrap().placement();
        assert_eq!((p.x, p.y), (50.0, 30.0));
        assert_eq!(e.active().unwrap().action, Some(Action::Move));
    }

    #[test]
    fn center_snap_sets_exact_x() {
        let mut set = DecorationSet::new();
        let id = set.push_sticker_at(1, 0.0, 0.0, 100.0, 80.0);
        // 1000 natural in 800 container, offset_x 0
        let scaling = PreviewScaling::contain(Size::new(1000.0, 1000.0), Size::new(800.0, 800.0)).unwrap();
        let mut e = engine();

        e.pointer_down(id, &set, Point::new(10.0, 10.0));
        // Screen center lands at 0.8 * (453 + 50) = 402.4, within 10px of 400
        e.pointer_move(&mut set, Point::new(10.0 + 453.0 * 0.8, 10.0), &scaling, &EstimatedTextMeasurer);

        assert_eq!(set.get(id).unwrap().placement().x, scaling.natural_width() / 2.0 - 50.0);
        assert!(close(set.get(id).unwrap().placement().x, 450.0));
        assert!(e.guides().vertical);

        // Far from the center the guide drops
        e.pointer_move(&mut set, Point::new(10.0 + 100.0 * 0.8, 10.0), &scaling, &EstimatedTextMeasurer);
        assert!(!e.guides().vertical);
    }

    #[test]
    fn pointer_down_is_ignored_during_an_action() {
        let mut set = DecorationSet::new();
        let a = set.push_sticker_at(1, 0.0, 0.0, 10.0, 10.0);
        let b = set.push_sticker_at(2, 50.0, 50.0, 10.0, 10.0);
        let mut e = engine();

        e.pointer_down(a, &set, Point::new(5.0, 5.0));
        assert!(!e.pointer_down(b, &set, Point::new(55.0, 55.0)));
        assert!(!e.resize_rotate_down(b, &set, Point::new(60.0, 60.0), &identity()));
        assert!(!e.deselect());
        assert_eq!(e.active().unwrap().id, a);

        e.pointer_up();
        assert_eq!(e.active().unwrap().action, None);
        assert!(e.pointer_down(b, &set, Point::new(55.0, 55.0)));
    }

    #[test]
    fn text_in_edit_mode_does_not_drag() {
        let mut set = DecorationSet::new();
        let id = set.push_text_at(1, "hi", 0.0, 0.0, 40.0);
        let mut e = engine();
        e.set_editing(Some(id));

        assert!(!e.pointer_down(id, &set, Point::new(1.0, 1.0)));
        assert!(!e.pointer_move(&mut set, Point::new(30.0, 30.0), &identity(), &EstimatedTextMeasurer));
    }

    #[test]
    fn deleting_the_active_item_mid_drag_resets() {
        let mut set = DecorationSet::new();
        let id = set.push_sticker_at(1, 0.0, 0.0, 10.0, 10.0);
        let mut e = engine();
        e.pointer_down(id, &set, Point::new(1.0, 1.0));
        set.remove(id);

        assert!(!e.pointer_move(&mut set, Point::new(5.0, 5.0), &identity(), &EstimatedTextMeasurer));
        assert!(e.active().is_none());
    }

    #[test]
    fn degrees_wrap_into_half_open_range() {
        assert_eq!(normalize_degrees(190.0), -170.0);
        assert_eq!(normalize_degrees(-190.0), 170.0);
        assert_eq!(normalize_degrees(180.0), 180.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
    }
}
