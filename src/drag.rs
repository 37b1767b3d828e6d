use std::rc::Rc;

use tracing::debug;

use crate::rotation::{GroupId, SharedRotation};

/// Degrees of rotation per pixel of pointer travel.
pub const DEFAULT_SENSITIVITY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
}

impl Pointer {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

struct ActiveDrag {
    group: SharedRotation,
    last: Pointer,
}

/// Turns pointer drags into rotation of a group.
pub struct DragRotationController {
    sensitivity: f64,
    active: Option<ActiveDrag>,
}

impl DragRotationController {
    pub fn new(sensitivity: f64) -> Self {
        Self {
            sensitivity,
            active: None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    pub fn on_drag_start(&mut self, pointer: Pointer, group: &SharedRotation) {
        debug!(group = %group.borrow().id(), x = pointer.x, y = pointer.y, "drag start");
        self.active = Some(ActiveDrag {
            group: Rc::clone(group),
            last: pointer,
        });
    }

    /// Apply the pointer delta since the last event.
    ///
    /// Horizontal travel turns longitude; vertical travel is inverted so an
    /// upward drag tilts the near pole toward the viewer. Returns the group
    /// that changed, or `None` outside a gesture.
    pub fn on_drag_move(&mut self, pointer: Pointer) -> Option<GroupId> {
        let drag = self.active.as_mut()?;
        let dx = pointer.x - drag.last.x;
        let dy = pointer.y - drag.last.y;
        drag.last = pointer;

        if !dx.is_finite() || !dy.is_finite() {
            return None;
        }

        let mut group = drag.group.borrow_mut();
        group.rotate_by(dx * self.sensitivity, -dy * self.sensitivity);
        Some(group.id())
    }

    pub fn on_drag_end(&mut self) {
        if let Some(drag) = self.active.take() {
            debug!(group = %drag.group.borrow().id(), "drag end");
        }
    }

    /// Rotate a group as if it had been dragged by `(dx, dy)` pixels.
    pub fn nudge(&self, group: &SharedRotation, dx: f64, dy: f64) -> GroupId {
        let mut group = group.borrow_mut();
        group.rotate_by(dx * self.sensitivity, -dy * self.sensitivity);
        group.id()
    }
}

impl Default for DragRotationController {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVITY)
    }
}
