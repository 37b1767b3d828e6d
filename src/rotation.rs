//! Rotation groups: one shared orientation for a set of globes.
//!
//! Every globe view of a group holds a clone of the same [`SharedRotation`]
//! handle and reads the rotation through it at paint time. Writers go
//! through [`RotationGroup::set`], which notifies the subscribed listeners
//! so dependent views can be repainted.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::projection::Rotation;

pub type SharedRotation = Rc<RefCell<RotationGroup>>;

type Listener = Box<dyn FnMut(GroupId, Rotation)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

pub struct RotationGroup {
    id: GroupId,
    name: String,
    rotation: Rotation,
    revision: u64,
    listeners: Vec<Listener>,
}

impl RotationGroup {
    pub fn new(id: GroupId, name: impl Into<String>, initial: Rotation) -> Self {
        Self {
            id,
            name: name.into(),
            rotation: initial,
            revision: 0,
            listeners: Vec::new(),
        }
    }

    pub fn shared(self) -> SharedRotation {
        Rc::new(RefCell::new(self))
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Number of writes since creation.
    #[cfg(test)]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(GroupId, Rotation) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Replace the rotation and notify every listener.
    pub fn set(&mut self, rotation: Rotation) {
        // Rotation::new already clamps; re-run it for values built by hand.
        self.rotation = Rotation::new(rotation.longitude(), rotation.latitude());
        self.revision += 1;

        trace!(
            group = %self.id,
            longitude = self.rotation.longitude(),
            latitude = self.rotation.latitude(),
            "rotation changed"
        );

        let (id, rotation) = (self.id, self.rotation);
        for listener in self.listeners.iter_mut() {
            listener(id, rotation);
        }
    }

    pub fn rotate_by(&mut self, delta_longitude: f64, delta_latitude: f64) {
        let next = Rotation::new(
            self.rotation.longitude() + delta_longitude,
            self.rotation.latitude() + delta_latitude,
        );
        self.set(next);
    }
}

impl fmt::Debug for RotationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationGroup")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rotation", &self.rotation)
            .field("revision", &self.revision)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_listeners_see_every_write() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut group = RotationGroup::new(GroupId(0), "dual", Rotation::default());

        let sink = Rc::clone(&seen);
        group.subscribe(move |id, rotation| sink.borrow_mut().push((id, rotation)));

        group.rotate_by(10.0, 5.0);
        group.set(Rotation::new(0.0, 0.0));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, GroupId(0));
        assert_abs_diff_eq!(seen[0].1.longitude(), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(seen[0].1.latitude(), -15.0, epsilon = 1e-9);
        assert_eq!(group.revision(), 2);
    }

    #[test]
    fn test_clones_share_one_rotation() {
        let group = RotationGroup::new(GroupId(1), "search", Rotation::default()).shared();
        let view_a = Rc::clone(&group);
        let view_b = Rc::clone(&group);

        view_a.borrow_mut().rotate_by(25.0, 0.0);

        assert_eq!(view_a.borrow().rotation(), view_b.borrow().rotation());
    }

    #[test]
    fn test_rotate_by_clamps_latitude() {
        let mut group = RotationGroup::new(GroupId(0), "dual", Rotation::new(0.0, 80.0));
        group.rotate_by(0.0, 45.0);
        assert_abs_diff_eq!(group.rotation().latitude(), 90.0, epsilon = 1e-9);
    }
}
