use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::projection::Rotation;
use crate::rotation::GroupId;

pub const DEFAULT_DURATION: Duration = Duration::from_millis(1100);

/// Cubic ease-in-out on [0, 1].
pub fn ease_cubic_in_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0) * 2.0;
    if t <= 1.0 {
        t * t * t / 2.0
    } else {
        let t = t - 2.0;
        (t * t * t + 2.0) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationAnimation {
    from: Rotation,
    to: Rotation,
    delta_longitude: f64,
    started: Instant,
    duration: Duration,
}

impl RotationAnimation {
    /// Animate toward `to`, turning the short way round in longitude.
    pub fn new(from: Rotation, to: Rotation, started: Instant, duration: Duration) -> Self {
        let delta_longitude = (to.longitude() - from.longitude() + 180.0).rem_euclid(360.0) - 180.0;
        Self {
            from,
            to,
            delta_longitude,
            started,
            duration,
        }
    }

    pub fn target(&self) -> Rotation {
        self.to
    }

    /// Linear time progress in [0, 1].
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn sample(&self, now: Instant) -> Rotation {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to;
        }
        let k = ease_cubic_in_out(t);
        Rotation::new(
            self.from.longitude() + self.delta_longitude * k,
            self.from.latitude() + (self.to.latitude() - self.from.latitude()) * k,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationFrame {
    pub group: GroupId,
    pub rotation: Rotation,
    pub progress: f64,
    pub finished: bool,
}

/// At most one animation per rotation group.
///
/// Starting a new animation replaces the old one before it can write
/// another frame, so two writers never race on the same group.
#[derive(Debug, Default)]
pub struct RotationAnimator {
    active: BTreeMap<GroupId, RotationAnimation>,
}

impl RotationAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if an in-flight animation was cancelled.
    pub fn start(&mut self, group: GroupId, animation: RotationAnimation) -> bool {
        let cancelled = self.cancel(group);
        debug!(%group, target = ?animation.target().as_array(), "rotation animation started");
        self.active.insert(group, animation);
        cancelled
    }

    pub fn cancel(&mut self, group: GroupId) -> bool {
        let cancelled = self.active.remove(&group).is_some();
        if cancelled {
            debug!(%group, "rotation animation cancelled");
        }
        cancelled
    }

    pub fn is_animating(&self, group: GroupId) -> bool {
        self.active.contains_key(&group)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    pub fn progress(&self, group: GroupId, now: Instant) -> Option<f64> {
        self.active.get(&group).map(|a| a.progress(now))
    }

    /// Advance every animation; finished ones are dropped after their last frame.
    pub fn tick(&mut self, now: Instant) -> Vec<AnimationFrame> {
        let frames: Vec<AnimationFrame> = self
            .active
            .iter()
            .map(|(group, animation)| {
                let progress = animation.progress(now);
                AnimationFrame {
                    group: *group,
                    rotation: animation.sample(now),
                    progress,
                    finished: progress >= 1.0,
                }
            })
            .collect();

        self.active.retain(|_, animation| animation.progress(now) < 1.0);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_easing_endpoints() {
        assert_eq!(ease_cubic_in_out(0.0), 0.0);
        assert_eq!(ease_cubic_in_out(1.0), 1.0);
        assert_abs_diff_eq!(ease_cubic_in_out(0.5), 0.5, epsilon = 1e-12);
        assert!(ease_cubic_in_out(0.25) < 0.25);
    }

    #[test]
    fn test_sample_reaches_target() {
        let start = Instant::now();
        let animation = RotationAnimation::new(
            Rotation::new(0.0, -20.0),
            Rotation::new(-139.0, -35.0),
            start,
            Duration::from_millis(1000),
        );

        assert_eq!(animation.sample(start), Rotation::new(0.0, -20.0));
        let mid = animation.sample(start + Duration::from_millis(500));
        assert_abs_diff_eq!(mid.longitude(), -69.5, epsilon = 1e-9);
        assert_abs_diff_eq!(mid.latitude(), -27.5, epsilon = 1e-9);
        assert_eq!(animation.sample(start + Duration::from_secs(2)), Rotation::new(-139.0, -35.0));
    }

    #[test]
    fn test_takes_the_short_way_round() {
        let start = Instant::now();
        let animation = RotationAnimation::new(
            Rotation::new(170.0, 0.0),
            Rotation::new(-170.0, 0.0),
            start,
            Duration::from_millis(1000),
        );
        let mid = animation.sample(start + Duration::from_millis(500));
        assert_abs_diff_eq!(mid.longitude(), -180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_start_cancels_previous() {
        let start = Instant::now();
        let mut animator = RotationAnimator::new();
        let group = GroupId(1);
        let first = RotationAnimation::new(Rotation::default(), Rotation::new(50.0, 0.0), start, DEFAULT_DURATION);
        let second = RotationAnimation::new(Rotation::default(), Rotation::new(-50.0, 0.0), start, DEFAULT_DURATION);

        assert!(!animator.start(group, first));
        assert!(animator.start(group, second));

        let frames = animator.tick(start + Duration::from_secs(5));
        assert_eq!(frames.len(), 1);
        assert!(frames[0].finished);
        assert_eq!(frames[0].rotation, Rotation::new(-50.0, 0.0));
        assert!(animator.is_idle());
    }

    #[test]
    fn test_cancel_stops_frames() {
        let start = Instant::now();
        let mut animator = RotationAnimator::new();
        animator.start(
            GroupId(0),
            RotationAnimation::new(Rotation::default(), Rotation::new(10.0, 0.0), start, DEFAULT_DURATION),
        );

        assert!(animator.cancel(GroupId(0)));
        assert!(animator.tick(start + Duration::from_millis(10)).is_empty());
        assert!(!animator.cancel(GroupId(0)));
    }
}
