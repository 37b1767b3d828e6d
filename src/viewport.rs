use crate::projection::{GeoError, ProjectorConfig, HEMISPHERE_CLIP_DEGREES};

/// Share of the half-width used by the sphere radius.
pub const DEFAULT_MARGIN: f64 = 0.9;

/// Derives projector scale and translation from a square container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportResizer {
    margin: f64,
    clip_angle: f64,
}

impl ViewportResizer {
    pub fn new(margin: f64) -> Self {
        Self {
            margin,
            clip_angle: HEMISPHERE_CLIP_DEGREES,
        }
    }

    /// Angular radius, in degrees, beyond which points are hidden.
    pub fn with_clip_angle(mut self, degrees: f64) -> Self {
        self.clip_angle = degrees;
        self
    }

    /// Fit a globe into a container `width` units wide.
    ///
    /// A zero, negative or non-finite width (container not laid out yet) is
    /// rejected so the caller keeps its previous projector.
    pub fn fit(&self, width: f64) -> Result<ProjectorConfig, GeoError> {
        if !width.is_finite() || width <= 0.0 {
            return Err(GeoError::DegenerateViewport(width));
        }

        let half = width / 2.0;
        Ok(ProjectorConfig {
            clip_angle_degrees: self.clip_angle,
            ..ProjectorConfig::new(half * self.margin, half, half)
        })
    }
}

impl Default for ViewportResizer {
    fn default() -> Self {
        Self::new(DEFAULT_MARGIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_leaves_a_margin() {
        let config = ViewportResizer::default().fit(600.0).unwrap();
        assert_eq!(config.scale, 270.0);
        assert_eq!(config.translate_x, 300.0);
        assert_eq!(config.translate_y, 300.0);
        assert_eq!(config.clip_angle_degrees, 90.0);
    }

    #[test]
    fn test_fit_is_idempotent() {
        let resizer = ViewportResizer::default();
        assert_eq!(resizer.fit(417.0).unwrap(), resizer.fit(417.0).unwrap());
    }

    #[test]
    fn test_clip_angle_is_carried() {
        let config = ViewportResizer::new(0.5).with_clip_angle(80.0).fit(100.0).unwrap();
        assert_eq!(config.scale, 25.0);
        assert_eq!(config.clip_angle_degrees, 80.0);
    }

    #[test]
    fn test_degenerate_widths_are_rejected() {
        let resizer = ViewportResizer::default();
        for width in [0.0, -12.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                resizer.fit(width),
                Err(GeoError::DegenerateViewport(_))
            ));
        }
    }
}
