//! Orthographic projection with hemisphere clipping.
//!
//! A [`Rotation`] describes how the sphere is turned toward the viewer, so
//! the centre of the visible cap is the negated rotation. Every point-like
//! overlay (earthquakes, stations) goes through [`project`], which always
//! yields finite screen coordinates and a separate visibility flag: points
//! on the far hemisphere keep their marker and are drawn fully transparent.

use thiserror::Error;

/// Clip angle used by every globe: exactly one hemisphere.
pub const HEMISPHERE_CLIP_DEGREES: f64 = 90.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoError {
    #[error("invalid point ({longitude}, {latitude}): coordinates must be finite and in range")]
    InvalidPoint { longitude: f64, latitude: f64 },

    #[error("degenerate viewport: container width {0} cannot be projected")]
    DegenerateViewport(f64),

    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64, // degrees
    pub latitude: f64,  // degrees
}

impl GeoPoint {
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn checked(longitude: f64, latitude: f64) -> Result<Self, GeoError> {
        let valid = longitude.is_finite()
            && latitude.is_finite()
            && (-180.0..=180.0).contains(&longitude)
            && (-90.0..=90.0).contains(&latitude);

        if valid {
            Ok(Self::new(longitude, latitude))
        } else {
            Err(GeoError::InvalidPoint {
                longitude,
                latitude,
            })
        }
    }

    pub fn is_finite(&self) -> bool {
        self.longitude.is_finite() && self.latitude.is_finite()
    }
}

/// Orientation of a globe: `[longitude, latitude]` rotation in degrees.
///
/// Latitude is always clamped to [-90, 90]; longitude is wrapped to
/// [-180, 180) so long drags do not accumulate unbounded angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    longitude: f64,
    latitude: f64,
}

impl Rotation {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude: wrap_longitude(longitude),
            latitude: latitude.clamp(-90.0, 90.0),
        }
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Rotation that brings `point` to the centre of the visible cap.
    pub fn facing(point: GeoPoint) -> Self {
        Self::new(-point.longitude, -point.latitude)
    }

    /// Geographic point currently at the centre of the visible cap.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(wrap_longitude(-self.longitude), -self.latitude)
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::new(0.0, -20.0)
    }
}

impl From<[f64; 2]> for Rotation {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

/// Scale and translation of one globe widget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectorConfig {
    pub scale: f64,
    pub translate_x: f64,
    pub translate_y: f64,
    pub clip_angle_degrees: f64,
}

impl ProjectorConfig {
    pub fn new(scale: f64, translate_x: f64, translate_y: f64) -> Self {
        Self {
            scale,
            translate_x,
            translate_y,
            clip_angle_degrees: HEMISPHERE_CLIP_DEGREES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: ScreenPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Result of projecting one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected {
    pub point: ScreenPoint,
    pub visible: bool,
    /// Cosine of the angular distance to the centre of the visible cap.
    pub cosc: f64,
}

/// Cosine of the angular distance between `point` and the cap centre.
pub fn angular_cosine(point: GeoPoint, rotation: Rotation) -> f64 {
    let lambda = point.longitude.to_radians();
    let phi = point.latitude.to_radians();
    let lambda0 = (-rotation.longitude).to_radians();
    let phi0 = (-rotation.latitude).to_radians();

    phi0.sin() * phi.sin() + phi0.cos() * phi.cos() * (lambda - lambda0).cos()
}

/// Visibility test for everything drawn on a globe: markers, outline
/// vertices and hover picks. A point is visible strictly inside the clip cap.
pub fn is_point_visible(point: GeoPoint, rotation: Rotation, config: &ProjectorConfig) -> bool {
    point.is_finite() && angular_cosine(point, rotation) > config.clip_angle_degrees.to_radians().cos()
}

/// Project a geographic point onto the screen.
///
/// The screen position is always computed; `visible` tells consumers
/// whether to draw it. Degenerate input yields a non-visible result.
pub fn project(point: GeoPoint, rotation: Rotation, config: &ProjectorConfig) -> Projected {
    if !point.is_finite() {
        return Projected {
            point: ScreenPoint::new(config.translate_x, config.translate_y),
            visible: false,
            cosc: f64::NAN,
        };
    }

    let lambda = point.longitude.to_radians();
    let phi = point.latitude.to_radians();
    let lambda0 = (-rotation.longitude).to_radians();
    let phi0 = (-rotation.latitude).to_radians();
    let dlambda = lambda - lambda0;

    let x = phi.cos() * dlambda.sin();
    let y = phi0.cos() * phi.sin() - phi0.sin() * phi.cos() * dlambda.cos();

    Projected {
        point: ScreenPoint::new(
            config.translate_x + config.scale * x,
            config.translate_y - config.scale * y,
        ),
        visible: is_point_visible(point, rotation, config),
        cosc: angular_cosine(point, rotation),
    }
}

/// Inverse projection. Returns `None` outside the globe disc.
pub fn invert(screen: ScreenPoint, rotation: Rotation, config: &ProjectorConfig) -> Option<GeoPoint> {
    if config.scale <= 0.0 || !screen.x.is_finite() || !screen.y.is_finite() {
        return None;
    }

    let x = (screen.x - config.translate_x) / config.scale;
    let y = (config.translate_y - screen.y) / config.scale;
    let rho = x.hypot(y);
    if rho > 1.0 {
        return None;
    }

    let lambda0 = (-rotation.longitude).to_radians();
    let phi0 = (-rotation.latitude).to_radians();

    if rho < 1e-12 {
        return Some(GeoPoint::new(
            wrap_longitude(lambda0.to_degrees()),
            phi0.to_degrees(),
        ));
    }

    let c = rho.asin();
    let (sin_c, cos_c) = c.sin_cos();

    let phi = (cos_c * phi0.sin() + y * sin_c * phi0.cos() / rho)
        .clamp(-1.0, 1.0)
        .asin();
    let lambda = lambda0
        + (x * sin_c).atan2(rho * phi0.cos() * cos_c - y * phi0.sin() * sin_c);

    Some(GeoPoint::new(
        wrap_longitude(lambda.to_degrees()),
        phi.to_degrees(),
    ))
}

/// Wrap a longitude into [-180, 180).
pub fn wrap_longitude(longitude: f64) -> f64 {
    if !longitude.is_finite() {
        return longitude;
    }
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}
