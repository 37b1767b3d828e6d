//! Country outlines on the orthographic globe.
//!
//! The sync engine never clips polygons itself: it hands each feature to a
//! [`PathGenerator`], which owns clipping at the edge of the visible cap.

use std::fmt::Write;

use geo::MultiPolygon;

use crate::countries::{from_unit_vector, unit_vector};
use crate::projection::{
    is_point_visible, project, GeoError, GeoPoint, ProjectorConfig, Rotation, ScreenPoint,
};

/// Visible outline of one feature: open polylines, plus closed rings
/// for polygons that are entirely on the front hemisphere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outline {
    pub runs: Vec<Run>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub points: Vec<ScreenPoint>,
    pub closed: bool,
}

impl Outline {
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// SVG path data (`M … L … Z`).
    pub fn svg(&self) -> String {
        let mut d = String::new();
        for run in &self.runs {
            for (i, p) in run.points.iter().enumerate() {
                let cmd = if i == 0 { 'M' } else { 'L' };
                let _ = write!(d, "{cmd}{:.2},{:.2}", p.x, p.y);
            }
            if run.closed {
                d.push('Z');
            }
        }
        d
    }
}

pub trait PathGenerator {
    fn outline(
        &self,
        geometry: &MultiPolygon<f64>,
        rotation: Rotation,
        config: &ProjectorConfig,
    ) -> Result<Outline, GeoError>;
}

/// Splits rings where they leave the visible cap and adds the crossing
/// point on the clip circle, found along the great circle through the edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrthographicPaths;

impl PathGenerator for OrthographicPaths {
    fn outline(
        &self,
        geometry: &MultiPolygon<f64>,
        rotation: Rotation,
        config: &ProjectorConfig,
    ) -> Result<Outline, GeoError> {
        let mut outline = Outline::default();

        for polygon in geometry.iter() {
            let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
            for ring in rings {
                let coords: Vec<GeoPoint> = ring
                    .coords()
                    .map(|c| GeoPoint::new(c.x, c.y))
                    .collect();
                if coords.iter().any(|p| !p.is_finite()) {
                    return Err(GeoError::MalformedGeometry(
                        "non-finite coordinate in ring".to_string(),
                    ));
                }
                clip_ring(&coords, rotation, config, &mut outline);
            }
        }

        Ok(outline)
    }
}

fn clip_ring(coords: &[GeoPoint], rotation: Rotation, config: &ProjectorConfig, outline: &mut Outline) {
    if coords.len() < 2 {
        return;
    }

    let visible = |p: &GeoPoint| is_point_visible(*p, rotation, config);
    let to_screen = |p: GeoPoint| project(p, rotation, config).point;
    let crossing = |a: GeoPoint, b: GeoPoint| to_screen(clip_crossing(a, b, &visible));

    if coords.iter().all(visible) {
        outline.runs.push(Run {
            points: coords.iter().map(|p| to_screen(*p)).collect(),
            closed: true,
        });
        return;
    }

    let mut runs: Vec<Vec<ScreenPoint>> = Vec::new();
    let mut current: Vec<ScreenPoint> = Vec::new();

    for pair in coords.windows(2) {
        let (a, b) = (pair[0], pair[1]);

        match (visible(&a), visible(&b)) {
            (true, true) => {
                if current.is_empty() {
                    current.push(to_screen(a));
                }
                current.push(to_screen(b));
            }
            (true, false) => {
                if current.is_empty() {
                    current.push(to_screen(a));
                }
                current.push(crossing(a, b));
                runs.push(std::mem::take(&mut current));
            }
            (false, true) => {
                current.push(crossing(a, b));
                current.push(to_screen(b));
            }
            (false, false) => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    // A ring that starts inside the cap is split at its seam; rejoin it.
    let first_visible = coords.first().is_some_and(visible);
    if first_visible && runs.len() > 1 {
        let head = runs.remove(0);
        if let Some(tail) = runs.last_mut() {
            tail.extend(head.into_iter().skip(1));
        }
    }

    outline.runs.extend(
        runs.into_iter()
            .filter(|points| points.len() > 1)
            .map(|points| Run {
                points,
                closed: false,
            }),
    );
}

/// Point where the great-circle edge `a → b` leaves the visible cap.
///
/// Bisects along the edge with the same visibility test the endpoints
/// went through, so the crossing sits on the clip circle for any clip angle.
fn clip_crossing(a: GeoPoint, b: GeoPoint, visible: impl Fn(&GeoPoint) -> bool) -> GeoPoint {
    let (va, vb) = (unit_vector(a), unit_vector(b));
    let along = |t: f64| {
        let v = va * (1.0 - t) + vb * t;
        (v.norm() > 1e-12).then(|| from_unit_vector(&v))
    };

    let a_visible = visible(&a);
    let (mut lo, mut hi) = (0.0, 1.0);
    for _ in 0..52 {
        let mid = 0.5 * (lo + hi);
        let Some(p) = along(mid) else {
            return a;
        };
        if visible(&p) == a_visible {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    // The visible side of the bracket, so the point is drawn inside the cap.
    let t = if a_visible { lo } else { hi };
    along(t).unwrap_or(a)
}

/// Outline of the globe itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereOutline {
    pub center: ScreenPoint,
    pub radius: f64,
}

impl SphereOutline {
    pub fn from_config(config: &ProjectorConfig) -> Self {
        Self {
            center: ScreenPoint::new(config.translate_x, config.translate_y),
            radius: config.scale,
        }
    }
}
