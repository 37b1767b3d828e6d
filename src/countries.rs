use std::path::Path;

use geo::{Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use nalgebra::Vector3;
use serde_json::Value;
use tracing::{info, warn};

use crate::projection::{GeoError, GeoPoint};
use crate::records::DataError;

/// Candidate name fields, in the order search consults them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryNames {
    pub name: Option<String>,
    pub official: Option<String>,
    pub english: Option<String>,
    pub admin: Option<String>,
    pub iso_a2: Option<String>,
    pub iso_a3: Option<String>,
}

impl CountryNames {
    #[cfg(test)]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        [
            &self.name,
            &self.official,
            &self.english,
            &self.admin,
            &self.iso_a2,
            &self.iso_a3,
        ]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct CountryFeature {
    pub id: Option<String>,
    pub names: CountryNames,
    pub geometry: MultiPolygon<f64>,
}

impl CountryFeature {
    pub fn new(id: Option<String>, names: CountryNames, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id,
            names,
            geometry,
        }
    }

    pub fn display_name(&self) -> &str {
        self.names
            .name
            .as_deref()
            .or(self.names.admin.as_deref())
            .or(self.names.official.as_deref())
            .or(self.names.english.as_deref())
            .unwrap_or("Selected country")
    }

    /// Features with ids compare by id, so every part of a country split
    /// across several features shares the highlight. Without ids only the
    /// feature itself matches.
    pub fn is_same_feature(&self, other: &CountryFeature) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => std::ptr::eq(self, other),
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        point.is_finite()
            && self
                .geometry
                .contains(&Point::new(point.longitude, point.latitude))
    }

    pub fn centroid(&self) -> Option<GeoPoint> {
        spherical_centroid(&self.geometry)
    }
}

pub(crate) fn unit_vector(point: GeoPoint) -> Vector3<f64> {
    let lambda = point.longitude.to_radians();
    let phi = point.latitude.to_radians();
    Vector3::new(phi.cos() * lambda.cos(), phi.cos() * lambda.sin(), phi.sin())
}

pub(crate) fn from_unit_vector(v: &Vector3<f64>) -> GeoPoint {
    let n = v.normalize();
    GeoPoint::new(
        n.y.atan2(n.x).to_degrees(),
        n.z.clamp(-1.0, 1.0).asin().to_degrees(),
    )
}

/// Centroid of a polygon set on the sphere.
///
/// Integrates `a × b` along every edge, weighted by the arc length over the
/// chord length, which yields the surface-weighted mean direction. The sign
/// of that integral follows the ring winding, so it is oriented with the
/// vertex mean. Falls back to the vertex mean for degenerate rings.
pub fn spherical_centroid(geometry: &MultiPolygon<f64>) -> Option<GeoPoint> {
    let mut surface = Vector3::zeros();
    let mut vertices = Vector3::zeros();

    for polygon in geometry.iter() {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
        for ring in rings {
            for edge in ring.lines() {
                let a = unit_vector(GeoPoint::new(edge.start.x, edge.start.y));
                let b = unit_vector(GeoPoint::new(edge.end.x, edge.end.y));
                let cross = a.cross(&b);
                let m = cross.norm();
                if m > 1e-15 {
                    surface += cross * (m.atan2(a.dot(&b)) / m);
                }
            }
        }

        // Exterior only; skip the closing coordinate.
        let exterior = &polygon.exterior().0;
        let open = exterior.len().saturating_sub(1);
        for coord in exterior.iter().take(open) {
            vertices += unit_vector(GeoPoint::new(coord.x, coord.y));
        }
    }

    if !surface.iter().all(|c| c.is_finite()) || !vertices.iter().all(|c| c.is_finite()) {
        return None;
    }

    if surface.dot(&vertices) < 0.0 {
        surface = -surface;
    }

    if surface.norm() > 1e-12 {
        Some(from_unit_vector(&surface))
    } else if vertices.norm() > 1e-12 {
        Some(from_unit_vector(&vertices))
    } else {
        None
    }
}

pub fn load_countries<P: AsRef<Path>>(path: P) -> Result<Vec<CountryFeature>, DataError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let countries = parse_countries(&contents)?;
    info!(
        count = countries.len(),
        path = %path.as_ref().display(),
        "loaded country features"
    );
    Ok(countries)
}

/// Parse a GeoJSON FeatureCollection of Polygon/MultiPolygon features.
///
/// Features with missing or malformed geometry are skipped and logged.
pub fn parse_countries(json: &str) -> Result<Vec<CountryFeature>, DataError> {
    let root: Value = serde_json::from_str(json)?;
    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| DataError::Format("expected a GeoJSON FeatureCollection".to_string()))?;

    let mut countries = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        match parse_feature(feature) {
            Ok(country) => countries.push(country),
            Err(e) => warn!(index, error = %e, "skipping country feature"),
        }
    }

    Ok(countries)
}

fn parse_feature(feature: &Value) -> Result<CountryFeature, GeoError> {
    let properties = feature.get("properties").unwrap_or(&Value::Null);
    let text = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| properties.get(*key))
            .find_map(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
    };

    let names = CountryNames {
        name: text(&["name"]),
        official: text(&["NAME", "formal_en"]),
        english: text(&["NAME_EN", "name_en"]),
        admin: text(&["admin", "ADMIN"]),
        iso_a2: text(&["iso_a2", "ISO_A2"]),
        iso_a3: text(&["iso_a3", "ISO_A3"]),
    };

    let id = match feature.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let geometry = feature
        .get("geometry")
        .ok_or_else(|| GeoError::MalformedGeometry("feature without geometry".to_string()))?;
    let kind = geometry.get("type").and_then(Value::as_str).unwrap_or("");
    let coordinates = geometry
        .get("coordinates")
        .ok_or_else(|| GeoError::MalformedGeometry("geometry without coordinates".to_string()))?;

    let polygons = match kind {
        "Polygon" => vec![parse_polygon(coordinates)?],
        "MultiPolygon" => as_array(coordinates)?
            .iter()
            .map(parse_polygon)
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(GeoError::MalformedGeometry(format!(
                "unsupported geometry type {other:?}"
            )))
        }
    };

    Ok(CountryFeature::new(id, names, MultiPolygon::new(polygons)))
}

fn as_array(value: &Value) -> Result<&Vec<Value>, GeoError> {
    value
        .as_array()
        .ok_or_else(|| GeoError::MalformedGeometry("expected a coordinate array".to_string()))
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>, GeoError> {
    let mut rings = as_array(value)?
        .iter()
        .map(parse_ring)
        .collect::<Result<Vec<_>, _>>()?;
    if rings.is_empty() {
        return Err(GeoError::MalformedGeometry("polygon without rings".to_string()));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn parse_ring(value: &Value) -> Result<LineString<f64>, GeoError> {
    let coords = as_array(value)?
        .iter()
        .map(|position| {
            let pair = as_array(position)?;
            let x = pair.first().and_then(Value::as_f64);
            let y = pair.get(1).and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(Coord { x, y }),
                _ => Err(GeoError::MalformedGeometry(format!(
                    "bad position {position}"
                ))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    if coords.len() < 3 {
        return Err(GeoError::MalformedGeometry(format!(
            "ring with {} positions",
            coords.len()
        )));
    }
    Ok(LineString::new(coords))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Axis-aligned box feature used across the crate's tests.
    pub(crate) fn square(name: &str, min: (f64, f64), max: (f64, f64)) -> CountryFeature {
        let ring = LineString::from(vec![
            (min.0, min.1),
            (max.0, min.1),
            (max.0, max.1),
            (min.0, max.1),
            (min.0, min.1),
        ]);
        CountryFeature::new(
            Some(name.to_lowercase()),
            CountryNames::named(name),
            MultiPolygon::new(vec![Polygon::new(ring, vec![])]),
        )
    }

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": 392,
                "properties": {"name": "Japan", "iso_a2": "JP", "iso_a3": "JPN"},
                "geometry": {"type": "Polygon", "coordinates": [[[130,31],[142,31],[142,45],[130,45],[130,31]]]}
            },
            {
                "type": "Feature",
                "properties": {"name": "Broken"},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,"x"],[1,1],[0,0]]]}
            },
            {
                "type": "Feature",
                "id": "FJI",
                "properties": {"admin": "Fiji"},
                "geometry": {"type": "MultiPolygon", "coordinates": [
                    [[[177,-19],[179,-19],[179,-17],[177,-17],[177,-19]]],
                    [[[-180,-17],[-179,-17],[-179,-16],[-180,-16],[-180,-17]]]
                ]}
            }
        ]
    }"#;

    #[test]
    fn test_parse_skips_malformed_features() {
        let countries = parse_countries(SAMPLE).unwrap();
        assert_eq!(countries.len(), 2);
        assert_eq!(countries[0].id.as_deref(), Some("392"));
        assert_eq!(countries[0].names.iso_a3.as_deref(), Some("JPN"));
        assert_eq!(countries[1].display_name(), "Fiji");
        assert_eq!(countries[1].geometry.0.len(), 2);
    }

    #[test]
    fn test_parse_rejects_non_collections() {
        assert!(matches!(
            parse_countries(r#"{"type": "Feature"}"#),
            Err(DataError::Format(_))
        ));
    }

    #[test]
    fn test_centroid_of_symmetric_box() {
        let country = square("Box", (10.0, -10.0), (30.0, 10.0));
        let centroid = country.centroid().unwrap();
        assert_abs_diff_eq!(centroid.longitude, 20.0, epsilon = 1e-6);
        assert_abs_diff_eq!(centroid.latitude, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_centroid_ignores_winding() {
        let clockwise = LineString::from(vec![
            (10.0, -10.0),
            (10.0, 10.0),
            (30.0, 10.0),
            (30.0, -10.0),
            (10.0, -10.0),
        ]);
        let geometry = MultiPolygon::new(vec![Polygon::new(clockwise, vec![])]);
        let centroid = spherical_centroid(&geometry).unwrap();
        assert_abs_diff_eq!(centroid.longitude, 20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_centroid_across_antimeridian() {
        let countries = parse_countries(SAMPLE).unwrap();
        let centroid = countries[1].centroid().unwrap();
        // Both islands sit near the antimeridian; a planar mean would land near 0.
        assert!(centroid.longitude.abs() > 170.0, "{centroid:?}");
    }

    #[test]
    fn test_same_feature_compares_ids() {
        let mainland = square("Norway", (5.0, 58.0), (30.0, 71.0));
        let svalbard = square("Norway", (10.0, 76.0), (30.0, 81.0));
        let sweden = square("Sweden", (11.0, 55.0), (24.0, 69.0));
        assert!(mainland.is_same_feature(&svalbard));
        assert!(!mainland.is_same_feature(&sweden));

        let mut anonymous = sweden.clone();
        anonymous.id = None;
        let copy = anonymous.clone();
        assert!(anonymous.is_same_feature(&anonymous));
        assert!(!anonymous.is_same_feature(&copy));
    }

    #[test]
    fn test_contains() {
        let country = square("Box", (10.0, -10.0), (30.0, 10.0));
        assert!(country.contains(GeoPoint::new(20.0, 0.0)));
        assert!(!country.contains(GeoPoint::new(-20.0, 0.0)));
        assert!(!country.contains(GeoPoint::new(f64::NAN, 0.0)));
    }
}
