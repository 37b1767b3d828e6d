use crate::countries::CountryFeature;
use crate::projection::ScreenPoint;
use crate::records::{EarthquakeRecord, StationRecord};
use crate::sync::{GlobeFrame, Marker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tooltip {
    pub title: String,
    pub lines: Vec<String>,
}

/// `place` reads like "12 km SSW of Town, Region": the part before the
/// first comma is the distance, the rest the location.
pub fn earthquake_tooltip(quake: &EarthquakeRecord) -> Tooltip {
    let (distance, location) = match quake.place.split_once(',') {
        Some((distance, location)) => (Some(distance.trim()), location.trim()),
        None => (None, quake.place.trim()),
    };

    let mut lines = Vec::new();
    if let Some(distance) = distance {
        lines.push(format!("Distance: {distance}"));
    }
    lines.push(format!("Mag: {}", quake.magnitude));
    if let Some(time) = quake.time {
        lines.push(format!("Time: {}", time.format("%Y-%m-%d %H:%M UTC")));
    }

    Tooltip {
        title: location.to_string(),
        lines,
    }
}

pub fn station_tooltip(station: &StationRecord) -> Tooltip {
    Tooltip {
        title: format!("{} {}", station.code, station.name),
        lines: vec![
            format!("Network: {}", station.network),
            format!("Telemetry: {}", station.telemetry),
            format!("Elevation: {} m", station.elevation),
        ],
    }
}

pub fn country_tooltip(country: &CountryFeature) -> Tooltip {
    Tooltip {
        title: country.display_name().to_string(),
        lines: Vec::new(),
    }
}

/// Nearest visible marker within `tolerance` of `at`.
///
/// Markers on the far hemisphere are never picked even though they stay
/// in the frame.
pub fn pick_marker(frame: &GlobeFrame, at: ScreenPoint, tolerance: f64) -> Option<&Marker> {
    frame
        .markers
        .iter()
        .filter(|marker| marker.visible)
        .map(|marker| (marker, marker.position.distance_to(at)))
        .filter(|(marker, distance)| *distance <= tolerance.max(marker.radius))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(marker, _)| marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{GeoPoint, ProjectorConfig, Rotation};
    use crate::style::Rgb;
    use crate::sync::MarkerKind;
    use chrono::{TimeZone, Utc};

    fn marker(x: f64, y: f64, visible: bool, record: usize) -> Marker {
        Marker {
            kind: MarkerKind::Earthquake,
            record,
            position: ScreenPoint::new(x, y),
            visible,
            opacity: if visible { 0.8 } else { 0.0 },
            radius: 1.0,
            color: Rgb(255, 0, 0),
        }
    }

    fn frame(markers: Vec<Marker>) -> GlobeFrame {
        GlobeFrame {
            rotation: Rotation::default(),
            projector: ProjectorConfig::new(100.0, 100.0, 100.0),
            sphere: None,
            countries: Vec::new(),
            markers,
            painted: Vec::new(),
        }
    }

    #[test]
    fn test_earthquake_tooltip_splits_place() {
        let mut quake = EarthquakeRecord::new(
            GeoPoint::new(139.0, 35.0),
            5.4,
            "21 km SE of Hachijo-jima, Japan",
        );
        quake.time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 7, 10, 0).unwrap());

        let tip = earthquake_tooltip(&quake);
        assert_eq!(tip.title, "Japan");
        assert_eq!(
            tip.lines,
            vec![
                "Distance: 21 km SE of Hachijo-jima".to_string(),
                "Mag: 5.4".to_string(),
                "Time: 2024-01-01 07:10 UTC".to_string(),
            ]
        );
    }

    #[test]
    fn test_earthquake_tooltip_without_comma() {
        let quake = EarthquakeRecord::new(GeoPoint::new(0.0, 0.0), 4.0, "South Atlantic Ocean");
        let tip = earthquake_tooltip(&quake);
        assert_eq!(tip.title, "South Atlantic Ocean");
        assert_eq!(tip.lines, vec!["Mag: 4".to_string()]);
    }

    #[test]
    fn test_station_tooltip() {
        let station = StationRecord {
            location: GeoPoint::new(-106.46, 34.95),
            code: "ANMO".to_string(),
            name: "Albuquerque".to_string(),
            network: "IU".to_string(),
            elevation: 1820.0,
            telemetry: "Real-time".to_string(),
        };
        let tip = station_tooltip(&station);
        assert_eq!(tip.title, "ANMO Albuquerque");
        assert_eq!(tip.lines[0], "Network: IU");
        assert_eq!(tip.lines[2], "Elevation: 1820 m");
    }

    #[test]
    fn test_pick_ignores_hidden_markers() {
        let view = frame(vec![
            marker(10.0, 10.0, false, 0),
            marker(14.0, 10.0, true, 1),
            marker(11.5, 10.0, true, 2),
        ]);

        let hit = pick_marker(&view, ScreenPoint::new(10.0, 10.0), 3.0).unwrap();
        assert_eq!(hit.record, 2);
        assert!(pick_marker(&view, ScreenPoint::new(50.0, 50.0), 3.0).is_none());

        let hidden_only = frame(vec![marker(10.0, 10.0, false, 0)]);
        assert!(pick_marker(&hidden_only, ScreenPoint::new(10.0, 10.0), 3.0).is_none());
    }
}
