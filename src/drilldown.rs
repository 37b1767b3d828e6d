//! Drill-down view of the selected country.

use std::f64::consts::FRAC_PI_4;

use serde::Deserialize;

use crate::countries::CountryFeature;
use crate::projection::{GeoPoint, ScreenPoint};
use crate::records::{EarthquakeRecord, StationRecord};

/// Web Mercator latitude limit.
const MAX_LATITUDE: f64 = 85.051_128_78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLayer {
    #[default]
    Stations,
    Earthquakes,
    Both,
}

impl ActiveLayer {
    pub fn next(self) -> Self {
        match self {
            ActiveLayer::Stations => ActiveLayer::Earthquakes,
            ActiveLayer::Earthquakes => ActiveLayer::Both,
            ActiveLayer::Both => ActiveLayer::Stations,
        }
    }

    pub fn shows_stations(self) -> bool {
        matches!(self, ActiveLayer::Stations | ActiveLayer::Both)
    }

    pub fn shows_earthquakes(self) -> bool {
        matches!(self, ActiveLayer::Earthquakes | ActiveLayer::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActiveLayer::Stations => "Stations",
            ActiveLayer::Earthquakes => "Earthquakes",
            ActiveLayer::Both => "Both",
        }
    }
}

/// Records of each data set that fall inside one country.
#[derive(Debug, Clone, PartialEq)]
pub struct CountrySummary {
    pub name: String,
    pub stations: Vec<usize>,
    pub earthquakes: Vec<usize>,
}

impl CountrySummary {
    pub fn build(
        country: &CountryFeature,
        earthquakes: &[EarthquakeRecord],
        stations: &[StationRecord],
    ) -> Self {
        Self {
            name: country.display_name().to_string(),
            stations: indices_inside(country, stations.iter().map(|s| s.location)),
            earthquakes: indices_inside(country, earthquakes.iter().map(|q| q.location)),
        }
    }

    pub fn result_text(&self, layer: ActiveLayer) -> String {
        match layer {
            ActiveLayer::Stations => format!("{}: {} stations", self.name, self.stations.len()),
            ActiveLayer::Earthquakes => {
                format!("{}: {} earthquakes", self.name, self.earthquakes.len())
            }
            ActiveLayer::Both => format!(
                "{}: {} stations, {} earthquakes",
                self.name,
                self.stations.len(),
                self.earthquakes.len()
            ),
        }
    }
}

fn indices_inside(country: &CountryFeature, points: impl Iterator<Item = GeoPoint>) -> Vec<usize> {
    points
        .enumerate()
        .filter(|(_, point)| country.contains(*point))
        .map(|(i, _)| i)
        .collect()
}

/// Mercator projection scaled and centred to fit a feature in a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorFit {
    scale: f64,
    translate_x: f64,
    translate_y: f64,
}

fn mercator_raw(point: GeoPoint) -> (f64, f64) {
    let lat = point.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    (
        point.longitude.to_radians(),
        (FRAC_PI_4 + lat / 2.0).tan().ln(),
    )
}

impl MercatorFit {
    /// `None` for an empty feature or a non-positive box.
    pub fn fit(country: &CountryFeature, width: f64, height: f64) -> Option<Self> {
        if !(width > 0.0 && height > 0.0) {
            return None;
        }

        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for polygon in country.geometry.iter() {
            for coord in polygon.exterior().coords() {
                let (x, y) = mercator_raw(GeoPoint::new(coord.x, coord.y));
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        let (x0, y0, x1, y1) = bounds?;

        let (dx, dy) = (x1 - x0, y1 - y0);
        let scale = match (dx > 0.0, dy > 0.0) {
            (true, true) => (width / dx).min(height / dy),
            (true, false) => width / dx,
            (false, true) => height / dy,
            (false, false) => 1.0,
        };

        // y grows downward on screen.
        Some(Self {
            scale,
            translate_x: (width - scale * (x1 + x0)) / 2.0,
            translate_y: (height + scale * (y1 + y0)) / 2.0,
        })
    }

    pub fn project(&self, point: GeoPoint) -> ScreenPoint {
        let (x, y) = mercator_raw(point);
        ScreenPoint::new(
            self.translate_x + self.scale * x,
            self.translate_y - self.scale * y,
        )
    }
}

/// Everything the drill-down panel draws, in panel coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryMap {
    pub rings: Vec<Vec<ScreenPoint>>,
    pub stations: Vec<ScreenPoint>,
    pub earthquakes: Vec<ScreenPoint>,
    pub message: Option<String>,
}

impl CountryMap {
    pub fn build(
        country: &CountryFeature,
        summary: &CountrySummary,
        earthquakes: &[EarthquakeRecord],
        stations: &[StationRecord],
        layer: ActiveLayer,
        width: f64,
        height: f64,
    ) -> Self {
        let Some(fit) = MercatorFit::fit(country, width, height) else {
            return Self::default();
        };

        let rings: Vec<Vec<ScreenPoint>> = country
            .geometry
            .iter()
            .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
            .map(|ring| {
                ring.coords()
                    .map(|c| fit.project(GeoPoint::new(c.x, c.y)))
                    .collect::<Vec<_>>()
            })
            .collect();

        let stations_shown: Vec<ScreenPoint> = if layer.shows_stations() {
            summary
                .stations
                .iter()
                .filter_map(|&i| stations.get(i))
                .map(|s| fit.project(s.location))
                .collect()
        } else {
            Vec::new()
        };
        let earthquakes_shown: Vec<ScreenPoint> = if layer.shows_earthquakes() {
            summary
                .earthquakes
                .iter()
                .filter_map(|&i| earthquakes.get(i))
                .map(|q| fit.project(q.location))
                .collect()
        } else {
            Vec::new()
        };

        let no_stations = layer.shows_stations() && stations.is_empty();
        let no_earthquakes = layer.shows_earthquakes() && earthquakes.is_empty();
        let message = match layer {
            ActiveLayer::Both if no_stations && no_earthquakes => Some("No data for this country"),
            ActiveLayer::Stations if no_stations => Some("No data for this country"),
            ActiveLayer::Earthquakes if no_earthquakes => Some("No data for this country"),
            _ => None,
        };

        Self {
            rings,
            stations: stations_shown,
            earthquakes: earthquakes_shown,
            message: message.map(str::to_string),
        }
    }
}
