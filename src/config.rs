use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::animation::DEFAULT_DURATION;
use crate::drag::DEFAULT_SENSITIVITY;
use crate::drilldown::ActiveLayer;
use crate::projection::{Rotation, HEMISPHERE_CLIP_DEGREES};
use crate::style::Rgb;
use crate::sync::MarkerStyle;
use crate::viewport::DEFAULT_MARGIN;

const LOCAL_CONFIG: &str = "seismoglobe.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub globe: GlobeConfig,
    pub markers: MarkersConfig,
    pub search: SearchConfig,
    pub data: DataConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GlobeConfig {
    pub default_rotation: [f64; 2], // [longitude, latitude]
    pub sensitivity: f64,           // degrees per pixel
    pub margin: f64,
    pub clip_angle: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MarkersConfig {
    pub quake_radius_factor: f64,
    pub quake_hover_factor: f64,
    pub quake_opacity: f64,
    pub station_opacity: f64,
    pub quake_low_color: Rgb,
    pub quake_high_color: Rgb,
    pub station_color: Rgb,
    pub hover_tolerance: f64, // canvas units
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub animation_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub earthquakes: PathBuf,
    pub stations: PathBuf,
    pub countries: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub refresh_rate: u64,   // milliseconds between input polls
    pub frame_interval: u64, // milliseconds between animation frames
    pub log_file: PathBuf,
    pub export_dir: PathBuf, // where `s` writes SVG snapshots
    pub active_layer: ActiveLayer,
    pub country_color: Rgb,
    pub highlight_color: Rgb,
}

impl Default for GlobeConfig {
    fn default() -> Self {
        Self {
            default_rotation: Rotation::default().as_array(),
            sensitivity: DEFAULT_SENSITIVITY,
            margin: DEFAULT_MARGIN,
            clip_angle: HEMISPHERE_CLIP_DEGREES,
        }
    }
}

impl Default for MarkersConfig {
    fn default() -> Self {
        let style = MarkerStyle::default();
        Self {
            quake_radius_factor: style.radius_factor,
            quake_hover_factor: 4.0,
            quake_opacity: style.earthquake_opacity,
            station_opacity: style.station_opacity,
            quake_low_color: style.low,
            quake_high_color: style.high,
            station_color: style.station_color,
            hover_tolerance: 4.0,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            animation_ms: DEFAULT_DURATION.as_millis() as u64,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            earthquakes: PathBuf::from("data/earthquakes.csv"),
            stations: PathBuf::from("data/stations.csv"),
            countries: PathBuf::from("data/countries.geojson"),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 50,
            frame_interval: 16,
            log_file: PathBuf::from("seismoglobe.log"),
            export_dir: PathBuf::from("."),
            active_layer: ActiveLayer::default(),
            country_color: Rgb(0x6b, 0x8e, 0x23),
            highlight_color: Rgb(0xff, 0xa5, 0x00),
        }
    }
}

impl GlobeConfig {
    pub fn initial_rotation(&self) -> Rotation {
        Rotation::from(self.default_rotation)
    }
}

impl MarkersConfig {
    pub fn style(&self) -> MarkerStyle {
        MarkerStyle {
            earthquake_opacity: self.quake_opacity,
            station_opacity: self.station_opacity,
            station_color: self.station_color,
            low: self.quake_low_color,
            high: self.quake_high_color,
            radius_factor: self.quake_radius_factor,
        }
    }
}

impl SearchConfig {
    pub fn animation(&self) -> Duration {
        Duration::from_millis(self.animation_ms)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// First existing file of: `explicit`, `./seismoglobe.toml`, the user
    /// config directory. Falls back to defaults when none exists.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG)).chain(
            dirs::config_dir().map(|dir| dir.join("seismoglobe").join("config.toml")),
        );
        for path in candidates {
            if path.is_file() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.globe.default_rotation, [0.0, -20.0]);
        assert_eq!(config.globe.sensitivity, 0.8);
        assert_eq!(config.globe.margin, 0.9);
        assert_eq!(config.markers.quake_radius_factor, 2.0);
        assert_eq!(config.markers.quake_opacity, 0.8);
        assert_eq!(config.search.animation(), Duration::from_millis(1100));
        assert_eq!(config.display.active_layer, ActiveLayer::Stations);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r##"
[globe]
default_rotation = [30.0, -10.0]

[markers]
quake_low_color = "#102030"

[display]
active_layer = "both"
"##
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.globe.initial_rotation(), Rotation::new(30.0, -10.0));
        assert_eq!(config.globe.sensitivity, 0.8);
        assert_eq!(config.markers.quake_low_color, Rgb(0x10, 0x20, 0x30));
        assert_eq!(config.markers.style().high, MarkerStyle::default().high);
        assert_eq!(config.display.active_layer, ActiveLayer::Both);
        assert_eq!(config.display.refresh_rate, 50);
    }

    #[test]
    fn test_bad_color_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[display]\ncountry_color = \"green\"").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_explicit_path_wins() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[search]\nanimation_ms = 250").unwrap();

        let (config, source) = Config::discover(Some(file.path())).unwrap();
        assert_eq!(config.search.animation_ms, 250);
        assert_eq!(source.as_deref(), Some(file.path()));
        assert!(Config::discover(Some(Path::new("/nonexistent/seismoglobe.toml"))).is_err());
    }
}
