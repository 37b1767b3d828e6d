use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::records::EarthquakeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Channel-wise linear blend, `t` clamped to [0, 1].
    pub fn mix(self, other: Rgb, t: f64) -> Rgb {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb(
            lerp(self.0, other.0),
            lerp(self.1, other.1),
            lerp(self.2, other.2),
        )
    }

    /// Darken by 0.7 per unit of `k`.
    pub fn darker(self, k: f64) -> Rgb {
        let f = 0.7f64.powf(k);
        let scale = |c: u8| (c as f64 * f).round().clamp(0.0, 255.0) as u8;
        Rgb(scale(self.0), scale(self.1), scale(self.2))
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        // "#rrggbbaa" is accepted; alpha is ignored.
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(format!("expected #rrggbb colour, got {s:?}"));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("{s:?}: {e}"))
        };
        Ok(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Magnitude → marker radius and colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnitudeScale {
    pub min: f64,
    pub max: f64,
    pub low: Rgb,
    pub high: Rgb,
    pub radius_factor: f64,
}

impl MagnitudeScale {
    /// Domain taken from the data set; an empty set gives [0, 5].
    pub fn from_records(records: &[EarthquakeRecord], low: Rgb, high: Rgb, radius_factor: f64) -> Self {
        let (min, max) = magnitude_extent(records).unwrap_or((0.0, 5.0));
        Self {
            min,
            max,
            low,
            high,
            radius_factor,
        }
    }

    pub fn radius(&self, magnitude: f64) -> f64 {
        self.radius_with(magnitude, self.radius_factor)
    }

    /// Radius under another factor, e.g. the enlarged hover marker.
    pub fn radius_with(&self, magnitude: f64, factor: f64) -> f64 {
        magnitude.abs().sqrt() * factor
    }

    pub fn color(&self, magnitude: f64) -> Rgb {
        let span = self.max - self.min;
        let t = if span > 0.0 {
            (magnitude - self.min) / span
        } else {
            0.0
        };
        self.low.mix(self.high, t)
    }
}

pub fn magnitude_extent(records: &[EarthquakeRecord]) -> Option<(f64, f64)> {
    records.iter().map(|r| r.magnitude).fold(None, |acc, m| match acc {
        None => Some((m, m)),
        Some((lo, hi)) => Some((lo.min(m), hi.max(m))),
    })
}

/// Labels of the magnitude colour legend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Legend {
    pub min: String,
    pub mid: String,
    pub max: String,
}

impl Legend {
    /// `None` for an empty data set; the legend stays blank.
    pub fn from_records(records: &[EarthquakeRecord]) -> Option<Self> {
        let (lo, hi) = magnitude_extent(records)?;
        let min = format!("{lo:.1}");
        let max = format!("{hi:.1}");
        // Midpoint of the rounded labels so the three read consistently.
        let mid = (min.parse::<f64>().unwrap_or(lo) + max.parse::<f64>().unwrap_or(hi)) / 2.0;
        Some(Self {
            min,
            mid: format!("{mid:.1}"),
            max,
        })
    }
}
