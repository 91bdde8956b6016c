//! Colors, ramps and per-cluster palettes.

use crate::errors::{Result, TransitionError};
use serde::{Deserialize, Serialize};

/// Linear RGBA color with components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: f64, g: f64, b: f64) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Neutral gray used for non-highlighted bands
    pub const NEUTRAL: Rgba = Rgba::opaque(0.75, 0.75, 0.75);

    /// Dark blue accent for the highlighted band
    pub const ACCENT: Rgba = Rgba::opaque(0.12, 0.16, 0.47);

    pub fn lerp(&self, other: &Rgba, t: f64) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        Rgba {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }

    /// `#rrggbbaa`
    pub fn to_hex(&self) -> String {
        let byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02x}{:02x}{:02x}{:02x}",
            byte(self.r),
            byte(self.g),
            byte(self.b),
            byte(self.a)
        )
    }
}

/// Piecewise-linear color ramp over [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawColorRamp")]
pub struct ColorRamp {
    points: Vec<(f64, Rgba)>,
}

#[derive(Deserialize)]
struct RawColorRamp {
    points: Vec<(f64, Rgba)>,
}

impl TryFrom<RawColorRamp> for ColorRamp {
    type Error = TransitionError;

    fn try_from(raw: RawColorRamp) -> Result<Self> {
        ColorRamp::new(raw.points)
    }
}

impl ColorRamp {
    /// Build from control points; positions must lie in [0, 1]. Points are
    /// sorted by position.
    pub fn new(mut points: Vec<(f64, Rgba)>) -> Result<Self> {
        if points.is_empty() {
            return Err(TransitionError::config("color ramp needs at least one point"));
        }
        if let Some((pos, _)) = points
            .iter()
            .find(|(pos, _)| !(0.0..=1.0).contains(pos))
        {
            return Err(TransitionError::config(format!(
                "color ramp position {} outside [0, 1]",
                pos
            )));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { points })
    }

    /// Green at 0 to red at 1
    pub fn red_green() -> Self {
        Self {
            points: vec![
                (0.0, Rgba::opaque(0.0, 1.0, 0.0)),
                (1.0, Rgba::opaque(1.0, 0.0, 0.0)),
            ],
        }
    }

    /// Blue, cyan, yellow, red
    pub fn spectral() -> Self {
        Self {
            points: vec![
                (0.0, Rgba::opaque(0.19, 0.21, 0.58)),
                (0.33, Rgba::opaque(0.27, 0.68, 0.76)),
                (0.66, Rgba::opaque(0.99, 0.85, 0.35)),
                (1.0, Rgba::opaque(0.84, 0.19, 0.15)),
            ],
        }
    }

    /// Look up a named preset
    pub fn preset(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "red_green" | "red-green" => Ok(Self::red_green()),
            "spectral" => Ok(Self::spectral()),
            other => Err(TransitionError::config(format!("unknown color ramp '{}'", other))),
        }
    }

    pub fn points(&self) -> &[(f64, Rgba)] {
        &self.points
    }

    /// Color at `x`, clamped to the first/last point outside their range
    pub fn sample(&self, x: f64) -> Rgba {
        let (Some(&first), Some(&last)) = (self.points.first(), self.points.last()) else {
            return Rgba::NEUTRAL;
        };
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        for pair in self.points.windows(2) {
            let (p0, c0) = pair[0];
            let (p1, c1) = pair[1];
            if x >= p0 && x <= p1 {
                if p1 == p0 {
                    return c1;
                }
                return c0.lerp(&c1, (x - p0) / (p1 - p0));
            }
        }
        last.1
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self::red_green()
    }
}

/// `k` colors, one per cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorPalette {
    colors: Vec<Rgba>,
}

impl ColorPalette {
    /// Sample `k` colors at band centers `(i + 0.5) / k`
    pub fn sample(ramp: &ColorRamp, k: usize) -> Self {
        let colors = (0..k)
            .map(|i| ramp.sample((i as f64 + 0.5) / k as f64))
            .collect();
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, cluster: usize) -> Option<Rgba> {
        self.colors.get(cluster).copied()
    }

    pub fn colors(&self) -> &[Rgba] {
        &self.colors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_red_green_ramp() {
        let ramp = ColorRamp::red_green();
        let mid = ramp.sample(0.25);
        assert_relative_eq!(mid.r, 0.25);
        assert_relative_eq!(mid.g, 0.75);
        assert_eq!(ramp.sample(-1.0), Rgba::opaque(0.0, 1.0, 0.0));
        assert_eq!(ramp.sample(2.0), Rgba::opaque(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_palette_band_centers() {
        let palette = ColorPalette::sample(&ColorRamp::red_green(), 2);
        assert_eq!(palette.len(), 2);
        assert_relative_eq!(palette.get(0).unwrap().r, 0.25);
        assert_relative_eq!(palette.get(1).unwrap().r, 0.75);
        assert!(palette.get(2).is_none());
    }

    #[test]
    fn test_ramp_validation() {
        assert!(ColorRamp::new(vec![]).is_err());
        assert!(ColorRamp::new(vec![(1.5, Rgba::NEUTRAL)]).is_err());
        let ramp = ColorRamp::new(vec![(1.0, Rgba::ACCENT), (0.0, Rgba::NEUTRAL)]).unwrap();
        assert_eq!(ramp.points()[0].1, Rgba::NEUTRAL);
    }

    #[test]
    fn test_ramp_deserialize_validates() {
        let json = serde_json::to_string(&ColorRamp::spectral()).unwrap();
        let ramp: ColorRamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ramp.points().len(), 4);

        assert!(serde_json::from_str::<ColorRamp>(r#"{"points":[]}"#).is_err());
        let outside = r#"{"points":[[2.0,{"r":0.0,"g":0.0,"b":0.0,"a":1.0}]]}"#;
        assert!(serde_json::from_str::<ColorRamp>(outside).is_err());
    }

    #[test]
    fn test_hex() {
        assert_eq!(Rgba::opaque(1.0, 0.0, 0.0).to_hex(), "#ff0000ff");
        assert!(ColorRamp::preset("viridis").is_err());
    }
}
