//! Piecewise-flat transfer functions with one color band per cluster.

use crate::color::{ColorPalette, Rgba};
use crate::dendrogram::LeafColorMap;
use crate::errors::{Result, TransitionError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Control point of a transfer function
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub position: f64,
    pub color: Rgba,
}

/// Ordered control points covering [0, 1]. Band `i` spans `[i/k, (i+1)/k]`
/// and shares its end position with the start of band `i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTransferFunction")]
pub struct TransferFunction {
    points: Vec<ControlPoint>,
}

#[derive(Deserialize)]
struct RawTransferFunction {
    points: Vec<ControlPoint>,
}

impl TryFrom<RawTransferFunction> for TransferFunction {
    type Error = TransitionError;

    fn try_from(raw: RawTransferFunction) -> Result<Self> {
        TransferFunction::from_points(raw.points)
    }
}

impl TransferFunction {
    /// Build from one color per band
    pub fn from_band_colors(colors: &[Rgba]) -> Result<Self> {
        let k = colors.len();
        if k == 0 {
            return Err(TransitionError::config(
                "transfer function needs at least one cluster",
            ));
        }
        let mut points = Vec::with_capacity(2 * k);
        for (i, &color) in colors.iter().enumerate() {
            points.push(ControlPoint {
                position: i as f64 / k as f64,
                color,
            });
            points.push(ControlPoint {
                position: (i + 1) as f64 / k as f64,
                color,
            });
        }
        Ok(Self { points })
    }

    /// Validate explicit control points: a start and end point per band,
    /// positions non-decreasing within [0, 1], ending at 1
    pub fn from_points(points: Vec<ControlPoint>) -> Result<Self> {
        if points.is_empty() || points.len() % 2 != 0 {
            return Err(TransitionError::config(format!(
                "transfer function needs two control points per band, got {}",
                points.len()
            )));
        }
        if let Some(p) = points.iter().find(|p| !(0.0..=1.0).contains(&p.position)) {
            return Err(TransitionError::config(format!(
                "control point position {} outside [0, 1]",
                p.position
            )));
        }
        if points.windows(2).any(|w| w[1].position < w[0].position) {
            return Err(TransitionError::config(
                "control point positions must be non-decreasing",
            ));
        }
        if points.last().map(|p| p.position) != Some(1.0) {
            return Err(TransitionError::config("last control point must sit at 1.0"));
        }
        Ok(Self { points })
    }

    /// One band per palette entry, optionally highlighting a single band
    pub fn from_palette(palette: &ColorPalette, highlight: Option<usize>) -> Result<Self> {
        let colors = apply_highlight(palette.colors().to_vec(), highlight)?;
        Self::from_band_colors(&colors)
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// Number of bands
    pub fn bands(&self) -> usize {
        self.points.len() / 2
    }

    /// Color at `position`. On a shared boundary the later band wins.
    pub fn sample(&self, position: f64) -> Rgba {
        let Some(mut color) = self.points.first().map(|p| p.color) else {
            return Rgba::NEUTRAL;
        };
        for point in &self.points {
            if point.position <= position {
                color = point.color;
            } else {
                break;
            }
        }
        color
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).map_err(|e| TransitionError::io(path, e))
    }
}

fn apply_highlight(colors: Vec<Rgba>, highlight: Option<usize>) -> Result<Vec<Rgba>> {
    match highlight {
        None => Ok(colors),
        Some(index) if index >= colors.len() => Err(TransitionError::HighlightOutOfRange {
            index,
            clusters: colors.len(),
        }),
        Some(index) => Ok((0..colors.len())
            .map(|i| if i == index { Rgba::ACCENT } else { Rgba::NEUTRAL })
            .collect()),
    }
}

/// Build the transfer function for `k` clusters from a leaf color map. Each
/// band takes the color of any leaf in that cluster. With `highlight` set,
/// every band is neutral gray except the highlighted one.
pub fn synthesize_transfer_function(
    leaf_colors: &LeafColorMap,
    k: usize,
    highlight: Option<usize>,
) -> Result<TransferFunction> {
    let colors: Vec<Rgba> = (0..k)
        .map(|cluster| {
            leaf_colors.representative(cluster).unwrap_or_else(|| {
                log::warn!("Cluster {} has no leaves, using neutral color", cluster);
                Rgba::NEUTRAL
            })
        })
        .collect();
    let colors = apply_highlight(colors, highlight)?;
    TransferFunction::from_band_colors(&colors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{MergeEvent, MergeTree};
    use crate::color::ColorRamp;
    use crate::dendrogram::DendrogramAugmenter;

    fn colored_leaves() -> LeafColorMap {
        let tree = MergeTree::new(
            4,
            vec![
                MergeEvent { left: 0, right: 1, distance: 0.5 },
                MergeEvent { left: 2, right: 3, distance: 1.0 },
                MergeEvent { left: 4, right: 5, distance: 2.0 },
            ],
        )
        .unwrap();
        DendrogramAugmenter::new(ColorRamp::red_green())
            .augment(tree, 1.0)
            .leaf_colors
    }

    #[test]
    fn test_bands_cover_unit_interval() {
        let tf = synthesize_transfer_function(&colored_leaves(), 2, None).unwrap();
        let positions: Vec<f64> = tf.points().iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![0.0, 0.5, 0.5, 1.0]);
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(tf.bands(), 2);
        assert_eq!(tf.points()[0].color, tf.points()[1].color);
        assert_ne!(tf.points()[1].color, tf.points()[2].color);
    }

    #[test]
    fn test_last_position_exactly_one() {
        let colors = vec![Rgba::NEUTRAL; 7];
        let tf = TransferFunction::from_band_colors(&colors).unwrap();
        assert_eq!(tf.points().last().unwrap().position, 1.0);
    }

    #[test]
    fn test_highlight_mode() {
        let tf = synthesize_transfer_function(&colored_leaves(), 2, Some(1)).unwrap();
        assert_eq!(tf.sample(0.25), Rgba::NEUTRAL);
        assert_eq!(tf.sample(0.75), Rgba::ACCENT);
        assert_eq!(tf.sample(1.0), Rgba::ACCENT);
    }

    #[test]
    fn test_highlight_out_of_range_fails() {
        let err = synthesize_transfer_function(&colored_leaves(), 2, Some(2)).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::HighlightOutOfRange { index: 2, clusters: 2 }
        ));
    }

    #[test]
    fn test_from_palette_and_json() {
        let palette = ColorPalette::sample(&ColorRamp::red_green(), 2);
        let tf = TransferFunction::from_palette(&palette, None).unwrap();
        assert_eq!(tf.sample(0.5), palette.get(1).unwrap());
        let again = TransferFunction::from_json(&tf.to_json().unwrap()).unwrap();
        assert_eq!(tf, again);
    }

    #[test]
    fn test_zero_clusters_rejected() {
        assert!(TransferFunction::from_band_colors(&[]).is_err());
    }

    #[test]
    fn test_json_curve_validated() {
        assert!(TransferFunction::from_json(r#"{"points":[]}"#).is_err());

        let point = |position: f64| format!(
            r#"{{"position":{},"color":{{"r":0.5,"g":0.5,"b":0.5,"a":1.0}}}}"#,
            position
        );
        let short = format!(r#"{{"points":[{},{}]}}"#, point(0.0), point(0.5));
        assert!(TransferFunction::from_json(&short).is_err());
        let backwards = format!(r#"{{"points":[{},{}]}}"#, point(1.0), point(0.5));
        assert!(TransferFunction::from_json(&backwards).is_err());

        let one_band = format!(r#"{{"points":[{},{}]}}"#, point(0.0), point(1.0));
        let tf = TransferFunction::from_json(&one_band).unwrap();
        assert_eq!(tf.bands(), 1);
        assert_eq!(tf.sample(0.3).r, 0.5);
    }
}
