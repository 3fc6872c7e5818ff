//! Single-band color mapping.
//!
//! The color-mapping engine renders one band (or the output of a
//! host-supplied arithmetic expression) through a color scale: a handful of
//! named built-in scales plus scales synthesized from explicit stop lists.
//! Nodata and NaN samples render fully transparent; samples outside the
//! value domain either clamp to the edge color or drop out, per the clamp
//! policy.

use std::collections::HashMap;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// =============================================================================
// Color stops
// =============================================================================

/// One stop of a custom color scale: a normalized position in `[0, 1]` and
/// a `#rrggbb` color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub offset: f32,
    pub color: String,
}

/// Parse a `#rrggbb` hex color.
fn hex_to_rgb(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

// =============================================================================
// ColorScale
// =============================================================================

/// A compiled color scale: sorted stops with linear interpolation between
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    stops: Vec<(f32, [u8; 3])>,
}

/// Built-in named scales, each a compact stop table.
const NAMED_SCALES: &[(&str, &[(f32, &str)])] = &[
    (
        "viridis",
        &[
            (0.0, "#440154"),
            (0.25, "#3b528b"),
            (0.5, "#21918c"),
            (0.75, "#5ec962"),
            (1.0, "#fde725"),
        ],
    ),
    (
        "inferno",
        &[
            (0.0, "#000004"),
            (0.25, "#57106e"),
            (0.5, "#bc3754"),
            (0.75, "#f98e09"),
            (1.0, "#fcffa4"),
        ],
    ),
    (
        "rainbow",
        &[
            (0.0, "#96005a"),
            (0.2, "#0000c8"),
            (0.4, "#00ffff"),
            (0.6, "#00ff00"),
            (0.8, "#ffff00"),
            (1.0, "#ff0000"),
        ],
    ),
    (
        "jet",
        &[
            (0.0, "#00007f"),
            (0.125, "#0000ff"),
            (0.375, "#00ffff"),
            (0.625, "#ffff00"),
            (0.875, "#ff0000"),
            (1.0, "#7f0000"),
        ],
    ),
    (
        "hot",
        &[
            (0.0, "#000000"),
            (0.4, "#ff0000"),
            (0.8, "#ffff00"),
            (1.0, "#ffffff"),
        ],
    ),
    ("greys", &[(0.0, "#000000"), (1.0, "#ffffff")]),
];

impl ColorScale {
    /// Look up a built-in scale by name.
    pub fn named(name: &str) -> Result<Self, ConfigError> {
        let table = NAMED_SCALES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, stops)| *stops)
            .ok_or_else(|| ConfigError::UnknownColorScale(name.to_string()))?;

        let stops = table
            .iter()
            .map(|&(offset, hex)| {
                let rgb = hex_to_rgb(hex).ok_or_else(|| {
                    ConfigError::InvalidColorStop(hex.to_string())
                })?;
                Ok((offset, rgb))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { stops })
    }

    /// Synthesize a scale from explicit stops.
    pub fn from_stops(stops: &[ColorStop]) -> Result<Self, ConfigError> {
        if stops.len() < 2 {
            return Err(ConfigError::TooFewStops(stops.len()));
        }

        let mut compiled = stops
            .iter()
            .map(|stop| {
                let rgb = hex_to_rgb(&stop.color)
                    .ok_or_else(|| ConfigError::InvalidColorStop(stop.color.clone()))?;
                Ok((stop.offset.clamp(0.0, 1.0), rgb))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        compiled.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(Self { stops: compiled })
    }

    /// Names of the built-in scales.
    pub fn names() -> impl Iterator<Item = &'static str> {
        NAMED_SCALES.iter().map(|(name, _)| *name)
    }

    /// Sample the scale at a normalized position, clamped to `[0, 1]`.
    pub fn sample(&self, t: f32) -> [u8; 3] {
        let t = t.clamp(0.0, 1.0);

        let mut lower = self.stops[0];
        for &stop in &self.stops {
            if stop.0 <= t {
                lower = stop;
            } else {
                let span = stop.0 - lower.0;
                if span <= f32::EPSILON {
                    return lower.1;
                }
                let frac = (t - lower.0) / span;
                let mut rgb = [0u8; 3];
                for (i, channel) in rgb.iter_mut().enumerate() {
                    let a = lower.1[i] as f32;
                    let b = stop.1[i] as f32;
                    *channel = (a + (b - a) * frac).round() as u8;
                }
                return rgb;
            }
        }
        lower.1
    }
}

// =============================================================================
// Band expressions
// =============================================================================

/// Host-supplied arithmetic expression over band values.
///
/// Expression mode supplies its own value domain, so bands it consumes
/// bypass range resolution entirely.
pub trait BandExpression: Send + Sync {
    /// 1-based band numbers the expression reads, in evaluation order.
    fn bands(&self) -> Vec<u32>;

    /// Value domain of the expression output.
    fn domain(&self) -> (f64, f64);

    /// Evaluate at one pixel. `samples` is ordered as [`Self::bands`].
    fn evaluate(&self, samples: &[f32]) -> f32;
}

// =============================================================================
// TileDataset
// =============================================================================

/// Decoded band planes for one tile, keyed by 1-based band number.
///
/// Built per request so concurrent tile renders never share mutable state.
#[derive(Debug, Clone, Default)]
pub struct TileDataset {
    width: u32,
    height: u32,
    planes: HashMap<u32, Vec<f32>>,
}

impl TileDataset {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            planes: HashMap::new(),
        }
    }

    /// Register one band's plane.
    pub fn insert(&mut self, band: u32, plane: Vec<f32>) {
        self.planes.insert(band, plane);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn plane(&self, band: u32) -> Option<&[f32]> {
        self.planes.get(&band).map(Vec::as_slice)
    }
}

// =============================================================================
// ColorMapper
// =============================================================================

/// Per-provider color-mapping engine.
///
/// Holds the resolved scale, nodata and clamp policy; per-tile pixel data
/// arrives through a [`TileDataset`] at render time.
pub struct ColorMapper {
    scale: ColorScale,
    nodata: Option<f64>,
    clamp_low: bool,
    clamp_high: bool,
}

impl ColorMapper {
    pub fn new(scale: ColorScale, nodata: Option<f64>, clamp_low: bool, clamp_high: bool) -> Self {
        Self {
            scale,
            nodata,
            clamp_low,
            clamp_high,
        }
    }

    fn is_nodata(&self, value: f32) -> bool {
        if value.is_nan() {
            return true;
        }
        match self.nodata {
            Some(nodata) => value as f64 == nodata,
            None => false,
        }
    }

    /// Map one sample to a pixel given a value domain.
    fn map_value(&self, value: f32, min: f64, max: f64) -> Rgba<u8> {
        if self.is_nodata(value) {
            return Rgba([0, 0, 0, 0]);
        }

        let span = max - min;
        let mut t = if span > 0.0 {
            ((value as f64 - min) / span) as f32
        } else {
            0.0
        };

        if t < 0.0 {
            if !self.clamp_low {
                return Rgba([0, 0, 0, 0]);
            }
            t = 0.0;
        }
        if t > 1.0 {
            if !self.clamp_high {
                return Rgba([0, 0, 0, 0]);
            }
            t = 1.0;
        }

        let [r, g, b] = self.scale.sample(t);
        Rgba([r, g, b, 255])
    }

    /// Render one registered band through the scale.
    ///
    /// Bands missing from the dataset render fully transparent.
    pub fn render_band(
        &self,
        dataset: &TileDataset,
        band: u32,
        domain: (f64, f64),
    ) -> RgbaImage {
        let (width, height) = (dataset.width(), dataset.height());
        let mut out = RgbaImage::new(width, height);

        if let Some(plane) = dataset.plane(band) {
            for (i, pixel) in out.pixels_mut().enumerate() {
                let value = plane.get(i).copied().unwrap_or(f32::NAN);
                *pixel = self.map_value(value, domain.0, domain.1);
            }
        }
        out
    }

    /// Evaluate an expression over the registered bands and render the
    /// result through the scale with the expression's own domain.
    pub fn render_expression(
        &self,
        dataset: &TileDataset,
        expr: &Arc<dyn BandExpression>,
    ) -> RgbaImage {
        let (width, height) = (dataset.width(), dataset.height());
        let mut out = RgbaImage::new(width, height);

        let bands = expr.bands();
        let planes: Vec<Option<&[f32]>> = bands.iter().map(|&b| dataset.plane(b)).collect();
        let domain = expr.domain();

        let mut samples = vec![0.0f32; bands.len()];
        for (i, pixel) in out.pixels_mut().enumerate() {
            let mut valid = true;
            for (slot, plane) in samples.iter_mut().zip(&planes) {
                let value = plane.and_then(|p| p.get(i).copied()).unwrap_or(f32::NAN);
                if self.is_nodata(value) {
                    valid = false;
                    break;
                }
                *slot = value;
            }
            *pixel = if valid {
                self.map_value(expr.evaluate(&samples), domain.0, domain.1)
            } else {
                Rgba([0, 0, 0, 0])
            };
        }
        out
    }
}

// =============================================================================
// Tests
// =============================================================================
