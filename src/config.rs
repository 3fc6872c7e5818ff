//! Provider configuration.
//!
//! Construction inputs mirror what a tiling host hands a provider: tile
//! geometry, zoom bounds, cache TTL, resampling, and the render-option
//! surface. Render options arrive as a loosely-typed bag (the shape hosts
//! load from JSON); [`RenderMode::resolve`] collapses them into a closed
//! sum type exactly once, at construction, so the tile pipeline never
//! re-checks which optional fields were set.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geo::ProjFn;
use crate::raster::ResampleMethod;
use crate::render::{BandExpression, ColorScale, ColorStop};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default maximum zoom level served.
pub const DEFAULT_MAXIMUM_LEVEL: u32 = 18;

/// Default minimum zoom level served.
pub const DEFAULT_MINIMUM_LEVEL: u32 = 0;

/// Default time-to-live for cached tile results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(60_000);

/// Default color scale for single-band rendering.
pub const DEFAULT_COLOR_SCALE: &str = "viridis";

fn default_band() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Render options
// =============================================================================

/// Single-band rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleBandOptions {
    /// 1-based band to render (default 1)
    #[serde(default = "default_band")]
    pub band: u32,

    /// Named color scale; mutually exclusive with `colors`
    #[serde(default)]
    pub color_scale: Option<String>,

    /// Explicit color stops synthesizing a scale
    #[serde(default)]
    pub colors: Option<Vec<ColorStop>>,

    /// Explicit value domain; when absent the resolved band range is used
    #[serde(default)]
    pub domain: Option<(f64, f64)>,

    /// Clamp below-domain samples to the low edge color instead of
    /// rendering them transparent
    #[serde(default = "default_true")]
    pub clamp_low: bool,

    /// Clamp above-domain samples to the high edge color
    #[serde(default = "default_true")]
    pub clamp_high: bool,
}

impl Default for SingleBandOptions {
    fn default() -> Self {
        Self {
            band: 1,
            color_scale: None,
            colors: None,
            domain: None,
            clamp_low: true,
            clamp_high: true,
        }
    }
}

/// One channel of a multi-band composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// 1-based band feeding this channel
    pub band: u32,

    /// Explicit channel minimum; falls back to the resolved band range
    #[serde(default)]
    pub min: Option<f64>,

    /// Explicit channel maximum
    #[serde(default)]
    pub max: Option<f64>,
}

/// Multi-band (R/G/B) rendering options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiBandOptions {
    pub r: ChannelSpec,
    pub g: ChannelSpec,
    pub b: ChannelSpec,
}

/// The render-option surface as hosts supply it.
///
/// At most one of `convert_to_rgb`, `expression`, `multi`, `single` should
/// be set; precedence among them is fixed by [`RenderMode::resolve`].
#[derive(Clone, Default)]
pub struct RenderOptions {
    /// Override for the file's nodata sentinel
    pub nodata: Option<f64>,

    /// Use the decoder's RGB conversion over bands 1..3
    pub convert_to_rgb: bool,

    pub single: Option<SingleBandOptions>,

    pub multi: Option<MultiBandOptions>,

    /// Host-supplied arithmetic expression over band values
    pub expression: Option<Arc<dyn BandExpression>>,
}

// =============================================================================
// RenderMode
// =============================================================================

/// Resolved single-band mode: either a plain band through a scale, or an
/// expression that supplies its own value domain.
#[derive(Clone)]
pub struct SingleBandMode {
    pub band: u32,
    pub expression: Option<Arc<dyn BandExpression>>,
    pub scale: ColorScale,
    pub domain: Option<(f64, f64)>,
    pub clamp_low: bool,
    pub clamp_high: bool,
}

impl std::fmt::Debug for SingleBandMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleBandMode")
            .field("band", &self.band)
            .field("expression", &self.expression.as_ref().map(|_| "<expr>"))
            .field("scale", &self.scale)
            .field("domain", &self.domain)
            .field("clamp_low", &self.clamp_low)
            .field("clamp_high", &self.clamp_high)
            .finish()
    }
}

/// The closed set of rendering modes; exactly one is active per provider.
#[derive(Clone, Debug)]
pub enum RenderMode {
    Single(SingleBandMode),
    Multi {
        r: ChannelSpec,
        g: ChannelSpec,
        b: ChannelSpec,
    },
    ConvertToRgb,
}

impl RenderMode {
    /// Collapse the render-option surface into one mode, validating band
    /// references against the source's sample count.
    ///
    /// Defaults when nothing is selected: RGB conversion for sources with
    /// three or more bands, otherwise band 1 through the default scale.
    pub fn resolve(options: &RenderOptions, samples: u32) -> Result<Self, ConfigError> {
        if options.convert_to_rgb {
            if samples < 3 {
                return Err(ConfigError::RgbConversionUnsupported { samples });
            }
            return Ok(RenderMode::ConvertToRgb);
        }

        if let Some(expr) = &options.expression {
            for band in expr.bands() {
                check_band(band, samples)?;
            }
            let single = options.single.clone().unwrap_or_default();
            return Ok(RenderMode::Single(SingleBandMode {
                band: single.band.max(1),
                expression: Some(expr.clone()),
                scale: resolve_scale(&single)?,
                domain: None,
                clamp_low: single.clamp_low,
                clamp_high: single.clamp_high,
            }));
        }

        if let Some(multi) = &options.multi {
            for channel in [&multi.r, &multi.g, &multi.b] {
                check_band(channel.band, samples)?;
            }
            return Ok(RenderMode::Multi {
                r: multi.r,
                g: multi.g,
                b: multi.b,
            });
        }

        if let Some(single) = &options.single {
            check_band(single.band, samples)?;
            return Ok(RenderMode::Single(SingleBandMode {
                band: single.band,
                expression: None,
                scale: resolve_scale(single)?,
                domain: single.domain,
                clamp_low: single.clamp_low,
                clamp_high: single.clamp_high,
            }));
        }

        // Nothing selected: RGB for multi-band sources, band 1 otherwise
        if samples >= 3 {
            return Ok(RenderMode::ConvertToRgb);
        }
        let defaults = SingleBandOptions::default();
        Ok(RenderMode::Single(SingleBandMode {
            band: 1,
            expression: None,
            scale: resolve_scale(&defaults)?,
            domain: None,
            clamp_low: true,
            clamp_high: true,
        }))
    }

    /// 1-based bands a raw (non-RGB-converted) decode must read for this
    /// mode, sorted and deduplicated. Empty for [`RenderMode::ConvertToRgb`],
    /// which decodes through the RGB path instead.
    pub fn read_bands(&self) -> Vec<u32> {
        let mut bands = match self {
            RenderMode::Single(single) => match &single.expression {
                Some(expr) => expr.bands(),
                None => vec![single.band],
            },
            RenderMode::Multi { r, g, b } => vec![r.band, g.band, b.band],
            RenderMode::ConvertToRgb => Vec::new(),
        };
        bands.sort_unstable();
        bands.dedup();
        bands
    }

    /// Whether this mode renders through the band-compositing worker path.
    pub fn uses_compositor(&self) -> bool {
        matches!(self, RenderMode::Multi { .. } | RenderMode::ConvertToRgb)
    }
}

fn check_band(band: u32, samples: u32) -> Result<(), ConfigError> {
    if band == 0 || band > samples {
        return Err(ConfigError::BandOutOfRange { band, samples });
    }
    Ok(())
}

fn resolve_scale(options: &SingleBandOptions) -> Result<ColorScale, ConfigError> {
    if let Some(stops) = &options.colors {
        return ColorScale::from_stops(stops);
    }
    ColorScale::named(options.color_scale.as_deref().unwrap_or(DEFAULT_COLOR_SCALE))
}

// =============================================================================
// Provider options
// =============================================================================

/// Construction inputs for a provider.
#[derive(Clone)]
pub struct ProviderOptions {
    /// Tile edge length in pixels
    pub tile_size: u32,

    /// Highest zoom level served; capped by the pyramid depth
    pub maximum_level: u32,

    /// Lowest zoom level served
    pub minimum_level: u32,

    /// Serve point probes through `pick_features`
    pub enable_pick_features: bool,

    /// Whether rendered tiles carry an alpha channel
    pub has_alpha_channel: bool,

    /// Rendering configuration
    pub render: RenderOptions,

    /// Host projection hook consulted before automatic CRS resolution
    pub proj_fn: Option<Arc<ProjFn>>,

    /// Time-to-live for cached tile results; zero disables caching
    pub cache_ttl: Duration,

    /// Resampling method for decode output scaling
    pub resample_method: ResampleMethod,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            maximum_level: DEFAULT_MAXIMUM_LEVEL,
            minimum_level: DEFAULT_MINIMUM_LEVEL,
            enable_pick_features: true,
            has_alpha_channel: true,
            render: RenderOptions::default(),
            proj_fn: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            resample_method: ResampleMethod::Nearest,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
