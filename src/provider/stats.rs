//! Band value-range resolution.
//!
//! Runs once at construction, all bands concurrently. Embedded statistics
//! metadata wins; explicit configuration comes next; the last resort reads
//! the band's full raster from the coarsest overview and scans it, which is
//! expensive enough to warrant a warning.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::warn;

use crate::config::RenderMode;
use crate::error::DecodeError;
use crate::raster::{DecodePool, ImageMeta, RasterSource, ReadRequest, ResampleMethod, Window};

/// Resolve `(min, max)` for each band in `bands`, keyed by 1-based band
/// number.
///
/// Priority per band:
/// 1. embedded statistics metadata,
/// 2. `[0, 255]` under RGB conversion,
/// 3. an explicit multi-band channel range for this band,
/// 4. an explicit single-band domain for this exact band,
/// 5. an empirical scan of the coarsest overview (NaN samples dropped).
///
/// Expression rendering supplies its own domain, so its bands never reach
/// this resolver; callers skip it entirely in that mode.
///
/// The empirical fallback only sees the coarsest overview. If the dataset's
/// value range differs at finer resolutions the resolved range will be off;
/// the emitted warning is the operator's cue to embed statistics instead.
pub async fn resolve_ranges(
    source: &Arc<dyn RasterSource>,
    coarsest: &Arc<ImageMeta>,
    bands: &[u32],
    mode: &RenderMode,
    pool: &Arc<DecodePool>,
) -> Result<HashMap<u32, (f64, f64)>, DecodeError> {
    let resolutions = bands
        .iter()
        .map(|&band| resolve_band(source, coarsest, band, mode, pool));
    let ranges = try_join_all(resolutions).await?;
    Ok(ranges.into_iter().collect())
}

async fn resolve_band(
    source: &Arc<dyn RasterSource>,
    coarsest: &Arc<ImageMeta>,
    band: u32,
    mode: &RenderMode,
    pool: &Arc<DecodePool>,
) -> Result<(u32, (f64, f64)), DecodeError> {
    if let Some(range) = coarsest.band_metadata(band).and_then(|meta| meta.range()) {
        return Ok((band, range));
    }

    match mode {
        RenderMode::ConvertToRgb => return Ok((band, (0.0, 255.0))),
        RenderMode::Multi { r, g, b } => {
            for channel in [r, g, b] {
                if channel.band == band {
                    if let (Some(min), Some(max)) = (channel.min, channel.max) {
                        return Ok((band, (min, max)));
                    }
                }
            }
        }
        RenderMode::Single(single) => {
            if single.expression.is_none() && single.band == band {
                if let Some(domain) = single.domain {
                    return Ok((band, domain));
                }
            }
        }
    }

    warn!(
        band,
        "no statistics metadata or configured range for band {band}; \
         scanning the coarsest overview for an empirical range"
    );
    let request = ReadRequest {
        image_index: 0,
        window: Window::full(coarsest),
        out_width: coarsest.width,
        out_height: coarsest.height,
        bands: vec![band],
        resample: ResampleMethod::Nearest,
        pool: pool.clone(),
    };
    let data = source.read_window(request).await?;

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    if let Some(plane) = data.planes.first() {
        for &value in plane.iter().filter(|v| !v.is_nan()) {
            min = min.min(f64::from(value));
            max = max.max(f64::from(value));
        }
    }
    if min > max {
        // Every sample was NaN; fall back to a degenerate range
        warn!(band, "band {band} has no finite samples, using [0, 0]");
        return Ok((band, (0.0, 0.0)));
    }
    Ok((band, (min, max)))
}

// =============================================================================
// Tests
// =============================================================================
