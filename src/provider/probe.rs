//! Point-probe window computation.
//!
//! A probe turns a geographic point into a 1x1 pixel window in the overview
//! backing the (clamped) request zoom. Probes bypass the tile cache
//! entirely; every call decodes fresh.

use crate::geo::SpatialExtent;
use crate::raster::{ImageMeta, Window};

/// 1x1 window under a geographic point (radians), or `None` when the point
/// falls outside the dataset rectangle.
///
/// Longitude goes through the same antimeridian normalization as extent
/// resolution, so points just east of the dateline probe into
/// antimeridian-crossing datasets correctly.
pub(crate) fn probe_window(
    extent: &SpatialExtent,
    meta: &ImageMeta,
    lon: f64,
    lat: f64,
) -> Option<Window> {
    if meta.width == 0 || meta.height == 0 {
        return None;
    }

    let lon = extent.normalize_lon(lon);
    let fx = (lon - extent.west) / extent.width();
    let fy = (extent.north - lat) / extent.height();
    if !(0.0..=1.0).contains(&fx) || !(0.0..=1.0).contains(&fy) {
        return None;
    }

    let px = ((fx * f64::from(meta.width)) as u32).min(meta.width - 1);
    let py = ((fy * f64::from(meta.height)) as u32).min(meta.height - 1);
    Some(Window {
        x0: px,
        y0: py,
        x1: px + 1,
        y1: py + 1,
    })
}

// =============================================================================
// Tests
// =============================================================================
