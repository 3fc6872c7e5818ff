//! Pixel-window computation for tile requests.
//!
//! The tiling scheme has one root tile per axis, so zoom `z` divides an
//! overview into `2^z x 2^z` tiles. Per-tile extents are fractional; tile
//! edges round to integer pixels (round, not truncate) so that adjacent
//! tiles share exact boundaries and rounding drift never accumulates
//! across a row.

use crate::raster::Window;

/// Pixel window of tile (x, y) at `zoom` within an overview of
/// `width x height` pixels.
///
/// Edges clamp to the overview dimensions, so out-of-range tile coordinates
/// produce an empty window rather than reading past the image.
pub fn tile_window(width: u32, height: u32, x: u32, y: u32, zoom: u32) -> Window {
    let tiles = f64::from(1u32 << zoom.min(31));
    let tile_width = f64::from(width) / tiles;
    let tile_height = f64::from(height) / tiles;

    let clamp_x = |edge: f64| (edge.round() as u32).min(width);
    let clamp_y = |edge: f64| (edge.round() as u32).min(height);

    Window {
        x0: clamp_x(f64::from(x) * tile_width),
        y0: clamp_y(f64::from(y) * tile_height),
        x1: clamp_x(f64::from(x + 1) * tile_width),
        y1: clamp_y(f64::from(y + 1) * tile_height),
    }
}

// =============================================================================
// Tests
// =============================================================================
