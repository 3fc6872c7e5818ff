//! Pyramid level selection.
//!
//! Maps quad-tree zoom levels onto overview indices. Overviews are indexed
//! coarsest-first (0 = coarsest), so the map is a plain `Vec<usize>` where
//! position is the zoom level.
//!
//! Two wrinkles beyond a 1:1 mapping:
//! - An oversized coarsest overview (larger than one tile) is repeated for
//!   the lowest zooms, one extra level per tile-size multiple, so the switch
//!   to finer overviews happens at zooms where tile windows are near the
//!   nominal tile size instead of many times larger.
//! - Overviews smaller than half a tile are skipped entirely; they carry too
//!   little native resolution to be worth a level of their own.

/// Build the zoom-to-overview map.
///
/// `sizes[i]` is `(width, height)` of overview `i`, 0 = coarsest. The result
/// is dense from zoom 0 and monotonically non-decreasing, ending at the
/// finest overview. The effective maximum zoom a provider serves is
/// `min(configured_max, result.len() - 1)`.
pub fn resolve_levels(sizes: &[(u32, u32)], tile_size: u32) -> Vec<usize> {
    let count = sizes.len();
    let mut levels = Vec::with_capacity(count);
    if count == 0 {
        return levels;
    }

    let side = |index: usize| sizes[index].0.max(sizes[index].1);

    // Repeat an oversized coarsest overview for the lowest zooms
    let coarsest = side(0);
    if coarsest > tile_size {
        let extra = (coarsest - tile_size).div_ceil(tile_size) as usize;
        levels.extend(std::iter::repeat(0).take(extra));
    }

    // The coarsest overview still holding at least half a tile of native
    // resolution; everything coarser is skipped
    let max_acceptable = (0..count)
        .find(|&index| f64::from(side(index)) > f64::from(tile_size) * 0.5)
        .unwrap_or(0);

    levels.extend(max_acceptable..count);
    levels
}

// =============================================================================
// Tests
// =============================================================================
