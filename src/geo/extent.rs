//! Dataset extent resolution.
//!
//! Runs once at provider construction: turns the source's projected
//! bounding box into a geographic rectangle in radians, building a
//! coordinate transform when the source CRS is not already lon/lat.
//! A dataset spanning the antimeridian arrives with `east < west`; the
//! rectangle is normalized by pushing `east` a full turn ahead so that
//! `east > west` always holds afterwards.

use std::f64::consts::TAU;

use tracing::warn;

use crate::error::ConfigError;
use crate::raster::ImageMeta;

use super::projection::{ProjFn, ProjTransform, Wgs84Transform};

// =============================================================================
// SpatialExtent
// =============================================================================

/// Geographic rectangle of the dataset, in radians.
///
/// Invariant: `east > west`. For antimeridian-crossing datasets `east` may
/// exceed π.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialExtent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl SpatialExtent {
    /// Longitudinal span in radians.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Latitudinal span in radians.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Tiles per axis at a zoom level. The tiling scheme has a single root
    /// tile covering the whole extent, so every zoom doubles both axes.
    pub fn tiles_at(zoom: u32) -> u32 {
        1u32 << zoom
    }

    /// Shift a longitude east by full turns until it is comparable with the
    /// rectangle, so points east of the antimeridian land inside
    /// antimeridian-crossing extents.
    pub fn normalize_lon(&self, mut lon: f64) -> f64 {
        while lon < self.west {
            lon += TAU;
        }
        lon
    }

    /// Whether a geographic point (radians) lies inside the rectangle.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let lon = self.normalize_lon(lon);
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }
}

// =============================================================================
// Extent resolution
// =============================================================================

/// Resolve the geographic extent of the dataset from one overview's
/// bounding box and geo keys.
///
/// Resolution policy, in order:
/// 1. a host-supplied projection function that returns a transform for the
///    source EPSG code,
/// 2. EPSG:4326, where the bounding box is already degrees,
/// 3. an automatic proj4rs transform derived from the embedded geo keys.
///
/// Anything else fails with [`ConfigError::UnresolvedProjection`]; extent
/// resolution failure is fatal to provider construction.
pub fn resolve_extent(
    meta: &ImageMeta,
    proj_fn: Option<&ProjFn>,
) -> Result<SpatialExtent, ConfigError> {
    let [west, south, east, north] = meta.bbox;

    let epsg = match meta.geo_keys.epsg() {
        Some(code) => {
            if meta.geo_keys.projected_crs.is_none() && code != 4326 {
                warn!(
                    epsg = code,
                    "no projected CRS key; using geographic type key for transform lookup"
                );
            }
            code
        }
        None => {
            warn!("image carries no geo keys; assuming EPSG:4326");
            4326
        }
    };

    let ((west_deg, south_deg), (east_deg, north_deg)) = match proj_fn.and_then(|f| f(epsg)) {
        Some(custom) => (custom.forward(west, south)?, custom.forward(east, north)?),
        None if epsg == 4326 => ((west, south), (east, north)),
        None => {
            let auto = ProjTransform::from_epsg(epsg)?;
            (auto.forward(west, south)?, auto.forward(east, north)?)
        }
    };

    let mut extent = SpatialExtent {
        west: west_deg.to_radians(),
        south: south_deg.to_radians(),
        east: east_deg.to_radians(),
        north: north_deg.to_radians(),
    };

    // Antimeridian crossing: raw east precedes west, push east a full turn
    if extent.east < extent.west {
        extent.east += TAU;
    }

    Ok(extent)
}

// =============================================================================
// Tests
// =============================================================================
