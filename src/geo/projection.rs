//! EPSG lookup and forward transforms to WGS84.
//!
//! Pure Rust: PROJ strings come from the `crs-definitions` database and
//! transforms run through `proj4rs`. No GDAL, no system PROJ install.

use std::sync::Arc;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::error::ConfigError;

/// PROJ string for WGS84 geographic coordinates.
const WGS84_PROJ: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Get the PROJ4 string for an EPSG code from the crs-definitions database.
pub fn proj_string(epsg: u32) -> Option<&'static str> {
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Whether an EPSG code is a geographic (lon/lat) CRS.
pub fn is_geographic(epsg: u32) -> bool {
    proj_string(epsg)
        .map(|s| s.contains("+proj=longlat"))
        .unwrap_or(false)
}

/// A forward transform from some source CRS to WGS84 degrees.
///
/// Host applications implement this to cover CRSs the built-in database
/// does not, and hand it to the provider through [`ProjFn`].
pub trait Wgs84Transform: Send + Sync {
    /// Transform `(x, y)` in the source CRS to `(lon, lat)` in degrees.
    fn forward(&self, x: f64, y: f64) -> Result<(f64, f64), ConfigError>;
}

/// Host-supplied projection hook: EPSG code to a transform, or `None` when
/// the host has nothing registered for that code.
pub type ProjFn = dyn Fn(u32) -> Option<Arc<dyn Wgs84Transform>> + Send + Sync;

/// proj4rs-backed [`Wgs84Transform`] for any EPSG code the crs-definitions
/// database knows.
#[derive(Debug)]
pub struct ProjTransform {
    source: Proj,
    target: Proj,
    source_is_geographic: bool,
}

impl ProjTransform {
    /// Build a forward transform from `epsg` to WGS84.
    ///
    /// Fails with [`ConfigError::UnresolvedProjection`] when the code is not
    /// in the database, and [`ConfigError::Projection`] when proj4rs rejects
    /// the derived PROJ string.
    pub fn from_epsg(epsg: u32) -> Result<Self, ConfigError> {
        let source_str = proj_string(epsg).ok_or(ConfigError::UnresolvedProjection { epsg })?;
        let source = Proj::from_proj_string(source_str)
            .map_err(|e| ConfigError::Projection(format!("EPSG:{epsg}: {e:?}")))?;
        let target = Proj::from_proj_string(WGS84_PROJ)
            .map_err(|e| ConfigError::Projection(format!("WGS84: {e:?}")))?;

        Ok(Self {
            source,
            target,
            source_is_geographic: is_geographic(epsg),
        })
    }
}

impl Wgs84Transform for ProjTransform {
    fn forward(&self, x: f64, y: f64) -> Result<(f64, f64), ConfigError> {
        // proj4rs expects geographic input in radians and emits geographic
        // output in radians
        let mut point = if self.source_is_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(&self.source, &self.target, &mut point)
            .map_err(|e| ConfigError::Projection(format!("transform failed: {e:?}")))?;

        Ok((point.0.to_degrees(), point.1.to_degrees()))
    }
}

// =============================================================================
// Tests
// =============================================================================
