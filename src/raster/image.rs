//! Overview image metadata and the lazily-populated overview cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::DecodeError;

use super::source::RasterSource;

// =============================================================================
// Geo keys
// =============================================================================

/// The embedded geo-referencing keys the provider needs for CRS resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeoKeys {
    /// GeographicTypeGeoKey (2048), set for geographic CRSs
    pub geographic_type: Option<u32>,

    /// ProjectedCSTypeGeoKey (3072), set for projected CRSs
    pub projected_crs: Option<u32>,
}

impl GeoKeys {
    /// The EPSG code of the source CRS, preferring the projected key.
    pub fn epsg(&self) -> Option<u32> {
        self.projected_crs.or(self.geographic_type)
    }
}

// =============================================================================
// Band metadata
// =============================================================================

/// Per-band statistics embedded in the source file (GDAL `STATISTICS_*`
/// metadata). Either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandMetadata {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl BandMetadata {
    /// Both bounds present, as a range.
    pub fn range(&self) -> Option<(f64, f64)> {
        match (self.minimum, self.maximum) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    }
}

// =============================================================================
// ImageMeta
// =============================================================================

/// One pyramid level, immutable once fetched from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMeta {
    /// Width of this overview in pixels
    pub width: u32,

    /// Height of this overview in pixels
    pub height: u32,

    /// Native tile (block) width in pixels
    pub tile_width: u32,

    /// Native tile (block) height in pixels
    pub tile_height: u32,

    /// Samples (bands) per pixel
    pub samples_per_pixel: u32,

    /// Nodata sentinel value, if the file declares one
    pub nodata: Option<f64>,

    /// Bounding box `[west, south, east, north]` in the source CRS
    pub bbox: [f64; 4],

    /// Embedded geo-referencing keys
    pub geo_keys: GeoKeys,

    /// Per-band embedded statistics; index 0 is band 1
    pub bands: Vec<BandMetadata>,
}

impl ImageMeta {
    /// Larger of width and height, the size the level selector compares
    /// against the tile size.
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Embedded statistics for a 1-based band number.
    pub fn band_metadata(&self, band: u32) -> Option<&BandMetadata> {
        self.bands.get(band.checked_sub(1)? as usize)
    }
}

// =============================================================================
// ImageArena
// =============================================================================

/// Sparse overview cache keyed by index with idempotent fetch-or-create.
///
/// Concurrent requests for the same index may both reach the source; the
/// duplicate fetch is tolerated (the metadata is identical) and the second
/// insert simply overwrites the first. No request ever observes a partially
/// initialized entry.
pub struct ImageArena {
    source: Arc<dyn RasterSource>,
    images: RwLock<HashMap<usize, Arc<ImageMeta>>>,
}

impl ImageArena {
    pub fn new(source: Arc<dyn RasterSource>) -> Self {
        Self {
            source,
            images: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch-or-create the metadata for one overview index.
    pub async fn get(&self, index: usize) -> Result<Arc<ImageMeta>, DecodeError> {
        if let Some(meta) = self.images.read().await.get(&index) {
            return Ok(meta.clone());
        }

        let count = self.source.image_count();
        if index >= count {
            return Err(DecodeError::ImageOutOfRange { index, count });
        }

        let meta = Arc::new(self.source.image(index).await?);
        self.images.write().await.insert(index, meta.clone());
        Ok(meta)
    }

    /// Number of overviews fetched so far.
    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.images.read().await.is_empty()
    }

    /// Drop all cached metadata. Used on disposal.
    pub async fn clear(&self) {
        self.images.write().await.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
