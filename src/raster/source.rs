//! The `RasterSource` trait and decode-side plumbing.
//!
//! A `RasterSource` is the decode collaborator: it owns the bytes of a COG
//! (local file, HTTP range reader, object storage) and turns pixel windows
//! into typed pixel arrays. The provider is deliberately ignorant of the
//! file format; it only speaks in windows, band subsets, and output sizes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::DecodeError;

use super::image::ImageMeta;

// =============================================================================
// Resampling
// =============================================================================

/// Resampling method applied when a pixel window is scaled to the output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    /// Nearest neighbor (default)
    #[default]
    Nearest,
    /// Bilinear interpolation
    Bilinear,
    /// Linear interpolation along rows
    Linear,
}

// =============================================================================
// Pixel windows
// =============================================================================

/// A pixel rectangle within one overview image, half-open on both axes:
/// `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Window {
    /// Window covering an entire image.
    pub fn full(meta: &ImageMeta) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: meta.width,
            y1: meta.height,
        }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }
}

// =============================================================================
// Read requests and results
// =============================================================================

/// A windowed read against one overview image.
///
/// The source decodes the window and resamples it to `out_width x out_height`
/// before returning, so callers always receive fixed-size tiles regardless of
/// the native window size.
#[derive(Clone)]
pub struct ReadRequest {
    /// Overview index (0 = coarsest)
    pub image_index: usize,

    /// Pixel window within that overview
    pub window: Window,

    /// Output width in pixels after resampling
    pub out_width: u32,

    /// Output height in pixels after resampling
    pub out_height: u32,

    /// 1-based band numbers to read; empty means all bands
    pub bands: Vec<u32>,

    /// Resampling method for the window-to-output scale
    pub resample: ResampleMethod,

    /// Decode pool the read must run on
    pub pool: Arc<DecodePool>,
}

/// Planar output of a raw multi-band read.
///
/// One `f32` plane per requested band, row-major, ordered as
/// [`ReadRequest::bands`]. Nodata pixels keep the source's sentinel value;
/// filtering them is the renderer's job.
#[derive(Debug, Clone)]
pub struct BandData {
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Vec<f32>>,
}

impl BandData {
    /// Number of pixels per plane.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interleaved 8-bit output of an RGB-converted read.
#[derive(Debug, Clone)]
pub struct RgbData {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, RGB interleaved
    pub pixels: Vec<u8>,
}

// =============================================================================
// RasterSource
// =============================================================================

/// Decode collaborator for a COG-style raster pyramid.
///
/// Implementations adapt whatever decoding library the application uses.
/// The provider holds one source for its whole lifetime and calls it from
/// many concurrent tile requests; implementations must be internally
/// synchronized.
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// Number of overview images in the pyramid.
    fn image_count(&self) -> usize;

    /// Metadata for one overview. Index 0 is the coarsest overview.
    async fn image(&self, index: usize) -> Result<ImageMeta, DecodeError>;

    /// Read a pixel window as planar band data.
    async fn read_window(&self, request: ReadRequest) -> Result<BandData, DecodeError>;

    /// Read a pixel window converted to interleaved 8-bit RGB.
    async fn read_rgb(&self, request: ReadRequest) -> Result<RgbData, DecodeError>;
}

// =============================================================================
// DecodePool
// =============================================================================

/// Bounded worker pool for CPU-heavy decode work.
///
/// Created once by the application and shared by reference across all
/// providers; dropping the last handle (or calling [`DecodePool::close`])
/// releases it. Sources call [`DecodePool::run`] to execute their blocking
/// decode step without starving the async runtime.
pub struct DecodePool {
    permits: Semaphore,
    workers: usize,
}

impl DecodePool {
    /// Create a pool that admits at most `workers` concurrent decode jobs.
    pub fn new(workers: usize) -> Arc<Self> {
        let workers = workers.max(1);
        Arc::new(Self {
            permits: Semaphore::new(workers),
            workers,
        })
    }

    /// Maximum number of concurrent decode jobs.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run a blocking decode job on the pool.
    ///
    /// Waits for a worker slot, then executes `job` on the blocking thread
    /// pool. Fails with [`DecodeError::PoolClosed`] if the pool was shut
    /// down while waiting.
    pub async fn run<F, T>(&self, job: F) -> Result<T, DecodeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DecodeError::PoolClosed)?;
        tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| DecodeError::Read(format!("decode worker panicked: {e}")))
    }

    /// Shut the pool down. Queued and future jobs fail with
    /// [`DecodeError::PoolClosed`].
    pub fn close(&self) {
        self.permits.close();
    }
}

// =============================================================================
// Tests
// =============================================================================
