//! Multi-band RGB compositing.
//!
//! Compositing is CPU-bound per-pixel work, so it runs off the async
//! orchestration thread through the [`Compositor`] trait. The default
//! implementation, [`PoolCompositor`], is a bounded `spawn_blocking` pool
//! created once by the application and shared across providers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tokio::sync::Semaphore;

use crate::error::ProviderError;

// =============================================================================
// Compose task
// =============================================================================

/// One channel of a composite: the band feeding it and the value range
/// scaled onto 0..255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelRange {
    /// 1-based band number
    pub band: u32,
    pub min: f64,
    pub max: f64,
}

/// Everything a worker needs to composite one tile: decoded planes, the
/// R/G/B channel assignments, and the nodata sentinel.
#[derive(Debug, Clone)]
pub struct BandComposeTask {
    pub width: u32,
    pub height: u32,

    /// Decoded planes keyed by 1-based band number
    pub planes: HashMap<u32, Vec<f32>>,

    /// Channel assignments in R, G, B order
    pub channels: [ChannelRange; 3],

    /// Nodata sentinel; matching samples render transparent
    pub nodata: Option<f64>,
}

// =============================================================================
// Kernel
// =============================================================================

fn is_nodata(value: f32, nodata: Option<f64>) -> bool {
    value.is_nan() || matches!(nodata, Some(sentinel) if value as f64 == sentinel)
}

fn scale_to_byte(value: f32, range: &ChannelRange) -> u8 {
    let span = range.max - range.min;
    if span <= 0.0 {
        return 0;
    }
    (((value as f64 - range.min) / span) * 255.0).clamp(0.0, 255.0) as u8
}

/// Blend three band planes into an RGBA image.
///
/// A pixel is transparent when any of its channel samples is nodata or NaN,
/// or when a channel's plane is missing from the task.
pub fn compose_bands(task: &BandComposeTask) -> RgbaImage {
    let mut out = RgbaImage::new(task.width, task.height);
    let planes: Vec<Option<&[f32]>> = task
        .channels
        .iter()
        .map(|ch| task.planes.get(&ch.band).map(Vec::as_slice))
        .collect();

    for (i, pixel) in out.pixels_mut().enumerate() {
        let mut rgb = [0u8; 3];
        let mut opaque = true;

        for (slot, (plane, range)) in rgb.iter_mut().zip(planes.iter().zip(&task.channels)) {
            let value = plane.and_then(|p| p.get(i).copied()).unwrap_or(f32::NAN);
            if is_nodata(value, task.nodata) {
                opaque = false;
                break;
            }
            *slot = scale_to_byte(value, range);
        }

        *pixel = if opaque {
            Rgba([rgb[0], rgb[1], rgb[2], 255])
        } else {
            Rgba([0, 0, 0, 0])
        };
    }
    out
}

// =============================================================================
// Compositor
// =============================================================================

/// Band-compositing collaborator: submit a task, get a presentable raster.
#[async_trait]
pub trait Compositor: Send + Sync {
    async fn composite(&self, task: BandComposeTask) -> Result<RgbaImage, ProviderError>;
}

/// Default compositor: a bounded worker pool over `spawn_blocking`.
///
/// Create one per application, share it by reference; dropping the last
/// handle releases it.
pub struct PoolCompositor {
    permits: Semaphore,
}

impl PoolCompositor {
    /// Create a pool admitting at most `workers` concurrent composites.
    pub fn new(workers: usize) -> Arc<Self> {
        Arc::new(Self {
            permits: Semaphore::new(workers.max(1)),
        })
    }
}

#[async_trait]
impl Compositor for PoolCompositor {
    async fn composite(&self, task: BandComposeTask) -> Result<RgbaImage, ProviderError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ProviderError::Compose("compositor pool is shut down".to_string()))?;
        tokio::task::spawn_blocking(move || compose_bands(&task))
            .await
            .map_err(|e| ProviderError::Compose(format!("compositor worker panicked: {e}")))
    }
}

// =============================================================================
// Tests
// =============================================================================
