//! The imagery provider: lifecycle, tile orchestration, and the error
//! surface.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CogTileProvider                        │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                   get_tile()                        │    │
//! │  │  1. Check zoom bounds    4. Decode pixel window     │    │
//! │  │  2. Check result cache   5. Composite / color-map   │    │
//! │  │  3. Resolve overview     6. Cache & return          │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │        │                 │                    │             │
//! │        ▼                 ▼                    ▼             │
//! │  ┌───────────────┐ ┌────────────┐ ┌──────────────────────┐  │
//! │  │TileResultCache│ │ ImageArena │ │Compositor/ColorMapper│  │
//! │  └───────────────┘ └────────────┘ └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Construction is a single async call that resolves the dataset extent,
//! the zoom-to-overview map, and every band's value range before returning;
//! a provider the caller can reach is always ready. Disposal flips a flag:
//! in-flight requests discard their results after the next decode returns,
//! later requests fail with [`ProviderError::Disposed`].

mod probe;
mod pyramid;
mod stats;

pub use pyramid::resolve_levels;
pub use stats::resolve_ranges;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::{ProviderOptions, RenderMode, SingleBandMode};
use crate::error::{ConfigError, ProviderError};
use crate::geo::{resolve_extent, SpatialExtent};
use crate::raster::{
    BandData, DecodePool, ImageArena, RasterSource, ReadRequest, ResampleMethod, RgbData, Window,
};
use crate::render::{
    BandComposeTask, ChannelRange, ColorMapper, Compositor, TileDataset,
};
use crate::tile::{cache_key, tile_window, TileResultCache};

use probe::probe_window;

/// Cross-cutting error observer, invoked once per failed request.
type ErrorObserver = Box<dyn Fn(&ProviderError) + Send + Sync>;

// =============================================================================
// CogTileProvider
// =============================================================================

/// Imagery tile provider over a COG-style raster pyramid.
///
/// One provider serves one dataset. All shared state is either immutable
/// after construction (levels, extent, ranges, render mode) or mutated only
/// through populate-if-absent semantics (overview arena, result cache), so
/// any number of tile requests can run concurrently.
pub struct CogTileProvider {
    source: Arc<dyn RasterSource>,
    arena: ImageArena,
    decode_pool: Arc<DecodePool>,
    compositor: Option<Arc<dyn Compositor>>,
    mapper: Option<ColorMapper>,

    mode: RenderMode,
    read_bands: Vec<u32>,
    ranges: HashMap<u32, (f64, f64)>,
    channels: Option<[ChannelRange; 3]>,
    nodata: Option<f64>,
    samples: u32,

    levels: Vec<usize>,
    extent: SpatialExtent,
    tile_size: u32,
    minimum_level: u32,
    maximum_level: u32,
    enable_pick_features: bool,
    has_alpha_channel: bool,
    resample: ResampleMethod,

    cache: TileResultCache,
    disposed: AtomicBool,
    observers: RwLock<HashMap<usize, ErrorObserver>>,
    next_observer_id: AtomicUsize,
}

impl CogTileProvider {
    /// Construct a provider over `source`.
    ///
    /// Resolves, in order: all overview metadata, the dataset extent, the
    /// render mode, the zoom-to-overview map, and every referenced band's
    /// value range (concurrently, all-complete). Any failure aborts
    /// construction; a provider is never observable half-initialized.
    ///
    /// `compositor` is required for multi-band and RGB-converted rendering
    /// and ignored otherwise.
    pub async fn new(
        source: Arc<dyn RasterSource>,
        decode_pool: Arc<DecodePool>,
        compositor: Option<Arc<dyn Compositor>>,
        options: ProviderOptions,
    ) -> Result<Self, ProviderError> {
        let count = source.image_count();
        if count == 0 {
            return Err(ConfigError::EmptySource.into());
        }

        let arena = ImageArena::new(source.clone());
        let mut sizes = Vec::with_capacity(count);
        for index in 0..count {
            let meta = arena.get(index).await?;
            sizes.push((meta.width, meta.height));
        }
        let coarsest = arena.get(0).await?;
        let finest = arena.get(count - 1).await?;

        let extent = resolve_extent(&finest, options.proj_fn.as_deref())?;

        let samples = finest.samples_per_pixel;
        let mode = RenderMode::resolve(&options.render, samples)?;
        if mode.uses_compositor() && compositor.is_none() {
            return Err(ConfigError::MissingCompositor.into());
        }
        let read_bands = mode.read_bands();
        let nodata = options.render.nodata.or(finest.nodata);

        let levels = resolve_levels(&sizes, options.tile_size);
        let maximum_level = options
            .maximum_level
            .min(levels.len().saturating_sub(1) as u32);

        let stats_bands = match &mode {
            RenderMode::Single(single) if single.expression.is_some() => Vec::new(),
            RenderMode::ConvertToRgb => vec![1, 2, 3],
            _ => read_bands.clone(),
        };
        let ranges =
            resolve_ranges(&source, &coarsest, &stats_bands, &mode, &decode_pool).await?;

        let channels = resolve_channels(&mode, &ranges);
        let mapper = match &mode {
            RenderMode::Single(single) => Some(ColorMapper::new(
                single.scale.clone(),
                nodata,
                single.clamp_low,
                single.clamp_high,
            )),
            _ => None,
        };

        info!(
            overviews = count,
            zoom_levels = levels.len(),
            max_level = maximum_level,
            samples,
            "imagery provider initialized"
        );

        Ok(Self {
            source,
            arena,
            decode_pool,
            compositor,
            mapper,
            mode,
            read_bands,
            ranges,
            channels,
            nodata,
            samples,
            levels,
            extent,
            tile_size: options.tile_size,
            minimum_level: options.minimum_level,
            maximum_level,
            enable_pick_features: options.enable_pick_features,
            has_alpha_channel: options.has_alpha_channel,
            resample: options.resample_method,
            cache: TileResultCache::new(options.cache_ttl),
            disposed: AtomicBool::new(false),
            observers: RwLock::new(HashMap::new()),
            next_observer_id: AtomicUsize::new(0),
        })
    }

    // =========================================================================
    // Host contract accessors
    // =========================================================================

    /// Geographic extent of the dataset, radians.
    pub fn extent(&self) -> SpatialExtent {
        self.extent
    }

    pub fn minimum_level(&self) -> u32 {
        self.minimum_level
    }

    /// Effective maximum zoom: the configured maximum capped by the depth
    /// of the level map.
    pub fn maximum_level(&self) -> u32 {
        self.maximum_level
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn has_alpha_channel(&self) -> bool {
        self.has_alpha_channel
    }

    /// Whether the provider serves requests (true until disposal).
    pub fn ready(&self) -> bool {
        !self.disposed.load(Ordering::SeqCst)
    }

    /// Resolved `(min, max)` for a 1-based band, when the active render
    /// mode required one.
    pub fn band_range(&self, band: u32) -> Option<(f64, f64)> {
        self.ranges.get(&band).copied()
    }

    /// The zoom-to-overview map, mainly useful for diagnostics.
    pub fn levels(&self) -> &[usize] {
        &self.levels
    }

    // =========================================================================
    // Error observers
    // =========================================================================

    /// Register a cross-cutting error observer. Observers see every failed
    /// request exactly once, in addition to the error the caller receives.
    pub async fn subscribe_errors(
        &self,
        observer: impl Fn(&ProviderError) + Send + Sync + 'static,
    ) -> usize {
        let id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().await.insert(id, Box::new(observer));
        id
    }

    /// Remove an observer by its subscription token.
    pub async fn unsubscribe_errors(&self, id: usize) -> bool {
        self.observers.write().await.remove(&id).is_some()
    }

    async fn fail(&self, err: ProviderError) -> ProviderError {
        error!(%err, "request failed");
        for observer in self.observers.read().await.values() {
            observer(&err);
        }
        err
    }

    // =========================================================================
    // Tiles
    // =========================================================================

    /// Render the tile at (x, y, zoom).
    ///
    /// Returns `Ok(None)` for zooms outside the served range (how a
    /// consumer learns a tile is out of range, not an error) and for
    /// requests whose provider was disposed mid-flight. Decode and
    /// composite failures are reported to error observers once and returned
    /// to the caller; nothing is retried.
    pub async fn get_tile(
        &self,
        x: u32,
        y: u32,
        zoom: u32,
    ) -> Result<Option<Arc<RgbaImage>>, ProviderError> {
        if !self.ready() {
            return Err(ProviderError::Disposed);
        }
        if zoom < self.minimum_level || zoom > self.maximum_level {
            debug!(x, y, zoom, "zoom outside served range");
            return Ok(None);
        }

        let key = cache_key(x, y, zoom);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(x, y, zoom, "tile cache hit");
            return Ok(Some(hit));
        }

        let overview = self.levels[zoom as usize];
        let meta = match self.arena.get(overview).await {
            Ok(meta) => meta,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        let window = tile_window(meta.width, meta.height, x, y, zoom);
        debug!(
            x,
            y,
            zoom,
            overview,
            window = ?(window.x0, window.y0, window.x1, window.y1),
            "decoding tile window"
        );

        let rendered = match &self.mode {
            RenderMode::ConvertToRgb => {
                let request = self.read_request(overview, window, Vec::new());
                let rgb = match self.source.read_rgb(request).await {
                    Ok(data) => data,
                    Err(e) => return Err(self.fail(e.into()).await),
                };
                if !self.ready() {
                    return Ok(None);
                }
                self.composite_rgb(rgb).await?
            }
            RenderMode::Multi { .. } => {
                let request = self.read_request(overview, window, self.read_bands.clone());
                let data = match self.source.read_window(request).await {
                    Ok(data) => data,
                    Err(e) => return Err(self.fail(e.into()).await),
                };
                if !self.ready() {
                    return Ok(None);
                }
                self.composite_bands(data).await?
            }
            RenderMode::Single(single) => {
                let request = self.read_request(overview, window, self.read_bands.clone());
                let data = match self.source.read_window(request).await {
                    Ok(data) => data,
                    Err(e) => return Err(self.fail(e.into()).await),
                };
                if !self.ready() {
                    return Ok(None);
                }
                match self.color_map(single, data) {
                    Ok(image) => image,
                    Err(e) => return Err(self.fail(e).await),
                }
            }
        };

        let image = Arc::new(rendered);
        self.cache.put(key, image.clone()).await;
        Ok(Some(image))
    }

    fn read_request(&self, overview: usize, window: Window, bands: Vec<u32>) -> ReadRequest {
        ReadRequest {
            image_index: overview,
            window,
            out_width: self.tile_size,
            out_height: self.tile_size,
            bands,
            resample: self.resample,
            pool: self.decode_pool.clone(),
        }
    }

    async fn composite_rgb(&self, rgb: RgbData) -> Result<RgbaImage, ProviderError> {
        let mut planes: HashMap<u32, Vec<f32>> = HashMap::new();
        for band in 0..3usize {
            let plane = rgb
                .pixels
                .chunks_exact(3)
                .map(|px| f32::from(px[band]))
                .collect();
            planes.insert(band as u32 + 1, plane);
        }
        self.dispatch_composite(BandComposeTask {
            width: rgb.width,
            height: rgb.height,
            planes,
            channels: self.channels.unwrap_or_else(byte_channels),
            nodata: self.nodata,
        })
        .await
    }

    async fn composite_bands(&self, data: BandData) -> Result<RgbaImage, ProviderError> {
        let planes = self
            .read_bands
            .iter()
            .copied()
            .zip(data.planes)
            .collect::<HashMap<u32, Vec<f32>>>();
        self.dispatch_composite(BandComposeTask {
            width: data.width,
            height: data.height,
            planes,
            channels: self.channels.unwrap_or_else(byte_channels),
            nodata: self.nodata,
        })
        .await
    }

    async fn dispatch_composite(&self, task: BandComposeTask) -> Result<RgbaImage, ProviderError> {
        let compositor = match &self.compositor {
            Some(compositor) => compositor,
            None => return Err(self.fail(ConfigError::MissingCompositor.into()).await),
        };
        match compositor.composite(task).await {
            Ok(image) => Ok(image),
            Err(e) => Err(self.fail(e).await),
        }
    }

    fn color_map(
        &self,
        single: &SingleBandMode,
        data: BandData,
    ) -> Result<RgbaImage, ProviderError> {
        let mapper = match &self.mapper {
            Some(mapper) => mapper,
            None => {
                return Err(ProviderError::Compose(
                    "single-band mode without a color mapper".to_string(),
                ))
            }
        };

        let mut dataset = TileDataset::new(data.width, data.height);
        for (band, plane) in self.read_bands.iter().copied().zip(data.planes) {
            dataset.insert(band, plane);
        }

        Ok(match &single.expression {
            Some(expr) => mapper.render_expression(&dataset, expr),
            None => {
                let domain = single
                    .domain
                    .or_else(|| self.ranges.get(&single.band).copied())
                    .unwrap_or((0.0, 1.0));
                mapper.render_band(&dataset, single.band, domain)
            }
        })
    }

    // =========================================================================
    // Feature probe
    // =========================================================================

    /// Raw band values under a geographic point (radians).
    ///
    /// Always decodes fresh (never consults the tile cache). The requested
    /// zoom is clamped to the served maximum. Returns an empty vector when
    /// probing is disabled or the point is outside the dataset.
    pub async fn pick_features(
        &self,
        _x: u32,
        _y: u32,
        zoom: u32,
        longitude: f64,
        latitude: f64,
    ) -> Result<Vec<f64>, ProviderError> {
        if !self.ready() {
            return Err(ProviderError::Disposed);
        }
        if !self.enable_pick_features {
            return Ok(Vec::new());
        }

        let zoom = zoom.min(self.maximum_level);
        let overview = self.levels[zoom as usize];
        let meta = match self.arena.get(overview).await {
            Ok(meta) => meta,
            Err(e) => return Err(self.fail(e.into()).await),
        };

        let Some(window) = probe_window(&self.extent, &meta, longitude, latitude) else {
            debug!(longitude, latitude, "probe outside dataset extent");
            return Ok(Vec::new());
        };

        let bands = if self.read_bands.is_empty() {
            (1..=self.samples).collect()
        } else {
            self.read_bands.clone()
        };
        let request = ReadRequest {
            image_index: overview,
            window,
            out_width: 1,
            out_height: 1,
            bands,
            resample: ResampleMethod::Nearest,
            pool: self.decode_pool.clone(),
        };

        let data = match self.source.read_window(request).await {
            Ok(data) => data,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        Ok(data
            .planes
            .iter()
            .map(|plane| plane.first().copied().map_or(f64::NAN, f64::from))
            .collect())
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Dispose the provider: later requests fail with
    /// [`ProviderError::Disposed`], in-flight requests discard their
    /// results, cached tiles and overview metadata are dropped. The decode
    /// and compositor pools are application-owned and stay untouched.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cache.clear().await;
        self.arena.clear().await;
        info!("imagery provider disposed");
    }
}

fn byte_channels() -> [ChannelRange; 3] {
    [1, 2, 3].map(|band| ChannelRange {
        band,
        min: 0.0,
        max: 255.0,
    })
}

fn resolve_channels(
    mode: &RenderMode,
    ranges: &HashMap<u32, (f64, f64)>,
) -> Option<[ChannelRange; 3]> {
    match mode {
        // The RGB conversion already emits bytes; channels are fixed
        RenderMode::ConvertToRgb => Some(byte_channels()),
        RenderMode::Multi { r, g, b } => Some([r, g, b].map(|channel| {
            let range = ranges.get(&channel.band).copied();
            ChannelRange {
                band: channel.band,
                min: channel.min.or(range.map(|r| r.0)).unwrap_or(0.0),
                max: channel.max.or(range.map(|r| r.1)).unwrap_or(255.0),
            }
        })),
        RenderMode::Single(_) => None,
    }
}
