//! End-to-end provider tests against a synthetic in-memory raster source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use cog_tiles::{
    BandComposeTask, BandData, BandMetadata, ChannelSpec, CogTileProvider, Compositor,
    ConfigError, DecodeError, DecodePool, GeoKeys, ImageMeta, MultiBandOptions, PoolCompositor,
    ProviderError, ProviderOptions, RasterSource, ReadRequest, RenderOptions, RgbData,
    SingleBandOptions,
};
use image::RgbaImage;

// =============================================================================
// Mock source
// =============================================================================

/// In-memory pyramid: each band reads as a constant plane `band * 10`.
struct MockSource {
    overviews: Vec<ImageMeta>,
    window_reads: AtomicUsize,
    rgb_reads: AtomicUsize,
    fail_reads: bool,
}

impl MockSource {
    fn new(overviews: Vec<ImageMeta>) -> Arc<Self> {
        Arc::new(Self {
            overviews,
            window_reads: AtomicUsize::new(0),
            rgb_reads: AtomicUsize::new(0),
            fail_reads: false,
        })
    }

    fn failing(overviews: Vec<ImageMeta>) -> Arc<Self> {
        Arc::new(Self {
            overviews,
            window_reads: AtomicUsize::new(0),
            rgb_reads: AtomicUsize::new(0),
            fail_reads: true,
        })
    }

    fn window_reads(&self) -> usize {
        self.window_reads.load(Ordering::SeqCst)
    }

    fn rgb_reads(&self) -> usize {
        self.rgb_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RasterSource for MockSource {
    fn image_count(&self) -> usize {
        self.overviews.len()
    }

    async fn image(&self, index: usize) -> Result<ImageMeta, DecodeError> {
        self.overviews
            .get(index)
            .cloned()
            .ok_or(DecodeError::ImageOutOfRange {
                index,
                count: self.overviews.len(),
            })
    }

    async fn read_window(&self, request: ReadRequest) -> Result<BandData, DecodeError> {
        self.window_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(DecodeError::Read("synthetic failure".to_string()));
        }
        let pixels = (request.out_width * request.out_height) as usize;
        let planes = request
            .bands
            .iter()
            .map(|&band| vec![band as f32 * 10.0; pixels])
            .collect();
        Ok(BandData {
            width: request.out_width,
            height: request.out_height,
            planes,
        })
    }

    async fn read_rgb(&self, request: ReadRequest) -> Result<RgbData, DecodeError> {
        self.rgb_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(DecodeError::Read("synthetic failure".to_string()));
        }
        let pixels = (request.out_width * request.out_height) as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&[200, 100, 50]);
        }
        Ok(RgbData {
            width: request.out_width,
            height: request.out_height,
            pixels: data,
        })
    }
}

/// Compositor wrapper counting dispatches.
struct CountingCompositor {
    inner: Arc<PoolCompositor>,
    calls: AtomicUsize,
}

impl CountingCompositor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: PoolCompositor::new(2),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compositor for CountingCompositor {
    async fn composite(&self, task: BandComposeTask) -> Result<RgbaImage, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.composite(task).await
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn overview(size: u32, samples: u32, bands: Vec<BandMetadata>) -> ImageMeta {
    ImageMeta {
        width: size,
        height: size,
        tile_width: 256,
        tile_height: 256,
        samples_per_pixel: samples,
        nodata: None,
        bbox: [-180.0, -90.0, 180.0, 90.0],
        geo_keys: GeoKeys {
            geographic_type: Some(4326),
            projected_crs: None,
        },
        bands,
    }
}

fn with_stats(min: f64, max: f64) -> BandMetadata {
    BandMetadata {
        minimum: Some(min),
        maximum: Some(max),
    }
}

/// 4-band pyramid (256 and 512 px) with embedded statistics for bands 1-3.
fn four_band_pyramid() -> Vec<ImageMeta> {
    let bands = vec![
        with_stats(0.0, 100.0),
        with_stats(0.0, 100.0),
        with_stats(0.0, 100.0),
        BandMetadata::default(),
    ];
    vec![
        overview(256, 4, bands.clone()),
        overview(512, 4, bands),
    ]
}

fn single_band_pyramid() -> Vec<ImageMeta> {
    let bands = vec![with_stats(0.0, 50.0)];
    vec![
        overview(256, 1, bands.clone()),
        overview(512, 1, bands),
    ]
}

fn multi_options(ttl_ms: u64) -> ProviderOptions {
    ProviderOptions {
        cache_ttl: Duration::from_millis(ttl_ms),
        render: RenderOptions {
            multi: Some(MultiBandOptions {
                r: ChannelSpec {
                    band: 1,
                    min: None,
                    max: None,
                },
                g: ChannelSpec {
                    band: 2,
                    min: None,
                    max: None,
                },
                b: ChannelSpec {
                    band: 3,
                    min: None,
                    max: None,
                },
            }),
            ..RenderOptions::default()
        },
        ..ProviderOptions::default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_multi_band_end_to_end_with_cache() {
    let source = MockSource::new(four_band_pyramid());
    let compositor = CountingCompositor::new();
    let provider = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        Some(compositor.clone()),
        multi_options(1000),
    )
    .await
    .unwrap();

    // Embedded statistics resolved exactly, no empirical scan
    assert_eq!(provider.band_range(1), Some((0.0, 100.0)));
    assert_eq!(source.window_reads(), 0);

    // First request: one decode, one composite
    let tile = provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    assert_eq!(tile.dimensions(), (256, 256));
    assert_eq!(source.window_reads(), 1);
    assert_eq!(compositor.calls(), 1);

    // Channel scaling: band N reads constant N*10 over [0, 100]
    assert_eq!(tile.get_pixel(0, 0).0, [25, 51, 76, 255]);

    // Repeat within the TTL: bit-identical result, zero extra decodes
    let again = provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    assert_eq!(*again, *tile);
    assert_eq!(source.window_reads(), 1);
    assert_eq!(compositor.calls(), 1);
}

#[tokio::test]
async fn test_cache_expiry_triggers_fresh_decode() {
    let source = MockSource::new(four_band_pyramid());
    let provider = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        multi_options(60),
    )
    .await
    .unwrap();

    provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    assert_eq!(source.window_reads(), 1);

    sleep(Duration::from_millis(80)).await;
    provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    assert_eq!(source.window_reads(), 2);
}

#[tokio::test]
async fn test_zoom_out_of_range_is_empty_without_decode() {
    let source = MockSource::new(four_band_pyramid());
    let provider = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        multi_options(1000),
    )
    .await
    .unwrap();

    // Two overviews map to zooms 0..=1
    assert_eq!(provider.maximum_level(), 1);
    let result = provider
        .get_tile(0, 0, provider.maximum_level() + 1)
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(source.window_reads(), 0);
    assert_eq!(source.rgb_reads(), 0);
}

#[tokio::test]
async fn test_convert_to_rgb_on_two_bands_fails_construction() {
    let bands = vec![BandMetadata::default(); 2];
    let source = MockSource::new(vec![overview(256, 2, bands)]);
    let result = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        ProviderOptions {
            render: RenderOptions {
                convert_to_rgb: true,
                ..RenderOptions::default()
            },
            ..ProviderOptions::default()
        },
    )
    .await;

    assert!(matches!(
        result.err(),
        Some(ProviderError::Config(
            ConfigError::RgbConversionUnsupported { samples: 2 }
        ))
    ));
    // Construction never reached pixel decoding
    assert_eq!(source.window_reads(), 0);
    assert_eq!(source.rgb_reads(), 0);
}

#[tokio::test]
async fn test_default_mode_three_bands_uses_rgb_conversion() {
    let bands = vec![with_stats(0.0, 255.0); 3];
    let source = MockSource::new(vec![overview(256, 3, bands)]);
    let provider = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        ProviderOptions::default(),
    )
    .await
    .unwrap();

    let tile = provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    assert_eq!(source.rgb_reads(), 1);
    assert_eq!(source.window_reads(), 0);
    // Converted bytes pass through the 0..255 channel scale
    assert_eq!(tile.get_pixel(0, 0).0, [200, 100, 50, 255]);
}

#[tokio::test]
async fn test_single_band_default_without_compositor() {
    let source = MockSource::new(single_band_pyramid());
    let provider = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        None,
        ProviderOptions::default(),
    )
    .await
    .unwrap();

    // Band 1 reads constant 10 over the embedded [0, 50] range
    let tile = provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    assert_eq!(source.window_reads(), 1);
    assert_eq!(tile.dimensions(), (256, 256));
    // Every pixel is opaque and identical
    let first = *tile.get_pixel(0, 0);
    assert_eq!(first.0[3], 255);
    assert!(tile.pixels().all(|p| *p == first));
}

#[tokio::test]
async fn test_multi_band_without_compositor_fails_construction() {
    let source = MockSource::new(four_band_pyramid());
    let result = CogTileProvider::new(
        source,
        DecodePool::new(2),
        None,
        multi_options(0),
    )
    .await;

    assert!(matches!(
        result.err(),
        Some(ProviderError::Config(ConfigError::MissingCompositor))
    ));
}

#[tokio::test]
async fn test_zero_ttl_disables_caching() {
    let source = MockSource::new(four_band_pyramid());
    let provider = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        multi_options(0),
    )
    .await
    .unwrap();

    provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    assert_eq!(source.window_reads(), 2);
}

#[tokio::test]
async fn test_decode_failure_reaches_caller_and_observers() {
    let source = MockSource::failing(four_band_pyramid());
    let provider = CogTileProvider::new(
        source,
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        ProviderOptions {
            render: multi_options(1000).render,
            ..ProviderOptions::default()
        },
    )
    .await
    .unwrap();

    let observed = Arc::new(AtomicUsize::new(0));
    let seen = observed.clone();
    provider
        .subscribe_errors(move |_err| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    let result = provider.get_tile(0, 0, 0).await;
    assert!(matches!(result, Err(ProviderError::Decode(_))));
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    // The failure is local to the request: the provider still serves
    assert!(provider.ready());
}

#[tokio::test]
async fn test_unsubscribed_observer_is_silent() {
    let source = MockSource::failing(four_band_pyramid());
    let provider = CogTileProvider::new(
        source,
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        multi_options(1000),
    )
    .await
    .unwrap();

    let observed = Arc::new(AtomicUsize::new(0));
    let seen = observed.clone();
    let id = provider
        .subscribe_errors(move |_err| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .await;
    assert!(provider.unsubscribe_errors(id).await);

    let _ = provider.get_tile(0, 0, 0).await;
    assert_eq!(observed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dispose_rejects_new_requests() {
    let source = MockSource::new(four_band_pyramid());
    let provider = CogTileProvider::new(
        source,
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        multi_options(1000),
    )
    .await
    .unwrap();

    assert!(provider.ready());
    provider.dispose().await;
    assert!(!provider.ready());

    let result = provider.get_tile(0, 0, 0).await;
    assert!(matches!(result, Err(ProviderError::Disposed)));
    let result = provider.pick_features(0, 0, 0, 0.0, 0.0).await;
    assert!(matches!(result, Err(ProviderError::Disposed)));
}

#[tokio::test]
async fn test_pick_features_returns_band_values() {
    let source = MockSource::new(four_band_pyramid());
    let provider = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        multi_options(1000),
    )
    .await
    .unwrap();

    let values = provider
        .pick_features(0, 0, 0, 0.5f64.to_radians(), 0.5f64.to_radians())
        .await
        .unwrap();
    assert_eq!(values, vec![10.0, 20.0, 30.0]);

    // Probes bypass the tile cache: two probes, two decodes
    provider
        .pick_features(0, 0, 0, 0.5f64.to_radians(), 0.5f64.to_radians())
        .await
        .unwrap();
    assert_eq!(source.window_reads(), 2);
}

#[tokio::test]
async fn test_pick_features_outside_extent_is_empty() {
    // Dataset covering only the eastern hemisphere
    let mut meta = four_band_pyramid();
    for overview in &mut meta {
        overview.bbox = [0.0, -90.0, 180.0, 90.0];
    }
    let source = MockSource::new(meta);
    let provider = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        multi_options(1000),
    )
    .await
    .unwrap();

    let values = provider
        .pick_features(0, 0, 0, (-90.0f64).to_radians(), 0.0)
        .await
        .unwrap();
    assert!(values.is_empty());
    assert_eq!(source.window_reads(), 0);
}

#[tokio::test]
async fn test_pick_features_disabled() {
    let source = MockSource::new(four_band_pyramid());
    let provider = CogTileProvider::new(
        source.clone(),
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        ProviderOptions {
            enable_pick_features: false,
            ..multi_options(1000)
        },
    )
    .await
    .unwrap();

    let values = provider.pick_features(0, 0, 0, 0.0, 0.0).await.unwrap();
    assert!(values.is_empty());
    assert_eq!(source.window_reads(), 0);
}

#[tokio::test]
async fn test_explicit_single_band_options() {
    let source = MockSource::new(single_band_pyramid());
    let provider = CogTileProvider::new(
        source,
        DecodePool::new(2),
        None,
        ProviderOptions {
            render: RenderOptions {
                single: Some(SingleBandOptions {
                    band: 1,
                    color_scale: Some("greys".to_string()),
                    domain: Some((0.0, 20.0)),
                    ..SingleBandOptions::default()
                }),
                ..RenderOptions::default()
            },
            ..ProviderOptions::default()
        },
    )
    .await
    .unwrap();

    // Constant 10 on [0, 20] lands mid-scale
    let tile = provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    assert_eq!(tile.get_pixel(0, 0).0, [128, 128, 128, 255]);
}

#[tokio::test]
async fn test_levels_are_monotone_and_capped() {
    let bands = vec![with_stats(0.0, 1.0)];
    let source = MockSource::new(vec![
        overview(256, 1, bands.clone()),
        overview(512, 1, bands.clone()),
        overview(1024, 1, bands.clone()),
        overview(2048, 1, bands),
    ]);
    let provider = CogTileProvider::new(
        source,
        DecodePool::new(2),
        None,
        ProviderOptions {
            maximum_level: 2,
            ..ProviderOptions::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(provider.levels(), &[0, 1, 2, 3]);
    assert_eq!(provider.maximum_level(), 2);
    assert!(provider.get_tile(0, 0, 3).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_requests_share_one_cache_entry() {
    let source = MockSource::new(four_band_pyramid());
    let provider = Arc::new(
        CogTileProvider::new(
            source.clone(),
            DecodePool::new(4),
            Some(CountingCompositor::new()),
            multi_options(60_000),
        )
        .await
        .unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let provider = provider.clone();
        handles.push(tokio::spawn(async move {
            provider.get_tile(1, 1, 1).await.unwrap().unwrap()
        }));
    }
    let mut tiles = Vec::new();
    for handle in handles {
        tiles.push(handle.await.unwrap());
    }

    // Concurrent misses may race into duplicate decodes, but every result
    // is identical and later requests hit the cache
    let first = &tiles[0];
    assert!(tiles.iter().all(|tile| **tile == **first));
    let decoded = source.window_reads();
    assert!(decoded >= 1 && decoded <= 8);

    provider.get_tile(1, 1, 1).await.unwrap().unwrap();
    assert_eq!(source.window_reads(), decoded);
}

#[tokio::test]
async fn test_band_ranges_unaffected_by_tile_failures() {
    let source = MockSource::new(four_band_pyramid());
    let provider = CogTileProvider::new(
        source,
        DecodePool::new(2),
        Some(CountingCompositor::new()),
        multi_options(1000),
    )
    .await
    .unwrap();

    provider.get_tile(0, 0, 0).await.unwrap().unwrap();
    // An out-of-range request does not evict the cached tile
    assert!(provider.get_tile(0, 0, 9).await.unwrap().is_none());
    let _ = provider.get_tile(0, 0, 0).await.unwrap().unwrap();
}

fn _assert_send<T: Send + Sync>() {}

#[test]
fn test_provider_is_send_sync() {
    _assert_send::<CogTileProvider>();
    _assert_send::<HashMap<String, ProviderError>>();
}
