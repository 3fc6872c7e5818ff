//! # cog-tiles
//!
//! An imagery tile provider for Cloud Optimized GeoTIFF pyramids.
//!
//! This library resolves quad-tree tile requests `(column, row, zoom)`
//! against a COG-style multi-resolution raster: it picks the overview level
//! backing each zoom, computes the pixel window for a tile, dispatches the
//! decode to a collaborator, renders the result (RGB band blending or
//! single-band color mapping), and caches rendered tiles with time-based
//! eviction.
//!
//! ## Features
//!
//! - **Pyramid-aware zoom mapping**: oversized coarse overviews spread over
//!   extra low zooms, sub-half-tile overviews skipped
//! - **Three render modes**: decoder RGB conversion, multi-band channel
//!   compositing, single-band color scales (named or custom stops) with
//!   optional band expressions
//! - **CRS resolution without GDAL**: pure-Rust proj4rs transforms derived
//!   from embedded geo keys, with a host hook for exotic CRSs
//! - **Antimeridian-aware extents** for datasets crossing ±180°
//! - **Point probes**: raw band values under a geographic coordinate
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`raster`] - decode-collaborator boundary: source trait, overview
//!   metadata, decode pool
//! - [`geo`] - extent resolution and coordinate transforms
//! - [`render`] - color mapping and band compositing
//! - [`tile`] - result cache and pixel-window computation
//! - [`provider`] - the [`CogTileProvider`] itself
//! - [`config`] - construction options and render-mode resolution
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cog_tiles::{CogTileProvider, DecodePool, PoolCompositor, ProviderOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Application-owned pools, shared across providers
//!     let decode_pool = DecodePool::new(4);
//!     let compositor = PoolCompositor::new(2);
//!
//!     // `source` is any RasterSource implementation (a COG decoder)
//!     let source = open_my_cog("data/elevation.tif").await?;
//!
//!     let provider = CogTileProvider::new(
//!         source,
//!         decode_pool,
//!         Some(compositor),
//!         ProviderOptions::default(),
//!     )
//!     .await?;
//!
//!     if let Some(tile) = provider.get_tile(0, 0, 0).await? {
//!         println!("root tile: {}x{}", tile.width(), tile.height());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod geo;
pub mod provider;
pub mod raster;
pub mod render;
pub mod tile;

// Re-export commonly used types
pub use config::{
    ChannelSpec, MultiBandOptions, ProviderOptions, RenderMode, RenderOptions, SingleBandMode,
    SingleBandOptions, DEFAULT_CACHE_TTL, DEFAULT_COLOR_SCALE, DEFAULT_MAXIMUM_LEVEL,
    DEFAULT_MINIMUM_LEVEL, DEFAULT_TILE_SIZE,
};
pub use error::{ConfigError, DecodeError, ProviderError};
pub use geo::{resolve_extent, ProjFn, ProjTransform, SpatialExtent, Wgs84Transform};
pub use provider::{resolve_levels, resolve_ranges, CogTileProvider};
pub use raster::{
    BandData, BandMetadata, DecodePool, GeoKeys, ImageArena, ImageMeta, RasterSource, ReadRequest,
    ResampleMethod, RgbData, Window,
};
pub use render::{
    compose_bands, BandComposeTask, BandExpression, ChannelRange, ColorMapper, ColorScale,
    ColorStop, Compositor, PoolCompositor, TileDataset,
};
pub use tile::{cache_key, tile_window, TileResultCache};
