//! Raster-decode collaborator boundary.
//!
//! The provider never parses TIFF bytes itself. Everything it knows about
//! the pyramid comes through the [`RasterSource`] trait: per-overview
//! metadata ([`ImageMeta`]) and windowed pixel reads ([`ReadRequest`]).
//! Decode work is throttled through an application-owned [`DecodePool`].
//!
//! Overview indices are normalized at this boundary: index 0 is always the
//! coarsest overview and `image_count() - 1` the finest, regardless of how
//! the underlying file orders its images.

mod image;
mod source;

pub use self::image::{BandMetadata, GeoKeys, ImageArena, ImageMeta};
pub use source::{
    BandData, DecodePool, RasterSource, ReadRequest, ResampleMethod, RgbData, Window,
};
