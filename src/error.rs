use thiserror::Error;

/// Fatal configuration problems, surfaced at provider construction
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// RGB conversion needs three sequential bands
    #[error("convertToRGB requires at least 3 bands, source has {samples}")]
    RgbConversionUnsupported { samples: u32 },

    /// A render option references a band the source does not have
    #[error("band {band} is out of range, source has {samples} samples per pixel")]
    BandOutOfRange { band: u32, samples: u32 },

    /// No transform could be derived for the source CRS
    #[error("no coordinate transform for EPSG:{epsg}; supply a projection function for this code")]
    UnresolvedProjection { epsg: u32 },

    /// A projection string or transform could not be built
    #[error("projection setup failed: {0}")]
    Projection(String),

    /// Multi-band and RGB-converted rendering need a compositor pool
    #[error("band compositing requires a compositor, none was configured")]
    MissingCompositor,

    /// A named color scale that is not in the built-in table
    #[error("unknown color scale: {0}")]
    UnknownColorScale(String),

    /// A custom color scale needs at least two stops to interpolate
    #[error("color scale needs at least 2 stops, got {0}")]
    TooFewStops(usize),

    /// A color stop carried a malformed hex color
    #[error("invalid color stop: {0:?}")]
    InvalidColorStop(String),

    /// The source exposes no overview images at all
    #[error("raster source has no images")]
    EmptySource,
}

/// Errors from the raster-decode collaborator
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The decode collaborator failed to produce pixel data
    #[error("decode failed: {0}")]
    Read(String),

    /// An overview index outside the source's image count
    #[error("overview {index} out of range, source has {count} images")]
    ImageOutOfRange { index: usize, count: usize },

    /// The shared decode pool was released while a read was queued
    #[error("decode worker pool is shut down")]
    PoolClosed,
}

/// Per-request failures returned from tile and probe operations.
///
/// Construction failures are also reported through this type: a provider
/// that fails to construct surfaces the underlying [`ConfigError`] or
/// [`DecodeError`] and is never handed to the caller.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider was disposed; no further requests are served
    #[error("provider has been disposed")]
    Disposed,

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Decode error
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The compositing stage failed
    #[error("compositing failed: {0}")]
    Compose(String),
}
