//! Tile rendering: single-band color mapping and multi-band compositing.

mod colormap;
mod compose;

pub use colormap::{BandExpression, ColorMapper, ColorScale, ColorStop, TileDataset};
pub use compose::{compose_bands, BandComposeTask, ChannelRange, Compositor, PoolCompositor};
