//! Geographic extent resolution and coordinate transforms.

mod extent;
mod projection;

pub use extent::{resolve_extent, SpatialExtent};
pub use projection::{is_geographic, proj_string, ProjFn, ProjTransform, Wgs84Transform};
