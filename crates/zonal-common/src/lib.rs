//! Common types shared by the raster reader and the zonal statistics engine.
//!
//! Everything here is plain coordinate arithmetic: the 6-coefficient affine
//! transform between pixel and world space, world-space bounding boxes, and
//! pixel windows derived from them.

pub mod affine;
pub mod bbox;
pub mod window;

pub use affine::{Affine, AffineError};
pub use bbox::BoundingBox;
pub use window::Window;
