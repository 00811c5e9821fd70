//! Dynamic texture-atlas allocation.
//!
//! - Allocator: binary-tree guillotine packing over a fixed-capacity node arena, with merge-on-release
//! - Cache: `DynamicAtlas` memoizes key → region and reports when pixels need uploading
//! - Backing store: `PixelAtlas` copies RGBA images into their regions on a CPU surface
//! - Data model is serde-serializable; JSON exporters are provided in `export`.
//!
//! Quick example:
//! ```
//! use dynatlas_core::prelude::*;
//! # fn main() -> dynatlas_core::Result<()> {
//! let mut atlas: DynamicAtlas<u64> = DynamicAtlas::new(1024, 1024, 128)?;
//! let slot = atlas.ensure_slot(42, 64, 32)?;
//! assert!(slot.upload_needed);
//! assert_eq!(slot.pixel_rect, Rect::new(0, 0, 64, 32));
//! assert_eq!(slot.rect.to_array(), [0.0625, 0.03125, 0.0, 0.0]);
//!
//! // Memoized: same rectangle, nothing to upload.
//! assert!(!atlas.ensure_slot(42, 64, 32)?.upload_needed);
//! assert!(atlas.release(&42));
//! # Ok(()) }
//! ```

pub mod allocator;
mod arena;
pub mod backing;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod model;

pub use allocator::*;
pub use backing::*;
pub use cache::*;
pub use config::*;
pub use error::*;
pub use export::*;
pub use model::*;

/// Convenience prelude for common types and functions.
/// Importing `dynatlas_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::allocator::AtlasAllocator;
    pub use crate::backing::{PixelAtlas, UpdateRegion};
    pub use crate::cache::{DynamicAtlas, Slot};
    pub use crate::config::{AtlasConfig, AtlasConfigBuilder};
    pub use crate::error::AtlasError;
    pub use crate::model::{AtlasSnapshot, AtlasStats, NormalizedRect, Rect, Region};
}
