use crate::cache::DynamicAtlas;
use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::model::{NormalizedRect, Rect};
use image::{Rgba, RgbaImage};
use std::hash::Hash;

/// Region of the atlas image whose pixels changed and must be re-uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRegion {
    /// X coordinate of the region.
    pub x: u32,
    /// Y coordinate of the region.
    pub y: u32,
    /// Width of the region.
    pub width: u32,
    /// Height of the region.
    pub height: u32,
}

impl UpdateRegion {
    /// Check if this region is empty.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the area of this region in pixels.
    pub fn area(&self) -> u64 {
        (self.width as u64) * (self.height as u64)
    }
}

impl From<Rect> for UpdateRegion {
    fn from(r: Rect) -> Self {
        Self {
            x: r.x,
            y: r.y,
            width: r.w,
            height: r.h,
        }
    }
}

/// Dynamic atlas with a CPU-side RGBA surface.
///
/// This extends `DynamicAtlas` by copying pixels into each freshly allocated
/// region. Useful as a reference backing store, or as a staging image that is
/// mirrored to a GPU texture through the returned update regions.
pub struct PixelAtlas<K = u64> {
    atlas: DynamicAtlas<K>,
    image: RgbaImage,
    background_color: Rgba<u8>,
}

impl<K: Eq + Hash + Clone> PixelAtlas<K> {
    /// Create a new atlas with a transparent surface.
    pub fn new(cfg: &AtlasConfig) -> Result<Self> {
        let atlas = DynamicAtlas::from_config(cfg)?;
        let background_color = Rgba([0, 0, 0, 0]);
        Ok(Self {
            image: RgbaImage::from_pixel(cfg.width, cfg.height, background_color),
            atlas,
            background_color,
        })
    }

    /// Wraps an existing surface, e.g. one shared with a renderer. Its pixels
    /// are kept as they are; `image` must match the configured dimensions.
    pub fn with_image(cfg: &AtlasConfig, image: RgbaImage) -> Result<Self> {
        let atlas = DynamicAtlas::from_config(cfg)?;
        if image.dimensions() != (cfg.width, cfg.height) {
            return Err(AtlasError::InvalidInput(format!(
                "surface is {}x{} but atlas is {}x{}",
                image.width(),
                image.height(),
                cfg.width,
                cfg.height
            )));
        }
        Ok(Self {
            atlas,
            image,
            background_color: Rgba([0, 0, 0, 0]),
        })
    }

    /// Set the background color; repaints the whole surface.
    pub fn with_background_color(mut self, color: Rgba<u8>) -> Self {
        self.background_color = color;
        for px in self.image.pixels_mut() {
            *px = color;
        }
        self
    }

    /// Ensures a slot for `key` sized to `image` and uploads the pixels if the
    /// slot was just allocated.
    /// Returns (rect, update_region); the region is `None` on a cache hit.
    pub fn add_image(
        &mut self,
        key: K,
        image: &RgbaImage,
    ) -> Result<(NormalizedRect, Option<UpdateRegion>)> {
        let (w, h) = image.dimensions();
        let slot = self.atlas.ensure_slot(key, w, h)?;
        if !slot.upload_needed {
            return Ok((slot.rect, None));
        }
        let region = self.blit(&slot.pixel_rect, image)?;
        Ok((slot.rect, Some(region)))
    }

    /// Release a slot, leaving its pixels in place.
    pub fn release(&mut self, key: &K) -> bool {
        self.atlas.release(key)
    }

    /// Release a slot and repaint it with the background color.
    /// Returns the repainted region, or `None` if the key was not resident.
    pub fn release_with_clear(&mut self, key: &K) -> Option<UpdateRegion> {
        let rect = self.atlas.pixel_rect(key)?;
        self.atlas.release(key);
        self.fill(&rect, self.background_color);
        Some(rect.into())
    }

    /// Forget every slot; optionally repaint the whole surface.
    pub fn reset(&mut self, clear: bool) {
        self.atlas.reset_all();
        if clear {
            let full = Rect::new(0, 0, self.image.width(), self.image.height());
            self.fill(&full, self.background_color);
        }
    }

    /// Get a reference to the atlas surface.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Hands the surface back, dropping the slot ledger.
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Geometry ledger behind the surface.
    pub fn atlas(&self) -> &DynamicAtlas<K> {
        &self.atlas
    }

    /// Copies `image` into exactly `dst`. Sizes must match.
    fn blit(&mut self, dst: &Rect, image: &RgbaImage) -> Result<UpdateRegion> {
        let (src_w, src_h) = image.dimensions();
        if src_w != dst.w || src_h != dst.h {
            return Err(AtlasError::InvalidInput(format!(
                "image is {}x{} but slot is {}x{}",
                src_w, src_h, dst.w, dst.h
            )));
        }
        for y in 0..src_h {
            for x in 0..src_w {
                self.image
                    .put_pixel(dst.x + x, dst.y + y, *image.get_pixel(x, y));
            }
        }
        Ok((*dst).into())
    }

    fn fill(&mut self, r: &Rect, color: Rgba<u8>) {
        for y in r.y..r.y2().min(self.image.height()) {
            for x in r.x..r.x2().min(self.image.width()) {
                self.image.put_pixel(x, y, color);
            }
        }
    }
}
