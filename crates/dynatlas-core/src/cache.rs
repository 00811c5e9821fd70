use crate::allocator::AtlasAllocator;
use crate::config::AtlasConfig;
use crate::error::Result;
use crate::model::{AtlasSnapshot, AtlasStats, NormalizedRect, Rect, Region};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{debug, trace};

/// Result of [`DynamicAtlas::ensure_slot`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    /// Region as scale/offset fractions of the atlas.
    pub rect: NormalizedRect,
    /// Region in atlas pixels; the destination for a pixel upload.
    pub pixel_rect: Rect,
    /// True only when the region was allocated by this call, so its pixels
    /// still have to be written.
    pub upload_needed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    rect: NormalizedRect,
    pixel_rect: Rect,
}

/// Key → region ledger over an [`AtlasAllocator`].
///
/// Memoizes placements so repeated requests for a resident key are free, and
/// reports when a fresh placement needs its pixels uploaded. No pixel data
/// passes through here.
#[derive(Debug)]
pub struct DynamicAtlas<K = u64> {
    allocator: AtlasAllocator<K>,
    entries: HashMap<K, Entry>,
}

impl<K: Eq + Hash + Clone> DynamicAtlas<K> {
    pub fn new(width: u32, height: u32, capacity: usize) -> Result<Self> {
        Self::from_config(&AtlasConfig {
            width,
            height,
            capacity,
            node_capacity: None,
        })
    }

    pub fn from_config(cfg: &AtlasConfig) -> Result<Self> {
        Ok(Self {
            allocator: AtlasAllocator::from_config(cfg)?,
            entries: HashMap::with_capacity(cfg.capacity),
        })
    }

    pub fn width(&self) -> u32 {
        self.allocator.width()
    }

    pub fn height(&self) -> u32 {
        self.allocator.height()
    }

    /// Memoized region for `key`, if resident.
    pub fn try_get(&self, key: &K) -> Option<NormalizedRect> {
        self.entries.get(key).map(|e| e.rect)
    }

    /// Pixel-space region for `key`, if resident.
    pub fn pixel_rect(&self, key: &K) -> Option<Rect> {
        self.entries.get(key).map(|e| e.pixel_rect)
    }

    /// Returns the region for `key`, allocating `width`×`height` on a miss.
    ///
    /// A resident key is returned as-is with `upload_needed == false`; the
    /// requested size is not compared against the memoized one. Errors from
    /// the allocator are passed through and leave the atlas unchanged.
    pub fn ensure_slot(&mut self, key: K, width: u32, height: u32) -> Result<Slot> {
        if let Some(e) = self.entries.get(&key) {
            trace!("slot cache hit");
            return Ok(Slot {
                rect: e.rect,
                pixel_rect: e.pixel_rect,
                upload_needed: false,
            });
        }
        let pixel_rect = self.allocator.allocate(key.clone(), width, height)?;
        let rect = NormalizedRect::from_pixels(&pixel_rect, self.width(), self.height());
        self.entries.insert(key, Entry { rect, pixel_rect });
        Ok(Slot {
            rect,
            pixel_rect,
            upload_needed: true,
        })
    }

    /// Frees the region for `key`. Unknown keys are ignored (returns false).
    pub fn release(&mut self, key: &K) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.allocator.release(key)
    }

    /// Forgets every region and resets the allocator.
    pub fn reset_all(&mut self) {
        self.entries.clear();
        self.allocator.reset();
        debug!("dynamic atlas cleared");
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only access to the underlying allocator (tree dump, verification).
    pub fn allocator(&self) -> &AtlasAllocator<K> {
        &self.allocator
    }

    pub fn stats(&self) -> AtlasStats {
        self.allocator.stats()
    }

    /// Lists every resident region, ordered top-to-bottom then left-to-right.
    pub fn snapshot(&self) -> AtlasSnapshot<K> {
        let mut regions: Vec<Region<K>> = self
            .entries
            .iter()
            .map(|(k, e)| Region {
                key: k.clone(),
                frame: e.pixel_rect,
                uv: e.rect,
            })
            .collect();
        regions.sort_by_key(|r| (r.frame.y, r.frame.x));
        AtlasSnapshot {
            width: self.width(),
            height: self.height(),
            regions,
        }
    }
}
