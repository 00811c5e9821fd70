use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    /// Exclusive right edge (`x + w`).
    pub fn x2(&self) -> u32 {
        self.x + self.w
    }
    /// Exclusive bottom edge (`y + h`).
    pub fn y2(&self) -> u32 {
        self.y + self.h
    }
    pub fn area(&self) -> u64 {
        (self.w as u64) * (self.h as u64)
    }
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
    /// Returns true if `r` is fully inside `self`.
    pub fn contains(&self, r: &Rect) -> bool {
        r.x >= self.x && r.y >= self.y && r.x2() <= self.x2() && r.y2() <= self.y2()
    }
    /// Returns true if the two rectangles share at least one pixel.
    pub fn overlaps(&self, r: &Rect) -> bool {
        !(self.x >= r.x2() || r.x >= self.x2() || self.y >= r.y2() || r.y >= self.y2())
    }
}

/// A packed region expressed as fractions of the atlas size, ready to be fed
/// to a shader as a scale/bias pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct NormalizedRect {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl NormalizedRect {
    /// Divides a pixel rectangle by the atlas dimensions.
    pub fn from_pixels(rect: &Rect, atlas_width: u32, atlas_height: u32) -> Self {
        let inv_w = 1.0 / atlas_width as f32;
        let inv_h = 1.0 / atlas_height as f32;
        Self {
            scale_x: rect.w as f32 * inv_w,
            scale_y: rect.h as f32 * inv_h,
            offset_x: rect.x as f32 * inv_w,
            offset_y: rect.y as f32 * inv_h,
        }
    }

    /// `[scale_x, scale_y, offset_x, offset_y]`, the layout most shaders expect.
    pub fn to_array(&self) -> [f32; 4] {
        [self.scale_x, self.scale_y, self.offset_x, self.offset_y]
    }
}

/// Occupancy statistics for a dynamic atlas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AtlasStats {
    pub width: u32,
    pub height: u32,
    /// Number of resident keys.
    pub resident: usize,
    /// Maximum number of concurrently resident keys the atlas was sized for.
    pub capacity: usize,
    /// Tree nodes currently taken from the arena.
    pub nodes_in_use: usize,
    /// Total arena slots.
    pub node_capacity: usize,
    /// Total atlas area in pixels.
    pub total_area: u64,
    /// Sum of resident region areas.
    pub used_area: u64,
    /// used_area / total_area (0.0 to 1.0).
    pub occupancy: f64,
    /// Largest free leaf, by area. A request larger than this in both
    /// dimensions cannot fit without releasing something first.
    pub largest_free: Option<Rect>,
}

impl AtlasStats {
    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Atlas: {}x{}, Resident: {}/{}, Nodes: {}/{}, Occupancy: {:.2}%, Used Area: {} px², Largest Free: {}",
            self.width,
            self.height,
            self.resident,
            self.capacity,
            self.nodes_in_use,
            self.node_capacity,
            self.occupancy * 100.0,
            self.used_area,
            self.largest_free
                .map(|r| format!("{}x{}", r.w, r.h))
                .unwrap_or_else(|| "none".into()),
        )
    }

    /// Returns free space in pixels.
    pub fn free_area(&self) -> u64 {
        self.total_area.saturating_sub(self.used_area)
    }
}

/// One resident region in an [`AtlasSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region<K = u64> {
    pub key: K,
    /// Placement in atlas pixels.
    pub frame: Rect,
    /// Placement as scale/offset fractions of the atlas.
    pub uv: NormalizedRect,
}

/// Point-in-time listing of everything resident in a dynamic atlas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlasSnapshot<K = u64> {
    pub width: u32,
    pub height: u32,
    pub regions: Vec<Region<K>>,
}
