use serde::{Deserialize, Serialize};

/// Dynamic atlas configuration.
/// Key notes:
///   - `width`/`height` are the fixed atlas size in pixels; the tree never grows past them
///   - `capacity` is the maximum number of concurrently resident keys; the node arena is sized from it
///   - `node_capacity` overrides the arena size for workloads that fragment heavily
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AtlasConfig {
    /// Atlas width in pixels.
    pub width: u32,
    /// Atlas height in pixels.
    pub height: u32,
    /// Maximum number of concurrently resident regions.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Node arena size override; derived from `capacity` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_capacity: Option<usize>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            capacity: default_capacity(),
            node_capacity: None,
        }
    }
}

impl AtlasConfig {
    /// Validates the configuration parameters.
    ///
    /// Returns an error if:
    /// - Dimensions are zero
    /// - Capacity is zero, or so large that node indices would overflow
    /// - An explicit node capacity cannot hold a single double split
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AtlasError;

        if self.width == 0 || self.height == 0 {
            return Err(AtlasError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        if self.capacity == 0 {
            return Err(AtlasError::InvalidConfig(
                "capacity must be at least 1".into(),
            ));
        }

        if self.capacity > MAX_CAPACITY {
            return Err(AtlasError::InvalidConfig(format!(
                "capacity ({}) exceeds the maximum of {}",
                self.capacity, MAX_CAPACITY
            )));
        }

        if let Some(nodes) = self.node_capacity {
            if !(MIN_NODE_CAPACITY..=MAX_NODE_CAPACITY).contains(&nodes) {
                return Err(AtlasError::InvalidConfig(format!(
                    "node_capacity ({}) must be within {}..={}",
                    nodes, MIN_NODE_CAPACITY, MAX_NODE_CAPACITY
                )));
            }
        }

        Ok(())
    }

    /// Number of arena slots backing the tree.
    ///
    /// Defaults to the root plus `NODES_PER_REGION` slots per region. A placement
    /// splits its leaf at most twice (four nodes), so `capacity` allocations
    /// without releases always fit. The remaining slots absorb freed leaves that
    /// cannot merge while a sibling subtree is still resident.
    pub fn node_capacity(&self) -> usize {
        self.node_capacity
            .unwrap_or_else(|| self.capacity.saturating_mul(NODES_PER_REGION).saturating_add(1))
    }
}

/// Arena slots reserved per region when `node_capacity` is not set.
pub const NODES_PER_REGION: usize = 16;

/// Largest accepted `capacity`; keeps every node index representable as `u32`.
pub const MAX_CAPACITY: usize = (MAX_NODE_CAPACITY - 1) / NODES_PER_REGION;

/// Largest accepted `node_capacity`.
pub const MAX_NODE_CAPACITY: usize = u32::MAX as usize;

/// The root plus one double split.
pub const MIN_NODE_CAPACITY: usize = 5;

fn default_capacity() -> usize {
    256
}

/// Builder for `AtlasConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct AtlasConfigBuilder {
    cfg: AtlasConfig,
}

impl AtlasConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: AtlasConfig::default(),
        }
    }
    pub fn with_dimensions(mut self, w: u32, h: u32) -> Self {
        self.cfg.width = w;
        self.cfg.height = h;
        self
    }
    pub fn capacity(mut self, v: usize) -> Self {
        self.cfg.capacity = v;
        self
    }
    pub fn node_capacity(mut self, v: usize) -> Self {
        self.cfg.node_capacity = Some(v);
        self
    }
    pub fn build(self) -> AtlasConfig {
        self.cfg
    }
}

impl AtlasConfig {
    /// Create a fluent builder for `AtlasConfig`.
    pub fn builder() -> AtlasConfigBuilder {
        AtlasConfigBuilder::new()
    }
}
