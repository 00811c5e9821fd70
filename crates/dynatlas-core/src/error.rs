use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AtlasError {
    #[error("Invalid request: {width}x{height} (both dimensions must be at least 1)")]
    InvalidRequest { width: u32, height: u32 },
    #[error("No free region fits {width}x{height}")]
    NoFit { width: u32, height: u32 },
    /// Every one of the configured `capacity` regions is resident. Callers
    /// sized the atlas too small; retrying without a release cannot succeed.
    #[error("Atlas capacity exceeded ({capacity} regions resident)")]
    CapacityExceeded { capacity: usize },
    /// The node arena ran out of slots before the region limit was reached.
    /// Only a tree fragmented well beyond the configured node budget gets here.
    #[error("Node arena exhausted ({nodes} nodes); raise node_capacity")]
    ArenaExhausted { nodes: usize },
    #[error("Key is already resident in the atlas")]
    KeyInUse,
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Allocator tree is inconsistent: {0}")]
    CorruptTree(String),
}

impl AtlasError {
    /// Returns false for errors that indicate a misconfigured or broken
    /// allocator rather than a request that simply could not be served.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AtlasError::CapacityExceeded { .. }
                | AtlasError::ArenaExhausted { .. }
                | AtlasError::CorruptTree(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AtlasError>;
