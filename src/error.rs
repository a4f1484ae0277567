//! Error Handling for the Mirror Engine
//!
//! Only programmer-usage errors are surfaced to callers. Everything the
//! propagation engine can recover from locally (dead descriptors, diverged
//! shapes) degrades to "no longer synchronized" instead of failing the
//! enclosing edit.

use thiserror::Error;

use crate::buffer::BufferId;
use crate::chunk::VirtualChunkId;

/// Errors surfaced by the mirror engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    /// Operation targets a buffer that is not a registered virtual chunk
    #[error("not a registered virtual chunk: {0}")]
    InvalidVirtualChunk(VirtualChunkId),

    /// Operation targets an unknown or killed buffer
    #[error("buffer is unknown or dead: {0}")]
    DeadBuffer(BufferId),

    /// Range endpoints are out of bounds or reversed
    #[error("invalid range [{begin}, {end}) in buffer of length {len}")]
    InvalidRange {
        begin: usize,
        end: usize,
        len: usize,
    },
}

impl MirrorError {
    /// Check if this error is a usage error (caller bug, never transient)
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            MirrorError::InvalidVirtualChunk(_)
                | MirrorError::DeadBuffer(_)
                | MirrorError::InvalidRange { .. }
        )
    }
}

/// Result type used across the engine
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_classification() {
        let err = MirrorError::InvalidRange {
            begin: 4,
            end: 2,
            len: 10,
        };
        assert!(err.is_usage());
    }

    #[test]
    fn test_display() {
        let err = MirrorError::InvalidRange {
            begin: 0,
            end: 9,
            len: 5,
        };
        assert_eq!(err.to_string(), "invalid range [0, 9) in buffer of length 5");
    }
}
