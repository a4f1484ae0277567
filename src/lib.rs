//! # Mirror - Synchronized Text Region Engine
//!
//! Keeps multiple text regions, possibly in different buffers, synchronized:
//! editing any one mirrored region propagates the change to all others
//! sharing the same canonical source.
//!
//! ## Features
//!
//! - **Auto-adjusting anchors**: region extents follow insertions and
//!   deletions, with configurable edge stickiness
//! - **Region coalescing**: multi-point edits batch into one propagation
//!   pass per affected chunk
//! - **Divergence policy**: a region whose shape can no longer be
//!   reconciled detaches gracefully instead of failing the edit
//! - **Synchronous and scheduler-free**: every push runs inside the edit
//!   notification that caused it, guarded against re-entrancy
//!
//! ## Quick Start
//!
//! ```rust
//! use mirror::ChunkManager;
//!
//! let mut mgr = ChunkManager::new();
//! let buffer = mgr.create_buffer("notes.txt", "....HELLOWORLD....");
//!
//! // Mirror [4, 14) into a new virtual chunk, then edit through it.
//! let vc = mgr.create_chunk_from_selection(buffer, 4, 14).unwrap();
//! let canonical = mgr.virtual_chunk(vc).unwrap().buffer;
//! mgr.edit(canonical, 5, 5, "_").unwrap();
//!
//! assert_eq!(mgr.buffer_text(buffer).unwrap(), "....HELLO_WORLD....");
//! ```

pub mod buffer;
pub mod chunk;
pub mod error;
pub mod manager;
pub mod merge;
pub mod propagate;
pub mod region;

// Re-export main types for library consumers
pub use buffer::{AnchorHandle, Buffer, BufferId, EditRecord};
pub use chunk::{ChunkDescriptor, ChunkId, ChunkOptions, ChunkTag, VirtualChunk, VirtualChunkId};
pub use error::{MirrorError, Result};
pub use manager::{ChunkManager, ManagerStats};
pub use merge::{merge, MergeList, MergeRegion};
pub use region::Region;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
