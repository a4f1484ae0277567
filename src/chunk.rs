//! Chunk descriptors and per-virtual-chunk registries.

use std::fmt;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::buffer::BufferId;
use crate::region::Region;

/// Identifier of a virtual chunk (a canonical-text buffer plus registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtualChunkId(pub Uuid);

impl fmt::Display for VirtualChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one mirrored occurrence of a virtual chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub Uuid);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Weak back-reference carried by a real region's tag span, pointing at
/// the descriptor that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkTag {
    pub virtual_chunk: VirtualChunkId,
    pub chunk: ChunkId,
}

/// Options accepted by `create_chunk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkOptions {
    /// Slice of the virtual chunk to mirror; `None` mirrors all of it.
    pub virtual_span: Option<(usize, usize)>,

    /// Whether edits propagate through this chunk.
    pub synchronized: bool,

    /// Whether range annotations survive a detach.
    pub keep_annotations: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            virtual_span: None,
            synchronized: true,
            keep_annotations: false,
        }
    }
}

impl ChunkOptions {
    pub fn with_virtual_span(mut self, begin: usize, end: usize) -> Self {
        self.virtual_span = Some((begin, end));
        self
    }

    pub fn unsynchronized(mut self) -> Self {
        self.synchronized = false;
        self
    }

    pub fn keeping_annotations(mut self) -> Self {
        self.keep_annotations = true;
        self
    }
}

/// One mirrored occurrence of a virtual chunk at a concrete buffer range.
///
/// Owned exclusively by the registry of its virtual chunk; the real
/// region's tag span holds the only outside reference, and that one is
/// weak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub id: ChunkId,
    pub virtual_chunk: VirtualChunkId,
    pub virtual_region: Region,
    pub real_region: Region,
    pub synchronized: bool,
    pub keep_annotations: bool,
    pub created_at: DateTime<Utc>,
}

impl ChunkDescriptor {
    pub fn new(
        virtual_chunk: VirtualChunkId,
        virtual_region: Region,
        real_region: Region,
        options: &ChunkOptions,
    ) -> Self {
        Self {
            id: ChunkId(Uuid::new_v4()),
            virtual_chunk,
            virtual_region,
            real_region,
            synchronized: options.synchronized,
            keep_annotations: options.keep_annotations,
            created_at: Utc::now(),
        }
    }

    pub fn tag(&self) -> ChunkTag {
        ChunkTag {
            virtual_chunk: self.virtual_chunk,
            chunk: self.id,
        }
    }
}

/// A virtual chunk: the canonical buffer plus the registry of its mirrors.
#[derive(Debug, Clone)]
pub struct VirtualChunk {
    pub id: VirtualChunkId,
    pub buffer: BufferId,
    pub created_at: DateTime<Utc>,
    registry: AHashMap<ChunkId, ChunkDescriptor>,
}

impl VirtualChunk {
    pub fn new(buffer: BufferId) -> Self {
        Self {
            id: VirtualChunkId(Uuid::new_v4()),
            buffer,
            created_at: Utc::now(),
            registry: AHashMap::new(),
        }
    }

    /// Store a descriptor. A chunk id maps to at most one descriptor, so
    /// re-inserting under the same id replaces it.
    pub fn insert(&mut self, descriptor: ChunkDescriptor) {
        self.registry.insert(descriptor.id, descriptor);
    }

    pub fn get(&self, id: &ChunkId) -> Option<&ChunkDescriptor> {
        self.registry.get(id)
    }

    pub fn get_mut(&mut self, id: &ChunkId) -> Option<&mut ChunkDescriptor> {
        self.registry.get_mut(id)
    }

    pub fn remove(&mut self, id: &ChunkId) -> Option<ChunkDescriptor> {
        self.registry.remove(id)
    }

    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.registry.keys().copied().collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ChunkDescriptor> {
        self.registry.values()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
