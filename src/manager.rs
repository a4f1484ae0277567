//! ChunkManager - owns every buffer and every virtual chunk
//!
//! One explicit owner replaces ad hoc global state: all engine operations
//! go through a `ChunkManager` passed by reference, with explicit
//! construction and teardown. The manager holds the buffer table, the
//! virtual-chunk table, and the buffer-to-virtual-chunk index the
//! propagation engine consults on every edit.

use ahash::AHashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::buffer::{Buffer, BufferId, SuppressScope, EditRecord};
use crate::chunk::{ChunkDescriptor, ChunkId, ChunkOptions, ChunkTag, VirtualChunk, VirtualChunkId};
use crate::error::{MirrorError, Result};
use crate::region::Region;

/// Counts of live engine state, for logging and demos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub buffers: usize,
    pub live_buffers: usize,
    pub virtual_chunks: usize,
    pub chunks: usize,
    pub tagged_spans: usize,
}

/// Owner of all buffers, virtual chunks, and their registries.
#[derive(Debug, Default)]
pub struct ChunkManager {
    pub(crate) buffers: AHashMap<BufferId, Buffer>,
    pub(crate) virtual_chunks: AHashMap<VirtualChunkId, VirtualChunk>,
    pub(crate) virtual_by_buffer: AHashMap<BufferId, VirtualChunkId>,
}

impl ChunkManager {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- buffers ----

    /// Register a new ordinary buffer preloaded with `text`.
    pub fn create_buffer(&mut self, name: impl Into<String>, text: &str) -> BufferId {
        let buf = Buffer::new(name, text);
        let id = buf.id();
        self.buffers.insert(id, buf);
        id
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    fn live_buffer(&self, id: BufferId) -> Result<&Buffer> {
        self.buffers
            .get(&id)
            .filter(|b| b.is_live())
            .ok_or(MirrorError::DeadBuffer(id))
    }

    pub(crate) fn live_buffer_mut(&mut self, id: BufferId) -> Result<&mut Buffer> {
        self.buffers
            .get_mut(&id)
            .filter(|b| b.is_live())
            .ok_or(MirrorError::DeadBuffer(id))
    }

    /// Mark a buffer dead. Descriptors referencing it become invalid and
    /// are reclaimed on the next cleanup.
    pub fn kill_buffer(&mut self, id: BufferId) -> Result<()> {
        let buf = self.buffers.get_mut(&id).ok_or(MirrorError::DeadBuffer(id))?;
        buf.kill();
        Ok(())
    }

    pub fn buffer_text(&self, id: BufferId) -> Result<String> {
        Ok(self.live_buffer(id)?.contents())
    }

    pub fn slice(&self, id: BufferId, begin: usize, end: usize) -> Result<String> {
        self.live_buffer(id)?.slice(begin, end)
    }

    /// Attach a free-form annotation to a buffer range.
    pub fn annotate(
        &mut self,
        id: BufferId,
        begin: usize,
        end: usize,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.live_buffer_mut(id)?.annotate(begin, end, key, value)
    }

    /// Replace a range while the target buffer's notifications are muted.
    ///
    /// Every write the propagation engine performs goes through here; the
    /// scope guard releases the mute on all exit paths.
    pub(crate) fn suppressed_replace(
        &mut self,
        id: BufferId,
        begin: usize,
        end: usize,
        text: &str,
    ) -> Result<EditRecord> {
        let buf = self.live_buffer_mut(id)?;
        let mut scope = SuppressScope::enter(buf);
        scope.buffer().apply_edit(begin, end, text)
    }

    // ---- virtual chunks ----

    /// Allocate a virtual chunk: a canonical buffer preloaded with `text`
    /// plus an empty registry, registered process-wide.
    pub fn create_virtual_chunk(&mut self, text: &str) -> VirtualChunkId {
        let mut buffer = Buffer::new(String::new(), text);
        let buffer_id = buffer.id();
        let vchunk = VirtualChunk::new(buffer_id);
        let id = vchunk.id;

        buffer.rename(format!("virtual-chunk-{}", id.0.simple()));
        self.buffers.insert(buffer_id, buffer);
        self.virtual_by_buffer.insert(buffer_id, id);
        self.virtual_chunks.insert(id, vchunk);
        debug!(virtual_chunk = %id, "created virtual chunk");
        id
    }

    pub fn virtual_chunk(&self, id: VirtualChunkId) -> Option<&VirtualChunk> {
        self.virtual_chunks.get(&id)
    }

    pub fn virtual_chunk_ids(&self) -> Vec<VirtualChunkId> {
        self.virtual_chunks.keys().copied().collect()
    }

    /// A virtual chunk is live while it is registered and its canonical
    /// buffer is.
    pub fn is_virtual_chunk_live(&self, id: VirtualChunkId) -> bool {
        self.virtual_chunks
            .get(&id)
            .and_then(|vc| self.buffers.get(&vc.buffer))
            .map(|b| b.is_live())
            .unwrap_or(false)
    }

    /// The canonical text of a virtual chunk.
    pub fn virtual_text(&self, id: VirtualChunkId) -> Result<String> {
        let vc = self
            .virtual_chunks
            .get(&id)
            .ok_or(MirrorError::InvalidVirtualChunk(id))?;
        self.buffer_text(vc.buffer)
            .map_err(|_| MirrorError::InvalidVirtualChunk(id))
    }

    // ---- chunk lifecycle ----

    /// Mirror a virtual chunk at `[real_begin, real_end)` of `buffer`.
    ///
    /// The target range is overwritten with a verbatim copy of the
    /// referenced virtual slice, both regions are anchored, and the real
    /// span is tagged with the back-reference.
    pub fn create_chunk(
        &mut self,
        virtual_chunk: VirtualChunkId,
        buffer: BufferId,
        real_begin: usize,
        real_end: usize,
        options: ChunkOptions,
    ) -> Result<ChunkId> {
        if !self.is_virtual_chunk_live(virtual_chunk) {
            return Err(MirrorError::InvalidVirtualChunk(virtual_chunk));
        }
        let vbuf_id = self.virtual_chunks[&virtual_chunk].buffer;

        let (vb, ve) = {
            let vbuf = self.live_buffer(vbuf_id)?;
            let span = options.virtual_span.unwrap_or((0, vbuf.len()));
            let len = vbuf.len();
            if span.0 > span.1 || span.1 > len {
                return Err(MirrorError::InvalidRange {
                    begin: span.0,
                    end: span.1,
                    len,
                });
            }
            span
        };
        let payload = self.live_buffer(vbuf_id)?.slice(vb, ve)?;

        // Validate the target before touching anything.
        {
            let buf = self.live_buffer(buffer)?;
            let len = buf.len();
            if real_begin > real_end || real_end > len {
                return Err(MirrorError::InvalidRange {
                    begin: real_begin,
                    end: real_end,
                    len,
                });
            }
        }

        // Anchor the virtual side first so the copy into the same buffer
        // (a mirror inside a virtual chunk) rebases it correctly.
        let virtual_region = {
            let vbuf = self.live_buffer_mut(vbuf_id)?;
            Region::anchored(vbuf, vb, ve)?
        };

        let payload_len = payload.chars().count();
        if let Err(err) = self.suppressed_replace(buffer, real_begin, real_end, &payload) {
            if let Ok(vbuf) = self.live_buffer_mut(vbuf_id) {
                virtual_region.release(vbuf);
            }
            return Err(err);
        }

        let real_region = {
            let buf = self.live_buffer_mut(buffer)?;
            Region::anchored(buf, real_begin, real_begin + payload_len)?
        };

        let descriptor =
            ChunkDescriptor::new(virtual_chunk, virtual_region, real_region, &options);
        let tag = descriptor.tag();
        let id = descriptor.id;

        let buf = self.live_buffer_mut(buffer)?;
        buf.tags
            .attach_chunk(real_begin, real_begin + payload_len, tag);

        self.virtual_chunks
            .get_mut(&virtual_chunk)
            .expect("virtual chunk verified live")
            .insert(descriptor);

        debug!(chunk = %id, virtual_chunk = %virtual_chunk, "created chunk");
        Ok(id)
    }

    /// Build a new virtual chunk from the selected text and mark the
    /// selection as its first mirror.
    pub fn create_chunk_from_selection(
        &mut self,
        buffer: BufferId,
        begin: usize,
        end: usize,
    ) -> Result<VirtualChunkId> {
        let text = self.live_buffer(buffer)?.slice(begin, end)?;
        let virtual_chunk = self.create_virtual_chunk(&text);
        match self.create_chunk(virtual_chunk, buffer, begin, end, ChunkOptions::default()) {
            Ok(_) => Ok(virtual_chunk),
            Err(err) => {
                self.destroy_virtual_chunk(virtual_chunk);
                Err(err)
            }
        }
    }

    /// Chunk ids registered under a virtual chunk.
    pub fn chunks_of(&self, virtual_chunk: VirtualChunkId) -> Vec<ChunkId> {
        self.virtual_chunks
            .get(&virtual_chunk)
            .map(|vc| vc.chunk_ids())
            .unwrap_or_default()
    }

    /// Plain registry lookup, no liveness side effects.
    pub fn descriptor(&self, tag: &ChunkTag) -> Option<&ChunkDescriptor> {
        self.virtual_chunks
            .get(&tag.virtual_chunk)?
            .get(&tag.chunk)
    }

    /// The chunk tag carried by the text at `pos` of `buffer`, if any.
    pub fn chunk_at(&self, buffer: BufferId, pos: usize) -> Option<ChunkTag> {
        self.buffers.get(&buffer)?.tags.chunk_at(pos).copied()
    }

    /// Resolve a back-reference tag to its descriptor.
    ///
    /// Finding the virtual chunk dead triggers a best-effort cleanup sweep
    /// before reporting the tag unresolvable.
    pub fn resolve(&mut self, tag: &ChunkTag) -> Option<ChunkDescriptor> {
        if !self.is_virtual_chunk_live(tag.virtual_chunk) {
            warn!(virtual_chunk = %tag.virtual_chunk, "resolve hit a dead virtual chunk");
            self.cleanup(None);
            return None;
        }
        self.virtual_chunks[&tag.virtual_chunk]
            .get(&tag.chunk)
            .cloned()
    }

    /// Round-trip validity check: the real-region's buffer is live and the
    /// text at its position still carries a tag resolving back to an equal
    /// descriptor. Detects descriptors orphaned by deletion or retagging.
    pub fn verify(&self, descriptor: &ChunkDescriptor) -> bool {
        let Some(buf) = self.buffers.get(&descriptor.real_region.buffer) else {
            return false;
        };
        let Some((rb, re)) = descriptor.real_region.resolve(buf) else {
            return false;
        };
        let Some(span) = buf.tags.chunk_span(&descriptor.tag()) else {
            return false;
        };
        if span.begin != rb || span.end != re {
            return false;
        }
        let Some(vbuf) = self
            .virtual_chunks
            .get(&descriptor.virtual_chunk)
            .and_then(|vc| self.buffers.get(&vc.buffer))
        else {
            return false;
        };
        if descriptor.virtual_region.resolve(vbuf).is_none() {
            return false;
        }
        self.descriptor(&descriptor.tag()) == Some(descriptor)
    }

    /// Explicitly end a chunk's synchronization: strip its tag from the
    /// real region and drop the descriptor. Other mirrors of the same
    /// virtual chunk are untouched.
    pub fn detach_chunk(&mut self, tag: &ChunkTag) -> bool {
        let Some(vchunk) = self.virtual_chunks.get_mut(&tag.virtual_chunk) else {
            return false;
        };
        let Some(descriptor) = vchunk.remove(&tag.chunk) else {
            return false;
        };
        debug!(chunk = %tag.chunk, "detached chunk");

        if let Some(buf) = self.buffers.get_mut(&descriptor.real_region.buffer) {
            descriptor.real_region.release(buf);
            buf.tags.detach_chunk(tag, descriptor.keep_annotations);
        }
        let vbuf_id = self.virtual_chunks[&tag.virtual_chunk].buffer;
        if let Some(vbuf) = self.buffers.get_mut(&vbuf_id) {
            descriptor.virtual_region.release(vbuf);
        }

        if self.virtual_chunks[&tag.virtual_chunk].is_empty() {
            self.destroy_virtual_chunk(tag.virtual_chunk);
        }
        true
    }

    // ---- garbage collection ----

    /// Verify every descriptor in scope and purge the failures; a virtual
    /// chunk whose registry empties is destroyed. With no argument the
    /// sweep covers all known virtual chunks.
    pub fn cleanup(&mut self, scope: Option<VirtualChunkId>) {
        let targets = match scope {
            Some(id) => vec![id],
            None => self.virtual_chunk_ids(),
        };

        for vc_id in targets {
            if !self.virtual_chunks.contains_key(&vc_id) {
                continue;
            }
            if !self.is_virtual_chunk_live(vc_id) {
                self.destroy_virtual_chunk(vc_id);
                continue;
            }

            let stale: Vec<ChunkDescriptor> = self.virtual_chunks[&vc_id]
                .descriptors()
                .filter(|d| !self.verify(d))
                .cloned()
                .collect();
            for descriptor in stale {
                warn!(chunk = %descriptor.id, "reclaiming invalid descriptor");
                self.purge_descriptor(&descriptor);
            }

            if self
                .virtual_chunks
                .get(&vc_id)
                .map(|vc| vc.is_empty())
                .unwrap_or(false)
            {
                self.destroy_virtual_chunk(vc_id);
            }
        }
    }

    fn purge_descriptor(&mut self, descriptor: &ChunkDescriptor) {
        if let Some(vchunk) = self.virtual_chunks.get_mut(&descriptor.virtual_chunk) {
            vchunk.remove(&descriptor.id);
        }
        if let Some(buf) = self.buffers.get_mut(&descriptor.real_region.buffer) {
            descriptor.real_region.release(buf);
            buf.tags
                .detach_chunk(&descriptor.tag(), descriptor.keep_annotations);
        }
        if let Some(vbuf_id) = self
            .virtual_chunks
            .get(&descriptor.virtual_chunk)
            .map(|vc| vc.buffer)
        {
            if let Some(vbuf) = self.buffers.get_mut(&vbuf_id) {
                descriptor.virtual_region.release(vbuf);
            }
        }
    }

    /// Drop a virtual chunk: its registry, its canonical buffer, and its
    /// entry in the process-wide set.
    fn destroy_virtual_chunk(&mut self, id: VirtualChunkId) {
        let Some(vchunk) = self.virtual_chunks.remove(&id) else {
            return;
        };
        debug!(virtual_chunk = %id, "destroying virtual chunk");

        for descriptor in vchunk.descriptors() {
            if let Some(buf) = self.buffers.get_mut(&descriptor.real_region.buffer) {
                descriptor.real_region.release(buf);
                buf.tags
                    .detach_chunk(&descriptor.tag(), descriptor.keep_annotations);
            }
        }

        self.virtual_by_buffer.remove(&vchunk.buffer);
        if let Some(mut buf) = self.buffers.remove(&vchunk.buffer) {
            buf.kill();
        }
    }

    // ---- introspection ----

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            buffers: self.buffers.len(),
            live_buffers: self.buffers.values().filter(|b| b.is_live()).count(),
            virtual_chunks: self.virtual_chunks.len(),
            chunks: self.virtual_chunks.values().map(|vc| vc.len()).sum(),
            tagged_spans: self.buffers.values().map(|b| b.tags.chunk_count()).sum(),
        }
    }

    /// Current text of a chunk's real region.
    pub fn chunk_real_text(&self, tag: &ChunkTag) -> Option<String> {
        let descriptor = self.descriptor(tag)?;
        let buf = self.buffers.get(&descriptor.real_region.buffer)?;
        descriptor.real_region.text(buf)
    }

    /// Current text of a chunk's virtual region.
    pub fn chunk_virtual_text(&self, tag: &ChunkTag) -> Option<String> {
        let descriptor = self.descriptor(tag)?;
        let vc = self.virtual_chunks.get(&descriptor.virtual_chunk)?;
        let vbuf = self.buffers.get(&vc.buffer)?;
        descriptor.virtual_region.text(vbuf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_of(vc: VirtualChunkId, id: ChunkId) -> ChunkTag {
        ChunkTag {
            virtual_chunk: vc,
            chunk: id,
        }
    }

    #[test]
    fn test_create_chunk_round_trip() {
        let mut mgr = ChunkManager::new();
        let buf = mgr.create_buffer("a.txt", "..........HELLOWORLD..");
        let vc = mgr.create_virtual_chunk("HELLOWORLD");
        let id = mgr
            .create_chunk(vc, buf, 10, 20, ChunkOptions::default())
            .unwrap();
        let tag = tag_of(vc, id);

        assert_eq!(mgr.chunk_real_text(&tag).unwrap(), "HELLOWORLD");
        assert_eq!(mgr.chunk_virtual_text(&tag).unwrap(), "HELLOWORLD");
        assert_eq!(mgr.buffer_text(buf).unwrap(), "..........HELLOWORLD..");
    }

    #[test]
    fn test_create_chunk_rejects_unregistered_virtual_chunk() {
        let mut mgr = ChunkManager::new();
        let buf = mgr.create_buffer("a.txt", "text");
        let bogus = VirtualChunkId(uuid::Uuid::new_v4());
        let err = mgr
            .create_chunk(bogus, buf, 0, 4, ChunkOptions::default())
            .unwrap_err();
        assert_eq!(err, MirrorError::InvalidVirtualChunk(bogus));
    }

    #[test]
    fn test_create_chunk_overwrites_target_range() {
        let mut mgr = ChunkManager::new();
        let buf = mgr.create_buffer("a.txt", "xxxx rest");
        let vc = mgr.create_virtual_chunk("NEW");
        mgr.create_chunk(vc, buf, 0, 4, ChunkOptions::default())
            .unwrap();
        assert_eq!(mgr.buffer_text(buf).unwrap(), "NEW rest");
    }

    #[test]
    fn test_partial_virtual_span() {
        let mut mgr = ChunkManager::new();
        let buf = mgr.create_buffer("a.txt", "____");
        let vc = mgr.create_virtual_chunk("abcdefgh");
        let id = mgr
            .create_chunk(
                vc,
                buf,
                0,
                4,
                ChunkOptions::default().with_virtual_span(2, 6),
            )
            .unwrap();
        let tag = tag_of(vc, id);
        assert_eq!(mgr.chunk_real_text(&tag).unwrap(), "cdef");
    }

    #[test]
    fn test_resolve_and_verify() {
        let mut mgr = ChunkManager::new();
        let buf = mgr.create_buffer("a.txt", "payload here");
        let vc = mgr.create_virtual_chunk("payload");
        let id = mgr
            .create_chunk(vc, buf, 0, 7, ChunkOptions::default())
            .unwrap();
        let tag = tag_of(vc, id);

        let descriptor = mgr.resolve(&tag).unwrap();
        assert!(mgr.verify(&descriptor));
        assert_eq!(descriptor.id, id);
    }

    #[test]
    fn test_orphan_reclamation_destroys_empty_virtual_chunk() {
        let mut mgr = ChunkManager::new();
        let buf = mgr.create_buffer("a.txt", "payload here");
        let vc = mgr.create_virtual_chunk("payload");
        mgr.create_chunk(vc, buf, 0, 7, ChunkOptions::default())
            .unwrap();

        mgr.kill_buffer(buf).unwrap();
        mgr.cleanup(Some(vc));

        assert!(!mgr.is_virtual_chunk_live(vc));
        assert!(mgr.virtual_chunk(vc).is_none());
        assert!(mgr.virtual_chunk_ids().is_empty());
    }

    #[test]
    fn test_resolve_dead_virtual_chunk_sweeps() {
        let mut mgr = ChunkManager::new();
        let buf = mgr.create_buffer("a.txt", "payload here");
        let vc = mgr.create_virtual_chunk("payload");
        let id = mgr
            .create_chunk(vc, buf, 0, 7, ChunkOptions::default())
            .unwrap();
        let tag = tag_of(vc, id);

        let vbuf = mgr.virtual_chunk(vc).unwrap().buffer;
        mgr.kill_buffer(vbuf).unwrap();

        assert!(mgr.resolve(&tag).is_none());
        assert!(mgr.virtual_chunk(vc).is_none());
    }

    #[test]
    fn test_detach_leaves_other_mirrors() {
        let mut mgr = ChunkManager::new();
        let a = mgr.create_buffer("a.txt", "..........");
        let b = mgr.create_buffer("b.txt", "..........");
        let vc = mgr.create_virtual_chunk("SHARED");
        let first = mgr.create_chunk(vc, a, 0, 0, ChunkOptions::default()).unwrap();
        let second = mgr.create_chunk(vc, b, 0, 0, ChunkOptions::default()).unwrap();

        assert!(mgr.detach_chunk(&tag_of(vc, first)));
        assert!(mgr.virtual_chunk(vc).is_some());
        assert_eq!(mgr.chunks_of(vc), vec![second]);

        // Detaching the last mirror destroys the virtual chunk.
        assert!(mgr.detach_chunk(&tag_of(vc, second)));
        assert!(mgr.virtual_chunk(vc).is_none());
    }

    #[test]
    fn test_stats() {
        let mut mgr = ChunkManager::new();
        let buf = mgr.create_buffer("a.txt", "payload here");
        let vc = mgr.create_virtual_chunk("payload");
        mgr.create_chunk(vc, buf, 0, 7, ChunkOptions::default())
            .unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.buffers, 2);
        assert_eq!(stats.virtual_chunks, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.tagged_spans, 1);
    }
}
