//! Change Propagation Engine
//!
//! Reacts to edit notifications and pushes content between real and
//! virtual regions. The protocol is a pair of one-shot directed pushes:
//!
//! 1. An edit inside a mirrored region updates the canonical virtual
//!    region (full replace), then the refreshed canonical text is pushed
//!    to every other mirror of the same virtual chunk.
//! 2. An edit inside a virtual chunk's buffer is pushed to every mirror
//!    whose virtual region the edit touched.
//!
//! Every push writes through a suppression scope on the target buffer, so
//! a propagated write can never re-trigger propagation. A real-side edit
//! resolves to one of three outcomes: clean update, relocation (payload
//! intact but clipped at an edge), or detach when the region's shape has
//! diverged beyond repair. Propagation never raises to the caller.

use tracing::debug;

use crate::buffer::BufferId;
use crate::chunk::{ChunkId, ChunkTag, VirtualChunkId};
use crate::error::Result;
use crate::manager::ChunkManager;
use crate::merge::{MergeList, MergeRegion};

impl ChunkManager {
    /// Replace `[begin, end)` of `buffer` and run one propagation pass.
    ///
    /// This is the host-facing edit notification: apply, then push. Edits
    /// arriving while the buffer's notifications are suppressed (i.e.
    /// performed by propagation itself) are applied without propagating.
    pub fn edit(&mut self, buffer: BufferId, begin: usize, end: usize, replacement: &str) -> Result<()> {
        self.edit_many(buffer, &[(begin, end, replacement)])
    }

    /// Apply several splices as one host-level notification.
    ///
    /// Each splice is given in the coordinates left behind by the previous
    /// one. Touched chunks are coalesced through the merge engine, so a
    /// multi-point edit triggers at most one propagation pass per chunk.
    pub fn edit_many(&mut self, buffer: BufferId, edits: &[(usize, usize, &str)]) -> Result<()> {
        let suppressed = self.live_buffer_mut(buffer)?.notifications_suppressed();
        let vc_here = self.virtual_by_buffer.get(&buffer).copied();

        let mut pending = MergeList::new();
        let mut touched: Vec<ChunkId> = Vec::new();

        for &(begin, end, replacement) in edits {
            let record = {
                let buf = self.live_buffer_mut(buffer)?;
                for (tag, span_begin, span_end) in buf.tags.chunks_touching(begin, end) {
                    pending.add_or_merge(MergeRegion::new(span_begin, span_end, tag));
                }
                buf.apply_edit(begin, end, replacement)?
            };

            // Virtual-side batching: remember which mirrors this splice
            // touched, in post-edit coordinates.
            if let Some(vc_id) = vc_here {
                if let (Some(buf), Some(vchunk)) =
                    (self.buffers.get(&buffer), self.virtual_chunks.get(&vc_id))
                {
                    for descriptor in vchunk.descriptors() {
                        if !descriptor.synchronized || touched.contains(&descriptor.id) {
                            continue;
                        }
                        if let Some((vb, ve)) = descriptor.virtual_region.resolve(buf) {
                            if vb <= record.new_end && record.begin <= ve {
                                touched.push(descriptor.id);
                            }
                        }
                    }
                }
            }
        }

        if suppressed {
            return Ok(());
        }

        self.propagate_real_side(buffer, pending);
        if let Some(vc_id) = vc_here {
            self.propagate_virtual_side(vc_id, &touched);
        }
        Ok(())
    }

    /// Handle the pending edit set of an ordinary (real-side) buffer.
    fn propagate_real_side(&mut self, buffer: BufferId, mut pending: MergeList) {
        for merged in pending.drain() {
            let tag = merged.tag;
            let Some(descriptor) = self.resolve(&tag) else {
                continue;
            };
            if !descriptor.synchronized {
                continue;
            }
            let Some(vc_buf) = self
                .virtual_chunks
                .get(&tag.virtual_chunk)
                .map(|vc| vc.buffer)
            else {
                continue;
            };

            // Current extents: the anchors have already been moved by the
            // edit, the tag span carries any residual clip offsets.
            let current = (|| {
                let buf = self.buffers.get(&buffer)?;
                let (rb, re) = descriptor.real_region.resolve(buf)?;
                let span = buf.tags.chunk_span(&tag)?;
                let offsets = (span.begin_offset, span.end_offset);
                let vbuf = self.buffers.get(&vc_buf)?;
                let (vb, ve) = descriptor.virtual_region.resolve(vbuf)?;
                Some((rb, re, offsets, vb, ve))
            })();
            let Some((rb, re, (begin_offset, end_offset), vb, ve)) = current else {
                self.cleanup(Some(tag.virtual_chunk));
                continue;
            };

            let real_len = re - rb;
            let virtual_len = ve - vb;

            if begin_offset == 0 && end_offset == 0 {
                // Clean update: the edit stayed inside the region.
                let Ok(content) = self.buffers[&buffer].slice(rb, re) else {
                    continue;
                };
                debug!(chunk = %tag.chunk, len = real_len, "clean update");
                if self.suppressed_replace(vc_buf, vb, ve, &content).is_err() {
                    self.detach_chunk(&tag);
                    continue;
                }
                let new_ve = vb + content.chars().count();
                for sibling in self.siblings_touching(tag, vc_buf, vb, new_ve) {
                    self.push_virtual_to_real(&sibling);
                }
            } else if real_len + begin_offset + end_offset == virtual_len {
                // Relocation: payload unchanged, only clipped at an edge.
                debug!(
                    chunk = %tag.chunk,
                    begin_offset,
                    end_offset,
                    "relocating clipped chunk"
                );
                if !self.relocate(&tag, buffer, vb + begin_offset, ve - end_offset) {
                    self.detach_chunk(&tag);
                }
            } else {
                // Shape divergence: unrecoverable, degrade to plain text.
                debug!(
                    chunk = %tag.chunk,
                    real_len,
                    virtual_len,
                    begin_offset,
                    end_offset,
                    "shape diverged, detaching"
                );
                self.detach_chunk(&tag);
            }
        }
    }

    /// Push the canonical text to every mirror the edit touched.
    fn propagate_virtual_side(&mut self, virtual_chunk: VirtualChunkId, touched: &[ChunkId]) {
        for &id in touched {
            let tag = ChunkTag {
                virtual_chunk,
                chunk: id,
            };
            self.push_virtual_to_real(&tag);
        }
    }

    /// Mirrors of `virtual_chunk` other than `source` whose virtual
    /// regions overlap or touch `[vb, ve]`.
    fn siblings_touching(
        &self,
        source: ChunkTag,
        vc_buf: BufferId,
        vb: usize,
        ve: usize,
    ) -> Vec<ChunkTag> {
        let Some(vbuf) = self.buffers.get(&vc_buf) else {
            return Vec::new();
        };
        self.virtual_chunks
            .get(&source.virtual_chunk)
            .map(|vc| {
                vc.descriptors()
                    .filter(|d| d.id != source.chunk && d.synchronized)
                    .filter(|d| {
                        d.virtual_region
                            .resolve(vbuf)
                            .map(|(b, e)| b <= ve && vb <= e)
                            .unwrap_or(false)
                    })
                    .map(|d| d.tag())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy a chunk's virtual region verbatim into its real region (full
    /// replace) and re-tag it. Failure degrades the chunk to detached.
    fn push_virtual_to_real(&mut self, tag: &ChunkTag) {
        let Some(descriptor) = self.descriptor(tag).cloned() else {
            return;
        };
        if !descriptor.synchronized {
            return;
        }
        let Some(vc_buf) = self
            .virtual_chunks
            .get(&tag.virtual_chunk)
            .map(|vc| vc.buffer)
        else {
            return;
        };

        let content = match self
            .buffers
            .get(&vc_buf)
            .and_then(|vbuf| descriptor.virtual_region.text(vbuf))
        {
            Some(text) => text,
            None => {
                self.cleanup(Some(tag.virtual_chunk));
                return;
            }
        };

        let target = descriptor.real_region.buffer;
        let extents = self
            .buffers
            .get(&target)
            .and_then(|buf| descriptor.real_region.resolve(buf));
        let Some((rb, re)) = extents else {
            self.cleanup(Some(tag.virtual_chunk));
            return;
        };

        // A collapsed real region cannot take content back: forward-sticky
        // anchors would exclude anything inserted at the collapsed point.
        if rb == re && !content.is_empty() {
            debug!(chunk = %tag.chunk, "mirror region collapsed, detaching");
            self.detach_chunk(tag);
            return;
        }

        debug!(chunk = %tag.chunk, len = content.chars().count(), "pushing canonical text to mirror");
        if self.suppressed_replace(target, rb, re, &content).is_err() {
            self.detach_chunk(tag);
            return;
        }

        let new_re = rb + content.chars().count();
        if let Some(buf) = self.buffers.get_mut(&target) {
            buf.tags.retag(tag, rb, new_re);
        }
    }

    /// Repoint a clipped chunk at the offset-adjusted virtual slice, with
    /// no content copy. Returns false when the virtual side is gone.
    fn relocate(
        &mut self,
        tag: &ChunkTag,
        buffer: BufferId,
        new_vb: usize,
        new_ve: usize,
    ) -> bool {
        let Some(vc_buf) = self
            .virtual_chunks
            .get(&tag.virtual_chunk)
            .map(|vc| vc.buffer)
        else {
            return false;
        };

        let Some(old) = self
            .virtual_chunks
            .get(&tag.virtual_chunk)
            .and_then(|vc| vc.get(&tag.chunk))
            .map(|d| d.virtual_region)
        else {
            return false;
        };
        let new_region = {
            let Ok(vbuf) = self.live_buffer_mut(vc_buf) else {
                return false;
            };
            old.release(vbuf);
            match crate::region::Region::anchored(vbuf, new_vb, new_ve) {
                Ok(region) => region,
                Err(_) => return false,
            }
        };

        let Some(descriptor) = self
            .virtual_chunks
            .get_mut(&tag.virtual_chunk)
            .and_then(|vc| vc.get_mut(&tag.chunk))
        else {
            return false;
        };
        descriptor.virtual_region = new_region;

        if let Some(buf) = self.buffers.get_mut(&buffer) {
            buf.tags.clear_offsets(tag);
        }
        true
    }
}
