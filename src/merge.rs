//! Region Merge Engine - coalesces same-chunk spans
//!
//! Multiple touches to the same chunk within one notification cycle are
//! batched here into a single region per chunk, so a multi-point edit
//! triggers at most one propagation pass per affected chunk.
//!
//! The list is kept strictly ordered, sorted by begin and tie-broken by
//! end. The original design inserted by a "begin<=begin or end<=end" rule,
//! which is not a consistent total order; the strict ordering replaces it.

use crate::chunk::ChunkTag;

/// Transient span used only while batching: `[begin, end)` of one buffer,
/// tagged with the chunk it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRegion {
    pub begin: usize,
    pub end: usize,
    pub length: usize,
    pub tag: ChunkTag,
}

impl MergeRegion {
    pub fn new(begin: usize, end: usize, tag: ChunkTag) -> Self {
        debug_assert!(begin <= end);
        Self {
            begin,
            end,
            length: end - begin,
            tag,
        }
    }

    /// Overlap-or-touch test (closed on both edges).
    fn touches(&self, other: &MergeRegion) -> bool {
        self.begin <= other.end && other.begin <= self.end
    }
}

/// Union of two merge regions, only when they belong to the same chunk and
/// their spans overlap or touch. Spans of different chunks never merge.
pub fn merge(a: &MergeRegion, b: &MergeRegion) -> Option<MergeRegion> {
    if a.tag != b.tag || !a.touches(b) {
        return None;
    }
    Some(MergeRegion::new(
        a.begin.min(b.begin),
        a.end.max(b.end),
        a.tag,
    ))
}

/// Ordered list of merge regions for one buffer's pending edit set.
#[derive(Debug, Clone, Default)]
pub struct MergeList {
    regions: Vec<MergeRegion>,
}

impl MergeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `region`, merging it with every same-chunk entry that
    /// overlaps or touches. Merging grows the span, which may bring
    /// further entries into reach; the cascade runs to a fixpoint before
    /// the final span is placed back in order.
    pub fn add_or_merge(&mut self, mut region: MergeRegion) {
        let mut i = 0;
        while i < self.regions.len() {
            if let Some(merged) = merge(&self.regions[i], &region) {
                self.regions.remove(i);
                region = merged;
                i = 0;
            } else {
                i += 1;
            }
        }
        let at = self
            .regions
            .partition_point(|r| (r.begin, r.end) <= (region.begin, region.end));
        self.regions.insert(at, region);
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergeRegion> {
        self.regions.iter()
    }

    /// Consume the pending set, yielding one region per batched chunk.
    pub fn drain(&mut self) -> Vec<MergeRegion> {
        std::mem::take(&mut self.regions)
    }
}
