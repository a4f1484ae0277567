//! Out-of-band range tagging.
//!
//! Each buffer carries an interval-indexed side table mapping ranges to tag
//! records instead of per-character annotation storage. A record can hold a
//! chunk back-reference, free-form key/value annotations, and the residual
//! displacement left behind when an edit clips characters off one of its
//! edges.

use std::collections::HashMap;

use crate::buffer::anchor::rebase_position;
use crate::chunk::ChunkTag;

/// One tagged interval of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSpan {
    pub begin: usize,
    pub end: usize,

    /// Back-reference to the chunk mirrored at this range, if any.
    pub chunk: Option<ChunkTag>,

    /// Characters clipped off the front edge since the last resync.
    pub begin_offset: usize,

    /// Characters clipped off the back edge since the last resync.
    pub end_offset: usize,

    /// Free-form key/value annotations attached to the range.
    pub annotations: HashMap<String, String>,
}

impl TagSpan {
    fn new(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end,
            chunk: None,
            begin_offset: 0,
            end_offset: 0,
            annotations: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Closed-interval overlap test, so spans touching the probe range at
    /// either edge count as affected.
    fn touches(&self, begin: usize, end: usize) -> bool {
        self.begin <= end && begin <= self.end
    }
}

/// Interval side table for one buffer, ordered by span begin.
#[derive(Debug, Clone, Default)]
pub struct TagTable {
    spans: Vec<TagSpan>,
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag `[begin, end)` with a chunk back-reference.
    ///
    /// Any chunk tag strictly overlapping the range is evicted wholesale;
    /// the descriptor it pointed at is left for verification to reclaim.
    /// Adjacent chunk spans and annotation-only spans are not disturbed.
    pub fn attach_chunk(&mut self, begin: usize, end: usize, tag: ChunkTag) {
        for span in &mut self.spans {
            if span.chunk.is_some() && span.begin < end && begin < span.end {
                span.chunk = None;
            }
        }
        self.spans.retain(|s| s.chunk.is_some() || !s.annotations.is_empty());

        let mut span = TagSpan::new(begin, end);
        span.chunk = Some(tag);
        let at = self
            .spans
            .partition_point(|s| (s.begin, s.end) <= (begin, end));
        self.spans.insert(at, span);
    }

    /// The span carrying `tag`, if present.
    pub fn chunk_span(&self, tag: &ChunkTag) -> Option<&TagSpan> {
        self.spans.iter().find(|s| s.chunk.as_ref() == Some(tag))
    }

    /// The chunk tag whose span contains `pos` (or sits empty at it).
    pub fn chunk_at(&self, pos: usize) -> Option<&ChunkTag> {
        self.spans
            .iter()
            .find(|s| s.chunk.is_some() && s.begin <= pos && (pos < s.end || s.is_empty() && pos == s.begin))
            .and_then(|s| s.chunk.as_ref())
    }

    /// Chunk tags whose spans overlap or touch `[begin, end]`.
    pub fn chunks_touching(&self, begin: usize, end: usize) -> Vec<(ChunkTag, usize, usize)> {
        self.spans
            .iter()
            .filter(|s| s.touches(begin, end))
            .filter_map(|s| s.chunk.map(|tag| (tag, s.begin, s.end)))
            .collect()
    }

    /// Reset a chunk span to fresh extents after a full resync.
    pub fn retag(&mut self, tag: &ChunkTag, begin: usize, end: usize) {
        if let Some(span) = self.spans.iter_mut().find(|s| s.chunk.as_ref() == Some(tag)) {
            span.begin = begin;
            span.end = end;
            span.begin_offset = 0;
            span.end_offset = 0;
        }
        self.spans.sort_by_key(|s| (s.begin, s.end));
    }

    /// Clear the residual offsets on a chunk span without moving it.
    pub fn clear_offsets(&mut self, tag: &ChunkTag) {
        if let Some(span) = self.spans.iter_mut().find(|s| s.chunk.as_ref() == Some(tag)) {
            span.begin_offset = 0;
            span.end_offset = 0;
        }
    }

    /// Strip a chunk back-reference, turning the range back into ordinary
    /// text. Annotations over the range survive iff `keep_annotations`.
    pub fn detach_chunk(&mut self, tag: &ChunkTag, keep_annotations: bool) -> bool {
        let Some(at) = self
            .spans
            .iter()
            .position(|s| s.chunk.as_ref() == Some(tag))
        else {
            return false;
        };
        let (begin, end) = (self.spans[at].begin, self.spans[at].end);
        self.spans[at].chunk = None;
        if !keep_annotations {
            for span in &mut self.spans {
                if span.touches(begin, end) {
                    span.annotations.clear();
                }
            }
        }
        self.spans.retain(|s| s.chunk.is_some() || !s.annotations.is_empty());
        true
    }

    /// Attach a key/value annotation to `[begin, end)`.
    pub fn annotate(&mut self, begin: usize, end: usize, key: &str, value: &str) {
        if let Some(span) = self
            .spans
            .iter_mut()
            .find(|s| s.begin == begin && s.end == end)
        {
            span.annotations.insert(key.to_string(), value.to_string());
            return;
        }
        let mut span = TagSpan::new(begin, end);
        span.annotations.insert(key.to_string(), value.to_string());
        let at = self
            .spans
            .partition_point(|s| (s.begin, s.end) <= (begin, end));
        self.spans.insert(at, span);
    }

    /// All annotations on spans containing `pos`.
    pub fn annotations_at(&self, pos: usize) -> Vec<(&str, &str)> {
        self.spans
            .iter()
            .filter(|s| (s.begin..s.end).contains(&pos))
            .flat_map(|s| s.annotations.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    /// Remove annotations overlapping `[begin, end]`; a key of `None`
    /// removes every key.
    pub fn remove_annotations(&mut self, begin: usize, end: usize, key: Option<&str>) {
        for span in &mut self.spans {
            if span.touches(begin, end) {
                match key {
                    Some(k) => {
                        span.annotations.remove(k);
                    }
                    None => span.annotations.clear(),
                }
            }
        }
        self.spans.retain(|s| s.chunk.is_some() || !s.annotations.is_empty());
    }

    /// Rebase all spans for an atomic replace of `[begin, begin + old_len)`
    /// by `new_len` characters, accumulating residual clip offsets on chunk
    /// spans whose edges the removal crossed.
    pub fn rebase(&mut self, begin: usize, old_len: usize, new_len: usize) {
        let rem_end = begin + old_len;
        for span in &mut self.spans {
            if old_len > 0 && span.chunk.is_some() && !span.is_empty() {
                // A removal crossing an edge clips characters off the span;
                // a removal exactly covering the span is an interior edit.
                if begin < span.begin && rem_end > span.end {
                    span.begin_offset += span.len();
                } else if begin < span.begin && rem_end > span.begin {
                    span.begin_offset += rem_end.min(span.end) - span.begin;
                } else if begin < span.end && rem_end > span.end {
                    span.end_offset += span.end - begin;
                }
            }
            span.begin = rebase_position(span.begin, true, begin, old_len, new_len);
            span.end = rebase_position(span.end, true, begin, old_len, new_len);
        }
        self.spans.sort_by_key(|s| (s.begin, s.end));
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.spans.iter().filter(|s| s.chunk.is_some()).count()
    }
}
