//! Anchored buffer regions.
//!
//! A region is an ordered pair of anchors in one buffer, half-open
//! `[begin, end)`. Because both endpoints are anchors, a region's extents
//! are always read back from the buffer rather than stored.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::buffer::{AnchorHandle, Buffer, BufferId};
use crate::error::Result;

/// An anchored `[begin, end)` span of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub buffer: BufferId,
    pub begin: AnchorHandle,
    pub end: AnchorHandle,
}

impl Region {
    /// Anchor a new region over `[begin, end)` of `buf`.
    ///
    /// Both endpoints are forward-sticky: text typed at the end grows the
    /// region, text typed at the begin slides the region right without
    /// absorbing it.
    pub fn anchored(buf: &mut Buffer, begin: usize, end: usize) -> Result<Self> {
        let begin = buf.anchor_at(begin, true)?;
        let end = buf.anchor_at(end, true)?;
        Ok(Self {
            buffer: buf.id(),
            begin,
            end,
        })
    }

    /// Resolve to current `(begin, end)` offsets. `None` if the buffer is
    /// dead, is not this region's buffer, or an anchor was released.
    pub fn resolve(&self, buf: &Buffer) -> Option<(usize, usize)> {
        if buf.id() != self.buffer || !buf.is_live() {
            return None;
        }
        let b = buf.anchor_position(self.begin)?;
        let e = buf.anchor_position(self.end)?;
        // Anchors never cross for same-stickiness endpoints; normalize
        // anyway so `begin <= end` holds unconditionally.
        Some((b.min(e), b.max(e)))
    }

    pub fn length(&self, buf: &Buffer) -> Option<usize> {
        self.resolve(buf).map(|(b, e)| e - b)
    }

    /// The current text of the region.
    pub fn text(&self, buf: &Buffer) -> Option<String> {
        let (b, e) = self.resolve(buf)?;
        buf.slice(b, e).ok()
    }

    pub fn is_live(&self, buf: &Buffer) -> bool {
        self.resolve(buf).is_some()
    }

    /// Release both anchors.
    pub fn release(&self, buf: &mut Buffer) {
        buf.release_anchor(self.begin);
        buf.release_anchor(self.end);
    }
}

/// Order two resolved extents: by begin, tie-broken by end.
pub fn cmp_extents(a: (usize, usize), b: (usize, usize)) -> Ordering {
    a.0.cmp(&b.0).then(a.1.cmp(&b.1))
}

/// Region equality: both regions live and resolving to the same extents of
/// the same buffer.
pub fn regions_equal(a: &Region, a_buf: &Buffer, b: &Region, b_buf: &Buffer) -> bool {
    if a.buffer != b.buffer {
        return false;
    }
    match (a.resolve(a_buf), b.resolve(b_buf)) {
        (Some(ea), Some(eb)) => ea == eb,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tracks_edits() {
        let mut buf = Buffer::new("scratch", "0123456789");
        let region = Region::anchored(&mut buf, 3, 7).unwrap();
        assert_eq!(region.resolve(&buf), Some((3, 7)));
        assert_eq!(region.text(&buf).unwrap(), "3456");

        buf.apply_edit(0, 2, "").unwrap();
        assert_eq!(region.resolve(&buf), Some((1, 5)));
        assert_eq!(region.text(&buf).unwrap(), "3456");
    }

    #[test]
    fn test_dead_buffer_kills_region() {
        let mut buf = Buffer::new("scratch", "abcdef");
        let region = Region::anchored(&mut buf, 1, 4).unwrap();
        buf.kill();
        assert_eq!(region.resolve(&buf), None);
        assert!(!region.is_live(&buf));
    }

    #[test]
    fn test_equality_needs_live_buffers() {
        let mut buf = Buffer::new("scratch", "abcdef");
        let a = Region::anchored(&mut buf, 1, 4).unwrap();
        let b = Region::anchored(&mut buf, 1, 4).unwrap();
        assert!(regions_equal(&a, &buf, &b, &buf));
        buf.kill();
        assert!(!regions_equal(&a, &buf, &b, &buf));
    }

    #[test]
    fn test_extent_ordering() {
        assert_eq!(cmp_extents((1, 5), (2, 3)), Ordering::Less);
        assert_eq!(cmp_extents((2, 3), (2, 5)), Ordering::Less);
        assert_eq!(cmp_extents((4, 4), (4, 4)), Ordering::Equal);
    }
}
