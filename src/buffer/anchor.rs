//! Auto-adjusting position anchors.
//!
//! An anchor marks a gap between two characters and is rebased whenever the
//! owning buffer is edited, so the engine never recomputes offsets by hand.
//! The stickiness flag decides what happens to an anchor sitting exactly at
//! an insertion point: a forward-sticky anchor advances past the inserted
//! text, a non-sticky one stays put in front of it.

use serde::{Deserialize, Serialize};

/// Handle to an anchor in a buffer's anchor table.
///
/// Handles index into a slot table and stay valid for the lifetime of the
/// anchor; released slots are recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorHandle(pub(crate) usize);

#[derive(Debug, Clone)]
struct AnchorSlot {
    pos: usize,
    sticky_forward: bool,
    live: bool,
}

/// Per-buffer anchor table.
///
/// Rebase runs once per edit over all live slots. Buffers hold a handful of
/// anchors (two per mirrored region), so a flat scan is the right shape.
#[derive(Debug, Clone, Default)]
pub struct AnchorTable {
    slots: Vec<AnchorSlot>,
    free: Vec<usize>,
}

impl AnchorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an anchor at `pos`.
    pub fn insert(&mut self, pos: usize, sticky_forward: bool) -> AnchorHandle {
        let slot = AnchorSlot {
            pos,
            sticky_forward,
            live: true,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                AnchorHandle(idx)
            }
            None => {
                self.slots.push(slot);
                AnchorHandle(self.slots.len() - 1)
            }
        }
    }

    /// Current position of an anchor, if it is still live.
    pub fn position(&self, handle: AnchorHandle) -> Option<usize> {
        self.slots
            .get(handle.0)
            .filter(|s| s.live)
            .map(|s| s.pos)
    }

    /// Release an anchor; its slot is recycled.
    pub fn release(&mut self, handle: AnchorHandle) {
        if let Some(slot) = self.slots.get_mut(handle.0) {
            if slot.live {
                slot.live = false;
                self.free.push(handle.0);
            }
        }
    }

    /// Rebase all anchors for an atomic replace of
    /// `[begin, begin + old_len)` by `new_len` characters.
    ///
    /// A replace is not modeled as delete-then-insert: an anchor at the
    /// begin edge of a non-empty replaced range keeps its position, so a
    /// full-region overwrite leaves the region covering the new content.
    pub fn rebase(&mut self, begin: usize, old_len: usize, new_len: usize) {
        for slot in self.slots.iter_mut().filter(|s| s.live) {
            slot.pos = rebase_position(slot.pos, slot.sticky_forward, begin, old_len, new_len);
        }
    }

}

/// Rebase a single position under an atomic replace.
///
/// Rules:
/// - before the edit: unchanged;
/// - at or past the removed end: shifted by the length delta;
/// - strictly inside the removed span: clamped into the replacement;
/// - exactly at a pure insertion point: advances iff forward-sticky.
pub(crate) fn rebase_position(
    pos: usize,
    sticky_forward: bool,
    begin: usize,
    old_len: usize,
    new_len: usize,
) -> usize {
    if old_len == 0 {
        // Pure insertion at `begin`.
        if pos > begin || (pos == begin && sticky_forward) {
            pos + new_len
        } else {
            pos
        }
    } else if pos >= begin + old_len {
        pos - old_len + new_len
    } else if pos > begin {
        // Inside the removed span: clamp into the replacement.
        begin + (pos - begin).min(new_len)
    } else {
        pos
    }
}
