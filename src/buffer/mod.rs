//! Buffer substrate - named, liveness-tracked text containers
//!
//! Buffers hold rope-backed text addressable by char-offset range, carry
//! their own anchor and tag tables, and expose a single atomic range
//! replace as the edit primitive. Every edit rebases anchors and tag spans
//! in the same pass, so positions are never recomputed by hand.
//!
//! A buffer also carries its notification-suppression depth: while a
//! propagated write is in flight the owning buffer's own edit
//! notifications are muted, which is what keeps propagation a one-shot
//! directed push instead of an echoing two-way binding.

pub mod anchor;
pub mod tags;

use std::fmt;

use ropey::Rope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MirrorError, Result};

pub use anchor::{AnchorHandle, AnchorTable};
pub use tags::{TagSpan, TagTable};

/// Unique buffer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferId(pub Uuid);

impl BufferId {
    pub(crate) fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape of an `after-edit` notification: the replaced range landed at
/// `[begin, new_end)` and displaced `old_length` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditRecord {
    pub begin: usize,
    pub new_end: usize,
    pub old_length: usize,
}

/// A mutable text container with auto-adjusting anchors and range tags.
#[derive(Debug, Clone)]
pub struct Buffer {
    id: BufferId,
    name: String,
    text: Rope,
    live: bool,
    suppress: u32,
    pub(crate) anchors: AnchorTable,
    pub(crate) tags: TagTable,
}

impl Buffer {
    pub fn new(name: impl Into<String>, text: &str) -> Self {
        Self {
            id: BufferId::fresh(),
            name: name.into(),
            text: Rope::from_str(text),
            live: true,
            suppress: 0,
            anchors: AnchorTable::new(),
            tags: TagTable::new(),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Mark the buffer dead. Dead buffers reject edits; their anchors and
    /// tags stop resolving.
    pub fn kill(&mut self) {
        self.live = false;
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contents(&self) -> String {
        self.text.to_string()
    }

    /// The text at `[begin, end)`.
    pub fn slice(&self, begin: usize, end: usize) -> Result<String> {
        self.check_range(begin, end)?;
        Ok(self.text.slice(begin..end).to_string())
    }

    /// Place an auto-adjusting anchor at `position`.
    ///
    /// A forward-sticky anchor absorbs text inserted exactly at its
    /// position (it moves forward with it); a non-sticky one stays put.
    pub fn anchor_at(&mut self, position: usize, sticky_forward: bool) -> Result<AnchorHandle> {
        self.check_range(position, position)?;
        Ok(self.anchors.insert(position, sticky_forward))
    }

    /// Resolve an anchor to its current position.
    pub fn anchor_position(&self, handle: AnchorHandle) -> Option<usize> {
        if !self.live {
            return None;
        }
        self.anchors.position(handle)
    }

    pub fn release_anchor(&mut self, handle: AnchorHandle) {
        self.anchors.release(handle);
    }

    /// Attach a free-form annotation to a range.
    pub fn annotate(&mut self, begin: usize, end: usize, key: &str, value: &str) -> Result<()> {
        self.check_range(begin, end)?;
        self.tags.annotate(begin, end, key, value);
        Ok(())
    }

    /// All annotations covering `position`.
    pub fn annotations_at(&self, position: usize) -> Vec<(&str, &str)> {
        self.tags.annotations_at(position)
    }

    /// Remove annotations overlapping `[begin, end]`.
    pub fn remove_annotations(&mut self, begin: usize, end: usize, key: Option<&str>) {
        self.tags.remove_annotations(begin, end, key);
    }

    /// True while a propagated write into this buffer is in flight.
    pub fn notifications_suppressed(&self) -> bool {
        self.suppress > 0
    }

    /// Atomically replace `[begin, end)` with `replacement`.
    ///
    /// One splice, not delete-plus-insert: anchors at the begin edge of a
    /// non-empty replaced range hold their ground, so overwriting a whole
    /// region leaves that region covering the new content. Anchors and tag
    /// spans are rebased before this returns.
    pub fn apply_edit(&mut self, begin: usize, end: usize, replacement: &str) -> Result<EditRecord> {
        if !self.live {
            return Err(MirrorError::DeadBuffer(self.id));
        }
        self.check_range(begin, end)?;

        let old_length = end - begin;
        if old_length > 0 {
            self.text.remove(begin..end);
        }
        if !replacement.is_empty() {
            self.text.insert(begin, replacement);
        }

        let new_len = replacement.chars().count();
        self.anchors.rebase(begin, old_length, new_len);
        self.tags.rebase(begin, old_length, new_len);

        tracing::trace!(
            buffer = %self.id,
            begin,
            old_length,
            new_length = new_len,
            "applied edit"
        );

        Ok(EditRecord {
            begin,
            new_end: begin + new_len,
            old_length,
        })
    }

    fn check_range(&self, begin: usize, end: usize) -> Result<()> {
        let len = self.len();
        if begin > end || end > len {
            return Err(MirrorError::InvalidRange { begin, end, len });
        }
        Ok(())
    }

    pub(crate) fn suppress_enter(&mut self) {
        self.suppress += 1;
    }

    pub(crate) fn suppress_exit(&mut self) {
        debug_assert!(self.suppress > 0);
        self.suppress = self.suppress.saturating_sub(1);
    }
}

/// Scoped reentrancy guard for propagated writes.
///
/// Acquired before a propagated write and released on every exit path via
/// `Drop`, so a failing write can never leave a buffer permanently muted.
pub(crate) struct SuppressScope<'a> {
    buf: &'a mut Buffer,
}

impl<'a> SuppressScope<'a> {
    pub(crate) fn enter(buf: &'a mut Buffer) -> Self {
        buf.suppress_enter();
        Self { buf }
    }

    pub(crate) fn buffer(&mut self) -> &mut Buffer {
        self.buf
    }
}

impl Drop for SuppressScope<'_> {
    fn drop(&mut self) {
        self.buf.suppress_exit();
    }
}
