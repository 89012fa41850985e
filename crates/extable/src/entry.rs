// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Slots, their decoded view, and lookup results.

use core::sync::atomic::{AtomicU64, Ordering};

use extable_abi::{DELETED, Fixup, FixupSlot, RawSlot, Vaddr};

// =============================================================================
// Slot
// =============================================================================

/// One physical slot of a loaded table.
///
/// The instruction word never changes after load. The fixup word is atomic
/// because a trim may clear it while the table is shared with the fault
/// path; clearing is the only write it ever sees.
#[derive(Debug)]
pub(crate) struct Slot {
    insn: Vaddr,
    fixup: AtomicU64,
}

impl Slot {
    pub(crate) const fn from_raw(raw: RawSlot) -> Self {
        Self {
            insn: raw.insn_addr(),
            fixup: AtomicU64::new(raw.fixup),
        }
    }

    #[inline]
    pub(crate) const fn insn(&self) -> Vaddr {
        self.insn
    }

    /// Current fixup word.
    ///
    /// Acquire pairs with the release in [`Self::delete`]: a reader that
    /// sees a range's start slot deleted also sees its end slot deleted.
    #[inline]
    pub(crate) fn state(&self) -> FixupSlot {
        FixupSlot::decode(self.fixup.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn delete(&self) {
        self.fixup.store(DELETED, Ordering::Release);
    }
}

// =============================================================================
// Entry
// =============================================================================

/// Decoded view of one slot, tagged by its role in the table.
///
/// The raw encoding only distinguishes kinds through sentinel values and
/// position; this view spells the role out. Deleted slots carry no address
/// because their address must not be compared again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    /// A single faulting instruction.
    Single {
        /// Instruction address.
        insn: Vaddr,
        /// Where to resume.
        fixup: Fixup,
    },
    /// First slot of a range.
    RangeStart {
        /// First covered address.
        start: Vaddr,
    },
    /// Second slot of a range.
    RangeEnd {
        /// First address past the range.
        end: Vaddr,
        /// Where to resume.
        fixup: Fixup,
    },
    /// A slot invalidated by trim.
    Deleted,
}

impl Entry {
    /// Returns true for a slot cleared by trim.
    #[inline]
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

// =============================================================================
// Lookup results
// =============================================================================

/// A live single entry whose address equals the searched address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExactMatch {
    /// Slot index of the entry.
    pub index: usize,
    /// Instruction address (equal to the searched address).
    pub insn: Vaddr,
    /// Fixup of the entry.
    pub fixup: Fixup,
}

/// A live range entry containing the searched address.
///
/// `index` is the range-start slot; the fixup was read from the slot right
/// after it. Both bounds are copied out so callers can compute offsets
/// without touching the table again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeMatch {
    /// Slot index of the range start.
    pub index: usize,
    /// First covered address.
    pub start: Vaddr,
    /// First address past the range.
    pub end: Vaddr,
    /// Fixup of the range.
    pub fixup: Fixup,
}

impl RangeMatch {
    /// Returns true if `addr` lies in `[start, end)`.
    #[inline]
    #[must_use]
    pub fn contains(&self, addr: Vaddr) -> bool {
        self.start <= addr && addr < self.end
    }
}

/// Answer to the fault path: where to resume and, for ranges, how far in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Where to resume.
    pub fixup: Fixup,
    /// Instructions between the range start and the fault.
    ///
    /// `None` when a single entry matched.
    pub word_offset: Option<u64>,
}

impl Resolution {
    /// Resolution through a single entry.
    #[inline]
    #[must_use]
    pub const fn exact(fixup: Fixup) -> Self {
        Self {
            fixup,
            word_offset: None,
        }
    }

    /// Resolution through a range entry.
    #[inline]
    #[must_use]
    pub const fn in_range(fixup: Fixup, word_offset: u64) -> Self {
        Self {
            fixup,
            word_offset: Some(word_offset),
        }
    }
}
