// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The fault recovery table.
//!
//! A table is a fixed-length array of slots holding three kinds of logical
//! entries:
//!
//! | Kind           | Slots | Slot 0                 | Slot 1              |
//! |----------------|-------|------------------------|---------------------|
//! | Single         | 1     | `(insn, fixup)`        |                     |
//! | Range          | 2     | `(start, RANGE_START)` | `(end, fixup)`      |
//! | Deleted single | 1     | `(_, DELETED)`         |                     |
//! | Deleted range  | 2     | `(_, DELETED)`         | `(_, DELETED)`      |
//!
//! Every scan walks the slots left to right and advances by the width of
//! the logical entry under the cursor, so the second slot of a range is
//! never read as an entry of its own. Entries need not be sorted.
//!
//! # Concurrency
//!
//! Searches take `&self`, never block and never allocate, so the fault
//! path may run them on any number of CPUs at once. [`ExTable::trim`] also
//! takes `&self` and only ever turns fixup words into `DELETED`. The slot
//! array is never reallocated.


use alloc::boxed::Box;
use alloc::vec::Vec;

use extable_abi::{FixupSlot, InsnWidth, RawSlot, Vaddr, parse_section};

use crate::entry::{Entry, ExactMatch, RangeMatch, Resolution, Slot};
use crate::error::MalformedTable;

/// A validated exception table.
#[derive(Debug)]
pub struct ExTable {
    slots: Box<[Slot]>,
    insn_width: InsnWidth,
}

impl ExTable {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Load a table from raw slots.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedTable`] if a range start is the last slot, a slot
    /// holds a reserved value where a fixup is expected, or a range does
    /// not end above its start.
    pub fn from_raw(raw: &[RawSlot], insn_width: InsnWidth) -> Result<Self, MalformedTable> {
        validate(raw)?;
        let slots = raw.iter().copied().map(Slot::from_raw).collect();
        Ok(Self { slots, insn_width })
    }

    /// Load a table from a little-endian section image.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedTable::Section`] if the byte length is not a whole
    /// number of slots, otherwise the same errors as [`Self::from_raw`].
    pub fn from_section(data: &[u8], insn_width: InsnWidth) -> Result<Self, MalformedTable> {
        let raw: Vec<RawSlot> = parse_section(data)?.collect();
        Self::from_raw(&raw, insn_width)
    }

    /// An empty table.
    #[must_use]
    pub fn empty(insn_width: InsnWidth) -> Self {
        Self {
            slots: Box::new([]),
            insn_width,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of physical slots. Fixed for the table's lifetime.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the table has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Instruction width used for range offsets.
    #[must_use]
    pub const fn insn_width(&self) -> InsnWidth {
        self.insn_width
    }

    /// Iterate over the decoded slots.
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            slots: &self.slots,
            index: 0,
            in_range: false,
        }
    }

    /// Number of logical entries not yet deleted.
    #[must_use]
    pub fn live_entries(&self) -> usize {
        self.iter()
            .filter(|e| matches!(e, Entry::Single { .. } | Entry::RangeStart { .. }))
            .count()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find a live single entry for exactly `addr`.
    ///
    /// Range entries are stepped over without comparing: a range start
    /// address is not an exact target.
    #[must_use]
    pub fn search_exact(&self, addr: Vaddr) -> Option<ExactMatch> {
        let mut index = 0;
        while let Some(slot) = self.slots.get(index) {
            match slot.state() {
                FixupSlot::RangeStart => index += 2,
                FixupSlot::Deleted => index += 1,
                FixupSlot::Fixup(fixup) => {
                    if slot.insn() == addr {
                        return Some(ExactMatch {
                            index,
                            insn: addr,
                            fixup,
                        });
                    }
                    index += 1;
                }
            }
        }
        None
    }

    /// Find a live range entry whose `[start, end)` contains `addr`.
    ///
    /// Single and deleted slots never start a range. A deleted range start
    /// holds `DELETED`, not `RANGE_START`, so it is skipped one slot at a
    /// time like any other deleted slot.
    #[must_use]
    pub fn search_range(&self, addr: Vaddr) -> Option<RangeMatch> {
        let mut index = 0;
        while let Some(slot) = self.slots.get(index) {
            if !slot.state().is_range_start() {
                index += 1;
                continue;
            }
            if let Some(end) = self.slots.get(index + 1) {
                // A cleared end slot means the pair is being trimmed.
                if let FixupSlot::Fixup(fixup) = end.state() {
                    let hit = RangeMatch {
                        index,
                        start: slot.insn(),
                        end: end.insn(),
                        fixup,
                    };
                    if hit.contains(addr) {
                        return Some(hit);
                    }
                }
            }
            index += 2;
        }
        None
    }

    /// Resolve a faulting address to its fixup.
    ///
    /// Single entries win over ranges. For a range, the result also carries
    /// the number of whole instructions between the range start and `addr`.
    /// `None` means no recovery exists and the fault is fatal.
    #[must_use]
    pub fn resolve_with_offset(&self, addr: Vaddr) -> Option<Resolution> {
        if let Some(hit) = self.search_exact(addr) {
            return Some(Resolution::exact(hit.fixup));
        }
        let hit = self.search_range(addr)?;
        let offset = self.insn_width.words(addr.diff(hit.start));
        Some(Resolution::in_range(hit.fixup, offset))
    }

    // =========================================================================
    // Trim
    // =========================================================================

    /// Delete every live entry whose primary address satisfies `in_freed`.
    ///
    /// The primary address is the instruction address of a single entry and
    /// the start address of a range. Both slots of a matching range are
    /// cleared. Deleted entries stay deleted; their addresses are not passed
    /// to `in_freed`. Returns the number of logical entries deleted.
    ///
    /// # Contract
    ///
    /// The caller must guarantee that no CPU can still be executing in the
    /// region being freed before calling this. The table takes no lock, so
    /// it cannot enforce that itself. Clearing a range's end slot before
    /// its start slot keeps a racing search from reading the end slot as a
    /// single entry, but a search that started before the trim may still
    /// return a fixup that is about to be freed.
    pub fn trim<F>(&self, mut in_freed: F) -> usize
    where
        F: FnMut(Vaddr) -> bool,
    {
        let mut trimmed = 0;
        let mut index = 0;
        while let Some(slot) = self.slots.get(index) {
            let state = slot.state();
            let width = if state.is_range_start() { 2 } else { 1 };

            if !state.is_deleted() && in_freed(slot.insn()) {
                if width == 2 {
                    if let Some(end) = self.slots.get(index + 1) {
                        end.delete();
                    }
                }
                slot.delete();
                trimmed += 1;
            }
            index += width;
        }

        tracing::trace!(trimmed, slots = self.slots.len(), "exception table trimmed");
        trimmed
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Check slot layout rules on a raw table.
fn validate(raw: &[RawSlot]) -> Result<(), MalformedTable> {
    let mut index = 0;
    while let Some(slot) = raw.get(index) {
        match slot.kind() {
            FixupSlot::Fixup(_) => index += 1,
            FixupSlot::Deleted => return Err(MalformedTable::ReservedFixup { index }),
            FixupSlot::RangeStart => {
                let Some(end) = raw.get(index + 1) else {
                    return Err(MalformedTable::DanglingRangeStart { index });
                };
                if !matches!(end.kind(), FixupSlot::Fixup(_)) {
                    return Err(MalformedTable::ReservedFixup { index: index + 1 });
                }
                if end.insn <= slot.insn {
                    return Err(MalformedTable::EmptyRange { index });
                }
                index += 2;
            }
        }
    }
    Ok(())
}

// =============================================================================
// Iteration
// =============================================================================

/// Iterator over the decoded slots of a table.
///
/// Yields one [`Entry`] per physical slot, in order.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    slots: &'a [Slot],
    index: usize,
    in_range: bool,
}

impl Iterator for Entries<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.slots.get(self.index)?;
        self.index += 1;

        let entry = match (slot.state(), self.in_range) {
            (FixupSlot::Deleted, _) => Entry::Deleted,
            (FixupSlot::Fixup(fixup), true) => Entry::RangeEnd {
                end: slot.insn(),
                fixup,
            },
            (FixupSlot::Fixup(fixup), false) => Entry::Single {
                insn: slot.insn(),
                fixup,
            },
            (FixupSlot::RangeStart, _) => Entry::RangeStart { start: slot.insn() },
        };
        self.in_range = matches!(entry, Entry::RangeStart { .. });
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.slots.len().saturating_sub(self.index);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Entries<'_> {}

impl<'a> IntoIterator for &'a ExTable {
    type Item = Entry;
    type IntoIter = Entries<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
