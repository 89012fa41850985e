// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Assembling tables from logical entries.
//!
//! Kernel and module images get their tables from the link step. Everything
//! else (boot-time tables, tests, tooling) describes entries logically and
//! lets the builder lay out the slots. The result goes through the same
//! validation as a table read from a section.

use alloc::vec::Vec;

use extable_abi::{Fixup, InsnWidth, RawSlot, Vaddr};

use crate::error::MalformedTable;
use crate::table::ExTable;

/// One logical entry before layout.
#[derive(Clone, Copy, Debug)]
enum Unit {
    Single { insn: Vaddr, fixup: Fixup },
    Range { start: Vaddr, end: Vaddr, fixup: Fixup },
}

impl Unit {
    /// Address the table is ordered by.
    const fn primary(&self) -> Vaddr {
        match *self {
            Self::Single { insn, .. } => insn,
            Self::Range { start, .. } => start,
        }
    }
}

/// Builder for [`ExTable`].
///
/// ```
/// use extable::{ExTableBuilder, Fixup, InsnWidth, Vaddr};
///
/// let fixup = Fixup::new(0x4000).expect("not a sentinel");
/// let table = ExTableBuilder::new()
///     .insn_width(InsnWidth::new(4).expect("non-zero"))
///     .range(Vaddr::new(0x3000), Vaddr::new(0x3010), fixup)
///     .build()
///     .expect("well-formed");
///
/// let hit = table.resolve_with_offset(Vaddr::new(0x3008)).expect("covered");
/// assert_eq!(hit.word_offset, Some(2));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ExTableBuilder {
    units: Vec<Unit>,
    insn_width: InsnWidth,
    sorted: bool,
}

impl ExTableBuilder {
    /// Creates an empty builder using the native instruction width.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instruction width for range offsets.
    #[must_use]
    pub fn insn_width(mut self, insn_width: InsnWidth) -> Self {
        self.insn_width = insn_width;
        self
    }

    /// Lay entries out by ascending primary address.
    ///
    /// The two slots of a range always stay adjacent. Searches are linear
    /// either way; ordering only makes dumps and diffs readable.
    #[must_use]
    pub fn sorted(mut self) -> Self {
        self.sorted = true;
        self
    }

    /// Adds a single-instruction entry.
    #[must_use]
    pub fn single(mut self, insn: Vaddr, fixup: Fixup) -> Self {
        self.units.push(Unit::Single { insn, fixup });
        self
    }

    /// Adds a range entry covering `[start, end)`.
    #[must_use]
    pub fn range(mut self, start: Vaddr, end: Vaddr, fixup: Fixup) -> Self {
        self.units.push(Unit::Range { start, end, fixup });
        self
    }

    /// Number of logical entries added so far.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.units.len()
    }

    /// Lay the entries out as raw slots.
    #[must_use]
    pub fn raw_slots(&self) -> Vec<RawSlot> {
        let mut units = self.units.clone();
        if self.sorted {
            units.sort_by_key(Unit::primary);
        }

        let mut raw = Vec::with_capacity(units.len() * 2);
        for unit in units {
            match unit {
                Unit::Single { insn, fixup } => raw.push(RawSlot::single(insn, fixup)),
                Unit::Range { start, end, fixup } => {
                    raw.push(RawSlot::range_start(start));
                    raw.push(RawSlot::range_end(end, fixup));
                }
            }
        }
        raw
    }

    /// Validate and build the table.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedTable::EmptyRange`] if a range does not end above
    /// its start. Other layout errors cannot be expressed through the
    /// builder.
    pub fn build(&self) -> Result<ExTable, MalformedTable> {
        ExTable::from_raw(&self.raw_slots(), self.insn_width)
    }
}
