// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Raw slot format and section decoding.
//!
//! An exception table section is a flat array of 16-byte slots, each two
//! little-endian `u64` words:
//!
//! ```text
//! +0  insn   instruction address (or range bound)
//! +8  fixup  fixup address, RANGE_START or DELETED
//! ```
//!
//! Logical entries occupy one slot (single) or two (range):
//!
//! ```text
//! single:  [insn,        fixup      ]
//! range:   [range_start, RANGE_START] [range_end, fixup]
//! ```
//!
//! This module only decodes bytes into slots. Checking that the slots form
//! a well-shaped table is done by the table constructor.

#[cfg(test)]
mod slot_test;

use core::fmt;
use core::slice::ChunksExact;

use crate::addr::Vaddr;
use crate::fixup::{Fixup, FixupSlot, RANGE_START};

/// Size of one encoded slot in bytes.
pub const RAW_SLOT_SIZE: usize = 16;

/// Size of one encoded word in bytes.
const WORD_SIZE: usize = 8;

// =============================================================================
// RawSlot
// =============================================================================

/// One physical slot as emitted into an exception table section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct RawSlot {
    /// Instruction address, range start or range end.
    pub insn: u64,
    /// Fixup address or sentinel.
    pub fixup: u64,
}

impl RawSlot {
    /// Creates a slot from its two raw words.
    #[inline]
    #[must_use]
    pub const fn new(insn: u64, fixup: u64) -> Self {
        Self { insn, fixup }
    }

    /// Slot for a single-instruction entry.
    #[inline]
    #[must_use]
    pub const fn single(insn: Vaddr, fixup: Fixup) -> Self {
        Self::new(insn.as_u64(), fixup.as_u64())
    }

    /// First slot of a range entry.
    #[inline]
    #[must_use]
    pub const fn range_start(start: Vaddr) -> Self {
        Self::new(start.as_u64(), RANGE_START)
    }

    /// Second slot of a range entry; `end` is exclusive.
    #[inline]
    #[must_use]
    pub const fn range_end(end: Vaddr, fixup: Fixup) -> Self {
        Self::new(end.as_u64(), fixup.as_u64())
    }

    /// Returns the instruction word as an address.
    #[inline]
    #[must_use]
    pub const fn insn_addr(&self) -> Vaddr {
        Vaddr::new(self.insn)
    }

    /// Decodes the fixup word.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> FixupSlot {
        FixupSlot::decode(self.fixup)
    }

    /// Decodes a slot from its little-endian encoding.
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8; RAW_SLOT_SIZE]) -> Self {
        let (insn, fixup) = bytes.split_at(WORD_SIZE);
        Self::new(read_u64_le(insn), read_u64_le(fixup))
    }

    /// Encodes the slot as little-endian bytes.
    #[must_use]
    pub fn to_le_bytes(&self) -> [u8; RAW_SLOT_SIZE] {
        let mut out = [0u8; RAW_SLOT_SIZE];
        out[..WORD_SIZE].copy_from_slice(&self.insn.to_le_bytes());
        out[WORD_SIZE..].copy_from_slice(&self.fixup.to_le_bytes());
        out
    }
}

/// Reads a little-endian `u64` from exactly eight bytes.
fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut word = [0u8; WORD_SIZE];
    word.copy_from_slice(bytes);
    u64::from_le_bytes(word)
}

// =============================================================================
// Section decoding
// =============================================================================

/// Error while decoding a raw section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionError {
    /// Section length is not a whole number of slots.
    Misaligned {
        /// Length of the section in bytes.
        len: usize,
    },
}

impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned { len } => write!(
                f,
                "section length {len} is not a multiple of {RAW_SLOT_SIZE} bytes"
            ),
        }
    }
}

impl core::error::Error for SectionError {}

/// Iterator over the slots of a decoded section.
#[derive(Debug, Clone)]
pub struct RawSlots<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl RawSlots<'_> {
    /// Number of slots not yet yielded.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl Iterator for RawSlots<'_> {
    type Item = RawSlot;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        let mut bytes = [0u8; RAW_SLOT_SIZE];
        bytes.copy_from_slice(chunk);
        Some(RawSlot::from_le_bytes(&bytes))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for RawSlots<'_> {}

/// Decode a raw exception table section.
///
/// # Errors
///
/// Returns [`SectionError::Misaligned`] if `data` is not a whole number of
/// 16-byte slots.
pub fn parse_section(data: &[u8]) -> Result<RawSlots<'_>, SectionError> {
    if data.len() % RAW_SLOT_SIZE != 0 {
        return Err(SectionError::Misaligned { len: data.len() });
    }
    Ok(RawSlots {
        chunks: data.chunks_exact(RAW_SLOT_SIZE),
    })
}
