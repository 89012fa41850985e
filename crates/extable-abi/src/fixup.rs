// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Fixup addresses and the sentinel values sharing their field.
//!
//! A raw slot's second word is either a real fixup address or one of two
//! reserved values:
//!
//! | Raw value  | Meaning                                              |
//! |------------|------------------------------------------------------|
//! | `0`        | Range start: this slot and the next form one entry   |
//! | `u64::MAX` | Deleted: ignored by every search (the `-1` pattern)  |
//! | otherwise  | A real fixup address                                 |
//!
//! [`Fixup`] can never hold either sentinel, so once a value has been
//! turned into a `Fixup` it cannot be confused with a range start.

use core::fmt;
use core::num::NonZeroU64;

use crate::addr::Vaddr;

// =============================================================================
// Sentinels
// =============================================================================

/// Raw fixup word marking the first slot of a range entry.
pub const RANGE_START: u64 = 0;

/// Raw fixup word marking a slot invalidated by a trim.
pub const DELETED: u64 = u64::MAX;

// =============================================================================
// Fixup
// =============================================================================

/// Address execution resumes at after a recovered fault.
///
/// Never equal to [`RANGE_START`] or [`DELETED`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fixup(NonZeroU64);

impl Fixup {
    /// Creates a fixup from a raw address.
    ///
    /// Returns `None` if `addr` is one of the reserved sentinels.
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Option<Self> {
        if addr == DELETED {
            return None;
        }
        match NonZeroU64::new(addr) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the fixup target address.
    #[inline]
    #[must_use]
    pub const fn addr(self) -> Vaddr {
        Vaddr::new(self.0.get())
    }

    /// Returns the raw address value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for Fixup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixup({:#x})", self.0.get())
    }
}

impl fmt::Display for Fixup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

// =============================================================================
// FixupSlot
// =============================================================================

/// Decoded meaning of a slot's fixup word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixupSlot {
    /// A real fixup address.
    Fixup(Fixup),
    /// First slot of a two-slot range entry.
    RangeStart,
    /// Invalidated slot.
    Deleted,
}

impl FixupSlot {
    /// Decodes a raw fixup word.
    #[inline]
    #[must_use]
    pub const fn decode(raw: u64) -> Self {
        match Fixup::new(raw) {
            Some(fixup) => Self::Fixup(fixup),
            None if raw == RANGE_START => Self::RangeStart,
            None => Self::Deleted,
        }
    }

    /// Encodes back into the raw fixup word.
    #[inline]
    #[must_use]
    pub const fn encode(self) -> u64 {
        match self {
            Self::Fixup(fixup) => fixup.as_u64(),
            Self::RangeStart => RANGE_START,
            Self::Deleted => DELETED,
        }
    }

    /// Returns true for the range-start sentinel.
    #[inline]
    #[must_use]
    pub const fn is_range_start(self) -> bool {
        matches!(self, Self::RangeStart)
    }

    /// Returns true for the deleted sentinel.
    #[inline]
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        matches!(self, Self::Deleted)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn fixup_rejects_sentinels() {
        assert!(Fixup::new(RANGE_START).is_none());
        assert!(Fixup::new(DELETED).is_none());
        assert_eq!(Fixup::new(0x2000).unwrap().as_u64(), 0x2000);
    }

    #[test]
    fn fixup_accepts_values_next_to_sentinels() {
        assert_eq!(Fixup::new(1).unwrap().as_u64(), 1);
        assert_eq!(Fixup::new(u64::MAX - 1).unwrap().as_u64(), u64::MAX - 1);
    }

    #[test]
    fn decode_sentinels() {
        assert_eq!(FixupSlot::decode(0), FixupSlot::RangeStart);
        assert_eq!(FixupSlot::decode(u64::MAX), FixupSlot::Deleted);
        assert!(FixupSlot::decode(0).is_range_start());
        assert!(FixupSlot::decode(u64::MAX).is_deleted());
    }

    #[test]
    fn decode_encode_preserves_raw_word() {
        for raw in [0, 1, 0x4000, u64::MAX - 1, u64::MAX] {
            assert_eq!(FixupSlot::decode(raw).encode(), raw);
        }
    }

    #[test]
    fn fixup_addr_matches_raw() {
        let fixup = Fixup::new(0x4000).unwrap();
        assert_eq!(fixup.addr(), Vaddr::new(0x4000));
    }
}
