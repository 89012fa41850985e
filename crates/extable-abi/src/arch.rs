// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Instruction width used to turn range offsets into instruction counts.
//!
//! When a fault hits inside a range entry, the fault path also reports how
//! many instructions into the range it happened. Fixed-width ISAs divide the
//! byte offset by their instruction size; x86 has no fixed size, so there
//! the "width" is one byte and the offset stays a byte count.

use core::num::NonZeroU64;

/// Size in bytes of one instruction for range offset arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct InsnWidth(NonZeroU64);

impl InsnWidth {
    /// Width for the target this crate is compiled for.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub const NATIVE: Self = Self(NonZeroU64::MIN);

    /// Width for the target this crate is compiled for.
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    pub const NATIVE: Self = Self(NonZeroU64::MIN.saturating_add(3));

    /// Creates a width of `bytes` bytes.
    ///
    /// Returns `None` for zero.
    #[inline]
    #[must_use]
    pub const fn new(bytes: u64) -> Option<Self> {
        match NonZeroU64::new(bytes) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the width in bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0.get()
    }

    /// Converts a byte offset into a whole number of instructions.
    #[inline]
    #[must_use]
    pub const fn words(self, byte_offset: u64) -> u64 {
        byte_offset / self.0.get()
    }
}

impl Default for InsnWidth {
    fn default() -> Self {
        Self::NATIVE
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn zero_width_rejected() {
        assert!(InsnWidth::new(0).is_none());
    }

    #[test]
    fn words_truncates() {
        let w = InsnWidth::new(4).unwrap();
        assert_eq!(w.words(0), 0);
        assert_eq!(w.words(8), 2);
        assert_eq!(w.words(11), 2);
    }

    #[test]
    fn native_width_per_target() {
        if cfg!(any(target_arch = "x86", target_arch = "x86_64")) {
            assert_eq!(InsnWidth::NATIVE.bytes(), 1);
        } else {
            assert_eq!(InsnWidth::NATIVE.bytes(), 4);
        }
    }
}
