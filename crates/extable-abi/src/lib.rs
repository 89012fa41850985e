// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Raw exception table layout.
//!
//! This crate defines the contract between whoever emits an exception table
//! (the kernel link step, a loadable module) and whoever consumes it (the
//! fault path, the module loader):
//! - Address and fixup types
//! - The two-word slot format and its sentinel values
//! - Decoding of a raw `__ex_table` byte section
//! - The per-architecture instruction width used for range offsets
//!
//! # Design Principles
//!
//! - **No dependencies**: Pure data types, 100% host-testable
//! - **Stable layout**: Slots use `#[repr(C)]` and little-endian encoding
//! - **64-bit only**: Addresses are always `u64`
//!
//! # Modules
//!
//! - [`addr`]: Instruction address type (`Vaddr`)
//! - [`fixup`]: Fixup addresses and sentinel decoding (`Fixup`, `FixupSlot`)
//! - [`slot`]: Raw slot format and section decoding (`RawSlot`, `parse_section`)
//! - [`arch`]: Instruction width (`InsnWidth`)

#![no_std]

#[cfg(test)]
extern crate std;

pub mod addr;
pub mod arch;
pub mod fixup;
pub mod slot;

// Re-export commonly used types at crate root
pub use addr::Vaddr;
pub use arch::InsnWidth;
pub use fixup::{DELETED, Fixup, FixupSlot, RANGE_START};
pub use slot::{RAW_SLOT_SIZE, RawSlot, RawSlots, SectionError, parse_section};
