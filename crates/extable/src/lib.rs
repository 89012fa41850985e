// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # Fault recovery tables
//!
//! Privileged code sometimes runs instructions that may legitimately fault,
//! such as a load from a caller-supplied address. Each such instruction (or
//! contiguous run of instructions) is recorded in an exception table
//! together with a fixup address. When the trap handler sees a fault at a
//! recorded address it jumps to the fixup instead of dying.
//!
//! This crate:
//! - Validates and owns tables ([`ExTable`])
//! - Answers the fault path's lookup ([`ExTable::resolve_with_offset`])
//! - Invalidates entries of freed init code ([`ExTable::trim`])
//! - Tracks the kernel and module tables ([`TableRegistry`])
//!
//! Deciding how the CPU resumes at the fixup (register fixups, error codes)
//! belongs to the architecture's trap code, not here.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod builder;
pub mod entry;
pub mod error;
pub mod registry;
pub mod table;

pub use builder::ExTableBuilder;
pub use entry::{Entry, ExactMatch, RangeMatch, Resolution};
pub use error::{MalformedTable, RegistryError};
pub use registry::{CodeRegion, ModuleId, ModuleLayout, TableOwner, TableRegistry};
pub use table::ExTable;

pub use extable_abi::{Fixup, FixupSlot, InsnWidth, RawSlot, Vaddr};
