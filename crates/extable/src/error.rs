// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Errors raised while loading tables and registering them.
//!
//! Lookups never fail: a miss is an ordinary `None` that the trap handler
//! escalates on its own. Only construction and registry bookkeeping report
//! errors, and a table that fails construction must never be searched.

use core::fmt;

use extable_abi::SectionError;

use crate::registry::ModuleId;

/// A raw table that violates the slot layout rules.
///
/// `index` always names the offending physical slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedTable {
    /// Raw section bytes could not be split into slots.
    Section(SectionError),
    /// A range-start slot is the last slot of the table.
    DanglingRangeStart {
        /// Slot index of the range start.
        index: usize,
    },
    /// A slot carries a reserved value where a real fixup is required.
    ///
    /// Covers a `Deleted` sentinel anywhere in the input and a range-start
    /// sentinel in the second slot of a range.
    ReservedFixup {
        /// Slot index of the reserved value.
        index: usize,
    },
    /// A range whose end is not above its start.
    EmptyRange {
        /// Slot index of the range start.
        index: usize,
    },
}

impl fmt::Display for MalformedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Section(e) => write!(f, "malformed table section: {e}"),
            Self::DanglingRangeStart { index } => {
                write!(f, "range start at slot {index} has no end slot")
            }
            Self::ReservedFixup { index } => {
                write!(f, "slot {index} uses a reserved fixup value")
            }
            Self::EmptyRange { index } => {
                write!(f, "range at slot {index} does not end above its start")
            }
        }
    }
}

impl core::error::Error for MalformedTable {}

impl From<SectionError> for MalformedTable {
    fn from(e: SectionError) -> Self {
        Self::Section(e)
    }
}

/// Error from the table registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The supplied table failed validation.
    Malformed(MalformedTable),
    /// A table is already registered for this module.
    DuplicateModule(ModuleId),
    /// A code region of this module is empty.
    EmptyRegion(ModuleId),
    /// A code region of this module overlaps an already registered one.
    Overlap(ModuleId),
    /// No table is registered for this module.
    UnknownModule(ModuleId),
    /// The module's init region was already freed (or it never had one).
    InitAlreadyFreed(ModuleId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "{e}"),
            Self::DuplicateModule(id) => write!(f, "{id} already has a table"),
            Self::EmptyRegion(id) => write!(f, "{id} has an empty code region"),
            Self::Overlap(id) => write!(f, "{id} overlaps a registered code region"),
            Self::UnknownModule(id) => write!(f, "{id} has no registered table"),
            Self::InitAlreadyFreed(id) => write!(f, "{id} has no init region left to free"),
        }
    }
}

impl core::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MalformedTable> for RegistryError {
    fn from(e: MalformedTable) -> Self {
        Self::Malformed(e)
    }
}
