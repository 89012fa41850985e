// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for raw slot decoding.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::vec::Vec;

use super::*;
use crate::fixup::DELETED;

fn fixup(addr: u64) -> Fixup {
    Fixup::new(addr).unwrap()
}

/// Encode slots the way the link step lays them out.
fn section(slots: &[RawSlot]) -> Vec<u8> {
    slots.iter().flat_map(RawSlot::to_le_bytes).collect()
}

// =============================================================================
// RawSlot
// =============================================================================

#[test]
fn constructors_use_sentinels() {
    let single = RawSlot::single(Vaddr::new(0x1000), fixup(0x2000));
    assert_eq!(single, RawSlot::new(0x1000, 0x2000));
    assert_eq!(single.kind(), FixupSlot::Fixup(fixup(0x2000)));

    let start = RawSlot::range_start(Vaddr::new(0x3000));
    assert_eq!(start.fixup, RANGE_START);
    assert!(start.kind().is_range_start());

    let end = RawSlot::range_end(Vaddr::new(0x3010), fixup(0x4000));
    assert_eq!(end.insn_addr(), Vaddr::new(0x3010));
    assert_eq!(end.kind(), FixupSlot::Fixup(fixup(0x4000)));
}

#[test]
fn le_layout() {
    let slot = RawSlot::new(0x0102_0304_0506_0708, 0x1112_1314_1516_1718);
    let bytes = slot.to_le_bytes();

    assert_eq!(bytes[0], 0x08);
    assert_eq!(bytes[7], 0x01);
    assert_eq!(bytes[8], 0x18);
    assert_eq!(bytes[15], 0x11);
    assert_eq!(RawSlot::from_le_bytes(&bytes), slot);
}

// =============================================================================
// parse_section
// =============================================================================

#[test]
fn parse_empty_section() {
    let slots = parse_section(&[]).unwrap();
    assert_eq!(slots.len(), 0);
}

#[test]
fn parse_mixed_section() {
    let input = [
        RawSlot::new(0x100, 0x200),
        RawSlot::new(0x300, RANGE_START),
        RawSlot::new(0x400, 0x500),
    ];
    let data = section(&input);

    let slots = parse_section(&data).unwrap();
    assert_eq!(slots.remaining(), 3);
    let decoded: Vec<RawSlot> = slots.collect();
    assert_eq!(decoded, input);
}

#[test]
fn parse_rejects_partial_slot() {
    let mut data = section(&[RawSlot::new(0x100, 0x200)]);
    data.push(0);

    assert_eq!(
        parse_section(&data).unwrap_err(),
        SectionError::Misaligned { len: 17 }
    );
}

#[test]
fn parse_rejects_half_slot() {
    assert_eq!(
        parse_section(&[0u8; 8]).unwrap_err(),
        SectionError::Misaligned { len: 8 }
    );
}

#[test]
fn parse_keeps_deleted_sentinel() {
    // Decoding is purely structural; rejecting sentinels is the table's job.
    let data = section(&[RawSlot::new(0x100, DELETED)]);
    let slot = parse_section(&data).unwrap().next().unwrap();
    assert!(slot.kind().is_deleted());
}
