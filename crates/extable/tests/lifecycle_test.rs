// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Module lifecycle tests.
//!
//! Drives tables the way a kernel does: section images from the link step,
//! registration at module load, trim when init text is freed, lookups from
//! several CPUs at once.

// Test code prioritizes clarity over defensive programming
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use extable::{
    CodeRegion, ExTable, ExTableBuilder, Fixup, InsnWidth, ModuleId, ModuleLayout, RawSlot,
    RegistryError, Resolution, TableRegistry, Vaddr,
};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Helpers
// ============================================================================

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn addr(a: u64) -> Vaddr {
    Vaddr::new(a)
}

fn fixup(a: u64) -> Fixup {
    Fixup::new(a).unwrap()
}

fn w4() -> InsnWidth {
    InsnWidth::new(4).unwrap()
}

fn section(slots: &[RawSlot]) -> Vec<u8> {
    slots.iter().flat_map(RawSlot::to_le_bytes).collect()
}

/// Section image of a module with user-copy helpers in text and a probe
/// routine in init text.
fn module_section() -> Vec<u8> {
    let slots = ExTableBuilder::new()
        // get_user: one faulting load
        .single(addr(0x10_040), fixup(0x10_800))
        // copy_from_user: unrolled loop
        .range(addr(0x10_100), addr(0x10_180), fixup(0x10_900))
        // init probe of a device register window
        .range(addr(0x20_000), addr(0x20_040), fixup(0x20_300))
        .single(addr(0x20_100), fixup(0x20_310))
        .raw_slots();
    section(&slots)
}

fn load_module(reg: &mut TableRegistry, id: u32) -> Result<(), RegistryError> {
    let layout = ModuleLayout {
        id: ModuleId::new(id),
        text: CodeRegion::new(addr(0x10_000), addr(0x11_000)),
        init: Some(CodeRegion::new(addr(0x20_000), addr(0x21_000))),
    };
    reg.register_section(layout, &module_section())?;
    Ok(())
}

fn kernel() -> TableRegistry {
    TableRegistry::with_insn_width(
        CodeRegion::new(addr(0x1000), addr(0x8000)),
        &[RawSlot::new(0x1200, 0x7f00)],
        w4(),
    )
    .unwrap()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn module_load_init_free_unload() {
    init_logging();
    let mut reg = kernel();
    load_module(&mut reg, 1).unwrap();

    // Faults during init
    assert_eq!(
        reg.resolve(addr(0x20_008)),
        Some(Resolution::in_range(fixup(0x20_300), 2))
    );
    assert_eq!(
        reg.resolve(addr(0x20_100)),
        Some(Resolution::exact(fixup(0x20_310)))
    );

    // Init done, init text freed
    assert_eq!(reg.free_init(ModuleId::new(1)).unwrap(), 2);
    assert_eq!(reg.resolve(addr(0x20_008)), None);
    assert_eq!(reg.resolve(addr(0x20_100)), None);
    assert_eq!(
        reg.resolve(addr(0x10_040)),
        Some(Resolution::exact(fixup(0x10_800)))
    );
    assert_eq!(
        reg.resolve(addr(0x10_17c)),
        Some(Resolution::in_range(fixup(0x10_900), 0x1f))
    );

    // Kernel entries are untouched throughout
    assert_eq!(
        reg.resolve(addr(0x1200)),
        Some(Resolution::exact(fixup(0x7f00)))
    );

    let table = reg.unregister_table(ModuleId::new(1)).unwrap();
    assert_eq!(table.live_entries(), 2);
    assert_eq!(reg.resolve(addr(0x10_040)), None);

    // Same addresses may be reused by the next module
    load_module(&mut reg, 2).unwrap();
    assert_eq!(
        reg.resolve(addr(0x20_100)),
        Some(Resolution::exact(fixup(0x20_310)))
    );
}

#[test]
fn truncated_section_rejected_before_registration() {
    init_logging();
    let mut data = module_section();
    data.truncate(data.len() - 8);

    let err = ExTable::from_section(&data, w4()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "malformed table section: section length 88 is not a multiple of 16 bytes"
    );

    let mut reg = kernel();
    let layout = ModuleLayout {
        id: ModuleId::new(1),
        text: CodeRegion::new(addr(0x10_000), addr(0x11_000)),
        init: None,
    };
    assert!(matches!(
        reg.register_section(layout, &data),
        Err(RegistryError::Malformed(_))
    ));
    assert_eq!(reg.module_count(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn readers_never_block_on_trim_of_unrelated_entries() {
    init_logging();

    // Even slots are kept, odd slots are trimmed while readers run.
    let mut builder = ExTableBuilder::new().insn_width(w4());
    for i in 0..256u64 {
        let base = 0x100_000 + i * 0x100;
        builder = if i % 4 == 0 {
            builder.range(addr(base), addr(base + 0x40), fixup(0x900_000 + i))
        } else {
            builder.single(addr(base), fixup(0x900_000 + i))
        };
    }
    let table = builder.build().unwrap();
    let trimmed_unit = |a: Vaddr| ((a.as_u64() - 0x100_000) / 0x100) % 2 == 1;
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    for i in (0..256u64).step_by(2) {
                        let base = 0x100_000 + i * 0x100;
                        let probe = if i % 4 == 0 { base + 0x8 } else { base };
                        let hit = table.resolve_with_offset(addr(probe)).unwrap();
                        assert_eq!(hit.fixup, fixup(0x900_000 + i));
                    }
                }
            });
        }

        assert_eq!(table.trim(trimmed_unit), 128);
        done.store(true, Ordering::Release);
    });

    for i in (1..256u64).step_by(2) {
        let base = 0x100_000 + i * 0x100;
        assert_eq!(table.resolve_with_offset(addr(base)), None);
    }
    assert_eq!(table.live_entries(), 128);
}
