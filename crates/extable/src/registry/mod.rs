// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Registry of the kernel's and loaded modules' exception tables.
//!
//! The fault path does not know which table describes a faulting address.
//! The registry maps code regions to tables:
//! - The kernel image's table, covering the kernel text, for the whole
//!   lifetime of the system
//! - One table per loaded module, covering the module's text and, until it
//!   is freed, its init-only text
//!
//! Module regions are kept sorted and non-overlapping so the fault path
//! finds the owning table with a binary search.
//!
//! # Lifecycle
//!
//! ```text
//! register_table ──► free_init (optional, once) ──► unregister_table
//!                     trims init entries             drops the table
//! ```
//!
//! # Concurrency
//!
//! Lookups take `&self`. Registration, [`TableRegistry::free_init`] and
//! unregistration take `&mut self`; the module loader serializes them and
//! is responsible for quiescing CPUs that may still run the freed code.


use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use extable_abi::{InsnWidth, RawSlot, Vaddr, parse_section};

use crate::entry::Resolution;
use crate::error::RegistryError;
use crate::table::ExTable;

// =============================================================================
// Identifiers and regions
// =============================================================================

/// Identifier of a loadable module.
///
/// ID 0 is the kernel image itself and is never given to a module.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct ModuleId(u32);

impl ModuleId {
    /// The kernel image.
    pub const KERNEL: Self = Self(0);

    /// Creates a new module ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Checks if this is the kernel image ID.
    #[inline]
    #[must_use]
    pub const fn is_kernel(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module:{}", self.0)
    }
}

/// A half-open range of code addresses `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeRegion {
    start: Vaddr,
    end: Vaddr,
}

impl CodeRegion {
    /// Creates a region from its bounds.
    #[inline]
    #[must_use]
    pub const fn new(start: Vaddr, end: Vaddr) -> Self {
        Self { start, end }
    }

    /// Creates a region of `size` bytes at `start`, saturating at the top
    /// of the address space.
    #[inline]
    #[must_use]
    pub const fn sized(start: Vaddr, size: u64) -> Self {
        Self {
            start,
            end: Vaddr::new(start.as_u64().saturating_add(size)),
        }
    }

    /// First address in the region.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> Vaddr {
        self.start
    }

    /// First address past the region.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> Vaddr {
        self.end
    }

    /// Returns true if the region holds no address.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns true if `addr` lies in the region.
    #[inline]
    #[must_use]
    pub fn contains(&self, addr: Vaddr) -> bool {
        self.start <= addr && addr < self.end
    }

    /// Returns true if the two regions share an address.
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Where a module's code lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleLayout {
    /// Module identifier.
    pub id: ModuleId,
    /// Code kept for the module's whole lifetime.
    pub text: CodeRegion,
    /// Code freed once the module finished initializing.
    pub init: Option<CodeRegion>,
}

/// Which image a code address belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableOwner {
    /// The kernel image.
    Kernel,
    /// A loaded module.
    Module(ModuleId),
}

// =============================================================================
// Registry
// =============================================================================

/// A registered module table.
#[derive(Debug)]
struct ModuleTable {
    layout: ModuleLayout,
    table: Arc<ExTable>,
}

/// A live module region routed to a table.
#[derive(Debug)]
struct RegionRoute {
    region: CodeRegion,
    module: ModuleId,
    table: Arc<ExTable>,
}

/// All exception tables the fault path may consult.
#[derive(Debug)]
pub struct TableRegistry {
    kernel_text: CodeRegion,
    kernel: ExTable,
    insn_width: InsnWidth,
    modules: Vec<ModuleTable>,
    /// Sorted by start address, never overlapping.
    routes: Vec<RegionRoute>,
}

impl TableRegistry {
    /// Create a registry around the kernel image's table.
    ///
    /// Uses the native instruction width for every table.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyRegion`] for an empty kernel text and
    /// [`RegistryError::Malformed`] if the kernel table is malformed.
    pub fn new(kernel_text: CodeRegion, kernel_slots: &[RawSlot]) -> Result<Self, RegistryError> {
        Self::with_insn_width(kernel_text, kernel_slots, InsnWidth::NATIVE)
    }

    /// Create a registry using `insn_width` for every table.
    ///
    /// # Errors
    ///
    /// Same as [`Self::new`].
    pub fn with_insn_width(
        kernel_text: CodeRegion,
        kernel_slots: &[RawSlot],
        insn_width: InsnWidth,
    ) -> Result<Self, RegistryError> {
        if kernel_text.is_empty() {
            return Err(RegistryError::EmptyRegion(ModuleId::KERNEL));
        }
        let kernel = load(ModuleId::KERNEL, kernel_slots, insn_width)?;

        tracing::info!(
            slots = kernel.len(),
            text_start = %kernel_text.start(),
            text_end = %kernel_text.end(),
            "kernel exception table loaded"
        );

        Ok(Self {
            kernel_text,
            kernel,
            insn_width,
            modules: Vec::new(),
            routes: Vec::new(),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Register a freshly loaded module's table.
    ///
    /// The table is validated first; a malformed table is never registered.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateModule`] if `layout.id` is the kernel or
    ///   already registered
    /// - [`RegistryError::EmptyRegion`] if a region is empty
    /// - [`RegistryError::Overlap`] if a region overlaps the kernel text, the
    ///   module's other region, or any registered module region
    /// - [`RegistryError::Malformed`] if the table fails validation
    pub fn register_table(
        &mut self,
        layout: ModuleLayout,
        slots: &[RawSlot],
    ) -> Result<Arc<ExTable>, RegistryError> {
        let id = layout.id;
        if id.is_kernel() || self.find(id).is_some() {
            return Err(RegistryError::DuplicateModule(id));
        }

        let regions = [Some(layout.text), layout.init];
        for region in regions.iter().flatten() {
            if region.is_empty() {
                return Err(RegistryError::EmptyRegion(id));
            }
            if region.overlaps(&self.kernel_text)
                || self.routes.iter().any(|r| r.region.overlaps(region))
            {
                return Err(RegistryError::Overlap(id));
            }
        }
        if let Some(init) = layout.init {
            if init.overlaps(&layout.text) {
                return Err(RegistryError::Overlap(id));
            }
        }

        let table = Arc::new(load(id, slots, self.insn_width)?);
        for region in regions.into_iter().flatten() {
            self.route(region, id, Arc::clone(&table));
        }
        self.modules.push(ModuleTable {
            layout,
            table: Arc::clone(&table),
        });

        tracing::info!(
            module = %id,
            slots = table.len(),
            has_init = layout.init.is_some(),
            "module exception table registered"
        );
        Ok(table)
    }

    /// Register a module's table straight from its section image.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register_table`]; a section that is not a whole
    /// number of slots is [`MalformedTable::Section`].
    ///
    /// [`MalformedTable::Section`]: crate::MalformedTable::Section
    pub fn register_section(
        &mut self,
        layout: ModuleLayout,
        data: &[u8],
    ) -> Result<Arc<ExTable>, RegistryError> {
        let slots: Vec<RawSlot> = parse_section(data)
            .map_err(|e| {
                tracing::warn!(module = %layout.id, error = %e, "rejected exception table section");
                RegistryError::Malformed(e.into())
            })?
            .collect();
        self.register_table(layout, &slots)
    }

    /// Trim the entries of a module's init text and stop routing it.
    ///
    /// Returns the number of logical entries deleted.
    ///
    /// The caller must have quiesced every CPU that could still execute the
    /// init text; see [`ExTable::trim`].
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownModule`] if `id` is not registered and
    /// [`RegistryError::InitAlreadyFreed`] if it has no init text left.
    pub fn free_init(&mut self, id: ModuleId) -> Result<usize, RegistryError> {
        let index = self.find(id).ok_or(RegistryError::UnknownModule(id))?;
        let module = &mut self.modules[index];
        let init = module
            .layout
            .init
            .take()
            .ok_or(RegistryError::InitAlreadyFreed(id))?;

        let trimmed = module.table.trim(|addr| init.contains(addr));
        self.routes.retain(|r| r.region != init);

        tracing::debug!(
            module = %id,
            trimmed,
            live = module.table.live_entries(),
            "module init text freed"
        );
        Ok(trimmed)
    }

    /// Drop a module's table once the module is fully unloaded.
    ///
    /// Returns the table so the caller decides when the last reference
    /// goes away.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownModule`] if `id` is not registered.
    pub fn unregister_table(&mut self, id: ModuleId) -> Result<Arc<ExTable>, RegistryError> {
        let index = self.find(id).ok_or(RegistryError::UnknownModule(id))?;
        let module = self.modules.swap_remove(index);
        self.routes.retain(|r| r.module != id);

        tracing::info!(module = %id, "module exception table unregistered");
        Ok(module.table)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// The kernel image's table.
    #[must_use]
    pub const fn kernel_table(&self) -> &ExTable {
        &self.kernel
    }

    /// The kernel text region.
    #[must_use]
    pub const fn kernel_text(&self) -> CodeRegion {
        self.kernel_text
    }

    /// A registered module's table.
    #[must_use]
    pub fn module_table(&self, id: ModuleId) -> Option<&Arc<ExTable>> {
        self.find(id).map(|i| &self.modules[i].table)
    }

    /// A registered module's current layout.
    ///
    /// `init` is `None` once the init text was freed.
    #[must_use]
    pub fn module_layout(&self, id: ModuleId) -> Option<ModuleLayout> {
        self.find(id).map(|i| self.modules[i].layout)
    }

    /// Number of registered modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Which image owns `addr`, if any.
    #[must_use]
    pub fn owner_of(&self, addr: Vaddr) -> Option<TableOwner> {
        if self.kernel_text.contains(addr) {
            return Some(TableOwner::Kernel);
        }
        self.route_for(addr).map(|r| TableOwner::Module(r.module))
    }

    /// Tables that may describe `addr`, in search order.
    ///
    /// Yields the kernel table when the kernel text contains `addr`, then
    /// the table of the module whose live region contains it.
    pub fn tables_covering(&self, addr: Vaddr) -> impl Iterator<Item = &ExTable> + '_ {
        let kernel = self.kernel_text.contains(addr).then_some(&self.kernel);
        let module = self.route_for(addr).map(|r| &*r.table);
        kernel.into_iter().chain(module)
    }

    /// Resolve a faulting address against every covering table.
    ///
    /// `None` means no recovery exists and the fault is fatal.
    #[must_use]
    pub fn resolve(&self, addr: Vaddr) -> Option<Resolution> {
        self.tables_covering(addr)
            .find_map(|table| table.resolve_with_offset(addr))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn find(&self, id: ModuleId) -> Option<usize> {
        self.modules.iter().position(|m| m.layout.id == id)
    }

    /// Binary search for the live region containing `addr`.
    fn route_for(&self, addr: Vaddr) -> Option<&RegionRoute> {
        let after = self.routes.partition_point(|r| r.region.start() <= addr);
        let candidate = self.routes.get(after.checked_sub(1)?)?;
        candidate.region.contains(addr).then_some(candidate)
    }

    /// Insert a region, keeping routes sorted by start.
    fn route(&mut self, region: CodeRegion, module: ModuleId, table: Arc<ExTable>) {
        let at = self
            .routes
            .partition_point(|r| r.region.start() < region.start());
        self.routes.insert(
            at,
            RegionRoute {
                region,
                module,
                table,
            },
        );
    }
}

/// Validate a table on behalf of `owner`, logging rejections.
fn load(
    owner: ModuleId,
    slots: &[RawSlot],
    insn_width: InsnWidth,
) -> Result<ExTable, RegistryError> {
    ExTable::from_raw(slots, insn_width).map_err(|e| {
        tracing::warn!(module = %owner, error = %e, "rejected malformed exception table");
        RegistryError::Malformed(e)
    })
}
