//! 4-level page table builder.
//!
//! All reads from and writes to page-table entries go through the HHDM
//! alias of their physical frame, never through the identity map, because
//! `init` incrementally builds the identity region itself and cannot assume
//! it already covers a freshly allocated table frame. Two variants of this
//! walker exist in the lineage this kernel is drawn from — one mutating
//! through the identity map, one through HHDM — and only the HHDM variant
//! is correct; it is the only one implemented here.

use kernel_core::addr::{PhysAddr, VirtAddr};
use kernel_core::config::{EARLY_MAP_SIZE, FRAME_SIZE, HIGHER_HALF_BASE};

use super::{hhdm, pmm};

bitflags::bitflags! {
    /// Page table entry flags (bits outside the address field).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        /// Entry is present / valid.
        const PRESENT = 1 << 0;
        /// Page is writable.
        const WRITABLE = 1 << 1;
        /// Page is accessible from user mode (ring 3).
        const USER = 1 << 2;
    }
}

const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// A single 64-bit page table entry.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
struct Entry(u64);

impl Entry {
    const fn empty() -> Self {
        Self(0)
    }

    fn is_present(self) -> bool {
        PageFlags::from_bits_truncate(self.0).contains(PageFlags::PRESENT)
    }

    fn address(self) -> PhysAddr {
        PhysAddr::new_truncate(self.0 & ADDR_MASK)
    }

    fn new(addr: PhysAddr, flags: PageFlags) -> Self {
        Self((addr.as_u64() & ADDR_MASK) | flags.bits())
    }
}

/// A 4 KiB-aligned table of 512 entries (PML4, PDPT, PD, or PT).
#[repr(C, align(4096))]
struct Table {
    entries: [Entry; 512],
}

impl Table {
    fn zero(&mut self) {
        self.entries.fill(Entry::empty());
    }
}

/// Returns a mutable reference to the table at `phys`, through its HHDM
/// alias.
fn table_at(phys: PhysAddr) -> &'static mut Table {
    let virt = hhdm::phys_to_virt(phys);
    // SAFETY: `phys` was allocated as a zeroed, page-aligned frame dedicated
    // to holding one page table, and HHDM maps all physical memory.
    unsafe { &mut *virt.as_mut_ptr::<Table>() }
}

fn alloc_table() -> PhysAddr {
    let frame = pmm::alloc_or_panic();
    table_at(frame).zero();
    frame
}

/// Physical address of the PML4, set by [`init`].
static mut PML4_PHYS: u64 = 0;

/// Walks (allocating intermediate tables as needed) to the leaf PTE for
/// `virt`, then installs `phys` with `flags | PRESENT`.
fn map_entry(pml4: PhysAddr, virt: VirtAddr, phys: PhysAddr, flags: PageFlags) {
    let mut table = table_at(pml4);
    let indices = [
        virt.pml4_index(),
        virt.pdpt_index(),
        virt.pd_index(),
    ];
    for index in indices {
        let entry = table.entries[index];
        let next_phys = if entry.is_present() {
            entry.address()
        } else {
            let frame = alloc_table();
            table.entries[index] = Entry::new(frame, flags | PageFlags::PRESENT);
            frame
        };
        table = table_at(next_phys);
    }
    table.entries[virt.pt_index()] = Entry::new(phys, flags | PageFlags::PRESENT);
}

/// Builds the PML4, identity-maps `[0, EARLY_MAP_SIZE)`, maps the
/// higher-half window at [`HIGHER_HALF_BASE`] to the same physical range,
/// loads CR3, and sets CR0.WP.
///
/// # Safety
///
/// Must run after [`pmm::init`] and [`hhdm::set_offset`], and exactly once.
pub unsafe fn init() {
    let pml4_phys = alloc_table();
    // SAFETY: single-threaded boot, written once here and read only by `map`.
    unsafe { PML4_PHYS = pml4_phys.as_u64() };

    let mut offset = 0u64;
    while offset < EARLY_MAP_SIZE {
        let phys = PhysAddr::new(offset);
        map_entry(
            pml4_phys,
            VirtAddr::new(offset),
            phys,
            PageFlags::WRITABLE,
        );
        map_entry(
            pml4_phys,
            VirtAddr::new(HIGHER_HALF_BASE + offset),
            phys,
            PageFlags::WRITABLE,
        );
        offset += FRAME_SIZE;
    }

    unsafe {
        load_cr3(pml4_phys.as_u64());
        enable_write_protect();
    }
}

unsafe fn load_cr3(phys: u64) {
    unsafe {
        core::arch::asm!("mov cr3, {}", in(reg) phys, options(nostack, preserves_flags));
    }
}

unsafe fn enable_write_protect() {
    unsafe {
        let mut cr0: u64;
        core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        cr0 |= 1 << 16; // WP
        core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
    }
}

/// Maps `virt` to `phys` with the given flags, allocating intermediate
/// tables through the physical frame allocator as needed.
///
/// # Safety
///
/// Must run after [`init`]. Overwrites any existing mapping for `virt`.
pub unsafe fn map(virt: VirtAddr, phys: PhysAddr, flags: PageFlags) {
    // SAFETY: set exactly once by `init` before any `map`/`unmap` call.
    let pml4 = PhysAddr::new(unsafe { PML4_PHYS });
    map_entry(pml4, virt, phys, flags);
}

/// Walks existing tables for `virt` without creating any, and if the leaf
/// entry exists, clears it. Intermediate tables are never reclaimed.
///
/// # Safety
///
/// Must run after [`init`].
pub unsafe fn unmap(virt: VirtAddr) {
    // SAFETY: see `map`.
    let mut table = table_at(PhysAddr::new(unsafe { PML4_PHYS }));
    let indices = [virt.pml4_index(), virt.pdpt_index(), virt.pd_index()];
    for index in indices {
        let entry = table.entries[index];
        if !entry.is_present() {
            return;
        }
        table = table_at(entry.address());
    }
    table.entries[virt.pt_index()] = Entry::empty();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_roundtrip() {
        let addr = PhysAddr::new(0x20_0000);
        let entry = Entry::new(addr, PageFlags::PRESENT | PageFlags::WRITABLE);
        assert!(entry.is_present());
        assert_eq!(entry.address().as_u64(), 0x20_0000);
    }

    #[test]
    fn spec_scenario_pte_bits() {
        // spec §8 scenario 2: map virt=0x200000, phys=0x200000, RW.
        let addr = PhysAddr::new(0x0020_0000);
        let entry = Entry::new(addr, PageFlags::PRESENT | PageFlags::WRITABLE);
        assert_eq!(entry.0, 0x0020_0003);
    }

    #[test]
    fn empty_entry_not_present() {
        assert!(!Entry::empty().is_present());
    }
}
