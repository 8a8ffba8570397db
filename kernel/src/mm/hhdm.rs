//! Higher-half direct map offset.
//!
//! The bootloader maps all physical memory at a fixed offset into the
//! higher half. Every subsystem that needs to read or write through a
//! physical address (the PMM bitmap, page tables during `paging::init`)
//! goes through [`phys_to_virt`] rather than assuming an identity map,
//! because the identity map is itself built incrementally by `paging::init`.

use core::sync::atomic::{AtomicU64, Ordering};

use kernel_core::addr::{PhysAddr, VirtAddr};

static OFFSET: AtomicU64 = AtomicU64::new(0);

/// Records the HHDM offset reported by the bootloader. Must be called
/// exactly once, before anything calls [`phys_to_virt`].
pub fn set_offset(offset: u64) {
    OFFSET.store(offset, Ordering::Release);
}

/// Returns the recorded HHDM offset.
#[must_use]
pub fn offset() -> u64 {
    OFFSET.load(Ordering::Acquire)
}

/// Translates a physical address to its higher-half direct-map alias.
#[must_use]
pub fn phys_to_virt(addr: PhysAddr) -> VirtAddr {
    VirtAddr::new(addr.as_u64() + offset())
}
