//! Bitmap physical frame allocator, bootstrapped from the bootloader's
//! memory map.
//!
//! The bit-twiddling itself lives in [`kernel_core::pmm`] and is exercised by
//! host tests there; this module only owns the real bitmap storage (a frame
//! inside the chosen region, written through HHDM) and the `static` handle
//! guarding it.

use kernel_core::addr::PhysAddr;
use kernel_core::config::PMM_MIN_BASE;
use kernel_core::pmm as bitmap;

use crate::sync::{LazyLock, SpinLock};

use super::hhdm;

/// One entry of the bootloader-reported memory map, reduced to the fields
/// the allocator cares about.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    /// Physical base address.
    pub base: u64,
    /// Length in bytes.
    pub length: u64,
    /// Whether the bootloader reports this region as free RAM.
    pub usable: bool,
}

struct State {
    base: u64,
    length: u64,
    bitmap_reserved: u64,
    bitmap_ptr: *mut u8,
    bitmap_len: usize,
}

// SAFETY: `bitmap_ptr` points at HHDM-mapped physical memory reserved
// exclusively for this allocator; all access goes through `PMM`'s lock.
unsafe impl Send for State {}

static PMM: LazyLock<SpinLock<Option<State>>> = LazyLock::new(|| SpinLock::new(None));

/// Selects the largest usable region at or above [`PMM_MIN_BASE`], lays out
/// its bitmap, zero-fills the bitmap through HHDM, and reserves the frames
/// the bitmap itself occupies.
///
/// # Panics
///
/// Panics if no region in `regions` is usable and at least large enough to
/// hold its own bitmap — there is no recovery from a PMM that cannot start.
pub fn init(regions: &[MemoryRegion]) {
    let region = regions
        .iter()
        .filter(|r| r.usable && r.base >= PMM_MIN_BASE)
        .max_by_key(|r| r.length)
        .expect("no usable memory region found");

    let (_total_pages, _bitmap_pages, bitmap_reserved) = bitmap::region_layout(region.length);
    let bitmap_len = bitmap_reserved as usize;

    let bitmap_virt = hhdm::phys_to_virt(PhysAddr::new(region.base));
    let bitmap_ptr = bitmap_virt.as_mut_ptr::<u8>();

    // SAFETY: the region is reported usable and large enough by construction
    // above; the HHDM alias is valid once `hhdm::set_offset` has run.
    let bitmap_slice = unsafe { core::slice::from_raw_parts_mut(bitmap_ptr, bitmap_len) };
    bitmap_slice.fill(0);
    let reserved_frames = bitmap_reserved / kernel_core::config::FRAME_SIZE;
    bitmap::mark_used_prefix(bitmap_slice, reserved_frames);

    *PMM.lock() = Some(State {
        base: region.base,
        length: region.length,
        bitmap_reserved,
        bitmap_ptr,
        bitmap_len,
    });
}

/// Returns the byte length of the managed region selected at [`init`], for
/// the shell's `info` command.
///
/// # Panics
///
/// Panics if called before [`init`].
#[must_use]
pub fn managed_region_length() -> u64 {
    PMM.lock()
        .as_ref()
        .expect("pmm::managed_region_length before pmm::init")
        .length
}

/// Allocates one 4 KiB frame. Returns `None` when the managed region is
/// exhausted.
#[must_use]
pub fn alloc() -> Option<PhysAddr> {
    let mut guard = PMM.lock();
    let state = guard.as_mut().expect("pmm::alloc before pmm::init");
    // SAFETY: `bitmap_ptr`/`bitmap_len` describe the region reserved at init
    // and are never mutated outside this lock.
    let bitmap = unsafe { core::slice::from_raw_parts_mut(state.bitmap_ptr, state.bitmap_len) };
    let index = bitmap::find_first_free(bitmap)?;
    bitmap::set_bit(bitmap, index, true);
    let addr = bitmap::frame_address(state.base, state.bitmap_reserved, index as u64);
    Some(PhysAddr::new(addr))
}

/// Allocates one frame, treating exhaustion as fatal. Used by early-boot
/// callers (paging init) for which there is no recovery path.
#[must_use]
pub fn alloc_or_panic() -> PhysAddr {
    alloc().expect("physical frame allocator exhausted")
}

/// Frees a frame previously returned by [`alloc`].
///
/// # Safety
///
/// `addr` must have been returned by a prior `alloc()` call on this same
/// region and not already freed; double-free is undefined, matching the
/// contract of the underlying bitmap math.
pub unsafe fn free(addr: PhysAddr) {
    let mut guard = PMM.lock();
    let state = guard.as_mut().expect("pmm::free before pmm::init");
    // SAFETY: see `alloc`.
    let bitmap = unsafe { core::slice::from_raw_parts_mut(state.bitmap_ptr, state.bitmap_len) };
    let index = bitmap::frame_index(state.base, state.bitmap_reserved, addr.as_u64());
    bitmap::set_bit(bitmap, index as usize, false);
}
