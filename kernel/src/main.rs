//! Kernel entry point.
//!
//! Captures the Limine bootloader's responses, brings the four core
//! subsystems up in the order forced by their data dependencies (§9 Design
//! Notes: the PMM only needs HHDM reads/writes, paging needs the PMM and
//! HHDM, nothing above paging can run before CR3 is loaded), enables
//! interrupts, and idles in a `HLT` loop; the mini-shell itself is driven
//! entirely by the keyboard IRQ (see `shell.rs`).

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![feature(abi_x86_interrupt)]

mod arch;
mod drivers;
mod elf;
mod fs;
mod handlers;
mod log;
mod mm;
mod panic;
mod shell;
mod sync;
mod syscall;

use limine::BaseRevision;
use limine::memory_map::EntryType;
use limine::request::{
    HhdmRequest, KernelAddressRequest, KernelFileRequest, MemoryMapRequest, RequestsEndMarker,
    RequestsStartMarker,
};

/// Maximum number of memory-map entries this kernel will consider. Real
/// Limine memory maps rarely exceed a few dozen entries; this is a generous
/// fixed bound so the PMM bootstrap needs no heap.
const MAX_MEMORY_MAP_ENTRIES: usize = 64;

#[used]
#[unsafe(link_section = ".requests")]
static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[unsafe(link_section = ".requests")]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
static MEMORY_MAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
static KERNEL_ADDRESS_REQUEST: KernelAddressRequest = KernelAddressRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
static KERNEL_FILE_REQUEST: KernelFileRequest = KernelFileRequest::new();

#[used]
#[unsafe(link_section = ".requests_start_marker")]
static _START_MARKER: RequestsStartMarker = RequestsStartMarker::new();

#[used]
#[unsafe(link_section = ".requests_end_marker")]
static _END_MARKER: RequestsEndMarker = RequestsEndMarker::new();

/// Enables maskable interrupts.
///
/// # Safety
///
/// The IDT must already be loaded and every unmasked PIC line must have a
/// present handler installed.
unsafe fn enable_interrupts() {
    // SAFETY: caller upholds the IDT/PIC precondition.
    unsafe { core::arch::asm!("sti", options(nomem, nostack)) };
}

fn halt() {
    // SAFETY: `hlt` with interrupts enabled just parks the CPU until the
    // next interrupt.
    unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
}

/// Kernel entry point named by `linker.ld`'s `ENTRY(kernel_main)`.
#[unsafe(no_mangle)]
extern "C" fn kernel_main() -> ! {
    // SAFETY: first action of boot, before any other port access.
    unsafe { drivers::serial::init_early() };
    // SAFETY: the print function above was just installed.
    unsafe { log::init_default_sink() };

    log::info(format_args!("boot: serial console online"));

    assert!(BASE_REVISION.is_supported(), "unsupported Limine base revision");

    let hhdm = HHDM_REQUEST
        .get_response()
        .expect("bootloader did not answer the HHDM request");
    mm::hhdm::set_offset(hhdm.offset());
    log::info(format_args!("boot: HHDM offset {:#x}", hhdm.offset()));

    let kernel_file = KERNEL_FILE_REQUEST
        .get_response()
        .expect("bootloader did not answer the kernel file request")
        .file();
    // SAFETY: the bootloader maps its own kernel-file response for the
    // lifetime of the boot session; the slice is never mutated.
    let kernel_image = unsafe {
        core::slice::from_raw_parts(kernel_file.addr(), kernel_file.size() as usize)
    };
    // SAFETY: called once, here, before any fault can occur.
    unsafe { panic::set_kernel_image(kernel_image) };

    let kernel_address = KERNEL_ADDRESS_REQUEST
        .get_response()
        .expect("bootloader did not answer the kernel address request");
    log::info(format_args!(
        "boot: kernel loaded at phys {:#x} virt {:#x}",
        kernel_address.physical_base(),
        kernel_address.virtual_base()
    ));

    // SAFETY: first and only call, before interrupts are enabled.
    unsafe { arch::x86_64::gdt::init() };
    log::info(format_args!("boot: GDT/TSS loaded"));

    let memory_map = MEMORY_MAP_REQUEST
        .get_response()
        .expect("bootloader did not answer the memory map request");
    let mut regions = [mm::pmm::MemoryRegion { base: 0, length: 0, usable: false };
        MAX_MEMORY_MAP_ENTRIES];
    let mut region_count = 0;
    for entry in memory_map.entries() {
        if region_count == MAX_MEMORY_MAP_ENTRIES {
            break;
        }
        regions[region_count] = mm::pmm::MemoryRegion {
            base: entry.base,
            length: entry.length,
            usable: entry.entry_type == EntryType::USABLE,
        };
        region_count += 1;
    }
    mm::pmm::init(&regions[..region_count]);
    log::info(format_args!(
        "boot: PMM managing {} MiB",
        mm::pmm::managed_region_length() / (1024 * 1024)
    ));

    // SAFETY: runs after `pmm::init` and `hhdm::set_offset`, exactly once.
    unsafe { mm::paging::init() };
    log::info(format_args!("boot: paging installed, CR3 loaded"));

    // SAFETY: runs once, before interrupts are enabled.
    unsafe { arch::x86_64::pic::remap() };
    // SAFETY: runs after `gdt::init` (CS must already be valid) and once.
    unsafe { arch::x86_64::idt::init() };
    log::info(format_args!("boot: IDT loaded, PIC remapped"));

    // SAFETY: runs after `pic::remap`.
    unsafe {
        arch::x86_64::pic::unmask_irq(0); // timer
        arch::x86_64::pic::unmask_irq(1); // keyboard
    }

    // SAFETY: IDT and PIC are fully initialized; no enabled line can fire
    // into uninitialized core state.
    unsafe { enable_interrupts() };
    log::info(format_args!("boot: interrupts enabled"));

    // SAFETY: interrupts are enabled; port I/O is always permitted in a
    // kernel with no ring-3 transition.
    match unsafe { drivers::ata::identify() } {
        Ok(()) => log::info(format_args!("boot: ATA slave drive responded to IDENTIFY")),
        Err(e) => log::warn(format_args!("boot: ATA IDENTIFY failed: {e}")),
    }

    match fs::fat32::mount() {
        Ok(()) => log::info(format_args!("boot: FAT32 volume mounted")),
        Err(e) => log::warn(format_args!("boot: FAT32 mount failed: {e}")),
    }

    log::info(format_args!(
        "boot: idle; press F1 to start the shell"
    ));

    // The shell never polls: the keyboard IRQ assembles each line and
    // dispatches it inline once Enter completes it (§4.8/§5/§9). The idle
    // loop only parks the CPU between interrupts.
    loop {
        halt();
    }
}
