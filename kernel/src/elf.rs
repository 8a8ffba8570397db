//! ELF64 image loading: allocates a buffer sized to the PROGBITS span,
//! copies sections into it, and transfers control through an explicit
//! trampoline rather than a raw pointer cast.
//!
//! Grounded on `examples/original_source/src/kernel/elf.c`'s copy-then-jump
//! pattern, generalized from its single-section case to every PROGBITS
//! section per spec §4.7, and using [`kernel_core::elf`] for the header and
//! span parsing `elf.c` did by hand.

use kernel_core::elf::{ElfHeader, compute_progbits_span, progbits_sections};
use kernel_core::error::{KernelError, KernelResult};

use crate::mm::hhdm;
use crate::mm::pmm;

const FRAME_SIZE: u64 = kernel_core::config::FRAME_SIZE;
const TRAMPOLINE_STACK_SIZE: usize = 16 * 1024;

#[repr(align(16))]
struct TrampolineStack([u8; TRAMPOLINE_STACK_SIZE]);

static mut TRAMPOLINE_STACK: TrampolineStack = TrampolineStack([0; TRAMPOLINE_STACK_SIZE]);

/// Calls the loaded image's entry point on a dedicated stack, with scratch
/// registers cleared first, and returns its integer result.
///
/// # Safety
///
/// `entry_virt` must be the address of valid, loaded, executable code that
/// takes no arguments and returns a 64-bit value in `rax` via `ret`.
unsafe fn invoke_entry(entry_virt: u64) -> i64 {
    let stack_top =
        (core::ptr::addr_of!(TRAMPOLINE_STACK) as u64) + TRAMPOLINE_STACK_SIZE as u64;
    let result: i64;
    // SAFETY: `stack_top` points at the end of a statically allocated,
    // sufficiently large stack used by no other code concurrently (the
    // shell dispatches `exec` synchronously within the keyboard ISR).
    unsafe {
        core::arch::asm!(
            "mov r12, rsp",
            "mov rsp, {stack}",
            "and rsp, -16",
            "xor eax, eax",
            "xor ebx, ebx",
            "xor ecx, ecx",
            "xor edx, edx",
            "xor esi, esi",
            "xor edi, edi",
            "xor r8, r8",
            "xor r9, r9",
            "xor r10, r10",
            "xor r11, r11",
            "call {entry}",
            "mov rsp, r12",
            stack = in(reg) stack_top,
            entry = in(reg) entry_virt,
            out("rax") result,
            out("rbx") _,
            out("rcx") _,
            out("rdx") _,
            out("rsi") _,
            out("rdi") _,
            out("r8") _,
            out("r9") _,
            out("r10") _,
            out("r11") _,
            out("r12") _,
        );
    }
    result
}

/// Validates `image`, copies its PROGBITS sections into a freshly allocated
/// buffer, runs it via [`invoke_entry`], frees the buffer, and returns the
/// entry point's result.
pub fn load_and_run(image: &[u8]) -> KernelResult<i64> {
    let header = ElfHeader::parse(image)?;
    let span = compute_progbits_span(image, &header)?;

    let image_len = span.max_vaddr - span.min_vaddr;
    let frame_count = image_len.div_ceil(FRAME_SIZE);

    let base_frame = pmm::alloc().ok_or(KernelError::Io)?;
    for i in 1..frame_count {
        // SAFETY: no frame has been freed since boot, so the bitmap scan is
        // monotonic and this allocates the next physically contiguous frame.
        let frame = pmm::alloc().ok_or(KernelError::Io)?;
        debug_assert_eq!(frame.as_u64(), base_frame.as_u64() + i * FRAME_SIZE);
    }

    let buffer_virt = hhdm::phys_to_virt(base_frame);
    let buffer_len = (frame_count * FRAME_SIZE) as usize;
    // SAFETY: `frame_count` frames starting at `base_frame` were just
    // allocated and are mapped by the bootloader's HHDM.
    let buffer = unsafe { core::slice::from_raw_parts_mut(buffer_virt.as_mut_ptr::<u8>(), buffer_len) };
    buffer.fill(0);

    for section in progbits_sections(image, &header) {
        let src_start = section.offset as usize;
        let src_end = src_start + section.size as usize;
        let src = image.get(src_start..src_end).ok_or(KernelError::Format)?;

        let dst_start = (section.addr - span.min_vaddr) as usize;
        let dst_end = dst_start + section.size as usize;
        let dst = buffer.get_mut(dst_start..dst_end).ok_or(KernelError::Format)?;
        dst.copy_from_slice(src);
    }

    let entry_offset = header.entry - span.min_vaddr;
    let entry_virt = buffer_virt.as_u64() + entry_offset;

    // SAFETY: `entry_virt` lies within the just-populated, executable-mapped
    // (via HHDM, which carries the bootloader's RWX identity for low memory)
    // image buffer, at the validated entry point.
    let result = unsafe { invoke_entry(entry_virt) };

    for i in 0..frame_count {
        let frame = kernel_core::addr::PhysAddr::new(base_frame.as_u64() + i * FRAME_SIZE);
        // SAFETY: every frame in this range was allocated above and is freed
        // exactly once, here, after the image has finished running.
        unsafe { pmm::free(frame) };
    }

    Ok(result)
}
