//! Panic screen and ELF-symbol-resolved stack trace.
//!
//! Grounded on `examples/original_source/src/kernel/panic.c`: a single choke
//! point prints the fault, a register dump, then walks the RBP chain,
//! resolving each return address against the live kernel ELF's `.symtab`/
//! `.strtab`. There is nowhere to recover to — every panic disables
//! interrupts and halts.

#[cfg(not(test))]
use core::panic::PanicInfo;

use kernel_core::elf::{ElfHeader, SectionHeader};

/// The kernel's own ELF image in memory, as reported by the bootloader.
/// Set once by [`set_kernel_image`] before interrupts are enabled.
static mut KERNEL_IMAGE: *const [u8] = &[];

/// Records the kernel's own ELF image so panics can resolve symbols.
///
/// # Safety
///
/// Must be called exactly once, before any fault can occur, with a slice
/// that remains valid (and is never mutated) for the rest of boot.
pub unsafe fn set_kernel_image(image: &'static [u8]) {
    unsafe { KERNEL_IMAGE = image as *const [u8] };
}

fn kernel_image() -> &'static [u8] {
    // SAFETY: written once by `set_kernel_image` before any reader runs.
    unsafe { &**core::ptr::addr_of!(KERNEL_IMAGE) }
}

/// One call frame of a frame-pointer chain: `RBP -> [prev RBP, saved RIP]`.
#[repr(C)]
struct StackFrame {
    prev: *const StackFrame,
    return_address: u64,
}

fn read_rbp() -> u64 {
    let rbp: u64;
    // SAFETY: reading a general-purpose register has no side effects.
    unsafe {
        core::arch::asm!("mov {}, rbp", out(reg) rbp, options(nomem, nostack, preserves_flags));
    }
    rbp
}

fn read_cr2() -> u64 {
    let cr2: u64;
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }
    cr2
}

fn read_cr3() -> u64 {
    let cr3: u64;
    unsafe {
        core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
    }
    cr3
}

#[repr(C, packed)]
struct DescriptorTableRegister {
    limit: u16,
    base: u64,
}

fn read_gdtr() -> DescriptorTableRegister {
    let mut reg = DescriptorTableRegister { limit: 0, base: 0 };
    // SAFETY: `sgdt` never faults and the destination is a valid local.
    unsafe {
        core::arch::asm!("sgdt [{}]", in(reg) &mut reg, options(nostack, preserves_flags));
    }
    reg
}

fn read_idtr() -> DescriptorTableRegister {
    let mut reg = DescriptorTableRegister { limit: 0, base: 0 };
    // SAFETY: `sidt` never faults and the destination is a valid local.
    unsafe {
        core::arch::asm!("sidt [{}]", in(reg) &mut reg, options(nostack, preserves_flags));
    }
    reg
}

/// Finds `.symtab`/`.strtab` in `image` and prints the name of the symbol
/// whose `[value, value+size)` range contains `address`, or `<unresolved>`
/// if the image is missing, malformed, or no symbol matches.
fn print_symbol_for_address(image: &[u8], address: u64) {
    let Ok(header) = ElfHeader::parse(image) else {
        crate::log::kprint!(" <unresolved>\n");
        return;
    };

    let Some(shstrtab) = SectionHeader::parse_at(image, &header, header.shstrndx) else {
        crate::log::kprint!(" <unresolved>\n");
        return;
    };

    let mut symtab: Option<SectionHeader> = None;
    let mut strtab: Option<SectionHeader> = None;
    for i in 0..header.shnum {
        let Some(sh) = SectionHeader::parse_at(image, &header, i) else {
            continue;
        };
        let name_off = shstrtab.offset as usize + section_name_offset(image, &header, i);
        let Some(name) = read_cstr(image, name_off) else {
            continue;
        };
        if name == b".symtab" {
            symtab = Some(sh);
        } else if name == b".strtab" {
            strtab = Some(sh);
        }
    }

    let (Some(symtab), Some(strtab)) = (symtab, strtab) else {
        crate::log::kprint!(" <unresolved>\n");
        return;
    };

    const SYMTAB_ENTRY_SIZE: usize = 24;
    let count = symtab.size as usize / SYMTAB_ENTRY_SIZE;
    for i in 0..count {
        let base = symtab.offset as usize + i * SYMTAB_ENTRY_SIZE;
        let Some(entry) = image.get(base..base + SYMTAB_ENTRY_SIZE) else {
            break;
        };
        let name_idx = u32::from_le_bytes(entry[0..4].try_into().unwrap());
        let value = u64::from_le_bytes(entry[8..16].try_into().unwrap());
        let size = u64::from_le_bytes(entry[16..24].try_into().unwrap());
        if address >= value && address < value + size {
            let name_off = strtab.offset as usize + name_idx as usize;
            match read_cstr(image, name_off) {
                Some(name) => {
                    crate::log::kprint!(" {}\n", core::str::from_utf8(name).unwrap_or("<non-utf8>"))
                }
                None => crate::log::kprint!(" <unresolved>\n"),
            }
            return;
        }
    }
    crate::log::kprint!(" <unresolved>\n");
}

/// Byte offset, within the section-header string table's section name field
/// (`sh_name`), of the `index`-th section header. The field lives at offset
/// `0x00` of the 64-byte section header struct, 4 bytes wide.
fn section_name_offset(image: &[u8], header: &ElfHeader, index: u16) -> usize {
    let base = header.shoff as usize + index as usize * header.shentsize as usize;
    image
        .get(base..base + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()) as usize)
        .unwrap_or(0)
}

/// Reads a NUL-terminated string out of `image` starting at `offset`.
fn read_cstr(image: &[u8], offset: usize) -> Option<&[u8]> {
    let rest = image.get(offset..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    Some(&rest[..end])
}

/// Walks the RBP chain starting at `rbp`, printing each return address and
/// its resolved symbol name, terminating at RIP=0 or RBP=0.
fn stack_trace(rbp: u64) {
    crate::log::kprintln!();
    crate::log::kprintln!("==== Stack Trace: ====");
    crate::log::kprintln!();

    let image = kernel_image();

    let mut frame = rbp as *const StackFrame;
    while !frame.is_null() {
        // SAFETY: best-effort walk; a corrupted chain may read garbage but
        // never past a null check, and the kernel is about to halt anyway.
        let current = unsafe { &*frame };
        if current.return_address == 0 {
            break;
        }
        crate::log::kprint!(" {:#x}", current.return_address);
        print_symbol_for_address(image, current.return_address);
        frame = current.prev;
    }
}

/// Formats the panic header, register dump, and stack trace, then halts.
///
/// Never returns. Called from the `#[panic_handler]` below and reachable
/// from every exception handler via the `panic!()` macro.
fn kernel_panic(reason: core::fmt::Arguments<'_>) -> ! {
    // SAFETY: interrupts are disabled for the remainder of the kernel's
    // lifetime; nothing else runs concurrently with this formatter.
    unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) };

    crate::log::kprintln!();
    crate::log::kprintln!("============= KERNEL PANIC =============");
    crate::log::kprintln!();
    crate::log::kprintln!("Fault: {reason}");

    let gdtr = read_gdtr();
    let idtr = read_idtr();
    let cr2 = read_cr2();
    let cr3 = read_cr3();
    crate::log::kprintln!();
    crate::log::kprintln!("=== Register Dump: ===");
    crate::log::kprintln!();
    {
        let limit = gdtr.limit;
        let base = gdtr.base;
        crate::log::kprintln!("GDTR: base={base:#x} limit={limit:#x}");
    }
    {
        let limit = idtr.limit;
        let base = idtr.base;
        crate::log::kprintln!("IDTR: base={base:#x} limit={limit:#x}");
    }
    crate::log::kprintln!("CR2:  {cr2:#x}");
    crate::log::kprintln!("CR3:  {cr3:#x}");

    stack_trace(read_rbp());

    crate::log::kprintln!();
    crate::log::kprintln!("disabling interrupts and halting the CPU");
    halt_loop()
}

fn halt_loop() -> ! {
    loop {
        // SAFETY: `hlt` with interrupts already disabled just parks the CPU.
        unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic_handler(info: &PanicInfo<'_>) -> ! {
    kernel_panic(format_args!("{info}"))
}
