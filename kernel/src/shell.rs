//! Keyboard-driven mini-shell.
//!
//! Grounded on `examples/original_source/src/kernel/shell.c`'s
//! `process_command`/`show_info`/`getCPU`: a flat, case-sensitive,
//! whole-line command table. The IDLE/READING state machine lives in
//! [`crate::drivers::keyboard`], which calls [`process_command`] directly
//! from the keyboard IRQ once a line is complete (see that module's
//! `handle_irq`, and spec §4.8/§5/§9) — this module never polls.

use kernel_core::config::{EXEC_BUFFER_SIZE, KERNEL_VERSION};

use crate::fs::fat32;
use crate::mm::pmm;
use crate::sync::SpinLock;
use crate::{elf, log};

/// Toggle state for the `serial`/`debug` commands. Both are logged-only
/// switches in this CORE: the framebuffer terminal and the trace verbosity
/// they would otherwise gate are ambient collaborators (§10.5), not part of
/// this specification.
struct Toggles {
    serial_output: bool,
    debug: bool,
}

static TOGGLES: SpinLock<Toggles> = SpinLock::new(Toggles {
    serial_output: true,
    debug: false,
});

/// Reads the CPU vendor string via `CPUID` leaf 0, matching the
/// `ebx:edx:ecx` byte order of the reference shell's `getCPU`.
fn cpu_vendor() -> [u8; 12] {
    let ebx: u32;
    let ecx: u32;
    let edx: u32;
    // SAFETY: `CPUID` with `eax=0` is always available and has no side
    // effects beyond the documented register outputs.
    unsafe {
        core::arch::asm!(
            "cpuid",
            inout("eax") 0u32 => _,
            out("ebx") ebx,
            out("ecx") ecx,
            out("edx") edx,
            options(nomem, nostack, preserves_flags),
        );
    }
    let mut vendor = [0u8; 12];
    vendor[0..4].copy_from_slice(&ebx.to_le_bytes());
    vendor[4..8].copy_from_slice(&edx.to_le_bytes());
    vendor[8..12].copy_from_slice(&ecx.to_le_bytes());
    vendor
}

/// Prints total managed memory, kernel version, and CPU vendor.
fn show_info() {
    log::kprintln!();
    let mem_size = pmm::managed_region_length();
    // Matches the reference shell's divisor, which is not true MB units.
    let mem_size_mb = mem_size / 10_000_000;
    log::kprintln!("Memory  {mem_size_mb}mb");
    log::kprintln!("Kernel  {KERNEL_VERSION}");
    let vendor = cpu_vendor();
    let vendor = core::str::from_utf8(&vendor).unwrap_or("<unknown>");
    log::kprintln!("CPU     {vendor}");
    log::kprintln!();
}

fn print_help() {
    log::kprintln!();
    log::kprintln!("Commands available:");
    log::kprintln!(" - help       Shows this help menu");
    log::kprintln!(" - panic      Force a kernel panic");
    log::kprintln!(" - info       Shows some system info");
    log::kprintln!(" - kmalloc    Allocates and prints the address of one physical frame");
    log::kprintln!(" - fat        Prints the mounted FAT32 BPB");
    log::kprintln!(" - reboot     Reboot machine");
    log::kprintln!(" - exec       Exec ELF executable read from FAT32");
    log::kprintln!(" - run        Runs a tiny hand-built stub that traps into the syscall ISR");
    log::kprintln!(" - debug      Toggles kernel debug traces {{ON|OFF}}");
    log::kprintln!(" - lspci      Triggers PCI enumeration and prints the results");
    log::kprintln!(" - serial     Toggles kernel serial output {{ON|OFF}}");
    log::kprintln!(" - usb        Prints USB PCI IO registers");
    log::kprintln!(" - usb reset  USB bus global reset");
    log::kprintln!(" - exit/quit  Exit pseudo-shell");
    log::kprintln!();
}

fn print_fat32_bpb() {
    match fat32::mount() {
        Ok(()) => log::kprintln!("FAT32 volume mounted"),
        Err(e) => log::kprintln!("fat: {e}"),
    }
}

/// Hexdumps `data` 16 bytes per line, offset and ASCII gutter included.
fn hexdump(data: &[u8]) {
    for (row, chunk) in data.chunks(16).enumerate() {
        log::kprint!("{:08x}  ", row * 16);
        for byte in chunk {
            log::kprint!("{byte:02x} ");
        }
        log::kprint!(" ");
        for &byte in chunk {
            let c = if byte.is_ascii_graphic() { byte as char } else { '.' };
            log::kprint!("{c}");
        }
        log::kprintln!();
    }
}

fn cmd_exec() {
    log::kprintln!("Reading executable from disk");
    let mut buffer = [0u8; EXEC_BUFFER_SIZE];
    match fat32::read_file("HELLO", &mut buffer) {
        Ok(n) => {
            hexdump(&buffer[..n]);
            match elf::load_and_run(&buffer[..n]) {
                Ok(result) => log::kprintln!("exec: entry point returned {result}"),
                Err(e) => log::kprintln!("exec: {e}"),
            }
        }
        Err(e) => log::kprintln!("exec: {e}"),
    }
}

/// Writes `int 0x80; ret` into a freshly allocated frame and calls it,
/// exercising the syscall ISR without going through the ELF loader.
fn cmd_run() {
    let frame = match pmm::alloc() {
        Some(f) => f,
        None => {
            log::kprintln!("run: out of memory");
            return;
        }
    };
    let virt = crate::mm::hhdm::phys_to_virt(frame);
    let ptr = virt.as_mut_ptr::<u8>();
    // SAFETY: `ptr` addresses a freshly allocated, HHDM-mapped frame wide
    // enough for three bytes.
    unsafe {
        core::ptr::write(ptr, 0xCD); // int
        core::ptr::write(ptr.add(1), 0x80);
        core::ptr::write(ptr.add(2), 0xC3); // ret
    }
    // SAFETY: the bytes just written decode to a valid, self-contained
    // no-argument routine; `syscall` number 1 (`rax`) is left at whatever
    // value the caller's context holds, which is acceptable for this
    // diagnostic command.
    let entry: unsafe extern "C" fn() = unsafe { core::mem::transmute(ptr) };
    // SAFETY: see above.
    unsafe { entry() };
    // SAFETY: `frame` was allocated immediately above and not freed since.
    unsafe { pmm::free(frame) };
}

fn cmd_kmalloc() {
    match pmm::alloc() {
        Some(frame) => {
            let virt = crate::mm::hhdm::phys_to_virt(frame);
            log::kprintln!(
                "one physical frame allocated by the kernel: address {:#x}",
                virt.as_u64()
            );
        }
        None => log::kprintln!("kmalloc: out of memory"),
    }
}

/// Zeroes the IDTR and raises an undefined vector, triggering a triple
/// fault and a firmware reboot. Never returns.
fn cmd_reboot() -> ! {
    #[repr(C, packed)]
    struct Zeroed {
        limit: u16,
        base: u64,
    }
    let zero = Zeroed { limit: 0, base: 0 };
    // SAFETY: deliberately installing an empty IDT and immediately faulting
    // is the documented reboot mechanism; nothing after this runs.
    unsafe {
        core::arch::asm!("lidt [{}]", in(reg) &zero, options(readonly, nostack));
        core::arch::asm!("int 0x90", options(nomem, nostack));
    }
    loop {
        unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
    }
}

/// Dispatches one completed command line. Returns `true` if the shell
/// should return to IDLE (`exit`/`quit`).
///
/// Called directly from [`crate::drivers::keyboard::handle_irq`] on the
/// `SC_ENTER` arm, i.e. from within the keyboard ISR itself (§4.8/§5/§9).
pub(crate) fn process_command(input: &str) -> bool {
    match input {
        "panic" => {
            // The breakpoint vector logs and returns in this core (§4.3), so
            // force a real panic directly rather than trap into it.
            panic!("kernel panic requested from the shell");
        }
        "fat" => print_fat32_bpb(),
        "run" => cmd_run(),
        "serial" => {
            let mut toggles = TOGGLES.lock();
            toggles.serial_output = !toggles.serial_output;
            let state = if toggles.serial_output { "ON" } else { "OFF" };
            log::kprintln!("Kernel serial output is {state}");
        }
        "debug" => {
            let mut toggles = TOGGLES.lock();
            toggles.debug = !toggles.debug;
            let state = if toggles.debug { "ON" } else { "OFF" };
            log::kprintln!("Kernel debug traces are {state}");
        }
        "lspci" => log::kprintln!("lspci: PCI enumeration is not available in this build"),
        "exec" => cmd_exec(),
        "reboot" => cmd_reboot(),
        "usb" => log::kprintln!("usb: no UHCI controller is available in this build"),
        "usb reset" => log::kprintln!("usb reset: no UHCI controller is available in this build"),
        "kmalloc" => cmd_kmalloc(),
        "help" => print_help(),
        "exit" | "quit" => return true,
        "info" => show_info(),
        "" => {}
        _ => log::kprintln!("ERROR: command not found"),
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_does_not_exit() {
        assert!(!process_command("bogus"));
    }

    #[test]
    fn exit_and_quit_return_true() {
        assert!(process_command("exit"));
        assert!(process_command("quit"));
    }

    #[test]
    fn empty_line_is_a_no_op() {
        assert!(!process_command(""));
    }
}
