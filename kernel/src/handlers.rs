//! CPU exception and hardware interrupt handlers.
//!
//! Most exceptions simply panic with the exception name and stack frame —
//! there is no ring-3 process to terminate instead (the loaded ELF image
//! runs kernel-privileged). Breakpoint logs and returns, for shell debugging.

#![allow(missing_docs)]

use crate::arch::x86_64::idt::InterruptStackFrame;
use crate::arch::x86_64::pic;

pub extern "x86-interrupt" fn divide_error(frame: InterruptStackFrame) {
    panic!("EXCEPTION: DIVIDE ERROR\n{frame:#?}");
}

pub extern "x86-interrupt" fn debug(frame: InterruptStackFrame) {
    crate::log::warn(format_args!("EXCEPTION: DEBUG\n{frame:#?}"));
}

pub extern "x86-interrupt" fn nmi(frame: InterruptStackFrame) {
    panic!("EXCEPTION: NON-MASKABLE INTERRUPT\n{frame:#?}");
}

pub extern "x86-interrupt" fn breakpoint(frame: InterruptStackFrame) {
    crate::log::warn(format_args!("EXCEPTION: BREAKPOINT\n{frame:#?}"));
}

pub extern "x86-interrupt" fn overflow(frame: InterruptStackFrame) {
    panic!("EXCEPTION: OVERFLOW\n{frame:#?}");
}

pub extern "x86-interrupt" fn bound_range(frame: InterruptStackFrame) {
    panic!("EXCEPTION: BOUND RANGE EXCEEDED\n{frame:#?}");
}

pub extern "x86-interrupt" fn invalid_opcode(frame: InterruptStackFrame) {
    panic!("EXCEPTION: INVALID OPCODE\n{frame:#?}");
}

pub extern "x86-interrupt" fn device_not_available(frame: InterruptStackFrame) {
    panic!("EXCEPTION: DEVICE NOT AVAILABLE\n{frame:#?}");
}

pub extern "x86-interrupt" fn double_fault(frame: InterruptStackFrame, error_code: u64) -> ! {
    panic!("EXCEPTION: DOUBLE FAULT (error_code={error_code})\n{frame:#?}");
}

pub extern "x86-interrupt" fn invalid_tss(frame: InterruptStackFrame, error_code: u64) {
    panic!("EXCEPTION: INVALID TSS (error_code={error_code:#x})\n{frame:#?}");
}

pub extern "x86-interrupt" fn segment_not_present(frame: InterruptStackFrame, error_code: u64) {
    panic!("EXCEPTION: SEGMENT NOT PRESENT (error_code={error_code:#x})\n{frame:#?}");
}

pub extern "x86-interrupt" fn stack_segment_fault(frame: InterruptStackFrame, error_code: u64) {
    panic!("EXCEPTION: STACK-SEGMENT FAULT (error_code={error_code:#x})\n{frame:#?}");
}

pub extern "x86-interrupt" fn general_protection(frame: InterruptStackFrame, error_code: u64) {
    panic!("EXCEPTION: GENERAL PROTECTION FAULT (error_code={error_code:#x})\n{frame:#?}");
}

pub extern "x86-interrupt" fn page_fault(frame: InterruptStackFrame, error_code: u64) {
    let cr2: u64;
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }
    panic!(
        "EXCEPTION: PAGE FAULT\n  Address: {cr2:#x}\n  Error: {error_code:#x}\n{frame:#?}"
    );
}

pub extern "x86-interrupt" fn x87_floating_point(frame: InterruptStackFrame) {
    panic!("EXCEPTION: X87 FLOATING POINT\n{frame:#?}");
}

pub extern "x86-interrupt" fn alignment_check(frame: InterruptStackFrame, error_code: u64) {
    panic!("EXCEPTION: ALIGNMENT CHECK (error_code={error_code:#x})\n{frame:#?}");
}

pub extern "x86-interrupt" fn machine_check(frame: InterruptStackFrame) -> ! {
    panic!("EXCEPTION: MACHINE CHECK\n{frame:#?}");
}

pub extern "x86-interrupt" fn simd_floating_point(frame: InterruptStackFrame) {
    panic!("EXCEPTION: SIMD FLOATING POINT\n{frame:#?}");
}

pub extern "x86-interrupt" fn virtualization(frame: InterruptStackFrame) {
    panic!("EXCEPTION: VIRTUALIZATION\n{frame:#?}");
}

pub extern "x86-interrupt" fn timer(_frame: InterruptStackFrame) {
    crate::drivers::timer::tick();
    unsafe { pic::send_eoi(0) };
}

pub extern "x86-interrupt" fn keyboard(_frame: InterruptStackFrame) {
    crate::drivers::keyboard::handle_irq();
    unsafe { pic::send_eoi(1) };
}

pub extern "x86-interrupt" fn syscall(_frame: InterruptStackFrame) {
    // The call number and first argument live in rax/rdi at entry; read them
    // before any further Rust code runs and could clobber either register,
    // mirroring `examples/original_source/src/arch/x64/idt.c`'s `syscallISR`.
    let num: u64;
    let arg1: u64;
    // SAFETY: reading general-purpose registers has no side effects, and
    // this is the first statement of the handler.
    unsafe {
        core::arch::asm!("mov {}, rax", out(reg) num, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {}, rdi", out(reg) arg1, options(nomem, nostack, preserves_flags));
    }
    crate::syscall::dispatch(num, arg1);
}

pub extern "x86-interrupt" fn test_interrupt(_frame: InterruptStackFrame) {
    crate::log::info(format_args!("test interrupt fired"));
}
