//! Interrupt Descriptor Table: a fixed 256-entry table of trap/interrupt
//! gates, installed once at boot per spec §4.3.

use core::mem::size_of;

use super::gdt::{DOUBLE_FAULT_IST_INDEX, DescriptorTablePointer, SegmentSelector};
use crate::sync::LazyLock;

/// Handler for an interrupt/exception without an error code.
pub type HandlerFunc = extern "x86-interrupt" fn(InterruptStackFrame);
/// Handler for an exception that pushes an error code.
pub type HandlerFuncWithErrCode = extern "x86-interrupt" fn(InterruptStackFrame, u64);
/// A handler that never returns (double fault).
pub type DivergingHandlerFuncWithErrCode = extern "x86-interrupt" fn(InterruptStackFrame, u64) -> !;
/// A handler that never returns and receives no error code (machine check).
pub type DivergingHandlerFunc = extern "x86-interrupt" fn(InterruptStackFrame) -> !;

/// The stack frame the CPU pushes before invoking a handler.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct InterruptStackFrame {
    /// Instruction pointer at the time of the interrupt.
    pub instruction_pointer: u64,
    /// Code segment selector.
    pub code_segment: u64,
    /// CPU flags (RFLAGS).
    pub cpu_flags: u64,
    /// Stack pointer at the time of the interrupt.
    pub stack_pointer: u64,
    /// Stack segment selector.
    pub stack_segment: u64,
}

/// Options stored in bits 32..47 of an IDT entry.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct EntryOptions(u16);

impl EntryOptions {
    const fn minimal() -> Self {
        // Type = 0xE (64-bit interrupt gate), present = 0.
        Self(0x0E00)
    }

    fn present() -> Self {
        let mut opts = Self::minimal();
        opts.set_present(true);
        opts
    }

    /// Sets the IST index (0 = none, 1-7 = IST1-IST7).
    pub fn set_ist_index(&mut self, index: u8) -> &mut Self {
        debug_assert!(index < 8);
        self.0 = (self.0 & !0x07) | u16::from(index & 0x07);
        self
    }

    fn set_present(&mut self, present: bool) -> &mut Self {
        if present {
            self.0 |= 1 << 15;
        } else {
            self.0 &= !(1 << 15);
        }
        self
    }
}

/// A single 16-byte IDT entry.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct IdtEntry {
    offset_low: u16,
    segment_selector: u16,
    options: EntryOptions,
    offset_mid: u16,
    offset_high: u32,
    _reserved: u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            segment_selector: 0,
            options: EntryOptions::minimal(),
            offset_mid: 0,
            offset_high: 0,
            _reserved: 0,
        }
    }

    fn set_handler_addr(&mut self, addr: u64, code_selector: SegmentSelector) -> &mut EntryOptions {
        self.offset_low = addr as u16;
        self.offset_mid = (addr >> 16) as u16;
        self.offset_high = (addr >> 32) as u32;
        self.segment_selector = code_selector.as_u16();
        self.options = EntryOptions::present();
        &mut self.options
    }

    /// Installs a handler with no error code.
    pub fn set_handler(&mut self, handler: HandlerFunc, cs: SegmentSelector) -> &mut EntryOptions {
        self.set_handler_addr(handler as u64, cs)
    }

    /// Installs a handler that receives a CPU-pushed error code.
    pub fn set_handler_with_err_code(
        &mut self,
        handler: HandlerFuncWithErrCode,
        cs: SegmentSelector,
    ) -> &mut EntryOptions {
        self.set_handler_addr(handler as u64, cs)
    }

    /// Installs a diverging handler with an error code (double fault).
    pub fn set_diverging_with_err_code(
        &mut self,
        handler: DivergingHandlerFuncWithErrCode,
        cs: SegmentSelector,
    ) -> &mut EntryOptions {
        self.set_handler_addr(handler as u64, cs)
    }

    /// Installs a diverging handler with no error code (machine check).
    pub fn set_diverging(&mut self, handler: DivergingHandlerFunc, cs: SegmentSelector) -> &mut EntryOptions {
        self.set_handler_addr(handler as u64, cs)
    }
}

/// The 256-entry Interrupt Descriptor Table.
#[repr(C, align(16))]
pub struct InterruptDescriptorTable {
    entries: [IdtEntry; 256],
}

impl InterruptDescriptorTable {
    /// Creates a table with every entry marked not-present.
    pub const fn new() -> Self {
        Self {
            entries: [IdtEntry::missing(); 256],
        }
    }

    /// Returns a mutable reference to the entry for `vector`.
    pub fn entry_mut(&mut self, vector: u8) -> &mut IdtEntry {
        &mut self.entries[vector as usize]
    }

    /// Loads this table via `lidt`.
    ///
    /// # Safety
    ///
    /// The table must be `'static` and every installed handler valid.
    pub unsafe fn load(&'static self) {
        let ptr = DescriptorTablePointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: core::ptr::from_ref(self) as u64,
        };
        unsafe {
            core::arch::asm!(
                "lidt [{}]",
                in(reg) &ptr,
                options(readonly, nostack, preserves_flags),
            );
        }
    }
}

impl Clone for IdtEntry {
    fn clone(&self) -> Self {
        *self
    }
}
impl Copy for IdtEntry {}

/// Interrupt vectors named by spec §4.3 and the ambient stack (§10.2).
pub mod vector {
    /// `#DE` divide error.
    pub const DIVIDE_ERROR: u8 = 0;
    /// `#DB` debug.
    pub const DEBUG: u8 = 1;
    /// Non-maskable interrupt.
    pub const NMI: u8 = 2;
    /// `#BP` breakpoint (DPL=3 in a kernel with ring-3, kept at DPL=0 here).
    pub const BREAKPOINT: u8 = 3;
    /// `#OF` overflow.
    pub const OVERFLOW: u8 = 4;
    /// `#BR` bound range exceeded.
    pub const BOUND_RANGE: u8 = 5;
    /// `#UD` invalid opcode.
    pub const INVALID_OPCODE: u8 = 6;
    /// `#NM` device not available.
    pub const DEVICE_NOT_AVAILABLE: u8 = 7;
    /// `#DF` double fault, routed to the dedicated IST stack.
    pub const DOUBLE_FAULT: u8 = 8;
    /// `#TS` invalid TSS.
    pub const INVALID_TSS: u8 = 10;
    /// `#NP` segment not present.
    pub const SEGMENT_NOT_PRESENT: u8 = 11;
    /// `#SS` stack-segment fault.
    pub const STACK_SEGMENT_FAULT: u8 = 12;
    /// `#GP` general protection fault.
    pub const GENERAL_PROTECTION: u8 = 13;
    /// `#PF` page fault.
    pub const PAGE_FAULT: u8 = 14;
    /// `#MF` x87 floating point.
    pub const X87_FLOATING_POINT: u8 = 16;
    /// `#AC` alignment check.
    pub const ALIGNMENT_CHECK: u8 = 17;
    /// `#MC` machine check.
    pub const MACHINE_CHECK: u8 = 18;
    /// `#XM` SIMD floating point.
    pub const SIMD_FLOATING_POINT: u8 = 19;
    /// `#VE` virtualization exception.
    pub const VIRTUALIZATION: u8 = 20;
}

use crate::handlers;

static IDT: LazyLock<InterruptDescriptorTable> = LazyLock::new(|| {
    let mut idt = InterruptDescriptorTable::new();
    let cs = super::gdt::selectors().kernel_code;

    idt.entry_mut(vector::DIVIDE_ERROR)
        .set_handler(handlers::divide_error, cs);
    idt.entry_mut(vector::DEBUG).set_handler(handlers::debug, cs);
    idt.entry_mut(vector::NMI).set_handler(handlers::nmi, cs);
    idt.entry_mut(vector::BREAKPOINT)
        .set_handler(handlers::breakpoint, cs);
    idt.entry_mut(vector::OVERFLOW)
        .set_handler(handlers::overflow, cs);
    idt.entry_mut(vector::BOUND_RANGE)
        .set_handler(handlers::bound_range, cs);
    idt.entry_mut(vector::INVALID_OPCODE)
        .set_handler(handlers::invalid_opcode, cs);
    idt.entry_mut(vector::DEVICE_NOT_AVAILABLE)
        .set_handler(handlers::device_not_available, cs);
    idt.entry_mut(vector::DOUBLE_FAULT)
        .set_diverging_with_err_code(handlers::double_fault, cs)
        .set_ist_index(DOUBLE_FAULT_IST_INDEX);
    idt.entry_mut(vector::INVALID_TSS)
        .set_handler_with_err_code(handlers::invalid_tss, cs);
    idt.entry_mut(vector::SEGMENT_NOT_PRESENT)
        .set_handler_with_err_code(handlers::segment_not_present, cs);
    idt.entry_mut(vector::STACK_SEGMENT_FAULT)
        .set_handler_with_err_code(handlers::stack_segment_fault, cs);
    idt.entry_mut(vector::GENERAL_PROTECTION)
        .set_handler_with_err_code(handlers::general_protection, cs);
    idt.entry_mut(vector::PAGE_FAULT)
        .set_handler_with_err_code(handlers::page_fault, cs);
    idt.entry_mut(vector::X87_FLOATING_POINT)
        .set_handler(handlers::x87_floating_point, cs);
    idt.entry_mut(vector::ALIGNMENT_CHECK)
        .set_handler_with_err_code(handlers::alignment_check, cs);
    idt.entry_mut(vector::MACHINE_CHECK)
        .set_diverging(handlers::machine_check, cs);
    idt.entry_mut(vector::SIMD_FLOATING_POINT)
        .set_handler(handlers::simd_floating_point, cs);
    idt.entry_mut(vector::VIRTUALIZATION)
        .set_handler(handlers::virtualization, cs);

    idt.entry_mut(kernel_core::config::VECTOR_TIMER)
        .set_handler(handlers::timer, cs);
    idt.entry_mut(kernel_core::config::VECTOR_KEYBOARD)
        .set_handler(handlers::keyboard, cs);
    idt.entry_mut(kernel_core::config::VECTOR_SYSCALL)
        .set_handler(handlers::syscall, cs);
    idt.entry_mut(kernel_core::config::VECTOR_TEST)
        .set_handler(handlers::test_interrupt, cs);

    idt
});

/// Loads the IDT into the CPU.
///
/// # Safety
///
/// Must be called after [`super::gdt::init`] (CS must already be valid).
pub unsafe fn init() {
    unsafe { IDT.load() };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entry_not_present() {
        let idt = InterruptDescriptorTable::new();
        assert_eq!(idt.entries[0].options.0 & (1 << 15), 0);
    }

    #[test]
    fn entry_options_ist_index_masked() {
        let mut opts = EntryOptions::present();
        opts.set_ist_index(9);
        assert_eq!(opts.0 & 0x07, 1); // 9 & 0x07 == 1
    }

    #[test]
    fn table_size_is_4096_bytes() {
        assert_eq!(size_of::<InterruptDescriptorTable>(), 256 * 16);
    }
}
