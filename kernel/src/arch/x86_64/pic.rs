//! 8259 PIC remap and IRQ masking.
//!
//! The original source's `maskIRQ`/`unmaskIRQ` wrote a single bit straight to
//! the command port, so masking one IRQ silently unmasked every other line on
//! the same PIC — a real bug, not a feature, once more than one IRQ is in use
//! (timer and keyboard both live on the master PIC). This port keeps the
//! original's register layout and remap sequence but tracks each PIC's mask
//! byte in software so `mask_irq`/`unmask_irq` only ever change the one bit
//! they name — see Open Question resolution 1.

use core::sync::atomic::{AtomicU8, Ordering};

use super::port::Port;
use kernel_core::config::{PIC_MASTER_VECTOR_BASE, PIC_SLAVE_VECTOR_BASE};

const MASTER_COMMAND: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_COMMAND: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const EOI: u8 = 0x20;

/// Cached mask bytes, since the 8259's data port is write-only once in
/// operating mode — there is no way to read back "what's currently masked".
static MASTER_MASK: AtomicU8 = AtomicU8::new(0xFF);
static SLAVE_MASK: AtomicU8 = AtomicU8::new(0xFF);

/// Remaps the PIC so IRQ0-7 land on vectors `PIC_MASTER_VECTOR_BASE..+8` and
/// IRQ8-15 on `PIC_SLAVE_VECTOR_BASE..+8`, then masks every IRQ.
///
/// # Safety
///
/// Must run once, early in boot, before interrupts are enabled.
pub unsafe fn remap() {
    let master_cmd = Port::<u8>::new(MASTER_COMMAND);
    let master_data = Port::<u8>::new(MASTER_DATA);
    let slave_cmd = Port::<u8>::new(SLAVE_COMMAND);
    let slave_data = Port::<u8>::new(SLAVE_DATA);

    unsafe {
        // ICW1: begin initialization.
        master_cmd.write(ICW1_INIT);
        slave_cmd.write(ICW1_INIT);

        // ICW2: vector offsets.
        master_data.write(PIC_MASTER_VECTOR_BASE);
        slave_data.write(PIC_SLAVE_VECTOR_BASE);

        // ICW3: master has a slave at IRQ2; slave's cascade identity is 2.
        master_data.write(0x04);
        slave_data.write(0x02);

        // ICW4: 8086 mode.
        master_data.write(ICW4_8086);
        slave_data.write(ICW4_8086);

        // Mask everything until drivers explicitly unmask their IRQ.
        master_data.write(0xFF);
        slave_data.write(0xFF);
    }
    MASTER_MASK.store(0xFF, Ordering::Relaxed);
    SLAVE_MASK.store(0xFF, Ordering::Relaxed);
}

/// Unmasks a single IRQ line, leaving every other line on the same PIC
/// exactly as it was.
///
/// # Safety
///
/// Must run after [`remap`].
pub unsafe fn unmask_irq(irq: u8) {
    let bit = 1 << (irq % 8);
    unsafe {
        if irq < 8 {
            let mask = MASTER_MASK.fetch_and(!bit, Ordering::Relaxed) & !bit;
            Port::<u8>::new(MASTER_DATA).write(mask);
        } else {
            let mask = SLAVE_MASK.fetch_and(!bit, Ordering::Relaxed) & !bit;
            Port::<u8>::new(SLAVE_DATA).write(mask);
        }
    }
}

/// Masks a single IRQ line, leaving every other line on the same PIC exactly
/// as it was.
///
/// # Safety
///
/// Must run after [`remap`].
pub unsafe fn mask_irq(irq: u8) {
    let bit = 1 << (irq % 8);
    unsafe {
        if irq < 8 {
            let mask = MASTER_MASK.fetch_or(bit, Ordering::Relaxed) | bit;
            Port::<u8>::new(MASTER_DATA).write(mask);
        } else {
            let mask = SLAVE_MASK.fetch_or(bit, Ordering::Relaxed) | bit;
            Port::<u8>::new(SLAVE_DATA).write(mask);
        }
    }
}

/// Sends an end-of-interrupt signal for `irq`, to both PICs if it came from
/// the slave.
///
/// # Safety
///
/// Must only be called from within the handler for `irq`.
pub unsafe fn send_eoi(irq: u8) {
    unsafe {
        if irq >= 8 {
            Port::<u8>::new(SLAVE_COMMAND).write(EOI);
        }
        Port::<u8>::new(MASTER_COMMAND).write(EOI);
    }
}
