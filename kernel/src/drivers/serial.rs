//! UART 16550 serial driver.
//!
//! The serial port is the always-on debug channel (distinct from the
//! framebuffer terminal): [`init`] wires it in as both the early raw print
//! sink and, later, one of the leveled logger's fan-out sinks.

use core::fmt;

use crate::arch::x86_64::port::Port;

mod reg {
    pub const THR: u16 = 0;
    pub const RBR: u16 = 0;
    pub const DLL: u16 = 0;
    pub const IER: u16 = 1;
    pub const DLM: u16 = 1;
    pub const FCR: u16 = 2;
    pub const LCR: u16 = 3;
    pub const MCR: u16 = 4;
    pub const LSR: u16 = 5;
}

bitflags::bitflags! {
    /// Line Status Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Lsr: u8 {
        const DATA_READY = 1 << 0;
        const THR_EMPTY  = 1 << 5;
    }
}

/// Standard COM1 base I/O port address.
pub const COM1: u16 = 0x3F8;

const DIVISOR_115200: u16 = 1;
const EIGHT_N_ONE: u8 = 0b011;
const FIFO_ENABLE_CLEAR_14: u8 = 0b1100_0111;
const DTR_RTS_OUT2: u8 = 0b0000_1011;

/// A UART 16550 serial port identified by its base I/O address.
#[derive(Debug, Clone, Copy)]
pub struct Uart16550 {
    base: u16,
}

impl Uart16550 {
    /// Creates a handle. Does not touch hardware.
    #[must_use]
    pub const fn new(base: u16) -> Self {
        Self { base }
    }

    #[inline]
    const fn port(&self, offset: u16) -> Port<u8> {
        Port::new(self.base + offset)
    }

    /// Programs 115200 8N1 and enables the FIFO.
    ///
    /// # Safety
    ///
    /// Must be called once, before any concurrent access to this port.
    pub unsafe fn init(&self) {
        unsafe {
            self.port(reg::IER).write(0x00);
            self.port(reg::LCR).write(0x80); // DLAB
            self.port(reg::DLL).write(DIVISOR_115200 as u8);
            self.port(reg::DLM).write((DIVISOR_115200 >> 8) as u8);
            self.port(reg::LCR).write(EIGHT_N_ONE);
            self.port(reg::FCR).write(FIFO_ENABLE_CLEAR_14);
            self.port(reg::MCR).write(DTR_RTS_OUT2);
        }
    }

    fn line_status(&self) -> Lsr {
        // SAFETY: the LSR is always safe to read.
        unsafe { Lsr::from_bits_truncate(self.port(reg::LSR).read()) }
    }

    /// Writes one byte, busy-waiting until the transmit register is empty.
    pub fn write_byte(&self, byte: u8) {
        while !self.line_status().contains(Lsr::THR_EMPTY) {
            core::hint::spin_loop();
        }
        // SAFETY: THR_EMPTY was just confirmed.
        unsafe { self.port(reg::THR).write(byte) };
    }

    /// Non-blocking read: `Some(byte)` if data is waiting.
    #[must_use]
    pub fn try_read_byte(&self) -> Option<u8> {
        if self.line_status().contains(Lsr::DATA_READY) {
            // SAFETY: DATA_READY was just confirmed.
            Some(unsafe { self.port(reg::RBR).read() })
        } else {
            None
        }
    }
}

impl fmt::Write for Uart16550 {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

static COM1_PORT: Uart16550 = Uart16550::new(COM1);

fn print_over_serial(args: fmt::Arguments<'_>) {
    use fmt::Write;
    let mut port = COM1_PORT;
    let _ = port.write_fmt(args);
}

/// Initializes COM1 and installs it as the kernel's early print sink.
///
/// # Safety
///
/// Must run once, as the first step of boot.
pub unsafe fn init_early() {
    // SAFETY: called once, before any other port access.
    unsafe { COM1_PORT.init() };
    // SAFETY: `print_over_serial` is callable from any context (busy-wait only).
    unsafe { crate::log::set_print_fn(print_over_serial) };
}
