//! ATA PIO disk driver.
//!
//! Targets the slave drive on the primary bus exclusively, matching the
//! disk image layout this kernel is built to boot from. All delays are the
//! conventional "write port 0x80" 400 ns settle trick rather than a
//! calibrated timer, since nothing here needs more precision than that.

use kernel_core::config::{ATA_PRIMARY_CONTROL, ATA_PRIMARY_IO_BASE, ATA_SECTOR_SIZE};
use kernel_core::error::{KernelError, KernelResult};

use crate::arch::x86_64::port::Port;

const DATA: u16 = ATA_PRIMARY_IO_BASE;
const ERROR: u16 = ATA_PRIMARY_IO_BASE + 1;
const SECTOR_COUNT: u16 = ATA_PRIMARY_IO_BASE + 2;
const LBA_LOW: u16 = ATA_PRIMARY_IO_BASE + 3;
const LBA_MID: u16 = ATA_PRIMARY_IO_BASE + 4;
const LBA_HIGH: u16 = ATA_PRIMARY_IO_BASE + 5;
const DRIVE_HEAD: u16 = ATA_PRIMARY_IO_BASE + 6;
const COMMAND: u16 = ATA_PRIMARY_IO_BASE + 7;
const STATUS: u16 = ATA_PRIMARY_IO_BASE + 7;
const ALT_STATUS_RESET: u16 = ATA_PRIMARY_CONTROL;

const CMD_READ_SECTORS: u8 = 0x20;
const CMD_WRITE_SECTORS: u8 = 0x30;
const CMD_CACHE_FLUSH: u8 = 0xE7;
const CMD_IDENTIFY: u8 = 0xEC;

const STATUS_ERR: u8 = 1 << 0;
const STATUS_DRQ: u8 = 1 << 3;
const STATUS_BSY: u8 = 1 << 7;

/// Named causes decoded from the ATA error register, in bit order.
const ERROR_CAUSES: [&str; 8] = [
    "AMNF - address mark not found",
    "TKZNF - track zero not found",
    "ABRT - aborted command",
    "MCR - media change request",
    "IDNF - ID not found",
    "MC - media changed",
    "UNC - uncorrectable data error",
    "BBK - bad block detected",
];

/// Writes to I/O port 0x80, a conventionally unused port whose access takes
/// long enough to serve as a ~400 ns settle delay between drive selection
/// and the next command.
fn wait_400ns() {
    let delay_port = Port::<u8>::new(0x80);
    // SAFETY: port 0x80 (POST code) is always safe to write, the value is
    // discarded by hardware.
    unsafe { delay_port.write(0) };
}

fn read_status() -> u8 {
    // SAFETY: the status port is always safe to read.
    unsafe { Port::<u8>::new(STATUS).read() }
}

/// Logs each error cause whose bit is set in the error register.
fn log_error_register() {
    // SAFETY: the error register is always safe to read.
    let reg = unsafe { Port::<u8>::new(ERROR).read() };
    for (bit, cause) in ERROR_CAUSES.iter().enumerate() {
        if reg & (1 << bit) != 0 {
            crate::log::debug(format_args!("ATA error: {cause}"));
        }
    }
}

/// Polls status, ignoring the first three reads (the OSDev "ignore 400ns of
/// garbage" quirk), until DRQ is set and BSY clears, or ERR sets.
fn poll_for_data() -> KernelResult<()> {
    for _ in 0..3 {
        read_status();
    }
    loop {
        let status = read_status();
        if status & STATUS_ERR != 0 {
            log_error_register();
            return Err(KernelError::Io);
        }
        if status & STATUS_DRQ != 0 && status & STATUS_BSY == 0 {
            return Ok(());
        }
    }
}

fn select_slave(lba: u32) {
    let select = 0xF0 | (1 << 4) | (((lba >> 24) & 0x0F) as u8);
    // SAFETY: selecting the slave drive and loading LBA/command registers is
    // the documented ATA PIO command sequence.
    unsafe {
        Port::<u8>::new(DRIVE_HEAD).write(select);
        wait_400ns();
        Port::<u8>::new(ERROR).write(0x00);
        Port::<u8>::new(SECTOR_COUNT).write(1);
        Port::<u8>::new(LBA_LOW).write(lba as u8);
        Port::<u8>::new(LBA_MID).write((lba >> 8) as u8);
        Port::<u8>::new(LBA_HIGH).write((lba >> 16) as u8);
    }
}

/// Reads 512 bytes from LBA `lba` on the primary bus's slave drive.
///
/// # Safety
///
/// Must be called with interrupts in a state where port I/O is permitted
/// (always true in this kernel, which has no ring-3 transition).
pub unsafe fn read_sector(lba: u32, buf: &mut [u8; ATA_SECTOR_SIZE]) -> KernelResult<()> {
    select_slave(lba);
    // SAFETY: command register write per the sequence above.
    unsafe { Port::<u8>::new(COMMAND).write(CMD_READ_SECTORS) };
    poll_for_data()?;

    let data = Port::<u16>::new(DATA);
    for word in buf.chunks_exact_mut(2) {
        // SAFETY: DRQ was confirmed set by `poll_for_data`.
        let value = unsafe { data.read() };
        word[0] = value as u8;
        word[1] = (value >> 8) as u8;
    }
    wait_400ns();
    log_error_register();
    Ok(())
}

/// Writes 512 bytes to LBA `lba` on the primary bus's slave drive, then
/// flushes the write cache.
///
/// # Safety
///
/// See [`read_sector`].
pub unsafe fn write_sector(lba: u32, buf: &[u8; ATA_SECTOR_SIZE]) -> KernelResult<()> {
    select_slave(lba);
    // SAFETY: command register write per the sequence above.
    unsafe { Port::<u8>::new(COMMAND).write(CMD_WRITE_SECTORS) };
    poll_for_data()?;

    let data = Port::<u16>::new(DATA);
    for word in buf.chunks_exact(2) {
        let value = u16::from(word[0]) | (u16::from(word[1]) << 8);
        // SAFETY: DRQ was confirmed set by `poll_for_data`.
        unsafe { data.write(value) };
    }
    wait_400ns();
    if poll_for_data().is_err() {
        log_error_register();
        return Err(KernelError::Io);
    }

    // SAFETY: flush follows a completed data transfer, per the protocol.
    unsafe { Port::<u8>::new(COMMAND).write(CMD_CACHE_FLUSH) };
    if poll_for_data().is_err() {
        log_error_register();
        return Err(KernelError::Io);
    }
    Ok(())
}

/// Probes the slave drive with IDENTIFY, returning `Ok(())` if it responds
/// as an ATA device.
///
/// # Safety
///
/// See [`read_sector`].
pub unsafe fn identify() -> KernelResult<()> {
    // SAFETY: the IDENTIFY sequence is the documented ATA PIO probe.
    unsafe {
        Port::<u8>::new(ALT_STATUS_RESET).write(0);
        Port::<u8>::new(DRIVE_HEAD).write(0xA0);
        Port::<u8>::new(SECTOR_COUNT).write(0);
        Port::<u8>::new(LBA_LOW).write(0);
        Port::<u8>::new(LBA_MID).write(0);
        Port::<u8>::new(LBA_HIGH).write(0);
        Port::<u8>::new(COMMAND).write(CMD_IDENTIFY);
    }

    // SAFETY: status port is always safe to read.
    if unsafe { Port::<u8>::new(STATUS).read() } == 0 {
        return Err(KernelError::Io);
    }

    loop {
        let status = read_status();
        if status & STATUS_BSY == 0 {
            break;
        }
    }

    let data = Port::<u16>::new(DATA);
    for _ in 0..256 {
        // SAFETY: the drive is ready to shift out its identify block.
        unsafe { data.read() };
    }
    Ok(())
}
