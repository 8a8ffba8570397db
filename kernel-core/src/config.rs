//! Compile-time configuration constants.
//!
//! A single place for the magic numbers that would otherwise be scattered
//! across the PMM, paging, IDT, ATA, and shell modules.

/// Lowest physical address the PMM will consider for its managed region,
/// keeping the allocator clear of the low ROM/BIOS area.
pub const PMM_MIN_BASE: u64 = 0x0010_0000;

/// Frame size used throughout the kernel. x86_64's smallest page size.
pub const FRAME_SIZE: u64 = 4096;

/// Size, in bytes, of the identity-mapped and higher-half windows built by
/// the paging initializer.
pub const EARLY_MAP_SIZE: u64 = 16 * 1024 * 1024;

/// Base virtual address of the higher-half direct-map window installed at
/// paging init, independent of the bootloader-reported HHDM offset.
pub const HIGHER_HALF_BASE: u64 = 0xFFFF_8000_0000_0000;

/// Master PIC vector base after remap.
pub const PIC_MASTER_VECTOR_BASE: u8 = 0x20;

/// Slave PIC vector base after remap.
pub const PIC_SLAVE_VECTOR_BASE: u8 = 0x28;

/// IDT vector used for the keyboard IRQ (IRQ1 remapped).
pub const VECTOR_KEYBOARD: u8 = 0x21;

/// IDT vector used for the syscall trap.
pub const VECTOR_SYSCALL: u8 = 0x80;

/// IDT vector used for the shell's test ISR.
pub const VECTOR_TEST: u8 = 0x81;

/// IDT vector used for the timer (IRQ0 remapped), same as the master PIC's
/// vector base.
pub const VECTOR_TIMER: u8 = PIC_MASTER_VECTOR_BASE;

/// Maximum number of directory entries read from the root directory's first
/// sector (§4.6 Known limitation: multi-sector roots are not walked).
pub const ROOT_DIR_MAX_ENTRIES: usize = 16;

/// Size of the buffer the shell's `exec` command reads a file into.
pub const EXEC_BUFFER_SIZE: usize = 4608;

/// Kernel version string printed by the shell's `info` command.
pub const KERNEL_VERSION: &str = "0.1.0";

/// Capacity of the shell's fixed input buffer.
pub const SHELL_BUFFER_CAPACITY: usize = 128;

/// I/O port base of the primary ATA bus.
pub const ATA_PRIMARY_IO_BASE: u16 = 0x1F0;

/// I/O port of the primary ATA bus's device control register.
pub const ATA_PRIMARY_CONTROL: u16 = 0x3F6;

/// Bytes per ATA sector.
pub const ATA_SECTOR_SIZE: usize = 512;

/// Highest canonical user-space address (bit 47 boundary minus one).
pub const USER_SPACE_TOP: u64 = 0x0000_7FFF_FFFF_FFFF;

/// Maximum bytes `copy_from_user` will copy, including the NUL terminator.
pub const MAX_USER_STRING: usize = 256;

/// Size of the dedicated double-fault handler stack.
pub const DOUBLE_FAULT_STACK_SIZE: usize = 16 * 1024;
