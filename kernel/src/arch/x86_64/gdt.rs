//! Global Descriptor Table and Task State Segment.
//!
//! Only a kernel code/data segment pair plus a TSS carrying one IST entry for
//! the double-fault handler: loaded binaries run at kernel privilege (called
//! directly as functions, per the image loader's entry trampoline), so there
//! is no ring-3 segment pair and no per-syscall RSP0 switch to maintain.

use core::cell::UnsafeCell;
use core::mem::size_of;

use kernel_core::config::DOUBLE_FAULT_STACK_SIZE;

use crate::sync::LazyLock;

/// Bit positions and masks for x86_64 segment descriptors.
mod segment_bits {
    pub const SELECTOR_INDEX_SHIFT: u16 = 3;
    pub const RPL_MASK: u16 = 0b11;
    pub const DPL_SHIFT: u64 = 45;
    pub const DPL_MASK: u64 = 0b11;
}

/// A segment selector value for the GDT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SegmentSelector(u16);

impl SegmentSelector {
    /// Creates a new segment selector from a 0-based GDT index and RPL (0-3).
    #[inline]
    pub const fn new(index: u16, rpl: u16) -> Self {
        Self((index << segment_bits::SELECTOR_INDEX_SHIFT) | (rpl & segment_bits::RPL_MASK))
    }

    /// Returns the raw u16 value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Wraps a raw selector value read back from a segment register.
    #[inline]
    pub const fn from_raw(value: u16) -> Self {
        Self(value)
    }

    /// Returns the GDT index (bits 3..15).
    #[inline]
    pub const fn index(self) -> u16 {
        self.0 >> segment_bits::SELECTOR_INDEX_SHIFT
    }

    /// Returns the requested privilege level (bits 0..1).
    #[inline]
    pub const fn rpl(self) -> u16 {
        self.0 & segment_bits::RPL_MASK
    }
}

/// A GDT descriptor entry.
#[derive(Debug, Clone, Copy)]
pub enum Descriptor {
    /// A 64-bit user segment (code/data) or null descriptor.
    UserSegment(u64),
    /// A 128-bit system segment (TSS) — low and high halves.
    SystemSegment(u64, u64),
}

impl Descriptor {
    /// Creates a null descriptor.
    #[inline]
    pub const fn null() -> Self {
        Self::UserSegment(0)
    }

    /// 64-bit kernel code segment: L=1, D=0, P=1, DPL=0, execute/read.
    #[inline]
    pub const fn kernel_code_segment() -> Self {
        Self::UserSegment(0x00AF_9A00_0000_FFFF)
    }

    /// Kernel data segment: P=1, DPL=0, read/write.
    #[inline]
    pub const fn kernel_data_segment() -> Self {
        Self::UserSegment(0x00CF_9200_0000_FFFF)
    }

    const TSS_TYPE_AVAILABLE_64: u64 = 0x9;
    const TSS_PRESENT_BIT: u64 = 47;

    /// Builds a 128-bit TSS system segment descriptor from a static TSS.
    pub fn tss_segment(tss: &'static TaskStateSegment) -> Self {
        let tss_ptr = core::ptr::from_ref(tss) as u64;
        let limit = (size_of::<TaskStateSegment>() - 1) as u64;

        let low = (limit & 0xFFFF)
            | ((tss_ptr & 0xFFFFFF) << 16)
            | (Self::TSS_TYPE_AVAILABLE_64 << 40)
            | (1 << Self::TSS_PRESENT_BIT)
            | ((limit & 0xF0000) << 32)
            | ((tss_ptr & 0xFF000000) << 32);
        let high = (tss_ptr >> 32) & 0xFFFF_FFFF;

        Self::SystemSegment(low, high)
    }

    fn privilege_level(&self) -> u16 {
        let low = match self {
            Self::UserSegment(bits) | Self::SystemSegment(bits, _) => *bits,
        };
        ((low >> segment_bits::DPL_SHIFT) & segment_bits::DPL_MASK) as u16
    }
}

/// Pointer to the GDT/IDT, used by `lgdt`/`lidt`.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct DescriptorTablePointer {
    /// Size of the table minus one.
    pub limit: u16,
    /// Linear base address of the table.
    pub base: u64,
}

/// Global Descriptor Table: null + kernel code + kernel data + TSS (2 slots).
#[repr(C, align(16))]
pub struct GlobalDescriptorTable<const N: usize = 6> {
    table: [u64; N],
    len: usize,
}

impl<const N: usize> GlobalDescriptorTable<N> {
    /// Creates a new GDT with only a null descriptor in slot 0.
    pub const fn new() -> Self {
        Self {
            table: [0u64; N],
            len: 1,
        }
    }

    /// Appends a descriptor, returning its selector.
    ///
    /// # Panics
    ///
    /// Panics if the table has no room for the descriptor.
    pub fn append(&mut self, descriptor: Descriptor) -> SegmentSelector {
        let index = self.len;
        let rpl = descriptor.privilege_level();

        match descriptor {
            Descriptor::UserSegment(bits) => {
                assert!(index < N, "GDT full");
                self.table[index] = bits;
                self.len += 1;
            }
            Descriptor::SystemSegment(low, high) => {
                assert!(index + 1 < N, "GDT full (need 2 slots for system segment)");
                self.table[index] = low;
                self.table[index + 1] = high;
                self.len += 2;
            }
        }

        SegmentSelector::new(index as u16, rpl)
    }

    /// Loads this GDT via `lgdt`.
    ///
    /// # Safety
    ///
    /// The GDT must be `'static` and its descriptors valid. Segment
    /// registers must be reloaded after this call.
    #[inline]
    pub unsafe fn load(&'static self) {
        let ptr = DescriptorTablePointer {
            limit: (self.len * size_of::<u64>() - 1) as u16,
            base: self.table.as_ptr() as u64,
        };
        unsafe {
            core::arch::asm!(
                "lgdt [{}]",
                in(reg) &ptr,
                options(readonly, nostack, preserves_flags),
            );
        }
    }
}

/// Task State Segment for x86_64.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct TaskStateSegment {
    _reserved_0: u32,
    /// Privilege stack table (RSP values for ring 0-2).
    pub privilege_stack_table: [u64; 3],
    _reserved_1: u64,
    /// Interrupt stack table (IST1-IST7).
    pub interrupt_stack_table: [u64; 7],
    _reserved_2: u64,
    _reserved_3: u16,
    /// Offset from the TSS base to the I/O permission bitmap.
    pub iomap_base: u16,
}

impl TaskStateSegment {
    /// Creates a new zeroed TSS.
    pub const fn new() -> Self {
        Self {
            _reserved_0: 0,
            privilege_stack_table: [0; 3],
            _reserved_1: 0,
            interrupt_stack_table: [0; 7],
            _reserved_2: 0,
            _reserved_3: 0,
            iomap_base: 0,
        }
    }
}

/// IST index used for the double-fault handler (1-indexed, as the IDT wants it).
pub const DOUBLE_FAULT_IST_INDEX: u8 = 1;

#[repr(align(16))]
struct AlignedStack([u8; DOUBLE_FAULT_STACK_SIZE]);

static DOUBLE_FAULT_STACK: AlignedStack = AlignedStack([0; DOUBLE_FAULT_STACK_SIZE]);

/// `UnsafeCell<T>` wrapper that is `Sync`.
///
/// The TSS is only mutated with interrupts disabled (there is currently
/// nothing that mutates it after `init`, but the CPU itself reads it on every
/// interrupt, hence the escape from `&'static TaskStateSegment`).
#[repr(transparent)]
struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    const fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }

    fn get(&self) -> *mut T {
        self.0.get()
    }
}

static TSS: LazyLock<SyncUnsafeCell<TaskStateSegment>> = LazyLock::new(|| {
    let mut tss = TaskStateSegment::new();
    tss.interrupt_stack_table[(DOUBLE_FAULT_IST_INDEX - 1) as usize] = {
        let stack_start = core::ptr::addr_of!(DOUBLE_FAULT_STACK) as u64;
        stack_start + DOUBLE_FAULT_STACK_SIZE as u64
    };
    SyncUnsafeCell::new(tss)
});

/// Cached segment selectors from GDT initialization.
pub struct Selectors {
    /// Kernel code segment selector.
    pub kernel_code: SegmentSelector,
    /// Kernel data segment selector.
    pub kernel_data: SegmentSelector,
    /// TSS selector.
    pub tss: SegmentSelector,
}

static GDT: LazyLock<(GlobalDescriptorTable, Selectors)> = LazyLock::new(|| {
    let mut gdt = GlobalDescriptorTable::new();
    let kernel_code = gdt.append(Descriptor::kernel_code_segment());
    let kernel_data = gdt.append(Descriptor::kernel_data_segment());
    // SAFETY: the TSS closure above fully initializes the TSS before this
    // runs; we only read its address here.
    let tss = gdt.append(Descriptor::tss_segment(unsafe { &*TSS.get() }));
    (
        gdt,
        Selectors {
            kernel_code,
            kernel_data,
            tss,
        },
    )
});

/// Initializes the GDT, reloads segment registers, and loads the TSS.
///
/// # Safety
///
/// Must be called exactly once, early in boot, before interrupts are enabled.
pub unsafe fn init() {
    use super::segmentation::{load_ds, load_es, load_fs, load_gs, load_ss, load_tss, set_cs};

    let (gdt, selectors) = &*GDT;

    // SAFETY: the GDT above contains valid descriptors; the reloads below
    // match its layout (kernel_code in CS, kernel_data in DS/SS, null
    // elsewhere, TSS in TR).
    unsafe {
        gdt.load();
        set_cs(selectors.kernel_code);
        load_ds(selectors.kernel_data);
        load_ss(selectors.kernel_data);
        load_es(SegmentSelector::new(0, 0));
        load_fs(SegmentSelector::new(0, 0));
        load_gs(SegmentSelector::new(0, 0));
        load_tss(selectors.tss);
    }
}

/// Returns the cached segment selectors.
#[must_use]
pub fn selectors() -> &'static Selectors {
    &GDT.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_encoding() {
        let sel = SegmentSelector::new(1, 0);
        assert_eq!(sel.as_u16(), 0x08);
    }

    #[test]
    fn selector_from_raw_roundtrip() {
        let sel = SegmentSelector::new(4, 3);
        assert_eq!(SegmentSelector::from_raw(sel.as_u16()), sel);
    }

    #[test]
    fn selector_with_rpl() {
        let sel = SegmentSelector::new(2, 3);
        assert_eq!(sel.as_u16(), (2 << 3) | 3);
        assert_eq!(sel.index(), 2);
        assert_eq!(sel.rpl(), 3);
    }

    #[test]
    fn gdt_append_sequential() {
        let mut gdt = GlobalDescriptorTable::<6>::new();
        let kc = gdt.append(Descriptor::kernel_code_segment());
        let kd = gdt.append(Descriptor::kernel_data_segment());
        assert_eq!(kc.index(), 1);
        assert_eq!(kd.index(), 2);
    }

    #[test]
    fn kernel_code_segment_bits() {
        let desc = Descriptor::kernel_code_segment();
        let bits = match desc {
            Descriptor::UserSegment(b) => b,
            Descriptor::SystemSegment(..) => panic!("expected UserSegment"),
        };
        assert_ne!(bits & (1 << 47), 0, "present bit not set");
        assert_ne!(bits & (1 << 53), 0, "long mode bit not set");
        assert_eq!((bits >> 45) & 0b11, 0, "DPL should be 0");
    }

    #[test]
    #[should_panic(expected = "GDT full")]
    fn gdt_overflow_panics() {
        let mut gdt = GlobalDescriptorTable::<2>::new();
        gdt.append(Descriptor::kernel_code_segment());
        gdt.append(Descriptor::kernel_data_segment());
    }

    #[test]
    fn tss_zeroed() {
        let tss = TaskStateSegment::new();
        let pst = { tss.privilege_stack_table };
        let ist = { tss.interrupt_stack_table };
        assert_eq!(pst, [0; 3]);
        assert_eq!(ist, [0; 7]);
    }

    #[test]
    fn tss_size_104_bytes() {
        assert_eq!(size_of::<TaskStateSegment>(), 104);
    }
}
