//! x86_64-specific boot, segmentation, and interrupt plumbing.

pub mod gdt;
pub mod idt;
pub mod pic;
pub mod port;
pub mod segmentation;
