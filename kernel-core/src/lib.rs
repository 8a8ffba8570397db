//! Pure, hardware-independent logic shared by the kernel binary.
//!
//! Every module in this crate is a data transformation: address arithmetic,
//! bitmap index math, FAT32/ELF64 record parsing. None of it touches a port,
//! a page table, or a `static`, so all of it runs and is tested on the host
//! without a `no_std` target.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod addr;
pub mod config;
pub mod elf;
pub mod error;
pub mod fat32;
pub mod pmm;
pub mod syscall;
