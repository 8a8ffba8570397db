//! Memory management: the higher-half direct map, the physical frame
//! allocator, and the page table builder, bootstrapped in that order per
//! the cycle noted in the design notes — the allocator needs only HHDM
//! reads/writes, and paging needs both the allocator and HHDM.

pub mod hhdm;
pub mod paging;
pub mod pmm;
