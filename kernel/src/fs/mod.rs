//! Filesystem glue: drives [`kernel_core::fat32`]'s pure parsing over real
//! disk sectors read through [`crate::drivers::ata`].

pub mod fat32;
