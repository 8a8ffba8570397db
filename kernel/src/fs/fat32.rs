//! FAT32 volume access over the ATA PIO driver.
//!
//! Mirrors the split kept throughout this kernel: [`kernel_core::fat32`]
//! parses bytes, this module supplies the bytes. The volume is addressed
//! directly from LBA 0 (no partition table): sector 0 is the BPB.

use kernel_core::config::{ATA_SECTOR_SIZE, ROOT_DIR_MAX_ENTRIES};
use kernel_core::error::{KernelError, KernelResult};
use kernel_core::fat32::{self, Bpb, DirEntry};

use crate::drivers::ata;
use crate::sync::{LazyLock, SpinLock};

static BPB: LazyLock<SpinLock<Option<Bpb>>> = LazyLock::new(|| SpinLock::new(None));

/// Reads sector 0 and parses the BPB, caching it for subsequent lookups.
pub fn mount() -> KernelResult<()> {
    let mut sector = [0u8; ATA_SECTOR_SIZE];
    // SAFETY: disk access is always permitted; no concurrent ATA caller
    // exists this early in boot.
    unsafe { ata::read_sector(0, &mut sector)? };
    let bpb = Bpb::parse(&sector)?;
    *BPB.lock() = Some(bpb);
    Ok(())
}

fn bpb() -> Bpb {
    BPB.lock().expect("fs::fat32::mount was not called")
}

/// Splits an ASCII filename like `HELLO` or `HELLO.TXT` into its padded
/// 8-byte name and 3-byte extension fields, per the 8.3 convention.
fn to_83(name: &str) -> ([u8; 8], [u8; 3]) {
    let mut base = [b' '; 8];
    let mut ext = [b' '; 3];
    let (stem, extension) = name.split_once('.').unwrap_or((name, ""));
    for (i, b) in stem.bytes().take(8).enumerate() {
        base[i] = b.to_ascii_uppercase();
    }
    for (i, b) in extension.bytes().take(3).enumerate() {
        ext[i] = b.to_ascii_uppercase();
    }
    (base, ext)
}

/// Reads one sector of a cluster's data through the ATA driver.
fn read_cluster_sector(bpb: &Bpb, cluster: u32, sector_in_cluster: u32) -> KernelResult<[u8; 512]> {
    let lba = bpb.sector_of_cluster(cluster) + sector_in_cluster;
    let mut sector = [0u8; 512];
    // SAFETY: see `mount`.
    unsafe { ata::read_sector(lba, &mut sector)? };
    Ok(sector)
}

/// Looks up `name` in the root directory's first sector, per the documented
/// "first sector only" cap (§4.6).
fn find_in_root(name: &str) -> KernelResult<DirEntry> {
    let bpb = bpb();
    let (name_field, ext_field) = to_83(name);

    let root_sector = read_cluster_sector(&bpb, bpb.root_cluster, 0)?;
    let list = fat32::parse_directory_sector(&root_sector);
    for entry in list.as_slice().iter().take(ROOT_DIR_MAX_ENTRIES) {
        if entry.name == name_field && entry.ext == ext_field {
            return Ok(*entry);
        }
    }
    Err(KernelError::NotFound)
}

/// Reads the FAT entry for `cluster`, fetching its containing FAT sector.
fn next_cluster(bpb: &Bpb, cluster: u32) -> KernelResult<u32> {
    let (fat_sector_index, offset_in_sector) = bpb.fat_entry_location(cluster);
    let mut sector = [0u8; 512];
    // SAFETY: see `mount`.
    unsafe { ata::read_sector(fat_sector_index, &mut sector)? };
    Ok(fat32::parse_fat_entry(&sector, offset_in_sector))
}

/// Finds `name` in the root directory and streams its cluster chain into
/// `buf`, stopping at `buf.len()` or the file's recorded size, whichever is
/// smaller. Returns the number of bytes written.
pub fn read_file(name: &str, buf: &mut [u8]) -> KernelResult<usize> {
    let bpb = bpb();
    let entry = find_in_root(name)?;

    let total = (entry.file_size as usize).min(buf.len());
    let mut written = 0usize;
    let mut cluster = entry.first_cluster;

    while written < total {
        if fat32::is_end_of_chain(cluster) {
            break;
        }
        let sectors_per_cluster = bpb.sectors_per_cluster as u32;
        for sector_in_cluster in 0..sectors_per_cluster {
            if written >= total {
                break;
            }
            let sector = read_cluster_sector(&bpb, cluster, sector_in_cluster)?;
            let remaining = total - written;
            let take = remaining.min(sector.len());
            buf[written..written + take].copy_from_slice(&sector[..take]);
            written += take;
        }
        if written >= total {
            break;
        }
        cluster = next_cluster(&bpb, cluster)?;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_83_pads_and_uppercases() {
        let (name, ext) = to_83("hello");
        assert_eq!(&name, b"HELLO   ");
        assert_eq!(&ext, b"   ");
    }

    #[test]
    fn to_83_splits_extension() {
        let (name, ext) = to_83("readme.txt");
        assert_eq!(&name, b"README  ");
        assert_eq!(&ext, b"TXT");
    }
}
