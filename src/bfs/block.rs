/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! On-disk format of the filesystem.
//!
//! A block is interpreted differently depending on its position on the
//! device: superblock, bitmap, inode table, pointer table or directory entry
//! table. Each structure decodes from and encodes to raw block bytes, in
//! little-endian byte order.

use std::mem::size_of;
use std::ptr;
use std::slice;

/// The size of a block in bytes.
pub const BLOCK_SIZE: usize = 4096;
/// Magic number identifying a formatted filesystem.
pub const MAGIC: u32 = 0xdeadbeef;
/// The size of an inode in bytes.
pub const INODE_SIZE: usize = 64;
/// The size of a directory entry in bytes.
pub const DIRECTORY_ENTRY_SIZE: usize = 32;
/// The number of inodes in an inode table block.
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// The number of block pointers in a pointer block.
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / size_of::<u32>();
/// The number of entries in a directory entry block.
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIRECTORY_ENTRY_SIZE;
/// The number of direct block pointers in an inode.
pub const DIRECT_PER_INODE: usize = 11;
/// The maximum length of a filename in bytes. Stored names are NUL-padded.
pub const MAX_FILENAME: usize = DIRECTORY_ENTRY_SIZE - size_of::<u32>();
/// The maximum size of a file in bytes.
pub const MAX_FILE_BYTES: usize = (DIRECT_PER_INODE + POINTERS_PER_BLOCK) * BLOCK_SIZE;
/// The minimum number of blocks a device must have to hold a filesystem.
pub const MIN_DISK_BLOCKS: usize = 16;

/// Reads a structure from the beginning of `buf`.
///
/// # Safety
///
/// `buf` must hold at least `size_of::<T>()` bytes and every bit pattern must
/// be a valid `T`.
unsafe fn decode_raw<T>(buf: &[u8]) -> T {
    debug_assert!(buf.len() >= size_of::<T>());
    unsafe { ptr::read_unaligned(buf.as_ptr() as *const T) }
}

/// Writes a structure to the beginning of `buf`.
fn encode_raw<T>(val: &T, buf: &mut [u8]) {
    let bytes = unsafe { slice::from_raw_parts(val as *const T as *const u8, size_of::<T>()) };
    buf[..bytes.len()].copy_from_slice(bytes);
}

/// The superblock, stored in block `0`.
#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
pub struct SuperBlock {
    /// Magic number identifying the filesystem.
    pub magic: u32,
    /// The number of data blocks.
    pub data_blocks: u32,
    /// The number of inode table blocks.
    pub inode_blocks: u32,
    /// The block number of the first inode table block.
    pub inode_offset: u32,
    /// The block number of the first data block.
    pub block_offset: u32,
}

impl SuperBlock {
    /// Decodes the superblock stored at the beginning of `buf`.
    pub fn decode(buf: &[u8]) -> Self {
        unsafe { decode_raw(buf) }
    }

    /// Encodes the superblock at the beginning of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        encode_raw(self, buf);
    }
}

/// An inode, stored in the inode table.
#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
pub struct Inode {
    /// Permission bits, plus the directory bit.
    pub mode: u16,
    /// The uid of the owner.
    pub uid: u16,
    /// The size of the file in bytes.
    pub size: u32,
    /// Creation timestamp, in seconds since the Unix epoch.
    pub creation_time: u32,
    /// Last modification timestamp, in seconds since the Unix epoch.
    pub modification_time: u32,
    /// Direct block pointers. `0` means the slot is unset.
    pub direct: [u32; DIRECT_PER_INODE],
    /// The block number of the pointer block, or `0` if unset.
    pub indirect: u32,
}

impl Inode {
    /// Decodes the inode stored at the beginning of `buf`.
    pub fn decode(buf: &[u8]) -> Self {
        unsafe { decode_raw(buf) }
    }

    /// Encodes the inode at the beginning of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        encode_raw(self, buf);
    }
}

/// A directory entry, binding a name to an inode index.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DirectoryEntry {
    /// The index of the inode the entry points to.
    pub inode: u32,
    /// The entry name, NUL-padded.
    pub filename: [u8; MAX_FILENAME],
}

impl DirectoryEntry {
    /// Creates an entry pointing to `inode` with the given name.
    ///
    /// `name` must be shorter than [`MAX_FILENAME`].
    pub fn new(inode: u32, name: &[u8]) -> Self {
        let mut filename = [0; MAX_FILENAME];
        filename[..name.len()].copy_from_slice(name);
        Self { inode, filename }
    }

    /// Decodes the entry stored at the beginning of `buf`.
    pub fn decode(buf: &[u8]) -> Self {
        unsafe { decode_raw(buf) }
    }

    /// Encodes the entry at the beginning of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        encode_raw(self, buf);
    }

    /// Returns the entry name, bounded at the first NUL byte.
    pub fn name(&self) -> Vec<u8> {
        // Copy out: the struct is packed, its fields cannot be borrowed
        let filename = self.filename;
        let len = filename.iter().position(|b| *b == 0).unwrap_or(MAX_FILENAME);
        filename[..len].to_vec()
    }
}

/// Iterates over the directory entries stored in `data`.
///
/// Trailing bytes that do not form a whole entry are ignored.
pub fn directory_entries(data: &[u8]) -> impl Iterator<Item = DirectoryEntry> + '_ {
    data.chunks_exact(DIRECTORY_ENTRY_SIZE)
        .map(DirectoryEntry::decode)
}

/// Decodes a pointer block into its table of block numbers.
pub fn decode_pointers(buf: &[u8; BLOCK_SIZE]) -> [u32; POINTERS_PER_BLOCK] {
    let mut table = [0; POINTERS_PER_BLOCK];
    for (i, ptr) in table.iter_mut().enumerate() {
        let off = i * size_of::<u32>();
        *ptr = u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
    }
    table
}

/// Encodes a pointer table into a raw block.
pub fn encode_pointers(table: &[u32; POINTERS_PER_BLOCK], buf: &mut [u8; BLOCK_SIZE]) {
    for (i, ptr) in table.iter().enumerate() {
        let off = i * size_of::<u32>();
        buf[off..off + size_of::<u32>()].copy_from_slice(&ptr.to_le_bytes());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_sizes() {
        assert_eq!(size_of::<SuperBlock>(), 20);
        assert_eq!(size_of::<Inode>(), INODE_SIZE);
        assert_eq!(size_of::<DirectoryEntry>(), DIRECTORY_ENTRY_SIZE);
        assert_eq!(MAX_FILE_BYTES, 4239360);
    }

    #[test]
    fn superblock_roundtrip() {
        let sb = SuperBlock {
            magic: MAGIC,
            data_blocks: 57,
            inode_blocks: 4,
            inode_offset: 3,
            block_offset: 7,
        };
        let mut buf = [0; BLOCK_SIZE];
        sb.encode(&mut buf);
        // Little-endian field order: magic first
        assert_eq!(&buf[..4], &[0xef, 0xbe, 0xad, 0xde]);
        let decoded = SuperBlock::decode(&buf);
        let magic = decoded.magic;
        let data_blocks = decoded.data_blocks;
        let inode_blocks = decoded.inode_blocks;
        let inode_offset = decoded.inode_offset;
        let block_offset = decoded.block_offset;
        assert_eq!(magic, MAGIC);
        assert_eq!(data_blocks, 57);
        assert_eq!(inode_blocks, 4);
        assert_eq!(inode_offset, 3);
        assert_eq!(block_offset, 7);
    }

    #[test]
    fn inode_roundtrip() {
        let mut direct = [0; DIRECT_PER_INODE];
        direct[0] = 7;
        direct[10] = 17;
        let inode = Inode {
            mode: 0o644,
            uid: 42,
            size: 12345,
            creation_time: 1000,
            modification_time: 2000,
            direct,
            indirect: 99,
        };
        let mut buf = [0xaa; INODE_SIZE];
        inode.encode(&mut buf);
        let decoded = Inode::decode(&buf);
        let mode = decoded.mode;
        let uid = decoded.uid;
        let size = decoded.size;
        let direct = decoded.direct;
        let indirect = decoded.indirect;
        assert_eq!(mode, 0o644);
        assert_eq!(uid, 42);
        assert_eq!(size, 12345);
        assert_eq!(direct[0], 7);
        assert_eq!(direct[10], 17);
        assert_eq!(indirect, 99);
    }

    #[test]
    fn entry_name_bounds() {
        let entry = DirectoryEntry::new(3, b"foo");
        let inode = entry.inode;
        assert_eq!(inode, 3);
        assert_eq!(entry.name(), b"foo");

        // A name filling all 28 bytes has no NUL terminator
        let full = [b'x'; MAX_FILENAME];
        let entry = DirectoryEntry::new(1, &full);
        assert_eq!(entry.name(), &full[..]);
        assert_ne!(entry.name(), b"x".as_slice());
    }

    #[test]
    fn entry_table() {
        let mut data = vec![0; 2 * DIRECTORY_ENTRY_SIZE];
        DirectoryEntry::new(0, b".").encode(&mut data[..DIRECTORY_ENTRY_SIZE]);
        DirectoryEntry::new(5, b"..").encode(&mut data[DIRECTORY_ENTRY_SIZE..]);
        let entries: Vec<_> = directory_entries(&data).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name(), b".");
        assert_eq!(entries[1].name(), b"..");
        let inodes: Vec<u32> = entries.iter().map(|e| e.inode).collect();
        assert_eq!(inodes, vec![0, 5]);
    }

    #[test]
    fn pointers_roundtrip() {
        let mut table = [0; POINTERS_PER_BLOCK];
        table[0] = 8;
        table[1023] = 0xdead;
        let mut buf = [0; BLOCK_SIZE];
        encode_pointers(&table, &mut buf);
        assert_eq!(&buf[..4], &[8, 0, 0, 0]);
        let decoded = decode_pointers(&buf);
        assert_eq!(decoded[0], 8);
        assert_eq!(decoded[1023], 0xdead);
        assert_eq!(decoded[2], 0);
    }
}
