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

//! The filesystem engine.
//!
//! Layout of a formatted device, in blocks:
//!
//! ```text
//! [SuperBlock] [InodeBitMap] [BlockBitMap] [InodeBlock .. InodeBlock] [DataBlock .. DataBlock]
//!      0             1             2           3 .. 3+inodeBlocks            the rest
//! ```
//!
//! The superblock and both bitmaps are mirrored in memory. Every bit toggle
//! writes the whole bitmap block back to the device, so bitmaps and the
//! inode/data regions stay consistent block by block. There is no write
//! cache and no journal: a crash in the middle of an operation can strand
//! blocks or inodes, which a later format clears.

use crate::bitmap::Bitmap;
use crate::block::BLOCK_SIZE;
use crate::block::DIRECTORY_ENTRY_SIZE;
use crate::block::DirectoryEntry;
use crate::block::INODE_SIZE;
use crate::block::INODES_PER_BLOCK;
use crate::block::Inode;
use crate::block::MAGIC;
use crate::block::MAX_FILE_BYTES;
use crate::block::MAX_FILENAME;
use crate::block::MIN_DISK_BLOCKS;
use crate::block::SuperBlock;
use crate::block::decode_pointers;
use crate::block::directory_entries;
use crate::block::encode_pointers;
use crate::disk::Disk;
use crate::error::Error;
use crate::perm;
use crate::util::get_timestamp;

/// Metadata of a file, as returned by [`FileSystem::stat_file`] and
/// [`FileSystem::list_directory`].
#[derive(Clone, Copy)]
pub struct Stat {
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
}

impl From<Inode> for Stat {
    fn from(inode: Inode) -> Self {
        Self {
            mode: inode.mode,
            uid: inode.uid,
            size: inode.size,
            creation_time: inode.creation_time,
            modification_time: inode.modification_time,
        }
    }
}

/// The filesystem engine, owning the underlying block device.
///
/// Paths use `/` as separator. A leading `/` resolves from the root
/// directory, anything else from the working directory; empty components are
/// dropped. A trailing `/` asserts the target is a directory.
pub struct FileSystem {
    /// The underlying block device.
    disk: Disk,
    /// In-memory mirror of the superblock.
    super_block: SuperBlock,
    /// In-memory mirror of the inode bitmap (block `1`).
    inode_map: Bitmap,
    /// In-memory mirror of the data-block bitmap (block `2`).
    block_map: Bitmap,
    /// The inode index of the working directory.
    current_inode: usize,
    /// The uid the session operates under.
    uid: u16,
}

impl FileSystem {
    /// Creates a filesystem over `disk`.
    ///
    /// The superblock is computed from the device size; [`Self::mount`]
    /// replaces it with the on-disk one.
    pub fn new(disk: Disk) -> Result<Self, Error> {
        if disk.size() < MIN_DISK_BLOCKS {
            return Err(Error::DiskTooSmall);
        }
        let inode_blocks = (disk.size() / 16) as u32;
        let super_block = SuperBlock {
            magic: MAGIC,
            data_blocks: disk.size() as u32 - inode_blocks - 3,
            inode_blocks,
            inode_offset: 3,
            block_offset: inode_blocks + 3,
        };
        Ok(Self {
            disk,
            super_block,
            inode_map: Bitmap::all_free(),
            block_map: Bitmap::all_free(),
            current_inode: 0,
            uid: 0,
        })
    }

    /// Writes a fresh filesystem to the device and mounts it.
    ///
    /// Requires uid `0`. Every block is overwritten; the root directory ends
    /// up as inode `0` with mode `0o1777`, its `..` pointing to itself.
    pub fn format(&mut self) -> Result<(), Error> {
        if self.uid != 0 {
            return Err(Error::PermissionDenied(
                "formatting can only be performed by root (uid 0)",
            ));
        }
        let mut block = [0; BLOCK_SIZE];
        self.super_block.encode(&mut block);
        self.disk.write(0, &block)?;
        let ones = [0xff; BLOCK_SIZE];
        self.disk.write(1, &ones)?;
        self.disk.write(2, &ones)?;
        self.inode_map = Bitmap::all_free();
        self.block_map = Bitmap::all_free();
        let empty = [0; BLOCK_SIZE];
        for i in 3..self.disk.size() {
            self.disk.write(i, &empty)?;
        }
        if !self.disk.mounted() {
            self.disk.mount()?;
        }
        self.current_inode = 0;
        let root = self.create_inode(perm::ALL_DIR)?;
        if root != 0 {
            return Err(Error::BadRootIndex(root));
        }
        self.init_directory(root, root)
    }

    /// Mounts the filesystem found on the device.
    ///
    /// Loads the superblock and both bitmaps into memory. Fails if the
    /// superblock does not carry the magic number.
    pub fn mount(&mut self) -> Result<(), Error> {
        let mut block = [0; BLOCK_SIZE];
        self.disk.read(0, &mut block)?;
        let super_block = SuperBlock::decode(&block);
        if super_block.magic != MAGIC {
            return Err(Error::BadMagic);
        }
        self.disk.mount()?;
        self.super_block = super_block;
        self.disk.read(1, &mut block)?;
        self.inode_map = Bitmap::from_block(&block);
        self.disk.read(2, &mut block)?;
        self.block_map = Bitmap::from_block(&block);
        Ok(())
    }

    /// Sets the uid the session operates under.
    pub fn set_uid(&mut self, uid: u16) {
        self.uid = uid;
    }

    /// Toggles an inode bitmap bit and flushes the bitmap block.
    fn set_inode_map(&mut self, index: usize, free: bool) -> Result<(), Error> {
        self.inode_map.set(index, free);
        self.disk.write(1, self.inode_map.as_block())
    }

    /// Toggles a data-block bitmap bit and flushes the bitmap block.
    fn set_block_map(&mut self, index: usize, free: bool) -> Result<(), Error> {
        self.block_map.set(index, free);
        self.disk.write(2, self.block_map.as_block())
    }

    /// Returns the block number and slot of inode `index`.
    fn inode_location(&self, index: usize) -> (usize, usize) {
        let number = index / INODES_PER_BLOCK + self.super_block.inode_offset as usize;
        let offset = index % INODES_PER_BLOCK;
        (number, offset)
    }

    /// Returns the absolute block number of data-bitmap slot `index`.
    fn block_location(&self, index: usize) -> usize {
        index + self.super_block.block_offset as usize
    }

    /// Returns the data-bitmap slot of absolute block number `location`.
    fn block_map_index(&self, location: usize) -> usize {
        location - self.super_block.block_offset as usize
    }

    fn check_inode(&self, index: usize, should_be_used: bool) -> Result<(), Error> {
        if !self.disk.mounted() {
            return Err(Error::NotMounted);
        }
        if index >= self.super_block.inode_blocks as usize * INODES_PER_BLOCK {
            return Err(Error::NoFreeInode);
        }
        if should_be_used && self.inode_map.is_free(index) {
            return Err(Error::InvalidInode(index));
        }
        Ok(())
    }

    fn check_block(&self, index: usize) -> Result<(), Error> {
        if !self.disk.mounted() {
            return Err(Error::NotMounted);
        }
        if index >= self.super_block.data_blocks as usize {
            return Err(Error::NoFreeBlock);
        }
        Ok(())
    }

    /// Reads the inode at `index` from the inode table.
    fn get_inode(&mut self, index: usize) -> Result<Inode, Error> {
        self.check_inode(index, true)?;
        let (number, offset) = self.inode_location(index);
        let mut block = [0; BLOCK_SIZE];
        self.disk.read(number, &mut block)?;
        Ok(Inode::decode(&block[offset * INODE_SIZE..]))
    }

    /// Writes `inode` to slot `index` of the inode table.
    fn set_inode(&mut self, index: usize, inode: &Inode) -> Result<(), Error> {
        self.check_inode(index, true)?;
        let (number, offset) = self.inode_location(index);
        let mut block = [0; BLOCK_SIZE];
        self.disk.read(number, &mut block)?;
        inode.encode(&mut block[offset * INODE_SIZE..]);
        self.disk.write(number, &block)
    }

    /// Allocates the lowest free inode with the given mode, owned by the
    /// session uid.
    fn create_inode(&mut self, mode: u16) -> Result<usize, Error> {
        let index = self.inode_map.first_free().ok_or(Error::NoFreeInode)?;
        self.check_inode(index, false)?;
        self.set_inode_map(index, false)?;
        let now = get_timestamp();
        let inode = Inode {
            mode,
            uid: self.uid,
            size: 0,
            creation_time: now,
            modification_time: now,
            ..Default::default()
        };
        self.set_inode(index, &inode)?;
        Ok(index)
    }

    /// Frees inode `index` along with every data block it references.
    ///
    /// Pointer walks stop at the first zero or already-free entry: data
    /// blocks are always filled densely from the front, so nothing lives
    /// past that point. Freed blocks and the inode slot are zeroed on disk.
    fn remove_inode(&mut self, index: usize) -> Result<(), Error> {
        self.check_inode(index, true)?;
        let empty = [0; BLOCK_SIZE];
        let inode = self.get_inode(index)?;
        let mut direct_filled = true;
        for location in inode.direct {
            let location = location as usize;
            if location == 0 || self.block_map.is_free(self.block_map_index(location)) {
                direct_filled = false;
                break;
            }
            self.set_block_map(self.block_map_index(location), true)?;
            self.disk.write(location, &empty)?;
        }
        if direct_filled && inode.indirect != 0 {
            let mut block = [0; BLOCK_SIZE];
            self.disk.read(inode.indirect as usize, &mut block)?;
            for location in decode_pointers(&block) {
                let location = location as usize;
                if location == 0 || self.block_map.is_free(self.block_map_index(location)) {
                    break;
                }
                self.set_block_map(self.block_map_index(location), true)?;
                self.disk.write(location, &empty)?;
            }
            self.set_block_map(self.block_map_index(inode.indirect as usize), true)?;
            self.disk.write(inode.indirect as usize, &empty)?;
        }
        self.set_inode(index, &Inode::default())?;
        self.set_inode_map(index, true)
    }

    /// Reads the whole content of inode `index`.
    ///
    /// The caller needs the read bit matching its uid (owner or other).
    fn read_inode(&mut self, index: usize) -> Result<Vec<u8>, Error> {
        self.check_inode(index, true)?;
        let inode = self.get_inode(index)?;
        if !perm::allows(inode.mode, inode.uid, self.uid, perm::OWN_R, perm::OTH_R) {
            return Err(Error::PermissionDenied("the file is not readable"));
        }
        let mut res = Vec::new();
        let mut buf = [0; BLOCK_SIZE];
        let mut direct_filled = true;
        for location in inode.direct {
            let location = location as usize;
            if location == 0 || self.block_map.is_free(self.block_map_index(location)) {
                direct_filled = false;
                break;
            }
            self.disk.read(location, &mut buf)?;
            res.extend_from_slice(&buf);
        }
        if direct_filled && inode.indirect != 0 {
            let mut block = [0; BLOCK_SIZE];
            self.disk.read(inode.indirect as usize, &mut block)?;
            for location in decode_pointers(&block) {
                let location = location as usize;
                if location == 0 || self.block_map.is_free(self.block_map_index(location)) {
                    break;
                }
                self.disk.read(location, &mut buf)?;
                res.extend_from_slice(&buf);
            }
        }
        res.resize(inode.size as usize, 0);
        Ok(res)
    }

    /// Rewrites the whole content of inode `index` with `src`.
    ///
    /// Blocks are allocated lazily, direct slots first, then through the
    /// indirect pointer block. Rewriting a file smaller does not release
    /// its tail blocks; the truncated `size` hides them.
    fn write_inode(&mut self, index: usize, src: &[u8]) -> Result<(), Error> {
        self.check_inode(index, true)?;
        if src.len() >= MAX_FILE_BYTES {
            return Err(Error::FileTooLarge);
        }
        let mut inode = self.get_inode(index)?;
        if !perm::allows(inode.mode, inode.uid, self.uid, perm::OWN_W, perm::OTH_W) {
            return Err(Error::PermissionDenied("the file is not writable"));
        }
        // Work on a copy: the inode struct is packed, its fields cannot be
        // borrowed
        let mut direct = inode.direct;
        let offset = self.write_blocks(src, &mut direct, 0)?;
        inode.direct = direct;
        if offset < src.len() {
            let mut block = [0; BLOCK_SIZE];
            if inode.indirect == 0 {
                let map_index = self.block_map.first_free().ok_or(Error::NoFreeBlock)?;
                self.check_block(map_index)?;
                let location = self.block_location(map_index);
                self.set_block_map(map_index, false)?;
                inode.indirect = location as u32;
            } else {
                self.disk.read(inode.indirect as usize, &mut block)?;
            }
            let mut pointers = decode_pointers(&block);
            self.write_blocks(src, &mut pointers, offset)?;
            encode_pointers(&pointers, &mut block);
            self.disk.write(inode.indirect as usize, &block)?;
        }
        inode.size = src.len() as u32;
        inode.modification_time = get_timestamp();
        self.set_inode(index, &inode)
    }

    /// Writes `src` starting at `offset` into the blocks referenced by
    /// `slots`, allocating the lowest free data block for each unset slot.
    ///
    /// The final block keeps the trailing bytes of its previous content
    /// where not overwritten. Returns the offset reached.
    fn write_blocks(
        &mut self,
        src: &[u8],
        slots: &mut [u32],
        mut offset: usize,
    ) -> Result<usize, Error> {
        for slot in slots {
            if offset >= src.len() {
                break;
            }
            let length = usize::min(BLOCK_SIZE, src.len() - offset);
            let mut buf = [0; BLOCK_SIZE];
            if *slot == 0 {
                let map_index = self.block_map.first_free().ok_or(Error::NoFreeBlock)?;
                self.check_block(map_index)?;
                *slot = self.block_location(map_index) as u32;
                self.set_block_map(map_index, false)?;
            } else {
                self.disk.read(*slot as usize, &mut buf)?;
            }
            buf[..length].copy_from_slice(&src[offset..offset + length]);
            self.disk.write(*slot as usize, &buf)?;
            offset += BLOCK_SIZE;
        }
        Ok(offset)
    }

    /// Writes the initial `.` and `..` entries of a fresh directory.
    fn init_directory(&mut self, index: usize, parent: usize) -> Result<(), Error> {
        let mut data = [0; 2 * DIRECTORY_ENTRY_SIZE];
        DirectoryEntry::new(index as u32, b".").encode(&mut data[..DIRECTORY_ENTRY_SIZE]);
        DirectoryEntry::new(parent as u32, b"..").encode(&mut data[DIRECTORY_ENTRY_SIZE..]);
        self.write_inode(index, &data)
    }

    /// Resolves `path` to an inode index, walking directory entries
    /// component by component.
    fn locate_file(&mut self, path: &str) -> Result<usize, Error> {
        let mut current = if path.starts_with('/') {
            0
        } else {
            self.current_inode
        };
        for part in path.split('/') {
            if part.is_empty() {
                continue;
            }
            let data = self.read_inode(current)?;
            let entry = directory_entries(&data).find(|e| e.name() == part.as_bytes());
            let Some(entry) = entry else {
                return Err(Error::DoesNotExist(part.to_owned()));
            };
            current = entry.inode as usize;
        }
        Ok(current)
    }

    /// Resolves the parent directory of `path`.
    ///
    /// A path without separator resolves to the working directory.
    fn locate_parent(&mut self, path: &str) -> Result<usize, Error> {
        let path = path.strip_suffix('/').unwrap_or(path);
        let Some(last_slash) = path.rfind('/') else {
            return Ok(self.current_inode);
        };
        let parent_path = &path[..last_slash + 1];
        let index = self.locate_file(parent_path)?;
        let inode = self.get_inode(index)?;
        if !perm::is_directory(inode.mode) {
            return Err(Error::NotADirectory(parent_path.to_owned()));
        }
        Ok(index)
    }

    /// Creates a file, or a directory if `path` ends with `/`.
    ///
    /// New files get mode `0o644`, new directories `0o1644`, owned by the
    /// session uid.
    pub fn create_file(&mut self, path: &str) -> Result<(), Error> {
        if path == "/" {
            return Err(Error::AlreadyExists("/".to_owned()));
        }
        let is_directory = path.ends_with('/');
        let filename = path
            .split('/')
            .filter(|part| !part.is_empty())
            .next_back()
            .ok_or(Error::BadFilename)?;
        if filename.len() >= MAX_FILENAME {
            return Err(Error::BadFilename);
        }
        let parent = self.locate_parent(path)?;
        let mut data = self.read_inode(parent)?;
        if directory_entries(&data).any(|e| e.name() == filename.as_bytes()) {
            return Err(Error::AlreadyExists(filename.to_owned()));
        }
        let mode = if is_directory {
            perm::DIR | perm::DEFAULT_MODE
        } else {
            perm::DEFAULT_MODE
        };
        let index = self.create_inode(mode)?;
        let mut entry = [0; DIRECTORY_ENTRY_SIZE];
        DirectoryEntry::new(index as u32, filename.as_bytes()).encode(&mut entry);
        data.extend_from_slice(&entry);
        if is_directory {
            self.init_directory(index, parent)?;
        }
        self.write_inode(parent, &data)
    }

    /// Removes the file or directory at `path`.
    ///
    /// Only the owner may remove a file. Removing a directory frees its
    /// whole subtree, `.` and `..` excluded from the walk.
    pub fn remove_file(&mut self, path: &str) -> Result<(), Error> {
        let index = self.locate_file(path)?;
        if index == 0 {
            return Err(Error::RootProtected("removing"));
        }
        let inode = self.get_inode(index)?;
        if inode.uid != self.uid {
            return Err(Error::PermissionDenied(
                "a file can only be removed by its owner",
            ));
        }
        let parent = self.locate_parent(path)?;
        let mut data = self.read_inode(parent)?;
        let pos = directory_entries(&data).position(|e| e.inode as usize == index);
        if let Some(i) = pos {
            data.drain(i * DIRECTORY_ENTRY_SIZE..(i + 1) * DIRECTORY_ENTRY_SIZE);
        }
        self.write_inode(parent, &data)?;

        let mut directories = Vec::new();
        let mut to_remove = vec![index];
        if perm::is_directory(inode.mode) {
            directories.push(index);
        }
        while let Some(dir) = directories.pop() {
            let data = self.read_inode(dir)?;
            for entry in directory_entries(&data) {
                let name = entry.name();
                if name == b"." || name == b".." {
                    continue;
                }
                let child = entry.inode as usize;
                if perm::is_directory(self.get_inode(child)?.mode) {
                    directories.push(child);
                }
                to_remove.push(child);
            }
        }
        for index in to_remove {
            self.remove_inode(index)?;
        }
        Ok(())
    }

    /// Returns the metadata of the file at `path`.
    pub fn stat_file(&mut self, path: &str) -> Result<Stat, Error> {
        let index = self.locate_file(path)?;
        Ok(self.get_inode(index)?.into())
    }

    /// Lists the entries of the directory at `path`, `.` and `..` included.
    ///
    /// An empty path lists the working directory.
    pub fn list_directory(&mut self, path: &str) -> Result<Vec<(String, Stat)>, Error> {
        let data = if path.is_empty() {
            self.read_inode(self.current_inode)?
        } else {
            let index = self.locate_file(path)?;
            let inode = self.get_inode(index)?;
            if !perm::is_directory(inode.mode) {
                return Err(Error::NotADirectory(path.to_owned()));
            }
            self.read_inode(index)?
        };
        let mut stats = Vec::new();
        for entry in directory_entries(&data) {
            let inode = self.get_inode(entry.inode as usize)?;
            let name = String::from_utf8_lossy(&entry.name()).into_owned();
            stats.push((name, inode.into()));
        }
        Ok(stats)
    }

    /// Changes the working directory to `path`.
    pub fn change_directory(&mut self, path: &str) -> Result<(), Error> {
        let index = self.locate_file(path)?;
        if !perm::is_directory(self.get_inode(index)?.mode) {
            return Err(Error::NotADirectory(path.to_owned()));
        }
        self.current_inode = index;
        Ok(())
    }

    /// Returns the content of the file at `path`.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>, Error> {
        let index = self.locate_file(path)?;
        if perm::is_directory(self.get_inode(index)?.mode) {
            return Err(Error::IsADirectory("reading"));
        }
        self.read_inode(index)
    }

    /// Rewrites the content of the file at `path` with `src`.
    pub fn write_file(&mut self, path: &str, src: &[u8]) -> Result<(), Error> {
        let index = self.locate_file(path)?;
        if perm::is_directory(self.get_inode(index)?.mode) {
            return Err(Error::IsADirectory("writing"));
        }
        self.write_inode(index, src)
    }

    /// Copies the file at `from` to a new file at `to`.
    pub fn copy_file(&mut self, from: &str, to: &str) -> Result<(), Error> {
        if from.ends_with('/') || to.ends_with('/') {
            return Err(Error::IsADirectory("copying"));
        }
        self.create_file(to)?;
        let data = self.read_file(from)?;
        self.write_file(to, &data)
    }

    /// Moves the file at `from` to `to`.
    pub fn move_file(&mut self, from: &str, to: &str) -> Result<(), Error> {
        if from.ends_with('/') || to.ends_with('/') {
            return Err(Error::IsADirectory("moving"));
        }
        self.copy_file(from, to)?;
        self.remove_file(from)
    }

    /// Gives the file at `path` to `uid`. Any caller may do so.
    pub fn change_owner(&mut self, path: &str, uid: u16) -> Result<(), Error> {
        let index = self.locate_file(path)?;
        if index == 0 {
            return Err(Error::RootProtected("changing the owner of"));
        }
        let mut inode = self.get_inode(index)?;
        inode.uid = uid;
        self.set_inode(index, &inode)
    }

    /// Sets the permission bits of the file at `path`.
    ///
    /// Only the owner may do so. `mode` is masked to its low 9 bits and the
    /// directory bit is preserved.
    pub fn change_mode(&mut self, path: &str, mode: u16) -> Result<(), Error> {
        let index = self.locate_file(path)?;
        if index == 0 {
            return Err(Error::RootProtected("changing the mode of"));
        }
        let mut inode = self.get_inode(index)?;
        if inode.uid != self.uid {
            return Err(Error::PermissionDenied(
                "the mode can only be changed by the owner",
            ));
        }
        inode.mode = (inode.mode & perm::DIR) | (mode & perm::ALL);
        self.set_inode(index, &inode)
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        if self.disk.mounted() {
            let _ = self.disk.unmount();
        }
    }
}
