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

//! Errors reported by the filesystem engine.

use std::io;
use thiserror::Error;

/// An error occurring during a filesystem operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Device-level I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A block index beyond the end of the device.
    #[error("invalid block index {0}")]
    InvalidBlockIndex(usize),
    /// The device is too small to hold a filesystem.
    #[error("disk size too small")]
    DiskTooSmall,
    /// The superblock does not carry the expected magic number.
    #[error("unexpected magic number, you should format the disk first")]
    BadMagic,
    /// The device has already been mounted.
    #[error("disk has already been mounted")]
    AlreadyMounted,
    /// The device is not mounted.
    #[error("filesystem is not mounted")]
    NotMounted,
    /// Every inode table slot is in use.
    #[error("no free inode left")]
    NoFreeInode,
    /// Every data block is in use.
    #[error("no free data block left")]
    NoFreeBlock,
    /// An inode index that does not reference a used inode.
    #[error("invalid inode index {0}")]
    InvalidInode(usize),
    /// The root inode was not allocated at index `0` during format.
    #[error("unexpected root inode index {0}")]
    BadRootIndex(usize),
    /// A path component does not exist.
    #[error("illegal path: {0} does not exist")]
    DoesNotExist(String),
    /// A path names a regular file where a directory is expected.
    #[error("illegal path: {0} is not a directory")]
    NotADirectory(String),
    /// The operation does not apply to a directory.
    #[error("{0} a directory is not allowed")]
    IsADirectory(&'static str),
    /// The entry name already exists in the parent directory.
    #[error("illegal path: {0} already exists")]
    AlreadyExists(String),
    /// The filename is empty or too long.
    #[error("illegal filename")]
    BadFilename,
    /// The operation cannot be applied to the root directory.
    #[error("{0} the root directory is not allowed")]
    RootProtected(&'static str),
    /// The caller's uid does not grant the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),
    /// The written data exceeds the maximum file size.
    #[error("source size exceeds the capacity of the filesystem")]
    FileTooLarge,
}
