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

//! BFS is a block filesystem hosted inside an ordinary file.
//!
//! The disk image is split into fixed 4096-byte blocks: a superblock, one
//! bitmap block for inodes and one for data blocks, an inode table, then the
//! data region. Files are described by 64-byte inodes carrying 11 direct
//! block pointers and one single-indirect pointer; directories are regular
//! files holding a dense table of 32-byte entries.

pub mod bitmap;
pub mod block;
pub mod disk;
pub mod error;
pub mod fs;
pub mod perm;
pub mod prompt;
pub mod util;
