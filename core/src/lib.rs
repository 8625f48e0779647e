/*
 * Copyright 2026 ferrofs contributors
 *
 * This file is part of ferrofs.
 *
 * ferrofs is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * ferrofs is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * ferrofs. If not, see <https://www.gnu.org/licenses/>.
 */

//! The on-disk storage engine shared by the metadata server and every data
//! server.
//!
//! A store is always laid out the same way: a run of inode-table blocks, a
//! run of inode-bitmap blocks, a run of data-bitmap blocks, then the data
//! region, all addressed through a single [`BlockManager`]. Data servers skip
//! the inode table and bitmap entirely and keep a version table in their
//! place (see [`block::VERSION_ENTRY_SIZE`]).

pub mod allocator;
pub mod bitmap;
pub mod block;
pub mod commitlog;
pub mod directory;
pub mod error;
pub mod fileop;
pub mod inode;
pub mod types;

pub use allocator::BlockAllocator;
pub use bitmap::{Bitmap, BlockIterator};
pub use block::BlockManager;
pub use commitlog::{CommitLog, NoopCommitLog};
pub use directory::DirectoryEntry;
pub use error::{Error, ErrorKind, Result};
pub use fileop::FileOperation;
pub use inode::{Inode, InodeAttr, InodeManager, InodeType};
pub use types::{BlockId, BlockInfo, InodeId, MachineId, Version, INVALID_BLOCK_ID, INVALID_INODE_ID, ROOT_INODE_ID};
