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

//! The metadata server's local store: a normal namespace (inode table,
//! directories) plus the distributed block-map bookkeeping that reinterprets
//! a File inode's tail bytes as a packed [`BlockInfo`] array instead of local
//! block pointers.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ferrofs_core::allocator::BlockAllocator;
use ferrofs_core::block::BlockManager;
use ferrofs_core::directory::{self, DirectoryEntry};
use ferrofs_core::error::{ErrorKind, Result};
use ferrofs_core::inode::{Inode, InodeManager, InodeType, HEADER_SIZE};
use ferrofs_core::types::{BlockId, BlockInfo, InodeId, INVALID_BLOCK_ID, ROOT_INODE_ID};
use ferrofs_core::{FileOperation, InodeAttr};

/// Slot count used for every Directory inode's local block index.
const DIRECTORY_NBLOCKS: u32 = 16;

fn now_secs() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn div_ceil(a: u64, b: u64) -> u64 {
	if a % b == 0 {
		a / b
	} else {
		a / b + 1
	}
}

/// Bitmap blocks sized so that `n_bitmap_blocks * bits_per_block` covers the
/// remaining blocks once the bitmap itself is carved out.
fn bitmap_blocks_for(remaining: u64, block_size: usize) -> u64 {
	let bits_per_block = (block_size * 8) as u64;
	div_ceil(remaining, bits_per_block + 1).max(1)
}

pub struct MetadataStore {
	fs: FileOperation,
}

impl MetadataStore {
	/// Opens (or formats) the metadata store. A fresh store gets a root
	/// directory allocated immediately and asserted to have landed on
	/// `ROOT_INODE_ID` -- a failure here is fatal at the call site, since
	/// construction-time failure leaves nothing usable to recover into.
	pub fn open(path: impl AsRef<Path>, total_blocks: u64, block_size: usize, max_inode_supported: u64) -> Result<Self> {
		let (bm, is_new) = BlockManager::open(path, total_blocks, block_size)?;
		let bm = Arc::new(bm);

		let inodes = InodeManager::new(bm.clone(), max_inode_supported, is_new)?;
		let (_, inode_bitmap_last) = inodes.bitmap_region();
		let remaining = total_blocks.saturating_sub(inode_bitmap_last);
		let n_bitmap_blocks = bitmap_blocks_for(remaining, block_size);
		let alloc = BlockAllocator::new(bm.clone(), inode_bitmap_last, n_bitmap_blocks, is_new)?;
		if is_new {
			let usable = total_blocks.saturating_sub(alloc.data_region_start());
			alloc.mark_unusable_tail(usable)?;
		}

		let fs = FileOperation::new(bm, alloc, inodes, DIRECTORY_NBLOCKS);
		let store = MetadataStore { fs };

		if is_new {
			let root = store.fs.alloc_inode(InodeType::Directory)?;
			debug_assert_eq!(root, ROOT_INODE_ID, "fresh store did not allocate the root directory first");
			if root != ROOT_INODE_ID {
				return Err(ErrorKind::Invalid.into());
			}
		}
		Ok(store)
	}

	pub fn fs(&self) -> &FileOperation {
		&self.fs
	}

	fn block_info_capacity(&self) -> usize {
		(self.fs.block_manager().block_size() - HEADER_SIZE) / BlockInfo::ENCODED_SIZE
	}

	/// Allocates a carrier block and a File inode over it, but -- unlike
	/// `FileOperation::alloc_inode` -- sizes `nblocks` to the number of
	/// `BlockInfo` triples the carrier block can hold rather than to the
	/// local-entry slot count, and explicitly zeroes the whole tail region at
	/// `BlockInfo`'s width. `Inode::write_fresh` only zeroes `nblocks *
	/// LOCAL_ENTRY_SIZE` bytes (8-byte stride); since a `BlockInfo` entry is
	/// 20 bytes, that undershoots the region `get_block_map` actually scans,
	/// which would otherwise let stale bytes from a previous occupant of this
	/// carrier block surface as fake block-map entries.
	fn alloc_distributed_file(&self) -> Result<InodeId> {
		let carrier = self.fs.block_allocator().allocate()?;
		let capacity = self.block_info_capacity() as u32;
		let id = self.fs.inode_manager().allocate_inode(InodeType::File, carrier, capacity, now_secs())?;

		let block_size = self.fs.block_manager().block_size();
		let zeros = vec![0u8; block_size - HEADER_SIZE];
		self.fs.block_manager().write_partial_block(carrier, &zeros, HEADER_SIZE, zeros.len())?;
		Ok(id)
	}

	pub fn mknode(&self, ty: InodeType, parent: InodeId, name: &str) -> Result<InodeId> {
		let mut list = directory::read_directory(&self.fs, parent)?;
		if list.iter().any(|e| e.name == name) {
			return Err(ErrorKind::AlreadyExist.into());
		}
		let new_id = match ty {
			InodeType::Directory => self.fs.alloc_inode(InodeType::Directory)?,
			InodeType::File => self.alloc_distributed_file()?,
			InodeType::Unknown => return Err(ErrorKind::InvalidArg.into()),
		};
		list.push(DirectoryEntry { name: name.to_string(), id: new_id });
		self.fs.write_file(parent, directory::dir_list_to_string(&list).as_bytes())?;
		Ok(new_id)
	}

	/// Unlinking a distributed File only releases its carrier block and
	/// namespace entry; the remote data blocks named by its block map are
	/// freed independently through `free_block` RPCs, so a block map's
	/// remote blocks may outlive an unlinked name until those RPCs land.
	pub fn unlink(&self, parent: InodeId, name: &str) -> Result<()> {
		directory::unlink(&self.fs, parent, name)
	}

	pub fn lookup(&self, parent: InodeId, name: &str) -> Result<InodeId> {
		directory::lookup(&self.fs, parent, name)
	}

	pub fn readdir(&self, id: InodeId) -> Result<Vec<(String, InodeId)>> {
		directory::readdir(&self.fs, id)
	}

	pub fn get_type_attr(&self, id: InodeId) -> Result<(InodeType, InodeAttr)> {
		self.fs.get_type_attr(id)
	}

	/// Reads the carrier block of `id` directly and decodes its tail as a
	/// packed `BlockInfo` array, returning only the non-invalid prefix up to
	/// `inode.nblocks` entries.
	pub fn get_block_map(&self, id: InodeId) -> Result<Vec<BlockInfo>> {
		let carrier = self.fs.inode_manager().get(id)?;
		if carrier == INVALID_BLOCK_ID {
			return Err(ErrorKind::InvalidArg.into());
		}
		let block_size = self.fs.block_manager().block_size();
		let mut buf = vec![0u8; block_size];
		self.fs.block_manager().read_block(carrier, &mut buf)?;
		let inode = Inode::decode_header(&buf);

		let mut out = Vec::new();
		for i in 0..inode.nblocks as usize {
			let off = HEADER_SIZE + i * BlockInfo::ENCODED_SIZE;
			if off + BlockInfo::ENCODED_SIZE > buf.len() {
				break;
			}
			let info = BlockInfo::decode(&buf[off..off + BlockInfo::ENCODED_SIZE]);
			if !info.is_invalid() {
				out.push(info);
			}
		}
		Ok(out)
	}

	/// Appends `info` to `id`'s block map, rewriting the whole packed array
	/// Tail bytes past the rewritten prefix are left as-is rather than zeroed
	/// independently; the prefix length (`existing.len()`) is what callers
	/// trust, not the raw block contents.
	pub fn append_block_info(&self, id: InodeId, info: BlockInfo) -> Result<()> {
		let carrier = self.fs.inode_manager().get(id)?;
		if carrier == INVALID_BLOCK_ID {
			return Err(ErrorKind::InvalidArg.into());
		}
		let mut existing = self.get_block_map(id)?;
		if existing.len() >= self.block_info_capacity() {
			return Err(ErrorKind::OutOfResource.into());
		}
		existing.push(info);

		let mut bytes = vec![0u8; existing.len() * BlockInfo::ENCODED_SIZE];
		for (i, bi) in existing.iter().enumerate() {
			bi.encode(&mut bytes[i * BlockInfo::ENCODED_SIZE..(i + 1) * BlockInfo::ENCODED_SIZE]);
		}
		self.fs.block_manager().write_partial_block(carrier, &bytes, HEADER_SIZE, bytes.len())
	}

	/// Updates a distributed file's logical size (and bumps `mtime`/`ctime`)
	/// without touching its block-map tail.
	///
	/// Nothing in the metadata server's block-map RPCs ever writes
	/// `attr.size` for a distributed file -- `allocate_block`/`free_block`
	/// grow and shrink the block map but never touch the inode's size field.
	/// `ferrofs-client` needs a way to keep a file's reported size coherent
	/// after a write, so this RPC exists as the minimal addition that does
	/// that without reaching into the block-map protocol itself.
	pub fn set_size(&self, id: InodeId, size: u64) -> Result<()> {
		let carrier = self.fs.inode_manager().get(id)?;
		if carrier == INVALID_BLOCK_ID {
			return Err(ErrorKind::InvalidArg.into());
		}
		let block_size = self.fs.block_manager().block_size();
		let mut buf = vec![0u8; block_size];
		self.fs.block_manager().read_block(carrier, &mut buf)?;
		let mut inode = Inode::decode_header(&buf);
		inode.attr.size = size;
		let now = now_secs();
		inode.attr.mtime = now;
		inode.attr.ctime = now;
		inode.encode_header(&mut buf);
		self.fs.block_manager().write_partial_block(carrier, &buf[..HEADER_SIZE], 0, HEADER_SIZE)
	}

	/// Clears the block-map entry carrying `block_id`, returning the triple
	/// that was there so the caller can fence the block at its owning data
	/// server. `NotExist` when no entry matches.
	pub fn clear_block_info(&self, id: InodeId, block_id: BlockId) -> Result<BlockInfo> {
		let carrier = self.fs.inode_manager().get(id)?;
		if carrier == INVALID_BLOCK_ID {
			return Err(ErrorKind::NotExist.into());
		}
		let block_size = self.fs.block_manager().block_size();
		let mut buf = vec![0u8; block_size];
		self.fs.block_manager().read_block(carrier, &mut buf)?;
		let inode = Inode::decode_header(&buf);

		for i in 0..inode.nblocks as usize {
			let off = HEADER_SIZE + i * BlockInfo::ENCODED_SIZE;
			if off + BlockInfo::ENCODED_SIZE > buf.len() {
				break;
			}
			let info = BlockInfo::decode(&buf[off..off + BlockInfo::ENCODED_SIZE]);
			if info.block_id == block_id {
				self.fs.block_manager().write_partial_block(carrier, &[0u8; BlockInfo::ENCODED_SIZE], off, BlockInfo::ENCODED_SIZE)?;
				return Ok(info);
			}
		}
		Err(ErrorKind::NotExist.into())
	}
}
