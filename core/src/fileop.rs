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

//! File-level primitives (C5): direct + single-indirect block index,
//! `read_file` / `write_file` / `resize`, built on top of [`BlockAllocator`]
//! and [`InodeManager`].
//!
//! `FileOperation` is intentionally not internally synchronized above what
//! [`BlockManager`] already serializes per block: concurrent `write_file`
//! calls on the same inode race each other on the inode block, the data
//! bitmap, and the indirect block. This mirrors the single-writer-per-inode
//! assumption this crate documents elsewhere rather than papering over it
//! with a lock nothing here requires.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::allocator::BlockAllocator;
use crate::block::BlockManager;
use crate::error::{ErrorKind, Result};
use crate::inode::{read_local_slot, write_local_slot, Inode, InodeManager, InodeType, LOCAL_ENTRY_SIZE};
use crate::types::{BlockId, InodeId, INVALID_BLOCK_ID};

pub use crate::inode::InodeAttr as FileAttr;

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

/// Combines a [`BlockAllocator`] and an [`InodeManager`] over one
/// [`BlockManager`] to expose whole-file read/write/resize primitives.
pub struct FileOperation {
	bm: Arc<BlockManager>,
	alloc: BlockAllocator,
	inodes: InodeManager,
	/// Slot count written into every inode record created through this
	/// `FileOperation`. Fixed per store; see the module docs on `inode` for
	/// why this is the only knob needed to support both a purely local store
	/// and the metadata server's wider `BlockInfo` tail layout.
	nblocks: u32,
}

impl FileOperation {
	pub fn new(bm: Arc<BlockManager>, alloc: BlockAllocator, inodes: InodeManager, nblocks: u32) -> Self {
		FileOperation { bm, alloc, inodes, nblocks }
	}

	pub fn block_manager(&self) -> &Arc<BlockManager> {
		&self.bm
	}

	pub fn block_allocator(&self) -> &BlockAllocator {
		&self.alloc
	}

	pub fn inode_manager(&self) -> &InodeManager {
		&self.inodes
	}

	pub fn nblocks(&self) -> u32 {
		self.nblocks
	}

	fn direct_cap(&self) -> usize {
		self.nblocks as usize - 1
	}

	fn indirect_fanout(&self) -> usize {
		self.bm.block_size() / LOCAL_ENTRY_SIZE
	}

	/// `(nblocks - 1 + indirect_fanout) * block_size`.
	pub fn max_file_sz_supported(&self) -> u64 {
		(self.direct_cap() + self.indirect_fanout()) as u64 * self.bm.block_size() as u64
	}

	/// Allocates a carrier block, then an inode record pointing at it.
	pub fn alloc_inode(&self, ty: InodeType) -> Result<InodeId> {
		let carrier = self.alloc.allocate()?;
		self.inodes.allocate_inode(ty, carrier, self.nblocks, now_secs())
	}

	pub fn getattr(&self, id: InodeId) -> Result<FileAttr> {
		self.inodes.get_attr(id)
	}

	pub fn gettype(&self, id: InodeId) -> Result<InodeType> {
		self.inodes.get_type(id)
	}

	pub fn get_type_attr(&self, id: InodeId) -> Result<(InodeType, FileAttr)> {
		self.inodes.get_type_attr(id)
	}

	/// Resolves the block id of block index `idx` (0-based) within a file,
	/// given its inode buffer and a loaded indirect-block scratch buffer
	/// (only read when `idx >= direct_cap`).
	fn resolve_block(&self, inode_buf: &[u8], indirect_buf: &[u8], idx: usize) -> BlockId {
		let direct_cap = self.direct_cap();
		if idx < direct_cap {
			read_local_slot(inode_buf, idx)
		} else {
			read_local_slot(indirect_buf, idx - direct_cap)
		}
	}

	pub fn read_file(&self, id: InodeId) -> Result<Vec<u8>> {
		let block_size = self.bm.block_size();
		let mut inode_buf = vec![0u8; block_size];
		self.inodes.read_inode(id, &mut inode_buf)?;
		let inode = Inode::decode_header(&inode_buf);

		let file_size = inode.attr.size;
		let direct_cap = self.direct_cap();
		let blocks_needed = div_ceil(file_size, block_size as u64) as usize;

		let mut indirect_buf = vec![0u8; block_size];
		if blocks_needed > direct_cap {
			let indirect_id = read_local_slot(&inode_buf, self.nblocks as usize - 1);
			self.bm.read_block(indirect_id, &mut indirect_buf)?;
		}

		let mut content = Vec::with_capacity(file_size as usize);
		let mut block_buf = vec![0u8; block_size];
		for idx in 0..blocks_needed {
			let block_id = self.resolve_block(&inode_buf, &indirect_buf, idx);
			self.bm.read_block(block_id, &mut block_buf)?;
			let remaining = file_size as usize - content.len();
			let take = remaining.min(block_size);
			content.extend_from_slice(&block_buf[..take]);
		}
		Ok(content)
	}

	pub fn read_file_w_off(&self, id: InodeId, sz: u64, offset: u64) -> Result<Vec<u8>> {
		let content = self.read_file(id)?;
		let start = offset as usize;
		let end = (offset + sz) as usize;
		if start > content.len() || end > content.len() {
			return Err(ErrorKind::InvalidArg.into());
		}
		Ok(content[start..end].to_vec())
	}

	pub fn write_file(&self, id: InodeId, content: &[u8]) -> Result<()> {
		let block_size = self.bm.block_size();
		if content.len() as u64 > self.max_file_sz_supported() {
			return Err(ErrorKind::OutOfResource.into());
		}

		let carrier_block_id = self.inodes.get(id)?;
		if carrier_block_id == INVALID_BLOCK_ID {
			return Err(ErrorKind::InvalidArg.into());
		}
		let mut inode_buf = vec![0u8; block_size];
		self.bm.read_block(carrier_block_id, &mut inode_buf)?;
		let mut inode = Inode::decode_header(&inode_buf);

		let direct_cap = self.direct_cap();
		let indirect_slot = self.nblocks as usize - 1;
		let old_blocks = div_ceil(inode.attr.size, block_size as u64) as usize;
		let new_blocks = div_ceil(content.len() as u64, block_size as u64) as usize;

		let mut indirect_buf = vec![0u8; block_size];
		let mut has_indirect = read_local_slot(&inode_buf, indirect_slot) != INVALID_BLOCK_ID;
		if has_indirect {
			let indirect_id = read_local_slot(&inode_buf, indirect_slot);
			self.bm.read_block(indirect_id, &mut indirect_buf)?;
		}

		if new_blocks > old_blocks {
			for idx in old_blocks..new_blocks {
				let block_id = self.alloc.allocate()?;
				if idx < direct_cap {
					write_local_slot(&mut inode_buf, idx, block_id);
				} else {
					if !has_indirect {
						let indirect_id = self.alloc.allocate()?;
						write_local_slot(&mut inode_buf, indirect_slot, indirect_id);
						has_indirect = true;
					}
					write_local_slot(&mut indirect_buf, idx - direct_cap, block_id);
				}
			}
			self.bm.write_block(carrier_block_id, &inode_buf)?;
			if has_indirect {
				let indirect_id = read_local_slot(&inode_buf, indirect_slot);
				self.bm.write_block(indirect_id, &indirect_buf)?;
			}
		} else if new_blocks < old_blocks {
			for idx in new_blocks..old_blocks {
				let block_id = self.resolve_block(&inode_buf, &indirect_buf, idx);
				self.alloc.deallocate(block_id)?;
			}
			if old_blocks > direct_cap && new_blocks <= direct_cap && has_indirect {
				let indirect_id = read_local_slot(&inode_buf, indirect_slot);
				self.alloc.deallocate(indirect_id)?;
				write_local_slot(&mut inode_buf, indirect_slot, INVALID_BLOCK_ID);
				has_indirect = false;
			}
		}

		inode.attr.size = content.len() as u64;
		let now = now_secs();
		inode.attr.set_all_times(now);
		inode.encode_header(&mut inode_buf);

		let mut write_sz = 0usize;
		let mut block_idx = 0usize;
		let mut block_buf = vec![0u8; block_size];
		while write_sz < content.len() {
			let take = (content.len() - write_sz).min(block_size);
			block_buf[..take].copy_from_slice(&content[write_sz..write_sz + take]);
			if take < block_size {
				block_buf[take..].fill(0);
			}
			let block_id = self.resolve_block(&inode_buf, &indirect_buf, block_idx);
			self.bm.write_block(block_id, &block_buf)?;
			write_sz += take;
			block_idx += 1;
		}

		self.bm.write_block(carrier_block_id, &inode_buf)?;
		if has_indirect {
			let indirect_id = read_local_slot(&inode_buf, indirect_slot);
			self.bm.write_block(indirect_id, &indirect_buf)?;
		}
		Ok(())
	}

	pub fn write_file_w_off(&self, id: InodeId, data: &[u8], offset: u64) -> Result<u64> {
		let mut content = self.read_file(id)?;
		let end = offset as usize + data.len();
		if end > content.len() {
			content.resize(end, 0);
		}
		content[offset as usize..end].copy_from_slice(data);
		self.write_file(id, &content)?;
		Ok(data.len() as u64)
	}

	/// Resizes a file to `sz` bytes, preserving `min(old_size, sz)` bytes of
	/// prefix and zero-filling any new suffix.
	pub fn resize(&self, id: InodeId, sz: u64) -> Result<FileAttr> {
		let mut attr = self.getattr(id)?;
		if attr.size != sz {
			let mut content = self.read_file(id)?;
			content.resize(sz as usize, 0);
			self.write_file(id, &content)?;
		}
		attr.size = sz;
		Ok(attr)
	}

	/// Drains a file's content (frees every data block), frees its inode,
	/// and releases its carrier block back to the data bitmap -- the carrier
	/// is itself a regular allocated block (see `alloc_inode`), so leaving it
	/// bound would violate I2 (every block_id appearing in an inode record,
	/// including the carrier itself, is tracked exactly once by the data
	/// bitmap).
	pub fn remove_file(&self, id: InodeId) -> Result<()> {
		self.resize(id, 0)?;
		let carrier_block_id = self.inodes.get(id)?;
		self.inodes.free_inode(id)?;
		self.alloc.deallocate(carrier_block_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;

	/// `nblocks = 4` => 3 direct slots + 1 indirect; `block_size = 64` =>
	/// indirect fanout of 8, so the direct/indirect boundary sits at 192 bytes.
	fn setup() -> FileOperation {
		let dir = tempfile::tempdir().unwrap();
		let (bm, is_new) = BlockManager::open(dir.path().join("s.img"), 200, 64).unwrap();
		std::mem::forget(dir);
		let bm = Arc::new(bm);
		let inodes = InodeManager::new(bm.clone(), 8, is_new).unwrap();
		let (_, inode_bitmap_last) = inodes.bitmap_region();
		let alloc = BlockAllocator::new(bm.clone(), inode_bitmap_last, 1, is_new).unwrap();
		FileOperation::new(bm, alloc, inodes, 4)
	}

	#[test]
	fn small_write_read_roundtrip() {
		let fs = setup();
		let id = fs.alloc_inode(InodeType::File).unwrap();
		fs.write_file(id, b"hello world").unwrap();
		assert_eq!(fs.read_file(id).unwrap(), b"hello world");
		assert_eq!(fs.getattr(id).unwrap().size, 11);
	}

	#[test]
	fn write_spanning_the_indirect_boundary_roundtrips() {
		let fs = setup();
		let id = fs.alloc_inode(InodeType::File).unwrap();
		let content: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
		fs.write_file(id, &content).unwrap();
		assert_eq!(fs.read_file(id).unwrap(), content);
	}

	#[test]
	fn shrinking_below_the_indirect_boundary_frees_the_indirect_block() {
		let fs = setup();
		let id = fs.alloc_inode(InodeType::File).unwrap();
		let big: Vec<u8> = vec![1u8; 300];
		fs.write_file(id, &big).unwrap();
		let free_with_indirect = fs.block_allocator().allocate().unwrap();
		fs.block_allocator().deallocate(free_with_indirect).unwrap();

		fs.write_file(id, b"small").unwrap();
		let free_after_shrink = fs.block_allocator().allocate().unwrap();
		fs.block_allocator().deallocate(free_after_shrink).unwrap();

		// Shrinking below the boundary frees the indirect block itself, so a
		// lower block id becomes available again than while it was in use.
		assert!(free_after_shrink <= free_with_indirect);
		assert_eq!(fs.read_file(id).unwrap(), b"small");
	}

	#[test]
	fn resize_zero_fills_growth_and_truncates_shrink() {
		let fs = setup();
		let id = fs.alloc_inode(InodeType::File).unwrap();
		fs.write_file(id, b"abc").unwrap();
		fs.resize(id, 6).unwrap();
		assert_eq!(fs.read_file(id).unwrap(), b"abc\0\0\0");
		fs.resize(id, 2).unwrap();
		assert_eq!(fs.read_file(id).unwrap(), b"ab");
	}

	#[test]
	fn write_past_capacity_is_out_of_resource() {
		let fs = setup();
		let id = fs.alloc_inode(InodeType::File).unwrap();
		let oversized = vec![0u8; fs.max_file_sz_supported() as usize + 1];
		assert_eq!(fs.write_file(id, &oversized).unwrap_err().kind(), ErrorKind::OutOfResource);
	}

	#[test]
	fn remove_file_frees_its_inode() {
		let fs = setup();
		let id = fs.alloc_inode(InodeType::File).unwrap();
		fs.write_file(id, b"gone soon").unwrap();
		fs.remove_file(id).unwrap();
		assert_eq!(fs.getattr(id).unwrap_err().kind(), ErrorKind::InvalidArg);
	}

	#[test]
	fn remove_file_releases_its_carrier_block_too() {
		let fs = setup();
		let id = fs.alloc_inode(InodeType::File).unwrap();
		let carrier = fs.inode_manager().get(id).unwrap();
		fs.remove_file(id).unwrap();
		// The carrier block must come back out of the data bitmap, not just
		// the inode table/bitmap -- otherwise every create/delete cycle
		// leaks one block forever.
		let reused = fs.block_allocator().allocate().unwrap();
		assert_eq!(reused, carrier);
	}
}
