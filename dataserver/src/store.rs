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

//! The local store a data server owns: a version table followed by a data
//! allocation bitmap and the data region itself (spec §4.7, §6 "Data store"
//! layout).

use std::path::Path;
use std::sync::Arc;

use ferrofs_core::block::{BlockManager, VERSION_ENTRY_SIZE};
use ferrofs_core::error::Result;
use ferrofs_core::types::BlockId;
use ferrofs_core::{BlockAllocator, Version};

/// Number of leading blocks reserved for the version table, one `u32` slot
/// per addressable block in the store.
fn version_table_blocks(total_blocks: u64, block_size: usize) -> u64 {
	let entries_per_block = (block_size / VERSION_ENTRY_SIZE) as u64;
	div_ceil(total_blocks, entries_per_block)
}

/// Bitmap blocks sized so that `n_bitmap_blocks * bits_per_block` covers
/// every block left once the bitmap itself is carved out of `remaining`.
fn bitmap_blocks_for(remaining: u64, block_size: usize) -> u64 {
	let bits_per_block = (block_size * 8) as u64;
	div_ceil(remaining, bits_per_block + 1).max(1)
}

fn div_ceil(a: u64, b: u64) -> u64 {
	if a % b == 0 {
		a / b
	} else {
		a / b + 1
	}
}

pub struct DataStore {
	bm: Arc<BlockManager>,
	alloc: BlockAllocator,
	n_version_blocks: u64,
}

impl DataStore {
	/// Opens (or formats, if `path` does not yet exist) the backing file.
	pub fn open(path: impl AsRef<Path>, total_blocks: u64, block_size: usize) -> Result<Self> {
		let (bm, is_new) = BlockManager::open(path, total_blocks, block_size)?;
		let bm = Arc::new(bm);

		let n_version_blocks = version_table_blocks(total_blocks, block_size);
		let remaining = total_blocks.saturating_sub(n_version_blocks);
		let n_bitmap_blocks = bitmap_blocks_for(remaining, block_size);

		let alloc = BlockAllocator::new(bm.clone(), n_version_blocks, n_bitmap_blocks, is_new)?;
		if is_new {
			let usable = total_blocks.saturating_sub(alloc.data_region_start());
			alloc.mark_unusable_tail(usable)?;
		}
		Ok(DataStore { bm, alloc, n_version_blocks })
	}

	fn entries_per_block(&self) -> u64 {
		(self.bm.block_size() / VERSION_ENTRY_SIZE) as u64
	}

	fn version_slot(&self, block_id: BlockId) -> (BlockId, usize) {
		let entries_per_block = self.entries_per_block();
		let version_block = block_id / entries_per_block;
		let offset_in_block = ((block_id % entries_per_block) as usize) * VERSION_ENTRY_SIZE;
		(version_block, offset_in_block)
	}

	fn read_version(&self, block_id: BlockId) -> Result<Version> {
		let (version_block, offset) = self.version_slot(block_id);
		let mut buf = vec![0u8; self.bm.block_size()];
		self.bm.read_block(version_block, &mut buf)?;
		Ok(u32::from_le_bytes(buf[offset..offset + VERSION_ENTRY_SIZE].try_into().unwrap()))
	}

	fn bump_version(&self, block_id: BlockId) -> Result<Version> {
		let current = self.read_version(block_id)?;
		let next = current.wrapping_add(1);
		let (version_block, offset) = self.version_slot(block_id);
		self.bm.write_partial_block(version_block, &next.to_le_bytes(), offset, VERSION_ENTRY_SIZE)?;
		Ok(next)
	}

	/// Allocates a block and bumps its version; the new version fences any
	/// reader still holding the version from the block's prior lifetime.
	pub fn alloc_block(&self) -> Result<(BlockId, Version)> {
		let block_id = self.alloc.allocate()?;
		let version = self.bump_version(block_id)?;
		Ok((block_id, version))
	}

	/// Frees a block and bumps its version again, fencing outstanding reads
	/// that still hold the pre-free version (I5, P6).
	pub fn free_block(&self, block_id: BlockId) -> Result<bool> {
		if self.alloc.deallocate(block_id).is_err() {
			return Ok(false);
		}
		self.bump_version(block_id)?;
		Ok(true)
	}

	/// Returns an empty vector on any error path: version mismatch, range
	/// error, or I/O failure, matching the RPC boundary's sentinel-on-failure
	/// contract (spec §7).
	pub fn read_data(&self, block_id: BlockId, offset: usize, len: usize, version: Version) -> Vec<u8> {
		let local_version = match self.read_version(block_id) {
			Ok(v) => v,
			Err(_) => return Vec::new(),
		};
		if local_version != version {
			log::debug!("read_data: version mismatch on block {block_id}: local={local_version}, requested={version}");
			return Vec::new();
		}
		let mut buf = vec![0u8; self.bm.block_size()];
		if self.bm.read_block(block_id, &mut buf).is_err() {
			return Vec::new();
		}
		if offset + len > buf.len() {
			return Vec::new();
		}
		buf[offset..offset + len].to_vec()
	}

	/// No version check on write -- see spec §9 open question 2: a stale
	/// writer can still land bytes until the next free-time fence.
	pub fn write_data(&self, block_id: BlockId, offset: usize, bytes: &[u8]) -> bool {
		self.bm.write_partial_block(block_id, bytes, offset, bytes.len()).is_ok()
	}

	pub fn n_version_blocks(&self) -> u64 {
		self.n_version_blocks
	}

	pub fn block_manager(&self) -> &Arc<BlockManager> {
		&self.bm
	}

	pub fn set_may_fail(&self, may_fail: bool) {
		self.bm.set_may_fail(may_fail);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn setup() -> DataStore {
		let dir = tempfile::tempdir().unwrap();
		let store = DataStore::open(dir.path().join("data.img"), 64, 64).unwrap();
		std::mem::forget(dir);
		store
	}

	#[test]
	fn alloc_read_write_roundtrip() {
		let store = setup();
		let (block_id, version) = store.alloc_block().unwrap();
		assert!(store.write_data(block_id, 0, &[0xDE, 0xAD]));
		assert_eq!(store.read_data(block_id, 0, 2, version), vec![0xDE, 0xAD]);
	}

	#[test]
	fn stale_version_read_returns_empty() {
		let store = setup();
		let (block_id, version) = store.alloc_block().unwrap();
		assert!(store.read_data(block_id, 0, 2, version + 1).is_empty());
	}

	#[test]
	fn free_then_realloc_bumps_version_past_prior_reads() {
		let store = setup();
		let (block_id, v1) = store.alloc_block().unwrap();
		assert!(store.free_block(block_id).unwrap());
		// Keep allocating until we see the same block id come back around;
		// with a tiny bitmap this happens on the very next call.
		let (_, v2) = store.alloc_block().unwrap();
		assert!(v2 > v1);
		assert!(store.read_data(block_id, 0, 2, v1).is_empty());
	}

	#[test]
	fn free_of_unallocated_block_returns_false() {
		let store = setup();
		let (block_id, _) = store.alloc_block().unwrap();
		store.free_block(block_id).unwrap();
		assert!(!store.free_block(block_id).unwrap());
	}
}
