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

//! Allocate/free data block ids using a bitmap region of a [`BlockManager`].

use std::sync::Arc;

use crate::bitmap::{Bitmap, BlockIterator};
use crate::block::BlockManager;
use crate::error::{ErrorKind, Result};
use crate::types::BlockId;

/// Owns `[bitmap_offset, bitmap_offset + n_bitmap_blocks)` as a data
/// allocation bitmap; the data region starts immediately after.
///
/// Allocation always picks the lowest clear bit -- no sparse strategy, no
/// preferred placement. This keeps behavior deterministic and easy to test,
/// at the cost of fragmentation-awareness.
pub struct BlockAllocator {
	bm: Arc<BlockManager>,
	bitmap_offset: BlockId,
	n_bitmap_blocks: u64,
}

impl BlockAllocator {
	/// `is_new` zeroes the owned bitmap blocks; otherwise the existing state
	/// on disk is trusted as-is.
	pub fn new(bm: Arc<BlockManager>, bitmap_offset: BlockId, n_bitmap_blocks: u64, is_new: bool) -> Result<Self> {
		if is_new {
			for b in bitmap_offset..bitmap_offset + n_bitmap_blocks {
				bm.zero_block(b)?;
			}
		}
		Ok(BlockAllocator {
			bm,
			bitmap_offset,
			n_bitmap_blocks,
		})
	}

	pub fn bitmap_offset(&self) -> BlockId {
		self.bitmap_offset
	}

	pub fn data_region_start(&self) -> BlockId {
		self.bitmap_offset + self.n_bitmap_blocks
	}

	fn bits_per_block(&self) -> usize {
		self.bm.block_size() * 8
	}

	/// Permanently marks every bit from `usable_blocks` onward as allocated.
	///
	/// `n_bitmap_blocks` is sized in whole blocks, so a bitmap almost always
	/// has more bits than there are real blocks backing the store past
	/// `data_region_start()` -- without this, `allocate()` would eventually
	/// hand out a `block_id >= total_blocks` instead of failing closed with
	/// `OUT_OF_RESOURCE`, and every later read/write of it would fail with an
	/// unrelated `IoError`/`InvalidArg`. Callers invoke this once, at format
	/// time (`is_new == true`), with the real block count the store was
	/// opened with.
	pub fn mark_unusable_tail(&self, usable_blocks: u64) -> Result<()> {
		let bits_per_block = self.bits_per_block() as u64;
		let total_bits = self.n_bitmap_blocks * bits_per_block;
		if usable_blocks >= total_bits {
			return Ok(());
		}
		let mut iter = BlockIterator::new(&self.bm, self.bitmap_offset, self.bitmap_offset + self.n_bitmap_blocks)?;
		let mut block_idx = 0u64;
		while iter.has_next() {
			let block_size = self.bm.block_size();
			let base = block_idx * bits_per_block;
			let mut bitmap = Bitmap::new(iter.current_block_mut(), block_size);
			for bit in 0..bits_per_block {
				let linear = base + bit;
				if linear >= usable_blocks && linear < total_bits {
					bitmap.set(bit as usize);
				}
			}
			iter.flush_cur_block()?;
			iter.advance()?;
			block_idx += 1;
		}
		Ok(())
	}

	/// Scans the bitmap in order and claims the first clear bit, returning
	/// the absolute block id `data_region_start() + linear_bit_index`.
	pub fn allocate(&self) -> Result<BlockId> {
		let mut iter = BlockIterator::new(&self.bm, self.bitmap_offset, self.bitmap_offset + self.n_bitmap_blocks)?;
		let bits_per_block = self.bits_per_block();
		let mut block_idx = 0u64;
		while iter.has_next() {
			let block_size = self.bm.block_size();
			let mut bitmap = Bitmap::new(iter.current_block_mut(), block_size);
			if let Some(bit) = bitmap.find_first_free() {
				bitmap.set(bit);
				iter.flush_cur_block()?;
				let linear_bit_index = block_idx * bits_per_block as u64 + bit as u64;
				return Ok(self.data_region_start() + linear_bit_index);
			}
			iter.advance()?;
			block_idx += 1;
		}
		Err(ErrorKind::OutOfResource.into())
	}

	/// Clears the bit owning `id`. Fails if the bit was already clear.
	pub fn deallocate(&self, id: BlockId) -> Result<()> {
		if id < self.data_region_start() {
			return Err(ErrorKind::InvalidArg.into());
		}
		let linear_bit_index = id - self.data_region_start();
		let bits_per_block = self.bits_per_block() as u64;
		let block_idx = linear_bit_index / bits_per_block;
		let bit_in_block = (linear_bit_index % bits_per_block) as usize;
		if block_idx >= self.n_bitmap_blocks {
			return Err(ErrorKind::InvalidArg.into());
		}

		let block_size = self.bm.block_size();
		let mut buf = vec![0u8; block_size];
		let block_id = self.bitmap_offset + block_idx;
		self.bm.read_block(block_id, &mut buf)?;
		let mut bitmap = Bitmap::new(&mut buf, block_size);
		if !bitmap.get(bit_in_block) {
			return Err(ErrorKind::Invalid.into());
		}
		bitmap.clear(bit_in_block);
		self.bm.write_block(block_id, &buf)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn setup(total_blocks: u64, n_bitmap_blocks: u64) -> BlockAllocator {
		let dir = tempfile::tempdir().unwrap();
		let (bm, is_new) = BlockManager::open(dir.path().join("s.img"), total_blocks, 64).unwrap();
		std::mem::forget(dir);
		BlockAllocator::new(Arc::new(bm), 1, n_bitmap_blocks, is_new).unwrap()
	}

	#[test]
	fn allocate_picks_lowest_free_bit_in_order() {
		let alloc = setup(16, 1);
		let data_start = alloc.data_region_start();
		assert_eq!(alloc.allocate().unwrap(), data_start);
		assert_eq!(alloc.allocate().unwrap(), data_start + 1);
		assert_eq!(alloc.allocate().unwrap(), data_start + 2);
	}

	#[test]
	fn freed_block_is_reused() {
		let alloc = setup(16, 1);
		let first = alloc.allocate().unwrap();
		let _second = alloc.allocate().unwrap();
		alloc.deallocate(first).unwrap();
		assert_eq!(alloc.allocate().unwrap(), first);
	}

	#[test]
	fn double_free_fails() {
		let alloc = setup(16, 1);
		let b = alloc.allocate().unwrap();
		alloc.deallocate(b).unwrap();
		assert_eq!(alloc.deallocate(b).unwrap_err().kind(), crate::error::ErrorKind::Invalid);
	}

	#[test]
	fn unusable_tail_bits_are_never_handed_out() {
		// 512 bits of capacity in the one bitmap block, but only 3 real data
		// blocks exist past data_region_start(); mark the other 509 bits.
		let alloc = setup(1 + 1 + 3, 1);
		alloc.mark_unusable_tail(3).unwrap();
		let data_start = alloc.data_region_start();
		assert_eq!(alloc.allocate().unwrap(), data_start);
		assert_eq!(alloc.allocate().unwrap(), data_start + 1);
		assert_eq!(alloc.allocate().unwrap(), data_start + 2);
		assert_eq!(alloc.allocate().unwrap_err().kind(), crate::error::ErrorKind::OutOfResource);
	}

	#[test]
	fn exhaustion_reports_out_of_resource() {
		// 64-byte blocks => 512 bits per bitmap block; bound the device tightly
		// so the bitmap region itself caps how many data blocks exist.
		let alloc = setup(1 + 1 + 4, 1);
		for _ in 0..4 {
			alloc.allocate().unwrap();
		}
		assert_eq!(alloc.allocate().unwrap_err().kind(), crate::error::ErrorKind::OutOfResource);
	}
}
