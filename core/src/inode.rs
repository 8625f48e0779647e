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

//! Inode records and the inode manager (C4): allocate/free logical inode
//! ids, and maintain the `inode_id -> carrier block_id` table.
//!
//! An inode record is a fixed header (type tag + attributes + slot count)
//! followed by a tail region of `nblocks` entries. The same tail bytes carry
//! two different meanings depending on which layer reads them:
//!
//! - [`FileOperation`](crate::fileop::FileOperation) (C5) always reads/writes
//!   the tail as `nblocks` local 8-byte block ids (the last one being the
//!   indirect block pointer).
//! - The metadata server (C8) additionally reinterprets the same tail bytes
//!   of a distributed file's carrier block as packed [`BlockInfo`] triples,
//!   bypassing `FileOperation` entirely for that purpose. Which store picks
//!   which entry width happens purely through the `nblocks` value chosen at
//!   construction time -- nothing here hardcodes it to one or the other.

use std::sync::Arc;

use crate::bitmap::{Bitmap, BlockIterator};
use crate::block::BlockManager;
use crate::error::{ErrorKind, Result};
use crate::types::{BlockId, InodeId, INVALID_BLOCK_ID};

/// Byte size of the fixed inode header: type (1, padded to 4) + nblocks (4) +
/// four `u64` attribute fields.
pub const HEADER_SIZE: usize = 4 + 4 + 8 * 4;

/// Byte width of one local (block-id) slot entry.
pub const LOCAL_ENTRY_SIZE: usize = 8;

/// What an inode represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InodeType {
	Unknown = 0,
	File = 1,
	Directory = 2,
}

impl InodeType {
	pub fn from_u8(v: u8) -> Self {
		match v {
			1 => InodeType::File,
			2 => InodeType::Directory,
			_ => InodeType::Unknown,
		}
	}
}

/// Size and timestamps tracked by every inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InodeAttr {
	pub size: u64,
	pub atime: u64,
	pub mtime: u64,
	pub ctime: u64,
}

impl InodeAttr {
	pub fn set_all_times(&mut self, now: u64) {
		self.atime = now;
		self.mtime = now;
		self.ctime = now;
	}
}

/// In-memory view of an inode record's fixed header (the tail slots live
/// directly in the carrier block's byte buffer and are accessed through the
/// free functions below, not copied into this struct).
#[derive(Debug, Clone, Copy)]
pub struct Inode {
	pub ty: InodeType,
	pub nblocks: u32,
	pub attr: InodeAttr,
}

impl Inode {
	pub fn new(ty: InodeType, nblocks: u32, now: u64) -> Self {
		Inode {
			ty,
			nblocks,
			attr: InodeAttr {
				size: 0,
				atime: now,
				mtime: now,
				ctime: now,
			},
		}
	}

	/// Writes the header into `buf` (a full block) and invalidates every
	/// slot in the tail region.
	pub fn write_fresh(&self, buf: &mut [u8]) {
		self.encode_header(buf);
		for idx in 0..self.nblocks {
			write_local_slot(buf, idx as usize, INVALID_BLOCK_ID);
		}
	}

	pub fn encode_header(&self, buf: &mut [u8]) {
		buf[0] = self.ty as u8;
		buf[1..4].copy_from_slice(&[0, 0, 0]);
		buf[4..8].copy_from_slice(&self.nblocks.to_le_bytes());
		buf[8..16].copy_from_slice(&self.attr.size.to_le_bytes());
		buf[16..24].copy_from_slice(&self.attr.atime.to_le_bytes());
		buf[24..32].copy_from_slice(&self.attr.mtime.to_le_bytes());
		buf[32..40].copy_from_slice(&self.attr.ctime.to_le_bytes());
	}

	pub fn decode_header(buf: &[u8]) -> Self {
		Inode {
			ty: InodeType::from_u8(buf[0]),
			nblocks: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
			attr: InodeAttr {
				size: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
				atime: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
				mtime: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
				ctime: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
			},
		}
	}

	/// Number of direct slots, i.e. all but the last (indirect) slot.
	pub fn direct_cap(&self) -> usize {
		self.nblocks as usize - 1
	}
}

#[inline]
fn local_slot_offset(index: usize) -> usize {
	HEADER_SIZE + index * LOCAL_ENTRY_SIZE
}

pub fn read_local_slot(buf: &[u8], index: usize) -> BlockId {
	let off = local_slot_offset(index);
	u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}

pub fn write_local_slot(buf: &mut [u8], index: usize, value: BlockId) {
	let off = local_slot_offset(index);
	buf[off..off + 8].copy_from_slice(&value.to_le_bytes());
}

/// Allocates/frees inode ids and maintains the `inode_id -> carrier block`
/// table. Owns `[1, 1 + n_table_blocks)` as the table and
/// `[1 + n_table_blocks, 1 + n_table_blocks + n_bitmap_blocks)` as the
/// allocation bitmap.
pub struct InodeManager {
	bm: Arc<BlockManager>,
	n_table_blocks: u64,
	n_bitmap_blocks: u64,
	max_inode_supported: u64,
}

impl InodeManager {
	/// `max_inode_supported` is rounded up to a whole number of bitmap
	/// blocks; the rounded value is what [`InodeManager::max_inode_supported`]
	/// reports back. `is_new` zeroes the table and bitmap regions.
	pub fn new(bm: Arc<BlockManager>, max_inode_supported: u64, is_new: bool) -> Result<Self> {
		let block_size = bm.block_size() as u64;
		let inode_bits_per_block = block_size * 8;
		let mut n_bitmap_blocks = max_inode_supported / inode_bits_per_block;
		if n_bitmap_blocks * inode_bits_per_block < max_inode_supported {
			n_bitmap_blocks += 1;
		}
		let max_inode_supported = n_bitmap_blocks * inode_bits_per_block;

		let inode_per_block = block_size / LOCAL_ENTRY_SIZE as u64;
		let mut n_table_blocks = max_inode_supported / inode_per_block;
		if n_table_blocks * inode_per_block < max_inode_supported {
			n_table_blocks += 1;
		}

		if is_new {
			for i in 0..n_table_blocks {
				bm.zero_block(1 + i)?;
			}
			for i in 0..n_bitmap_blocks {
				bm.zero_block(1 + n_table_blocks + i)?;
			}
		}

		Ok(InodeManager {
			bm,
			n_table_blocks,
			n_bitmap_blocks,
			max_inode_supported,
		})
	}

	pub fn max_inode_supported(&self) -> u64 {
		self.max_inode_supported
	}

	pub fn table_region(&self) -> (BlockId, BlockId) {
		(1, 1 + self.n_table_blocks)
	}

	pub fn bitmap_region(&self) -> (BlockId, BlockId) {
		(1 + self.n_table_blocks, 1 + self.n_table_blocks + self.n_bitmap_blocks)
	}

	fn inode_per_block(&self) -> u64 {
		self.bm.block_size() as u64 / LOCAL_ENTRY_SIZE as u64
	}

	/// Writes `block_id` into the table slot for raw index `raw_index`.
	pub fn set_table(&self, raw_index: u64, block_id: BlockId) -> Result<()> {
		if raw_index >= self.max_inode_supported {
			return Err(ErrorKind::Invalid.into());
		}
		let inode_per_block = self.inode_per_block();
		let table_block = 1 + raw_index / inode_per_block;
		let offset = (raw_index % inode_per_block) as usize * LOCAL_ENTRY_SIZE;
		self.bm.write_partial_block(table_block, &block_id.to_le_bytes(), offset, LOCAL_ENTRY_SIZE)
	}

	/// Reads the carrier block id stored for `id`.
	pub fn get(&self, id: InodeId) -> Result<BlockId> {
		let raw_index = crate::types::logic_to_raw(id);
		let inode_per_block = self.inode_per_block();
		let table_block = 1 + raw_index / inode_per_block;
		let offset = (raw_index % inode_per_block) as usize;
		let block_size = self.bm.block_size();
		let mut buf = vec![0u8; block_size];
		self.bm.read_block(table_block, &mut buf)?;
		let off = offset * LOCAL_ENTRY_SIZE;
		Ok(u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()))
	}

	/// Allocates the first free inode id, binding it to `carrier_block_id`
	/// and writing a freshly-initialised record there.
	pub fn allocate_inode(&self, ty: InodeType, carrier_block_id: BlockId, nblocks: u32, now: u64) -> Result<InodeId> {
		let (bitmap_first, bitmap_last) = self.bitmap_region();
		let mut iter = BlockIterator::new(&self.bm, bitmap_first, bitmap_last)?;
		let bits_per_block = self.bm.block_size() * 8;
		let mut block_idx = 0u64;
		while iter.has_next() {
			let block_size = self.bm.block_size();
			let mut bitmap = Bitmap::new(iter.current_block_mut(), block_size);
			if let Some(bit) = bitmap.find_first_free() {
				bitmap.set(bit);
				iter.flush_cur_block()?;

				let raw_index = block_idx * bits_per_block as u64 + bit as u64;
				self.set_table(raw_index, carrier_block_id)?;

				let inode = Inode::new(ty, nblocks, now);
				let mut block_buf = vec![0u8; self.bm.block_size()];
				inode.write_fresh(&mut block_buf);
				self.bm.write_block(carrier_block_id, &block_buf)?;

				return Ok(crate::types::raw_to_logic(raw_index));
			}
			iter.advance()?;
			block_idx += 1;
		}
		Err(ErrorKind::OutOfResource.into())
	}

	/// Reads the carrier block of `id` in full into `buf`
	/// (`bm.block_size()` bytes).
	pub fn read_inode(&self, id: InodeId, buf: &mut [u8]) -> Result<BlockId> {
		let raw_index = crate::types::logic_to_raw(id);
		if id == 0 || raw_index >= self.max_inode_supported {
			return Err(ErrorKind::InvalidArg.into());
		}
		let block_id = self.get(id)?;
		if block_id == INVALID_BLOCK_ID {
			return Err(ErrorKind::InvalidArg.into());
		}
		self.bm.read_block(block_id, buf)?;
		Ok(block_id)
	}

	/// Clears the table entry and bitmap bit for `id`. Does not touch any
	/// data blocks referenced by the inode -- the caller must drain content
	/// first.
	pub fn free_inode(&self, id: InodeId) -> Result<()> {
		let raw_index = crate::types::logic_to_raw(id);
		if raw_index >= self.max_inode_supported {
			return Err(ErrorKind::InvalidArg.into());
		}
		self.set_table(raw_index, INVALID_BLOCK_ID)?;

		let inode_bits_per_block = self.bm.block_size() as u64 * 8;
		let (bitmap_first, _) = self.bitmap_region();
		let bitmap_block = bitmap_first + raw_index / inode_bits_per_block;
		let bit_in_block = (raw_index % inode_bits_per_block) as usize;

		let block_size = self.bm.block_size();
		let mut buf = vec![0u8; block_size];
		self.bm.read_block(bitmap_block, &mut buf)?;
		let mut bitmap = Bitmap::new(&mut buf, block_size);
		bitmap.clear(bit_in_block);
		self.bm.write_block(bitmap_block, &buf)
	}

	pub fn get_attr(&self, id: InodeId) -> Result<InodeAttr> {
		let block_size = self.bm.block_size();
		let mut buf = vec![0u8; block_size];
		self.read_inode(id, &mut buf)?;
		Ok(Inode::decode_header(&buf).attr)
	}

	pub fn get_type(&self, id: InodeId) -> Result<InodeType> {
		let block_size = self.bm.block_size();
		let mut buf = vec![0u8; block_size];
		self.read_inode(id, &mut buf)?;
		Ok(Inode::decode_header(&buf).ty)
	}

	pub fn get_type_attr(&self, id: InodeId) -> Result<(InodeType, InodeAttr)> {
		let block_size = self.bm.block_size();
		let mut buf = vec![0u8; block_size];
		self.read_inode(id, &mut buf)?;
		let inode = Inode::decode_header(&buf);
		Ok((inode.ty, inode.attr))
	}

	pub fn free_inode_count(&self) -> Result<u64> {
		let (first, last) = self.bitmap_region();
		let mut iter = BlockIterator::new(&self.bm, first, last)?;
		let mut count = 0u64;
		while iter.has_next() {
			let block_size = self.bm.block_size();
			let bitmap = Bitmap::new(iter.current_block_mut(), block_size);
			count += bitmap.count_zeros() as u64;
			iter.advance()?;
		}
		Ok(count)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;

	fn setup() -> InodeManager {
		let dir = tempfile::tempdir().unwrap();
		let (bm, is_new) = BlockManager::open(dir.path().join("s.img"), 100, 64).unwrap();
		std::mem::forget(dir);
		InodeManager::new(Arc::new(bm), 8, is_new).unwrap()
	}

	#[test]
	fn allocate_inode_assigns_first_id_and_roundtrips_attrs() {
		let inodes = setup();
		let id = inodes.allocate_inode(InodeType::File, 70, 4, 1000).unwrap();
		assert_eq!(id, 1);
		let (ty, attr) = inodes.get_type_attr(id).unwrap();
		assert_eq!(ty, InodeType::File);
		assert_eq!(attr.size, 0);
		assert_eq!(attr.ctime, 1000);
	}

	#[test]
	fn free_then_reallocate_reuses_the_slot() {
		let inodes = setup();
		let id = inodes.allocate_inode(InodeType::File, 70, 4, 1000).unwrap();
		inodes.free_inode(id).unwrap();
		let id2 = inodes.allocate_inode(InodeType::Directory, 71, 4, 2000).unwrap();
		assert_eq!(id2, id);
		assert_eq!(inodes.get_type(id2).unwrap(), InodeType::Directory);
	}

	#[test]
	fn read_inode_zero_is_rejected() {
		let inodes = setup();
		assert_eq!(inodes.read_inode(0, &mut [0u8; 64]).unwrap_err().kind(), ErrorKind::InvalidArg);
	}

	#[test]
	fn free_inode_count_tracks_allocations() {
		let inodes = setup();
		let before = inodes.free_inode_count().unwrap();
		let id = inodes.allocate_inode(InodeType::File, 70, 4, 1000).unwrap();
		assert_eq!(inodes.free_inode_count().unwrap(), before - 1);
		inodes.free_inode(id).unwrap();
		assert_eq!(inodes.free_inode_count().unwrap(), before);
	}
}
