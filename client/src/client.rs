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

//! The POSIX-shaped client library named in spec §1: composes metadata RPCs
//! against the metadata server (C8) with parallel block-level RPCs against
//! whichever data servers (C7) own a file's blocks.
//!
//! `FsClient` never touches a backing file directly -- everything here is an
//! RPC to one of the two server crates. Per-block data RPCs for a single
//! `read`/`write` call fan out across data servers concurrently with
//! `std::thread::scope`, matching spec §1's "parallel block-level RPCs".

use std::collections::HashMap;

use ferrofs_core::error::{ErrorKind, Result};
use ferrofs_core::inode::InodeType;
use ferrofs_core::types::{BlockId, BlockInfo, InodeId, MachineId, Version};
use ferrofs_rpc::RpcClient;

use crate::config::ClientConfig;

/// Attributes of an inode, as returned by `get_type_attr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
	pub ty: InodeType,
	pub size: u64,
	pub atime: u64,
	pub mtime: u64,
	pub ctime: u64,
}

/// Composes one metadata-server connection with one connection per
/// registered data server.
pub struct FsClient {
	meta: RpcClient,
	data: HashMap<MachineId, RpcClient>,
	block_size: u64,
}

impl FsClient {
	/// `config.data_servers` must list the same endpoints, in the same
	/// order, that were passed to the metadata server's own
	/// `reg_server` calls at startup -- `reg_server` assigns `machine_id`s
	/// sequentially starting at 1, and nothing in the RPC surface exposes
	/// that mapping back to a client, so this is the contract a deployment's
	/// process host must uphold.
	pub fn connect(config: &ClientConfig) -> Self {
		let meta = RpcClient::new(config.metaserver.address.clone(), config.metaserver.port, config.metaserver.reliable);
		let mut data = HashMap::new();
		for (i, ep) in config.data_servers.iter().enumerate() {
			let machine_id = (i + 1) as MachineId;
			log::debug!("client: registering data server {}:{} as machine {machine_id}", ep.address, ep.port);
			data.insert(machine_id, RpcClient::new(ep.address.clone(), ep.port, ep.reliable));
		}
		FsClient {
			meta,
			data,
			block_size: config.block_size as u64,
		}
	}

	pub fn mknode(&self, ty: InodeType, parent: InodeId, name: &str) -> Result<InodeId> {
		let id: InodeId = self.meta.call("mknode", &(ty as u8, parent, name))?;
		if id == 0 {
			return Err(ErrorKind::AlreadyExist.into());
		}
		Ok(id)
	}

	pub fn unlink(&self, parent: InodeId, name: &str) -> Result<()> {
		let ok: bool = self.meta.call("unlink", &(parent, name))?;
		if ok {
			Ok(())
		} else {
			Err(ErrorKind::NotExist.into())
		}
	}

	pub fn lookup(&self, parent: InodeId, name: &str) -> Result<InodeId> {
		let id: InodeId = self.meta.call("lookup", &(parent, name))?;
		if id == 0 {
			Err(ErrorKind::NotExist.into())
		} else {
			Ok(id)
		}
	}

	pub fn readdir(&self, id: InodeId) -> Result<Vec<(String, InodeId)>> {
		self.meta.call("readdir", &id)
	}

	pub fn getattr(&self, id: InodeId) -> Result<FileAttr> {
		let (ty, size, atime, mtime, ctime): (u8, u64, u64, u64, u64) = self.meta.call("get_type_attr", &id)?;
		Ok(FileAttr {
			ty: InodeType::from_u8(ty),
			size,
			atime,
			mtime,
			ctime,
		})
	}

	fn block_map(&self, id: InodeId) -> Result<Vec<BlockInfo>> {
		let wire: Vec<(BlockId, MachineId, Version)> = self.meta.call("get_block_map", &id)?;
		Ok(wire
			.into_iter()
			.map(|(block_id, machine_id, version)| BlockInfo { block_id, machine_id, version })
			.collect())
	}

	fn data_client(&self, machine_id: MachineId) -> Result<&RpcClient> {
		self.data.get(&machine_id).ok_or_else(|| ErrorKind::Invalid.into())
	}

	/// Reads up to `len` bytes starting at `offset`, clamped to the file's
	/// current size.
	pub fn read(&self, id: InodeId, offset: u64, len: u64) -> Result<Vec<u8>> {
		let attr = self.getattr(id)?;
		let end = (offset + len).min(attr.size);
		if offset >= end {
			return Ok(Vec::new());
		}
		let map = self.block_map(id)?;
		let block_size = self.block_size;
		let first_block = (offset / block_size) as usize;
		let last_block = ((end - 1) / block_size) as usize;

		let mut blocks: Vec<Option<Vec<u8>>> = vec![None; last_block - first_block + 1];
		std::thread::scope(|scope| -> Result<()> {
			let mut handles = Vec::new();
			for block_idx in first_block..=last_block {
				let info = *map.get(block_idx).ok_or(ErrorKind::Invalid)?;
				let client = self.data_client(info.machine_id)?;
				handles.push((
					block_idx - first_block,
					scope.spawn(move || client.call::<_, Vec<u8>>("read_data", &(info.block_id, 0usize, block_size as usize, info.version))),
				));
			}
			for (slot, handle) in handles {
				blocks[slot] = Some(handle.join().map_err(|_| ErrorKind::IoError)??);
			}
			Ok(())
		})?;

		let mut out = Vec::with_capacity((end - offset) as usize);
		for (slot, block_idx) in (first_block..=last_block).enumerate() {
			let block_bytes = blocks[slot].take().unwrap();
			let block_start = block_idx as u64 * block_size;
			let lo = offset.saturating_sub(block_start) as usize;
			let hi = (end - block_start).min(block_size) as usize;
			if block_bytes.len() < hi {
				return Err(ErrorKind::BadResponse.into());
			}
			out.extend_from_slice(&block_bytes[lo..hi]);
		}
		Ok(out)
	}

	/// Writes `data` at `offset`, growing the block map through
	/// `allocate_block` as needed and updating `attr.size` when the write
	/// extends the file.
	pub fn write(&self, id: InodeId, offset: u64, data: &[u8]) -> Result<()> {
		if data.is_empty() {
			return Ok(());
		}
		let block_size = self.block_size;
		let end = offset + data.len() as u64;
		let last_block = ((end - 1) / block_size) as usize;
		let first_block = (offset / block_size) as usize;

		let mut map = self.block_map(id)?;
		while map.len() <= last_block {
			let (block_id, machine_id, version): (BlockId, MachineId, Version) = self.meta.call("allocate_block", &id)?;
			if block_id == 0 {
				return Err(ErrorKind::OutOfResource.into());
			}
			map.push(BlockInfo { block_id, machine_id, version });
		}

		std::thread::scope(|scope| -> Result<()> {
			let mut handles = Vec::new();
			for block_idx in first_block..=last_block {
				let info = map[block_idx];
				let block_start = block_idx as u64 * block_size;
				let block_end = block_start + block_size;
				let write_lo = offset.max(block_start);
				let write_hi = end.min(block_end);
				let offset_in_block = (write_lo - block_start) as usize;
				let chunk = data[(write_lo - offset) as usize..(write_hi - offset) as usize].to_vec();
				let client = self.data_client(info.machine_id)?;
				handles.push(scope.spawn(move || client.call::<_, bool>("write_data", &(info.block_id, offset_in_block, chunk))));
			}
			for handle in handles {
				if !handle.join().map_err(|_| ErrorKind::IoError)?? {
					return Err(ErrorKind::IoError.into());
				}
			}
			Ok(())
		})?;

		let attr = self.getattr(id)?;
		if end > attr.size {
			let _: bool = self.meta.call("set_size", &(id, end))?;
		}
		Ok(())
	}

	/// Grows or shrinks file `id` to `size`.
	///
	/// Shrinking frees every trailing block through `free_block`. Growing
	/// allocates fresh placeholder blocks but, unlike
	/// `FileOperation::resize`'s local zero-fill (P3), cannot guarantee
	/// zeroed content for a distributed file: a freshly allocated data-server
	/// block holds arbitrary bytes until a client writes it (spec §5).
	pub fn truncate(&self, id: InodeId, size: u64) -> Result<()> {
		let block_size = self.block_size;
		let mut map = self.block_map(id)?;
		let new_blocks = if size == 0 { 0 } else { ((size - 1) / block_size) as usize + 1 };

		if new_blocks > map.len() {
			while map.len() < new_blocks {
				let (block_id, machine_id, version): (BlockId, MachineId, Version) = self.meta.call("allocate_block", &id)?;
				if block_id == 0 {
					return Err(ErrorKind::OutOfResource.into());
				}
				map.push(BlockInfo { block_id, machine_id, version });
			}
		} else {
			for info in map.iter().skip(new_blocks) {
				let _: bool = self.meta.call("free_block", &(id, info.block_id, info.machine_id))?;
			}
		}
		let _: bool = self.meta.call("set_size", &(id, size))?;
		Ok(())
	}
}
