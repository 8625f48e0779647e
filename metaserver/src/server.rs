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

//! Binds the metadata server's nine RPCs (spec §4.2-§4.8, plus `set_size`)
//! onto an [`RpcServer`], and owns the `machine_id -> RpcClient` map used to fan
//! `allocate_block`/`free_block` out to the data servers that actually own
//! the blocks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ferrofs_core::error::{ErrorKind, Result};
use ferrofs_core::inode::InodeType;
use ferrofs_core::types::{BlockId, BlockInfo, InodeId, MachineId, Version};
use ferrofs_rpc::{RpcClient, RpcServer};
use rand::Rng;

use crate::store::MetadataStore;

type ClientMap = Mutex<HashMap<MachineId, Arc<RpcClient>>>;

pub struct MetadataServer {
	store: Arc<MetadataStore>,
	clients: Arc<ClientMap>,
	num_data_servers: Arc<AtomicU64>,
	rpc: RpcServer,
}

impl MetadataServer {
	pub fn new(store: MetadataStore, address: &str, port: u16) -> Result<Self> {
		let rpc = RpcServer::bind_addr(address, port)?;
		let mut server = MetadataServer {
			store: Arc::new(store),
			clients: Arc::new(Mutex::new(HashMap::new())),
			num_data_servers: Arc::new(AtomicU64::new(0)),
			rpc,
		};
		server.bind_handlers();
		Ok(server)
	}

	pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
		self.rpc.local_addr()
	}

	/// Registers a data server so `allocate_block` can pick it. Returns the
	/// `machine_id` it was assigned.
	pub fn reg_server(&self, address: &str, port: u16, reliable: bool) -> MachineId {
		let machine_id = self.num_data_servers.fetch_add(1, Ordering::SeqCst) + 1;
		self.clients.lock().unwrap().insert(machine_id, Arc::new(RpcClient::new(address, port, reliable)));
		machine_id
	}

	/// Binds every RPC so a domain-level `Err` collapses to the sentinel
	/// value spec §7 assigns its return type (`0` for inode ids, `false` for
	/// booleans, an empty vector for lists, an all-invalid `BlockInfo` for
	/// block allocation) rather than surfacing as a transport-level error.
	/// Only a malformed argument list (caught before the handler's body
	/// below) or an unknown method name produces a real RPC error -- spec's
	/// point is exactly that a caller cannot tell "not found" apart from "I/O
	/// failure" once past the argument-decoding step.
	fn bind_handlers(&mut self) {
		let store = Arc::clone(&self.store);
		self.rpc.register("mknode", move |args| {
			let (ty, parent, name): (u8, InodeId, String) = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			let id = store.mknode(InodeType::from_u8(ty), parent, &name).unwrap_or(0);
			Ok(serde_json::to_value(id).unwrap())
		});

		let store = Arc::clone(&self.store);
		self.rpc.register("unlink", move |args| {
			let (parent, name): (InodeId, String) = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			let ok = store.unlink(parent, &name).is_ok();
			Ok(serde_json::to_value(ok).unwrap())
		});

		let store = Arc::clone(&self.store);
		self.rpc.register("lookup", move |args| {
			let (parent, name): (InodeId, String) = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			let id = store.lookup(parent, &name).unwrap_or(0);
			Ok(serde_json::to_value(id).unwrap())
		});

		let store = Arc::clone(&self.store);
		self.rpc.register("readdir", move |args| {
			let id: InodeId = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			let entries = store.readdir(id).unwrap_or_default();
			Ok(serde_json::to_value(entries).unwrap())
		});

		let store = Arc::clone(&self.store);
		self.rpc.register("get_type_attr", move |args| {
			let id: InodeId = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			let (ty, attr) = store.get_type_attr(id).unwrap_or((InodeType::Unknown, Default::default()));
			Ok(serde_json::to_value((ty as u8, attr.size, attr.atime, attr.mtime, attr.ctime)).unwrap())
		});

		let store = Arc::clone(&self.store);
		self.rpc.register("get_block_map", move |args| {
			let id: InodeId = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			let map = store.get_block_map(id).unwrap_or_default();
			let wire: Vec<(BlockId, MachineId, Version)> = map.into_iter().map(|b| (b.block_id, b.machine_id, b.version)).collect();
			Ok(serde_json::to_value(wire).unwrap())
		});

		let store = Arc::clone(&self.store);
		let clients = Arc::clone(&self.clients);
		let num_data_servers = Arc::clone(&self.num_data_servers);
		self.rpc.register("allocate_block", move |args| {
			let id: InodeId = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			let info = allocate_block(&store, &clients, &num_data_servers, id).unwrap_or(BlockInfo::INVALID);
			Ok(serde_json::to_value((info.block_id, info.machine_id, info.version)).unwrap())
		});

		let store = Arc::clone(&self.store);
		let clients = Arc::clone(&self.clients);
		self.rpc.register("free_block", move |args| {
			let (id, block_id, machine_id): (InodeId, BlockId, MachineId) = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			let freed = free_block(&store, &clients, id, block_id, machine_id).unwrap_or(false);
			Ok(serde_json::to_value(freed).unwrap())
		});

		let store = Arc::clone(&self.store);
		self.rpc.register("set_size", move |args| {
			let (id, size): (InodeId, u64) = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			let ok = store.set_size(id, size).is_ok();
			Ok(serde_json::to_value(ok).unwrap())
		});
	}

	/// Starts the worker pool. Idempotent, matching `RpcServer::run`.
	pub fn run(&self, num_worker_threads: usize) -> bool {
		self.rpc.run(num_worker_threads)
	}
}

/// Picks a data server at random among the registered set, asks it to
/// allocate a block, and records the resulting `BlockInfo` triple in `id`'s
/// block map (spec §4.8's `allocate_block`).
fn allocate_block(store: &MetadataStore, clients: &ClientMap, num_data_servers: &AtomicU64, id: InodeId) -> Result<BlockInfo> {
	let n = num_data_servers.load(Ordering::SeqCst);
	if n == 0 {
		return Err(ErrorKind::OutOfResource.into());
	}
	let machine_id = rand::thread_rng().gen_range(1..=n);
	let client = clients.lock().unwrap().get(&machine_id).cloned().ok_or(ErrorKind::Invalid)?;
	let (block_id, version): (BlockId, Version) = client.call("alloc_block", &())?;
	let info = BlockInfo { block_id, machine_id, version };
	store.append_block_info(id, info)?;
	Ok(info)
}

/// Clears `id`'s block-map entry for `block_id` first, then RPCs the owning
/// data server (`machine_id`) to actually free it.
///
/// The reference metadata server frees the block through its *own* local
/// block allocator instead of asking the owning data server -- a block id on
/// a remote store has no relationship to this server's own bitmap, so that
/// call either corrupts an unrelated local block or fails outright depending
/// on which id happens to collide. This deliberately does not replicate that:
/// freeing goes out over RPC to the data server that actually owns the block.
fn free_block(store: &MetadataStore, clients: &ClientMap, id: InodeId, block_id: BlockId, machine_id: MachineId) -> Result<bool> {
	match store.clear_block_info(id, block_id) {
		Ok(_) => {
			let client = clients.lock().unwrap().get(&machine_id).cloned();
			match client {
				Some(c) => c.call::<_, bool>("free_block", &block_id),
				None => Ok(false),
			}
		}
		Err(e) if e.kind() == ErrorKind::NotExist => Ok(false),
		Err(e) => Err(e),
	}
}
