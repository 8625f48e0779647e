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

//! Binds the data server's four RPCs (spec §4.7) onto a [`RpcServer`].

use std::sync::Arc;

use ferrofs_core::error::ErrorKind;
use ferrofs_rpc::RpcServer;

use crate::store::DataStore;

pub struct DataServer {
	store: Arc<DataStore>,
	rpc: RpcServer,
}

impl DataServer {
	pub fn new(store: DataStore, address: &str, port: u16) -> ferrofs_core::error::Result<Self> {
		let rpc = RpcServer::bind_addr(address, port)?;
		let mut server = DataServer { store: Arc::new(store), rpc };
		server.bind_handlers();
		Ok(server)
	}

	pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
		self.rpc.local_addr()
	}

	/// Like the metadata server, every handler below collapses a domain
	/// error to the sentinel spec §7 assigns its return type -- `(0, 0)` for
	/// `alloc_block`, `false` for `free_block` -- instead of a transport-level
	/// error. `read_data`/`write_data` already return their own sentinels
	/// (empty byte vector / `false`) from `DataStore` directly.
	fn bind_handlers(&mut self) {
		let store = Arc::clone(&self.store);
		self.rpc.register("alloc_block", move |_args| {
			let (block_id, version) = store.alloc_block().unwrap_or((0, 0));
			Ok(serde_json::to_value((block_id, version)).unwrap())
		});

		let store = Arc::clone(&self.store);
		self.rpc.register("free_block", move |args| {
			let block_id = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			Ok(serde_json::to_value(store.free_block(block_id).unwrap_or(false)).unwrap())
		});

		let store = Arc::clone(&self.store);
		self.rpc.register("read_data", move |args| {
			let (block_id, offset, len, version) = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			Ok(serde_json::to_value(store.read_data(block_id, offset, len, version)).unwrap())
		});

		let store = Arc::clone(&self.store);
		self.rpc.register("write_data", move |args| {
			let (block_id, offset, bytes): (u64, usize, Vec<u8>) = serde_json::from_value(args).map_err(|_| ErrorKind::BadResponse)?;
			Ok(serde_json::to_value(store.write_data(block_id, offset, &bytes)).unwrap())
		});
	}

	/// Starts the worker pool. Idempotent: a second call returns `false`
	/// without starting a second pool, matching the reference server.
	pub fn run(&self, num_worker_threads: usize) -> bool {
		self.rpc.run(num_worker_threads)
	}
}
