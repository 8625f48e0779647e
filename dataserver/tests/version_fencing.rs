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

//! End-to-end version-fencing scenario over a real loopback RPC connection
//! (spec §8, S4).

use ferrofs_dataserver::{DataServer, DataStore};
use ferrofs_rpc::RpcClient;
use std::thread;
use std::time::Duration;

fn start_server() -> (DataServer, std::net::SocketAddr) {
	let dir = tempfile::tempdir().unwrap();
	let store = DataStore::open(dir.path().join("data.img"), 64, 64).unwrap();
	std::mem::forget(dir);
	let server = DataServer::new(store, "127.0.0.1", 0).unwrap();
	let addr = server.local_addr().unwrap();
	assert!(server.run(2));
	thread::sleep(Duration::from_millis(20));
	(server, addr)
}

#[test]
fn allocate_write_read_then_free_fences_stale_version() {
	let (_server, addr) = start_server();
	let client = RpcClient::new(addr.ip().to_string(), addr.port(), true);

	let (block_id, version): (u64, u32) = client.call("alloc_block", &()).unwrap();
	assert_eq!(version, 1);

	let wrote: bool = client.call("write_data", &(block_id, 0usize, vec![0xDEu8, 0xAD])).unwrap();
	assert!(wrote);

	let read: Vec<u8> = client.call("read_data", &(block_id, 0usize, 2usize, version)).unwrap();
	assert_eq!(read, vec![0xDE, 0xAD]);

	let freed: bool = client.call("free_block", &block_id).unwrap();
	assert!(freed);

	let (block_id2, version2): (u64, u32) = client.call("alloc_block", &()).unwrap();
	assert_eq!(block_id2, block_id);
	assert!(version2 >= 2);

	let stale: Vec<u8> = client.call("read_data", &(block_id, 0usize, 2usize, version)).unwrap();
	assert!(stale.is_empty());
}
