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

//! Namespace RPCs exercised end-to-end over a real loopback connection.

use ferrofs_metaserver::{MetadataServer, MetadataStore};
use ferrofs_rpc::RpcClient;
use std::thread;
use std::time::Duration;

const ROOT: u64 = 1;
const FILE_TY: u8 = 1;
const DIR_TY: u8 = 2;

fn start_server() -> (MetadataServer, std::net::SocketAddr) {
	let dir = tempfile::tempdir().unwrap();
	let store = MetadataStore::open(dir.path().join("meta.img"), 4096, 64, 64).unwrap();
	std::mem::forget(dir);
	let server = MetadataServer::new(store, "127.0.0.1", 0).unwrap();
	let addr = server.local_addr().unwrap();
	assert!(server.run(2));
	thread::sleep(Duration::from_millis(20));
	(server, addr)
}

#[test]
fn mknode_lookup_readdir_and_unlink_round_trip() {
	let (_server, addr) = start_server();
	let client = RpcClient::new(addr.ip().to_string(), addr.port(), true);

	let dir_id: u64 = client.call("mknode", &(DIR_TY, ROOT, "sub".to_string())).unwrap();
	let file_id: u64 = client.call("mknode", &(FILE_TY, ROOT, "a.txt".to_string())).unwrap();

	let found: u64 = client.call("lookup", &(ROOT, "a.txt".to_string())).unwrap();
	assert_eq!(found, file_id);

	let mut listing: Vec<(String, u64)> = client.call("readdir", &ROOT).unwrap();
	listing.sort();
	assert_eq!(listing, vec![("a.txt".to_string(), file_id), ("sub".to_string(), dir_id)]);

	let (ty, size, _atime, _mtime, _ctime): (u8, u64, u64, u64, u64) = client.call("get_type_attr", &dir_id).unwrap();
	assert_eq!(ty, DIR_TY);
	assert_eq!(size, 0);

	let unlinked: bool = client.call("unlink", &(ROOT, "a.txt".to_string())).unwrap();
	assert!(unlinked);
	let after: Vec<(String, u64)> = client.call("readdir", &ROOT).unwrap();
	assert_eq!(after, vec![("sub".to_string(), dir_id)]);
}

#[test]
fn mknode_rejects_duplicate_names() {
	// The RPC boundary collapses any domain error to its sentinel, so a
	// duplicate name comes back as inode id 0, not a transport error.
	let (_server, addr) = start_server();
	let client = RpcClient::new(addr.ip().to_string(), addr.port(), true);

	let _: u64 = client.call("mknode", &(FILE_TY, ROOT, "dup".to_string())).unwrap();
	let second: u64 = client.call("mknode", &(FILE_TY, ROOT, "dup".to_string())).unwrap();
	assert_eq!(second, 0);
}

#[test]
fn lookup_of_missing_name_is_an_error() {
	let (_server, addr) = start_server();
	let client = RpcClient::new(addr.ip().to_string(), addr.port(), true);
	let found: u64 = client.call("lookup", &(ROOT, "nope".to_string())).unwrap();
	assert_eq!(found, 0);
}
