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

//! End-to-end exercise of `FsClient` against real metadata + data servers
//! over loopback RPC (spec §8: S1-S3 adjacent, plus truncate/attr coverage
//! the distilled spec's literal scenarios don't spell out).

use ferrofs_client::{ClientConfig, Endpoint, FsClient};
use ferrofs_core::inode::InodeType;
use ferrofs_core::types::InodeId;
use ferrofs_dataserver::{DataServer, DataStore};
use ferrofs_metaserver::{MetadataServer, MetadataStore};
use std::thread;
use std::time::Duration;

const ROOT: InodeId = 1;

fn start_data_server() -> std::net::SocketAddr {
	let dir = tempfile::tempdir().unwrap();
	let store = DataStore::open(dir.path().join("data.img"), 64, 64).unwrap();
	std::mem::forget(dir);
	let server = DataServer::new(store, "127.0.0.1", 0).unwrap();
	let addr = server.local_addr().unwrap();
	assert!(server.run(2));
	std::mem::forget(server);
	addr
}

fn start_meta_server(data_addrs: &[std::net::SocketAddr]) -> std::net::SocketAddr {
	let dir = tempfile::tempdir().unwrap();
	let store = MetadataStore::open(dir.path().join("meta.img"), 4096, 64, 64).unwrap();
	std::mem::forget(dir);
	let server = MetadataServer::new(store, "127.0.0.1", 0).unwrap();
	for addr in data_addrs {
		server.reg_server(&addr.ip().to_string(), addr.port(), true);
	}
	let addr = server.local_addr().unwrap();
	assert!(server.run(2));
	std::mem::forget(server);
	addr
}

fn connect(data_addrs: &[std::net::SocketAddr], meta_addr: std::net::SocketAddr) -> FsClient {
	thread::sleep(Duration::from_millis(20));
	let config = ClientConfig {
		metaserver: Endpoint {
			address: meta_addr.ip().to_string(),
			port: meta_addr.port(),
			reliable: true,
		},
		data_servers: data_addrs
			.iter()
			.map(|a| Endpoint {
				address: a.ip().to_string(),
				port: a.port(),
				reliable: true,
			})
			.collect(),
		block_size: 64,
	};
	FsClient::connect(&config)
}

#[test]
fn write_then_read_small_file_round_trips() {
	let data_addr = start_data_server();
	let meta_addr = start_meta_server(&[data_addr]);
	let client = connect(&[data_addr], meta_addr);

	let file_id = client.mknode(InodeType::File, ROOT, "a.txt").unwrap();
	client.write(file_id, 0, b"hello world").unwrap();
	assert_eq!(client.read(file_id, 0, 11).unwrap(), b"hello world");
	assert_eq!(client.getattr(file_id).unwrap().size, 11);
}

#[test]
fn write_spanning_multiple_blocks_round_trips() {
	let data_addr = start_data_server();
	let meta_addr = start_meta_server(&[data_addr]);
	let client = connect(&[data_addr], meta_addr);

	let file_id = client.mknode(InodeType::File, ROOT, "big.bin").unwrap();
	let content: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();
	client.write(file_id, 0, &content).unwrap();
	assert_eq!(client.read(file_id, 0, content.len() as u64).unwrap(), content);
	assert_eq!(client.getattr(file_id).unwrap().size, content.len() as u64);
}

#[test]
fn partial_offset_write_and_read() {
	let data_addr = start_data_server();
	let meta_addr = start_meta_server(&[data_addr]);
	let client = connect(&[data_addr], meta_addr);

	let file_id = client.mknode(InodeType::File, ROOT, "f").unwrap();
	client.write(file_id, 0, &[0u8; 100]).unwrap();
	client.write(file_id, 70, b"xyz").unwrap();
	assert_eq!(client.read(file_id, 70, 3).unwrap(), b"xyz");
	assert_eq!(client.getattr(file_id).unwrap().size, 100);
}

#[test]
fn truncate_shrinks_and_frees_trailing_blocks() {
	let data_addr = start_data_server();
	let meta_addr = start_meta_server(&[data_addr]);
	let client = connect(&[data_addr], meta_addr);

	let file_id = client.mknode(InodeType::File, ROOT, "f").unwrap();
	client.write(file_id, 0, &[7u8; 150]).unwrap();
	client.truncate(file_id, 10).unwrap();
	assert_eq!(client.getattr(file_id).unwrap().size, 10);
	assert_eq!(client.read(file_id, 0, 10).unwrap(), vec![7u8; 10]);
}

#[test]
fn mknode_lookup_readdir_unlink_round_trip() {
	let data_addr = start_data_server();
	let meta_addr = start_meta_server(&[data_addr]);
	let client = connect(&[data_addr], meta_addr);

	let dir_id = client.mknode(InodeType::Directory, ROOT, "sub").unwrap();
	let file_id = client.mknode(InodeType::File, ROOT, "a.txt").unwrap();
	assert_eq!(client.lookup(ROOT, "a.txt").unwrap(), file_id);

	let mut listing = client.readdir(ROOT).unwrap();
	listing.sort();
	assert_eq!(listing, vec![("a.txt".to_string(), file_id), ("sub".to_string(), dir_id)]);

	client.unlink(ROOT, "a.txt").unwrap();
	assert_eq!(client.lookup(ROOT, "a.txt").unwrap_err().kind(), ferrofs_core::error::ErrorKind::NotExist);
}

#[test]
fn allocate_with_no_data_servers_fails_write() {
	let meta_addr = start_meta_server(&[]);
	let client = connect(&[], meta_addr);
	let file_id = client.mknode(InodeType::File, ROOT, "f").unwrap();
	assert!(client.write(file_id, 0, b"x").is_err());
}
