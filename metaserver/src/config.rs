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

//! Process-host configuration: a TOML file plus `--flag value` overrides on
//! the command line, CLI winning, mirroring `ferrofs-dataserver`'s config
//! layer. The data-server endpoints a fresh metadata server registers with at
//! startup are TOML-only -- there is no sane single-flag CLI shape for a list
//! of endpoints.

use std::path::PathBuf;

use ferrofs_core::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};

fn default_listen_address() -> String {
	"0.0.0.0".to_string()
}

fn default_num_worker_threads() -> usize {
	std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn default_total_blocks() -> u64 {
	1 << 16
}

fn default_block_size() -> usize {
	4096
}

fn default_max_inode_supported() -> u64 {
	1 << 20
}

fn default_reliable() -> bool {
	true
}

/// One data server this metadata server registers with at startup, via
/// `MetadataServer::reg_server` (spec §4.2's "servers register themselves, or
/// are registered, with the metadata server before serving block RPCs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataServerEndpoint {
	pub address: String,
	pub port: u16,
	#[serde(default = "default_reliable")]
	pub reliable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	#[serde(default = "default_listen_address")]
	pub address: String,
	pub port: u16,
	pub data_path: PathBuf,
	#[serde(default = "default_total_blocks")]
	pub total_blocks: u64,
	#[serde(default = "default_block_size")]
	pub block_size: usize,
	#[serde(default = "default_max_inode_supported")]
	pub max_inode_supported: u64,
	#[serde(default = "default_num_worker_threads")]
	pub num_worker_threads: usize,
	#[serde(default)]
	pub may_fail: bool,
	/// Routes the store's block manager writes through a commit log at
	/// startup; see `BlockManager::set_commit_log`.
	#[serde(default)]
	pub enable_log: bool,
	#[serde(default)]
	pub data_servers: Vec<DataServerEndpoint>,
}

impl Config {
	pub fn from_args(args: impl Iterator<Item = String>) -> Result<Self> {
		let args: Vec<String> = args.collect();
		let config_path = find_flag(&args, "--config").ok_or(ErrorKind::InvalidArg)?;
		let text = std::fs::read_to_string(config_path)?;
		let mut config: Config = toml::from_str(&text).map_err(|_| ErrorKind::InvalidArg)?;

		if let Some(port) = find_flag(&args, "--port") {
			config.port = port.parse().map_err(|_| ErrorKind::InvalidArg)?;
		}
		if let Some(address) = find_flag(&args, "--address") {
			config.address = address;
		}
		if let Some(threads) = find_flag(&args, "--num-worker-threads") {
			config.num_worker_threads = threads.parse().map_err(|_| ErrorKind::InvalidArg)?;
		}
		if find_flag(&args, "--may-fail").is_some() {
			config.may_fail = true;
		}
		if find_flag(&args, "--enable-log").is_some() {
			config.enable_log = true;
		}
		Ok(config)
	}
}

fn find_flag(args: &[String], name: &str) -> Option<String> {
	args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).cloned()
}
