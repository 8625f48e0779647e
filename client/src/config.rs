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

//! Client-side configuration: the metadata server's endpoint plus the list
//! of data server endpoints, mirroring `ferrofs-metaserver::Config`'s own
//! `data_servers` list so a deployment can share one TOML shape across both
//! (the client must register its data servers in the exact same order the
//! metadata server did at startup -- see [`crate::FsClient::connect`]).

use std::path::Path;

use ferrofs_core::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};

fn default_reliable() -> bool {
	true
}

fn default_block_size() -> usize {
	4096
}

/// One data server endpoint, in the same registration order the metadata
/// server was given at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
	pub address: String,
	pub port: u16,
	#[serde(default = "default_reliable")]
	pub reliable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
	pub metaserver: Endpoint,
	#[serde(default)]
	pub data_servers: Vec<Endpoint>,
	/// The store's fixed block size; a run-time constant shared by every
	/// participant (spec §3 "Block ... block size is a run-time constant").
	#[serde(default = "default_block_size")]
	pub block_size: usize,
}

impl ClientConfig {
	pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
		let text = std::fs::read_to_string(path)?;
		toml::from_str(&text).map_err(|_| ErrorKind::InvalidArg.into())
	}
}
