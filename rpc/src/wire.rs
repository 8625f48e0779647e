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

//! On-the-wire framing: a 4-byte little-endian length prefix followed by a
//! JSON payload. Used identically by [`crate::client::RpcClient`] and
//! [`crate::server::RpcServer`] so either side can be swapped independently.

use std::io::{Read, Write};

use ferrofs_core::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};

const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// A request envelope: a method name plus its positional arguments packed as
/// a single JSON value (usually an array, mirroring the original RPC
/// framework's variadic `call(name, args...)`).
#[derive(Serialize, Deserialize)]
pub struct Request {
	pub method: String,
	pub args: serde_json::Value,
}

/// A response envelope. `Err` carries only a human-readable reason: the wire
/// protocol does not transport [`ErrorKind`] itself, matching spec's RPC
/// boundary which collapses every failure to a sentinel value chosen by the
/// caller, not a structured error.
#[derive(Serialize, Deserialize)]
pub enum Response {
	Ok(serde_json::Value),
	Err(String),
}

pub fn write_frame(stream: &mut impl Write, value: &impl Serialize) -> Result<()> {
	let body = serde_json::to_vec(value).map_err(|_| ErrorKind::BadResponse)?;
	if body.len() as u64 > MAX_FRAME_LEN as u64 {
		return Err(ErrorKind::BadResponse.into());
	}
	stream.write_all(&(body.len() as u32).to_le_bytes())?;
	stream.write_all(&body)?;
	stream.flush()?;
	Ok(())
}

pub fn read_frame<T: for<'de> Deserialize<'de>>(stream: &mut impl Read) -> Result<T> {
	let mut len_buf = [0u8; 4];
	stream.read_exact(&mut len_buf)?;
	let len = u32::from_le_bytes(len_buf);
	if len > MAX_FRAME_LEN {
		return Err(ErrorKind::BadResponse.into());
	}
	let mut body = vec![0u8; len as usize];
	stream.read_exact(&mut body)?;
	serde_json::from_slice(&body).map_err(|_| ErrorKind::BadResponse.into())
}
