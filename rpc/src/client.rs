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

//! A minimal RPC client: one fresh `TcpStream` per call, framed with
//! [`crate::wire`]. Matches the shape of the reference client (constructed
//! once per remote server, carrying a `reliable` fault-injection knob) without
//! keeping a persistent connection open, which keeps the implementation
//! immune to the worker pool on the other end closing idle sockets.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};

use ferrofs_core::error::{ErrorKind, Result};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::wire::{self, Request, Response};

/// Probability that [`RpcClient::call`] fails outright while `reliable` is
/// `false`, simulating a flaky network for fault-injection tests.
const INJECTED_DROP_RATE: f64 = 0.3;

pub struct RpcClient {
	addr: String,
	reliable: AtomicBool,
}

impl RpcClient {
	/// `reliable = false` makes every call a coin flip, mirroring the
	/// reference client's constructor flag of the same name.
	pub fn new(address: impl Into<String>, port: u16, reliable: bool) -> Self {
		RpcClient {
			addr: format!("{}:{}", address.into(), port),
			reliable: AtomicBool::new(reliable),
		}
	}

	pub fn set_reliable(&self, reliable: bool) {
		self.reliable.store(reliable, Ordering::SeqCst);
	}

	/// Calls `method` with `args` (typically a tuple, serialized positionally)
	/// and decodes the reply as `Resp`.
	pub fn call<Req: Serialize, Resp: DeserializeOwned>(&self, method: &str, args: &Req) -> Result<Resp> {
		if !self.reliable.load(Ordering::SeqCst) && rand::thread_rng().gen_bool(INJECTED_DROP_RATE) {
			return Err(ErrorKind::IoError.into());
		}

		let addrs: Vec<_> = self.addr.to_socket_addrs()?.collect();
		let addr = addrs.first().ok_or(ErrorKind::IoError)?;
		let mut stream = TcpStream::connect(addr)?;
		stream.set_nodelay(true).ok();

		let request = Request {
			method: method.to_string(),
			args: serde_json::to_value(args).map_err(|_| ErrorKind::BadResponse)?,
		};
		wire::write_frame(&mut stream, &request)?;

		let response: Response = wire::read_frame(&mut stream)?;
		match response {
			Response::Ok(value) => serde_json::from_value(value).map_err(|_| ErrorKind::BadResponse.into()),
			Response::Err(_) => Err(ErrorKind::BadResponse.into()),
		}
	}
}
