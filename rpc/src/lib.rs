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

//! The swappable RPC transport named as an external collaborator in the
//! storage engine's spec: a length-prefixed JSON-over-TCP implementation of a
//! `bind(name, handler)` / `call(name, args...)` protocol with a `reliable`
//! fault-injection knob on the client side.

pub mod client;
pub mod server;
pub mod wire;

pub use client::RpcClient;
pub use server::RpcServer;

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread;
	use std::time::Duration;

	#[test]
	fn call_roundtrips_through_a_real_loopback_server() {
		let mut server = RpcServer::bind_addr("127.0.0.1", 0).unwrap();
		server.register("add", |args| {
			let (a, b): (i64, i64) = serde_json::from_value(args).map_err(|_| ferrofs_core::error::ErrorKind::BadResponse)?;
			Ok(serde_json::to_value(a + b).unwrap())
		});
		let addr = server.local_addr().unwrap();
		assert!(server.run(2));
		// second run() call must be a no-op, matching the reference server
		assert!(!server.run(2));

		// give the acceptor thread a moment to start listening; the listener
		// itself is already bound, so this is generous rather than required.
		thread::sleep(Duration::from_millis(20));

		let client = RpcClient::new(addr.ip().to_string(), addr.port(), true);
		let sum: i64 = client.call("add", &(2i64, 40i64)).unwrap();
		assert_eq!(sum, 42);
	}

	#[test]
	fn unreliable_client_eventually_fails() {
		let mut server = RpcServer::bind_addr("127.0.0.1", 0).unwrap();
		server.register("noop", |_| Ok(serde_json::Value::Null));
		let addr = server.local_addr().unwrap();
		server.run(1);
		thread::sleep(Duration::from_millis(20));

		let client = RpcClient::new(addr.ip().to_string(), addr.port(), false);
		let failures = (0..40).filter(|_| client.call::<_, ()>("noop", &()).is_err()).count();
		assert!(failures > 0, "expected at least one injected failure out of 40 calls");
	}
}
