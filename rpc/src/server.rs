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

//! A multi-threaded worker-pool RPC server (spec §5: "each server is a
//! multi-threaded worker pool of `num_worker_threads` threads accepting RPCs
//! in parallel"). Handlers are plain blocking closures bound by name before
//! [`RpcServer::run`] is called.

use std::collections::HashMap;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use ferrofs_core::error::Result;

use crate::wire::{self, Request, Response};

type Handler = dyn Fn(serde_json::Value) -> Result<serde_json::Value> + Send + Sync;

/// Binds method names to handlers, then spins up a fixed-size worker pool
/// that pulls accepted connections off a shared channel.
pub struct RpcServer {
	listener: TcpListener,
	handlers: Arc<HashMap<String, Box<Handler>>>,
	running: Mutex<bool>,
}

impl RpcServer {
	pub fn bind_addr(address: &str, port: u16) -> Result<Self> {
		let listener = TcpListener::bind((address, port))?;
		Ok(RpcServer {
			listener,
			handlers: Arc::new(HashMap::new()),
			running: Mutex::new(false),
		})
	}

	pub fn bind(port: u16) -> Result<Self> {
		Self::bind_addr("0.0.0.0", port)
	}

	pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
		self.listener.local_addr()
	}

	/// Registers a handler for `name`. Must be called before [`RpcServer::run`];
	/// handlers are immutable for the server's lifetime once running.
	pub fn register(&mut self, name: impl Into<String>, handler: impl Fn(serde_json::Value) -> Result<serde_json::Value> + Send + Sync + 'static) {
		Arc::get_mut(&mut self.handlers)
			.expect("register called after run")
			.insert(name.into(), Box::new(handler));
	}

	/// Starts `num_worker_threads` workers pulling connections from the
	/// listener. Returns `false` (without starting a second pool) if already
	/// running, matching the reference server's idempotent `run()`.
	pub fn run(&self, num_worker_threads: usize) -> bool {
		let mut running = self.running.lock().unwrap();
		if *running {
			return false;
		}
		*running = true;
		drop(running);

		let (tx, rx) = mpsc::channel::<TcpStream>();
		let rx = Arc::new(Mutex::new(rx));

		for worker_id in 0..num_worker_threads.max(1) {
			let rx = Arc::clone(&rx);
			let handlers = Arc::clone(&self.handlers);
			thread::Builder::new()
				.name(format!("ferrofs-rpc-worker-{worker_id}"))
				.spawn(move || worker_loop(rx, handlers))
				.expect("failed to spawn rpc worker thread");
		}

		let listener = self.listener.try_clone().expect("failed to clone listener");
		thread::Builder::new()
			.name("ferrofs-rpc-acceptor".into())
			.spawn(move || {
				for conn in listener.incoming() {
					match conn {
						Ok(stream) => {
							if tx.send(stream).is_err() {
								break;
							}
						}
						Err(e) => log::warn!("rpc accept failed: {e}"),
					}
				}
			})
			.expect("failed to spawn rpc acceptor thread");

		true
	}
}

fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<TcpStream>>>, handlers: Arc<HashMap<String, Box<Handler>>>) {
	loop {
		let stream = {
			let rx = rx.lock().unwrap();
			rx.recv()
		};
		let Ok(mut stream) = stream else {
			return;
		};
		loop {
			let request: Result<Request> = wire::read_frame(&mut stream);
			let request = match request {
				Ok(r) => r,
				Err(_) => break, // connection closed or malformed frame; drop it
			};
			let response = match handlers.get(&request.method) {
				Some(handler) => match handler(request.args) {
					Ok(value) => Response::Ok(value),
					Err(e) => Response::Err(e.to_string()),
				},
				None => Response::Err(format!("unknown method: {}", request.method)),
			};
			if wire::write_frame(&mut stream, &response).is_err() {
				break;
			}
		}
	}
}
