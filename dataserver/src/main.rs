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

use std::sync::Arc;

use ferrofs_core::NoopCommitLog;
use ferrofs_dataserver::{Config, DataServer, DataStore};

fn main() {
	env_logger::init();

	let config = match Config::from_args(std::env::args().skip(1)) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("ferrofs-dataserver: bad configuration: {e}");
			std::process::exit(1);
		}
	};

	let store = match DataStore::open(&config.data_path, config.total_blocks, config.block_size) {
		Ok(s) => s,
		Err(e) => {
			log::error!("failed to open data store at {:?}: {e}", config.data_path);
			std::process::exit(1);
		}
	};
	store.set_may_fail(config.may_fail);
	if config.enable_log {
		store.block_manager().set_commit_log(Arc::new(NoopCommitLog));
		log::info!("ferrofs-dataserver: commit log enabled (no-op implementation)");
	}

	let server = match DataServer::new(store, &config.address, config.port) {
		Ok(s) => s,
		Err(e) => {
			log::error!("failed to bind data server on {}:{}: {e}", config.address, config.port);
			std::process::exit(1);
		}
	};

	log::info!("ferrofs-dataserver listening on {}:{}", config.address, config.port);
	server.run(config.num_worker_threads);

	loop {
		std::thread::park();
	}
}
