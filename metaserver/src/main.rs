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
use ferrofs_metaserver::{Config, MetadataServer, MetadataStore};

fn main() {
	env_logger::init();

	let config = match Config::from_args(std::env::args().skip(1)) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("ferrofs-metaserver: bad configuration: {e}");
			std::process::exit(1);
		}
	};

	let store = match MetadataStore::open(&config.data_path, config.total_blocks, config.block_size, config.max_inode_supported) {
		Ok(s) => s,
		Err(e) => {
			log::error!("failed to open metadata store at {:?}: {e}", config.data_path);
			std::process::exit(1);
		}
	};
	store.fs().block_manager().set_may_fail(config.may_fail);
	if config.enable_log {
		store.fs().block_manager().set_commit_log(Arc::new(NoopCommitLog));
		log::info!("ferrofs-metaserver: commit log enabled (no-op implementation)");
	}

	let server = match MetadataServer::new(store, &config.address, config.port) {
		Ok(s) => s,
		Err(e) => {
			log::error!("failed to bind metadata server on {}:{}: {e}", config.address, config.port);
			std::process::exit(1);
		}
	};

	for ds in &config.data_servers {
		let machine_id = server.reg_server(&ds.address, ds.port, ds.reliable);
		log::info!("registered data server {}:{} as machine {machine_id}", ds.address, ds.port);
	}

	log::info!("ferrofs-metaserver listening on {}:{}", config.address, config.port);
	server.run(config.num_worker_threads);

	loop {
		std::thread::park();
	}
}
