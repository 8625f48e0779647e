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

//! Fixed-size block I/O over a backing file.
//!
//! A [`BlockManager`] knows nothing about inodes, bitmaps, or directories; it
//! only knows how to read and write whole or partial blocks. Every call is
//! serialized through a single internal lock, the simplest way to give
//! callers per-block I/O serialization without tracking per-block lock
//! state.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::commitlog::{CommitLog, NoopCommitLog};
use crate::error::{ErrorKind, Result};
use crate::types::BlockId;

/// Width, in bytes, of one version-table entry kept by a data store (see
/// `ferrofs-dataserver`). Lives here because the version table shares the
/// block manager's addressing.
pub const VERSION_ENTRY_SIZE: usize = 4;

/// Probability that a write is declined while [`BlockManager::set_may_fail`]
/// is active. Chosen to make fault-injection tests converge quickly without
/// being so aggressive that a single write almost never succeeds.
const INJECTED_FAILURE_RATE: f64 = 0.3;

/// Fixed-size block I/O over a single backing file.
pub struct BlockManager {
	file: Mutex<File>,
	block_size: usize,
	total_blocks: u64,
	may_fail: AtomicBool,
	log: Mutex<Arc<dyn CommitLog>>,
}

impl BlockManager {
	/// Opens (creating if necessary) the backing file at `path`, sized to
	/// hold exactly `total_blocks` blocks of `block_size` bytes.
	///
	/// Returns the manager along with whether the file already existed
	/// (`is_new == false`) or was just created (`is_new == true`) -- callers
	/// use this to decide whether to format fresh bitmap/table regions or
	/// trust what is already on disk.
	pub fn open(path: impl AsRef<Path>, total_blocks: u64, block_size: usize) -> Result<(Self, bool)> {
		let path = path.as_ref();
		let is_new = !path.exists();

		let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
		let required_len = total_blocks * block_size as u64;
		if file.metadata()?.len() < required_len {
			file.set_len(required_len)?;
		}

		let manager = BlockManager {
			file: Mutex::new(file),
			block_size,
			total_blocks,
			may_fail: AtomicBool::new(false),
			log: Mutex::new(Arc::new(NoopCommitLog)),
		};
		log::debug!("block manager: opened {} ({total_blocks} blocks x {block_size}B, new={is_new})", path.display());
		Ok((manager, is_new))
	}

	/// Wraps an already-open file directly; used by tests that want to
	/// inspect or pre-seed the backing store.
	pub fn from_file(file: File, total_blocks: u64, block_size: usize) -> Self {
		BlockManager {
			file: Mutex::new(file),
			block_size,
			total_blocks,
			may_fail: AtomicBool::new(false),
			log: Mutex::new(Arc::new(NoopCommitLog)),
		}
	}

	/// Installs `log` to be called ahead of every write-path operation.
	/// Replaces whatever log was previously installed; a fresh `BlockManager`
	/// starts with a no-op log.
	pub fn set_commit_log(&self, log: Arc<dyn CommitLog>) {
		*self.log.lock().unwrap() = log;
	}

	pub fn block_size(&self) -> usize {
		self.block_size
	}

	pub fn total_blocks(&self) -> u64 {
		self.total_blocks
	}

	/// Enables or disables fault injection on the write path. Used by tests
	/// that exercise error handling without corrupting real hardware.
	pub fn set_may_fail(&self, may_fail: bool) {
		self.may_fail.store(may_fail, Ordering::SeqCst);
	}

	/// Only bounds-checks against `total_blocks`. `block_id = 0` is a reserved
	/// sentinel *value* at the inode/slot layer (see [`crate::types::INVALID_BLOCK_ID`])
	/// meaning "no block" -- it is not a restriction on this manager's own flat
	/// address space. A data server's on-disk layout (`ferrofs-dataserver`)
	/// places its version table starting at block 0 (spec §6), so the manager
	/// must be able to read and write that block like any other.
	fn check_range(&self, id: BlockId) -> Result<()> {
		if id >= self.total_blocks {
			return Err(ErrorKind::InvalidArg.into());
		}
		Ok(())
	}

	fn maybe_inject_failure(&self) -> Result<()> {
		if self.may_fail.load(Ordering::SeqCst) && rand::thread_rng().gen_bool(INJECTED_FAILURE_RATE) {
			log::debug!("block manager: injected write failure");
			return Err(ErrorKind::IoError.into());
		}
		Ok(())
	}

	/// Reads the whole block `id` into `buf`, which must be exactly
	/// `block_size()` bytes long.
	pub fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
		self.check_range(id)?;
		if buf.len() != self.block_size {
			return Err(ErrorKind::InvalidArg.into());
		}
		let file = self.file.lock().unwrap();
		file.read_exact_at(buf, id * self.block_size as u64)?;
		Ok(())
	}

	/// Writes the whole block `id` from `buf`, which must be exactly
	/// `block_size()` bytes long. All-or-nothing: on failure the block's
	/// prior contents are left untouched from the caller's point of view.
	pub fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
		self.check_range(id)?;
		if buf.len() != self.block_size {
			return Err(ErrorKind::InvalidArg.into());
		}
		self.maybe_inject_failure()?;
		self.log.lock().unwrap().record_write(id);
		let file = self.file.lock().unwrap();
		file.write_all_at(buf, id * self.block_size as u64)?;
		Ok(())
	}

	/// Writes `buf` at `offset` within block `id`; `offset + buf.len()` must
	/// not exceed `block_size()`.
	pub fn write_partial_block(&self, id: BlockId, buf: &[u8], offset: usize, len: usize) -> Result<()> {
		self.check_range(id)?;
		if offset + len > self.block_size || buf.len() < len {
			return Err(ErrorKind::InvalidArg.into());
		}
		self.maybe_inject_failure()?;
		self.log.lock().unwrap().record_partial_write(id, offset, len);
		let file = self.file.lock().unwrap();
		file.write_all_at(&buf[..len], id * self.block_size as u64 + offset as u64)?;
		Ok(())
	}

	/// Fills block `id` with zero bytes.
	pub fn zero_block(&self, id: BlockId) -> Result<()> {
		self.check_range(id)?;
		self.maybe_inject_failure()?;
		self.log.lock().unwrap().record_write(id);
		let zeros = vec![0u8; self.block_size];
		let file = self.file.lock().unwrap();
		file.write_all_at(&zeros, id * self.block_size as u64)?;
		Ok(())
	}

	/// Flushes buffered writes to the OS. Useful for tests that reopen the
	/// same file.
	pub fn sync(&self) -> Result<()> {
		let mut file = self.file.lock().unwrap();
		file.flush()?;
		file.sync_data()?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn new_manager() -> BlockManager {
		let dir = tempfile::tempdir().unwrap();
		let (bm, is_new) = BlockManager::open(dir.path().join("store.img"), 16, 512).unwrap();
		assert!(is_new);
		std::mem::forget(dir); // keep the backing directory alive for the manager's lifetime
		bm
	}

	#[test]
	fn read_back_what_was_written() {
		let bm = new_manager();
		let mut buf = vec![7u8; 512];
		bm.write_block(1, &buf).unwrap();
		buf.fill(0);
		bm.read_block(1, &mut buf).unwrap();
		assert!(buf.iter().all(|&b| b == 7));
	}

	#[test]
	fn partial_write_only_touches_its_range() {
		let bm = new_manager();
		bm.zero_block(1).unwrap();
		bm.write_partial_block(1, &[1, 2, 3], 10, 3).unwrap();
		let mut buf = vec![0u8; 512];
		bm.read_block(1, &mut buf).unwrap();
		assert_eq!(&buf[10..13], &[1, 2, 3]);
		assert!(buf[..10].iter().all(|&b| b == 0));
		assert!(buf[13..].iter().all(|&b| b == 0));
	}

	#[test]
	fn block_zero_is_addressable() {
		// 0 is a reserved sentinel at the inode/slot layer, not a restriction
		// on the manager's own address space -- a data server's version table
		// starts at block 0 (spec §6) and must be able to read/write it.
		let bm = new_manager();
		let mut buf = vec![9u8; 512];
		bm.write_block(0, &buf).unwrap();
		buf.fill(0);
		bm.read_block(0, &mut buf).unwrap();
		assert!(buf.iter().all(|&b| b == 9));
	}

	#[test]
	fn out_of_range_is_rejected() {
		let bm = new_manager();
		let buf = vec![0u8; 512];
		assert_eq!(bm.write_block(16, &buf).unwrap_err().kind(), ErrorKind::InvalidArg);
	}

	#[test]
	fn installed_commit_log_sees_every_write() {
		use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

		struct CountingLog {
			writes: AtomicUsize,
			partial_writes: AtomicUsize,
		}

		impl CommitLog for CountingLog {
			fn record_write(&self, _block_id: BlockId) {
				self.writes.fetch_add(1, AtomicOrdering::SeqCst);
			}

			fn record_partial_write(&self, _block_id: BlockId, _offset: usize, _len: usize) {
				self.partial_writes.fetch_add(1, AtomicOrdering::SeqCst);
			}
		}

		let bm = new_manager();
		let log = Arc::new(CountingLog { writes: AtomicUsize::new(0), partial_writes: AtomicUsize::new(0) });
		bm.set_commit_log(log.clone());

		bm.write_block(1, &vec![0u8; 512]).unwrap();
		bm.zero_block(2).unwrap();
		bm.write_partial_block(1, &[1, 2, 3], 0, 3).unwrap();

		assert_eq!(log.writes.load(AtomicOrdering::SeqCst), 2);
		assert_eq!(log.partial_writes.load(AtomicOrdering::SeqCst), 1);
	}

	#[test]
	fn reopening_an_existing_file_is_not_new() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.img");
		let (_bm, is_new) = BlockManager::open(&path, 4, 512).unwrap();
		assert!(is_new);
		let (_bm2, is_new2) = BlockManager::open(&path, 4, 512).unwrap();
		assert!(!is_new2);
	}
}
