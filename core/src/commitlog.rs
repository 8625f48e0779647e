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

//! The write-ahead-log seam: a block manager can be configured at
//! construction to route every write through a commit log, whose on-disk
//! format is deliberately left up to the implementation installed.
//!
//! [`BlockManager`](crate::block::BlockManager) holds an optional
//! `Arc<dyn CommitLog>` and calls [`CommitLog::record_write`] ahead of every
//! write-path call. This module supplies the trait and a [`NoopCommitLog`]
//! default; a real write-ahead log or checkpoint facility is an external
//! collaborator and is not implemented here.

use crate::types::BlockId;

/// A write-ahead log a [`BlockManager`](crate::block::BlockManager) can be
/// configured to route writes through. Called synchronously, before the
/// write it describes lands on the backing file, so an implementation that
/// wants crash-consistent recovery must itself durably record the call
/// before returning.
pub trait CommitLog: Send + Sync {
	/// Called just before a whole-block write.
	fn record_write(&self, block_id: BlockId);

	/// Called just before a partial-block write.
	fn record_partial_write(&self, block_id: BlockId, offset: usize, len: usize);
}

/// The default commit log: records nothing. Installed when no log is
/// configured so `BlockManager`'s write path has a single code path
/// regardless of whether logging is enabled.
pub struct NoopCommitLog;

impl CommitLog for NoopCommitLog {
	fn record_write(&self, _block_id: BlockId) {}

	fn record_partial_write(&self, _block_id: BlockId, _offset: usize, _len: usize) {}
}
