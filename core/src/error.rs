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

//! Error kinds shared by every layer of the storage engine.
//!
//! Internal layers return `Result<T>` and let errors bubble up unchanged; the
//! RPC boundary (in `ferrofs-rpc` and the server crates) is the only place
//! that translates a kind into a sentinel value (`0`, an empty vector, `false`,
//! ...). Callers below that boundary should never need to pattern-match on
//! anything finer than [`ErrorKind`].

use std::fmt;
use std::io;

/// The closed set of ways an operation on the storage engine can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Sentinel used internally where a `Result` is threaded through code
	/// that otherwise has nothing to report; never escapes to a caller.
	Done,
	/// A structural invariant was violated (bad index, corrupt bitmap, ...).
	Invalid,
	/// An argument was out of range or otherwise not acceptable.
	InvalidArg,
	/// A directory was not empty when an operation required it to be.
	NotEmpty,
	/// The requested name/inode/block does not exist.
	NotExist,
	/// The requested name already exists.
	AlreadyExist,
	/// No free inode, block, or bitmap bit was available.
	OutOfResource,
	/// An RPC response did not match the shape the caller expected.
	BadResponse,
	/// The underlying backing file failed to read or write.
	IoError,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ErrorKind::Done => "done",
			ErrorKind::Invalid => "invalid",
			ErrorKind::InvalidArg => "invalid argument",
			ErrorKind::NotEmpty => "not empty",
			ErrorKind::NotExist => "does not exist",
			ErrorKind::AlreadyExist => "already exists",
			ErrorKind::OutOfResource => "out of resources",
			ErrorKind::BadResponse => "bad RPC response",
			ErrorKind::IoError => "I/O error",
		};
		f.write_str(s)
	}
}

/// An error produced by the storage engine: a [`ErrorKind`] plus, for
/// `IoError`, the `std::io::Error` that caused it.
#[derive(Debug)]
pub struct Error {
	kind: ErrorKind,
	source: Option<io::Error>,
}

impl Error {
	pub fn new(kind: ErrorKind) -> Self {
		Error { kind, source: None }
	}

	pub fn kind(&self) -> ErrorKind {
		self.kind
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.source {
			Some(src) => write!(f, "{}: {}", self.kind, src),
			None => write!(f, "{}", self.kind),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Self {
		Error::new(kind)
	}
}

impl From<io::Error> for Error {
	fn from(source: io::Error) -> Self {
		Error {
			kind: ErrorKind::IoError,
			source: Some(source),
		}
	}
}

/// Result type used throughout the storage engine.
pub type Result<T> = std::result::Result<T, Error>;
