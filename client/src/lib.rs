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

//! The client library described in spec §1: a POSIX-shaped API
//! (mknode/unlink/lookup/readdir/attr/read/write) built by composing
//! metadata RPCs against `ferrofs-metaserver` with parallel data RPCs
//! against whichever `ferrofs-dataserver`s own a file's blocks. No on-disk
//! state of its own -- see `ferrofs-core` for that.

pub mod client;
pub mod config;

pub use client::{FileAttr, FsClient};
pub use config::{ClientConfig, Endpoint};
