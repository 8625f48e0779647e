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

//! Directory format (C6): a flat textual list of `name:id` pairs stored as
//! the content of a Directory inode, and the mutation operators built on top
//! of it.

use crate::error::{ErrorKind, Result};
use crate::fileop::FileOperation;
use crate::inode::InodeType;
use crate::types::InodeId;

/// One `name -> inode_id` entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
	pub name: String,
	pub id: InodeId,
}

/// Renders a list of entries back into the `name1:id1/name2:id2/...` wire
/// format. The empty list renders to the empty string.
pub fn dir_list_to_string(entries: &[DirectoryEntry]) -> String {
	entries.iter().map(|e| format!("{}:{}", e.name, e.id)).collect::<Vec<_>>().join("/")
}

/// Parses the `name1:id1/name2:id2/...` wire format. Names may not contain
/// `/` or `:` (enforced by the format itself, not by this parser).
pub fn parse_directory(src: &str) -> Vec<DirectoryEntry> {
	if src.is_empty() {
		return Vec::new();
	}
	src.split('/')
		.filter(|s| !s.is_empty())
		.filter_map(|entry| {
			let (name, id_str) = entry.split_once(':')?;
			let id: InodeId = id_str.parse().ok()?;
			Some(DirectoryEntry { name: name.to_string(), id })
		})
		.collect()
}

/// Appends `name:id` to the end of `src`'s listing.
pub fn append_to_directory(src: &str, name: &str, id: InodeId) -> String {
	let mut list = parse_directory(src);
	list.push(DirectoryEntry { name: name.to_string(), id });
	dir_list_to_string(&list)
}

/// Removes the first entry named `name` from `src`'s listing, if present.
pub fn rm_from_directory(src: &str, name: &str) -> String {
	let mut list = parse_directory(src);
	if let Some(pos) = list.iter().position(|e| e.name == name) {
		list.remove(pos);
	}
	dir_list_to_string(&list)
}

/// Reads a Directory inode's content and parses it.
pub fn read_directory(fs: &FileOperation, id: InodeId) -> Result<Vec<DirectoryEntry>> {
	let content = fs.read_file(id)?;
	let text = String::from_utf8(content).map_err(|_| ErrorKind::Invalid)?;
	Ok(parse_directory(&text))
}

/// Looks `name` up in directory `id`.
pub fn lookup(fs: &FileOperation, id: InodeId, name: &str) -> Result<InodeId> {
	let list = read_directory(fs, id)?;
	list.into_iter().find(|e| e.name == name).map(|e| e.id).ok_or_else(|| ErrorKind::NotExist.into())
}

/// Readdir: the full `(name, inode_id)` listing of directory `id`, in
/// insertion order modulo removals.
pub fn readdir(fs: &FileOperation, id: InodeId) -> Result<Vec<(String, InodeId)>> {
	Ok(read_directory(fs, id)?.into_iter().map(|e| (e.name, e.id)).collect())
}

/// Creates a new inode of `ty` named `name` under directory `parent`.
/// Fails with `AlreadyExist` if `name` is already present.
pub fn mk_helper(fs: &FileOperation, parent: InodeId, name: &str, ty: InodeType) -> Result<InodeId> {
	let mut list = read_directory(fs, parent)?;
	if list.iter().any(|e| e.name == name) {
		return Err(ErrorKind::AlreadyExist.into());
	}
	let new_id = fs.alloc_inode(ty)?;
	list.push(DirectoryEntry { name: name.to_string(), id: new_id });
	fs.write_file(parent, dir_list_to_string(&list).as_bytes())?;
	Ok(new_id)
}

/// Removes `name` from directory `parent`, freeing its inode and content.
/// Fails with `NotExist` if `name` is absent.
pub fn unlink(fs: &FileOperation, parent: InodeId, name: &str) -> Result<()> {
	let mut list = read_directory(fs, parent)?;
	let pos = list.iter().position(|e| e.name == name).ok_or(ErrorKind::NotExist)?;
	let entry = list.remove(pos);
	fs.remove_file(entry.id)?;
	fs.write_file(parent, dir_list_to_string(&list).as_bytes())?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::allocator::BlockAllocator;
	use crate::block::BlockManager;
	use crate::inode::InodeManager;
	use std::sync::Arc;

	fn setup() -> FileOperation {
		let dir = tempfile::tempdir().unwrap();
		let (bm, is_new) = BlockManager::open(dir.path().join("s.img"), 200, 64).unwrap();
		std::mem::forget(dir);
		let bm = Arc::new(bm);
		let inodes = InodeManager::new(bm.clone(), 8, is_new).unwrap();
		let (_, inode_bitmap_last) = inodes.bitmap_region();
		let alloc = BlockAllocator::new(bm.clone(), inode_bitmap_last, 1, is_new).unwrap();
		FileOperation::new(bm, alloc, inodes, 4)
	}

	#[test]
	fn parse_and_render_round_trip() {
		let rendered = dir_list_to_string(&[
			DirectoryEntry { name: "a".into(), id: 2 },
			DirectoryEntry { name: "b".into(), id: 3 },
		]);
		assert_eq!(rendered, "a:2/b:3");
		assert_eq!(parse_directory(&rendered), vec![
			DirectoryEntry { name: "a".into(), id: 2 },
			DirectoryEntry { name: "b".into(), id: 3 },
		]);
	}

	#[test]
	fn parse_directory_of_empty_string_is_empty() {
		assert!(parse_directory("").is_empty());
	}

	#[test]
	fn mk_helper_then_lookup_and_readdir() {
		let fs = setup();
		let root = fs.alloc_inode(InodeType::Directory).unwrap();
		let file_id = mk_helper(&fs, root, "a.txt", InodeType::File).unwrap();
		assert_eq!(lookup(&fs, root, "a.txt").unwrap(), file_id);
		assert_eq!(readdir(&fs, root).unwrap(), vec![("a.txt".to_string(), file_id)]);
	}

	#[test]
	fn mk_helper_rejects_duplicate_name() {
		let fs = setup();
		let root = fs.alloc_inode(InodeType::Directory).unwrap();
		mk_helper(&fs, root, "a.txt", InodeType::File).unwrap();
		assert_eq!(mk_helper(&fs, root, "a.txt", InodeType::File).unwrap_err().kind(), ErrorKind::AlreadyExist);
	}

	#[test]
	fn unlink_removes_entry_and_frees_inode() {
		let fs = setup();
		let root = fs.alloc_inode(InodeType::Directory).unwrap();
		let file_id = mk_helper(&fs, root, "a.txt", InodeType::File).unwrap();
		unlink(&fs, root, "a.txt").unwrap();
		assert_eq!(lookup(&fs, root, "a.txt").unwrap_err().kind(), ErrorKind::NotExist);
		assert!(readdir(&fs, root).unwrap().is_empty());
		assert_eq!(fs.getattr(file_id).unwrap_err().kind(), ErrorKind::InvalidArg);
	}

	#[test]
	fn unlink_missing_name_is_not_exist() {
		let fs = setup();
		let root = fs.alloc_inode(InodeType::Directory).unwrap();
		assert_eq!(unlink(&fs, root, "nope").unwrap_err().kind(), ErrorKind::NotExist);
	}
}
