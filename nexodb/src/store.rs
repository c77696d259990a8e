//! Single-file keyed byte-store.
//!
//! The file holds a family of ordered sub-trees ("tables") identified by
//! small integers. Keys and values are arbitrary byte strings, ordered
//! lexicographically on unsigned bytes.
//!
//! ```text
//!  checksum   payload
//!   /          /
//! |32 bytes|magic|version|next|meta|tables...|
//! ```
//!
//! The whole payload is covered by a sha3-256 checksum and rewritten
//! atomically (temp file + rename) when the outermost write transaction
//! commits. Aborts replay an in-memory undo log, so readers never observe
//! a partial transaction. A sibling `LOCK` file guards against concurrent
//! opens of the same database.

use std::collections::BTreeMap;
use std::collections::Bound::{Excluded, Included, Unbounded};
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ByteOrder, WriteBytesExt};
use fs2::FileExt;
use hex_slice::AsHex;
use memmap::{Mmap, Protection};
use tiny_keccak::sha3_256;

use error::{ErrorKind, Result, ResultExt};

const MAGIC: &'static [u8; 4] = b"NXDB";
const FORMAT_VERSION: u16 = 1;
const CHECKSUM_SIZE: usize = 32;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug)]
enum Undo {
	Put { table: u32, key: Vec<u8>, prev: Option<Vec<u8>> },
	Create { table: u32 },
	Drop { table: u32, data: Table },
	Clear { table: u32, data: Table },
}

/// The keyed byte-store backing one database file.
#[derive(Debug)]
pub struct PagedStore {
	path: PathBuf,
	lock_file: File,
	tables: BTreeMap<u32, Table>,
	next_table: u32,
	meta_table: u32,
	txn_level: u32,
	undo: Vec<Undo>,
}

impl PagedStore {
	/// Open the file at `path`, creating it if absent.
	pub fn open<P: AsRef<Path>>(path: P) -> Result<PagedStore> {
		let path = path.as_ref().to_path_buf();

		let mut lock_path = path.as_os_str().to_owned();
		lock_path.push(".lock");
		let lock_file = fs::OpenOptions::new()
			.write(true)
			.create(true)
			.open(&lock_path)
			.map_err(|e| ErrorKind::OpenDbFile(path.clone(), e.to_string()))?;
		lock_file.try_lock_exclusive()
			.map_err(|_| ErrorKind::OpenDbFile(path.clone(), "file is locked by another process".into()))?;

		let mut store = PagedStore {
			path: path.clone(),
			lock_file,
			tables: BTreeMap::new(),
			next_table: 2,
			meta_table: 1,
			txn_level: 0,
			undo: Vec::new(),
		};

		if path.exists() {
			store.read_file()?;
		} else {
			store.tables.insert(1, Table::new());
			store.write_file()?;
		}

		Ok(store)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Id of the root meta sub-tree recorded in the file header.
	pub fn meta_table(&self) -> u32 {
		self.meta_table
	}

	pub fn is_trans(&self) -> bool {
		self.txn_level > 0
	}

	pub fn trans_begin(&mut self) {
		self.txn_level += 1;
	}

	pub fn trans_commit(&mut self) -> Result<()> {
		if self.txn_level == 1 {
			self.write_file().chain_err(|| ErrorKind::CommitTrans)?;
			self.undo.clear();
		}
		if self.txn_level > 0 {
			self.txn_level -= 1;
		}
		Ok(())
	}

	pub fn trans_abort(&mut self) {
		self.txn_level = 0;
		while let Some(op) = self.undo.pop() {
			match op {
				Undo::Put { table, key, prev } => {
					if let Some(t) = self.tables.get_mut(&table) {
						match prev {
							Some(value) => { t.insert(key, value); },
							None => { t.remove(&key); },
						}
					}
				},
				Undo::Create { table } => {
					self.tables.remove(&table);
				},
				Undo::Drop { table, data } | Undo::Clear { table, data } => {
					self.tables.insert(table, data);
				},
			}
		}
	}

	pub fn create_table(&mut self) -> Result<u32> {
		let table = self.next_table;
		self.next_table += 1;
		self.tables.insert(table, Table::new());
		self.journal(Undo::Create { table });
		self.flush_standalone().chain_err(|| ErrorKind::CreateTable)?;
		Ok(table)
	}

	pub fn drop_table(&mut self, table: u32) -> Result<()> {
		let data = self.tables.remove(&table).ok_or(ErrorKind::RemoveTable)?;
		self.journal(Undo::Drop { table, data });
		self.flush_standalone().chain_err(|| ErrorKind::RemoveTable)
	}

	pub fn clear_table(&mut self, table: u32) -> Result<()> {
		let data = {
			let t = self.tables.get_mut(&table).ok_or(ErrorKind::ClearTable)?;
			::std::mem::replace(t, Table::new())
		};
		self.journal(Undo::Clear { table, data });
		self.flush_standalone().chain_err(|| ErrorKind::ClearTable)
	}

	/// Writes performed outside any transaction commit straight away.
	fn flush_standalone(&mut self) -> Result<()> {
		if self.txn_level == 0 {
			self.write_file()?;
		}
		Ok(())
	}

	/// Open a cursor over `table`.
	pub fn cursor(&mut self, table: u32) -> Result<Cursor> {
		if !self.tables.contains_key(&table) {
			bail!(ErrorKind::CreateBtCursor);
		}
		Ok(Cursor {
			store: self,
			table,
			pos: None,
		})
	}

	pub fn write_meta(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
		let table = self.meta_table;
		self.trans_begin();
		let result = self.cursor(table).and_then(|mut cur| cur.insert(key, value));
		match result {
			Ok(()) => self.trans_commit(),
			Err(e) => {
				self.trans_abort();
				Err(e)
			},
		}
	}

	pub fn read_meta(&self, key: &[u8]) -> Option<Vec<u8>> {
		self.tables.get(&self.meta_table)
			.and_then(|t| t.get(key))
			.map(|v| v.to_vec())
	}

	pub fn erase_meta(&mut self, key: &[u8]) -> Result<()> {
		let table = self.meta_table;
		self.trans_begin();
		let result = self.cursor(table).and_then(|mut cur| {
			if cur.move_to(key, false) {
				cur.remove()?;
			}
			Ok(())
		});
		match result {
			Ok(()) => self.trans_commit(),
			Err(e) => {
				self.trans_abort();
				Err(e)
			},
		}
	}

	fn journal(&mut self, op: Undo) {
		if self.txn_level > 0 {
			self.undo.push(op);
		}
	}

	fn put(&mut self, table: u32, key: &[u8], value: &[u8]) -> Result<()> {
		let prev = {
			let t = self.tables.get_mut(&table).ok_or(ErrorKind::AccessCursor("no such table"))?;
			t.insert(key.to_vec(), value.to_vec())
		};
		self.journal(Undo::Put { table, key: key.to_vec(), prev });
		self.flush_standalone().chain_err(|| ErrorKind::CommitTrans)
	}

	fn delete(&mut self, table: u32, key: &[u8]) -> Result<()> {
		let prev = {
			let t = self.tables.get_mut(&table).ok_or(ErrorKind::AccessCursor("no such table"))?;
			t.remove(key)
		};
		if prev.is_some() {
			self.journal(Undo::Put { table, key: key.to_vec(), prev });
			self.flush_standalone().chain_err(|| ErrorKind::CommitTrans)?;
		}
		Ok(())
	}

	fn read_file(&mut self) -> Result<()> {
		let mmap = Mmap::open_path(&self.path, Protection::Read)
			.map_err(|e| ErrorKind::OpenDbFile(self.path.clone(), e.to_string()))?;
		let data = unsafe { mmap.as_slice() };
		if data.len() < CHECKSUM_SIZE + 18 {
			bail!(ErrorKind::OpenDbFile(self.path.clone(), "file too short".into()));
		}
		let checksum = &data[..CHECKSUM_SIZE];
		let payload = &data[CHECKSUM_SIZE..];
		let hash = sha3_256(payload);
		if hash != checksum {
			bail!(ErrorKind::OpenDbFile(
				self.path.clone(),
				format!(
					"checksum mismatch. Expected: {:02x}, got: {:02x}",
					hash.as_hex(),
					checksum.as_hex(),
				),
			));
		}
		if &payload[..4] != MAGIC {
			bail!(ErrorKind::OpenDbFile(self.path.clone(), "not a database file".into()));
		}
		if LittleEndian::read_u16(&payload[4..6]) != FORMAT_VERSION {
			bail!(ErrorKind::OpenDbFile(self.path.clone(), "unsupported format version".into()));
		}
		self.next_table = LittleEndian::read_u32(&payload[6..10]);
		self.meta_table = LittleEndian::read_u32(&payload[10..14]);
		let table_count = LittleEndian::read_u32(&payload[14..18]) as usize;

		let mut pos = 18;
		let mut tables = BTreeMap::new();
		for _ in 0..table_count {
			let id = read_u32_at(payload, &mut pos, &self.path)?;
			let entries = read_u32_at(payload, &mut pos, &self.path)? as usize;
			let mut table = Table::new();
			for _ in 0..entries {
				let klen = read_u32_at(payload, &mut pos, &self.path)? as usize;
				let key = read_bytes_at(payload, &mut pos, klen, &self.path)?;
				let vlen = read_u32_at(payload, &mut pos, &self.path)? as usize;
				let value = read_bytes_at(payload, &mut pos, vlen, &self.path)?;
				table.insert(key, value);
			}
			tables.insert(id, table);
		}
		if !tables.contains_key(&self.meta_table) {
			bail!(ErrorKind::OpenDbFile(self.path.clone(), "meta table missing".into()));
		}
		self.tables = tables;
		Ok(())
	}

	fn write_file(&self) -> Result<()> {
		let mut payload = Vec::new();
		payload.extend_from_slice(MAGIC);
		payload.write_u16::<LittleEndian>(FORMAT_VERSION)?;
		payload.write_u32::<LittleEndian>(self.next_table)?;
		payload.write_u32::<LittleEndian>(self.meta_table)?;
		payload.write_u32::<LittleEndian>(self.tables.len() as u32)?;
		for (id, table) in &self.tables {
			payload.write_u32::<LittleEndian>(*id)?;
			payload.write_u32::<LittleEndian>(table.len() as u32)?;
			for (key, value) in table {
				payload.write_u32::<LittleEndian>(key.len() as u32)?;
				payload.extend_from_slice(key);
				payload.write_u32::<LittleEndian>(value.len() as u32)?;
				payload.extend_from_slice(value);
			}
		}
		let hash = sha3_256(&payload);

		let mut tmp_path = self.path.as_os_str().to_owned();
		tmp_path.push(".tmp");
		{
			let mut file = fs::OpenOptions::new()
				.write(true)
				.create(true)
				.truncate(true)
				.open(&tmp_path)?;
			file.write_all(&hash)?;
			file.write_all(&payload)?;
			file.flush()?;
			file.sync_all()?;
		}
		fs::rename(&tmp_path, &self.path)?;
		Ok(())
	}
}

fn read_u32_at(data: &[u8], pos: &mut usize, path: &Path) -> Result<u32> {
	if data.len() < *pos + 4 {
		bail!(ErrorKind::OpenDbFile(path.to_path_buf(), "truncated table directory".into()));
	}
	let v = LittleEndian::read_u32(&data[*pos..*pos + 4]);
	*pos += 4;
	Ok(v)
}

fn read_bytes_at(data: &[u8], pos: &mut usize, len: usize, path: &Path) -> Result<Vec<u8>> {
	if data.len() < *pos + len {
		bail!(ErrorKind::OpenDbFile(path.to_path_buf(), "truncated table entry".into()));
	}
	let v = data[*pos..*pos + len].to_vec();
	*pos += len;
	Ok(v)
}

impl Drop for PagedStore {
	fn drop(&mut self) {
		let _ = self.lock_file.unlock();
	}
}

/// A positioned view into one table.
///
/// Navigation is by key, so interleaved writes through the same cursor
/// keep the position meaningful: after `remove` the cursor still holds the
/// removed key and `move_next` steps to its successor.
#[derive(Debug)]
pub struct Cursor<'a> {
	store: &'a mut PagedStore,
	table: u32,
	pos: Option<Vec<u8>>,
}

impl<'a> Cursor<'a> {
	fn table(&self) -> &Table {
		// existence checked when the cursor was opened
		&self.store.tables[&self.table]
	}

	pub fn is_valid_pos(&self) -> bool {
		self.pos.is_some()
	}

	pub fn move_first(&mut self) -> bool {
		self.pos = self.table().keys().next().cloned();
		self.pos.is_some()
	}

	pub fn move_last(&mut self) -> bool {
		self.pos = self.table().keys().next_back().cloned();
		self.pos.is_some()
	}

	pub fn move_next(&mut self) -> bool {
		let next = match self.pos {
			Some(ref cur) => self.store.tables[&self.table]
				.range::<[u8], _>((Excluded(&cur[..]), Unbounded))
				.next()
				.map(|(k, _)| k.clone()),
			None => return false,
		};
		self.pos = next;
		self.pos.is_some()
	}

	pub fn move_prev(&mut self) -> bool {
		let prev = match self.pos {
			Some(ref cur) => self.store.tables[&self.table]
				.range::<[u8], _>((Unbounded, Excluded(&cur[..])))
				.next_back()
				.map(|(k, _)| k.clone()),
			None => return false,
		};
		self.pos = prev;
		self.pos.is_some()
	}

	/// Position at `key`. With `partial` the cursor lands on the first
	/// entry starting with `key` and reports whether one exists; without,
	/// it reports an exact hit and otherwise lands on the next greater
	/// entry (or past the end).
	pub fn move_to(&mut self, key: &[u8], partial: bool) -> bool {
		let at_or_after = self.table()
			.range::<[u8], _>((Included(&key[..]), Unbounded))
			.next()
			.map(|(k, _)| k.clone());
		self.pos = at_or_after;
		match self.pos {
			Some(ref k) => {
				if partial {
					k.starts_with(key)
				} else {
					&k[..] == key
				}
			},
			None => false,
		}
	}

	/// Step forward and report whether the new position still starts with
	/// `prefix`.
	pub fn move_next_prefixed(&mut self, prefix: &[u8]) -> bool {
		if !self.move_next() {
			return false;
		}
		match self.pos {
			Some(ref k) => k.starts_with(prefix),
			None => false,
		}
	}

	pub fn read_key(&self) -> Result<Vec<u8>> {
		match self.pos {
			Some(ref k) => Ok(k.clone()),
			None => bail!(ErrorKind::AccessCursor("cursor is not positioned")),
		}
	}

	pub fn read_value(&self) -> Result<Vec<u8>> {
		match self.pos {
			Some(ref k) => match self.table().get(k) {
				Some(v) => Ok(v.clone()),
				None => bail!(ErrorKind::AccessCursor("cursor entry vanished")),
			},
			None => bail!(ErrorKind::AccessCursor("cursor is not positioned")),
		}
	}

	/// Upsert, independent of the current position; the cursor ends up on
	/// the inserted entry.
	pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
		self.store.put(self.table, key, value)?;
		self.pos = Some(key.to_vec());
		Ok(())
	}

	/// Remove the entry at the current position. The position keeps the
	/// removed key so a following `move_next` continues the scan.
	pub fn remove(&mut self) -> Result<()> {
		let key = self.read_key()?;
		self.store.delete(self.table, &key)
	}
}

#[cfg(test)]
mod tests {
	extern crate tempdir;

	use self::tempdir::TempDir;
	use error::ErrorKind;
	use super::PagedStore;

	fn fixture(name: &str) -> (TempDir, PagedStore) {
		let temp = TempDir::new(name).unwrap();
		let store = PagedStore::open(temp.path().join("data.ndb")).unwrap();
		(temp, store)
	}

	#[test]
	fn create_insert_and_scan() {
		let (_temp, mut store) = fixture("create_insert_and_scan");
		let table = store.create_table().unwrap();

		{
			let mut cur = store.cursor(table).unwrap();
			cur.insert(b"bb", b"2").unwrap();
			cur.insert(b"aa", b"1").unwrap();
			cur.insert(b"cc", b"3").unwrap();
		}

		let mut cur = store.cursor(table).unwrap();
		assert!(cur.move_first());
		assert_eq!(cur.read_key().unwrap(), b"aa");
		assert!(cur.move_next());
		assert_eq!(cur.read_key().unwrap(), b"bb");
		assert_eq!(cur.read_value().unwrap(), b"2");
		assert!(cur.move_next());
		assert!(!cur.move_next());
		assert!(!cur.is_valid_pos());
	}

	#[test]
	fn move_to_exact_and_partial() {
		let (_temp, mut store) = fixture("move_to_exact_and_partial");
		let table = store.create_table().unwrap();
		{
			let mut cur = store.cursor(table).unwrap();
			cur.insert(b"a234", b"").unwrap();
			cur.insert(b"b234", b"").unwrap();
			cur.insert(b"d234", b"").unwrap();
		}

		let mut cur = store.cursor(table).unwrap();
		assert!(cur.move_to(b"b234", false));
		assert!(!cur.move_to(b"b3", false));
		// landed on next greater entry
		assert_eq!(cur.read_key().unwrap(), b"d234");
		assert!(cur.move_to(b"b", true));
		assert_eq!(cur.read_key().unwrap(), b"b234");
		assert!(!cur.move_to(b"c", true));
		assert!(!cur.move_to(b"e", true));
		assert!(!cur.is_valid_pos());
	}

	#[test]
	fn remove_keeps_scan_position() {
		let (_temp, mut store) = fixture("remove_keeps_scan_position");
		let table = store.create_table().unwrap();
		{
			let mut cur = store.cursor(table).unwrap();
			cur.insert(b"k1", b"").unwrap();
			cur.insert(b"k2", b"").unwrap();
			cur.insert(b"k3", b"").unwrap();
		}

		let mut cur = store.cursor(table).unwrap();
		assert!(cur.move_to(b"k", true));
		cur.remove().unwrap();
		assert!(cur.move_next_prefixed(b"k"));
		assert_eq!(cur.read_key().unwrap(), b"k2");
	}

	#[test]
	fn abort_undoes_everything() {
		let (_temp, mut store) = fixture("abort_undoes_everything");
		let table = store.create_table().unwrap();
		store.cursor(table).unwrap().insert(b"kept", b"1").unwrap();

		store.trans_begin();
		{
			let mut cur = store.cursor(table).unwrap();
			cur.insert(b"gone", b"2").unwrap();
			cur.insert(b"kept", b"changed").unwrap();
			assert!(cur.move_to(b"kept", false));
		}
		let dropped = store.create_table().unwrap();
		store.trans_abort();

		let mut cur = store.cursor(table).unwrap();
		assert!(!cur.move_to(b"gone", false));
		assert!(cur.move_to(b"kept", false));
		assert_eq!(cur.read_value().unwrap(), b"1");
		assert!(matches!(
			store.cursor(dropped).unwrap_err().kind(),
			&ErrorKind::CreateBtCursor
		));
	}

	#[test]
	fn drop_and_clear_tables() {
		let (_temp, mut store) = fixture("drop_and_clear_tables");
		let kept = store.create_table().unwrap();
		let dropped = store.create_table().unwrap();
		store.cursor(kept).unwrap().insert(b"k", b"v").unwrap();
		store.cursor(dropped).unwrap().insert(b"d", b"v").unwrap();

		store.drop_table(dropped).unwrap();
		assert!(store.cursor(dropped).is_err());
		assert!(store.drop_table(dropped).is_err());

		store.clear_table(kept).unwrap();
		let mut cur = store.cursor(kept).unwrap();
		assert!(!cur.move_first());

		// clearing inside an aborted scope restores the content
		store.cursor(kept).unwrap().insert(b"k2", b"v2").unwrap();
		store.trans_begin();
		store.clear_table(kept).unwrap();
		store.trans_abort();
		let mut cur = store.cursor(kept).unwrap();
		assert!(cur.move_to(b"k2", false));
	}

	#[test]
	fn nested_commit_only_flushes_once() {
		let (_temp, mut store) = fixture("nested_commit_only_flushes_once");
		let table = store.create_table().unwrap();

		store.trans_begin();
		store.trans_begin();
		store.cursor(table).unwrap().insert(b"x", b"y").unwrap();
		store.trans_commit().unwrap();
		assert!(store.is_trans());
		store.trans_commit().unwrap();
		assert!(!store.is_trans());
	}

	#[test]
	fn reopen_sees_committed_data() {
		let temp = TempDir::new("reopen_sees_committed_data").unwrap();
		let path = temp.path().join("data.ndb");
		let table;
		{
			let mut store = PagedStore::open(&path).unwrap();
			table = store.create_table().unwrap();
			store.trans_begin();
			store.cursor(table).unwrap().insert(b"key", b"value").unwrap();
			store.trans_commit().unwrap();
			store.write_meta(b"m", b"v").unwrap();
		}
		let mut store = PagedStore::open(&path).unwrap();
		assert_eq!(store.read_meta(b"m").unwrap(), b"v");
		let mut cur = store.cursor(table).unwrap();
		assert!(cur.move_to(b"key", false));
		assert_eq!(cur.read_value().unwrap(), b"value");
	}

	#[test]
	fn second_open_fails_on_lock() {
		let temp = TempDir::new("second_open_fails_on_lock").unwrap();
		let path = temp.path().join("data.ndb");
		let _store = PagedStore::open(&path).unwrap();
		assert!(matches!(
			PagedStore::open(&path).unwrap_err().kind(),
			&ErrorKind::OpenDbFile(_, _)
		));
	}

	#[test]
	fn detects_corruption() {
		use std::fs;
		use std::io::{Seek, SeekFrom, Write};

		let temp = TempDir::new("detects_corruption").unwrap();
		let path = temp.path().join("data.ndb");
		{
			let mut store = PagedStore::open(&path).unwrap();
			let table = store.create_table().unwrap();
			store.trans_begin();
			store.cursor(table).unwrap().insert(b"key", b"value").unwrap();
			store.trans_commit().unwrap();
		}
		{
			let mut file = fs::OpenOptions::new().write(true).open(&path).unwrap();
			file.seek(SeekFrom::Start(2)).unwrap();
			file.write_all(&[0xde, 0xad]).unwrap();
		}
		assert!(matches!(
			PagedStore::open(&path).unwrap_err().kind(),
			&ErrorKind::OpenDbFile(_, _)
		));
	}
}
