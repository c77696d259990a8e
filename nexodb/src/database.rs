//! The database handle.
//!
//! One `Database` owns the store file, the record cache, the atom
//! dictionary, the index registry and the stream lock table. Handles are
//! cheap clones sharing the same inner state; all record and dictionary
//! access is serialized behind one mutex, so there is exactly one writer
//! at any time. Six sub-trees live in the file, registered in the root
//! meta record: objTable (records, uuid mapping, oid counter), dirTable
//! (atom dictionary), strTable (stream metadata), idxTable (index
//! registry), queTable (per-object queues), mapTable (per-object sparse
//! maps).

use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use cell::{Atom, Cell, Index, Oid, Sid};
use codec::{Reader, Token, Writer};
use error::{ErrorKind, Result};
use index::IndexMeta;
use record::{RecordImp, RecordPtr, RecordType};
use store::PagedStore;
use streams::StreamMeta;
use transaction::Transaction;
use update::{UpdateInfo, UpdateKind};

const STREAMS_SUFFIX: &'static str = ".streams";

/// Names of the table slots in the root meta record.
const META_TABLES: [&'static str; 6] = [
	"objTable", "dirTable", "strTable", "idxTable", "queTable", "mapTable",
];

#[derive(Debug, Default, Clone, Copy)]
struct Meta {
	obj_table: u32,
	dir_table: u32,
	str_table: u32,
	idx_table: u32,
	que_table: u32,
	map_table: u32,
}

type Observer = Box<Fn(&UpdateInfo) + Send>;

pub(crate) struct DbState {
	pub(crate) store: PagedStore,
	meta: Meta,
	pub(crate) cache: HashMap<Oid, RecordPtr>,
	dir: HashMap<Vec<u8>, Atom>,
	inv_dir: HashMap<Atom, Vec<u8>>,
	idx_meta: HashMap<Index, IndexMeta>,
	idx_atoms: HashMap<Atom, Vec<Index>>,
	stream_locks: HashMap<Sid, i32>,
	max_oid: Option<u64>,
	next_txn_id: u64,
}

struct Inner {
	state: Mutex<DbState>,
	observers: Mutex<Vec<Option<Observer>>>,
}

/// Shared handle to one open database file.
#[derive(Clone)]
pub struct Database {
	inner: Arc<Inner>,
}

impl Database {
	/// Open or create the database file at `path`.
	pub fn open<P: Into<PathBuf>>(path: P) -> Result<Database> {
		let store = PagedStore::open(path.into())?;
		let mut state = DbState {
			store,
			meta: Meta::default(),
			cache: HashMap::new(),
			dir: HashMap::new(),
			inv_dir: HashMap::new(),
			idx_meta: HashMap::new(),
			idx_atoms: HashMap::new(),
			stream_locks: HashMap::new(),
			max_oid: None,
			next_txn_id: 1,
		};
		state.load_meta()?;
		Ok(Database {
			inner: Arc::new(Inner {
				state: Mutex::new(state),
				observers: Mutex::new(Vec::new()),
			}),
		})
	}

	/// Start a transaction over this handle.
	pub fn transaction(&self) -> Transaction {
		let id = {
			let mut state = self.state();
			let id = state.next_txn_id;
			state.next_txn_id += 1;
			id
		};
		Transaction::new(self.clone(), id)
	}

	pub(crate) fn state(&self) -> MutexGuard<DbState> {
		self.inner.state.lock()
	}

	pub fn file_path(&self) -> PathBuf {
		self.state().store.path().to_path_buf()
	}

	/// Begin a write scope on the underlying store. Scopes nest; only the
	/// outermost commit flushes, and abort always wins.
	pub fn begin_trans(&self) {
		self.state().store.trans_begin();
	}

	pub fn commit_trans(&self) -> Result<()> {
		self.state().store.trans_commit()
	}

	/// Abort the whole write scope, whatever the nesting depth. The
	/// dictionary and index caches are dropped as well since they may
	/// hold entries created inside the aborted scope.
	pub fn abort_trans(&self) {
		let mut state = self.state();
		state.store.trans_abort();
		state.dir.clear();
		state.inv_dir.clear();
		state.idx_meta.clear();
		state.idx_atoms.clear();
		state.max_oid = None;
	}

	// --- atom dictionary

	/// Resolve `name` to its atom, allocating one when `create` is set.
	/// Returns zero when the name is unknown and not created.
	pub fn atom(&self, name: &[u8], create: bool) -> Result<Atom> {
		self.state().atom(name, create)
	}

	/// Inverse lookup. Unknown atoms yield an empty name.
	pub fn atom_name(&self, atom: Atom) -> Result<Vec<u8>> {
		self.state().atom_name(atom)
	}

	/// Install a fixed (name, atom) pair, failing `AtomClash` when either
	/// side is already bound differently.
	pub fn preset_atom(&self, name: &[u8], atom: Atom) -> Result<()> {
		self.state().preset_atom(name, atom)
	}

	// --- index registry

	/// Create a named index; fails `IndexExists` on a name collision.
	pub fn create_index(&self, name: &[u8], meta: &IndexMeta) -> Result<Index> {
		if meta.items.is_empty() {
			bail!(ErrorKind::InvalidArgument);
		}
		let mut state = self.state();
		if state.find_index(name)? != 0 {
			bail!(ErrorKind::IndexExists);
		}
		state.store.trans_begin();
		let result = state.create_index(name, meta);
		match result {
			Ok(table) => {
				state.store.trans_commit()?;
				Ok(table)
			},
			Err(e) => {
				state.store.trans_abort();
				Err(e)
			},
		}
	}

	/// Table id of the named index, zero when there is none.
	pub fn find_index(&self, name: &[u8]) -> Result<Index> {
		self.state().find_index(name)
	}

	pub fn index_meta(&self, index: Index) -> Result<Option<IndexMeta>> {
		self.state().index_meta(index)
	}

	/// Indexes whose first item is `atom`.
	pub fn find_index_for_atom(&self, atom: Atom) -> Result<Vec<Index>> {
		self.state().find_index_for_atom(atom)
	}

	// --- named meta entries

	pub fn write_meta(&self, name: &[u8], value: &Cell) -> Result<()> {
		let mut state = self.state();
		let key = Cell::Latin1(name.to_vec()).to_bytes();
		state.store.write_meta(&key, &value.to_bytes())
	}

	pub fn read_meta(&self, name: &[u8]) -> Result<Cell> {
		let state = self.state();
		let key = Cell::Latin1(name.to_vec()).to_bytes();
		match state.store.read_meta(&key) {
			Some(bytes) => Cell::from_bytes(&bytes),
			None => Ok(Cell::Null),
		}
	}

	pub fn erase_meta(&self, name: &[u8]) -> Result<()> {
		let mut state = self.state();
		let key = Cell::Latin1(name.to_vec()).to_bytes();
		state.store.erase_meta(&key)
	}

	// --- identity

	/// Resolve a uuid to its record id, zero when unmapped.
	pub fn deref_uuid(&self, uuid: &Uuid) -> Result<Oid> {
		self.state().deref_uuid(uuid)
	}

	/// Highest record id handed out so far.
	pub fn max_oid(&self) -> Result<Oid> {
		self.state().peek_max_oid()
	}

	// --- observers

	/// Register an observer; the returned token removes it again.
	pub fn add_observer(&self, observer: Observer) -> usize {
		let mut observers = self.inner.observers.lock();
		observers.push(Some(observer));
		observers.len() - 1
	}

	pub fn remove_observer(&self, token: usize) {
		let mut observers = self.inner.observers.lock();
		if let Some(slot) = observers.get_mut(token) {
			*slot = None;
		}
	}

	/// Deliver one notification to every observer. Emissions are guarded
	/// individually; a panicking observer cannot derail the caller. Must
	/// not be called with the state mutex held.
	pub(crate) fn emit(&self, info: &UpdateInfo) {
		self.inner.emit(info);
	}

	// --- diagnostics

	/// Render the whole record table.
	pub fn dump(&self) -> Result<String> {
		let mut state = self.state();
		let table = state.obj_table()?;
		let mut out = String::new();
		let mut cur = state.store.cursor(table)?;
		if cur.move_first() {
			loop {
				let key = Cell::from_bytes(&cur.read_key()?)?;
				match key {
					Cell::Id64(id) => {
						let imp = RecordImp::deserialize(id, &cur.read_value()?)?;
						out.push_str(&imp.dump());
					},
					other => {
						let value = Cell::from_bytes(&cur.read_value()?)?;
						out.push_str(&format!("{} = {}\n", other.pretty(), value.pretty()));
					},
				}
				if !cur.move_next() {
					break;
				}
			}
		}
		Ok(out)
	}

	/// Render the atom dictionary.
	pub fn dump_atoms(&self) -> Result<String> {
		let mut state = self.state();
		let table = state.dir_table()?;
		let mut out = String::new();
		let mut cur = state.store.cursor(table)?;
		if cur.move_first() {
			loop {
				let key = Cell::from_bytes(&cur.read_key()?)?;
				let value = Cell::from_bytes(&cur.read_value()?)?;
				out.push_str(&format!("{} = {}\n", key.pretty(), value.pretty()));
				if !cur.move_next() {
					break;
				}
			}
		}
		Ok(out)
	}

	/// Render the queue table, optionally restricted to one object.
	pub fn dump_queue(&self, oid: Oid) -> Result<String> {
		let mut state = self.state();
		let table = state.que_table()?;
		let mut out = String::new();
		let mut cur = state.store.cursor(table)?;
		if cur.move_first() {
			loop {
				let key = cur.read_key()?;
				let (owner, used) = Cell::read_from(&key)?;
				if oid == 0 || owner.to_id64() == oid {
					let mut line = owner.pretty();
					if used < key.len() {
						let (nr, _) = Cell::read_from(&key[used..])?;
						line.push_str(&format!(" {}", nr.pretty()));
					}
					let value = Cell::from_bytes(&cur.read_value()?)?;
					out.push_str(&format!("{} = {}\n", line, value.pretty()));
				}
				if !cur.move_next() {
					break;
				}
			}
		}
		Ok(out)
	}

	// --- record plumbing for the transaction layer

	pub(crate) fn streams_dir(&self) -> Result<PathBuf> {
		let path = self.file_path();
		let mut name = path.file_stem()
			.ok_or(ErrorKind::StreamsDir("database path has no file name"))?
			.to_os_string();
		name.push(STREAMS_SUFFIX);
		let dir = match path.parent() {
			Some(parent) => parent.join(name),
			None => PathBuf::from(name),
		};
		if !dir.exists() {
			fs::create_dir_all(&dir)
				.map_err(|_| ErrorKind::StreamsDir("cannot create"))?;
		}
		Ok(dir)
	}
}

impl Inner {
	fn emit(&self, info: &UpdateInfo) {
		let observers = self.observers.lock();
		for observer in observers.iter() {
			if let Some(ref cb) = *observer {
				let _ = panic::catch_unwind(AssertUnwindSafe(|| cb(info)));
			}
		}
	}
}

impl Drop for Inner {
	fn drop(&mut self) {
		self.emit(&UpdateInfo::new(UpdateKind::DbClosing));
	}
}

impl DbState {
	// --- meta record

	fn load_meta(&mut self) -> Result<()> {
		let null_key = Cell::Null.to_bytes();
		let bytes = match self.store.read_meta(&null_key) {
			Some(bytes) => bytes,
			None => return Ok(()),
		};
		let mut r = Reader::new(&bytes);
		loop {
			let token = r.next_token()?;
			if !token.is_useful() {
				break;
			}
			match token {
				Token::Slot => {
					let name = r.name().arr().to_vec();
					let value = r.value().int32() as u32;
					match &name[..] {
						b"objTable" => self.meta.obj_table = value,
						b"dirTable" => self.meta.dir_table = value,
						b"strTable" => self.meta.str_table = value,
						b"idxTable" => self.meta.idx_table = value,
						b"queTable" => self.meta.que_table = value,
						b"mapTable" => self.meta.map_table = value,
						// unknown slots are carried by newer versions
						_ => {},
					}
				},
				_ => bail!(ErrorKind::AccessMeta("invalid meta header format".into())),
			}
		}
		Ok(())
	}

	fn save_meta(&mut self) -> Result<()> {
		let mut w = Writer::new();
		{
			let tables = [
				self.meta.obj_table, self.meta.dir_table, self.meta.str_table,
				self.meta.idx_table, self.meta.que_table, self.meta.map_table,
			];
			for (name, table) in META_TABLES.iter().zip(tables.iter()) {
				if *table != 0 {
					w.write_named_slot(
						&Cell::Latin1(name.as_bytes().to_vec()),
						&Cell::Int32(*table as i32),
					);
				}
			}
		}
		let null_key = Cell::Null.to_bytes();
		self.store.write_meta(&null_key, w.stream())
	}

	fn table(&mut self, which: usize) -> Result<u32> {
		let current = match which {
			0 => self.meta.obj_table,
			1 => self.meta.dir_table,
			2 => self.meta.str_table,
			3 => self.meta.idx_table,
			4 => self.meta.que_table,
			_ => self.meta.map_table,
		};
		if current != 0 {
			return Ok(current);
		}
		self.store.trans_begin();
		let table = match self.store.create_table() {
			Ok(table) => table,
			Err(e) => {
				self.store.trans_abort();
				return Err(e);
			},
		};
		match which {
			0 => self.meta.obj_table = table,
			1 => self.meta.dir_table = table,
			2 => self.meta.str_table = table,
			3 => self.meta.idx_table = table,
			4 => self.meta.que_table = table,
			_ => self.meta.map_table = table,
		}
		match self.save_meta() {
			Ok(()) => {
				self.store.trans_commit()?;
				Ok(table)
			},
			Err(e) => {
				self.store.trans_abort();
				Err(e)
			},
		}
	}

	pub(crate) fn obj_table(&mut self) -> Result<u32> {
		self.table(0)
	}

	pub(crate) fn dir_table(&mut self) -> Result<u32> {
		self.table(1)
	}

	pub(crate) fn str_table(&mut self) -> Result<u32> {
		self.table(2)
	}

	pub(crate) fn idx_table(&mut self) -> Result<u32> {
		self.table(3)
	}

	pub(crate) fn que_table(&mut self) -> Result<u32> {
		self.table(4)
	}

	pub(crate) fn map_table(&mut self) -> Result<u32> {
		self.table(5)
	}

	// --- record cache

	/// Cached record or a fresh load from the object table. Unknown ids
	/// and committed-deleted records read as absent.
	pub(crate) fn get_or_load_record(&mut self, id: Oid) -> Result<Option<RecordPtr>> {
		if let Some(ptr) = self.cache.get(&id) {
			if ptr.lock().is_deleted() {
				return Ok(None);
			}
			return Ok(Some(ptr.clone()));
		}
		let table = self.obj_table()?;
		let imp = {
			let mut cur = self.store.cursor(table)?;
			if !cur.move_to(&Cell::Id64(id).to_bytes(), false) {
				return Ok(None);
			}
			RecordImp::deserialize(id, &cur.read_value()?)?
		};
		let ptr = Arc::new(Mutex::new(imp));
		self.cache.insert(id, ptr.clone());
		Ok(Some(ptr))
	}

	/// Allocate the next record id and insert a fresh image into the
	/// cache. The id counter is persisted at commit together with the
	/// record rows.
	pub(crate) fn create_record(&mut self, typ: RecordType) -> Result<RecordPtr> {
		let id = self.next_oid()?;
		let ptr = Arc::new(Mutex::new(RecordImp::new(id, typ)));
		self.cache.insert(id, ptr.clone());
		Ok(ptr)
	}

	pub(crate) fn save_record(&mut self, imp: &RecordImp) -> Result<()> {
		let table = self.obj_table()?;
		let bytes = imp.serialize();
		let mut cur = self.store.cursor(table)?;
		cur.insert(&Cell::Id64(imp.id).to_bytes(), &bytes)
	}

	pub(crate) fn erase_record(&mut self, id: Oid) -> Result<()> {
		let table = self.obj_table()?;
		let mut cur = self.store.cursor(table)?;
		if cur.move_to(&Cell::Id64(id).to_bytes(), false) {
			cur.remove()?;
		}
		Ok(())
	}

	/// Drop cache entries nobody references any more. Runs only outside
	/// transactions; a locked record always stays.
	pub(crate) fn shrink_cache(&mut self) {
		self.cache.retain(|_, ptr| {
			Arc::strong_count(ptr) > 1 || ptr.lock().locker.is_some()
		});
	}

	// --- id counters

	fn next_oid(&mut self) -> Result<Oid> {
		let max = self.peek_max_oid()? + 1;
		self.max_oid = Some(max);
		Ok(max)
	}

	pub(crate) fn peek_max_oid(&mut self) -> Result<Oid> {
		if let Some(max) = self.max_oid {
			return Ok(max);
		}
		let table = self.obj_table()?;
		let max = {
			let mut cur = self.store.cursor(table)?;
			if cur.move_to(&Cell::Null.to_bytes(), false) {
				Cell::from_bytes(&cur.read_value()?)?.to_id64()
			} else {
				0
			}
		};
		self.max_oid = Some(max);
		Ok(max)
	}

	/// Write the id counter row; called from commit while the store
	/// transaction is open.
	pub(crate) fn persist_max_oid(&mut self) -> Result<()> {
		let max = self.peek_max_oid()?;
		let table = self.obj_table()?;
		let mut cur = self.store.cursor(table)?;
		cur.insert(&Cell::Null.to_bytes(), &Cell::UInt64(max).to_bytes())
	}

	pub(crate) fn next_sid(&mut self) -> Result<Sid> {
		let table = self.str_table()?;
		self.store.trans_begin();
		let result = (|store: &mut PagedStore| -> Result<Sid> {
			let mut cur = store.cursor(table)?;
			let null_key = Cell::Null.to_bytes();
			let sid = if cur.move_to(&null_key, false) {
				Cell::from_bytes(&cur.read_value()?)?.sid()
			} else {
				0
			} + 1;
			cur.insert(&null_key, &Cell::Sid(sid).to_bytes())?;
			Ok(sid)
		})(&mut self.store);
		match result {
			Ok(sid) => {
				self.store.trans_commit()?;
				Ok(sid)
			},
			Err(e) => {
				self.store.trans_abort();
				Err(e)
			},
		}
	}

	// --- uuid mapping

	pub(crate) fn deref_uuid(&mut self, uuid: &Uuid) -> Result<Oid> {
		let table = self.obj_table()?;
		let mut cur = self.store.cursor(table)?;
		if cur.move_to(&Cell::Uuid(*uuid).to_bytes(), false) {
			Ok(Cell::from_bytes(&cur.read_value()?)?.to_id64())
		} else {
			Ok(0)
		}
	}

	/// Map a uuid to a record id; id zero removes the mapping.
	pub(crate) fn set_uuid(&mut self, id: Oid, uuid: &Uuid) -> Result<()> {
		let table = self.obj_table()?;
		let mut cur = self.store.cursor(table)?;
		let key = Cell::Uuid(*uuid).to_bytes();
		if id == 0 {
			if cur.move_to(&key, false) {
				cur.remove()?;
			}
			Ok(())
		} else {
			cur.insert(&key, &Cell::Id64(id).to_bytes())
		}
	}

	// --- atom dictionary

	pub(crate) fn atom(&mut self, name: &[u8], create: bool) -> Result<Atom> {
		if let Some(atom) = self.dir.get(name) {
			return Ok(*atom);
		}
		let table = self.dir_table()?;
		let name_key = Cell::Latin1(name.to_vec()).to_bytes();
		let found = {
			let mut cur = self.store.cursor(table)?;
			if cur.move_to(&name_key, false) {
				let atom = Cell::from_bytes(&cur.read_value()?)?;
				match atom {
					Cell::Atom(a) => Some(a),
					_ => bail!(ErrorKind::RecordFormat("dictionary entry is not an atom")),
				}
			} else {
				None
			}
		};
		if let Some(atom) = found {
			self.dir.insert(name.to_vec(), atom);
			self.inv_dir.insert(atom, name.to_vec());
			return Ok(atom);
		}
		if !create {
			return Ok(0);
		}

		self.store.trans_begin();
		let result = (|store: &mut PagedStore| -> Result<Atom> {
			let mut cur = store.cursor(table)?;
			let null_key = Cell::Null.to_bytes();
			let atom = if cur.move_to(&null_key, false) {
				match Cell::from_bytes(&cur.read_value()?)? {
					Cell::Atom(a) => a,
					_ => bail!(ErrorKind::RecordFormat("atom counter is not an atom")),
				}
			} else {
				0
			} + 1;
			let atom_key = Cell::Atom(atom).to_bytes();
			cur.insert(&null_key, &atom_key)?;
			cur.insert(&name_key, &atom_key)?;
			cur.insert(&atom_key, &Cell::Latin1(name.to_vec()).to_bytes())?;
			Ok(atom)
		})(&mut self.store);
		match result {
			Ok(atom) => {
				self.store.trans_commit()?;
				self.dir.insert(name.to_vec(), atom);
				self.inv_dir.insert(atom, name.to_vec());
				Ok(atom)
			},
			Err(e) => {
				self.store.trans_abort();
				Err(e)
			},
		}
	}

	pub(crate) fn atom_name(&mut self, atom: Atom) -> Result<Vec<u8>> {
		if atom == 0 {
			return Ok(Vec::new());
		}
		if let Some(name) = self.inv_dir.get(&atom) {
			return Ok(name.clone());
		}
		let table = self.dir_table()?;
		let name = {
			let mut cur = self.store.cursor(table)?;
			if cur.move_to(&Cell::Atom(atom).to_bytes(), false) {
				Cell::from_bytes(&cur.read_value()?)?.arr().to_vec()
			} else {
				return Ok(Vec::new());
			}
		};
		self.dir.insert(name.clone(), atom);
		self.inv_dir.insert(atom, name.clone());
		Ok(name)
	}

	pub(crate) fn preset_atom(&mut self, name: &[u8], atom: Atom) -> Result<()> {
		if let Some(cached) = self.dir.get(name) {
			if *cached != atom {
				bail!(ErrorKind::AtomClash);
			}
			return Ok(());
		}
		let table = self.dir_table()?;
		let name_key = Cell::Latin1(name.to_vec()).to_bytes();
		let atom_key = Cell::Atom(atom).to_bytes();
		{
			let mut cur = self.store.cursor(table)?;
			if cur.move_to(&name_key, false) {
				match Cell::from_bytes(&cur.read_value()?)? {
					Cell::Atom(found) if found == atom => {},
					Cell::Atom(_) => bail!(ErrorKind::AtomClash),
					_ => bail!(ErrorKind::RecordFormat("dictionary entry is not an atom")),
				}
				if cur.move_to(&atom_key, false) && cur.read_value()? != name_key {
					bail!(ErrorKind::RecordFormat("dictionary directions disagree"));
				}
				return Ok(());
			}
			// the name is new; the atom id must not belong to another name
			if cur.move_to(&atom_key, false) && cur.read_value()? != name_key {
				bail!(ErrorKind::AtomClash);
			}
		}

		self.store.trans_begin();
		let result = (|store: &mut PagedStore| -> Result<()> {
			let mut cur = store.cursor(table)?;
			let null_key = Cell::Null.to_bytes();
			let counter = if cur.move_to(&null_key, false) {
				match Cell::from_bytes(&cur.read_value()?)? {
					Cell::Atom(a) => a,
					_ => bail!(ErrorKind::RecordFormat("atom counter is not an atom")),
				}
			} else {
				0
			};
			if atom > counter {
				cur.insert(&null_key, &atom_key)?;
			}
			cur.insert(&name_key, &atom_key)?;
			cur.insert(&atom_key, &Cell::Latin1(name.to_vec()).to_bytes())?;
			Ok(())
		})(&mut self.store);
		match result {
			Ok(()) => {
				self.store.trans_commit()?;
				self.dir.insert(name.to_vec(), atom);
				self.inv_dir.insert(atom, name.to_vec());
				Ok(())
			},
			Err(e) => {
				self.store.trans_abort();
				Err(e)
			},
		}
	}

	// --- index registry

	pub(crate) fn find_index(&mut self, name: &[u8]) -> Result<Index> {
		let table = self.idx_table()?;
		let mut cur = self.store.cursor(table)?;
		if cur.move_to(&Cell::Latin1(name.to_vec()).to_bytes(), false) {
			Ok(Cell::from_bytes(&cur.read_value()?)?.id32())
		} else {
			Ok(0)
		}
	}

	fn create_index(&mut self, name: &[u8], meta: &IndexMeta) -> Result<Index> {
		let registry = self.idx_table()?;
		let table = self.store.create_table()?;
		let id_cell = Cell::Id32(table).to_bytes();
		{
			let mut cur = self.store.cursor(registry)?;
			cur.insert(&Cell::Latin1(name.to_vec()).to_bytes(), &id_cell)?;
			cur.insert(&id_cell, &meta.serialize())?;
			// reverse lookup: only the first item triggers maintenance,
			// the remaining items ride along with it
			let mut reverse = Cell::Atom(meta.items[0].atom).to_bytes();
			reverse.extend_from_slice(&id_cell);
			cur.insert(&reverse, &id_cell)?;
		}
		self.idx_meta.insert(table, meta.clone());
		self.idx_atoms.remove(&meta.items[0].atom);
		Ok(table)
	}

	pub(crate) fn index_meta(&mut self, index: Index) -> Result<Option<IndexMeta>> {
		if let Some(meta) = self.idx_meta.get(&index) {
			return Ok(Some(meta.clone()));
		}
		let table = self.idx_table()?;
		let meta = {
			let mut cur = self.store.cursor(table)?;
			if cur.move_to(&Cell::Id32(index).to_bytes(), false) {
				IndexMeta::deserialize(&cur.read_value()?)?
			} else {
				return Ok(None);
			}
		};
		self.idx_meta.insert(index, meta.clone());
		Ok(Some(meta))
	}

	pub(crate) fn find_index_for_atom(&mut self, atom: Atom) -> Result<Vec<Index>> {
		if let Some(list) = self.idx_atoms.get(&atom) {
			return Ok(list.clone());
		}
		let table = self.idx_table()?;
		let mut list = Vec::new();
		{
			let prefix = Cell::Atom(atom).to_bytes();
			let mut cur = self.store.cursor(table)?;
			if cur.move_to(&prefix, true) {
				loop {
					let id = Cell::from_bytes(&cur.read_value()?)?.id32();
					if id != 0 {
						list.push(id);
					}
					if !cur.move_next_prefixed(&prefix) {
						break;
					}
				}
			}
		}
		self.idx_atoms.insert(atom, list.clone());
		Ok(list)
	}

	// --- streams

	pub(crate) fn lock_stream(&mut self, sid: Sid, write: bool) -> Result<bool> {
		{
			let entry = self.stream_locks.entry(sid).or_insert(0);
			if *entry < 0 || (write && *entry > 0) {
				return Ok(false);
			}
			*entry = if write { -1 } else { *entry + 1 };
		}
		let mut meta = self.load_stream_meta(sid)?.unwrap_or_else(StreamMeta::new);
		meta.last_use = Some(Utc::now().naive_utc());
		meta.use_count += 1;
		self.save_stream_meta(sid, &meta)?;
		Ok(true)
	}

	pub(crate) fn unlock_stream(&mut self, sid: Sid) -> bool {
		match self.stream_locks.get(&sid).cloned() {
			None => false,
			Some(v) if v < 0 => {
				self.stream_locks.remove(&sid);
				true
			},
			Some(v) => {
				if v <= 1 {
					self.stream_locks.remove(&sid);
				} else {
					self.stream_locks.insert(sid, v - 1);
				}
				true
			},
		}
	}

	pub(crate) fn is_stream_write_locked(&self, sid: Sid) -> bool {
		self.stream_locks.get(&sid).map_or(false, |v| *v < 0)
	}

	pub(crate) fn load_stream_meta(&mut self, sid: Sid) -> Result<Option<StreamMeta>> {
		let table = self.str_table()?;
		let bytes = {
			let mut cur = self.store.cursor(table)?;
			if !cur.move_to(&Cell::Sid(sid).to_bytes(), false) {
				return Ok(None);
			}
			cur.read_value()?
		};
		StreamMeta::deserialize(&bytes).map(Some)
	}

	pub(crate) fn erase_stream_meta(&mut self, sid: Sid) -> Result<()> {
		let table = self.str_table()?;
		self.store.trans_begin();
		let result = self.store.cursor(table).and_then(|mut cur| {
			if cur.move_to(&Cell::Sid(sid).to_bytes(), false) {
				cur.remove()?;
			}
			Ok(())
		});
		match result {
			Ok(()) => self.store.trans_commit(),
			Err(e) => {
				self.store.trans_abort();
				Err(e)
			},
		}
	}

	pub(crate) fn save_stream_meta(&mut self, sid: Sid, meta: &StreamMeta) -> Result<()> {
		let table = self.str_table()?;
		self.store.trans_begin();
		let result = {
			let bytes = meta.serialize();
			self.store.cursor(table)
				.and_then(|mut cur| cur.insert(&Cell::Sid(sid).to_bytes(), &bytes))
		};
		match result {
			Ok(()) => self.store.trans_commit(),
			Err(e) => {
				self.store.trans_abort();
				Err(e)
			},
		}
	}
}
