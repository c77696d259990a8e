//! Transactions.
//!
//! A transaction is bound to one thread and is the only mutator entry
//! point of the object layer. It keeps a copy-on-write shadow per touched
//! record; the first write locks the record against other transactions.
//! Nothing reaches the store before `commit`, which replays all deltas
//! under one store write transaction, maintains the secondary indexes
//! (removes with the pre-image, inserts with the post-image) and then
//! delivers the queued notifications.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use cell::{self, Atom, Cell, Oid, Sid};
use database::{Database, DbState};
use error::{ErrorKind, Result};
use index::{self, Idx, IndexKind};
use lit::Lit;
use obj::Obj;
use orl::Orl;
use record::{field, Fields, RecordCow, RecordPtr, RecordType, State, MIN_RESERVED_FIELD};
use rel::Rel;
use streams::{DbStream, StreamMeta};
use update::{UpdateInfo, UpdateKind};

struct TxnInner {
	cows: HashMap<Oid, RecordCow>,
	notify: Vec<UpdateInfo>,
	active: bool,
}

/// One unit of isolated work over a database handle.
pub struct Transaction {
	db: Database,
	id: u64,
	inner: RefCell<TxnInner>,
}

impl Transaction {
	pub(crate) fn new(db: Database, id: u64) -> Transaction {
		Transaction {
			db,
			id,
			inner: RefCell::new(TxnInner {
				cows: HashMap::new(),
				notify: Vec::new(),
				active: false,
			}),
		}
	}

	pub fn db(&self) -> &Database {
		&self.db
	}

	/// Whether any mutation happened since the last commit or rollback.
	pub fn is_active(&self) -> bool {
		self.inner.borrow().active
	}

	// --- record access

	/// Load a record, optionally insisting on a type. Unknown and deleted
	/// ids read as absent; a type mismatch is an error.
	pub(crate) fn get_record(&self, id: Oid, typ: Option<RecordType>) -> Result<Option<RecordPtr>> {
		if id == 0 {
			return Ok(None);
		}
		let ptr = {
			let mut state = self.db.state();
			match state.get_or_load_record(id)? {
				Some(ptr) => ptr,
				None => return Ok(None),
			}
		};
		if let Some(expected) = typ {
			if ptr.lock().typ != expected {
				bail!(ErrorKind::WrongType);
			}
		}
		Ok(Some(ptr))
	}

	/// Create a fresh record, already locked by this transaction.
	pub(crate) fn create_record(&self, typ: RecordType) -> Result<RecordPtr> {
		let ptr = {
			let mut state = self.db.state();
			let ptr = state.create_record(typ)?;
			{
				let mut imp = ptr.lock();
				imp.state = State::New;
				imp.locker = Some(self.id);
			}
			ptr
		};
		let id = ptr.lock().id;
		let mut inner = self.inner.borrow_mut();
		inner.active = true;
		inner.cows.insert(id, RecordCow::new(ptr.clone()));
		Ok(ptr)
	}

	/// Resolve write authority: install this transaction as the record's
	/// locker (or fail `RecordLocked`), make sure a cow exists, and mark
	/// the transaction active. Committed-deleted records are rejected;
	/// ones merely marked for deletion stay writable until commit.
	fn cow_for_write(&self, ptr: &RecordPtr) -> Result<Oid> {
		let _state = self.db.state();
		let id;
		{
			let mut imp = ptr.lock();
			match imp.locker {
				Some(owner) if owner != self.id => bail!(ErrorKind::RecordLocked),
				_ => {},
			}
			if imp.state == State::Deleted {
				bail!(ErrorKind::RecordDeleted);
			}
			imp.locker = Some(self.id);
			id = imp.id;
		}
		let mut inner = self.inner.borrow_mut();
		inner.active = true;
		if !inner.cows.contains_key(&id) {
			inner.cows.insert(id, RecordCow::new(ptr.clone()));
		}
		Ok(id)
	}

	pub(crate) fn set_field(&self, ptr: &RecordPtr, atom: Atom, value: Cell) -> Result<()> {
		let id = self.cow_for_write(ptr)?;
		let mut inner = self.inner.borrow_mut();
		inner.cows.get_mut(&id).expect("cow installed above; qed")
			.fields.insert(atom, value);
		Ok(())
	}

	/// Effective field value: this transaction's pending write if the
	/// record is locked by it, the committed image otherwise.
	pub(crate) fn get_field(&self, ptr: &RecordPtr, atom: Atom) -> Result<Cell> {
		let _state = self.db.state();
		let imp = ptr.lock();
		if imp.locker == Some(self.id) {
			let inner = self.inner.borrow();
			if let Some(cow) = inner.cows.get(&imp.id) {
				if let Some(value) = cow.fields.get(&atom) {
					return Ok(value.clone());
				}
			}
		}
		imp.field(atom)
	}

	pub(crate) fn has_field(&self, ptr: &RecordPtr, atom: Atom) -> Result<bool> {
		Ok(self.get_field(ptr, atom)?.has_value())
	}

	/// Atoms with a pending write on this record, when it is locked here.
	pub(crate) fn pending_fields(&self, ptr: &RecordPtr) -> Vec<Atom> {
		let _state = self.db.state();
		let imp = ptr.lock();
		if imp.locker == Some(self.id) {
			let inner = self.inner.borrow();
			if let Some(cow) = inner.cows.get(&imp.id) {
				return cow.fields.keys().cloned().collect();
			}
		}
		Vec::new()
	}

	pub(crate) fn get_id_field(&self, ptr: &RecordPtr, atom: Atom) -> Result<Oid> {
		Ok(self.get_field(ptr, atom)?.to_id64())
	}

	/// Mark a record for deletion at commit.
	pub(crate) fn erase(&self, ptr: &RecordPtr) -> Result<()> {
		self.cow_for_write(ptr)?;
		ptr.lock().state = State::ToDelete;
		Ok(())
	}

	pub(crate) fn note(&self, info: UpdateInfo) {
		self.inner.borrow_mut().notify.push(info);
	}

	// --- queue slots

	pub(crate) fn set_qslot(&self, ptr: &RecordPtr, nr: u32, value: Cell) -> Result<()> {
		let id = self.cow_for_write(ptr)?;
		let mut inner = self.inner.borrow_mut();
		inner.cows.get_mut(&id).expect("cow installed above; qed")
			.queue.insert(nr, value);
		Ok(())
	}

	/// Slot `nr` of the record's queue, the pending write first. Slot zero
	/// is the append counter.
	pub(crate) fn get_qslot(&self, ptr: &RecordPtr, nr: u32) -> Result<Cell> {
		let mut state = self.db.state();
		let id = {
			let imp = ptr.lock();
			if imp.locker == Some(self.id) {
				let inner = self.inner.borrow();
				if let Some(cow) = inner.cows.get(&imp.id) {
					if let Some(value) = cow.queue.get(&nr) {
						return Ok(value.clone());
					}
				}
			}
			imp.id
		};
		let table = state.que_table()?;
		let key = queue_key(id, nr);
		let mut cur = state.store.cursor(table)?;
		if cur.move_to(&key, false) {
			Cell::from_bytes(&cur.read_value()?)
		} else {
			Ok(Cell::Null)
		}
	}

	/// Append to the record's queue: bump the slot-0 counter and write the
	/// new slot, both as pending writes that commit together.
	pub(crate) fn create_qslot(&self, ptr: &RecordPtr, value: Cell) -> Result<u32> {
		let nr = self.get_qslot(ptr, 0)?.id32() + 1;
		self.set_qslot(ptr, 0, Cell::Id32(nr))?;
		self.set_qslot(ptr, nr, value)?;
		Ok(nr)
	}

	// --- sparse map cells

	pub(crate) fn set_cell(&self, ptr: &RecordPtr, keys: &[Cell], value: Cell) -> Result<()> {
		let id = self.cow_for_write(ptr)?;
		let mut inner = self.inner.borrow_mut();
		inner.cows.get_mut(&id).expect("cow installed above; qed")
			.map.insert(map_suffix(keys), value);
		Ok(())
	}

	pub(crate) fn get_cell(&self, ptr: &RecordPtr, keys: &[Cell]) -> Result<Cell> {
		let mut state = self.db.state();
		let suffix = map_suffix(keys);
		let id = {
			let imp = ptr.lock();
			if imp.locker == Some(self.id) {
				let inner = self.inner.borrow();
				if let Some(cow) = inner.cows.get(&imp.id) {
					if let Some(value) = cow.map.get(&suffix) {
						return Ok(value.clone());
					}
				}
			}
			imp.id
		};
		let table = state.map_table()?;
		let mut key = Cell::Oid(id).to_bytes();
		key.extend_from_slice(&suffix);
		let mut cur = state.store.cursor(table)?;
		if cur.move_to(&key, false) {
			Cell::from_bytes(&cur.read_value()?)
		} else {
			Ok(Cell::Null)
		}
	}

	// --- object surface

	/// Create an object, optionally typed.
	pub fn create_object(&self, typ: Atom) -> Result<Obj> {
		if typ >= MIN_RESERVED_FIELD {
			bail!(ErrorKind::ReservedName);
		}
		let ptr = self.create_record(RecordType::Object)?;
		let id = ptr.lock().id;
		if typ != 0 {
			self.set_field(&ptr, field::TYPE, Cell::Atom(typ))?;
		}
		let mut info = UpdateInfo::new(UpdateKind::ObjectCreated);
		info.id = id;
		info.name = typ;
		self.note(info);
		Ok(Obj::new(ptr, self))
	}

	/// Create an object carrying a uuid; fails `Duplicate` when the uuid
	/// is taken.
	pub fn create_object_with_uuid(&self, uuid: &Uuid, typ: Atom) -> Result<Obj> {
		let obj = self.create_object(typ)?;
		obj.set_uuid(uuid)?;
		Ok(obj)
	}

	pub fn get_or_create_object(&self, uuid: &Uuid, typ: Atom) -> Result<Obj> {
		match self.object_by_uuid(uuid)? {
			Some(obj) => Ok(obj),
			None => self.create_object_with_uuid(uuid, typ),
		}
	}

	pub fn get_object(&self, oid: Oid) -> Result<Option<Obj>> {
		Ok(self.get_record(oid, Some(RecordType::Object))?
			.map(|ptr| Obj::new(ptr, self)))
	}

	pub fn object_by_uuid(&self, uuid: &Uuid) -> Result<Option<Obj>> {
		let id = self.db.state().deref_uuid(uuid)?;
		self.get_object(id)
	}

	/// Accepts an oid or uuid cell.
	pub fn object_from_cell(&self, value: &Cell) -> Result<Option<Obj>> {
		match *value {
			Cell::Oid(id) => self.get_object(id),
			Cell::Uuid(ref u) => self.object_by_uuid(u),
			_ => Ok(None),
		}
	}

	pub fn get_relation(&self, rid: Oid) -> Result<Option<Rel>> {
		Ok(self.get_record(rid, Some(RecordType::Relation))?
			.map(|ptr| Rel::new(ptr, self)))
	}

	pub fn relation_by_uuid(&self, uuid: &Uuid) -> Result<Option<Rel>> {
		let id = self.db.state().deref_uuid(uuid)?;
		self.get_relation(id)
	}

	/// Accepts a rid or uuid cell.
	pub fn relation_from_cell(&self, value: &Cell) -> Result<Option<Rel>> {
		match *value {
			Cell::Rid(id) => self.get_relation(id),
			Cell::Uuid(ref u) => self.relation_by_uuid(u),
			_ => Ok(None),
		}
	}

	/// Re-enter an element list at a bookmarked element.
	pub fn get_element(&self, bookmark: Oid) -> Result<Option<Lit>> {
		Ok(self.get_record(bookmark, Some(RecordType::Element))?
			.map(|ptr| Lit::new(ptr, self)))
	}

	/// Type-agnostic record handle.
	pub fn get_orl(&self, id: Oid) -> Result<Option<Orl>> {
		Ok(self.get_record(id, None)?.map(|ptr| Orl::new(ptr, self)))
	}

	pub fn deref_uuid(&self, uuid: &Uuid) -> Result<Oid> {
		self.db.state().deref_uuid(uuid)
	}

	pub fn get_atom(&self, name: &[u8]) -> Result<Atom> {
		self.db.atom(name, true)
	}

	pub fn find_index(&self, name: &[u8]) -> Result<Option<Idx>> {
		let id = self.db.find_index(name)?;
		if id == 0 {
			Ok(None)
		} else {
			Ok(Some(Idx::new(self, id)))
		}
	}

	// --- streams (not part of the transactional state)

	pub fn create_stream(&self, meta: StreamMeta) -> Result<DbStream> {
		DbStream::create(&self.db, meta)
	}

	/// Open an existing stream; absent when the requested lock cannot be
	/// taken.
	pub fn get_stream(&self, sid: Sid, writing: bool) -> Result<Option<DbStream>> {
		DbStream::open(&self.db, sid, writing)
	}

	// --- commit / rollback

	/// Flush all pending work to the store and notify observers. A no-op
	/// without prior mutation.
	pub fn commit(&self) -> Result<()> {
		if !self.inner.borrow().active {
			return Ok(());
		}
		self.inner.borrow_mut().active = false;

		let mut state = self.db.state();
		state.store.trans_begin();
		let mut applied = self.validate_unique(&mut state);
		if applied.is_ok() {
			applied = self.apply(&mut state);
		}
		if applied.is_ok() {
			applied = state.store.trans_commit();
		}
		if let Err(e) = applied {
			state.store.trans_abort();
			self.restore(&mut state);
			self.inner.borrow_mut().notify.clear();
			self.clean_cache(&mut state);
			return Err(e);
		}
		let notifications = {
			let mut inner = self.inner.borrow_mut();
			::std::mem::replace(&mut inner.notify, Vec::new())
		};
		self.clean_cache(&mut state);
		drop(state);

		for info in &notifications {
			self.db.emit(info);
		}
		Ok(())
	}

	/// Discard all pending work and restore the record states. A no-op
	/// without prior mutation.
	pub fn rollback(&self) {
		if !self.inner.borrow().active {
			return;
		}
		self.inner.borrow_mut().active = false;
		let mut state = self.db.state();
		self.restore(&mut state);
		self.inner.borrow_mut().notify.clear();
		self.clean_cache(&mut state);
	}

	/// Strict unique-index enforcement: every would-be unique entry is
	/// checked against the store (and against the other records of this
	/// commit) before anything is written, so a failing commit leaves the
	/// persisted state untouched.
	fn validate_unique(&self, state: &mut DbState) -> Result<()> {
		let inner = self.inner.borrow();
		let mut claimed: BTreeMap<Vec<u8>, Oid> = BTreeMap::new();
		let mut claimed_uuids: BTreeMap<Uuid, Oid> = BTreeMap::new();
		for (id, cow) in &inner.cows {
			let merged;
			{
				let imp = cow.imp.lock();
				if imp.locker != Some(self.id) || imp.state == State::ToDelete {
					continue;
				}
				merged = merge_view(&imp.fields, &cow.fields);
			}
			if let Some(uuid) = cow.fields.get(&field::UUID).and_then(|v| v.uuid()) {
				if *claimed_uuids.entry(uuid).or_insert(*id) != *id {
					bail!(ErrorKind::Duplicate);
				}
				let other = state.deref_uuid(&uuid)?;
				if other != 0 && other != *id {
					bail!(ErrorKind::Duplicate);
				}
			}
			for (atom, value) in &cow.fields {
				if value.is_null() {
					continue;
				}
				for idx in state.find_index_for_atom(*atom)? {
					let meta = match state.index_meta(idx)? {
						Some(meta) => meta,
						None => continue,
					};
					if meta.kind != IndexKind::Unique {
						continue;
					}
					let key = match build_key(&meta, &merged, value) {
						Some(key) => key,
						None => continue,
					};
					if *claimed.entry(key.clone()).or_insert(*id) != *id {
						bail!(ErrorKind::Duplicate);
					}
					let idstr = Cell::Id64(*id).to_bytes();
					let mut cur = state.store.cursor(idx)?;
					if cur.move_to(&key, false) && cur.read_value()? != idstr {
						bail!(ErrorKind::Duplicate);
					}
				}
			}
		}
		Ok(())
	}

	fn apply(&self, state: &mut DbState) -> Result<()> {
		let mut inner = self.inner.borrow_mut();
		let mut created = false;
		for (_, cow) in inner.cows.iter_mut() {
			let mut imp = cow.imp.lock();
			if imp.locker != Some(self.id) {
				// only the locking cow may carry deltas
				debug_assert!(cow.is_clean());
				continue;
			}
			imp.locker = None;
			if imp.state == State::ToDelete {
				remove_fields_from_index(state, imp.id, &imp.fields, &imp.fields)?;
				state.erase_record(imp.id)?;
				erase_queue(state, imp.id)?;
				erase_map(state, imp.id)?;
				imp.state = State::Deleted;
			} else if imp.state == State::New {
				debug_assert!(imp.fields.is_empty());
				imp.fields = cow.fields.clone();
				add_fields_to_index(state, imp.id, &imp.fields, &imp.fields)?;
				state.save_record(&imp)?;
				save_queue(state, imp.id, &cow.queue)?;
				save_map(state, imp.id, &cow.map)?;
				imp.state = State::Idle;
				created = true;
			} else if !cow.fields.is_empty() {
				// removes use the pre-image, inserts the post-image
				for (atom, _) in &cow.fields {
					let old = match imp.fields.get(atom) {
						Some(old) if !old.is_null() => old.clone(),
						_ => continue,
					};
					remove_from_index(state, imp.id, &imp.fields, *atom, &old)?;
				}
				for (atom, value) in &cow.fields {
					imp.fields.insert(*atom, value.clone());
				}
				add_fields_to_index(state, imp.id, &imp.fields, &cow.fields)?;
				state.save_record(&imp)?;
				save_queue(state, imp.id, &cow.queue)?;
				save_map(state, imp.id, &cow.map)?;
			} else {
				save_queue(state, imp.id, &cow.queue)?;
				save_map(state, imp.id, &cow.map)?;
			}
			drop(imp);
			cow.clear();
		}
		if created {
			state.persist_max_oid()?;
		}
		Ok(())
	}

	/// In-memory restoration shared by rollback and failed commits.
	fn restore(&self, _state: &mut DbState) {
		let mut inner = self.inner.borrow_mut();
		for (_, cow) in inner.cows.iter_mut() {
			cow.clear();
			let mut imp = cow.imp.lock();
			if imp.locker == Some(self.id) {
				imp.locker = None;
				if imp.state == State::New {
					// the id is burnt; references see the tombstone
					imp.state = State::Deleted;
				} else if imp.state == State::ToDelete {
					imp.state = State::Idle;
				}
			}
		}
	}

	fn clean_cache(&self, state: &mut DbState) {
		self.inner.borrow_mut().cows.clear();
		state.shrink_cache();
	}
}

impl Drop for Transaction {
	fn drop(&mut self) {
		if self.inner.borrow().active {
			self.rollback();
		}
	}
}

// --- key helpers

fn queue_key(id: Oid, nr: u32) -> Vec<u8> {
	let mut key = Cell::Id64(id).to_bytes();
	if nr != 0 {
		key.extend_from_slice(&Cell::Id32(nr).to_bytes());
	}
	key
}

fn map_suffix(keys: &[Cell]) -> Vec<u8> {
	let mut out = Vec::new();
	for key in keys {
		key.write_to(&mut out);
	}
	out
}

fn merge_view(fields: &Fields, delta: &Fields) -> Fields {
	let mut merged = fields.clone();
	for (atom, value) in delta {
		merged.insert(*atom, value.clone());
	}
	merged
}

/// Composite entry key over the index items, or nothing when any
/// referenced field is null. The first item encodes `first`, the rest read
/// from the full field map.
fn build_key(meta: &index::IndexMeta, all: &Fields, first: &Cell) -> Option<Vec<u8>> {
	if first.is_null() {
		return None;
	}
	let mut key = Vec::new();
	index::add_element(&mut key, &meta.items[0], first);
	for item in &meta.items[1..] {
		match all.get(&item.atom) {
			Some(value) if !value.is_null() => index::add_element(&mut key, item, value),
			_ => return None,
		}
	}
	Some(key)
}

fn token_key(token: &str, idstr: &[u8]) -> Vec<u8> {
	let mut key = vec![cell::TAG_STRING];
	key.extend_from_slice(token.as_bytes());
	key.extend_from_slice(idstr);
	key
}

fn remove_from_index(state: &mut DbState, id: Oid, all: &Fields, atom: Atom, old: &Cell) -> Result<()> {
	if atom == field::UUID {
		if let Some(uuid) = old.uuid() {
			state.set_uuid(0, &uuid)?;
		}
	}
	let idstr = Cell::Id64(id).to_bytes();
	for idx in state.find_index_for_atom(atom)? {
		let meta = match state.index_meta(idx)? {
			Some(meta) => meta,
			None => continue,
		};
		if meta.kind == IndexKind::Fulltext {
			for token in index::tokenize(old) {
				let key = token_key(&token, &idstr);
				let mut cur = state.store.cursor(idx)?;
				if cur.move_to(&key, false) {
					cur.remove()?;
				}
			}
		} else {
			let mut key = match build_key(&meta, all, old) {
				Some(key) => key,
				None => continue,
			};
			if meta.kind == IndexKind::Value {
				key.extend_from_slice(&idstr);
			}
			let mut cur = state.store.cursor(idx)?;
			if cur.move_to(&key, false) {
				// a unique entry may belong to another record by now
				if meta.kind != IndexKind::Unique || cur.read_value()? == idstr {
					cur.remove()?;
				}
			}
		}
	}
	Ok(())
}

fn add_to_index(state: &mut DbState, id: Oid, all: &Fields, atom: Atom, value: &Cell) -> Result<()> {
	if atom == field::UUID {
		if let Some(uuid) = value.uuid() {
			state.set_uuid(id, &uuid)?;
		}
	}
	let idstr = Cell::Id64(id).to_bytes();
	for idx in state.find_index_for_atom(atom)? {
		let meta = match state.index_meta(idx)? {
			Some(meta) => meta,
			None => continue,
		};
		if meta.kind == IndexKind::Fulltext {
			for token in index::tokenize(value) {
				let key = token_key(&token, &idstr);
				state.store.cursor(idx)?.insert(&key, &idstr)?;
			}
		} else {
			let mut key = match build_key(&meta, all, value) {
				Some(key) => key,
				None => continue,
			};
			if meta.kind == IndexKind::Value {
				key.extend_from_slice(&idstr);
			}
			state.store.cursor(idx)?.insert(&key, &idstr)?;
		}
	}
	Ok(())
}

fn remove_fields_from_index(state: &mut DbState, id: Oid, all: &Fields, focus: &Fields) -> Result<()> {
	for (atom, value) in focus {
		remove_from_index(state, id, all, *atom, value)?;
	}
	Ok(())
}

fn add_fields_to_index(state: &mut DbState, id: Oid, all: &Fields, focus: &Fields) -> Result<()> {
	for (atom, value) in focus {
		add_to_index(state, id, all, *atom, value)?;
	}
	Ok(())
}

fn save_queue(state: &mut DbState, id: Oid, queue: &BTreeMap<u32, Cell>) -> Result<()> {
	if queue.is_empty() {
		return Ok(());
	}
	let table = state.que_table()?;
	let mut cur = state.store.cursor(table)?;
	for (nr, value) in queue {
		let key = queue_key(id, *nr);
		if value.is_null() {
			if cur.move_to(&key, false) {
				cur.remove()?;
			}
		} else {
			cur.insert(&key, &value.to_bytes())?;
		}
	}
	Ok(())
}

fn save_map(state: &mut DbState, id: Oid, map: &BTreeMap<Vec<u8>, Cell>) -> Result<()> {
	if map.is_empty() {
		return Ok(());
	}
	let table = state.map_table()?;
	let oid = Cell::Oid(id).to_bytes();
	let mut cur = state.store.cursor(table)?;
	for (suffix, value) in map {
		let mut key = oid.clone();
		key.extend_from_slice(suffix);
		if value.is_null() {
			if cur.move_to(&key, false) {
				cur.remove()?;
			}
		} else {
			cur.insert(&key, &value.to_bytes())?;
		}
	}
	Ok(())
}

/// Drop every queue row of a deleted record, the counter included.
fn erase_queue(state: &mut DbState, id: Oid) -> Result<()> {
	let table = state.que_table()?;
	let prefix = Cell::Id64(id).to_bytes();
	erase_prefixed(state, table, &prefix)
}

/// Drop every map row of a deleted record.
fn erase_map(state: &mut DbState, id: Oid) -> Result<()> {
	let table = state.map_table()?;
	let prefix = Cell::Oid(id).to_bytes();
	erase_prefixed(state, table, &prefix)
}

fn erase_prefixed(state: &mut DbState, table: u32, prefix: &[u8]) -> Result<()> {
	let mut cur = state.store.cursor(table)?;
	if cur.move_to(prefix, true) {
		loop {
			cur.remove()?;
			if !cur.move_next_prefixed(prefix) {
				break;
			}
		}
	}
	Ok(())
}
