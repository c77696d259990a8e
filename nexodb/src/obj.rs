//! Object handle: attributes, the element list, the aggregation forest,
//! the relation list, the per-object queue and the sparse map.

use std::fmt;
use std::ops::Deref;

use cell::{Atom, Cell, Oid};
use error::{ErrorKind, Result};
use lit::Lit;
use mit::Mit;
use orl::Orl;
use qit::Qit;
use record::{field, RecordPtr, RecordType};
use rel::Rel;
use transaction::Transaction;
use update::{Place, UpdateInfo, UpdateKind};

pub struct Obj<'a> {
	orl: Orl<'a>,
}

impl<'a> Deref for Obj<'a> {
	type Target = Orl<'a>;

	fn deref(&self) -> &Orl<'a> {
		&self.orl
	}
}

impl<'a> Clone for Obj<'a> {
	fn clone(&self) -> Obj<'a> {
		Obj { orl: self.orl.clone() }
	}
}

impl<'a> fmt::Debug for Obj<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Obj").field("id", &self.orl.id()).finish()
	}
}

impl<'a> Obj<'a> {
	pub(crate) fn new(rec: RecordPtr, txn: &'a Transaction) -> Obj<'a> {
		Obj { orl: Orl::new(rec, txn) }
	}

	pub fn oid(&self) -> Oid {
		self.id()
	}

	pub fn to_orl(&self) -> Orl<'a> {
		self.orl.clone()
	}

	fn load_object(&self, id: Oid) -> Result<Option<Obj<'a>>> {
		Ok(self.txn().get_record(id, Some(RecordType::Object))?
			.map(|rec| Obj::new(rec, self.txn())))
	}

	fn link(&self, atom: Atom) -> Result<Oid> {
		self.txn().get_id_field(self.rec(), atom)
	}

	/// Delete this object together with its elements, incident relations
	/// and aggregated children.
	pub fn erase(&self) -> Result<()> {
		while let Some(lit) = self.first_elem()? {
			lit.erase()?;
		}
		while let Some(rel) = self.first_rel()? {
			rel.erase()?;
		}
		while let Some(child) = self.first_obj()? {
			child.erase()?;
		}
		self.deaggregate_imp()?;
		let typ = self.typ()?;
		self.txn().erase(self.rec())?;

		let mut info = UpdateInfo::new(UpdateKind::ObjectErased);
		info.id = self.id();
		info.name = typ;
		self.txn().note(info);
		Ok(())
	}

	/// Attribute holding an object reference (oid or uuid cell).
	pub fn get_object(&self, name: Atom) -> Result<Option<Obj<'a>>> {
		self.txn().object_from_cell(&self.value(name)?)
	}

	/// Attribute holding a relation reference (rid or uuid cell).
	pub fn get_relation(&self, name: Atom) -> Result<Option<Rel<'a>>> {
		self.txn().relation_from_cell(&self.value(name)?)
	}

	// --- element list

	fn add_first_elem(&self, value: Cell) -> Result<Lit<'a>> {
		let txn = self.txn();
		let elem = txn.create_record(RecordType::Element)?;
		let eid = elem.lock().id;
		txn.set_field(&elem, field::VALUE, value)?;
		txn.set_field(&elem, field::LIST, Cell::Oid(self.id()))?;
		txn.set_field(self.rec(), field::FIRST_ELM, Cell::Id64(eid))?;
		txn.set_field(self.rec(), field::LAST_ELM, Cell::Id64(eid))?;

		let mut info = UpdateInfo::new(UpdateKind::ElementAdded);
		info.id = eid;
		info.id2 = self.id();
		info.place = Place::First;
		txn.note(info);
		Ok(Lit::new(elem, txn))
	}

	pub fn append_elem(&self, value: Cell) -> Result<Lit<'a>> {
		match self.last_elem()? {
			Some(mut last) => {
				last.insert_after(value)?;
				last.next()?;
				Ok(last)
			},
			None => self.add_first_elem(value),
		}
	}

	pub fn prepend_elem(&self, value: Cell) -> Result<Lit<'a>> {
		match self.first_elem()? {
			Some(mut first) => {
				first.insert_before(value)?;
				first.prev()?;
				Ok(first)
			},
			None => self.add_first_elem(value),
		}
	}

	pub fn first_elem(&self) -> Result<Option<Lit<'a>>> {
		let id = self.link(field::FIRST_ELM)?;
		self.txn().get_element(id)
	}

	pub fn last_elem(&self) -> Result<Option<Lit<'a>>> {
		let id = self.link(field::LAST_ELM)?;
		self.txn().get_element(id)
	}

	// --- relations

	/// Create a relation from this object to `target`. With `prepend` the
	/// relation enters both endpoint lists at the front, otherwise at the
	/// back.
	pub fn relate_to(&self, target: &Obj, typ: Atom, prepend: bool) -> Result<Rel<'a>> {
		Rel::create(self.txn(), self, target, typ, prepend)
	}

	pub fn first_rel(&self) -> Result<Option<Rel<'a>>> {
		let id = self.link(field::FIRST_REL)?;
		self.txn().get_relation(id)
	}

	pub fn last_rel(&self) -> Result<Option<Rel<'a>>> {
		let id = self.link(field::LAST_REL)?;
		self.txn().get_relation(id)
	}

	// --- aggregation forest

	pub fn owner(&self) -> Result<Option<Obj<'a>>> {
		let id = self.link(field::OWNER)?;
		self.load_object(id)
	}

	pub fn first_obj(&self) -> Result<Option<Obj<'a>>> {
		let id = self.link(field::FIRST_OBJ)?;
		self.load_object(id)
	}

	pub fn last_obj(&self) -> Result<Option<Obj<'a>>> {
		let id = self.link(field::LAST_OBJ)?;
		self.load_object(id)
	}

	/// Step to the next sibling; stays put at the end of the chain.
	pub fn next(&mut self) -> Result<bool> {
		let id = self.link(field::NEXT_OBJ)?;
		match self.txn().get_record(id, Some(RecordType::Object))? {
			Some(rec) => {
				self.orl.replace_rec(rec);
				Ok(true)
			},
			None => Ok(false),
		}
	}

	/// Step to the previous sibling; stays put at the front of the chain.
	pub fn prev(&mut self) -> Result<bool> {
		let id = self.link(field::PREV_OBJ)?;
		match self.txn().get_record(id, Some(RecordType::Object))? {
			Some(rec) => {
				self.orl.replace_rec(rec);
				Ok(true)
			},
			None => Ok(false),
		}
	}

	/// Append this object to `owner`'s child list.
	pub fn aggregate_to(&self, owner: &Obj) -> Result<()> {
		self.aggregate_imp(owner)?;
		let mut info = UpdateInfo::new(UpdateKind::Aggregated);
		info.id = self.id();
		info.id2 = owner.id();
		info.place = Place::Last;
		self.txn().note(info);
		Ok(())
	}

	/// Unlink this object from its owner, making it a root again. A no-op
	/// for roots.
	pub fn deaggregate(&self) -> Result<()> {
		let owner = self.link(field::OWNER)?;
		if owner == 0 {
			return Ok(());
		}
		self.deaggregate_imp()?;
		let mut info = UpdateInfo::new(UpdateKind::Deaggregated);
		info.id = self.id();
		info.id2 = owner;
		self.txn().note(info);
		Ok(())
	}

	/// Create a child object aggregated under this one.
	pub fn create_aggregate(&self, typ: Atom) -> Result<Obj<'a>> {
		let sub = self.txn().create_object(typ)?;
		sub.aggregate_to(self)?;
		Ok(sub)
	}

	fn deaggregate_imp(&self) -> Result<()> {
		let txn = self.txn();
		let owner = match self.owner()? {
			Some(owner) => owner,
			None => return Ok(()),
		};
		let prev = self.link(field::PREV_OBJ)?;
		let next = self.link(field::NEXT_OBJ)?;
		let prev_rec = txn.get_record(prev, Some(RecordType::Object))?;
		let next_rec = txn.get_record(next, Some(RecordType::Object))?;
		match (prev_rec, next_rec) {
			(None, None) => {
				txn.set_field(owner.rec(), field::FIRST_OBJ, Cell::Null)?;
				txn.set_field(owner.rec(), field::LAST_OBJ, Cell::Null)?;
			},
			(None, Some(next_rec)) => {
				txn.set_field(owner.rec(), field::FIRST_OBJ, Cell::Oid(next))?;
				txn.set_field(&next_rec, field::PREV_OBJ, Cell::Null)?;
			},
			(Some(prev_rec), None) => {
				txn.set_field(owner.rec(), field::LAST_OBJ, Cell::Oid(prev))?;
				txn.set_field(&prev_rec, field::NEXT_OBJ, Cell::Null)?;
			},
			(Some(prev_rec), Some(next_rec)) => {
				txn.set_field(&prev_rec, field::NEXT_OBJ, Cell::Oid(next))?;
				txn.set_field(&next_rec, field::PREV_OBJ, Cell::Oid(prev))?;
			},
		}
		txn.set_field(self.rec(), field::PREV_OBJ, Cell::Null)?;
		txn.set_field(self.rec(), field::NEXT_OBJ, Cell::Null)?;
		txn.set_field(self.rec(), field::OWNER, Cell::Null)?;
		Ok(())
	}

	fn aggregate_imp(&self, owner: &Obj) -> Result<()> {
		let txn = self.txn();
		self.deaggregate_imp()?;
		txn.set_field(self.rec(), field::OWNER, Cell::Oid(owner.id()))?;
		match owner.last_obj()? {
			None => {
				txn.set_field(owner.rec(), field::FIRST_OBJ, Cell::Oid(self.id()))?;
				txn.set_field(owner.rec(), field::LAST_OBJ, Cell::Oid(self.id()))?;
			},
			Some(last) => {
				txn.set_field(last.rec(), field::NEXT_OBJ, Cell::Oid(self.id()))?;
				txn.set_field(self.rec(), field::PREV_OBJ, Cell::Oid(last.id()))?;
				txn.set_field(owner.rec(), field::LAST_OBJ, Cell::Oid(self.id()))?;
			},
		}
		Ok(())
	}

	/// Move this object before `target` within its owner's child list, or
	/// to the end of the list when no target is given. Trivial moves do
	/// nothing; a target owned elsewhere fails `WrongContext`.
	pub fn move_before(&self, target: Option<&Obj>) -> Result<()> {
		let txn = self.txn();
		if let Some(target) = target {
			if target.id() == self.id() {
				return Ok(());
			}
		}
		match target {
			None => {
				if self.link(field::NEXT_OBJ)? == 0 {
					return Ok(());
				}
				let owner = match self.owner()? {
					Some(owner) => owner,
					None => return Ok(()),
				};
				self.deaggregate_imp()?;
				self.aggregate_imp(&owner)?;

				let mut info = UpdateInfo::new(UpdateKind::AggregateMoved);
				info.id = self.id();
				info.place = Place::Last;
				txn.note(info);
			},
			Some(next) => {
				let owner = match next.owner()? {
					Some(owner) => owner,
					None => bail!(ErrorKind::WrongContext),
				};
				let prev = next.link(field::PREV_OBJ)?;
				if prev == self.id() {
					return Ok(());
				}
				let prev_rec = txn.get_record(prev, Some(RecordType::Object))?;

				self.deaggregate_imp()?;
				txn.set_field(self.rec(), field::OWNER, Cell::Oid(owner.id()))?;

				match prev_rec {
					None => {
						txn.set_field(next.rec(), field::PREV_OBJ, Cell::Oid(self.id()))?;
						txn.set_field(self.rec(), field::NEXT_OBJ, Cell::Oid(next.id()))?;
						txn.set_field(self.rec(), field::PREV_OBJ, Cell::Null)?;
						txn.set_field(owner.rec(), field::FIRST_OBJ, Cell::Oid(self.id()))?;

						let mut info = UpdateInfo::new(UpdateKind::AggregateMoved);
						info.id = self.id();
						info.place = Place::First;
						txn.note(info);
					},
					Some(prev_rec) => {
						txn.set_field(next.rec(), field::PREV_OBJ, Cell::Oid(self.id()))?;
						txn.set_field(&prev_rec, field::NEXT_OBJ, Cell::Oid(self.id()))?;
						txn.set_field(self.rec(), field::PREV_OBJ, Cell::Oid(prev))?;
						txn.set_field(self.rec(), field::NEXT_OBJ, Cell::Oid(next.id()))?;

						let mut info = UpdateInfo::new(UpdateKind::AggregateMoved);
						info.id = self.id();
						info.id2 = next.id();
						info.place = Place::Before;
						txn.note(info);
					},
				}
			},
		}
		Ok(())
	}

	// --- queue

	/// Append a value to the object's queue.
	pub fn append_slot(&self, value: Cell) -> Result<Qit<'a>> {
		let txn = self.txn();
		let nr = txn.create_qslot(self.rec(), value)?;
		let mut info = UpdateInfo::new(UpdateKind::QueueAdded);
		info.id = nr as u64;
		info.id2 = self.id();
		txn.note(info);
		Ok(Qit::new(self.rec().clone(), txn, nr))
	}

	pub fn first_slot(&self) -> Result<Option<Qit<'a>>> {
		let mut qit = Qit::new(self.rec().clone(), self.txn(), 0);
		if qit.first()? {
			Ok(Some(qit))
		} else {
			Ok(None)
		}
	}

	pub fn last_slot(&self) -> Result<Option<Qit<'a>>> {
		let mut qit = Qit::new(self.rec().clone(), self.txn(), 0);
		if qit.last()? {
			Ok(Some(qit))
		} else {
			Ok(None)
		}
	}

	/// Slot `nr` when it is within the allocated range.
	pub fn get_slot(&self, nr: u32) -> Result<Option<Qit<'a>>> {
		if nr == 0 {
			return Ok(None);
		}
		let max = self.txn().get_qslot(self.rec(), 0)?.id32();
		if nr > max {
			Ok(None)
		} else {
			Ok(Some(Qit::new(self.rec().clone(), self.txn(), nr)))
		}
	}

	// --- sparse map

	pub fn set_cell(&self, keys: &[Cell], value: Cell) -> Result<()> {
		self.txn().set_cell(self.rec(), keys, value)
	}

	pub fn get_cell(&self, keys: &[Cell]) -> Result<Cell> {
		self.txn().get_cell(self.rec(), keys)
	}

	/// Iterator over the map entries below the given key prefix.
	pub fn find_cells(&self, keys: &[Cell]) -> Result<Mit<'a>> {
		let mut mit = Mit::new(self.rec().clone(), self.txn());
		mit.seek(keys)?;
		Ok(mit)
	}
}
