//! Relation handle and the per-endpoint relation chains.
//!
//! A relation participates in its source object's relation list and, when
//! the endpoints differ, in the target's list as well. Both lists share
//! the objects' FirstRel/LastRel endpoints, but each relation record
//! carries two pointer pairs; which pair threads a given list is decided
//! by comparing the list-owning object against the relation's source. A
//! reflexive relation appears once, through the source pair, with the
//! target pair null.

use std::ops::Deref;

use cell::{Atom, Cell, Oid};
use error::{ErrorKind, Result};
use obj::Obj;
use orl::Orl;
use record::{field, RecordPtr, RecordType, MIN_RESERVED_FIELD};
use transaction::Transaction;
use update::{Place, Side, UpdateInfo, UpdateKind};

pub struct Rel<'a> {
	orl: Orl<'a>,
}

impl<'a> Deref for Rel<'a> {
	type Target = Orl<'a>;

	fn deref(&self) -> &Orl<'a> {
		&self.orl
	}
}

impl<'a> Clone for Rel<'a> {
	fn clone(&self) -> Rel<'a> {
		Rel { orl: self.orl.clone() }
	}
}

impl<'a> Rel<'a> {
	pub(crate) fn new(rec: RecordPtr, txn: &'a Transaction) -> Rel<'a> {
		Rel { orl: Orl::new(rec, txn) }
	}

	pub fn rid(&self) -> Oid {
		self.id()
	}

	pub fn to_orl(&self) -> Orl<'a> {
		self.orl.clone()
	}

	pub fn source(&self) -> Result<Oid> {
		self.txn().get_id_field(self.rec(), field::SOURCE)
	}

	pub fn target(&self) -> Result<Oid> {
		self.txn().get_id_field(self.rec(), field::TARGET)
	}

	pub fn is_source(&self, obj: &Obj) -> Result<bool> {
		Ok(self.source()? == obj.oid())
	}

	pub fn is_target(&self, obj: &Obj) -> Result<bool> {
		Ok(self.target()? == obj.oid())
	}

	/// Create a relation between two objects and thread it into their
	/// relation lists.
	pub(crate) fn create(
		txn: &'a Transaction,
		source: &Obj,
		target: &Obj,
		typ: Atom,
		prepend: bool,
	) -> Result<Rel<'a>> {
		if typ >= MIN_RESERVED_FIELD {
			bail!(ErrorKind::ReservedName);
		}
		let rec = txn.create_record(RecordType::Relation)?;
		if typ != 0 {
			txn.set_field(&rec, field::TYPE, Cell::Atom(typ))?;
		}
		txn.set_field(&rec, field::SOURCE, Cell::Oid(source.oid()))?;
		txn.set_field(&rec, field::TARGET, Cell::Oid(target.oid()))?;

		let rel = Rel::new(rec, txn);
		if prepend {
			rel.prepend_to(source.rec(), field::SOURCE)?;
		} else {
			rel.append_to(source.rec(), field::SOURCE)?;
		}
		let mut info = UpdateInfo::new(UpdateKind::RelationAdded);
		info.id = rel.rid();
		info.id2 = source.oid();
		info.name = typ;
		info.place = if prepend { Place::First } else { Place::Last };
		info.side = Side::Source;
		txn.note(info);

		// a reflexive relation is threaded only once, through the source
		// pointers; its target pointers stay null
		if source.oid() != target.oid() {
			if prepend {
				rel.prepend_to(target.rec(), field::TARGET)?;
			} else {
				rel.append_to(target.rec(), field::TARGET)?;
			}
			let mut info = UpdateInfo::new(UpdateKind::RelationAdded);
			info.id = rel.rid();
			info.id2 = target.oid();
			info.name = typ;
			info.place = if prepend { Place::First } else { Place::Last };
			info.side = Side::Target;
			txn.note(info);
		}
		Ok(rel)
	}

	/// Next/prev pointer pair of `rel` as seen from endpoint `obj_id`.
	fn pointers_for(&self, rel: &RecordPtr, obj_id: Oid) -> Result<(Atom, Atom)> {
		let source = self.txn().get_id_field(rel, field::SOURCE)?;
		if obj_id == source {
			Ok((field::PREV_SOURCE, field::NEXT_SOURCE))
		} else {
			Ok((field::PREV_TARGET, field::NEXT_TARGET))
		}
	}

	fn append_to(&self, obj: &RecordPtr, side: Atom) -> Result<()> {
		let txn = self.txn();
		let obj_id = obj.lock().id;
		let last_id = txn.get_id_field(obj, field::LAST_REL)?;
		match txn.get_record(last_id, Some(RecordType::Relation))? {
			None => {
				txn.set_field(obj, field::FIRST_REL, Cell::Rid(self.rid()))?;
				txn.set_field(obj, field::LAST_REL, Cell::Rid(self.rid()))?;
			},
			Some(last) => {
				let (_, last_next) = self.pointers_for(&last, obj_id)?;
				let own_prev = if side == field::SOURCE {
					field::PREV_SOURCE
				} else {
					field::PREV_TARGET
				};
				txn.set_field(&last, last_next, Cell::Rid(self.rid()))?;
				txn.set_field(self.rec(), own_prev, Cell::Rid(last_id))?;
				txn.set_field(obj, field::LAST_REL, Cell::Rid(self.rid()))?;
			},
		}
		Ok(())
	}

	fn prepend_to(&self, obj: &RecordPtr, side: Atom) -> Result<()> {
		let txn = self.txn();
		let obj_id = obj.lock().id;
		let first_id = txn.get_id_field(obj, field::FIRST_REL)?;
		match txn.get_record(first_id, Some(RecordType::Relation))? {
			None => {
				txn.set_field(obj, field::FIRST_REL, Cell::Rid(self.rid()))?;
				txn.set_field(obj, field::LAST_REL, Cell::Rid(self.rid()))?;
			},
			Some(first) => {
				let (first_prev, _) = self.pointers_for(&first, obj_id)?;
				let own_next = if side == field::SOURCE {
					field::NEXT_SOURCE
				} else {
					field::NEXT_TARGET
				};
				txn.set_field(&first, first_prev, Cell::Rid(self.rid()))?;
				txn.set_field(self.rec(), own_next, Cell::Rid(first_id))?;
				txn.set_field(obj, field::FIRST_REL, Cell::Rid(self.rid()))?;
			},
		}
		Ok(())
	}

	/// Unlink this relation from `obj`'s relation list, repairing the
	/// side-discriminated pointers of the neighbors.
	fn remove_from(&self, obj: &RecordPtr) -> Result<()> {
		let txn = self.txn();
		let obj_id = obj.lock().id;
		let (own_prev, own_next) = self.pointers_for(self.rec(), obj_id)?;

		let prev_id = txn.get_id_field(self.rec(), own_prev)?;
		let next_id = txn.get_id_field(self.rec(), own_next)?;
		let prev = txn.get_record(prev_id, Some(RecordType::Relation))?;
		let next = txn.get_record(next_id, Some(RecordType::Relation))?;
		txn.set_field(self.rec(), own_prev, Cell::Null)?;
		txn.set_field(self.rec(), own_next, Cell::Null)?;
		match (prev, next) {
			(None, None) => {
				txn.set_field(obj, field::FIRST_REL, Cell::Null)?;
				txn.set_field(obj, field::LAST_REL, Cell::Null)?;
			},
			(None, Some(next)) => {
				txn.set_field(obj, field::FIRST_REL, Cell::Rid(next_id))?;
				let (next_prev, _) = self.pointers_for(&next, obj_id)?;
				txn.set_field(&next, next_prev, Cell::Null)?;
			},
			(Some(prev), None) => {
				txn.set_field(obj, field::LAST_REL, Cell::Rid(prev_id))?;
				let (_, prev_next) = self.pointers_for(&prev, obj_id)?;
				txn.set_field(&prev, prev_next, Cell::Null)?;
			},
			(Some(prev), Some(next)) => {
				let (_, prev_next) = self.pointers_for(&prev, obj_id)?;
				let (next_prev, _) = self.pointers_for(&next, obj_id)?;
				txn.set_field(&prev, prev_next, Cell::Rid(next_id))?;
				txn.set_field(&next, next_prev, Cell::Rid(prev_id))?;
			},
		}
		Ok(())
	}

	/// Delete this relation, unthreading it from both endpoints. The
	/// handle stays on the erased record.
	pub fn erase(&self) -> Result<()> {
		let txn = self.txn();
		let source = txn.get_record(self.source()?, Some(RecordType::Object))?;
		let target = txn.get_record(self.target()?, Some(RecordType::Object))?;
		let reflexive = self.source()? == self.target()?;
		if let Some(ref source) = source {
			self.remove_from(source)?;
		}
		if !reflexive {
			if let Some(ref target) = target {
				self.remove_from(target)?;
			}
		}
		txn.erase(self.rec())?;

		let mut info = UpdateInfo::new(UpdateKind::RelationErased);
		info.id = self.rid();
		txn.note(info);
		Ok(())
	}

	/// Step along `endpoint`'s relation list; stays put at the end.
	pub fn next(&mut self, endpoint: Oid) -> Result<bool> {
		let (_, own_next) = self.pointers_for(self.rec(), endpoint)?;
		let id = self.txn().get_id_field(self.rec(), own_next)?;
		match self.txn().get_record(id, Some(RecordType::Relation))? {
			Some(rec) => {
				self.orl.replace_rec(rec);
				Ok(true)
			},
			None => Ok(false),
		}
	}

	/// Step backwards along `endpoint`'s relation list; stays put at the
	/// front.
	pub fn prev(&mut self, endpoint: Oid) -> Result<bool> {
		let (own_prev, _) = self.pointers_for(self.rec(), endpoint)?;
		let id = self.txn().get_id_field(self.rec(), own_prev)?;
		match self.txn().get_record(id, Some(RecordType::Relation))? {
			Some(rec) => {
				self.orl.replace_rec(rec);
				Ok(true)
			},
			None => Ok(false),
		}
	}

	/// Move this relation before `target` within `obj`'s relation list,
	/// or to the end of the list when no target is given. The target must
	/// be anchored at the same endpoint, else `WrongContext`.
	pub fn move_before(&self, obj: &Obj, target: Option<&Rel>) -> Result<()> {
		let txn = self.txn();
		if let Some(target) = target {
			if target.rid() == self.rid() {
				return Ok(());
			}
		}
		let obj_id = obj.oid();
		let source = self.source()?;
		if obj_id != source && obj_id != self.target()? {
			bail!(ErrorKind::WrongContext);
		}
		let is_source = obj_id == source;
		let side = if is_source { Side::Source } else { Side::Target };
		let (own_prev, own_next) = self.pointers_for(self.rec(), obj_id)?;

		match target {
			None => {
				if txn.get_id_field(self.rec(), own_next)? == 0 {
					return Ok(());
				}
				self.remove_from(obj.rec())?;

				let old_last_id = txn.get_id_field(obj.rec(), field::LAST_REL)?;
				let old_last = txn.get_record(old_last_id, Some(RecordType::Relation))?
					.ok_or(ErrorKind::RecordFormat("relation list lost its tail"))?;
				let (_, last_next) = self.pointers_for(&old_last, obj_id)?;
				txn.set_field(&old_last, last_next, Cell::Rid(self.rid()))?;
				txn.set_field(self.rec(), own_prev, Cell::Rid(old_last_id))?;
				txn.set_field(self.rec(), own_next, Cell::Null)?;
				txn.set_field(obj.rec(), field::LAST_REL, Cell::Rid(self.rid()))?;

				let mut info = UpdateInfo::new(UpdateKind::RelationMoved);
				info.id = self.rid();
				info.place = Place::Last;
				info.side = side;
				txn.note(info);
			},
			Some(next) => {
				let next_source = next.source()?;
				if obj_id != next_source && obj_id != next.target()? {
					bail!(ErrorKind::WrongContext);
				}
				let (next_prev_field, _) = self.pointers_for(next.rec(), obj_id)?;
				let prev_id = txn.get_id_field(next.rec(), next_prev_field)?;
				if prev_id == self.rid() {
					return Ok(());
				}
				let prev = txn.get_record(prev_id, Some(RecordType::Relation))?;

				self.remove_from(obj.rec())?;

				match prev {
					None => {
						txn.set_field(next.rec(), next_prev_field, Cell::Rid(self.rid()))?;
						txn.set_field(self.rec(), own_next, Cell::Rid(next.rid()))?;
						txn.set_field(self.rec(), own_prev, Cell::Null)?;
						txn.set_field(obj.rec(), field::FIRST_REL, Cell::Rid(self.rid()))?;

						let mut info = UpdateInfo::new(UpdateKind::RelationMoved);
						info.id = self.rid();
						info.place = Place::First;
						info.side = side;
						txn.note(info);
					},
					Some(prev) => {
						let (_, prev_next_field) = self.pointers_for(&prev, obj_id)?;
						txn.set_field(next.rec(), next_prev_field, Cell::Rid(self.rid()))?;
						txn.set_field(&prev, prev_next_field, Cell::Rid(self.rid()))?;
						txn.set_field(self.rec(), own_prev, Cell::Rid(prev_id))?;
						txn.set_field(self.rec(), own_next, Cell::Rid(next.rid()))?;

						let mut info = UpdateInfo::new(UpdateKind::RelationMoved);
						info.id = self.rid();
						info.id2 = next.rid();
						info.place = Place::Before;
						info.side = side;
						txn.note(info);
					},
				}
			},
		}
		Ok(())
	}
}
