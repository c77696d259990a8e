//! Element list iterator.
//!
//! Elements are records of their own, threaded into a doubly-linked list
//! per owning object; the element's `LIST` field points back at the owner.
//! A `Lit` is both a position in that list and a handle on the element
//! under it.

use cell::{Cell, Oid};
use error::{ErrorKind, Result};
use record::{field, RecordPtr, RecordType};
use transaction::Transaction;
use update::{Place, UpdateInfo, UpdateKind};

pub struct Lit<'a> {
	elem: RecordPtr,
	txn: &'a Transaction,
}

impl<'a> Clone for Lit<'a> {
	fn clone(&self) -> Lit<'a> {
		Lit {
			elem: self.elem.clone(),
			txn: self.txn,
		}
	}
}

impl<'a> Lit<'a> {
	pub(crate) fn new(elem: RecordPtr, txn: &'a Transaction) -> Lit<'a> {
		Lit { elem, txn }
	}

	/// Element id; usable with `Transaction::get_element` to come back
	/// here later.
	pub fn bookmark(&self) -> Oid {
		self.elem.lock().id
	}

	pub fn equals(&self, other: &Lit) -> bool {
		self.bookmark() == other.bookmark()
	}

	pub fn set_value(&self, value: Cell) -> Result<()> {
		self.txn.set_field(&self.elem, field::VALUE, value)?;
		let mut info = UpdateInfo::new(UpdateKind::ElementChanged);
		info.id = self.bookmark();
		self.txn.note(info);
		Ok(())
	}

	pub fn value(&self) -> Result<Cell> {
		self.txn.get_field(&self.elem, field::VALUE)
	}

	/// Step to the next element; stays put at the end of the list.
	pub fn next(&mut self) -> Result<bool> {
		let id = self.txn.get_id_field(&self.elem, field::NEXT_ELEM)?;
		match self.txn.get_record(id, Some(RecordType::Element))? {
			Some(rec) => {
				self.elem = rec;
				Ok(true)
			},
			None => Ok(false),
		}
	}

	/// Step to the previous element; stays put at the front of the list.
	pub fn prev(&mut self) -> Result<bool> {
		let id = self.txn.get_id_field(&self.elem, field::PREV_ELEM)?;
		match self.txn.get_record(id, Some(RecordType::Element))? {
			Some(rec) => {
				self.elem = rec;
				Ok(true)
			},
			None => Ok(false),
		}
	}

	/// The object owning this element's list.
	fn list_of(&self, elem: &RecordPtr) -> Result<RecordPtr> {
		let id = self.txn.get_id_field(elem, field::LIST)?;
		self.txn.get_record(id, Some(RecordType::Object))?
			.ok_or(ErrorKind::RecordFormat("element without owning list").into())
	}

	/// Unlink the current element, repairing neighbors and endpoints.
	/// Returns the record to continue on, if the list is not empty now.
	fn remove_current(&self) -> Result<Option<RecordPtr>> {
		let txn = self.txn;
		let prev_id = txn.get_id_field(&self.elem, field::PREV_ELEM)?;
		let next_id = txn.get_id_field(&self.elem, field::NEXT_ELEM)?;
		let prev = txn.get_record(prev_id, Some(RecordType::Element))?;
		let next = txn.get_record(next_id, Some(RecordType::Element))?;
		match (prev, next) {
			(None, None) => {
				let list = self.list_of(&self.elem)?;
				txn.set_field(&list, field::FIRST_ELM, Cell::Null)?;
				txn.set_field(&list, field::LAST_ELM, Cell::Null)?;
				Ok(None)
			},
			(None, Some(next)) => {
				let list = self.list_of(&self.elem)?;
				txn.set_field(&list, field::FIRST_ELM, Cell::Id64(next_id))?;
				txn.set_field(&next, field::PREV_ELEM, Cell::Null)?;
				Ok(Some(next))
			},
			(Some(prev), None) => {
				let list = self.list_of(&self.elem)?;
				txn.set_field(&list, field::LAST_ELM, Cell::Id64(prev_id))?;
				txn.set_field(&prev, field::NEXT_ELEM, Cell::Null)?;
				Ok(Some(prev))
			},
			(Some(prev), Some(next)) => {
				txn.set_field(&prev, field::NEXT_ELEM, Cell::Id64(next_id))?;
				txn.set_field(&next, field::PREV_ELEM, Cell::Id64(prev_id))?;
				Ok(Some(next))
			},
		}
	}

	/// Delete the element under the iterator. Returns the neighbor to
	/// continue on (the successor where one exists), or nothing when the
	/// list became empty.
	pub fn erase(self) -> Result<Option<Lit<'a>>> {
		let replace = self.remove_current()?;
		self.txn.erase(&self.elem)?;

		let mut info = UpdateInfo::new(UpdateKind::ElementErased);
		info.id = self.bookmark();
		self.txn.note(info);

		Ok(replace.map(|rec| Lit::new(rec, self.txn)))
	}

	/// Insert a new element carrying `value` before the current position.
	pub fn insert_before(&self, value: Cell) -> Result<()> {
		let txn = self.txn;
		let elem = txn.create_record(RecordType::Element)?;
		let eid = elem.lock().id;
		txn.set_field(&elem, field::VALUE, value)?;
		let prev_id = txn.get_id_field(&self.elem, field::PREV_ELEM)?;
		let list = self.list_of(&self.elem)?;
		let list_id = list.lock().id;
		let mut info = UpdateInfo::new(UpdateKind::ElementAdded);
		info.id = eid;
		info.id2 = list_id;
		if prev_id == 0 {
			// the current element is the first of the list
			txn.set_field(&self.elem, field::PREV_ELEM, Cell::Id64(eid))?;
			txn.set_field(&elem, field::NEXT_ELEM, Cell::Id64(self.bookmark()))?;
			txn.set_field(&list, field::FIRST_ELM, Cell::Id64(eid))?;
			txn.set_field(&elem, field::LIST, Cell::Oid(list_id))?;
			info.place = Place::First;
		} else {
			let prev = txn.get_record(prev_id, Some(RecordType::Element))?
				.ok_or(ErrorKind::RecordFormat("element chain is broken"))?;
			txn.set_field(&elem, field::PREV_ELEM, Cell::Id64(prev_id))?;
			txn.set_field(&prev, field::NEXT_ELEM, Cell::Id64(eid))?;
			txn.set_field(&self.elem, field::PREV_ELEM, Cell::Id64(eid))?;
			txn.set_field(&elem, field::NEXT_ELEM, Cell::Id64(self.bookmark()))?;
			txn.set_field(&elem, field::LIST, Cell::Oid(list_id))?;
		}
		txn.note(info);
		Ok(())
	}

	/// Insert a new element carrying `value` after the current position.
	pub fn insert_after(&self, value: Cell) -> Result<()> {
		let txn = self.txn;
		let elem = txn.create_record(RecordType::Element)?;
		let eid = elem.lock().id;
		txn.set_field(&elem, field::VALUE, value)?;
		let next_id = txn.get_id_field(&self.elem, field::NEXT_ELEM)?;
		let list = self.list_of(&self.elem)?;
		let list_id = list.lock().id;
		let mut info = UpdateInfo::new(UpdateKind::ElementAdded);
		info.id = eid;
		info.id2 = list_id;
		if next_id == 0 {
			// the current element is the last of the list
			txn.set_field(&self.elem, field::NEXT_ELEM, Cell::Id64(eid))?;
			txn.set_field(&elem, field::PREV_ELEM, Cell::Id64(self.bookmark()))?;
			txn.set_field(&list, field::LAST_ELM, Cell::Id64(eid))?;
			txn.set_field(&elem, field::LIST, Cell::Oid(list_id))?;
			info.place = Place::Last;
		} else {
			let next = txn.get_record(next_id, Some(RecordType::Element))?
				.ok_or(ErrorKind::RecordFormat("element chain is broken"))?;
			txn.set_field(&elem, field::NEXT_ELEM, Cell::Id64(next_id))?;
			txn.set_field(&next, field::PREV_ELEM, Cell::Id64(eid))?;
			txn.set_field(&self.elem, field::NEXT_ELEM, Cell::Id64(eid))?;
			txn.set_field(&elem, field::PREV_ELEM, Cell::Id64(self.bookmark()))?;
			txn.set_field(&elem, field::LIST, Cell::Oid(list_id))?;
		}
		txn.note(info);
		Ok(())
	}

	/// Move this element before `target`, or to the end of the list when
	/// no target is given. The target must belong to the same list, else
	/// `WrongContext`; trivial moves do nothing.
	pub fn move_before(&self, target: Option<&Lit>) -> Result<()> {
		let txn = self.txn;
		if let Some(target) = target {
			if target.bookmark() == self.bookmark() {
				return Ok(());
			}
		}
		match target {
			None => {
				if txn.get_id_field(&self.elem, field::NEXT_ELEM)? == 0 {
					return Ok(());
				}
				self.remove_current()?;
				let list = self.list_of(&self.elem)?;
				let old_last_id = txn.get_id_field(&list, field::LAST_ELM)?;
				let old_last = txn.get_record(old_last_id, Some(RecordType::Element))?
					.ok_or(ErrorKind::RecordFormat("element list lost its tail"))?;
				txn.set_field(&old_last, field::NEXT_ELEM, Cell::Id64(self.bookmark()))?;
				txn.set_field(&self.elem, field::PREV_ELEM, Cell::Id64(old_last_id))?;
				txn.set_field(&self.elem, field::NEXT_ELEM, Cell::Null)?;
				txn.set_field(&list, field::LAST_ELM, Cell::Id64(self.bookmark()))?;

				let mut info = UpdateInfo::new(UpdateKind::ElementMoved);
				info.id = self.bookmark();
				info.place = Place::Last;
				txn.note(info);
			},
			Some(next) => {
				let list = self.list_of(&self.elem)?;
				let list_id = list.lock().id;
				if list_id != txn.get_id_field(&next.elem, field::LIST)? {
					bail!(ErrorKind::WrongContext);
				}
				let prev_id = txn.get_id_field(&next.elem, field::PREV_ELEM)?;
				if prev_id == self.bookmark() {
					return Ok(());
				}
				let prev = txn.get_record(prev_id, Some(RecordType::Element))?;

				self.remove_current()?;
				match prev {
					None => {
						// target is the first element of the list
						txn.set_field(&next.elem, field::PREV_ELEM, Cell::Id64(self.bookmark()))?;
						txn.set_field(&self.elem, field::NEXT_ELEM, Cell::Id64(next.bookmark()))?;
						txn.set_field(&self.elem, field::PREV_ELEM, Cell::Null)?;
						txn.set_field(&list, field::FIRST_ELM, Cell::Id64(self.bookmark()))?;

						let mut info = UpdateInfo::new(UpdateKind::ElementMoved);
						info.id = self.bookmark();
						info.place = Place::First;
						txn.note(info);
					},
					Some(prev) => {
						txn.set_field(&next.elem, field::PREV_ELEM, Cell::Id64(self.bookmark()))?;
						txn.set_field(&prev, field::NEXT_ELEM, Cell::Id64(self.bookmark()))?;
						txn.set_field(&self.elem, field::PREV_ELEM, Cell::Id64(prev_id))?;
						txn.set_field(&self.elem, field::NEXT_ELEM, Cell::Id64(next.bookmark()))?;

						let mut info = UpdateInfo::new(UpdateKind::ElementMoved);
						info.id = self.bookmark();
						info.id2 = next.bookmark();
						info.place = Place::Before;
						txn.note(info);
					},
				}
			},
		}
		Ok(())
	}
}
