//! Generic record handle.
//!
//! `Orl` is the common surface of objects and relations: identity, typed
//! attribute access and the optional uuid. `Obj` and `Rel` deref to it.

use std::collections::BTreeSet;

use uuid::Uuid;

use cell::{Atom, Cell, Oid};
use error::{ErrorKind, Result};
use record::{field, RecordPtr, RecordType, MIN_RESERVED_FIELD};
use transaction::Transaction;
use update::{UpdateInfo, UpdateKind};

/// Handle on any record under a transaction.
pub struct Orl<'a> {
	rec: RecordPtr,
	txn: &'a Transaction,
}

impl<'a> Clone for Orl<'a> {
	fn clone(&self) -> Orl<'a> {
		Orl {
			rec: self.rec.clone(),
			txn: self.txn,
		}
	}
}

impl<'a> Orl<'a> {
	pub(crate) fn new(rec: RecordPtr, txn: &'a Transaction) -> Orl<'a> {
		Orl { rec, txn }
	}

	pub(crate) fn rec(&self) -> &RecordPtr {
		&self.rec
	}

	pub(crate) fn replace_rec(&mut self, rec: RecordPtr) {
		self.rec = rec;
	}

	pub fn txn(&self) -> &'a Transaction {
		self.txn
	}

	/// Record id; oids and rids share one value space.
	pub fn id(&self) -> Oid {
		self.rec.lock().id
	}

	pub fn is_object(&self) -> bool {
		self.rec.lock().typ == RecordType::Object
	}

	pub fn is_relation(&self) -> bool {
		self.rec.lock().typ == RecordType::Relation
	}

	pub fn is_deleted(&self) -> bool {
		self.rec.lock().is_deleted()
	}

	/// Write a user attribute. Reserved atoms are refused.
	pub fn set_value(&self, name: Atom, value: Cell) -> Result<()> {
		if name >= MIN_RESERVED_FIELD {
			bail!(ErrorKind::ReservedName);
		}
		self.set_value_priv(name, value)
	}

	pub(crate) fn set_value_priv(&self, name: Atom, value: Cell) -> Result<()> {
		self.txn.set_field(&self.rec, name, value)?;
		let mut info = UpdateInfo::new(UpdateKind::ValueChanged);
		info.id = self.id();
		info.name = name;
		self.txn.note(info);
		Ok(())
	}

	pub fn value(&self, name: Atom) -> Result<Cell> {
		self.txn.get_field(&self.rec, name)
	}

	/// True iff the effective value of the attribute is non-null.
	pub fn has_value(&self, name: Atom) -> Result<bool> {
		self.txn.has_field(&self.rec, name)
	}

	/// The user atoms carrying a value, pending writes included.
	pub fn names(&self) -> Result<BTreeSet<Atom>> {
		let mut names = self.rec.lock().used_fields();
		for name in self.txn.pending_fields(&self.rec) {
			if name < MIN_RESERVED_FIELD {
				names.insert(name);
			}
		}
		Ok(names)
	}

	/// Type atom, zero when untyped.
	pub fn typ(&self) -> Result<Atom> {
		Ok(self.value(field::TYPE)?.atom())
	}

	pub fn set_type(&self, typ: Atom) -> Result<()> {
		self.set_value_priv(field::TYPE, Cell::Atom(typ))
	}

	pub fn uuid(&self) -> Result<Option<Uuid>> {
		Ok(self.value(field::UUID)?.uuid())
	}

	/// Bind a uuid to this record; at most one record may carry any given
	/// uuid. A nil uuid clears the binding.
	pub fn set_uuid(&self, uuid: &Uuid) -> Result<()> {
		let other = self.txn.deref_uuid(uuid)?;
		if other != 0 && other != self.id() {
			bail!(ErrorKind::Duplicate);
		}
		let cell = if uuid.is_nil() {
			Cell::Null
		} else {
			Cell::Uuid(*uuid)
		};
		self.set_value_priv(field::UUID, cell)
	}

	pub fn to_cell(&self) -> Cell {
		let imp = self.rec.lock();
		match imp.typ {
			RecordType::Relation => Cell::Rid(imp.id),
			_ => Cell::Oid(imp.id),
		}
	}
}
