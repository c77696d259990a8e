//! Queue iterator.
//!
//! Queue rows live in their own table keyed by the owning record id plus
//! a 32-bit slot number; the bare id keys the append counter (slot zero).
//! Navigation walks the store with a prefix-bounded cursor, so it sees
//! committed slots; values read through the transaction and include the
//! pending writes.

use cell::{Cell, Oid};
use error::Result;
use record::RecordPtr;
use transaction::Transaction;
use update::{UpdateInfo, UpdateKind};

pub struct Qit<'a> {
	rec: RecordPtr,
	txn: &'a Transaction,
	nr: u32,
}

impl<'a> Clone for Qit<'a> {
	fn clone(&self) -> Qit<'a> {
		Qit {
			rec: self.rec.clone(),
			txn: self.txn,
			nr: self.nr,
		}
	}
}

impl<'a> Qit<'a> {
	pub(crate) fn new(rec: RecordPtr, txn: &'a Transaction, nr: u32) -> Qit<'a> {
		Qit { rec, txn, nr }
	}

	pub fn slot_nr(&self) -> u32 {
		self.nr
	}

	fn oid(&self) -> Oid {
		self.rec.lock().id
	}

	fn prefix(&self) -> Vec<u8> {
		Cell::Id64(self.oid()).to_bytes()
	}

	fn adopt(&mut self, key: &[u8], prefix_len: usize) -> Result<bool> {
		self.nr = Cell::from_bytes(&key[prefix_len..])?.id32();
		Ok(true)
	}

	/// Overwrite the slot; a null value erases it. Slot zero (the
	/// counter) is not writable through the iterator.
	pub fn set_value(&self, value: Cell) -> Result<()> {
		if self.nr == 0 {
			return Ok(());
		}
		let erased = value.is_null();
		self.txn.set_qslot(&self.rec, self.nr, value)?;
		let mut info = UpdateInfo::new(if erased {
			UpdateKind::QueueErased
		} else {
			UpdateKind::QueueChanged
		});
		info.id = self.nr as u64;
		info.id2 = self.oid();
		self.txn.note(info);
		Ok(())
	}

	pub fn value(&self) -> Result<Cell> {
		if self.nr == 0 {
			return Ok(Cell::Null);
		}
		self.txn.get_qslot(&self.rec, self.nr)
	}

	pub fn erase(&self) -> Result<()> {
		self.set_value(Cell::Null)
	}

	/// Position on the lowest committed slot.
	pub fn first(&mut self) -> Result<bool> {
		let prefix = self.prefix();
		let key = {
			let db = self.txn.db();
			let mut state = db.state();
			let table = state.que_table()?;
			let mut cur = state.store.cursor(table)?;
			// the exact hit is the counter row; the first slot follows
			if !cur.move_to(&prefix, false) {
				return Ok(false);
			}
			if !cur.move_next() {
				return Ok(false);
			}
			cur.read_key()?
		};
		if !key.starts_with(&prefix) {
			return Ok(false);
		}
		self.adopt(&key, prefix.len())
	}

	/// Position on the highest committed slot. The counter bounds the
	/// search; erased tail slots are skipped over.
	pub fn last(&mut self) -> Result<bool> {
		let prefix = self.prefix();
		let counter = self.txn.get_qslot(&self.rec, 0)?;
		let key = {
			let db = self.txn.db();
			let mut state = db.state();
			let table = state.que_table()?;
			let mut cur = state.store.cursor(table)?;
			let mut bound = prefix.clone();
			counter.write_to(&mut bound);
			if cur.move_to(&bound, true) {
				cur.read_key()?
			} else {
				// past the wanted slot or past the end; step back onto
				// the greatest smaller entry
				if cur.is_valid_pos() {
					if !cur.move_prev() {
						return Ok(false);
					}
				} else if !cur.move_last() {
					return Ok(false);
				}
				let key = cur.read_key()?;
				if key == prefix || !key.starts_with(&prefix) {
					return Ok(false);
				}
				key
			}
		};
		self.adopt(&key, prefix.len())
	}

	/// Step to the next committed slot; stays put at the end.
	pub fn next(&mut self) -> Result<bool> {
		if self.nr == 0 {
			return self.first();
		}
		let prefix = self.prefix();
		let key = {
			let db = self.txn.db();
			let mut state = db.state();
			let table = state.que_table()?;
			let mut cur = state.store.cursor(table)?;
			let mut key = prefix.clone();
			Cell::Id32(self.nr).write_to(&mut key);
			if cur.move_to(&key, false) && !cur.move_next() {
				return Ok(false);
			}
			if !cur.is_valid_pos() {
				return Ok(false);
			}
			cur.read_key()?
		};
		if !key.starts_with(&prefix) {
			return Ok(false);
		}
		self.adopt(&key, prefix.len())
	}

	/// Step to the previous committed slot; stays put at the front.
	pub fn prev(&mut self) -> Result<bool> {
		if self.nr == 0 {
			return self.last();
		}
		let prefix = self.prefix();
		let key = {
			let db = self.txn.db();
			let mut state = db.state();
			let table = state.que_table()?;
			let mut cur = state.store.cursor(table)?;
			let mut key = prefix.clone();
			Cell::Id32(self.nr).write_to(&mut key);
			// the cursor lands at or after the requested slot; the entry
			// before it is the greatest smaller one either way
			if cur.move_to(&key, false) || cur.is_valid_pos() {
				if !cur.move_prev() {
					return Ok(false);
				}
			} else if !cur.move_last() {
				return Ok(false);
			}
			cur.read_key()?
		};
		if key == prefix || !key.starts_with(&prefix) {
			return Ok(false);
		}
		self.adopt(&key, prefix.len())
	}
}
