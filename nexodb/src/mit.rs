//! Sparse map iterator.
//!
//! Map rows are keyed by the owning record's oid cell followed by the
//! entry's key cells. The iterator is seeded with a key prefix and walks
//! the committed rows below it; it stops as soon as the cursor leaves the
//! prefix.

use cell::Cell;
use error::Result;
use record::RecordPtr;
use transaction::Transaction;

pub struct Mit<'a> {
	rec: RecordPtr,
	txn: &'a Transaction,
	cur: Vec<u8>,
	key: Vec<u8>,
}

impl<'a> Clone for Mit<'a> {
	fn clone(&self) -> Mit<'a> {
		Mit {
			rec: self.rec.clone(),
			txn: self.txn,
			cur: self.cur.clone(),
			key: self.key.clone(),
		}
	}
}

impl<'a> Mit<'a> {
	pub(crate) fn new(rec: RecordPtr, txn: &'a Transaction) -> Mit<'a> {
		Mit {
			rec,
			txn,
			cur: Vec::new(),
			key: Vec::new(),
		}
	}

	/// Remember `keys` as the search prefix and position on its first
	/// committed entry.
	pub fn seek(&mut self, keys: &[Cell]) -> Result<bool> {
		self.key = Cell::Oid(self.rec.lock().id).to_bytes();
		for key in keys {
			key.write_to(&mut self.key);
		}
		self.first_key()
	}

	/// Back to the first entry below the remembered prefix.
	pub fn first_key(&mut self) -> Result<bool> {
		self.cur.clear();
		let db = self.txn.db();
		let mut state = db.state();
		let table = state.map_table()?;
		let mut cur = state.store.cursor(table)?;
		if cur.move_to(&self.key, true) {
			self.cur = cur.read_key()?;
			Ok(true)
		} else {
			Ok(false)
		}
	}

	/// Step to the next entry; false once the prefix is left behind.
	pub fn next_key(&mut self) -> Result<bool> {
		let db = self.txn.db();
		let mut state = db.state();
		let table = state.map_table()?;
		let mut cur = state.store.cursor(table)?;
		cur.move_to(&self.cur, false);
		if cur.move_next() {
			self.cur = cur.read_key()?;
			Ok(self.cur.starts_with(&self.key))
		} else {
			Ok(false)
		}
	}

	/// Step to the previous entry; false once the prefix is left behind.
	pub fn prev_key(&mut self) -> Result<bool> {
		let db = self.txn.db();
		let mut state = db.state();
		let table = state.map_table()?;
		let mut cur = state.store.cursor(table)?;
		cur.move_to(&self.cur, false);
		if cur.move_prev() {
			self.cur = cur.read_key()?;
			Ok(self.cur.starts_with(&self.key))
		} else {
			Ok(false)
		}
	}

	/// Key cells of the current entry, the owning oid stripped.
	pub fn key(&self) -> Result<Vec<Cell>> {
		let mut keys = Vec::new();
		if !self.cur.starts_with(&self.key) {
			return Ok(keys);
		}
		let mut pos = 0;
		let mut first = true;
		while pos < self.cur.len() {
			let (cell, used) = Cell::read_from(&self.cur[pos..])?;
			pos += used;
			if !first {
				keys.push(cell);
			}
			first = false;
		}
		Ok(keys)
	}

	/// Value of the current entry; null when unpositioned.
	pub fn value(&self) -> Result<Cell> {
		if !self.cur.starts_with(&self.key) {
			return Ok(Cell::Null);
		}
		let db = self.txn.db();
		let mut state = db.state();
		let table = state.map_table()?;
		let mut cur = state.store.cursor(table)?;
		if cur.move_to(&self.cur, false) {
			Cell::from_bytes(&cur.read_value()?)
		} else {
			Ok(Cell::Null)
		}
	}
}
