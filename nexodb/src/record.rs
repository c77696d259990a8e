//! Persistent records and their per-transaction shadows.
//!
//! A record is a map from atoms to cells plus a type tag. The engine
//! reserves the top 100 atoms of the 32-bit space for its own link fields;
//! user atoms must stay below that threshold.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use cell::{Atom, Cell, Oid};
use codec::{Reader, Token, Writer};
use error::{ErrorKind, Result};

/// First atom of the engine-reserved range.
pub const MIN_RESERVED_FIELD: Atom = 0xffff_ffff - 100;

/// Engine-reserved field atoms. The prev/next/first/last fields encode the
/// doubly-linked aggregate, relation and element chains; `VALUE`, `TYPE`
/// and `UUID` are the reserved fields that serialize as named slots.
pub mod field {
	use cell::Atom;
	use super::MIN_RESERVED_FIELD;

	pub const OWNER: Atom = MIN_RESERVED_FIELD + 1;
	pub const PREV_OBJ: Atom = MIN_RESERVED_FIELD + 2;
	pub const NEXT_OBJ: Atom = MIN_RESERVED_FIELD + 3;
	pub const FIRST_OBJ: Atom = MIN_RESERVED_FIELD + 4;
	pub const LAST_OBJ: Atom = MIN_RESERVED_FIELD + 5;
	pub const FIRST_REL: Atom = MIN_RESERVED_FIELD + 6;
	pub const LAST_REL: Atom = MIN_RESERVED_FIELD + 7;
	pub const FIRST_ELM: Atom = MIN_RESERVED_FIELD + 8;
	pub const LAST_ELM: Atom = MIN_RESERVED_FIELD + 9;
	pub const SOURCE: Atom = MIN_RESERVED_FIELD + 10;
	pub const TARGET: Atom = MIN_RESERVED_FIELD + 11;
	pub const PREV_SOURCE: Atom = MIN_RESERVED_FIELD + 12;
	pub const NEXT_SOURCE: Atom = MIN_RESERVED_FIELD + 13;
	pub const PREV_TARGET: Atom = MIN_RESERVED_FIELD + 14;
	pub const NEXT_TARGET: Atom = MIN_RESERVED_FIELD + 15;
	pub const LIST: Atom = MIN_RESERVED_FIELD + 16;
	pub const VALUE: Atom = MIN_RESERVED_FIELD + 17;
	pub const PREV_ELEM: Atom = MIN_RESERVED_FIELD + 18;
	pub const NEXT_ELEM: Atom = MIN_RESERVED_FIELD + 19;
	pub const TYPE: Atom = MIN_RESERVED_FIELD + 20;
	pub const UUID: Atom = MIN_RESERVED_FIELD + 21;
}

const FORMAT_VERSION: u8 = 1;

/// What a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
	Object = 1,
	Relation = 2,
	Element = 3,
}

impl RecordType {
	pub fn from_u8(v: u8) -> Option<RecordType> {
		match v {
			1 => Some(RecordType::Object),
			2 => Some(RecordType::Relation),
			3 => Some(RecordType::Element),
			_ => None,
		}
	}
}

/// Lifecycle of a cached record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	Idle,
	New,
	ToDelete,
	Deleted,
}

pub type Fields = BTreeMap<Atom, Cell>;

/// Shared handle to a cached record.
pub type RecordPtr = Arc<Mutex<RecordImp>>;

/// The persistent image of one record, shared between the database cache
/// and any number of handles.
#[derive(Debug)]
pub struct RecordImp {
	pub id: Oid,
	pub typ: RecordType,
	pub state: State,
	pub fields: Fields,
	/// Id of the transaction whose cow currently holds write authority.
	pub locker: Option<u64>,
}

impl RecordImp {
	pub fn new(id: Oid, typ: RecordType) -> RecordImp {
		RecordImp {
			id,
			typ,
			state: State::Idle,
			fields: Fields::new(),
			locker: None,
		}
	}

	pub fn is_deleted(&self) -> bool {
		self.state == State::Deleted
	}

	/// Committed value of a field. Values stay readable while the record
	/// is only marked for deletion.
	pub fn field(&self, atom: Atom) -> Result<Cell> {
		if self.state == State::Deleted {
			bail!(ErrorKind::RecordDeleted);
		}
		Ok(self.fields.get(&atom).cloned().unwrap_or(Cell::Null))
	}

	/// The user atoms carrying a value.
	pub fn used_fields(&self) -> BTreeSet<Atom> {
		self.fields.keys()
			.cloned()
			.filter(|a| *a < MIN_RESERVED_FIELD)
			.collect()
	}

	fn fixed_fields(typ: RecordType) -> &'static [Atom] {
		match typ {
			RecordType::Object => &[
				field::OWNER, field::PREV_OBJ, field::NEXT_OBJ,
				field::FIRST_OBJ, field::LAST_OBJ,
				field::FIRST_REL, field::LAST_REL,
				field::FIRST_ELM, field::LAST_ELM,
			],
			RecordType::Relation => &[
				field::SOURCE, field::TARGET,
				field::PREV_SOURCE, field::NEXT_SOURCE,
				field::PREV_TARGET, field::NEXT_TARGET,
			],
			RecordType::Element => &[
				field::LIST, field::PREV_ELEM, field::NEXT_ELEM,
			],
		}
	}

	fn fixed_cell(typ: RecordType, atom: Atom, id: u64) -> Cell {
		match typ {
			RecordType::Object => match atom {
				field::FIRST_REL | field::LAST_REL => Cell::Rid(id),
				field::FIRST_ELM | field::LAST_ELM => Cell::Id64(id),
				_ => Cell::Oid(id),
			},
			RecordType::Relation => match atom {
				field::SOURCE | field::TARGET => Cell::Oid(id),
				_ => Cell::Rid(id),
			},
			RecordType::Element => match atom {
				field::LIST => Cell::Oid(id),
				_ => Cell::Id64(id),
			},
		}
	}

	/// Serialized table-row form: version and type slots, the fixed link
	/// prologue as multibyte ids (zero meaning absent), then a frame of
	/// named slots for every non-null user field plus the reserved value,
	/// type and uuid fields.
	pub fn serialize(&self) -> Vec<u8> {
		let mut w = Writer::new();
		w.write_slot(&Cell::UInt8(FORMAT_VERSION));
		w.write_slot(&Cell::UInt8(self.typ as u8));
		for atom in Self::fixed_fields(self.typ) {
			let id = self.fields.get(atom).map(|c| c.to_id64()).unwrap_or(0);
			w.write_multibyte64(id);
		}
		w.start_frame();
		for (atom, value) in &self.fields {
			let emitted = *atom < MIN_RESERVED_FIELD
				|| *atom == field::VALUE
				|| *atom == field::TYPE
				|| *atom == field::UUID;
			if emitted && value.has_value() {
				w.write_named_slot(&Cell::Atom(*atom), value);
			}
		}
		w.end_frame();
		w.into_bytes()
	}

	/// Parse a table row back into a record image.
	pub fn deserialize(id: Oid, buf: &[u8]) -> Result<RecordImp> {
		let mut r = Reader::new(buf);
		if r.next_token()? != Token::Slot {
			bail!(ErrorKind::RecordFormat("missing version slot"));
		}
		if r.value().uint8() != FORMAT_VERSION {
			bail!(ErrorKind::RecordFormat("wrong version"));
		}
		if r.next_token()? != Token::Slot {
			bail!(ErrorKind::RecordFormat("missing type slot"));
		}
		let typ = RecordType::from_u8(r.value().uint8())
			.ok_or(ErrorKind::RecordFormat("unknown record type"))?;

		let mut imp = RecordImp::new(id, typ);
		for atom in Self::fixed_fields(typ) {
			let raw = r.read_multibyte64()?;
			if raw != 0 {
				imp.fields.insert(*atom, Self::fixed_cell(typ, *atom, raw));
			}
		}
		if r.next_token()? != Token::BeginFrame {
			bail!(ErrorKind::RecordFormat("missing field frame"));
		}
		loop {
			match r.next_token()? {
				Token::Slot => {
					let atom = match *r.name() {
						Cell::Atom(a) => a,
						_ => bail!(ErrorKind::RecordFormat("field name is not an atom")),
					};
					let value = r.take_value();
					imp.fields.insert(atom, value);
				},
				Token::EndFrame => break,
				_ => bail!(ErrorKind::RecordFormat("unterminated field frame")),
			}
		}
		Ok(imp)
	}

	/// Diagnostic rendering of the full field map.
	pub fn dump(&self) -> String {
		let mut out = format!("record id={} type={:?} state={:?}\n", self.id, self.typ, self.state);
		for (atom, value) in &self.fields {
			out.push_str(&format!("  atom(0x{:x}) = {}\n", atom, value.pretty()));
		}
		out
	}
}

/// Per-transaction shadow of a record, holding only the pending deltas.
#[derive(Debug)]
pub struct RecordCow {
	pub imp: RecordPtr,
	pub fields: Fields,
	pub queue: BTreeMap<u32, Cell>,
	pub map: BTreeMap<Vec<u8>, Cell>,
}

impl RecordCow {
	pub fn new(imp: RecordPtr) -> RecordCow {
		RecordCow {
			imp,
			fields: Fields::new(),
			queue: BTreeMap::new(),
			map: BTreeMap::new(),
		}
	}

	/// Effective value: the pending delta if present, the committed image
	/// otherwise.
	pub fn field(&self, atom: Atom) -> Result<Cell> {
		match self.fields.get(&atom) {
			Some(value) => Ok(value.clone()),
			None => self.imp.lock().field(atom),
		}
	}

	pub fn clear(&mut self) {
		self.fields.clear();
		self.queue.clear();
		self.map.clear();
	}

	pub fn is_clean(&self) -> bool {
		self.fields.is_empty() && self.queue.is_empty() && self.map.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use cell::Cell;
	use super::{field, RecordImp, RecordType, MIN_RESERVED_FIELD};

	#[test]
	fn object_roundtrips_with_links_and_fields() {
		let mut imp = RecordImp::new(9, RecordType::Object);
		imp.fields.insert(field::OWNER, Cell::Oid(3));
		imp.fields.insert(field::FIRST_ELM, Cell::Id64(11));
		imp.fields.insert(field::LAST_ELM, Cell::Id64(12));
		imp.fields.insert(field::TYPE, Cell::Atom(7));
		imp.fields.insert(42, Cell::Str("hello".into()));

		let buf = imp.serialize();
		let read = RecordImp::deserialize(9, &buf).unwrap();
		assert_eq!(read.typ, RecordType::Object);
		assert_eq!(read.fields, imp.fields);
	}

	#[test]
	fn relation_prologue_uses_side_typed_ids() {
		let mut imp = RecordImp::new(20, RecordType::Relation);
		imp.fields.insert(field::SOURCE, Cell::Oid(1));
		imp.fields.insert(field::TARGET, Cell::Oid(2));
		imp.fields.insert(field::NEXT_SOURCE, Cell::Rid(21));

		let read = RecordImp::deserialize(20, &imp.serialize()).unwrap();
		assert_eq!(read.fields.get(&field::SOURCE), Some(&Cell::Oid(1)));
		assert_eq!(read.fields.get(&field::NEXT_SOURCE), Some(&Cell::Rid(21)));
		assert_eq!(read.fields.get(&field::PREV_SOURCE), None);
	}

	#[test]
	fn null_and_reserved_link_fields_stay_out_of_the_frame() {
		let mut imp = RecordImp::new(5, RecordType::Element);
		imp.fields.insert(field::LIST, Cell::Oid(1));
		imp.fields.insert(field::VALUE, Cell::Str("v".into()));
		imp.fields.insert(77, Cell::Null);

		let read = RecordImp::deserialize(5, &imp.serialize()).unwrap();
		assert_eq!(read.fields.get(&77), None);
		assert_eq!(read.fields.get(&field::VALUE), Some(&Cell::Str("v".into())));
		assert_eq!(read.fields.get(&field::LIST), Some(&Cell::Oid(1)));
	}

	#[test]
	fn rejects_foreign_bytes() {
		assert!(RecordImp::deserialize(1, b"junk").is_err());
		assert!(RecordImp::deserialize(1, &[]).is_err());

		// valid version slot, bogus type
		let mut imp = RecordImp::new(2, RecordType::Element);
		imp.fields.insert(field::LIST, Cell::Oid(1));
		let mut buf = imp.serialize();
		buf[4] = 9;
		assert!(RecordImp::deserialize(2, &buf).is_err());
	}

	#[test]
	fn used_fields_skips_reserved_atoms() {
		let mut imp = RecordImp::new(4, RecordType::Object);
		imp.fields.insert(field::TYPE, Cell::Atom(1));
		imp.fields.insert(40, Cell::UInt32(1));
		imp.fields.insert(41, Cell::UInt32(2));
		assert!(imp.used_fields().iter().all(|a| *a < MIN_RESERVED_FIELD));
		assert_eq!(imp.used_fields().len(), 2);
	}
}
