//! Secondary indexes.
//!
//! An index is one table plus metadata: a kind and an ordered list of
//! items, each naming the indexed atom and its normalization. Entry keys
//! concatenate the encoded items; `Value` entries carry the record id as
//! key suffix (duplicates allowed), `Unique` entries do not. Encoding must
//! stay stable across runs; any change here is a format break.

use std::collections::BTreeSet;

use unicode_normalization::char::{decompose_canonical, decompose_compatible};

use cell::{self, Atom, Cell, Index, Oid};
use codec::{Reader, Token, Writer};
use error::{ErrorKind, Result};
use transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
	/// Duplicates allowed; the record id is part of the entry key.
	Value = 1,
	/// At most one record per item tuple.
	Unique = 2,
	/// Single item; the value is tokenized and every token indexed.
	Fulltext = 3,
}

impl IndexKind {
	fn from_u8(v: u8) -> Option<IndexKind> {
		match v {
			1 => Some(IndexKind::Value),
			2 => Some(IndexKind::Unique),
			3 => Some(IndexKind::Fulltext),
			_ => None,
		}
	}
}

/// Text normalization applied before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collation {
	/// Plain UTF-8 bytes.
	None = 0,
	/// Per codepoint: base character of the canonical decomposition, full
	/// compatibility decomposition otherwise.
	NfkdCanonicalBase = 1,
}

impl Collation {
	fn from_u8(v: u8) -> Option<Collation> {
		match v {
			0 => Some(Collation::None),
			1 => Some(Collation::NfkdCanonicalBase),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexItem {
	/// The indexed field.
	pub atom: Atom,
	/// Lowercase text before comparison.
	pub nocase: bool,
	/// Invert the encoded bytes so the entry sorts descending.
	pub invert: bool,
	pub coll: Collation,
}

impl IndexItem {
	pub fn new(atom: Atom) -> IndexItem {
		IndexItem {
			atom,
			nocase: true,
			invert: false,
			coll: Collation::None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
	pub kind: IndexKind,
	pub items: Vec<IndexItem>,
}

impl IndexMeta {
	pub fn new(kind: IndexKind) -> IndexMeta {
		IndexMeta { kind, items: Vec::new() }
	}

	pub fn serialize(&self) -> Vec<u8> {
		let mut w = Writer::new();
		w.write_named_slot(&tag("kind"), &Cell::UInt8(self.kind as u8));
		for item in &self.items {
			w.start_named_frame(&tag("item"));
			w.write_named_slot(&tag("atom"), &Cell::Atom(item.atom));
			w.write_named_slot(&tag("nc"), &Cell::Bool(item.nocase));
			w.write_named_slot(&tag("inv"), &Cell::Bool(item.invert));
			w.write_named_slot(&tag("coll"), &Cell::UInt8(item.coll as u8));
			w.end_frame();
		}
		w.into_bytes()
	}

	pub fn deserialize(buf: &[u8]) -> Result<IndexMeta> {
		let mut meta = IndexMeta::new(IndexKind::Value);
		let mut item = IndexItem::new(0);
		let mut in_item = false;
		let mut r = Reader::new(buf);
		loop {
			let token = r.next_token()?;
			if !token.is_useful() {
				break;
			}
			match token {
				Token::Slot => {
					let name = r.name().arr().to_vec();
					let value = r.take_value();
					match &name[..] {
						b"kind" => {
							meta.kind = IndexKind::from_u8(value.uint8())
								.ok_or(ErrorKind::AccessMeta("unknown index kind".into()))?;
						},
						b"atom" => item.atom = value.atom(),
						b"nc" => item.nocase = value.bool(),
						b"inv" => item.invert = value.bool(),
						b"coll" => {
							item.coll = Collation::from_u8(value.uint8())
								.ok_or(ErrorKind::AccessMeta("unknown collation".into()))?;
						},
						_ => {},
					}
				},
				Token::BeginFrame => {
					if in_item {
						bail!(ErrorKind::AccessMeta("invalid index meta format".into()));
					}
					in_item = true;
				},
				Token::EndFrame => {
					if !in_item {
						bail!(ErrorKind::AccessMeta("invalid index meta format".into()));
					}
					in_item = false;
					meta.items.push(item);
					item = IndexItem::new(0);
				},
				Token::Eof => break,
			}
		}
		Ok(meta)
	}
}

fn tag(name: &str) -> Cell {
	Cell::Ascii(name.as_bytes().to_vec())
}

/// Append one encoded key element for `value` under `item`'s rules.
///
/// Text of any flavor is normalized to UTF-8; everything else keeps its
/// codec byte form. A type-tag byte is prepended after the optional
/// inversion so different-typed values never interleave in order.
pub fn add_element(out: &mut Vec<u8>, item: &IndexItem, value: &Cell) {
	let mut bytes;
	let tag;
	match *value {
		Cell::Latin1(ref v) => {
			let s: String = v.iter().map(|&b| b as char).collect();
			bytes = Vec::new();
			collate(&mut bytes, item.coll, &normalize_case(&s, item.nocase));
			tag = cell::TAG_STRING;
		},
		Cell::Ascii(ref v) => {
			bytes = if item.nocase {
				v.iter().map(|b| b.to_ascii_lowercase()).collect()
			} else {
				v.clone()
			};
			tag = cell::TAG_STRING;
		},
		Cell::Str(ref s) => {
			bytes = Vec::new();
			collate(&mut bytes, item.coll, &normalize_case(s, item.nocase));
			tag = cell::TAG_STRING;
		},
		_ => {
			bytes = value.to_bytes();
			tag = value.tag();
		},
	}
	if item.invert {
		for b in bytes.iter_mut() {
			*b = !*b;
		}
	}
	out.push(tag);
	out.extend_from_slice(&bytes);
}

fn normalize_case(s: &str, nocase: bool) -> String {
	if nocase {
		s.to_lowercase()
	} else {
		s.to_string()
	}
}

/// Apply a collation to `input`, appending UTF-8 to `out`.
pub fn collate(out: &mut Vec<u8>, coll: Collation, input: &str) {
	match coll {
		Collation::None => out.extend_from_slice(input.as_bytes()),
		Collation::NfkdCanonicalBase => {
			let mut buf = [0u8; 4];
			for c in input.chars() {
				let mut canonical = Vec::new();
				decompose_canonical(c, |d| canonical.push(d));
				if canonical.len() > 1 || canonical.get(0) != Some(&c) {
					// canonically decomposable, keep only the base character
					out.extend_from_slice(canonical[0].encode_utf8(&mut buf).as_bytes());
					continue;
				}
				let mut compat = Vec::new();
				decompose_compatible(c, |d| compat.push(d));
				if compat.len() > 1 || compat.get(0) != Some(&c) {
					for d in compat {
						out.extend_from_slice(d.encode_utf8(&mut buf).as_bytes());
					}
				} else {
					out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
				}
			}
		},
	}
}

/// Split a text cell into the tokens a fulltext index stores: lowercased
/// maximal alphanumeric runs, deduplicated. Non-text cells yield nothing.
pub fn tokenize(value: &Cell) -> Vec<String> {
	let text = match *value {
		Cell::Str(ref s) | Cell::Html(ref s) | Cell::Xml(ref s) => s.clone(),
		Cell::Ascii(ref v) => String::from_utf8_lossy(v).into_owned(),
		Cell::Latin1(ref v) => v.iter().map(|&b| b as char).collect(),
		_ => return Vec::new(),
	};
	let mut tokens = BTreeSet::new();
	for word in text.split(|c: char| !c.is_alphanumeric()) {
		if !word.is_empty() {
			tokens.insert(word.to_lowercase());
		}
	}
	tokens.into_iter().collect()
}

/// Ordered scan over one index table.
///
/// The handle remembers its current entry key and an optional search
/// prefix; `next_key`/`prev_key` stop once the position leaves the prefix.
pub struct Idx<'a> {
	txn: &'a Transaction,
	idx: Index,
	cur: Vec<u8>,
	key: Vec<u8>,
}

impl<'a> Idx<'a> {
	pub(crate) fn new(txn: &'a Transaction, idx: Index) -> Idx<'a> {
		Idx {
			txn,
			idx,
			cur: Vec::new(),
			key: Vec::new(),
		}
	}

	pub fn table(&self) -> Index {
		self.idx
	}

	pub fn cur(&self) -> &[u8] {
		&self.cur
	}

	pub fn key(&self) -> &[u8] {
		&self.key
	}

	pub fn first(&mut self) -> Result<bool> {
		let mut state = self.txn.db().state();
		let mut cur = state.store.cursor(self.idx)?;
		if cur.move_first() {
			self.cur = cur.read_key()?;
			Ok(true)
		} else {
			Ok(false)
		}
	}

	pub fn last(&mut self) -> Result<bool> {
		let mut state = self.txn.db().state();
		let mut cur = state.store.cursor(self.idx)?;
		if cur.move_last() {
			self.cur = cur.read_key()?;
			Ok(true)
		} else {
			Ok(false)
		}
	}

	pub fn next(&mut self) -> Result<bool> {
		let mut state = self.txn.db().state();
		let mut cur = state.store.cursor(self.idx)?;
		cur.move_to(&self.cur, false);
		if cur.move_next() {
			self.cur = cur.read_key()?;
			Ok(true)
		} else {
			Ok(false)
		}
	}

	pub fn prev(&mut self) -> Result<bool> {
		let mut state = self.txn.db().state();
		let mut cur = state.store.cursor(self.idx)?;
		cur.move_to(&self.cur, false);
		if cur.move_prev() {
			self.cur = cur.read_key()?;
			Ok(true)
		} else {
			Ok(false)
		}
	}

	pub fn next_key(&mut self) -> Result<bool> {
		Ok(self.next()? && self.cur.starts_with(&self.key))
	}

	pub fn prev_key(&mut self) -> Result<bool> {
		Ok(self.prev()? && self.cur.starts_with(&self.key))
	}

	/// Encode `keys` against the index items and position at the first
	/// matching entry.
	pub fn seek(&mut self, keys: &[Cell]) -> Result<bool> {
		self.cur.clear();
		self.key.clear();
		let meta = match self.txn.db().index_meta(self.idx)? {
			Some(meta) => meta,
			None => bail!(ErrorKind::AccessMeta("unknown index".into())),
		};
		for (item, key) in meta.items.iter().zip(keys) {
			add_element(&mut self.key, item, key);
		}
		self.first_key()
	}

	/// Position at the first entry matching the remembered search prefix.
	pub fn first_key(&mut self) -> Result<bool> {
		self.cur.clear();
		let mut state = self.txn.db().state();
		let mut cur = state.store.cursor(self.idx)?;
		if cur.move_to(&self.key, true) {
			self.cur = cur.read_key()?;
			Ok(true)
		} else {
			Ok(false)
		}
	}

	/// Adopt a previously read entry key if it still matches the prefix.
	pub fn goto_cur(&mut self, cur: &[u8]) -> bool {
		if cur.starts_with(&self.key) {
			self.cur = cur.to_vec();
			true
		} else {
			false
		}
	}

	/// Record id stored under the current entry, zero when unpositioned.
	pub fn id(&self) -> Result<Oid> {
		let mut state = self.txn.db().state();
		let mut cur = state.store.cursor(self.idx)?;
		if !cur.move_to(&self.cur, false) {
			return Ok(0);
		}
		Ok(Cell::from_bytes(&cur.read_value()?)?.to_id64())
	}
}
