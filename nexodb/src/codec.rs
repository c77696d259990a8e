//! Frame/slot structured byte streams.
//!
//! A stream is a flat sequence of tokens. A slot carries one cell and an
//! optional name cell (atom, ascii tag or latin1 string); frames group
//! slots and may be named themselves. Raw multibyte-64 integers can be
//! interleaved between tokens for fixed prologues.
//!
//! ```text
//!  token    name       payload
//!   /        /          /
//! | 0x81 | cell... | cell... |
//! ```
//!
//! The high bit of the token byte marks a named slot or frame.

use cell::Cell;
use error::{ErrorKind, Result};

const TOKEN_SLOT: u8 = 0x01;
const TOKEN_BEGIN_FRAME: u8 = 0x02;
const TOKEN_END_FRAME: u8 = 0x03;
const NAMED: u8 = 0x80;

/// Token kinds produced by `Reader::next_token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
	Slot,
	BeginFrame,
	EndFrame,
	Eof,
}

impl Token {
	/// Whether the token carries structure (padding and end-of-stream do not).
	pub fn is_useful(&self) -> bool {
		match *self {
			Token::Eof => false,
			_ => true,
		}
	}
}

/// Append a multibyte-64 integer: 7 bits per byte, high groups first,
/// high bit set on every byte but the last.
pub fn write_multibyte64(out: &mut Vec<u8>, mut v: u64) {
	let mut groups = [0u8; 10];
	let mut n = 0;
	loop {
		groups[n] = (v & 0x7f) as u8;
		n += 1;
		v >>= 7;
		if v == 0 {
			break;
		}
	}
	for i in (1..n).rev() {
		out.push(groups[i] | 0x80);
	}
	out.push(groups[0]);
}

/// Parse a multibyte-64 integer from the front of `buf`; returns the value
/// and the number of bytes consumed.
pub fn read_multibyte64(buf: &[u8]) -> Result<(u64, usize)> {
	let mut v = 0u64;
	for (i, byte) in buf.iter().enumerate() {
		if i >= 10 {
			break;
		}
		v = (v << 7) | (byte & 0x7f) as u64;
		if byte & 0x80 == 0 {
			return Ok((v, i + 1));
		}
	}
	bail!(ErrorKind::RecordFormat("truncated multibyte integer"))
}

/// Serializer for frame/slot streams.
pub struct Writer {
	buf: Vec<u8>,
}

impl Writer {
	pub fn new() -> Writer {
		Writer { buf: Vec::new() }
	}

	pub fn write_slot(&mut self, value: &Cell) {
		self.buf.push(TOKEN_SLOT);
		value.write_to(&mut self.buf);
	}

	pub fn write_named_slot(&mut self, name: &Cell, value: &Cell) {
		self.buf.push(TOKEN_SLOT | NAMED);
		name.write_to(&mut self.buf);
		value.write_to(&mut self.buf);
	}

	pub fn start_frame(&mut self) {
		self.buf.push(TOKEN_BEGIN_FRAME);
	}

	pub fn start_named_frame(&mut self, name: &Cell) {
		self.buf.push(TOKEN_BEGIN_FRAME | NAMED);
		name.write_to(&mut self.buf);
	}

	pub fn end_frame(&mut self) {
		self.buf.push(TOKEN_END_FRAME);
	}

	/// Raw multibyte integer between tokens, for fixed prologues.
	pub fn write_multibyte64(&mut self, v: u64) {
		write_multibyte64(&mut self.buf, v);
	}

	pub fn stream(&self) -> &[u8] {
		&self.buf
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.buf
	}
}

/// Pull parser for frame/slot streams.
pub struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
	name: Cell,
	value: Cell,
}

impl<'a> Reader<'a> {
	pub fn new(buf: &'a [u8]) -> Reader<'a> {
		Reader {
			buf,
			pos: 0,
			name: Cell::Null,
			value: Cell::Null,
		}
	}

	/// Advance to the next token. After `Token::Slot` the slot's name and
	/// value are available; after a named `Token::BeginFrame` the name is.
	pub fn next_token(&mut self) -> Result<Token> {
		self.name = Cell::Null;
		self.value = Cell::Null;
		if self.pos >= self.buf.len() {
			return Ok(Token::Eof);
		}
		let token = self.buf[self.pos];
		self.pos += 1;
		match token & !NAMED {
			TOKEN_SLOT => {
				if token & NAMED != 0 {
					self.name = self.read_cell()?;
				}
				self.value = self.read_cell()?;
				Ok(Token::Slot)
			},
			TOKEN_BEGIN_FRAME => {
				if token & NAMED != 0 {
					self.name = self.read_cell()?;
				}
				Ok(Token::BeginFrame)
			},
			TOKEN_END_FRAME => Ok(Token::EndFrame),
			_ => bail!(ErrorKind::RecordFormat("unknown token")),
		}
	}

	pub fn name(&self) -> &Cell {
		&self.name
	}

	pub fn value(&self) -> &Cell {
		&self.value
	}

	pub fn take_value(&mut self) -> Cell {
		::std::mem::replace(&mut self.value, Cell::Null)
	}

	/// Raw multibyte integer between tokens, for fixed prologues.
	pub fn read_multibyte64(&mut self) -> Result<u64> {
		let (v, used) = read_multibyte64(&self.buf[self.pos..])?;
		self.pos += used;
		Ok(v)
	}

	fn read_cell(&mut self) -> Result<Cell> {
		let (cell, used) = Cell::read_from(&self.buf[self.pos..])?;
		self.pos += used;
		Ok(cell)
	}
}
