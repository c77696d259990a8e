//! The tagged value cell shared by keys and values.
//!
//! A cell serializes to a single type-tag byte followed by its payload.
//! Integer, id, atom, uuid and date-time payloads are fixed width and
//! big-endian (sign bit biased for the signed kinds), so raw byte strings
//! of the same tag sort like the values they encode. String and blob
//! payloads carry a multibyte length so cells can be concatenated into
//! compound keys and parsed back.

use byteorder::{BigEndian, ByteOrder};
use chrono::NaiveDateTime;
use uuid::Uuid;

use codec;
use error::{ErrorKind, Result};

/// Interned name of an attribute or type.
pub type Atom = u32;
/// Record identifier. Objects, relations and elements share one id space.
pub type Oid = u64;
/// Stream identifier.
pub type Sid = u32;
/// Index table identifier.
pub type Index = u32;

pub const TAG_NULL: u8 = 0;
pub const TAG_BOOL: u8 = 1;
pub const TAG_INT8: u8 = 2;
pub const TAG_INT32: u8 = 3;
pub const TAG_INT64: u8 = 4;
pub const TAG_UINT8: u8 = 5;
pub const TAG_UINT32: u8 = 6;
pub const TAG_UINT64: u8 = 7;
pub const TAG_ATOM: u8 = 8;
pub const TAG_OID: u8 = 9;
pub const TAG_RID: u8 = 10;
pub const TAG_SID: u8 = 11;
pub const TAG_ID32: u8 = 12;
pub const TAG_ID64: u8 = 13;
pub const TAG_UUID: u8 = 14;
pub const TAG_DATETIME: u8 = 15;
pub const TAG_LATIN1: u8 = 16;
pub const TAG_ASCII: u8 = 17;
pub const TAG_STRING: u8 = 18;
pub const TAG_HTML: u8 = 19;
pub const TAG_XML: u8 = 20;
pub const TAG_BML: u8 = 21;
pub const TAG_IMAGE: u8 = 22;
pub const TAG_LOB: u8 = 23;

/// A self-describing polymorphic value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Cell {
	Null,
	Bool(bool),
	Int8(i8),
	Int32(i32),
	Int64(i64),
	UInt8(u8),
	UInt32(u32),
	UInt64(u64),
	Atom(Atom),
	Oid(Oid),
	Rid(Oid),
	Sid(Sid),
	Id32(u32),
	Id64(u64),
	Uuid(Uuid),
	DateTime(NaiveDateTime),
	Latin1(Vec<u8>),
	Ascii(Vec<u8>),
	Str(String),
	Html(String),
	Xml(String),
	Bml(Vec<u8>),
	Image(Vec<u8>),
	Lob(Vec<u8>),
}

impl Cell {
	/// The type-tag byte this cell serializes with.
	pub fn tag(&self) -> u8 {
		match *self {
			Cell::Null => TAG_NULL,
			Cell::Bool(_) => TAG_BOOL,
			Cell::Int8(_) => TAG_INT8,
			Cell::Int32(_) => TAG_INT32,
			Cell::Int64(_) => TAG_INT64,
			Cell::UInt8(_) => TAG_UINT8,
			Cell::UInt32(_) => TAG_UINT32,
			Cell::UInt64(_) => TAG_UINT64,
			Cell::Atom(_) => TAG_ATOM,
			Cell::Oid(_) => TAG_OID,
			Cell::Rid(_) => TAG_RID,
			Cell::Sid(_) => TAG_SID,
			Cell::Id32(_) => TAG_ID32,
			Cell::Id64(_) => TAG_ID64,
			Cell::Uuid(_) => TAG_UUID,
			Cell::DateTime(_) => TAG_DATETIME,
			Cell::Latin1(_) => TAG_LATIN1,
			Cell::Ascii(_) => TAG_ASCII,
			Cell::Str(_) => TAG_STRING,
			Cell::Html(_) => TAG_HTML,
			Cell::Xml(_) => TAG_XML,
			Cell::Bml(_) => TAG_BML,
			Cell::Image(_) => TAG_IMAGE,
			Cell::Lob(_) => TAG_LOB,
		}
	}

	pub fn is_null(&self) -> bool {
		match *self {
			Cell::Null => true,
			_ => false,
		}
	}

	pub fn has_value(&self) -> bool {
		!self.is_null()
	}

	/// Numeric value of the id family (oid, rid, id32, id64, sid and the
	/// unsigned integers). Everything else reads as zero.
	pub fn to_id64(&self) -> u64 {
		match *self {
			Cell::Oid(v) | Cell::Rid(v) | Cell::Id64(v) | Cell::UInt64(v) => v,
			Cell::Id32(v) | Cell::Sid(v) | Cell::UInt32(v) => v as u64,
			Cell::UInt8(v) => v as u64,
			_ => 0,
		}
	}

	pub fn atom(&self) -> Atom {
		match *self {
			Cell::Atom(a) => a,
			_ => 0,
		}
	}

	pub fn id32(&self) -> u32 {
		match *self {
			Cell::Id32(v) | Cell::Sid(v) => v,
			_ => 0,
		}
	}

	pub fn sid(&self) -> Sid {
		match *self {
			Cell::Sid(v) | Cell::Id32(v) => v,
			_ => 0,
		}
	}

	pub fn int32(&self) -> i32 {
		match *self {
			Cell::Int32(v) => v,
			_ => 0,
		}
	}

	pub fn uint8(&self) -> u8 {
		match *self {
			Cell::UInt8(v) => v,
			_ => 0,
		}
	}

	pub fn uint32(&self) -> u32 {
		match *self {
			Cell::UInt32(v) => v,
			_ => 0,
		}
	}

	pub fn bool(&self) -> bool {
		match *self {
			Cell::Bool(v) => v,
			_ => false,
		}
	}

	pub fn uuid(&self) -> Option<Uuid> {
		match *self {
			Cell::Uuid(u) => Some(u),
			_ => None,
		}
	}

	pub fn date_time(&self) -> Option<NaiveDateTime> {
		match *self {
			Cell::DateTime(dt) => Some(dt),
			_ => None,
		}
	}

	/// Byte content of the string and blob families.
	pub fn arr(&self) -> &[u8] {
		match *self {
			Cell::Latin1(ref v) | Cell::Ascii(ref v) | Cell::Bml(ref v)
				| Cell::Image(ref v) | Cell::Lob(ref v) => v,
			Cell::Str(ref s) | Cell::Html(ref s) | Cell::Xml(ref s) => s.as_bytes(),
			_ => &[],
		}
	}

	pub fn is_oid(&self) -> bool {
		self.tag() == TAG_OID
	}

	pub fn is_rid(&self) -> bool {
		self.tag() == TAG_RID
	}

	pub fn is_uuid(&self) -> bool {
		self.tag() == TAG_UUID
	}

	/// Append the serialized form (tag byte plus payload).
	pub fn write_to(&self, out: &mut Vec<u8>) {
		out.push(self.tag());
		match *self {
			Cell::Null => {},
			Cell::Bool(v) => out.push(if v { 1 } else { 0 }),
			Cell::Int8(v) => out.push((v as u8) ^ 0x80),
			Cell::Int32(v) => push_u32(out, (v as u32) ^ 0x8000_0000),
			Cell::Int64(v) => push_u64(out, (v as u64) ^ 0x8000_0000_0000_0000),
			Cell::UInt8(v) => out.push(v),
			Cell::UInt32(v) => push_u32(out, v),
			Cell::UInt64(v) => push_u64(out, v),
			Cell::Atom(v) => push_u32(out, v),
			Cell::Oid(v) => push_u64(out, v),
			Cell::Rid(v) => push_u64(out, v),
			Cell::Sid(v) => push_u32(out, v),
			Cell::Id32(v) => push_u32(out, v),
			Cell::Id64(v) => push_u64(out, v),
			Cell::Uuid(ref u) => out.extend_from_slice(u.as_bytes()),
			Cell::DateTime(ref dt) => {
				let millis = dt.timestamp() * 1000 + dt.timestamp_subsec_millis() as i64;
				push_u64(out, (millis as u64) ^ 0x8000_0000_0000_0000);
			},
			Cell::Latin1(ref v) | Cell::Ascii(ref v) | Cell::Bml(ref v)
				| Cell::Image(ref v) | Cell::Lob(ref v) => {
				codec::write_multibyte64(out, v.len() as u64);
				out.extend_from_slice(v);
			},
			Cell::Str(ref s) | Cell::Html(ref s) | Cell::Xml(ref s) => {
				codec::write_multibyte64(out, s.len() as u64);
				out.extend_from_slice(s.as_bytes());
			},
		}
	}

	/// Serialized form as an owned byte string.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut out = Vec::new();
		self.write_to(&mut out);
		out
	}

	/// Parse one cell from the front of `buf`; returns the cell and the
	/// number of bytes consumed.
	pub fn read_from(buf: &[u8]) -> Result<(Cell, usize)> {
		if buf.is_empty() {
			bail!(ErrorKind::RecordFormat("empty cell"));
		}
		let tag = buf[0];
		let body = &buf[1..];
		let (cell, used) = match tag {
			TAG_NULL => (Cell::Null, 0),
			TAG_BOOL => (Cell::Bool(*body.get(0).ok_or(ErrorKind::RecordFormat("truncated cell"))? != 0), 1),
			TAG_INT8 => (Cell::Int8((*body.get(0).ok_or(ErrorKind::RecordFormat("truncated cell"))? ^ 0x80) as i8), 1),
			TAG_INT32 => (Cell::Int32((take_u32(body)? ^ 0x8000_0000) as i32), 4),
			TAG_INT64 => (Cell::Int64((take_u64(body)? ^ 0x8000_0000_0000_0000) as i64), 8),
			TAG_UINT8 => (Cell::UInt8(*body.get(0).ok_or(ErrorKind::RecordFormat("truncated cell"))?), 1),
			TAG_UINT32 => (Cell::UInt32(take_u32(body)?), 4),
			TAG_UINT64 => (Cell::UInt64(take_u64(body)?), 8),
			TAG_ATOM => (Cell::Atom(take_u32(body)?), 4),
			TAG_OID => (Cell::Oid(take_u64(body)?), 8),
			TAG_RID => (Cell::Rid(take_u64(body)?), 8),
			TAG_SID => (Cell::Sid(take_u32(body)?), 4),
			TAG_ID32 => (Cell::Id32(take_u32(body)?), 4),
			TAG_ID64 => (Cell::Id64(take_u64(body)?), 8),
			TAG_UUID => {
				if body.len() < 16 {
					bail!(ErrorKind::RecordFormat("truncated cell"));
				}
				let u = Uuid::from_bytes(&body[..16])
					.map_err(|_| ErrorKind::RecordFormat("bad uuid"))?;
				(Cell::Uuid(u), 16)
			},
			TAG_DATETIME => {
				let millis = (take_u64(body)? ^ 0x8000_0000_0000_0000) as i64;
				let secs = millis.div_euclid(1000);
				let nanos = (millis.rem_euclid(1000) * 1_000_000) as u32;
				let dt = NaiveDateTime::from_timestamp_opt(secs, nanos)
					.ok_or(ErrorKind::RecordFormat("bad date-time"))?;
				(Cell::DateTime(dt), 8)
			},
			TAG_LATIN1 | TAG_ASCII | TAG_STRING | TAG_HTML | TAG_XML
				| TAG_BML | TAG_IMAGE | TAG_LOB => {
				let (len, lensz) = codec::read_multibyte64(body)?;
				let len = len as usize;
				if body.len() < lensz + len {
					bail!(ErrorKind::RecordFormat("truncated cell"));
				}
				let bytes = body[lensz..lensz + len].to_vec();
				let cell = match tag {
					TAG_LATIN1 => Cell::Latin1(bytes),
					TAG_ASCII => Cell::Ascii(bytes),
					TAG_BML => Cell::Bml(bytes),
					TAG_IMAGE => Cell::Image(bytes),
					TAG_LOB => Cell::Lob(bytes),
					_ => {
						let s = String::from_utf8(bytes)
							.map_err(|_| ErrorKind::RecordFormat("invalid utf-8"))?;
						match tag {
							TAG_HTML => Cell::Html(s),
							TAG_XML => Cell::Xml(s),
							_ => Cell::Str(s),
						}
					},
				};
				(cell, lensz + len)
			},
			_ => bail!(ErrorKind::RecordFormat("unknown cell tag")),
		};
		Ok((cell, 1 + used))
	}

	/// Parse a cell from the front of `buf`, ignoring any trailing bytes.
	pub fn from_bytes(buf: &[u8]) -> Result<Cell> {
		Cell::read_from(buf).map(|(cell, _)| cell)
	}

	/// Human-readable rendering for diagnostic dumps.
	pub fn pretty(&self) -> String {
		match *self {
			Cell::Null => "null".into(),
			Cell::Bool(v) => format!("bool({})", v),
			Cell::Int8(v) => format!("i8({})", v),
			Cell::Int32(v) => format!("i32({})", v),
			Cell::Int64(v) => format!("i64({})", v),
			Cell::UInt8(v) => format!("u8({})", v),
			Cell::UInt32(v) => format!("u32({})", v),
			Cell::UInt64(v) => format!("u64({})", v),
			Cell::Atom(v) => format!("atom({})", v),
			Cell::Oid(v) => format!("oid({})", v),
			Cell::Rid(v) => format!("rid({})", v),
			Cell::Sid(v) => format!("sid({})", v),
			Cell::Id32(v) => format!("id32({})", v),
			Cell::Id64(v) => format!("id64({})", v),
			Cell::Uuid(ref u) => format!("uuid({})", u),
			Cell::DateTime(ref dt) => format!("datetime({})", dt),
			Cell::Latin1(ref v) | Cell::Ascii(ref v) =>
				format!("\"{}\"", String::from_utf8_lossy(v)),
			Cell::Str(ref s) => format!("\"{}\"", s),
			Cell::Html(ref s) => format!("html({} bytes)", s.len()),
			Cell::Xml(ref s) => format!("xml({} bytes)", s.len()),
			Cell::Bml(ref v) => format!("bml({} bytes)", v.len()),
			Cell::Image(ref v) => format!("image({} bytes)", v.len()),
			Cell::Lob(ref v) => format!("lob({} bytes)", v.len()),
		}
	}
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
	let mut buf = [0u8; 4];
	BigEndian::write_u32(&mut buf, v);
	out.extend_from_slice(&buf);
}

fn push_u64(out: &mut Vec<u8>, v: u64) {
	let mut buf = [0u8; 8];
	BigEndian::write_u64(&mut buf, v);
	out.extend_from_slice(&buf);
}

fn take_u32(body: &[u8]) -> Result<u32> {
	if body.len() < 4 {
		bail!(ErrorKind::RecordFormat("truncated cell"));
	}
	Ok(BigEndian::read_u32(&body[..4]))
}

fn take_u64(body: &[u8]) -> Result<u64> {
	if body.len() < 8 {
		bail!(ErrorKind::RecordFormat("truncated cell"));
	}
	Ok(BigEndian::read_u64(&body[..8]))
}
