//! External streams.
//!
//! Stream payloads are plain files named after their sid in a sibling
//! `<dbname>.streams` directory; only the metadata lives in the store.
//! Locking is in memory: one writer or any number of readers per sid.
//! Streams are deliberately outside the transactional state; writers
//! announce themselves with a `StreamChanged` notification on unlock.

use std::fmt;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};

use chrono::NaiveDateTime;

use cell::{Cell, Sid};
use codec::{Reader, Token, Writer};
use database::Database;
use error::{ErrorKind, Result};
use update::{UpdateInfo, UpdateKind};

/// Descriptive metadata of one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMeta {
	/// Mime type, e.g. `application/pdf`.
	pub mime_type: Vec<u8>,
	/// Character encoding per the IANA registry, e.g. `UTF-8`.
	pub encoding: Vec<u8>,
	/// `language_country` per ISO 639 / ISO 3166.
	pub locale: Vec<u8>,
	/// File suffix, e.g. `pdf`.
	pub suffix: Vec<u8>,
	pub gzipped: bool,
	pub crypted: bool,
	pub last_use: Option<NaiveDateTime>,
	pub use_count: u32,
}

impl StreamMeta {
	pub fn new() -> StreamMeta {
		StreamMeta {
			mime_type: Vec::new(),
			encoding: Vec::new(),
			locale: Vec::new(),
			suffix: Vec::new(),
			gzipped: false,
			crypted: false,
			last_use: None,
			use_count: 0,
		}
	}

	pub(crate) fn serialize(&self) -> Vec<u8> {
		let mut w = Writer::new();
		w.write_named_slot(&tag("enc"), &Cell::Ascii(self.encoding.clone()));
		w.write_named_slot(&tag("mime"), &Cell::Ascii(self.mime_type.clone()));
		w.write_named_slot(&tag("suff"), &Cell::Ascii(self.suffix.clone()));
		w.write_named_slot(&tag("loc"), &Cell::Ascii(self.locale.clone()));
		if let Some(last_use) = self.last_use {
			w.write_named_slot(&tag("lu"), &Cell::DateTime(last_use));
		}
		w.write_named_slot(&tag("uc"), &Cell::UInt32(self.use_count));
		w.write_named_slot(&tag("gzip"), &Cell::Bool(self.gzipped));
		w.write_named_slot(&tag("cryp"), &Cell::Bool(self.crypted));
		w.into_bytes()
	}

	pub(crate) fn deserialize(buf: &[u8]) -> Result<StreamMeta> {
		let mut meta = StreamMeta::new();
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
						b"enc" => meta.encoding = value.arr().to_vec(),
						b"mime" => meta.mime_type = value.arr().to_vec(),
						b"suff" => meta.suffix = value.arr().to_vec(),
						b"loc" => meta.locale = value.arr().to_vec(),
						b"lu" => meta.last_use = value.date_time(),
						b"uc" => meta.use_count = value.uint32(),
						b"gzip" => meta.gzipped = value.bool(),
						b"cryp" => meta.crypted = value.bool(),
						_ => {},
					}
				},
				_ => bail!(ErrorKind::AccessMeta("invalid stream meta format".into())),
			}
		}
		Ok(meta)
	}
}

fn tag(name: &str) -> Cell {
	Cell::Ascii(name.as_bytes().to_vec())
}

/// Reader or writer over one stream file. Dropping the handle releases
/// the lock; a writer additionally notifies `StreamChanged`.
pub struct DbStream {
	db: Database,
	sid: Sid,
	file: Option<fs::File>,
	writing: bool,
}

impl fmt::Debug for DbStream {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("DbStream")
			.field("sid", &self.sid)
			.field("writing", &self.writing)
			.finish()
	}
}

impl DbStream {
	/// Allocate a sid, persist the metadata and open the stream file for
	/// writing.
	pub(crate) fn create(db: &Database, mut meta: StreamMeta) -> Result<DbStream> {
		let sid = db.state().next_sid()?;
		meta.use_count = 0;
		db.state().save_stream_meta(sid, &meta)?;
		let locked = db.state().lock_stream(sid, true)?;
		debug_assert!(locked, "fresh sid cannot be locked");

		let dir = db.streams_dir()?;
		let file = fs::OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.open(dir.join(sid.to_string()));
		match file {
			Ok(file) => Ok(DbStream {
				db: db.clone(),
				sid,
				file: Some(file),
				writing: true,
			}),
			Err(_) => {
				db.state().unlock_stream(sid);
				bail!(ErrorKind::StreamFile("cannot open for writing"))
			},
		}
	}

	/// Open an existing stream. Yields nothing when the requested lock is
	/// unavailable; an unknown sid is an error.
	pub(crate) fn open(db: &Database, sid: Sid, writing: bool) -> Result<Option<DbStream>> {
		if db.state().load_stream_meta(sid)?.is_none() {
			bail!(ErrorKind::StreamFile("invalid sid"));
		}
		if !db.state().lock_stream(sid, writing)? {
			return Ok(None);
		}
		let dir = db.streams_dir()?;
		let path = dir.join(sid.to_string());
		let file = if writing {
			fs::OpenOptions::new().write(true).create(true).open(&path)
		} else {
			fs::File::open(&path)
		};
		match file {
			Ok(file) => Ok(Some(DbStream {
				db: db.clone(),
				sid,
				file: Some(file),
				writing,
			})),
			Err(_) => {
				db.state().unlock_stream(sid);
				bail!(ErrorKind::StreamFile("cannot open stream file"))
			},
		}
	}

	pub fn sid(&self) -> Sid {
		self.sid
	}

	pub fn meta(&self) -> Result<StreamMeta> {
		Ok(self.db.state().load_stream_meta(self.sid)?.unwrap_or_else(StreamMeta::new))
	}

	/// Release the lock. Writers notify observers that the stream
	/// changed.
	pub fn close(&mut self) {
		if self.file.take().is_none() {
			return;
		}
		let was_writer = {
			let mut state = self.db.state();
			let was_writer = state.is_stream_write_locked(self.sid);
			state.unlock_stream(self.sid);
			was_writer
		};
		if was_writer {
			let mut info = UpdateInfo::new(UpdateKind::StreamChanged);
			info.id = self.sid as u64;
			self.db.emit(&info);
		}
	}

	/// Delete the stream: its file and its metadata row. Writers only.
	pub fn erase(mut self) -> Result<()> {
		if !self.writing {
			bail!(ErrorKind::StreamFile("erase requires a write stream"));
		}
		let path = self.db.streams_dir()?.join(self.sid.to_string());
		self.file.take();
		let _ = fs::remove_file(path);
		{
			let mut state = self.db.state();
			state.erase_stream_meta(self.sid)?;
			state.unlock_stream(self.sid);
		}
		let mut info = UpdateInfo::new(UpdateKind::StreamChanged);
		info.id = self.sid as u64;
		self.db.emit(&info);
		Ok(())
	}

	pub fn copy_from<R: Read>(&mut self, source: &mut R) -> Result<u64> {
		let file = self.file.as_mut().ok_or(ErrorKind::StreamFile("stream is closed"))?;
		Ok(io::copy(source, file)?)
	}

	pub fn copy_to<W: Write>(&mut self, sink: &mut W) -> Result<u64> {
		let file = self.file.as_mut().ok_or(ErrorKind::StreamFile("stream is closed"))?;
		file.seek(SeekFrom::Start(0))?;
		Ok(io::copy(file, sink)?)
	}
}

impl Read for DbStream {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		match self.file {
			Some(ref mut file) => file.read(buf),
			None => Ok(0),
		}
	}
}

impl Write for DbStream {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.file {
			Some(ref mut file) => file.write(buf),
			None => Err(io::Error::new(io::ErrorKind::NotConnected, "stream is closed")),
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.file {
			Some(ref mut file) => file.flush(),
			None => Ok(()),
		}
	}
}

impl Seek for DbStream {
	fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
		match self.file {
			Some(ref mut file) => file.seek(pos),
			None => Err(io::Error::new(io::ErrorKind::NotConnected, "stream is closed")),
		}
	}
}

impl Drop for DbStream {
	fn drop(&mut self) {
		self.close();
	}
}
