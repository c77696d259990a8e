#![allow(unknown_lints)]
#![allow(missing_docs)]

use std::io;
use std::path::PathBuf;

error_chain! {
	foreign_links {
		Io(io::Error);
	}

	errors {
		OpenDbFile(path: PathBuf, msg: String) {
			description("Cannot open database file"),
			display("Cannot open database file at {}. {}", path.display(), msg),
		}
		StartTrans {
			description("Cannot start write transaction"),
		}
		CommitTrans {
			description("Cannot commit write transaction"),
		}
		NotInTransaction {
			description("Operation requires an open transaction"),
		}
		AccessMeta(msg: String) {
			description("Invalid meta record"),
			display("Invalid meta record: {}", msg),
		}
		CreateTable {
			description("Cannot create table"),
		}
		RemoveTable {
			description("Cannot remove table"),
		}
		ClearTable {
			description("Cannot clear table"),
		}
		CreateBtCursor {
			description("Cannot open cursor on table"),
		}
		AccessCursor(msg: &'static str) {
			description("Invalid cursor access"),
			display("Invalid cursor access: {}", msg),
		}
		AccessDatabase {
			description("Database is not open"),
		}
		RecordFormat(msg: &'static str) {
			description("Malformed record"),
			display("Malformed record: {}", msg),
		}
		UnknownId(id: u64) {
			description("No record with this id"),
			display("No record with id {}", id),
		}
		AccessRecord {
			description("Access through a null handle"),
		}
		ReservedName {
			description("Atom is in the reserved range"),
		}
		WrongType {
			description("Record has a different type"),
		}
		RecordLocked {
			description("Record is locked by another transaction"),
		}
		RecordDeleted {
			description("Record has been deleted"),
		}
		AtomClash {
			description("Name or atom already bound differently"),
		}
		WrongContext {
			description("Target belongs to a different list"),
		}
		InvalidArgument {
			description("Invalid argument"),
		}
		SelfRelation {
			description("Relation endpoints must differ here"),
		}
		StreamsDir(msg: &'static str) {
			description("Cannot access streams directory"),
			display("Cannot access streams directory: {}", msg),
		}
		StreamFile(msg: &'static str) {
			description("Cannot access stream file"),
			display("Cannot access stream file: {}", msg),
		}
		IndexExists {
			description("An index with this name exists"),
		}
		Duplicate {
			description("Value is already taken"),
		}
	}
}

impl PartialEq for ErrorKind {
	fn eq(&self, other: &Self) -> bool {
		use self::ErrorKind::*;

		match (self, other) {
			(&StartTrans, &StartTrans) => true,
			(&CommitTrans, &CommitTrans) => true,
			(&NotInTransaction, &NotInTransaction) => true,
			(&CreateTable, &CreateTable) => true,
			(&RemoveTable, &RemoveTable) => true,
			(&ClearTable, &ClearTable) => true,
			(&CreateBtCursor, &CreateBtCursor) => true,
			(&AccessDatabase, &AccessDatabase) => true,
			(&AccessRecord, &AccessRecord) => true,
			(&ReservedName, &ReservedName) => true,
			(&WrongType, &WrongType) => true,
			(&RecordLocked, &RecordLocked) => true,
			(&RecordDeleted, &RecordDeleted) => true,
			(&AtomClash, &AtomClash) => true,
			(&WrongContext, &WrongContext) => true,
			(&InvalidArgument, &InvalidArgument) => true,
			(&SelfRelation, &SelfRelation) => true,
			(&IndexExists, &IndexExists) => true,
			(&Duplicate, &Duplicate) => true,
			(&UnknownId(a), &UnknownId(b)) if a == b => true,
			(&RecordFormat(a), &RecordFormat(b)) if a == b => true,
			_ => false,
		}
	}
}
