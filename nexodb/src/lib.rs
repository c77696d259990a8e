//! Embedded single-file object/graph database
//!
//! Assumptions:
//!
//! - one file holds a typed graph of objects, relations and list elements
//!
//! - records are maps from interned names (atoms) to polymorphic cells
//!
//! - all mutation goes through a transaction with copy-on-write record
//!   shadows; the first write locks a record against other transactions
//!
//! - commit is atomic: record rows, queue/map rows and secondary index
//!   entries reach the store together, then observers are notified
//!
//! - secondary indexes (value, unique, fulltext) are maintained from
//!   field changes; removes use the pre-image, inserts the post-image
//!
//! The persistent layout is a family of ordered sub-trees in one file:
//!
//! ```text
//!  objTable   dirTable   idxTable    queTable     mapTable   strTable
//!   /          /          /           /            /          /
//! |records|  |atoms|    |indexes|   |queues|     |maps|     |streams|
//! ```
//!
//! Object graph structure (ownership, relation chains, element lists) is
//! encoded in reserved record fields as doubly-linked lists; the graph
//! handles (`Obj`, `Rel`, `Lit`, `Qit`, `Mit`, `Idx`) are thin views over
//! a record and a transaction.

extern crate byteorder;
extern crate chrono;
#[macro_use]
extern crate error_chain;
extern crate fs2;
extern crate hex_slice;
extern crate memmap;
extern crate parking_lot;
extern crate tiny_keccak;
extern crate unicode_normalization;
extern crate uuid;
#[cfg(test)]
#[macro_use]
extern crate matches;
#[cfg(test)]
#[macro_use]
extern crate quickcheck;

mod cell;
mod codec;
mod database;
mod error;
mod index;
mod lit;
mod mime;
mod mit;
mod obj;
mod orl;
mod qit;
mod record;
mod rel;
mod store;
mod streams;
mod transaction;
mod update;

pub use chrono::NaiveDateTime;
pub use uuid::Uuid;

pub use cell::{Atom, Cell, Index, Oid, Sid};
pub use database::Database;
pub use error::{Error, ErrorKind, Result};
pub use index::{Collation, Idx, IndexItem, IndexKind, IndexMeta};
pub use lit::Lit;
pub use mime::{mime_for_suffix, suffix_for_mime};
pub use mit::Mit;
pub use obj::Obj;
pub use orl::Orl;
pub use qit::Qit;
pub use record::{field, RecordType, MIN_RESERVED_FIELD};
pub use rel::Rel;
pub use streams::{DbStream, StreamMeta};
pub use transaction::Transaction;
pub use update::{Place, Side, UpdateInfo, UpdateKind};
