// run with `cargo bench --features nightly` on a nightly toolchain
#![cfg(feature = "nightly")]
#![cfg_attr(feature = "nightly", feature(test))]

extern crate test;

extern crate nexodb;
extern crate rand;
extern crate tempdir;

use test::Bencher;
use rand::{Rng, SeedableRng, StdRng};
use tempdir::TempDir;
use nexodb::{Cell, Database, IndexItem, IndexKind, IndexMeta};

const NAME: u32 = 42;

fn fill(db: &Database, n: u32) -> Vec<u64> {
	let mut rng = StdRng::from_seed(&[1, 9, 4]);
	let txn = db.transaction();
	let mut oids = Vec::with_capacity(n as usize);
	for _ in 0..n {
		let obj = txn.create_object(1).unwrap();
		let name: String = rng.gen_ascii_chars().take(12).collect();
		obj.set_value(NAME, Cell::Str(name)).unwrap();
		oids.push(obj.oid());
	}
	txn.commit().unwrap();
	oids
}

/// benchmarks creating and committing a single object into a database of
/// `n` entries
fn benchmark_create_object(b: &mut Bencher, n: u32) {
	let temp = TempDir::new("nexodb_create").unwrap();
	let db = Database::open(temp.path().join("bench.ndb")).unwrap();
	fill(&db, n);

	let txn = db.transaction();
	b.iter(|| {
		let obj = txn.create_object(1).unwrap();
		obj.set_value(NAME, Cell::Str("benched".into())).unwrap();
		txn.commit().unwrap();
	});
}

#[bench]
fn create_object_into_100(b: &mut Bencher) {
	benchmark_create_object(b, 100);
}

#[bench]
fn create_object_into_1000(b: &mut Bencher) {
	benchmark_create_object(b, 1000);
}

/// benchmarks a field read through the transaction layer
#[bench]
fn read_field(b: &mut Bencher) {
	let temp = TempDir::new("nexodb_read_field").unwrap();
	let db = Database::open(temp.path().join("bench.ndb")).unwrap();
	let oids = fill(&db, 1000);

	let txn = db.transaction();
	let obj = txn.get_object(oids[500]).unwrap().unwrap();
	b.iter(|| {
		test::black_box(obj.value(NAME).unwrap());
	});
}

/// benchmarks a single iteration step over a value index of `n` entries
fn benchmark_index_step(b: &mut Bencher, n: u32) {
	let temp = TempDir::new("nexodb_index_step").unwrap();
	let db = Database::open(temp.path().join("bench.ndb")).unwrap();
	let mut meta = IndexMeta::new(IndexKind::Value);
	meta.items.push(IndexItem::new(NAME));
	db.create_index(b"byName", &meta).unwrap();
	fill(&db, n);

	let txn = db.transaction();
	let mut idx = txn.find_index(b"byName").unwrap().unwrap();
	assert!(idx.first().unwrap());
	b.iter(|| {
		if !idx.next().unwrap() {
			assert!(idx.first().unwrap());
		}
	});
}

#[bench]
fn index_step_over_100(b: &mut Bencher) {
	benchmark_index_step(b, 100);
}

#[bench]
fn index_step_over_1000(b: &mut Bencher) {
	benchmark_index_step(b, 1000);
}
