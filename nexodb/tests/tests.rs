extern crate nexodb;
#[macro_use]
extern crate matches;
extern crate tempdir;

use std::io::{Read, Write};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use tempdir::TempDir;
use nexodb::{
	Cell, Collation, Database, ErrorKind, IndexItem, IndexKind, IndexMeta,
	Obj, Place, Side, StreamMeta, UpdateInfo, UpdateKind, Uuid,
};

const NAME: u32 = 42;
const SORT: u32 = 43;
const TEXT: u32 = 60;

fn open_db(name: &str) -> (TempDir, Database) {
	let temp = TempDir::new(name).unwrap();
	let db = Database::open(temp.path().join("graph.ndb")).unwrap();
	(temp, db)
}

fn collect_events(db: &Database) -> Arc<Mutex<Vec<UpdateInfo>>> {
	let events: Arc<Mutex<Vec<UpdateInfo>>> = Arc::new(Mutex::new(Vec::new()));
	let sink = events.clone();
	db.add_observer(Box::new(move |info| {
		sink.lock().unwrap().push(*info);
	}));
	events
}

fn child_ids(owner: &Obj) -> Vec<u64> {
	let mut ids = Vec::new();
	if let Some(mut cur) = owner.first_obj().unwrap() {
		loop {
			ids.push(cur.oid());
			if !cur.next().unwrap() {
				break;
			}
		}
	}
	ids
}

fn elem_values(owner: &Obj) -> Vec<Cell> {
	let mut values = Vec::new();
	if let Some(mut cur) = owner.first_elem().unwrap() {
		loop {
			values.push(cur.value().unwrap());
			if !cur.next().unwrap() {
				break;
			}
		}
	}
	values
}

fn elem_values_reverse(owner: &Obj) -> Vec<Cell> {
	let mut values = Vec::new();
	if let Some(mut cur) = owner.last_elem().unwrap() {
		loop {
			values.push(cur.value().unwrap());
			if !cur.prev().unwrap() {
				break;
			}
		}
	}
	values
}

#[test]
fn typed_object_roundtrips_across_transactions() {
	let (_temp, db) = open_db("typed_object_roundtrips");
	let events = collect_events(&db);

	let oid = {
		let t1 = db.transaction();
		let obj = t1.create_object(7).unwrap();
		obj.set_value(NAME, Cell::Str("hello".into())).unwrap();
		t1.commit().unwrap();
		obj.oid()
	};

	let t2 = db.transaction();
	let obj = t2.get_object(oid).unwrap().unwrap();
	assert_eq!(obj.typ().unwrap(), 7);
	assert_eq!(obj.value(NAME).unwrap(), Cell::Str("hello".into()));
	assert!(obj.has_value(NAME).unwrap());
	assert!(!obj.has_value(SORT).unwrap());
	assert!(obj.names().unwrap().contains(&NAME));

	let orl = t2.get_orl(oid).unwrap().unwrap();
	assert!(orl.is_object() && !orl.is_relation());
	assert_eq!(orl.to_cell(), Cell::Oid(oid));

	let events = events.lock().unwrap();
	assert_eq!(events.len(), 2);
	assert_eq!(events[0].kind, UpdateKind::ObjectCreated);
	assert_eq!(events[0].id, oid);
	assert_eq!(events[0].name, 7);
	assert_eq!(events[1].kind, UpdateKind::ValueChanged);
	assert_eq!(events[1].id, oid);
	assert_eq!(events[1].name, NAME);
}

#[test]
fn uncommitted_values_stay_invisible_to_other_transactions() {
	let (_temp, db) = open_db("uncommitted_values_stay_invisible");
	let oid = {
		let txn = db.transaction();
		let obj = txn.create_object(0).unwrap();
		obj.set_value(NAME, Cell::Str("committed".into())).unwrap();
		txn.commit().unwrap();
		obj.oid()
	};

	let t1 = db.transaction();
	let o1 = t1.get_object(oid).unwrap().unwrap();
	o1.set_value(NAME, Cell::Str("pending".into())).unwrap();
	assert_eq!(o1.value(NAME).unwrap(), Cell::Str("pending".into()));

	// t2 reads concurrently and only sees committed state
	let t2 = db.transaction();
	let o2 = t2.get_object(oid).unwrap().unwrap();
	assert_eq!(o2.value(NAME).unwrap(), Cell::Str("committed".into()));

	t1.rollback();
	assert_eq!(o1.value(NAME).unwrap(), Cell::Str("committed".into()));
}

#[test]
fn element_list_keeps_order_and_survives_erase() {
	let (_temp, db) = open_db("element_list_keeps_order");
	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.append_elem(Cell::Str("a".into())).unwrap();
	obj.append_elem(Cell::Str("b".into())).unwrap();
	obj.append_elem(Cell::Str("c".into())).unwrap();
	txn.commit().unwrap();

	assert_eq!(elem_values(&obj), vec![
		Cell::Str("a".into()), Cell::Str("b".into()), Cell::Str("c".into()),
	]);
	assert_eq!(elem_values_reverse(&obj), vec![
		Cell::Str("c".into()), Cell::Str("b".into()), Cell::Str("a".into()),
	]);

	// erase the middle element; the chain closes around it
	let mut middle = obj.first_elem().unwrap().unwrap();
	assert!(middle.next().unwrap());
	let replace = middle.erase().unwrap().unwrap();
	assert_eq!(replace.value().unwrap(), Cell::Str("c".into()));
	txn.commit().unwrap();

	assert_eq!(elem_values(&obj), vec![Cell::Str("a".into()), Cell::Str("c".into())]);
	assert_eq!(elem_values_reverse(&obj), vec![Cell::Str("c".into()), Cell::Str("a".into())]);

	let first = obj.first_elem().unwrap().unwrap();
	let last = obj.last_elem().unwrap().unwrap();
	let mut step = first.clone();
	assert!(step.next().unwrap());
	assert!(step.equals(&last));
	let mut back = last.clone();
	assert!(back.prev().unwrap());
	assert!(back.equals(&first));
}

#[test]
fn prepend_and_insert_position_elements() {
	let (_temp, db) = open_db("prepend_and_insert");
	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.append_elem(Cell::Str("b".into())).unwrap();
	obj.prepend_elem(Cell::Str("a".into())).unwrap();
	let last = obj.append_elem(Cell::Str("d".into())).unwrap();
	last.insert_before(Cell::Str("c".into())).unwrap();
	txn.commit().unwrap();

	assert_eq!(elem_values(&obj), vec![
		Cell::Str("a".into()), Cell::Str("b".into()),
		Cell::Str("c".into()), Cell::Str("d".into()),
	]);
}

#[test]
fn element_move_before_rewires_the_chain() {
	let (_temp, db) = open_db("element_move_before");
	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.append_elem(Cell::Str("a".into())).unwrap();
	obj.append_elem(Cell::Str("b".into())).unwrap();
	obj.append_elem(Cell::Str("c".into())).unwrap();

	// move the last element to the front
	let target = obj.first_elem().unwrap().unwrap();
	let last = obj.last_elem().unwrap().unwrap();
	last.move_before(Some(&target)).unwrap();
	assert_eq!(elem_values(&obj), vec![
		Cell::Str("c".into()), Cell::Str("a".into()), Cell::Str("b".into()),
	]);

	// and the (new) first one to the end
	let first = obj.first_elem().unwrap().unwrap();
	first.move_before(None).unwrap();
	txn.commit().unwrap();
	assert_eq!(elem_values(&obj), vec![
		Cell::Str("a".into()), Cell::Str("b".into()), Cell::Str("c".into()),
	]);
}

#[test]
fn relations_thread_both_endpoint_lists() {
	let (_temp, db) = open_db("relations_thread_endpoints");
	let events = collect_events(&db);
	let txn = db.transaction();
	let o1 = txn.create_object(0).unwrap();
	let o2 = txn.create_object(0).unwrap();
	let rel = o1.relate_to(&o2, 9, true).unwrap();
	txn.commit().unwrap();

	assert_eq!(rel.source().unwrap(), o1.oid());
	assert_eq!(rel.target().unwrap(), o2.oid());
	assert_eq!(rel.typ().unwrap(), 9);
	assert!(rel.is_source(&o1).unwrap());
	assert!(rel.is_target(&o2).unwrap());

	let first1 = o1.first_rel().unwrap().unwrap();
	assert_eq!(first1.rid(), rel.rid());
	let first2 = o2.first_rel().unwrap().unwrap();
	assert_eq!(first2.rid(), rel.rid());

	let events = events.lock().unwrap();
	let adds: Vec<&UpdateInfo> = events.iter()
		.filter(|e| e.kind == UpdateKind::RelationAdded)
		.collect();
	assert_eq!(adds.len(), 2);
	assert_eq!(adds[0].id2, o1.oid());
	assert_eq!(adds[0].side, Side::Source);
	assert_eq!(adds[0].place, Place::First);
	assert_eq!(adds[1].id2, o2.oid());
	assert_eq!(adds[1].side, Side::Target);
}

#[test]
fn prepend_puts_relations_in_front() {
	let (_temp, db) = open_db("prepend_puts_relations_in_front");
	let txn = db.transaction();
	let o1 = txn.create_object(0).unwrap();
	let o2 = txn.create_object(0).unwrap();
	let r1 = o1.relate_to(&o2, 0, false).unwrap();
	let r2 = o1.relate_to(&o2, 0, true).unwrap();
	let r3 = o1.relate_to(&o2, 0, false).unwrap();
	txn.commit().unwrap();

	// r2 prepended, r1 in the middle, r3 appended
	let mut cur = o1.first_rel().unwrap().unwrap();
	assert_eq!(cur.rid(), r2.rid());
	assert!(cur.next(o1.oid()).unwrap());
	assert_eq!(cur.rid(), r1.rid());
	assert!(cur.next(o1.oid()).unwrap());
	assert_eq!(cur.rid(), r3.rid());
	assert!(!cur.next(o1.oid()).unwrap());

	// the same three relations thread o2's list through the target side
	let mut cur = o2.first_rel().unwrap().unwrap();
	let mut seen = vec![cur.rid()];
	while cur.next(o2.oid()).unwrap() {
		seen.push(cur.rid());
	}
	assert_eq!(seen, vec![r2.rid(), r1.rid(), r3.rid()]);
}

#[test]
fn reflexive_relation_appears_once() {
	let (_temp, db) = open_db("reflexive_relation_appears_once");
	let txn = db.transaction();
	let o1 = txn.create_object(0).unwrap();
	let rel = o1.relate_to(&o1, 0, true).unwrap();
	txn.commit().unwrap();

	assert_eq!(rel.source().unwrap(), o1.oid());
	assert_eq!(rel.target().unwrap(), o1.oid());
	assert_eq!(rel.value(nexodb::field::PREV_TARGET).unwrap(), Cell::Null);
	assert_eq!(rel.value(nexodb::field::NEXT_TARGET).unwrap(), Cell::Null);

	let mut cur = o1.first_rel().unwrap().unwrap();
	assert_eq!(cur.rid(), rel.rid());
	assert!(!cur.next(o1.oid()).unwrap());
}

#[test]
fn erasing_a_relation_repairs_both_chains() {
	let (_temp, db) = open_db("erasing_a_relation_repairs");
	let txn = db.transaction();
	let o1 = txn.create_object(0).unwrap();
	let o2 = txn.create_object(0).unwrap();
	let r1 = o1.relate_to(&o2, 0, false).unwrap();
	let r2 = o1.relate_to(&o2, 0, false).unwrap();
	let r3 = o1.relate_to(&o2, 0, false).unwrap();
	txn.commit().unwrap();

	r2.erase().unwrap();
	txn.commit().unwrap();

	let mut cur = o1.first_rel().unwrap().unwrap();
	assert_eq!(cur.rid(), r1.rid());
	assert!(cur.next(o1.oid()).unwrap());
	assert_eq!(cur.rid(), r3.rid());
	assert!(!cur.next(o1.oid()).unwrap());

	let last = o2.last_rel().unwrap().unwrap();
	assert_eq!(last.rid(), r3.rid());
	assert!(txn.get_relation(r2.rid()).unwrap().is_none());
}

#[test]
fn aggregation_builds_and_reorders_the_child_list() {
	let (_temp, db) = open_db("aggregation_builds_and_reorders");
	let txn = db.transaction();
	let owner = txn.create_object(0).unwrap();
	let a = owner.create_aggregate(0).unwrap();
	let b = owner.create_aggregate(0).unwrap();
	let c = owner.create_aggregate(0).unwrap();
	txn.commit().unwrap();

	assert_eq!(child_ids(&owner), vec![a.oid(), b.oid(), c.oid()]);
	assert_eq!(a.owner().unwrap().unwrap().oid(), owner.oid());
	assert_eq!(owner.last_obj().unwrap().unwrap().oid(), c.oid());

	c.move_before(Some(&a)).unwrap();
	assert_eq!(child_ids(&owner), vec![c.oid(), a.oid(), b.oid()]);

	c.move_before(None).unwrap();
	txn.commit().unwrap();
	assert_eq!(child_ids(&owner), vec![a.oid(), b.oid(), c.oid()]);

	b.deaggregate().unwrap();
	txn.commit().unwrap();
	assert_eq!(child_ids(&owner), vec![a.oid(), c.oid()]);
	assert!(b.owner().unwrap().is_none());
}

#[test]
fn move_before_rejects_foreign_targets() {
	let (_temp, db) = open_db("move_before_rejects_foreign");
	let txn = db.transaction();
	let owner1 = txn.create_object(0).unwrap();
	let owner2 = txn.create_object(0).unwrap();
	let child1 = owner1.create_aggregate(0).unwrap();
	let lonely = txn.create_object(0).unwrap();
	let _child2 = owner2.create_aggregate(0).unwrap();

	assert!(matches!(
		child1.move_before(Some(&lonely)).unwrap_err().kind(),
		&ErrorKind::WrongContext
	));
}

#[test]
fn erase_cascades_through_the_whole_subtree() {
	let (_temp, db) = open_db("erase_cascades");
	let txn = db.transaction();
	let root = txn.create_object(3).unwrap();
	let peer = txn.create_object(0).unwrap();
	let child = root.create_aggregate(0).unwrap();
	let elem = root.append_elem(Cell::Str("e".into())).unwrap();
	let rel = root.relate_to(&peer, 0, true).unwrap();
	txn.commit().unwrap();

	let root_id = root.oid();
	let child_id = child.oid();
	let elem_id = elem.bookmark();
	let rel_id = rel.rid();

	root.erase().unwrap();
	txn.commit().unwrap();

	let check = db.transaction();
	assert!(check.get_object(root_id).unwrap().is_none());
	assert!(check.get_object(child_id).unwrap().is_none());
	assert!(check.get_element(elem_id).unwrap().is_none());
	assert!(check.get_relation(rel_id).unwrap().is_none());
	let peer2 = check.get_object(peer.oid()).unwrap().unwrap();
	assert!(peer2.first_rel().unwrap().is_none());
}

#[test]
fn value_index_scans_in_nocase_order() {
	let (_temp, db) = open_db("value_index_scans");
	let mut meta = IndexMeta::new(IndexKind::Value);
	meta.items.push(IndexItem::new(NAME));
	db.create_index(b"byName", &meta).unwrap();

	let txn = db.transaction();
	let mut expect = Vec::new();
	for name in &["Bravo", "alpha", "Charlie"] {
		let obj = txn.create_object(0).unwrap();
		obj.set_value(NAME, Cell::Str((*name).into())).unwrap();
		expect.push((name.to_lowercase(), obj.oid()));
	}
	txn.commit().unwrap();
	expect.sort();

	let mut idx = txn.find_index(b"byName").unwrap().unwrap();
	let mut seen = Vec::new();
	assert!(idx.first().unwrap());
	loop {
		seen.push(idx.id().unwrap());
		if !idx.next().unwrap() {
			break;
		}
	}
	let expect_ids: Vec<u64> = expect.iter().map(|&(_, id)| id).collect();
	assert_eq!(seen, expect_ids);

	// point lookup through the same index
	assert!(idx.seek(&[Cell::Str("ALPHA".into())]).unwrap());
	assert_eq!(idx.id().unwrap(), expect_ids[0]);
	assert!(!idx.seek(&[Cell::Str("delta".into())]).unwrap());
}

#[test]
fn index_follows_value_updates() {
	let (_temp, db) = open_db("index_follows_value_updates");
	let mut meta = IndexMeta::new(IndexKind::Value);
	meta.items.push(IndexItem::new(NAME));
	db.create_index(b"byName", &meta).unwrap();

	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.set_value(NAME, Cell::Str("old".into())).unwrap();
	txn.commit().unwrap();

	obj.set_value(NAME, Cell::Str("new".into())).unwrap();
	txn.commit().unwrap();

	let mut idx = txn.find_index(b"byName").unwrap().unwrap();
	assert!(!idx.seek(&[Cell::Str("old".into())]).unwrap());
	assert!(idx.seek(&[Cell::Str("new".into())]).unwrap());
	assert_eq!(idx.id().unwrap(), obj.oid());

	// null removes the entry without a replacement
	obj.set_value(NAME, Cell::Null).unwrap();
	txn.commit().unwrap();
	assert!(!idx.seek(&[Cell::Str("new".into())]).unwrap());
}

#[test]
fn composite_index_skips_null_tuples() {
	let (_temp, db) = open_db("composite_index_skips_null");
	let mut meta = IndexMeta::new(IndexKind::Value);
	meta.items.push(IndexItem::new(NAME));
	meta.items.push(IndexItem::new(SORT));
	db.create_index(b"byNameSort", &meta).unwrap();

	let txn = db.transaction();
	let partial = txn.create_object(0).unwrap();
	partial.set_value(NAME, Cell::Str("x".into())).unwrap();
	let full = txn.create_object(0).unwrap();
	full.set_value(NAME, Cell::Str("x".into())).unwrap();
	full.set_value(SORT, Cell::UInt32(1)).unwrap();
	txn.commit().unwrap();

	let mut idx = txn.find_index(b"byNameSort").unwrap().unwrap();
	assert!(idx.first().unwrap());
	assert_eq!(idx.id().unwrap(), full.oid());
	assert!(!idx.next().unwrap());
}

#[test]
fn inverted_index_scans_descending() {
	let (_temp, db) = open_db("inverted_index_scans_descending");
	let mut meta = IndexMeta::new(IndexKind::Value);
	let mut item = IndexItem::new(SORT);
	item.invert = true;
	meta.items.push(item);
	db.create_index(b"bySortDesc", &meta).unwrap();

	let txn = db.transaction();
	let mut by_sort = Vec::new();
	for sort in &[5u32, 1, 9] {
		let obj = txn.create_object(0).unwrap();
		obj.set_value(SORT, Cell::UInt32(*sort)).unwrap();
		by_sort.push((*sort, obj.oid()));
	}
	txn.commit().unwrap();
	by_sort.sort();
	by_sort.reverse();

	let mut idx = txn.find_index(b"bySortDesc").unwrap().unwrap();
	let mut seen = Vec::new();
	assert!(idx.first().unwrap());
	loop {
		seen.push(idx.id().unwrap());
		if !idx.next().unwrap() {
			break;
		}
	}
	let expect: Vec<u64> = by_sort.iter().map(|&(_, id)| id).collect();
	assert_eq!(seen, expect);
}

#[test]
fn unique_index_refuses_duplicates() {
	let (_temp, db) = open_db("unique_index_refuses_duplicates");
	let mut meta = IndexMeta::new(IndexKind::Unique);
	meta.items.push(IndexItem::new(NAME));
	db.create_index(b"uniqueName", &meta).unwrap();

	let t1 = db.transaction();
	let first = t1.create_object(0).unwrap();
	first.set_value(NAME, Cell::Str("taken".into())).unwrap();
	t1.commit().unwrap();

	// same tuple from a later transaction
	let t2 = db.transaction();
	let second = t2.create_object(0).unwrap();
	second.set_value(NAME, Cell::Str("taken".into())).unwrap();
	assert!(matches!(t2.commit().unwrap_err().kind(), &ErrorKind::Duplicate));

	// the failed commit left no trace; the owner can still update itself
	let t3 = db.transaction();
	let still = t3.get_object(first.oid()).unwrap().unwrap();
	still.set_value(NAME, Cell::Str("taken".into())).unwrap();
	t3.commit().unwrap();

	// two claims within one commit collide as well
	let t4 = db.transaction();
	let a = t4.create_object(0).unwrap();
	a.set_value(NAME, Cell::Str("twice".into())).unwrap();
	let b = t4.create_object(0).unwrap();
	b.set_value(NAME, Cell::Str("twice".into())).unwrap();
	assert!(matches!(t4.commit().unwrap_err().kind(), &ErrorKind::Duplicate));
}

#[test]
fn fulltext_index_finds_tokens() {
	let (_temp, db) = open_db("fulltext_index_finds_tokens");
	let mut meta = IndexMeta::new(IndexKind::Fulltext);
	meta.items.push(IndexItem::new(TEXT));
	db.create_index(b"text", &meta).unwrap();

	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.set_value(TEXT, Cell::Str("The Quick brown fox".into())).unwrap();
	txn.commit().unwrap();

	let mut idx = txn.find_index(b"text").unwrap().unwrap();
	assert!(idx.seek(&[Cell::Str("quick".into())]).unwrap());
	assert_eq!(idx.id().unwrap(), obj.oid());
	assert!(idx.seek(&[Cell::Str("fox".into())]).unwrap());
	assert!(!idx.seek(&[Cell::Str("dog".into())]).unwrap());

	// replacing the text retires the old tokens
	obj.set_value(TEXT, Cell::Str("lazy dog".into())).unwrap();
	txn.commit().unwrap();
	assert!(!idx.seek(&[Cell::Str("quick".into())]).unwrap());
	assert!(idx.seek(&[Cell::Str("dog".into())]).unwrap());
}

#[test]
fn collated_index_treats_accents_as_base_letters() {
	let (_temp, db) = open_db("collated_index");
	let mut meta = IndexMeta::new(IndexKind::Value);
	let mut item = IndexItem::new(NAME);
	item.coll = Collation::NfkdCanonicalBase;
	meta.items.push(item);
	db.create_index(b"collated", &meta).unwrap();

	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.set_value(NAME, Cell::Str("Café".into())).unwrap();
	txn.commit().unwrap();

	let mut idx = txn.find_index(b"collated").unwrap().unwrap();
	assert!(idx.seek(&[Cell::Str("cafe".into())]).unwrap());
	assert_eq!(idx.id().unwrap(), obj.oid());
}

#[test]
fn locked_records_reject_other_transactions() {
	let (_temp, db) = open_db("locked_records_reject");
	let oid = {
		let txn = db.transaction();
		let obj = txn.create_object(0).unwrap();
		txn.commit().unwrap();
		obj.oid()
	};

	let t1 = db.transaction();
	let o1 = t1.get_object(oid).unwrap().unwrap();
	o1.set_value(NAME, Cell::Str("one".into())).unwrap();

	let (report, on_report) = mpsc::channel();
	let (release, on_release) = mpsc::channel();
	let db2 = db.clone();
	let worker = thread::spawn(move || {
		let t2 = db2.transaction();
		let o2 = t2.get_object(oid).unwrap().unwrap();
		let locked = match o2.set_value(NAME, Cell::Str("two".into())) {
			Err(ref e) => e.kind() == &ErrorKind::RecordLocked,
			Ok(_) => false,
		};
		report.send(locked).unwrap();
		on_release.recv().unwrap();
		o2.set_value(NAME, Cell::Str("two".into())).unwrap();
		t2.commit().unwrap();
	});

	assert!(on_report.recv().unwrap());
	t1.rollback();
	release.send(()).unwrap();
	worker.join().unwrap();

	let check = db.transaction();
	let obj = check.get_object(oid).unwrap().unwrap();
	assert_eq!(obj.value(NAME).unwrap(), Cell::Str("two".into()));
}

#[test]
fn rollback_restores_the_persisted_bytes() {
	use std::fs;

	let temp = TempDir::new("rollback_restores_bytes").unwrap();
	let path = temp.path().join("graph.ndb");
	let db = Database::open(&path).unwrap();

	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.set_value(NAME, Cell::Str("keep".into())).unwrap();
	obj.append_elem(Cell::UInt32(1)).unwrap();
	obj.append_slot(Cell::UInt32(0)).unwrap();
	txn.commit().unwrap();

	let before = fs::read(&path).unwrap();

	obj.set_value(NAME, Cell::Str("discard".into())).unwrap();
	let scratch = txn.create_object(0).unwrap();
	scratch.append_slot(Cell::UInt32(9)).unwrap();
	obj.erase().unwrap();
	txn.rollback();

	let after = fs::read(&path).unwrap();
	assert_eq!(before, after);
	assert_eq!(obj.value(NAME).unwrap(), Cell::Str("keep".into()));
}

#[test]
fn rolled_back_creation_leaves_a_tombstone() {
	let (_temp, db) = open_db("rolled_back_creation");
	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	let oid = obj.oid();
	txn.rollback();

	assert!(obj.is_deleted());
	assert!(matches!(
		obj.set_value(NAME, Cell::UInt32(1)).unwrap_err().kind(),
		&ErrorKind::RecordDeleted
	));
	assert!(txn.get_object(oid).unwrap().is_none());
}

#[test]
fn erased_records_stay_readable_until_commit() {
	let (_temp, db) = open_db("erased_records_stay_readable");
	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.set_value(NAME, Cell::Str("doomed".into())).unwrap();
	txn.commit().unwrap();

	obj.erase().unwrap();
	assert_eq!(obj.value(NAME).unwrap(), Cell::Str("doomed".into()));
	txn.commit().unwrap();

	assert!(matches!(
		obj.value(NAME).unwrap_err().kind(),
		&ErrorKind::RecordDeleted
	));
}

#[test]
fn queue_appends_navigates_and_erases() {
	let (_temp, db) = open_db("queue_appends_navigates");
	let events = collect_events(&db);
	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	let q1 = obj.append_slot(Cell::Str("first".into())).unwrap();
	let q2 = obj.append_slot(Cell::Str("second".into())).unwrap();
	obj.append_slot(Cell::Str("third".into())).unwrap();
	txn.commit().unwrap();

	assert_eq!(q1.slot_nr(), 1);
	assert_eq!(q2.slot_nr(), 2);
	assert_eq!(q1.value().unwrap(), Cell::Str("first".into()));

	let mut cur = obj.first_slot().unwrap().unwrap();
	assert_eq!(cur.slot_nr(), 1);
	assert!(cur.next().unwrap());
	assert_eq!(cur.slot_nr(), 2);
	assert!(cur.next().unwrap());
	assert_eq!(cur.slot_nr(), 3);
	assert!(!cur.next().unwrap());

	let last = obj.last_slot().unwrap().unwrap();
	assert_eq!(last.slot_nr(), 3);
	let mut back = last.clone();
	assert!(back.prev().unwrap());
	assert_eq!(back.slot_nr(), 2);

	// erase the tail; last falls back to the remaining slots
	last.erase().unwrap();
	txn.commit().unwrap();
	assert_eq!(obj.last_slot().unwrap().unwrap().slot_nr(), 2);

	assert!(obj.get_slot(2).unwrap().is_some());
	assert!(obj.get_slot(9).unwrap().is_none());

	let events = events.lock().unwrap();
	let queue_events: Vec<UpdateKind> = events.iter()
		.filter(|e| e.id2 == obj.oid() || e.kind == UpdateKind::QueueErased)
		.map(|e| e.kind)
		.filter(|k| *k == UpdateKind::QueueAdded || *k == UpdateKind::QueueErased)
		.collect();
	assert_eq!(queue_events, vec![
		UpdateKind::QueueAdded, UpdateKind::QueueAdded,
		UpdateKind::QueueAdded, UpdateKind::QueueErased,
	]);
}

#[test]
fn map_cells_store_and_iterate_by_prefix() {
	let (_temp, db) = open_db("map_cells_store_and_iterate");
	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.set_cell(
		&[Cell::Str("a".into()), Cell::UInt32(1)],
		Cell::Str("a1".into()),
	).unwrap();
	obj.set_cell(
		&[Cell::Str("a".into()), Cell::UInt32(2)],
		Cell::Str("a2".into()),
	).unwrap();
	obj.set_cell(&[Cell::Str("b".into())], Cell::Str("b0".into())).unwrap();

	// pending writes are visible to the owner before commit
	assert_eq!(
		obj.get_cell(&[Cell::Str("a".into()), Cell::UInt32(1)]).unwrap(),
		Cell::Str("a1".into())
	);
	txn.commit().unwrap();

	let mut mit = obj.find_cells(&[Cell::Str("a".into())]).unwrap();
	assert_eq!(mit.value().unwrap(), Cell::Str("a1".into()));
	assert_eq!(mit.key().unwrap(), vec![Cell::Str("a".into()), Cell::UInt32(1)]);
	assert!(mit.next_key().unwrap());
	assert_eq!(mit.value().unwrap(), Cell::Str("a2".into()));
	assert!(!mit.next_key().unwrap());

	// null erases a cell
	obj.set_cell(&[Cell::Str("b".into())], Cell::Null).unwrap();
	txn.commit().unwrap();
	assert_eq!(obj.get_cell(&[Cell::Str("b".into())]).unwrap(), Cell::Null);
	assert!(!obj.find_cells(&[Cell::Str("b".into())]).unwrap().first_key().unwrap());
}

#[test]
fn uuids_resolve_and_stay_unique() {
	let (_temp, db) = open_db("uuids_resolve_and_stay_unique");
	let txn = db.transaction();
	let uuid = Uuid::new_v4();
	let obj = txn.create_object_with_uuid(&uuid, 5).unwrap();
	txn.commit().unwrap();

	assert_eq!(db.deref_uuid(&uuid).unwrap(), obj.oid());
	assert_eq!(obj.uuid().unwrap(), Some(uuid));

	let found = txn.object_by_uuid(&uuid).unwrap().unwrap();
	assert_eq!(found.oid(), obj.oid());
	let same = txn.get_or_create_object(&uuid, 5).unwrap();
	assert_eq!(same.oid(), obj.oid());

	let other = txn.create_object(0).unwrap();
	assert!(matches!(
		other.set_uuid(&uuid).unwrap_err().kind(),
		&ErrorKind::Duplicate
	));

	// erasing the record retires the mapping
	obj.erase().unwrap();
	txn.commit().unwrap();
	assert_eq!(db.deref_uuid(&uuid).unwrap(), 0);
}

#[test]
fn reserved_atoms_are_refused() {
	let (_temp, db) = open_db("reserved_atoms_are_refused");
	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	assert!(matches!(
		obj.set_value(nexodb::MIN_RESERVED_FIELD, Cell::UInt32(1)).unwrap_err().kind(),
		&ErrorKind::ReservedName
	));
	assert!(matches!(
		txn.create_object(nexodb::MIN_RESERVED_FIELD + 3).unwrap_err().kind(),
		&ErrorKind::ReservedName
	));
}

#[test]
fn graph_survives_reopen() {
	let temp = TempDir::new("graph_survives_reopen").unwrap();
	let path = temp.path().join("graph.ndb");
	let (root_id, peer_id, rel_id) = {
		let db = Database::open(&path).unwrap();
		let txn = db.transaction();
		let root = txn.create_object(1).unwrap();
		root.set_value(NAME, Cell::Str("root".into())).unwrap();
		root.append_elem(Cell::Str("payload".into())).unwrap();
		let child = root.create_aggregate(2).unwrap();
		child.set_value(NAME, Cell::Str("child".into())).unwrap();
		let peer = txn.create_object(1).unwrap();
		let rel = root.relate_to(&peer, 4, false).unwrap();
		txn.commit().unwrap();
		(root.oid(), peer.oid(), rel.rid())
	};

	let db = Database::open(&path).unwrap();
	let txn = db.transaction();
	let root = txn.get_object(root_id).unwrap().unwrap();
	assert_eq!(root.typ().unwrap(), 1);
	assert_eq!(root.value(NAME).unwrap(), Cell::Str("root".into()));
	assert_eq!(elem_values(&root), vec![Cell::Str("payload".into())]);

	let child = root.first_obj().unwrap().unwrap();
	assert_eq!(child.value(NAME).unwrap(), Cell::Str("child".into()));
	assert_eq!(child.owner().unwrap().unwrap().oid(), root_id);

	let rel = root.first_rel().unwrap().unwrap();
	assert_eq!(rel.rid(), rel_id);
	assert_eq!(rel.target().unwrap(), peer_id);
	assert_eq!(rel.typ().unwrap(), 4);
}

#[test]
fn meta_entries_and_index_rollback() {
	let temp = TempDir::new("meta_entries_and_index_rollback").unwrap();
	let path = temp.path().join("graph.ndb");
	{
		let db = Database::open(&path).unwrap();
		db.write_meta(b"k", &Cell::Str("v".into())).unwrap();
	}
	let db = Database::open(&path).unwrap();
	assert_eq!(db.read_meta(b"k").unwrap(), Cell::Str("v".into()));

	let mut meta = IndexMeta::new(IndexKind::Value);
	meta.items.push(IndexItem::new(NAME));
	db.begin_trans();
	assert!(db.create_index(b"doomed", &meta).unwrap() != 0);
	db.abort_trans();
	assert_eq!(db.find_index(b"doomed").unwrap(), 0);
}

#[test]
fn notifications_stay_quiet_on_rollback() {
	let (_temp, db) = open_db("notifications_stay_quiet");
	let events = collect_events(&db);

	let txn = db.transaction();
	let obj = txn.create_object(0).unwrap();
	obj.set_value(NAME, Cell::UInt32(1)).unwrap();
	txn.rollback();

	assert!(events.lock().unwrap().is_empty());
}

#[test]
fn streams_lock_write_and_read_back() {
	let (_temp, db) = open_db("streams_lock_write_and_read");
	let events = collect_events(&db);
	let txn = db.transaction();

	let sid = {
		let mut meta = StreamMeta::new();
		meta.suffix = b"txt".to_vec();
		meta.mime_type = nexodb::mime_for_suffix("txt").unwrap().as_bytes().to_vec();
		let mut stream = txn.create_stream(meta).unwrap();
		stream.write_all(b"hello stream").unwrap();

		// the writer blocks every other access
		assert!(txn.get_stream(stream.sid(), false).unwrap().is_none());
		stream.sid()
	};

	// writer closed on drop, a reader gets in now
	let mut reader = txn.get_stream(sid, false).unwrap().unwrap();
	let mut content = String::new();
	reader.read_to_string(&mut content).unwrap();
	assert_eq!(content, "hello stream");

	// readers share, writers do not
	let second = txn.get_stream(sid, false).unwrap();
	assert!(second.is_some());
	assert!(txn.get_stream(sid, true).unwrap().is_none());
	drop(second);
	drop(reader);

	let meta = {
		let stream = txn.get_stream(sid, false).unwrap().unwrap();
		stream.meta().unwrap()
	};
	assert_eq!(meta.mime_type, b"text/plain".to_vec());
	assert!(meta.use_count >= 2);
	assert!(meta.last_use.is_some());

	assert!(matches!(
		txn.get_stream(999, false).unwrap_err().kind(),
		&ErrorKind::StreamFile(_)
	));

	let changed = events.lock().unwrap().iter()
		.filter(|e| e.kind == UpdateKind::StreamChanged)
		.count();
	assert!(changed >= 1);
}
