//! Round trip, growth, and ownership tests for the typed table

use std::cell::Cell;
use std::rc::Rc;

use probetable::{Error, Key, Table};

#[test]
fn insert_then_lookup() {
    let mut table: Table<u64, u64> = Table::with_slots(4).unwrap();
    assert!(table.insert(20, 200).is_ok());
    assert_eq!(table.get(&20), Some(&200));
    assert_eq!(table.len(), 1);
}

#[test]
fn duplicate_insert_is_rejected_and_value_kept() {
    let mut table: Table<u64, u64> = Table::with_slots(4).unwrap();
    table.insert(20, 200).unwrap();
    assert!(matches!(table.insert(20, 100), Err(Error::AlreadyPresent)));
    assert_eq!(table.get(&20), Some(&200));
    assert_eq!(table.len(), 1);
}

#[test]
fn remove_then_reinsert() {
    let mut table: Table<u64, u64> = Table::with_slots(4).unwrap();
    table.insert(20, 200).unwrap();
    table.remove(&20);
    assert_eq!(table.get(&20), None);
    assert_eq!(table.len(), 0);
    table.insert(20, 100).unwrap();
    assert_eq!(table.get(&20), Some(&100));
}

#[test]
fn remove_of_absent_key_is_a_no_op() {
    let mut table: Table<u64, u64> = Table::with_slots(4).unwrap();
    table.insert(1, 10).unwrap();
    table.remove(&2);
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(&1), Some(&10));
}

#[test]
fn growth_from_a_single_slot() {
    let mut table: Table<u64, u64> = Table::with_slots(1).unwrap();
    for key in 0..100 {
        table.insert(key, key * 3).unwrap();
    }
    assert_eq!(table.len(), 100);
    assert!(table.slot_count() >= 128);
    for key in 0..100 {
        assert_eq!(table.get(&key), Some(&(key * 3)));
    }
}

#[test]
fn fixed_width_buffer_keys() {
    fn buffer(text: &str) -> [u8; 32] {
        let mut buf = [0_u8; 32];
        buf[..text.len()].copy_from_slice(text.as_bytes());
        buf
    }

    let mut table: Table<[u8; 32], u32> = Table::with_slots(8).unwrap();
    table.insert(buffer("alpha"), 1).unwrap();
    table.insert(buffer("beta"), 2).unwrap();
    assert_eq!(table.get(&buffer("alpha")), Some(&1));
    assert_eq!(table.get(&buffer("beta")), Some(&2));

    // Equality is over every byte: trailing garbage makes a new key.
    let mut dirty = buffer("alpha");
    dirty[31] = 0xff;
    assert_eq!(table.get(&dirty), None);
}

#[test]
fn size_matches_lookup_agreement() {
    let mut table: Table<u64, u64> = Table::with_slots(8).unwrap();
    for key in 0..40 {
        table.insert(key, key).unwrap();
    }
    for key in (0..40).step_by(3) {
        table.remove(&key);
    }
    let present = (0..40).filter(|key| table.get(key).is_some()).count();
    assert_eq!(table.len(), present);
}

#[test]
fn iteration_yields_each_entry_exactly_once() {
    let mut table: Table<u64, u64> = Table::with_slots(16).unwrap();
    for key in 0..10 {
        table.insert(key, key + 1000).unwrap();
    }
    let mut seen = std::collections::HashSet::new();
    let iter = table.iter();
    assert_eq!(iter.len(), 10);
    for (&key, &value) in iter {
        assert_eq!(value, key + 1000);
        assert!(seen.insert(key), "key {key} yielded twice");
    }
    assert_eq!(seen.len(), 10);

    // A fresh call restarts from slot zero.
    assert_eq!(table.iter().count(), 10);
    assert_eq!((&table).into_iter().count(), 10);
}

/// Value whose drops are counted through a shared cell
struct Tracked {
    drops: Rc<Cell<usize>>,
}

impl Tracked {
    fn new(drops: &Rc<Cell<usize>>) -> Self {
        Self {
            drops: Rc::clone(drops),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

/// Key owning a droppable resource, hashed and compared by id only
struct TrackedKey {
    id: u64,
    drops: Rc<Cell<usize>>,
}

impl TrackedKey {
    fn new(id: u64, drops: &Rc<Cell<usize>>) -> Self {
        Self {
            id,
            drops: Rc::clone(drops),
        }
    }
}

impl Key for TrackedKey {
    fn fingerprint(&self) -> u64 {
        self.id.fingerprint()
    }

    fn matches(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Drop for TrackedKey {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[test]
fn values_drop_on_remove_and_teardown_but_never_on_resize() {
    let drops = Rc::new(Cell::new(0));
    let mut table: Table<u64, Tracked> = Table::with_slots(2).unwrap();
    for key in 0..10 {
        table.insert(key, Tracked::new(&drops)).unwrap();
    }
    // Growth from two slots happened several times; moves are not drops.
    assert!(table.slot_count() >= 16);
    assert_eq!(drops.get(), 0);

    for key in 0..3 {
        table.remove(&key);
    }
    assert_eq!(drops.get(), 3);

    drop(table);
    assert_eq!(drops.get(), 10);
}

#[test]
fn keys_drop_alongside_values() {
    let key_drops = Rc::new(Cell::new(0));
    let value_drops = Rc::new(Cell::new(0));
    let mut table: Table<TrackedKey, Tracked> = Table::with_slots(8).unwrap();
    for id in 0..5 {
        table
            .insert(TrackedKey::new(id, &key_drops), Tracked::new(&value_drops))
            .unwrap();
    }
    assert_eq!(key_drops.get(), 0);

    table.remove(&TrackedKey::new(2, &key_drops));
    // The probe key above drops too: stored key + probe key, one value.
    assert_eq!(key_drops.get(), 2);
    assert_eq!(value_drops.get(), 1);

    drop(table);
    assert_eq!(key_drops.get(), 6);
    assert_eq!(value_drops.get(), 5);
}

#[test]
fn rejected_duplicate_pair_is_dropped_not_leaked() {
    let key_drops = Rc::new(Cell::new(0));
    let value_drops = Rc::new(Cell::new(0));
    let mut table: Table<TrackedKey, Tracked> = Table::with_slots(8).unwrap();
    table
        .insert(TrackedKey::new(7, &key_drops), Tracked::new(&value_drops))
        .unwrap();

    let result = table.insert(TrackedKey::new(7, &key_drops), Tracked::new(&value_drops));
    assert!(matches!(result, Err(Error::AlreadyPresent)));
    // The rejected pair dropped in the caller; the stored pair is intact.
    assert_eq!(key_drops.get(), 1);
    assert_eq!(value_drops.get(), 1);
    assert_eq!(table.len(), 1);
}

#[test]
fn invalid_slot_counts_are_rejected() {
    for slots in [0_usize, 3, 12, 1000] {
        assert!(matches!(
            Table::<u64, u64>::with_slots(slots),
            Err(Error::SlotCount)
        ));
    }
}

#[test]
fn default_slot_count_constructor() {
    let table: Table<u64, u64> = Table::new().unwrap();
    assert_eq!(table.slot_count(), Table::<u64, u64>::DEFAULT_SLOT_COUNT);
    assert!(table.is_empty());
}
