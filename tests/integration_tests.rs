//! Integration tests covering the scenarios in `SPEC_FULL.md` section 8.

use std::sync::Arc;
use std::thread;

use u62set_rs::Set;

/// Scenario 1: small synchronous.
#[test]
fn small_synchronous() {
    let set = Set::new(8).unwrap();
    for i in 0..10u64 {
        assert!(!set.contains(i), "contains({i}) should be false before add");
        assert!(set.add(i).unwrap(), "add({i}) should be newly-inserted");
        assert!(set.contains(i), "contains({i}) should be true after add");
        assert_eq!(set.size(), i + 1);
    }
    assert!(!set.contains(10));
}

/// Scenario 2: large synchronous, many buckets.
#[test]
fn large_synchronous() {
    let set = Set::new(65_536).unwrap();
    for i in 0..1024u64 {
        set.add(i).unwrap();
    }
    for i in 0..1024u64 {
        assert!(set.contains(i));
    }
    assert_eq!(set.size(), 1024);
}

/// Scenario 3: concurrent disjoint ranges, single bucket to force contention
/// inside one bucket's grow protocol.
#[test]
fn concurrent_disjoint_ranges_insert() {
    let set = Set::new(1).unwrap();
    let handles: Vec<_> = (0..16u64)
        .map(|k| {
            let set = set.clone();
            thread::spawn(move || {
                for v in (k * 256)..((k + 1) * 256) {
                    set.add(v).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(set.size(), 4096);
    for i in 0..4096u64 {
        assert!(set.contains(i), "missing {i}");
    }
    let distinct: std::collections::HashSet<u64> = set.iter().collect();
    assert_eq!(distinct.len(), 4096);
}

/// Scenario 4: concurrent insert, then concurrent remove of the same ranges.
#[test]
fn concurrent_insert_then_concurrent_remove() {
    let set = Set::new(1).unwrap();
    let insert_handles: Vec<_> = (0..16u64)
        .map(|k| {
            let set = set.clone();
            thread::spawn(move || {
                for v in (k * 256)..((k + 1) * 256) {
                    set.add(v).unwrap();
                }
            })
        })
        .collect();
    for h in insert_handles {
        h.join().unwrap();
    }
    assert_eq!(set.size(), 4096);

    let remove_handles: Vec<_> = (0..16u64)
        .map(|k| {
            let set = set.clone();
            thread::spawn(move || {
                for v in (k * 256)..((k + 1) * 256) {
                    set.remove(v).unwrap();
                }
            })
        })
        .collect();
    for h in remove_handles {
        h.join().unwrap();
    }

    assert_eq!(set.size(), 0);
    assert!(set.is_empty());
    assert!(set.iter().next().is_none());
}

/// Scenario 6 (idempotence): a second add/remove is a no-op on size/result.
#[test]
fn idempotence() {
    let set = Set::new(16).unwrap();
    assert!(set.add(5).unwrap());
    assert!(!set.add(5).unwrap());
    assert_eq!(set.size(), 1);

    assert!(set.remove(5).unwrap());
    assert!(!set.remove(5).unwrap());
    assert_eq!(set.size(), 0);
}

#[test]
fn iterator_remove_last() {
    let set = Set::new(16).unwrap();
    set.add_all(0..50).unwrap();

    let mut it = set.iter();
    let first = it.next().unwrap();
    it.remove_last().unwrap();
    assert!(!set.contains(first));
    assert_eq!(set.size(), 49);

    // A second remove_last without an intervening next() fails.
    assert!(it.remove_last().is_err());
}

#[test]
fn clear_empties_a_populated_set() {
    let set = Set::new(32).unwrap();
    set.add_all(0..1000).unwrap();
    assert_eq!(set.size(), 1000);
    set.clear();
    assert!(set.is_empty());
    assert!(set.iter().next().is_none());
}

#[test]
fn concurrent_add_remove_contains_mix_does_not_corrupt_state() {
    let set = Arc::new(Set::new(4).unwrap());
    let mut handles = Vec::new();
    for t in 0..8u64 {
        let set = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for i in 0..2000u64 {
                let v = (t * 2000 + i) % 500;
                match i % 3 {
                    0 => {
                        let _ = set.add(v);
                    }
                    1 => {
                        let _ = set.remove(v);
                    }
                    _ => {
                        let _ = set.contains(v);
                    }
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    // No assertion on exact membership (racy by design); only that the set
    // remains internally consistent enough to iterate and size() without
    // panicking, and that size() is within the domain touched.
    let size = set.size();
    assert!(size <= 500);
    let collected: Vec<u64> = set.iter().collect();
    assert_eq!(collected.len() as u64, size);
}
