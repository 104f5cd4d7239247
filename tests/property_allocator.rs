//! Property-based tests for allocator correctness
//!
//! Uses proptest to verify allocator invariants hold across many random
//! reserve / resize / free sequences, both on the bare allocator and through
//! a database that is reopened afterwards.

use geomdb::core::allocator::FreeSpaceAllocator;
use geomdb::core::codec::minor;
use geomdb::core::header::HEADER_SIZE;
use geomdb::{Database, DatabaseConfig, Record};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Reserve(u64),
    Resize(usize, u64),
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..40).prop_map(|units| Op::Reserve(units * 8)),
        (any::<usize>(), 1u64..40).prop_map(|(i, units)| Op::Resize(i, units * 8)),
        any::<usize>().prop_map(Op::Free),
    ]
}

/// Live ranges and free extents must tile without overlap
fn check_invariants(alloc: &FreeSpaceAllocator, live: &[(u64, u64)]) -> Result<(), TestCaseError> {
    let mut ranges: Vec<(u64, u64, bool)> = live.iter().map(|&(a, l)| (a, l, true)).collect();
    ranges.extend(alloc.extents().map(|e| (e.address, e.length, false)));
    ranges.sort();

    for window in ranges.windows(2) {
        let (a, a_len, _) = window[0];
        let (b, _, _) = window[1];
        prop_assert!(a + a_len <= b, "overlap between {} and {}", a, b);
    }
    for &(address, length, _) in &ranges {
        prop_assert!(address >= HEADER_SIZE);
        prop_assert!(address + length <= alloc.end_of_file());
        prop_assert_eq!(address % 8, 0);
    }

    // Coalescing leaves no two free extents touching
    let extents: Vec<_> = alloc.extents().copied().collect();
    for pair in extents.windows(2) {
        prop_assert!(pair[0].end() < pair[1].address);
    }

    let free: u64 = extents.iter().map(|e| e.length).sum();
    prop_assert_eq!(free, alloc.free_bytes());
    Ok(())
}

proptest! {
    #[test]
    fn prop_no_overlap(ops in prop::collection::vec(op(), 1..120)) {
        let mut alloc = FreeSpaceAllocator::new(HEADER_SIZE, HEADER_SIZE);
        let mut live: Vec<(u64, u64)> = Vec::new();

        for op in ops {
            match op {
                Op::Reserve(length) => {
                    let r = alloc.reserve(None, length).unwrap();
                    prop_assert_eq!(r.length, length);
                    live.push((r.address, r.length));
                }
                Op::Resize(i, length) if !live.is_empty() => {
                    let i = i % live.len();
                    let old = live[i];
                    let r = alloc.reserve(Some(old), length).unwrap();
                    if length <= old.1 {
                        prop_assert_eq!(r.address, old.0);
                    }
                    live[i] = (r.address, r.length);
                }
                Op::Free(i) if !live.is_empty() => {
                    let (address, length) = live.swap_remove(i % live.len());
                    alloc.free(address, length).unwrap();
                }
                _ => {}
            }
            check_invariants(&alloc, &live)?;
        }
    }

    #[test]
    fn prop_space_accounting(sizes in prop::collection::vec(1u64..64, 1..40)) {
        let mut alloc = FreeSpaceAllocator::new(HEADER_SIZE, HEADER_SIZE);
        let reservations: Vec<_> = sizes
            .iter()
            .map(|units| alloc.reserve(None, units * 8).unwrap())
            .collect();

        let total: u64 = sizes.iter().map(|units| units * 8).sum();
        prop_assert_eq!(alloc.end_of_file(), HEADER_SIZE + total);

        for r in &reservations {
            alloc.free(r.address, r.length).unwrap();
        }
        // Everything freed collapses into one extent
        prop_assert_eq!(alloc.extent_count(), 1);
        prop_assert_eq!(alloc.free_bytes(), total);
    }

    #[test]
    fn prop_reopen_rebuilds_free_list(
        sizes in prop::collection::vec(1usize..300, 2..25),
        delete_mask in prop::collection::vec(any::<bool>(), 25)
    ) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prop.g");

        let mut db = Database::create(&path, DatabaseConfig::default()).unwrap();
        for (i, size) in sizes.iter().enumerate() {
            let record = Record::primitive(format!("obj{}.s", i), minor::SPHERE, vec![i as u8; *size]).unwrap();
            db.put(&record).unwrap();
        }
        for i in 0..sizes.len() {
            if delete_mask[i] {
                db.delete(&format!("obj{}.s", i)).unwrap();
            }
        }

        let names = db.names();
        let extents: Vec<_> = db.allocator().extents().copied().collect();
        let eof = db.allocator().end_of_file();
        db.close().unwrap();

        let reopened = Database::open(&path, DatabaseConfig::read_only()).unwrap();
        prop_assert_eq!(reopened.names(), names);
        let reopened_extents: Vec<_> = reopened.allocator().extents().copied().collect();
        prop_assert_eq!(reopened_extents, extents);
        prop_assert_eq!(reopened.allocator().end_of_file(), eof);

        for (i, size) in sizes.iter().enumerate() {
            if !delete_mask[i] {
                let record = reopened.get(&format!("obj{}.s", i)).unwrap();
                prop_assert_eq!(record.body, vec![i as u8; *size]);
            }
        }
    }
}
