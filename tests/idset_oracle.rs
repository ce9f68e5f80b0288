//! Identifier-set invariants checked against plain-set oracles, for both
//! storage strategies.

use std::collections::BTreeSet;

use meshstore::oid::{ObjectId, ObjectIdSet, SetRepresentation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BOTH: [SetRepresentation; 2] = [SetRepresentation::Ranges, SetRepresentation::BitSet];

fn oracle_pair(rep: SetRepresentation) -> (ObjectIdSet, BTreeSet<i64>) {
    (ObjectIdSet::with_representation(rep), BTreeSet::new())
}

#[test]
fn random_adds_match_plain_set() {
    for rep in BOTH {
        let mut rng = StdRng::seed_from_u64(0x1d5e7);
        let (mut set, mut oracle) = oracle_pair(rep);

        for _ in 0..50_000 {
            let id: i64 = rng.gen();
            assert_eq!(set.add(ObjectId::new(id)), oracle.insert(id));
        }

        assert_eq!(set.len(), oracle.len() as u64);
        for &id in &oracle {
            assert!(set.contains(ObjectId::new(id)), "missing {}", id);
        }
        // Ascending iteration order matches the sorted oracle exactly.
        let ids: Vec<i64> = set.iter().map(ObjectId::raw).collect();
        let expected: Vec<i64> = oracle.iter().copied().collect();
        assert_eq!(ids, expected);
    }
}

#[test]
fn interleaved_adds_and_removes_match_plain_set() {
    for rep in BOTH {
        let mut rng = StdRng::seed_from_u64(0xace0fba5e);
        let (mut set, mut oracle) = oracle_pair(rep);

        for round in 0..100_000 {
            // Small domain forces dense collisions, merges and splits.
            let id = rng.gen_range(-2_000i64..2_000);
            if round % 3 == 0 {
                assert_eq!(set.remove(ObjectId::new(id)), oracle.remove(&id));
            } else {
                assert_eq!(set.add(ObjectId::new(id)), oracle.insert(id));
            }
        }

        assert_eq!(set.len(), oracle.len() as u64);
        let ids: Vec<i64> = set.iter().map(ObjectId::raw).collect();
        let expected: Vec<i64> = oracle.iter().copied().collect();
        assert_eq!(ids, expected);
        assert_eq!(
            set.first().map(ObjectId::raw),
            oracle.iter().next().copied()
        );
        assert_eq!(
            set.last().map(ObjectId::raw),
            oracle.iter().next_back().copied()
        );
    }
}

#[test]
fn both_representations_stay_equal_under_the_same_operations() {
    let mut rng = StdRng::seed_from_u64(77);
    let mut ranges = ObjectIdSet::with_representation(SetRepresentation::Ranges);
    let mut bits = ObjectIdSet::with_representation(SetRepresentation::BitSet);

    for _ in 0..20_000 {
        let id = ObjectId::new(rng.gen_range(-500i64..500));
        if rng.gen_bool(0.3) {
            assert_eq!(ranges.remove(id), bits.remove(id));
        } else {
            assert_eq!(ranges.add(id), bits.add(id));
        }
    }
    assert_eq!(ranges, bits);
}

#[test]
fn serialization_round_trips_losslessly() {
    for rep in BOTH {
        let mut rng = StdRng::seed_from_u64(4242);
        let mut set = ObjectIdSet::with_representation(rep);
        for _ in 0..10_000 {
            set.add(ObjectId::new(rng.gen()));
        }
        // Extremes included deliberately.
        set.add(ObjectId::new(i64::MIN));
        set.add(ObjectId::new(i64::MAX));
        set.add(ObjectId::new(-1));
        set.add(ObjectId::new(0));

        let bytes = set.serialize();
        let back = ObjectIdSet::deserialize(&bytes).unwrap();
        assert_eq!(back.representation(), rep);
        assert_eq!(back, set);
    }
}

#[test]
fn cross_representation_equality_after_round_trip() {
    let ids: Vec<ObjectId> = (0..1000).map(|i| ObjectId::new(i * 7 - 350)).collect();
    let ranges = ObjectIdSet::from_ids(SetRepresentation::Ranges, ids.iter().copied());
    let bits = ObjectIdSet::from_ids(SetRepresentation::BitSet, ids.iter().copied());

    let from_ranges = ObjectIdSet::deserialize(&ranges.serialize()).unwrap();
    let from_bits = ObjectIdSet::deserialize(&bits.serialize()).unwrap();
    assert_eq!(from_ranges, from_bits);
    assert_ne!(from_ranges.representation(), from_bits.representation());
}

#[test]
fn cursor_removal_example_matches_plain_set_oracle() {
    // {1,10,14,18,68,75,175,205}: remove the 4th element (18) during
    // iteration, then the 6th in remaining order (75).
    for rep in BOTH {
        let ids = [1i64, 10, 14, 18, 68, 75, 175, 205];
        let mut set = ObjectIdSet::from_ids(rep, ids.iter().copied().map(ObjectId::new));
        let mut oracle: BTreeSet<i64> = ids.iter().copied().collect();

        let mut cursor = set.cursor();
        for _ in 0..4 {
            cursor.next().unwrap();
        }
        cursor.remove().unwrap();
        oracle.remove(&18);

        assert_eq!(cursor.next().map(ObjectId::raw), Some(68));
        assert_eq!(cursor.next().map(ObjectId::raw), Some(75));
        cursor.remove().unwrap();
        oracle.remove(&75);

        assert_eq!(cursor.next().map(ObjectId::raw), Some(175));
        assert_eq!(cursor.next().map(ObjectId::raw), Some(205));
        assert_eq!(cursor.next(), None);

        let remaining: Vec<i64> = set.iter().map(ObjectId::raw).collect();
        let expected: Vec<i64> = oracle.iter().copied().collect();
        assert_eq!(remaining, expected);
        assert_eq!(expected, vec![1, 10, 14, 68, 175, 205]);
    }
}

#[test]
fn add_all_from_other_set_matches_oracle() {
    for rep in BOTH {
        let mut rng = StdRng::seed_from_u64(99);
        let mut base = ObjectIdSet::with_representation(rep);
        let mut oracle = BTreeSet::new();
        for _ in 0..5_000 {
            let id = rng.gen_range(0i64..10_000);
            base.add(ObjectId::new(id));
            oracle.insert(id);
        }

        let extra = ObjectIdSet::from_ids(
            SetRepresentation::BitSet,
            (0..100).map(|i| ObjectId::new(i * 101)),
        );
        let grew = base.add_all(extra.iter());
        for id in extra.iter() {
            oracle.insert(id.raw());
        }

        assert!(grew);
        assert_eq!(base.len(), oracle.len() as u64);
        let ids: Vec<i64> = base.iter().map(ObjectId::raw).collect();
        let expected: Vec<i64> = oracle.iter().copied().collect();
        assert_eq!(ids, expected);
    }
}
