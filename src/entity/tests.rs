use std::collections::HashSet;

use super::{pair, Entity, Kind, Pair, CHILD_OF, IS, WILDCARD};

static_assertions::assert_impl_all!(Entity: Copy, Send, Sync, std::hash::Hash, Ord);

#[test]
fn test_pack_round_trip() {
    let e = Entity::new(42, 7, true, false, Kind::Generic);
    assert_eq!(e.id(), 42);
    assert_eq!(e.gen(), 7);
    assert!(e.is_entity());
    assert!(!e.is_pair());
    assert_eq!(e.kind(), Kind::Generic);

    let u = Entity::new(42, 7, false, false, Kind::Unique);
    assert_eq!(u.kind(), Kind::Unique);
    assert!(!u.is_entity());
    assert_ne!(e, u);
}

#[test]
fn test_pair_encoding() {
    let eats = Entity::new(20, 3, true, false, Kind::Generic);
    let carrot = Entity::new(21, 9, true, false, Kind::Generic);

    let p = Pair::new(eats, carrot).into_entity();
    assert!(p.is_pair());
    assert_eq!(p.rel(), 20);
    assert_eq!(p.tgt(), 21);
    assert_eq!(p, pair(eats, carrot));
    assert!(!p.is_wildcard());

    // generations of the parts are not part of the pair
    let carrot_again = Entity::new(21, 10, true, false, Kind::Generic);
    assert_eq!(p, pair(eats, carrot_again));
}

#[test]
fn test_wildcards() {
    let eats = Entity::new(20, 0, true, false, Kind::Generic);
    assert!(pair(eats, WILDCARD).is_wildcard());
    assert!(pair(WILDCARD, eats).is_wildcard());
    assert!(pair(WILDCARD, WILDCARD).is_wildcard());
    assert!(WILDCARD.is_wildcard());
    assert!(!pair(IS, CHILD_OF).is_wildcard());
}

#[test]
fn test_bad() {
    assert!(Entity::BAD.is_bad());
    assert!(!Entity::BAD.is_pair());
    assert!(!Entity::BAD.is_entity());
}

#[test]
fn test_distinct_hashes() {
    let set: HashSet<_> = (0..64)
        .flat_map(|id| (0..4).map(move |gen| Entity::new(id, gen, true, false, Kind::Generic)))
        .collect();
    assert_eq!(set.len(), 64 * 4);
}
