use std::{
    collections::HashSet,
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
    thread,
};

use proptest::prelude::*;
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use shardroute::routing_tree::RoutingTree;

mod common;

use common::{
    leaf_of,
    modulo_tree,
    tree_with,
};

#[test]
fn test_small_keyspace_scenario() {
    let tree = modulo_tree(3);
    for path in ["D1-S1-T1", "D1-S1-T2", "D2-S1-T1"] {
        tree.add_path(path).unwrap();
    }

    let first = tree.resolve("k0").unwrap().expect("route");
    let second = tree.resolve("k0").unwrap().expect("route");
    assert_eq!(first, second);

    assert!(tree.remove_path("D1-S1-T2").unwrap());
    assert!(tree.path_exists("D1-S1-T1").unwrap());
    assert!(tree.path_exists("D2-S1-T1").unwrap());

    // With D1-S1 down to one leaf, every D1 key now lands on T1.
    for i in 0..100 {
        let route = tree.resolve(&format!("k{i}")).unwrap().unwrap();
        assert!(route == "D1-S1-T1-" || route == "D2-S1-T1-", "unexpected route {route}");
    }

    assert!(tree.remove_path("D1-S1-T1").unwrap());
    assert!(!tree.path_exists("D1").unwrap());
    assert!(tree.path_exists("D2-S1-T1").unwrap());
    assert_eq!(tree.resolve("k0").unwrap().as_deref(), Some("D2-S1-T1-"));

    assert!(tree.remove_path("D2-S1-T1").unwrap());
    assert!(tree.is_empty().unwrap());
    assert_eq!(tree.resolve("k0").unwrap(), None);
}

#[test]
fn test_pruning_keeps_shared_ancestors() {
    let tree = tree_with(&["A-B-C", "A-B-D"]);

    assert!(tree.remove_path("A-B-C").unwrap());
    assert!(tree.path_exists("A-B-D").unwrap());
    assert!(tree.path_exists("A-B").unwrap());
    assert!(tree.path_exists("A").unwrap());

    assert!(tree.remove_path("A-B-D").unwrap());
    assert!(!tree.path_exists("A").unwrap());
    assert!(tree.is_empty().unwrap());

    // The root survives and keeps accepting paths.
    tree.add_path("A-B-E").unwrap();
    assert_eq!(tree.resolve("anything").unwrap().as_deref(), Some("A-B-E-"));
}

#[test]
fn test_resolution_never_dangles() {
    let tree = tree_with(&["X-P", "X-Q", "Y-P"]);
    let valid: HashSet<&str> = ["X-P", "X-Q", "Y-P"].into_iter().collect();

    let mut seen = HashSet::new();
    for i in 0..2_000 {
        let route = tree.resolve(&format!("request-{i}")).unwrap().unwrap();
        let leaf = leaf_of(&route).to_string();
        assert!(valid.contains(leaf.as_str()), "dangling route {route}");
        seen.insert(leaf);
    }
    assert_eq!(seen.len(), 3, "some leaves were never reached: {seen:?}");
}

#[test]
fn test_resolved_route_feeds_back_into_removal() {
    let tree = tree_with(&["D1-S1-T1", "D2-S1-T1", "D1-S2-T1", "D1-S1-T2", "D2-S1-T2"]);

    let route = tree.resolve("a value to test removing leaf").unwrap().unwrap();
    assert!(tree.path_exists(&route).unwrap());
    assert!(tree.remove_path(&route).unwrap());
    assert!(!tree.path_exists(&route).unwrap());
    assert_eq!(tree.paths().unwrap().len(), 4);
}

#[test]
fn test_adding_branch_remaps_bounded_share() {
    let paths: Vec<String> = (0..8).map(|i| format!("D{i}-S1-T1")).collect();
    let tree = RoutingTree::default();
    for path in &paths {
        tree.add_path(path).unwrap();
    }

    let mut rng = StdRng::seed_from_u64(7);
    let keys: Vec<String> = (0..5_000).map(|_| format!("user-{}", rng.random::<u64>())).collect();
    let before: Vec<String> = keys.iter().map(|k| tree.resolve(k).unwrap().unwrap()).collect();

    tree.add_path("D8-S1-T1").unwrap();

    let mut moved = 0usize;
    for (key, old) in keys.iter().zip(&before) {
        let new = tree.resolve(key).unwrap().unwrap();
        if &new != old {
            assert_eq!(new, "D8-S1-T1-", "key moved between existing branches");
            moved += 1;
        }
    }

    let fraction = moved as f64 / keys.len() as f64;
    assert!(fraction > 0.0 && fraction < 0.35, "remapped {fraction:.2} of keys");

    // Removing the branch again restores every original mapping.
    tree.remove_path("D8-S1-T1").unwrap();
    for (key, old) in keys.iter().zip(&before) {
        assert_eq!(&tree.resolve(key).unwrap().unwrap(), old);
    }
}

#[test]
fn test_concurrent_readers_and_writers() {
    let tree = tree_with(&["D1-S1-T1", "D1-S1-T2", "D2-S1-T1"]);
    let valid: HashSet<&str> = ["D1-S1-T1", "D1-S1-T2", "D2-S1-T1", "D3-S1-T1", "D1-S2-T1"]
        .into_iter()
        .collect();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..500 {
                tree.add_path("D3-S1-T1").unwrap();
                tree.add_path("D1-S2-T1").unwrap();
                tree.remove_path("D3-S1-T1").unwrap();
                tree.remove_path("D1-S2-T1").unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        for reader in 0..4 {
            let tree = &tree;
            let valid = &valid;
            let done = &done;
            s.spawn(move || {
                let mut i = 0u64;
                while !done.load(Ordering::SeqCst) || i < 1_000 {
                    let route = tree.resolve(&format!("reader-{reader}-{i}")).unwrap().unwrap();
                    assert!(valid.contains(leaf_of(&route)), "torn route {route}");
                    i += 1;
                }
            });
        }
    });

    assert_eq!(tree.paths().unwrap(), vec!["D1-S1-T1", "D1-S1-T2", "D2-S1-T1"]);
}

fn level() -> impl Strategy<Value = String> {
    "[A-Z][0-9]{1,2}"
}

proptest! {
    #[test]
    fn prop_path_round_trip(levels in prop::collection::vec(level(), 1..5)) {
        let path = levels.join("-");
        let tree = RoutingTree::default();

        tree.add_path(&path).unwrap();
        prop_assert!(tree.path_exists(&path).unwrap());
        prop_assert_eq!(tree.resolve("any key").unwrap(), Some(format!("{path}-")));

        prop_assert!(tree.remove_path(&path).unwrap());
        prop_assert!(!tree.path_exists(&path).unwrap());
        prop_assert!(tree.is_empty().unwrap());
    }

    #[test]
    fn prop_removing_one_path_keeps_the_others(
        paths in prop::collection::hash_set(
            prop::collection::vec(level(), 1..4).prop_map(|l| l.join("-")),
            2..8,
        ),
    ) {
        let paths: Vec<String> = paths.into_iter().collect();
        let tree = RoutingTree::default();
        for path in &paths {
            tree.add_path(path).unwrap();
        }

        let removed = &paths[0];
        tree.remove_path(removed).unwrap();

        for path in &paths[1..] {
            // Ancestors of the removed path may have been pruned.
            if removed.starts_with(&format!("{path}-")) {
                continue;
            }
            // A path nested under the removed one goes with it.
            let nested = path.starts_with(&format!("{removed}-"));
            prop_assert_eq!(tree.path_exists(path).unwrap(), !nested);
        }
    }
}
