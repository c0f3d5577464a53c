//! Property: set uniqueness
//!
//! However many callers race on `find_or_create` for overlapping names,
//! each name ends up as exactly one test set and every caller sees it.

use std::thread;

use kcheck::{Registry, RegistryError};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn find_or_create_yields_one_set_per_name(
        names in prop::collection::vec("[a-z]{1,4}", 1..12),
        workers in 2usize..6,
    ) {
        let registry = Registry::new();

        thread::scope(|s| {
            for _ in 0..workers {
                let registry = &registry;
                let names = &names;
                s.spawn(move || {
                    for name in names {
                        let info = registry.find_or_create(name).unwrap();
                        assert_eq!(&info.name, name);
                    }
                });
            }
        });

        let mut distinct = names.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(registry.size(), distinct.len());
        prop_assert_eq!(registry.case_names(), distinct.clone());

        for name in &distinct {
            prop_assert!(
                matches!(registry.create(name), Err(RegistryError::Duplicate { .. })),
                "create({}) should report a duplicate",
                name
            );
        }
        prop_assert!(registry.shutdown().is_ok());
    }
}
