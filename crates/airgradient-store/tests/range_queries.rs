//! Property tests for archive range queries.
//!
//! Each case builds an in-memory archive from a random strictly increasing
//! timestamp sequence and checks the SQL results against a plain filter.

use std::collections::BTreeSet;

use airgradient_store::{ArchiveQuery, Error, Store};
use airgradient_types::{AveragedRecord, DeviceInfo, SensorValues};
use proptest::prelude::*;
use time::OffsetDateTime;

fn record(ts: i64) -> AveragedRecord {
    AveragedRecord {
        values: SensorValues {
            rco2: Some(ts as f64),
            ..Default::default()
        },
        info: DeviceInfo::default(),
        timestamp: OffsetDateTime::from_unix_timestamp(ts).unwrap(),
        samples: 1,
    }
}

fn archive(ts: &BTreeSet<i64>) -> Store {
    let mut store = Store::open_in_memory().unwrap();
    for &t in ts {
        store.append(&record(t)).unwrap();
    }
    store
}

fn run(store: &Store, query: ArchiveQuery) -> Vec<i64> {
    store
        .query(&query)
        .unwrap()
        .iter()
        .map(|r| r.unix_timestamp())
        .collect()
}

fn timestamps() -> impl Strategy<Value = BTreeSet<i64>> {
    prop::collection::btree_set(0i64..2_000, 0..40)
}

proptest! {
    #[test]
    fn since_only_returns_everything_at_or_after(ts in timestamps(), since in -10i64..2_010) {
        let store = archive(&ts);
        let expected: Vec<i64> = ts.iter().copied().filter(|&t| t >= since).collect();
        prop_assert_eq!(run(&store, ArchiveQuery::since(since)), expected);
    }

    #[test]
    fn adding_max_excludes_since_itself(ts in timestamps(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!ts.is_empty());
        let since = *ts.iter().nth(pick.index(ts.len())).unwrap();
        let store = archive(&ts);

        let inclusive = run(&store, ArchiveQuery::since(since));
        prop_assert_eq!(inclusive.first().copied(), Some(since));

        let bounded = run(&store, ArchiveQuery::since(since).max(i64::MAX));
        prop_assert!(!bounded.contains(&since));
        prop_assert_eq!(&bounded[..], &inclusive[1..]);
    }

    #[test]
    fn range_is_exclusive_inclusive(ts in timestamps(), a in 0i64..2_000, b in 0i64..2_000) {
        let store = archive(&ts);
        let expected: Vec<i64> = ts.iter().copied().filter(|&t| t > a && t <= b).collect();
        prop_assert_eq!(run(&store, ArchiveQuery::since(a).max(b)), expected);
    }

    #[test]
    fn limit_returns_earliest_after_since(ts in timestamps(), since in 0i64..2_000, limit in 1u32..20) {
        let store = archive(&ts);
        let after: Vec<i64> = ts.iter().copied().filter(|&t| t > since).collect();
        let got = run(&store, ArchiveQuery::since(since).limit(limit));

        prop_assert_eq!(got.len(), after.len().min(limit as usize));
        prop_assert_eq!(&got[..], &after[..got.len()]);
    }

    #[test]
    fn all_three_truncate_the_range(
        ts in timestamps(),
        a in 0i64..2_000,
        b in 0i64..2_000,
        limit in 1u32..20,
    ) {
        let store = archive(&ts);
        let expected: Vec<i64> = ts
            .iter()
            .copied()
            .filter(|&t| t > a && t <= b)
            .take(limit as usize)
            .collect();
        prop_assert_eq!(run(&store, ArchiveQuery::since(a).max(b).limit(limit)), expected);
    }

    #[test]
    fn out_of_order_appends_are_rejected(ts in timestamps(), extra in 0i64..2_000) {
        prop_assume!(!ts.is_empty());
        let mut store = archive(&ts);
        let last = *ts.iter().next_back().unwrap();

        let result = store.append(&record(extra));
        if extra > last {
            prop_assert!(result.is_ok());
            prop_assert_eq!(store.count().unwrap(), ts.len() as u64 + 1);
        } else {
            let rejected = matches!(result, Err(Error::NonMonotonicTimestamp { .. }));
            prop_assert!(rejected);
            prop_assert_eq!(store.count().unwrap(), ts.len() as u64);
        }
    }
}
