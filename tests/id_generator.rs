use std::collections::HashSet;
use std::sync::Arc;

use stampede::cache::IdPrefix;
use stampede::id::{IdComponents, IdGenerator};
use stampede::store::MemoryStore;
use time::macros::datetime;

fn generator() -> IdGenerator {
    IdGenerator::new(Arc::new(MemoryStore::new()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_share_an_id() {
    let ids = generator();
    let prefix = IdPrefix::new("order").expect("valid prefix");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let ids = ids.clone();
            let prefix = prefix.clone();
            tokio::spawn(async move {
                let mut minted = Vec::with_capacity(250);
                for _ in 0..250 {
                    minted.push(ids.next_id(&prefix).await.expect("id"));
                }
                minted
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for task in tasks {
        for id in task.await.expect("task") {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen.len(), 2_000);
}

#[tokio::test]
async fn ids_within_one_second_strictly_increase() {
    let ids = generator();
    let prefix = IdPrefix::new("order").expect("valid prefix");
    let now = datetime!(2024-06-01 08:00:00 UTC);

    let mut previous = ids.next_id_at(&prefix, now).await.expect("id");
    for expected_sequence in 2..=20 {
        let id = ids.next_id_at(&prefix, now).await.expect("id");
        assert!(id > previous);
        assert_eq!(IdComponents::decode(id).sequence, expected_sequence);
        previous = id;
    }
}

#[tokio::test]
async fn next_day_ids_sort_after_previous_day() {
    let ids = generator();
    let prefix = IdPrefix::new("order").expect("valid prefix");

    let mut late = 0;
    for _ in 0..100 {
        late = ids
            .next_id_at(&prefix, datetime!(2024-06-01 23:59:59 UTC))
            .await
            .expect("id");
    }
    let early_next_day = ids
        .next_id_at(&prefix, datetime!(2024-06-02 00:00:00 UTC))
        .await
        .expect("id");

    assert_eq!(IdComponents::decode(early_next_day).sequence, 1);
    assert!(early_next_day > late);
}

#[tokio::test]
async fn prefixes_keep_independent_counters() {
    let ids = generator();
    let now = datetime!(2024-06-01 12:00:00 UTC);
    let orders = IdPrefix::new("order").expect("valid prefix");
    let vouchers = IdPrefix::new("voucher").expect("valid prefix");

    ids.next_id_at(&orders, now).await.expect("id");
    ids.next_id_at(&orders, now).await.expect("id");
    let voucher = ids.next_id_at(&vouchers, now).await.expect("id");

    assert_eq!(IdComponents::decode(voucher).sequence, 1);
}
