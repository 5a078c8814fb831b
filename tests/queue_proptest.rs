//! Property-based tests for the action queue and backoff

use claimsync::client::local_db::LocalDatabase;
use claimsync::client::offline::{ActionQueue, BackoffStrategy, StorageQuota};
use claimsync::shared::error::SyncError;
use claimsync::shared::mutation::{EntityKind, MutationIntent, OperationKind};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Op {
    Enqueue { entity: u8, size: usize },
    RemoveOldest,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..4, 0usize..400).prop_map(|(entity, size)| Op::Enqueue { entity, size }),
        1 => Just(Op::RemoveOldest),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_quota_is_conserved(quota in 200u64..2000, ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let db = LocalDatabase::in_memory().await.unwrap();
            let queue = ActionQueue::new(db, Arc::new(StorageQuota::new(quota)));

            for op in ops {
                match op {
                    Op::Enqueue { entity, size } => {
                        let intent = MutationIntent::new(
                            EntityKind::Claim,
                            OperationKind::Update,
                            json!({ "id": format!("C{}", entity), "notes": "x".repeat(size) }),
                            Some("1".to_string()),
                            5,
                        )
                        .unwrap();
                        let depth = queue.len().await;
                        match queue.enqueue(intent).await {
                            Ok(_) => prop_assert_eq!(queue.len().await, depth + 1),
                            Err(SyncError::QuotaExceeded { .. }) => prop_assert_eq!(queue.len().await, depth),
                            Err(e) => prop_assert!(false, "unexpected error: {}", e),
                        }
                    }
                    Op::RemoveOldest => {
                        if let Some(first) = queue.list().await.first() {
                            queue.remove(&first.id).await.unwrap();
                        }
                    }
                }

                let queued: u64 = queue.list().await.iter().map(|i| i.payload_bytes).sum();
                prop_assert_eq!(queue.quota().used(), queued);
                prop_assert!(queued <= quota);
            }
            Ok(())
        })?;
    }

    #[test]
    fn test_ready_set_has_one_head_per_entity(entities in prop::collection::vec(0u8..5, 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let db = LocalDatabase::in_memory().await.unwrap();
            let queue = ActionQueue::new(db, Arc::new(StorageQuota::new(u64::MAX)));

            for entity in &entities {
                let intent = MutationIntent::new(
                    EntityKind::Claim,
                    OperationKind::Update,
                    json!({ "id": format!("C{}", entity) }),
                    Some("1".to_string()),
                    5,
                )
                .unwrap();
                queue.enqueue(intent).await.unwrap();
            }

            let ready = queue.peek_ready(&HashSet::new(), Instant::now()).await;
            let keys: HashSet<_> = ready.iter().map(|i| i.key()).collect();
            let distinct: HashSet<_> = entities.iter().collect();
            prop_assert_eq!(keys.len(), ready.len());
            prop_assert_eq!(ready.len(), distinct.len());

            // Each ready intent is the first queued one for its key.
            let all = queue.list().await;
            for intent in &ready {
                let head = all.iter().find(|i| i.key() == intent.key()).unwrap();
                prop_assert_eq!(head.id, intent.id);
            }
            Ok(())
        })?;
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..600_000,
        jitter in 0.0f64..=1.0,
        sample in 0.0f64..1.0,
    ) {
        let base = Duration::from_millis(base_ms);
        let max = base + Duration::from_millis(extra_ms);
        let backoff = BackoffStrategy::exponential(base, max, jitter);

        let mut previous_floor = Duration::ZERO;
        for attempt in 0..40 {
            let (floor, ceiling) = backoff.bounds(attempt);
            prop_assert!(floor >= previous_floor);
            prop_assert!(floor <= ceiling);
            prop_assert!(ceiling <= max);

            let delay = backoff.delay_with_sample(attempt, sample);
            prop_assert!(delay >= floor && delay <= ceiling);
            previous_floor = floor;
        }
        prop_assert_eq!(backoff.bounds(0).0, base);
    }
}
