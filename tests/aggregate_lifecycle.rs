mod common;

use std::sync::Arc;

use rand::Rng;
use uuid::Uuid;

use esrs_runtime::gateway::Gateway;
use esrs_runtime::store::sqlite::SqliteEventStore;
use esrs_runtime::store::EventStore;
use esrs_runtime::{CommandError, StandardMetadata};

use common::{Counter, CounterUpdateCommand, Open};

async fn gateway_and_store() -> (Gateway<Counter>, Arc<SqliteEventStore<Counter>>) {
    let pool = common::sqlite_pool().await;
    let store = Arc::new(
        SqliteEventStore::<Counter>::new(pool)
            .await
            .expect("failed to build event store"),
    );
    (Gateway::new(store.clone(), ()), store)
}

#[tokio::test]
async fn create_then_update_folds_state_in_order() {
    let (gateway, _store) = gateway_and_store().await;
    let aggregate_id = Uuid::new_v4();
    let metadata = StandardMetadata::new(Uuid::new_v4());
    let opening_balance = rand::thread_rng().gen_range(0..1_000);

    let state = gateway
        .create(aggregate_id, metadata.clone(), Open { opening_balance })
        .await
        .expect("create should succeed");
    assert_eq!(state.inner().value, opening_balance);
    assert_eq!(state.aggregate_sequence(), 1);

    let state = gateway
        .update(aggregate_id, metadata.clone(), CounterUpdateCommand::Increment { amount: 5 })
        .await
        .expect("increment should succeed");
    assert_eq!(state.inner().value, opening_balance + 5);
    assert_eq!(state.aggregate_sequence(), 2);

    let state = gateway
        .update(aggregate_id, metadata, CounterUpdateCommand::Decrement { amount: 3 })
        .await
        .expect("decrement should succeed");
    assert_eq!(state.inner().value, opening_balance + 2);
    assert_eq!(state.aggregate_sequence(), 3);
}

#[tokio::test]
async fn update_rejects_command_that_would_go_negative() {
    let (gateway, _store) = gateway_and_store().await;
    let aggregate_id = Uuid::new_v4();
    let metadata = StandardMetadata::new(Uuid::new_v4());

    gateway
        .create(aggregate_id, metadata.clone(), Open { opening_balance: 2 })
        .await
        .expect("create should succeed");

    let result = gateway
        .update(aggregate_id, metadata, CounterUpdateCommand::Decrement { amount: 5 })
        .await;

    assert!(matches!(result, Err(CommandError::Domain(_))));
}

#[tokio::test]
async fn update_on_unknown_aggregate_is_not_found() {
    let (gateway, _store) = gateway_and_store().await;
    let metadata = StandardMetadata::new(Uuid::new_v4());

    let result = gateway
        .update(Uuid::new_v4(), metadata, CounterUpdateCommand::Increment { amount: 1 })
        .await;

    assert!(matches!(result, Err(CommandError::AggregateNotFound(_))));
}

#[tokio::test]
async fn events_for_returns_full_history_in_aggregate_sequence_order() {
    let (gateway, store) = gateway_and_store().await;
    let aggregate_id = Uuid::new_v4();
    let metadata = StandardMetadata::new(Uuid::new_v4());

    gateway
        .create(aggregate_id, metadata.clone(), Open { opening_balance: 0 })
        .await
        .unwrap();
    gateway
        .update(aggregate_id, metadata.clone(), CounterUpdateCommand::Increment { amount: 1 })
        .await
        .unwrap();
    gateway
        .update(aggregate_id, metadata, CounterUpdateCommand::Increment { amount: 1 })
        .await
        .unwrap();

    let events = store.events_for(aggregate_id).await.unwrap();
    let sequences: Vec<i64> = events.iter().map(|event| event.aggregate_sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[tokio::test]
async fn concurrent_creation_of_the_same_aggregate_id_reports_concurrency() {
    let (gateway, _store) = gateway_and_store().await;
    let aggregate_id = Uuid::new_v4();
    let metadata = StandardMetadata::new(Uuid::new_v4());

    gateway
        .create(aggregate_id, metadata.clone(), Open { opening_balance: 0 })
        .await
        .expect("first create should succeed");

    let result = gateway.create(aggregate_id, metadata, Open { opening_balance: 0 }).await;

    assert!(matches!(result, Err(CommandError::Concurrency)));
}
