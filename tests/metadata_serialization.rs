mod common;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use esrs_runtime::gateway::Gateway;
use esrs_runtime::store::sqlite::SqliteEventStore;
use esrs_runtime::store::EventStore;
use esrs_runtime::{Aggregate, CommandError, DomainEvent, Metadata, StoreError};

/// Metadata carrying a numeric field, so a malformed value (`NaN`) can make serialization fail —
/// `StandardMetadata`/`EmptyMetadata` have no field JSON can reject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NumericMetadata {
    correlation_id: Uuid,
    score: f64,
}

impl Metadata for NumericMetadata {
    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

struct Ping;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Pinged;

impl DomainEvent for Pinged {
    fn event_type(&self) -> &'static str {
        "pinged"
    }
}

#[cfg(feature = "upcasting")]
impl esrs_runtime::Upcaster for Pinged {
    fn upcast(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Default)]
struct PingState;

#[derive(Debug, Clone)]
struct SendPing;

#[derive(Debug, Error)]
enum PingError {}

impl Aggregate for Ping {
    const NAME: &'static str = "ping";

    type State = PingState;
    type Metadata = NumericMetadata;
    type Projection = ();
    type CreationCommand = SendPing;
    type UpdateCommand = SendPing;
    type CreationEvent = Pinged;
    type UpdateEvent = Pinged;
    type Error = PingError;

    fn create(_projection: &(), _metadata: &NumericMetadata, _command: SendPing) -> Result<Pinged, PingError> {
        Ok(Pinged)
    }

    fn created(_event: &Pinged) -> PingState {
        PingState
    }

    fn update(
        _projection: &(),
        _state: &PingState,
        _metadata: &NumericMetadata,
        _command: SendPing,
    ) -> Result<Vec<Pinged>, PingError> {
        Ok(vec![Pinged])
    }

    fn updated(state: PingState, _event: &Pinged) -> PingState {
        state
    }
}

/// S4: a produced metadata record that can't round-trip through JSON (`NaN` has no JSON
/// representation) aborts `sink` before any row is written, surfacing as
/// `StoreError::EventMetadataSerialization` rather than a partially-committed event.
#[tokio::test]
async fn create_with_non_finite_metadata_fails_and_writes_no_row() {
    let pool = common::sqlite_pool().await;
    let store = Arc::new(SqliteEventStore::<Ping>::new(pool).await.unwrap());
    let gateway = Gateway::new(store.clone(), ());
    let aggregate_id = Uuid::new_v4();
    let metadata = NumericMetadata {
        correlation_id: Uuid::new_v4(),
        score: f64::NAN,
    };

    let result = gateway.create(aggregate_id, metadata, SendPing).await;

    assert!(matches!(
        result,
        Err(CommandError::Store(StoreError::EventMetadataSerialization(_)))
    ));

    let events = store.events_for(aggregate_id).await.unwrap();
    assert!(events.is_empty());
}
