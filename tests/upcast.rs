mod common;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use esrs_runtime::store::sqlite::SqliteEventStore;
use esrs_runtime::store::EventStore;
use esrs_runtime::{Aggregate, DomainEvent, StandardMetadata, Upcaster};

struct Invitee;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Invited;

impl DomainEvent for Invited {
    fn event_type(&self) -> &'static str {
        "invited"
    }
}

impl Upcaster for Invited {
    fn upcast(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Current shape of the "reinvited" event. Rows persisted before this field was renamed carry
/// `count` instead of `reminder_count`; `upcast` migrates those on read, storage untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Reinvited {
    reminder_count: u32,
}

impl DomainEvent for Reinvited {
    fn event_type(&self) -> &'static str {
        "reinvited"
    }
}

impl Upcaster for Reinvited {
    fn upcast(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Rereinvited {
            count: u32,
        }

        let old: Rereinvited = serde_json::from_value(value)?;
        Ok(Reinvited {
            reminder_count: old.count,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct InviteeState {
    reinvite_count: u32,
}

#[derive(Debug, Clone)]
struct Invite;

#[derive(Debug, Clone)]
struct Reinvite;

#[derive(Debug, Error)]
enum InviteeError {}

impl Aggregate for Invitee {
    const NAME: &'static str = "invitee";

    type State = InviteeState;
    type Metadata = StandardMetadata;
    type Projection = ();
    type CreationCommand = Invite;
    type UpdateCommand = Reinvite;
    type CreationEvent = Invited;
    type UpdateEvent = Reinvited;
    type Error = InviteeError;

    fn create(_projection: &(), _metadata: &StandardMetadata, _command: Invite) -> Result<Invited, InviteeError> {
        Ok(Invited)
    }

    fn created(_event: &Invited) -> InviteeState {
        InviteeState::default()
    }

    fn update(
        _projection: &(),
        state: &InviteeState,
        _metadata: &StandardMetadata,
        _command: Reinvite,
    ) -> Result<Vec<Reinvited>, InviteeError> {
        Ok(vec![Reinvited {
            reminder_count: state.reinvite_count + 1,
        }])
    }

    fn updated(mut state: InviteeState, event: &Reinvited) -> InviteeState {
        state.reinvite_count = event.reminder_count;
        state
    }
}

/// S6: a row persisted under an older body shape (`{"count": n}`) decodes, on read, into the
/// current `Reinvited { reminder_count }` shape via `Upcaster::upcast`, without rewriting storage.
/// The row is inserted directly with raw SQL to stand in for data written by an older version of
/// this aggregate's code, since the gateway itself only ever produces the current shape.
#[tokio::test]
async fn decode_upcasts_a_legacy_event_body_shape() {
    let pool = common::sqlite_pool().await;
    let store = Arc::new(SqliteEventStore::<Invitee>::new(pool.clone()).await.unwrap());

    let aggregate_id = Uuid::new_v4();
    let metadata_json = serde_json::to_string(&StandardMetadata::new(Uuid::new_v4())).unwrap();

    sqlx::query(
        "INSERT INTO invitee_events
         (id, aggregate_id, aggregate_type, aggregate_sequence, event_type, created_at, json_body, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(aggregate_id.to_string())
    .bind("invitee")
    .bind(1_i64)
    .bind("invited")
    .bind(chrono::Utc::now().to_rfc3339())
    .bind("null")
    .bind(&metadata_json)
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO invitee_events
         (id, aggregate_id, aggregate_type, aggregate_sequence, event_type, created_at, json_body, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(aggregate_id.to_string())
    .bind("invitee")
    .bind(2_i64)
    .bind("reinvited")
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(serde_json::json!({"count": 2}).to_string())
    .bind(&metadata_json)
    .execute(&pool)
    .await
    .unwrap();

    let events = store.events_for(aggregate_id).await.unwrap();
    assert_eq!(events.len(), 2);

    let reinvited = events[1].payload.as_update().expect("second event is an update");
    assert_eq!(reinvited.reminder_count, 2);
}
