use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::types::{AggregateId, AggregateSequence, EventId, Sequence};

/// A polymorphic domain event payload, discriminated by [`DomainEvent::event_type`], which is
/// the sole key used both for deserialization (class-name -> concrete type resolution) and for
/// event-class filtering in [`crate::store::EventStore::get_after`].
///
/// `event_type` must equal the event's canonical class name and must be stable: once events of
/// a given type have been persisted, the tag can never be repurposed for a different payload.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The canonical class name used as the `event_type` column value.
    fn event_type(&self) -> &'static str;
}

/// Migrates an old, persisted representation of an event class to its current form. Applied on
/// read, never on write. See §4.B / §6 upcast semantics.
#[cfg(feature = "upcasting")]
pub trait Upcaster: Sized {
    /// Attempt to migrate a raw JSON body (as persisted for this event type) into `Self`.
    fn upcast(value: serde_json::Value) -> Result<Self, serde_json::Error>;
}

/// An immutable event record. Carries a globally unique id, the owning aggregate id, an
/// aggregate-scoped monotonic sequence number starting at 1, the aggregate-type tag, the
/// creation timestamp, a metadata record and a typed domain-event payload.
///
/// Equality is structural: two events with identical fields are equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<E, M> {
    pub id: EventId,
    pub aggregate_id: AggregateId,
    pub aggregate_sequence: AggregateSequence,
    pub aggregate_type: &'static str,
    pub created_at: DateTime<Utc>,
    pub metadata: M,
    pub payload: E,
}

/// A [`Event`] paired with the store-global, strictly increasing log position it was assigned
/// on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent<E, M> {
    pub event: Event<E, M>,
    pub sequence: Sequence,
}

impl<E, M> SequencedEvent<E, M> {
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub fn payload(&self) -> &E {
        &self.event.payload
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.event.aggregate_id
    }
}
