//! Domain-event <-> JSON serializer. Grounded on the teacher's `Upcaster`/`Schema` split
//! (`src/esrs/event.rs`, `store/postgres/schema.rs`): snake_case field naming, ISO-8601
//! date-times (handled by `chrono`'s `Serialize` impl, never numeric), and an upcast hook
//! applied only on read.
//!
//! The "registry" the Design Notes call for is, here, just "try the type the caller asked
//! for": `AnyEvent<A>`'s two variants are two concrete, compile-time-known Rust types
//! (`A::CreationEvent`, `A::UpdateEvent`), so there's no reflective class lookup to replace —
//! the store already knows, from the row's `aggregate_sequence`, which of the two to
//! deserialize into (invariant: only `aggregate_sequence == 1` is a creation event).

use serde_json::Value;

use crate::aggregate::{Aggregate, AnyEvent};
use crate::error::StoreError;
use crate::event::DomainEvent;

/// Decodes a persisted event body into the right half of [`AnyEvent`], based on whether
/// `aggregate_sequence` marks this as the aggregate's creation event.
pub(crate) fn decode_payload<A: Aggregate>(
    aggregate_sequence: i64,
    _event_type: &str,
    body: Value,
) -> Result<AnyEvent<A>, StoreError> {
    if aggregate_sequence == 1 {
        Ok(AnyEvent::Creation(decode_one::<A::CreationEvent>(body)?))
    } else {
        Ok(AnyEvent::Update(decode_one::<A::UpdateEvent>(body)?))
    }
}

#[cfg(feature = "upcasting")]
fn decode_one<E: DomainEvent + crate::event::Upcaster>(body: Value) -> Result<E, StoreError> {
    serde_json::from_value(body.clone())
        .or_else(|_| E::upcast(body))
        .map_err(StoreError::EventBodySerialization)
}

#[cfg(not(feature = "upcasting"))]
fn decode_one<E: DomainEvent>(body: Value) -> Result<E, StoreError> {
    serde_json::from_value(body).map_err(StoreError::EventBodySerialization)
}

/// Pre-commit validation (§4.B): every produced body must deserialize back to its declared
/// type before the insert is allowed to proceed.
pub(crate) fn validate_body_round_trip<A: Aggregate>(aggregate_sequence: i64, value: &Value) -> Result<(), StoreError> {
    if aggregate_sequence == 1 {
        serde_json::from_value::<A::CreationEvent>(value.clone())
            .map(|_| ())
            .map_err(StoreError::EventBodySerialization)
    } else {
        serde_json::from_value::<A::UpdateEvent>(value.clone())
            .map(|_| ())
            .map_err(StoreError::EventBodySerialization)
    }
}
