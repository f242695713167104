use uuid::Uuid;

/// Store-global, strictly increasing log position. Assigned by the store on insert.
pub type Sequence = i64;

/// Per-aggregate, 1-based ordinal. The first event of any aggregate has `aggregate_sequence == 1`.
pub type AggregateSequence = i64;

/// Uniquely identifies an aggregate instance.
pub type AggregateId = Uuid;

/// Uniquely identifies a single event, across all aggregates.
pub type EventId = Uuid;
