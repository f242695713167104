use uuid::Uuid;

use crate::types::AggregateSequence;

/// The current state produced by folding `created` then `updated` over an aggregate's events,
/// in sequence order.
///
/// Aggregate values are transient: they're rebuilt on every command, never persisted directly.
#[derive(Debug, Clone)]
pub struct AggregateState<S> {
    id: Uuid,
    aggregate_sequence: AggregateSequence,
    inner: S,
}

impl<S> AggregateState<S> {
    pub fn new(id: Uuid, inner: S, aggregate_sequence: AggregateSequence) -> Self {
        Self {
            id,
            inner,
            aggregate_sequence,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// The `aggregate_sequence` of the last event folded into this state. `0` for an
    /// as-yet-unpersisted aggregate.
    pub fn aggregate_sequence(&self) -> AggregateSequence {
        self.aggregate_sequence
    }

    pub fn next_aggregate_sequence(&self) -> AggregateSequence {
        self.aggregate_sequence + 1
    }

    pub(crate) fn set_inner(&mut self, inner: S) {
        self.inner = inner;
    }

    pub(crate) fn set_aggregate_sequence(&mut self, aggregate_sequence: AggregateSequence) {
        self.aggregate_sequence = aggregate_sequence;
    }
}
