use async_trait::async_trait;
use uuid::Uuid;

use crate::aggregate::{Aggregate, AnyEvent};
use crate::error::StoreError;
use crate::event::{Event, SequencedEvent};
use crate::types::Sequence;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub(crate) mod statements;

/// An `EventStore` is responsible for persisting the events an aggregate emits into a database,
/// and for loading the events that represent an aggregate's history back out.
///
/// This is the synchronization point of the whole runtime: writes are serialized per-aggregate
/// by the `(aggregate_id, aggregate_sequence)` uniqueness invariant (§5), and the store-global
/// `sequence` is a total order matching commit order of successful sinks.
#[async_trait]
pub trait EventStore<A: Aggregate>: Send + Sync {
    /// Appends `events` atomically:
    /// 1. opens a transaction;
    /// 2. runs the configured blocking-lock hook;
    /// 3. serializes, validates and inserts each event in order, mapping a unique-constraint
    ///    violation to [`StoreError::Concurrency`];
    /// 4. inside the same transaction, delivers every new event to all registered synchronous
    ///    [`crate::processor::EventProcessor`]s — any error aborts the transaction;
    /// 5. upserts the per-event-class high-water mark in the sequence-stats table;
    /// 6. commits.
    ///
    /// All events in `events` must belong to the same `aggregate_id`.
    async fn sink(
        &self,
        events: Vec<Event<AnyEvent<A>, A::Metadata>>,
    ) -> Result<Vec<SequencedEvent<AnyEvent<A>, A::Metadata>>, StoreError>;

    /// All events for `aggregate_id`, in ascending `aggregate_sequence` order.
    async fn events_for(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Vec<Event<AnyEvent<A>, A::Metadata>>, StoreError>;

    /// At most `batch_size` events with store-global `sequence` strictly greater than
    /// `sequence`, optionally filtered to `event_classes` (empty = no filter), ordered by
    /// ascending sequence.
    async fn get_after(
        &self,
        sequence: Sequence,
        event_classes: &[&'static str],
        batch_size: u32,
    ) -> Result<Vec<SequencedEvent<AnyEvent<A>, A::Metadata>>, StoreError>;

    /// The maximum store-global sequence, optionally filtered to `event_classes`. Backed by the
    /// cached sequence-stats table, updated atomically alongside `sink`.
    async fn last_sequence(&self, event_classes: &[&'static str]) -> Result<Sequence, StoreError>;

    /// Registers a processor that runs synchronously, inside the `sink` transaction, in
    /// registration order alongside any previously-registered processors.
    fn add_synchronous_processor(&mut self, processor: Box<dyn crate::processor::EventProcessor<A>>);
}

/// Strategy controlling whether `sink` serializes against a coarse, store-wide lock before
/// writing. Default is [`LockStrategy::None`]. See §4.C / §5.
#[derive(Debug, Clone)]
pub enum LockStrategy {
    /// No additional locking beyond the `(aggregate_id, aggregate_sequence)` uniqueness
    /// constraint. Used by the SQLite dialect and by Postgres stores that don't need coarse
    /// serialization.
    None,
    /// Acquire a transaction-scoped advisory lock, bounded by the given timeout. Timeout maps
    /// to [`StoreError::Locking`]. Postgres only.
    AdvisoryTimeout(std::time::Duration),
}

impl Default for LockStrategy {
    fn default() -> Self {
        LockStrategy::None
    }
}
