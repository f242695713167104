use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::error::StoreError;
use crate::types::Sequence;

/// Tracks how far a named consumer (an async processor) has progressed through the store-global
/// event log, so it can resume after a crash without reprocessing from the start.
///
/// No direct teacher analogue: the teacher's `rebuilder` replays the whole table every time
/// rather than tracking a resumable cursor. Grounded on the same `sqlx` upsert idiom as
/// [`crate::store::EventStore`]'s sequence-stats table.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// The last sequence processed under `name`. `0` for a name never seen before.
    async fn bookmark_for(&self, name: &str) -> Result<Sequence, StoreError>;

    /// Records `sequence` as the new position for `name`, inserting the row if absent or
    /// updating it in place otherwise.
    async fn save(&self, name: &str, sequence: Sequence) -> Result<(), StoreError>;
}
