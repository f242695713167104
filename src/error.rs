/// Errors the event store itself can raise. Distinct from [`CommandError`](crate::gateway::CommandError):
/// this is the store's own vocabulary, which the gateway then maps into command-level errors.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying SQL driver error, not otherwise classified.
    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    /// `(aggregate_id, aggregate_sequence)` or `event_id` already exists. Retriable by the
    /// gateway.
    #[error("concurrent write detected for this aggregate")]
    Concurrency,

    /// The configured blocking-lock strategy failed to acquire its lock within the bound.
    #[error("failed to acquire store lock: {0}")]
    Locking(String),

    /// A produced event body failed to round-trip through the serializer pre-commit. Fatal:
    /// indicates a programming error in the aggregate's event types.
    #[error("event body failed to serialize/round-trip: {0}")]
    EventBodySerialization(serde_json::Error),

    /// A produced metadata record failed to round-trip through the serializer pre-commit, or
    /// didn't match the store's configured (or event-class-overridden) metadata type. Fatal.
    #[error("event metadata failed to serialize/round-trip: {0}")]
    EventMetadataSerialization(serde_json::Error),

    /// A synchronous event processor failed while handling an event inside the `sink`
    /// transaction. The transaction is rolled back.
    #[error("synchronous event processor failed: {0}")]
    ProcessorFailed(#[from] crate::processor::ProcessorError),
}

impl StoreError {
    /// Maps a raw SQL error into [`StoreError::Concurrency`] when it represents a violation of
    /// the `(aggregate_id, aggregate_sequence)` or `event_id` uniqueness invariant, passing
    /// everything else through unchanged.
    pub fn from_sql(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            StoreError::Concurrency
        } else {
            StoreError::Sql(err)
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| code == "23505" || code == "2067" || code == "1555")
            .unwrap_or(false),
        _ => false,
    }
}
