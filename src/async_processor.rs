use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::aggregate::Aggregate;
use crate::bookmark::BookmarkStore;
use crate::processor::ProcessorError;
use crate::store::EventStore;
use crate::types::Sequence;

/// Default number of events fetched per [`BatchedAsyncEventProcessor::process_one_batch`] call.
pub const DEFAULT_BATCH_SIZE: u32 = 1000;

/// Outcome of a single batch: whether there's more work immediately available, or the consumer
/// caught up to the log's current tail and should back off before polling again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// A full batch was fetched and processed; call again immediately, there may be more.
    Continue,
    /// Fewer than `batch_size` events were available; the consumer is caught up for now.
    Wait,
}

/// Polls an [`EventStore`] from a resumable bookmark, delivering each fetched event to a single
/// [`crate::processor::EventProcessor`] and advancing the bookmark only after a successful
/// delivery.
///
/// No direct teacher analogue — the teacher's `PgRebuilder` (`src/rebuilder/pg_rebuilder.rs`)
/// replays the entire table every run rather than tracking a resumable cursor. The polling shape
/// itself (fetch batch, deliver, advance bookmark, repeat) is grounded on the teacher's
/// async-everywhere style (`tokio` with `features = ["full"]`).
pub struct BatchedAsyncEventProcessor<A: Aggregate> {
    event_source: Arc<dyn EventStore<A>>,
    bookmark_store: Arc<dyn BookmarkStore>,
    bookmark_name: String,
    event_processor: Box<dyn crate::processor::EventProcessor<A>>,
    batch_size: u32,
}

impl<A: Aggregate> BatchedAsyncEventProcessor<A> {
    pub fn new(
        event_source: Arc<dyn EventStore<A>>,
        bookmark_store: Arc<dyn BookmarkStore>,
        bookmark_name: impl Into<String>,
        event_processor: Box<dyn crate::processor::EventProcessor<A>>,
    ) -> Self {
        Self {
            event_source,
            bookmark_store,
            bookmark_name: bookmark_name.into(),
            event_processor,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn bookmark_name(&self) -> &str {
        &self.bookmark_name
    }

    pub async fn current_bookmark(&self) -> Result<Sequence, crate::error::StoreError> {
        self.bookmark_store.bookmark_for(&self.bookmark_name).await
    }

    /// Fetches at most `batch_size` events past the current bookmark, delivers each in order to
    /// the configured processor, and advances the bookmark to the last delivered sequence.
    ///
    /// A processor error for one event aborts the batch without advancing the bookmark past the
    /// last successfully delivered event, so a retry on the next call redelivers it — handlers
    /// are expected to be idempotent (see [`crate::processor::EventProcessor`]).
    pub async fn process_one_batch(&self) -> Result<BatchOutcome, ProcessorError> {
        let bookmark = self.bookmark_store.bookmark_for(&self.bookmark_name).await?;
        let event_classes = self.event_processor.event_classes();

        let batch = self
            .event_source
            .get_after(bookmark, event_classes, self.batch_size)
            .await?;

        let fetched = batch.len() as u32;

        for sequenced_event in &batch {
            self.event_processor.process(sequenced_event).await?;
            self.bookmark_store
                .save(&self.bookmark_name, sequenced_event.sequence())
                .await?;
        }

        Ok(if fetched < self.batch_size {
            BatchOutcome::Wait
        } else {
            BatchOutcome::Continue
        })
    }
}

/// Runs a fixed set of [`BatchedAsyncEventProcessor`]s concurrently, each in its own loop,
/// backing off between batches on [`BatchOutcome::Wait`] and stopping cooperatively: a stopped
/// consumer simply isn't invoked again, it is never interrupted mid-[`BatchedAsyncEventProcessor::process_one_batch`].
pub struct Supervisor {
    stop: Arc<AtomicBool>,
    wait_backoff: Duration,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            wait_backoff: Duration::from_millis(250),
        }
    }

    pub fn with_wait_backoff(mut self, backoff: Duration) -> Self {
        self.wait_backoff = backoff;
        self
    }

    /// Signals every running loop to stop after its current (possibly already in-flight) batch.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Drives `processor` until [`Supervisor::stop`] is called, backing off by `wait_backoff`
    /// whenever a batch returns [`BatchOutcome::Wait`].
    pub async fn run<A: Aggregate>(&self, processor: BatchedAsyncEventProcessor<A>) {
        let name = processor.bookmark_name().to_string();

        while !self.stop.load(Ordering::SeqCst) {
            match processor.process_one_batch().await {
                Ok(BatchOutcome::Continue) => {}
                Ok(BatchOutcome::Wait) => {
                    tokio::time::sleep(self.wait_backoff).await;
                }
                Err(err) => {
                    warn!(processor = %name, error = %err, "async event processor batch failed, retrying after backoff");
                    tokio::time::sleep(self.wait_backoff).await;
                }
            }
        }

        info!(processor = %name, "async event processor stopped");
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
