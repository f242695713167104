use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::aggregate::Aggregate;
use crate::async_processor::BatchedAsyncEventProcessor;
use crate::error::StoreError;

/// Emits the current replication lag for a set of [`BatchedAsyncEventProcessor`]s: the
/// difference between the store-global high-water mark for a processor's event classes and the
/// processor's own bookmark.
///
/// Reads directly off the sequence-stats table (no cache invalidation needed: lag is allowed to
/// be eventually consistent), mirroring how the teacher computes read-model freshness by reading
/// straight off a projection table rather than maintaining a separate counter.
pub struct AsyncEventProcessorMonitor<A: Aggregate> {
    processors: Vec<(String, Arc<BatchedAsyncEventProcessor<A>>, &'static [&'static str])>,
    poll_interval: Duration,
}

/// One processor's observed lag at the moment [`AsyncEventProcessorMonitor::sample`] ran.
#[derive(Debug, Clone, Copy)]
pub struct LagSample {
    pub last_sequence: i64,
    pub bookmark: i64,
}

impl LagSample {
    pub fn lag(&self) -> i64 {
        (self.last_sequence - self.bookmark).max(0)
    }
}

impl<A: Aggregate> AsyncEventProcessorMonitor<A> {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            processors: Vec::new(),
            poll_interval,
        }
    }

    /// Registers `processor` for lag sampling; `event_classes` must match what `processor`
    /// itself filters on, since `last_sequence` is scoped the same way.
    pub fn watch(
        mut self,
        name: impl Into<String>,
        processor: Arc<BatchedAsyncEventProcessor<A>>,
        event_classes: &'static [&'static str],
    ) -> Self {
        self.processors.push((name.into(), processor, event_classes));
        self
    }

    /// Samples lag for every registered processor once.
    pub async fn sample(
        &self,
        event_source: &dyn crate::store::EventStore<A>,
    ) -> Result<Vec<(String, LagSample)>, StoreError> {
        let mut samples = Vec::with_capacity(self.processors.len());

        for (name, processor, event_classes) in &self.processors {
            let last_sequence = event_source.last_sequence(event_classes).await?;
            let bookmark = processor.current_bookmark().await?;

            debug!(processor = %name, last_sequence, bookmark, "sampled async event processor lag");

            samples.push((
                name.clone(),
                LagSample {
                    last_sequence,
                    bookmark,
                },
            ));
        }

        Ok(samples)
    }

    /// Samples lag for every registered processor on a fixed interval until `stop` resolves.
    pub async fn run_until(
        &self,
        event_source: &dyn crate::store::EventStore<A>,
        mut stop: tokio::sync::oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sample(event_source).await {
                        debug!(error = %err, "failed to sample async event processor lag");
                    }
                }
                _ = &mut stop => break,
            }
        }
    }
}
