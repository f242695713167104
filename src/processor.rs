use async_trait::async_trait;

use crate::aggregate::{Aggregate, AnyEvent};
use crate::event::SequencedEvent;

/// Opaque failure from an [`EventProcessor`]. Kept distinct from an aggregate's own
/// [`Aggregate::Error`] because processors are infrastructure-adjacent (projecting a read model,
/// publishing to a saga) rather than domain-validation code; the store wraps this in
/// [`crate::error::StoreError::ProcessorFailed`] when it aborts a `sink` transaction.
pub type ProcessorError = Box<dyn std::error::Error + Send + Sync>;

/// A thin dispatcher: given a [`SequencedEvent`], invokes one or more handler closures that are
/// total over the domain-event union.
///
/// Handlers are expected to be idempotent: both the synchronous (in-transaction) and
/// asynchronous (polling) delivery paths can redeliver the same event — the synchronous path on
/// gateway retry, the asynchronous path on crash-and-resume (see §5, §4.I).
#[async_trait]
pub trait EventProcessor<A: Aggregate>: Send + Sync {
    /// The event classes this processor cares about. An empty set means "all classes"; see
    /// [`crate::store::EventStore::get_after`] filtering and invariant 5 (filter soundness).
    fn event_classes(&self) -> &[&'static str];

    /// Process a single event. Errors here abort the enclosing `sink` transaction when this
    /// processor is registered as synchronous; they're logged and do *not* advance the bookmark
    /// when registered with a [`crate::async_processor::BatchedAsyncEventProcessor`].
    async fn process(
        &self,
        event: &SequencedEvent<AnyEvent<A>, A::Metadata>,
    ) -> Result<(), ProcessorError>;
}

/// A façade binding one or more `process` closures/handlers into a single [`EventProcessor`].
/// Handlers run in registration order.
pub struct EventListener<A: Aggregate> {
    /// Set once any registered handler's interest set is empty ("all classes"); sticky for the
    /// lifetime of the listener regardless of registration order.
    wants_all: bool,
    event_classes: Vec<&'static str>,
    handlers: Vec<Box<dyn EventProcessor<A>>>,
}

impl<A: Aggregate> EventListener<A> {
    pub fn new() -> Self {
        Self {
            wants_all: false,
            event_classes: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Registers a handler, widening `event_classes` to the union of all registered handlers'
    /// interests. Any handler with an empty interest set ("all classes") makes the listener's
    /// own set "all classes" too, no matter what's registered before or after it.
    pub fn with_handler(mut self, handler: Box<dyn EventProcessor<A>>) -> Self {
        if handler.event_classes().is_empty() {
            self.wants_all = true;
        } else {
            for class in handler.event_classes() {
                if !self.event_classes.contains(class) {
                    self.event_classes.push(class);
                }
            }
        }
        self.handlers.push(handler);
        self
    }
}

impl<A: Aggregate> Default for EventListener<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A: Aggregate> EventProcessor<A> for EventListener<A> {
    fn event_classes(&self) -> &[&'static str] {
        if self.wants_all {
            &[]
        } else {
            &self.event_classes
        }
    }

    async fn process(
        &self,
        event: &SequencedEvent<AnyEvent<A>, A::Metadata>,
    ) -> Result<(), ProcessorError> {
        for handler in &self.handlers {
            handler.process(event).await?;
        }
        Ok(())
    }
}
