//! An event-sourcing runtime: an append-only transactional event log, aggregate rehydration by
//! replay, a command gateway with per-aggregate ordering, and a bookmark-driven asynchronous
//! poller for downstream projectors and sagas, alongside in-transaction synchronous processors.
//!
//! Grounded on the `primait/event_sourcing.rs` family of crates; see `DESIGN.md` for the
//! module-by-module grounding ledger.

pub mod aggregate;
pub mod async_processor;
pub mod bookmark;
pub mod error;
pub mod event;
pub mod gateway;
pub mod metadata;
pub mod monitor;
pub mod processor;
pub mod serde_support;
pub mod state;
pub mod store;
pub mod types;

pub use aggregate::{Aggregate, AnyEvent, Projection};
pub use async_processor::{BatchedAsyncEventProcessor, BatchOutcome, Supervisor};
pub use bookmark::BookmarkStore;
pub use error::StoreError;
pub use event::{DomainEvent, Event, SequencedEvent};
pub use gateway::{CommandError, Gateway, Router, RouterError};
pub use metadata::{EmptyMetadata, Metadata, StandardMetadata};
pub use processor::{EventListener, EventProcessor, ProcessorError};
pub use state::AggregateState;
pub use store::{EventStore, LockStrategy};

#[cfg(feature = "upcasting")]
pub use event::Upcaster;
