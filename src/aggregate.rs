use crate::event::DomainEvent;
use crate::metadata::Metadata;

/// The union of an aggregate's creation and update events, as returned by replay operations
/// that walk a mixed-position event stream (`EventStore::events_for`, `EventStore::get_after`).
///
/// The store never persists this wrapper directly: each concrete event is serialized under its
/// own `DomainEvent::event_type`, and decoded back into `Creation` or `Update` based on whether
/// its `aggregate_sequence` is `1` (per the "first event is a creation event" invariant).
#[derive(Debug, Clone)]
pub enum AnyEvent<A: Aggregate> {
    Creation(A::CreationEvent),
    Update(A::UpdateEvent),
}

impl<A: Aggregate> AnyEvent<A> {
    pub fn event_type(&self) -> &'static str {
        match self {
            AnyEvent::Creation(event) => event.event_type(),
            AnyEvent::Update(event) => event.event_type(),
        }
    }

    pub fn as_creation(&self) -> Option<&A::CreationEvent> {
        match self {
            AnyEvent::Creation(event) => Some(event),
            AnyEvent::Update(_) => None,
        }
    }

    pub fn as_update(&self) -> Option<&A::UpdateEvent> {
        match self {
            AnyEvent::Update(event) => Some(event),
            AnyEvent::Creation(_) => None,
        }
    }
}

/// A read-only collaborator an aggregate may consult while validating a command (e.g. "is this
/// survey name taken?"). Aggregates never write through a `Projection`.
pub trait Projection: Send + Sync {}

impl Projection for () {}

/// The algebraic contract relating creation/update commands, creation/update events and
/// aggregate state.
///
/// This trait is purposefully _synchronous_: an aggregate should derive its state from nothing
/// but its initial configuration and its event stream, with no side effects. If additional
/// information is required to validate a command, look it up ahead of time and place it in
/// [`Aggregate::Projection`] or the command itself.
///
/// The four shapes from the spec map onto this single trait:
/// - **Plain**: `Projection = ()`, `Metadata` ignored by `create`/`update`.
/// - **With projection**: `Projection` is a real read-model collaborator.
/// - **Stateless**: `State = ()`, `updated` is the identity function.
/// - **With metadata**: `create`/`update` read `metadata` to populate audit fields on the
///   emitted events.
pub trait Aggregate: Send + Sync {
    /// Unique tag for this aggregate type. Used as the `aggregate_type` column value and as the
    /// table/statement namespace. Changing it breaks the link between existing events and their
    /// aggregate.
    const NAME: &'static str;

    /// In-memory state folded from this aggregate's event stream.
    type State: Default + Clone + Send + Sync;

    /// Caller-supplied metadata type this aggregate expects; narrower than the store's default
    /// is allowed, see [`Metadata`].
    type Metadata: Metadata;

    /// Read-only collaborator consulted during validation. `()` when unneeded.
    type Projection: Projection;

    type CreationCommand: Send;
    /// `Clone` so [`crate::gateway::Gateway::update`] can re-validate the same command against a
    /// freshly reloaded state after losing a race for the next `aggregate_sequence`.
    type UpdateCommand: Send + Clone;

    #[cfg(not(feature = "upcasting"))]
    type CreationEvent: DomainEvent;
    /// Bounded by [`crate::event::Upcaster`] under the `upcasting` feature so
    /// [`crate::serde_support::decode_one`] can call `E::upcast` for this event class.
    #[cfg(feature = "upcasting")]
    type CreationEvent: DomainEvent + crate::event::Upcaster;

    #[cfg(not(feature = "upcasting"))]
    type UpdateEvent: DomainEvent;
    #[cfg(feature = "upcasting")]
    type UpdateEvent: DomainEvent + crate::event::Upcaster;

    type Error: std::error::Error + Send + Sync + 'static;

    /// Validates a creation command and emits the event that will seed this aggregate's state.
    fn create(
        projection: &Self::Projection,
        metadata: &Self::Metadata,
        command: Self::CreationCommand,
    ) -> Result<Self::CreationEvent, Self::Error>;

    /// Folds a creation event into the initial state.
    fn created(event: &Self::CreationEvent) -> Self::State;

    /// Validates an update command against the current state, emitting zero or more events.
    /// An empty `Ok(vec![])` is a valid, no-op outcome (e.g. for
    /// [`crate::error::CommandError::AlreadyActioned`]-style idempotent commands).
    fn update(
        projection: &Self::Projection,
        state: &Self::State,
        metadata: &Self::Metadata,
        command: Self::UpdateCommand,
    ) -> Result<Vec<Self::UpdateEvent>, Self::Error>;

    /// Folds an update event onto the current state.
    fn updated(state: Self::State, event: &Self::UpdateEvent) -> Self::State;
}
