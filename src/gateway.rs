use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::aggregate::{Aggregate, AnyEvent};
use crate::error::StoreError;
use crate::event::Event;
use crate::state::AggregateState;
use crate::store::EventStore;

/// How many times [`Gateway::update`] retries after losing a race for the next
/// `aggregate_sequence`, before surfacing [`CommandError::Concurrency`] to the caller.
const MAX_CONCURRENCY_RETRIES: u32 = 3;

/// Errors a [`Gateway`] can return. Distinct from [`crate::error::StoreError`]: this is the
/// caller-facing vocabulary, one layer up, that also carries the aggregate's own domain error.
#[derive(thiserror::Error, Debug)]
pub enum CommandError<E> {
    /// Lost the race for the next `aggregate_sequence` after exhausting the retry bound.
    #[error("concurrent write detected for this aggregate, giving up after retrying")]
    Concurrency,

    /// The configured blocking-lock strategy failed to acquire its lock within the bound.
    #[error("failed to acquire store lock: {0}")]
    Locking(String),

    /// `update`/`load` was called for an aggregate id with no persisted events.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// The aggregate rejected the command during validation.
    #[error(transparent)]
    Domain(E),

    /// Infrastructure failure from the underlying store (serialization, processor, raw SQL).
    #[error(transparent)]
    Store(StoreError),
}

fn map_store_error<E>(err: StoreError) -> CommandError<E> {
    match err {
        StoreError::Concurrency => CommandError::Concurrency,
        StoreError::Locking(msg) => CommandError::Locking(msg),
        other => CommandError::Store(other),
    }
}

/// Couples one [`Aggregate`] configuration to an [`EventStore`]: mints event ids, assigns
/// `aggregate_sequence`s, rehydrates state by replay, and retries a losing race against a
/// concurrent writer up to [`MAX_CONCURRENCY_RETRIES`] times.
///
/// Grounded on the teacher's `AggregateManager::handle_command` (validate, then persist, then
/// report); the retry-on-conflict loop itself has no teacher analogue — the teacher's managers
/// surface a unique-constraint violation as a plain `Err`.
pub struct Gateway<A: Aggregate> {
    store: Arc<dyn EventStore<A>>,
    projection: A::Projection,
}

impl<A: Aggregate> Gateway<A> {
    pub fn new(store: Arc<dyn EventStore<A>>, projection: A::Projection) -> Self {
        Self { store, projection }
    }

    /// Validates and persists a creation command under a caller-chosen `aggregate_id`, seeding
    /// `aggregate_sequence` at 1.
    pub async fn create(
        &self,
        aggregate_id: Uuid,
        metadata: A::Metadata,
        command: A::CreationCommand,
    ) -> Result<AggregateState<A::State>, CommandError<A::Error>> {
        let creation_event = A::create(&self.projection, &metadata, command).map_err(CommandError::Domain)?;
        let state_value = A::created(&creation_event);

        let event = Event {
            id: Uuid::new_v4(),
            aggregate_id,
            aggregate_sequence: 1,
            aggregate_type: A::NAME,
            created_at: Utc::now(),
            metadata,
            payload: AnyEvent::Creation(creation_event),
        };

        let sequenced = self.store.sink(vec![event]).await.map_err(map_store_error)?;

        let aggregate_sequence = sequenced
            .last()
            .map(|sequenced_event| sequenced_event.event.aggregate_sequence)
            .unwrap_or(1);

        Ok(AggregateState::new(aggregate_id, state_value, aggregate_sequence))
    }

    /// Rehydrates `aggregate_id`, validates `command` against the resulting state, and persists
    /// whatever events the aggregate emits. A `ConcurrencyError` reloads and retries the whole
    /// validate-then-persist step, since another writer may have advanced the aggregate in the
    /// meantime and the command needs to be re-validated against its current state.
    pub async fn update(
        &self,
        aggregate_id: Uuid,
        metadata: A::Metadata,
        command: A::UpdateCommand,
    ) -> Result<AggregateState<A::State>, CommandError<A::Error>> {
        let mut attempt = 0;

        loop {
            let mut state = self.load(aggregate_id).await?;

            let events = A::update(&self.projection, state.inner(), &metadata, command.clone())
                .map_err(CommandError::Domain)?;

            if events.is_empty() {
                return Ok(state);
            }

            let mut to_sink = Vec::with_capacity(events.len());
            let mut next_sequence = state.next_aggregate_sequence();
            for event in events {
                to_sink.push(Event {
                    id: Uuid::new_v4(),
                    aggregate_id,
                    aggregate_sequence: next_sequence,
                    aggregate_type: A::NAME,
                    created_at: Utc::now(),
                    metadata: metadata.clone(),
                    payload: AnyEvent::Update(event),
                });
                next_sequence += 1;
            }

            match self.store.sink(to_sink).await {
                Ok(sequenced_events) => {
                    for sequenced_event in &sequenced_events {
                        if let Some(update_event) = sequenced_event.event.payload.as_update() {
                            let updated = A::updated(state.inner().clone(), update_event);
                            state.set_inner(updated);
                        }
                        state.set_aggregate_sequence(sequenced_event.event.aggregate_sequence);
                    }
                    return Ok(state);
                }
                Err(StoreError::Concurrency) if attempt + 1 < MAX_CONCURRENCY_RETRIES => {
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(map_store_error(err)),
            }
        }
    }

    /// Rebuilds state by folding `created` then `updated` over the aggregate's persisted events.
    pub async fn load(&self, aggregate_id: Uuid) -> Result<AggregateState<A::State>, CommandError<A::Error>> {
        let events = self.store.events_for(aggregate_id).await.map_err(map_store_error)?;

        if events.is_empty() {
            return Err(CommandError::AggregateNotFound(aggregate_id));
        }

        let mut state: Option<A::State> = None;
        let mut aggregate_sequence = 0;

        for event in events {
            aggregate_sequence = event.aggregate_sequence;
            state = Some(match (state, &event.payload) {
                (None, AnyEvent::Creation(creation)) => A::created(creation),
                (Some(current), AnyEvent::Update(update)) => A::updated(current, update),
                // A second creation event, or an update with nothing to fold onto, would mean a
                // corrupt event stream; keep the last good state rather than panic.
                (Some(current), AnyEvent::Creation(_)) => current,
                (None, AnyEvent::Update(_)) => A::State::default(),
            });
        }

        Ok(AggregateState::new(
            aggregate_id,
            state.unwrap_or_default(),
            aggregate_sequence,
        ))
    }
}

/// Type-erased handle to an [`Event`] a [`Router`] hands back after a successful dispatch: the
/// concrete type is whatever `Aggregate::State` the matched configuration uses, downcast by the
/// caller once it knows which aggregate it addressed.
pub type RoutedPayload = Box<dyn Any + Send>;

/// Errors surfaced by [`Router::dispatch`], one layer above [`CommandError`] since the router
/// doesn't know the concrete aggregate error type until a route matches.
#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    /// No [`Gateway`] was registered for this command's concrete type.
    #[error("no configuration registered for this command type")]
    NoConstructorForCommand,

    /// Internal: a registered route's downcast of `metadata`/`command` failed. Indicates two
    /// routes were registered for the same `TypeId`, which [`Router::register_creation`] and
    /// [`Router::register_update`] otherwise prevent by construction.
    #[error("command or metadata type did not match the registered configuration")]
    TypeMismatch,

    /// The matched route's [`Gateway`] returned a [`CommandError`], boxed since its concrete
    /// domain-error type varies per aggregate.
    #[error(transparent)]
    Command(#[from] Box<dyn std::error::Error + Send + Sync>),
}

type Route =
    Arc<dyn Fn(Uuid, RoutedPayload, RoutedPayload) -> BoxFuture<'static, Result<RoutedPayload, RouterError>> + Send + Sync>;

/// Selects, at runtime, which registered [`Aggregate`] configuration a command belongs to —
/// "the configuration whose command sum contains this command" — keyed by the command's
/// [`TypeId`] rather than by any reflective class-name lookup.
///
/// No teacher analogue: the teacher's `AggregateManager<E>` is parameterized over exactly one
/// `EventStore`/aggregate pair at a time, so its callers already know which manager to invoke.
#[derive(Default)]
pub struct Router {
    routes: HashMap<TypeId, Route>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Registers `gateway` as the handler for `A::CreationCommand`.
    pub fn register_creation<A>(&mut self, gateway: Arc<Gateway<A>>)
    where
        A: Aggregate + 'static,
        A::CreationCommand: 'static,
        A::Metadata: 'static,
        A::State: 'static,
        A::Error: std::error::Error + Send + Sync + 'static,
    {
        let route: Route = Arc::new(move |aggregate_id, metadata, command| {
            let gateway = gateway.clone();
            Box::pin(async move {
                let metadata = *metadata.downcast::<A::Metadata>().map_err(|_| RouterError::TypeMismatch)?;
                let command = *command
                    .downcast::<A::CreationCommand>()
                    .map_err(|_| RouterError::TypeMismatch)?;

                let state = gateway
                    .create(aggregate_id, metadata, command)
                    .await
                    .map_err(|err| RouterError::Command(Box::new(err)))?;

                Ok(Box::new(state) as RoutedPayload)
            })
        });

        self.routes.insert(TypeId::of::<A::CreationCommand>(), route);
    }

    /// Registers `gateway` as the handler for `A::UpdateCommand`.
    pub fn register_update<A>(&mut self, gateway: Arc<Gateway<A>>)
    where
        A: Aggregate + 'static,
        A::UpdateCommand: 'static,
        A::Metadata: 'static,
        A::State: 'static,
        A::Error: std::error::Error + Send + Sync + 'static,
    {
        let route: Route = Arc::new(move |aggregate_id, metadata, command| {
            let gateway = gateway.clone();
            Box::pin(async move {
                let metadata = *metadata.downcast::<A::Metadata>().map_err(|_| RouterError::TypeMismatch)?;
                let command = *command
                    .downcast::<A::UpdateCommand>()
                    .map_err(|_| RouterError::TypeMismatch)?;

                let state = gateway
                    .update(aggregate_id, metadata, command)
                    .await
                    .map_err(|err| RouterError::Command(Box::new(err)))?;

                Ok(Box::new(state) as RoutedPayload)
            })
        });

        self.routes.insert(TypeId::of::<A::UpdateCommand>(), route);
    }

    /// Dispatches `command` to whichever registered configuration's command sum contains it.
    /// The caller downcasts the returned [`RoutedPayload`] to the `AggregateState<A::State>` of
    /// the aggregate it knows it addressed.
    pub async fn dispatch<C, M>(&self, aggregate_id: Uuid, metadata: M, command: C) -> Result<RoutedPayload, RouterError>
    where
        C: Send + 'static,
        M: Send + 'static,
    {
        let route = self
            .routes
            .get(&TypeId::of::<C>())
            .cloned()
            .ok_or(RouterError::NoConstructorForCommand)?;

        route(aggregate_id, Box::new(metadata), Box::new(command)).await
    }
}
