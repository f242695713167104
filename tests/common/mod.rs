use esrs_runtime::{Aggregate, DomainEvent, StandardMetadata};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A minimal "plain" aggregate (per the four-shape algebra: `Projection = ()`) used across the
/// integration tests: a balance that can be opened, incremented and decremented, never allowed
/// to go negative.
pub struct Counter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opened {
    pub opening_balance: i64,
}

impl DomainEvent for Opened {
    fn event_type(&self) -> &'static str {
        "counter_opened"
    }
}

#[cfg(feature = "upcasting")]
impl esrs_runtime::Upcaster for Opened {
    fn upcast(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CounterEvent {
    Incremented { amount: i64 },
    Decremented { amount: i64 },
}

impl DomainEvent for CounterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CounterEvent::Incremented { .. } => "counter_incremented",
            CounterEvent::Decremented { .. } => "counter_decremented",
        }
    }
}

#[cfg(feature = "upcasting")]
impl esrs_runtime::Upcaster for CounterEvent {
    fn upcast(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterState {
    pub value: i64,
}

#[derive(Debug, Clone)]
pub struct Open {
    pub opening_balance: i64,
}

#[derive(Debug, Clone)]
pub enum CounterUpdateCommand {
    Increment { amount: i64 },
    Decrement { amount: i64 },
}

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("counter balance cannot go negative")]
    WouldGoNegative,
}

impl Aggregate for Counter {
    const NAME: &'static str = "counter";

    type State = CounterState;
    type Metadata = StandardMetadata;
    type Projection = ();
    type CreationCommand = Open;
    type UpdateCommand = CounterUpdateCommand;
    type CreationEvent = Opened;
    type UpdateEvent = CounterEvent;
    type Error = CounterError;

    fn create(_projection: &(), _metadata: &StandardMetadata, command: Open) -> Result<Opened, CounterError> {
        if command.opening_balance < 0 {
            return Err(CounterError::WouldGoNegative);
        }
        Ok(Opened {
            opening_balance: command.opening_balance,
        })
    }

    fn created(event: &Opened) -> CounterState {
        CounterState {
            value: event.opening_balance,
        }
    }

    fn update(
        _projection: &(),
        state: &CounterState,
        _metadata: &StandardMetadata,
        command: CounterUpdateCommand,
    ) -> Result<Vec<CounterEvent>, CounterError> {
        match command {
            CounterUpdateCommand::Increment { amount } => {
                if amount <= 0 {
                    return Err(CounterError::NonPositiveAmount);
                }
                Ok(vec![CounterEvent::Incremented { amount }])
            }
            CounterUpdateCommand::Decrement { amount } => {
                if amount <= 0 {
                    return Err(CounterError::NonPositiveAmount);
                }
                if state.value - amount < 0 {
                    return Err(CounterError::WouldGoNegative);
                }
                Ok(vec![CounterEvent::Decremented { amount }])
            }
        }
    }

    fn updated(mut state: CounterState, event: &CounterEvent) -> CounterState {
        match event {
            CounterEvent::Incremented { amount } => state.value += amount,
            CounterEvent::Decremented { amount } => state.value -= amount,
        }
        state
    }
}

/// A single-connection in-memory SQLite pool: `max_connections(1)` keeps every query against the
/// same `:memory:` database, which SQLite otherwise scopes per-connection.
pub async fn sqlite_pool() -> sqlx::SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite pool")
}
