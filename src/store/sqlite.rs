use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteQueryResult, SqliteRow};
use sqlx::{Pool, Row, Sqlite, Transaction};
use uuid::Uuid;

use crate::aggregate::{Aggregate, AnyEvent};
use crate::error::StoreError;
use crate::event::{DomainEvent, Event, SequencedEvent};
use crate::processor::EventProcessor;
use crate::store::statements::{event_class_predicate, events_table, sequence_stats_table};
use crate::store::{EventStore, LockStrategy};
use crate::types::Sequence;

/// SQLite-backed [`EventStore`], grounded on the teacher's `esrs::sqlite` store: same schema and
/// statement shapes as the Postgres dialect, `INTEGER PRIMARY KEY AUTOINCREMENT` in place of
/// `BIGSERIAL`, and `LockStrategy` pinned to [`LockStrategy::None`] since SQLite already
/// serializes writers at the connection-pool level. Intended for tests and single-process
/// deployments, matching the spec's "H2/testing dialect".
pub struct SqliteEventStore<A: Aggregate> {
    pool: Pool<Sqlite>,
    aggregate_name: &'static str,
    processors: Vec<Box<dyn EventProcessor<A>>>,
}

impl<A: Aggregate> SqliteEventStore<A> {
    pub async fn new(pool: Pool<Sqlite>) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            aggregate_name: A::NAME,
            processors: Vec::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let events_table = events_table(self.aggregate_name);
        let stats_table = sequence_stats_table(self.aggregate_name);

        let mut transaction: Transaction<Sqlite> = self.pool.begin().await?;

        let _: SqliteQueryResult = sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {events_table} (
                sequence INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                aggregate_sequence BIGINT NOT NULL,
                aggregate_id TEXT NOT NULL,
                aggregate_type TEXT NOT NULL,
                event_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                json_body TEXT NOT NULL,
                metadata TEXT NOT NULL,
                CONSTRAINT {events_table}_aggregate_sequence_unique UNIQUE (aggregate_id, aggregate_sequence)
            )"
        ))
        .execute(&mut *transaction)
        .await?;

        let _: SqliteQueryResult = sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {events_table}_event_aggregate_type_idx \
             ON {events_table} (event_type, aggregate_type)"
        ))
        .execute(&mut *transaction)
        .await?;

        let _: SqliteQueryResult = sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {stats_table} (
                event_type TEXT PRIMARY KEY,
                sequence BIGINT NOT NULL
            )"
        ))
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<A: Aggregate> EventStore<A> for SqliteEventStore<A> {
    async fn sink(
        &self,
        events: Vec<Event<AnyEvent<A>, A::Metadata>>,
    ) -> Result<Vec<SequencedEvent<AnyEvent<A>, A::Metadata>>, StoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let events_table = events_table(self.aggregate_name);
        let stats_table = sequence_stats_table(self.aggregate_name);

        let mut transaction: Transaction<Sqlite> = self.pool.begin().await?;

        // LockStrategy::None is the only supported strategy for this dialect; nothing to acquire.
        let _ = LockStrategy::None;

        let mut sequenced_events = Vec::with_capacity(events.len());

        for event in events {
            let (json_body, event_type) = encode_payload::<A>(&event.payload, event.aggregate_sequence)?;
            let metadata_json = encode_metadata(&event.metadata)?;
            let id_text = event.id.to_string();
            let aggregate_id_text = event.aggregate_id.to_string();

            let result = sqlx::query(&format!(
                "INSERT INTO {events_table}
                 (id, aggregate_id, aggregate_type, aggregate_sequence, event_type, created_at, json_body, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(&id_text)
            .bind(&aggregate_id_text)
            .bind(event.aggregate_type)
            .bind(event.aggregate_sequence)
            .bind(&event_type)
            .bind(event.created_at.to_rfc3339())
            .bind(&json_body)
            .bind(&metadata_json)
            .execute(&mut *transaction)
            .await
            .map_err(StoreError::from_sql)?;

            let sequence = result.last_insert_rowid();

            sqlx::query(&format!(
                "INSERT INTO {stats_table} (event_type, sequence) VALUES ($1, $2)
                 ON CONFLICT (event_type) DO UPDATE SET sequence = excluded.sequence
                 WHERE {stats_table}.sequence < excluded.sequence"
            ))
            .bind(&event_type)
            .bind(sequence)
            .execute(&mut *transaction)
            .await?;

            sequenced_events.push(SequencedEvent { event, sequence });
        }

        for processor in &self.processors {
            for sequenced_event in &sequenced_events {
                processor
                    .process(sequenced_event)
                    .await
                    .map_err(StoreError::ProcessorFailed)?;
            }
        }

        transaction.commit().await?;

        Ok(sequenced_events)
    }

    async fn events_for(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Vec<Event<AnyEvent<A>, A::Metadata>>, StoreError> {
        let events_table = events_table(self.aggregate_name);
        let aggregate_id_text = aggregate_id.to_string();

        let rows = sqlx::query(&format!(
            "SELECT id, aggregate_id, aggregate_type, aggregate_sequence, event_type, created_at, json_body, metadata
             FROM {events_table} WHERE aggregate_id = $1 ORDER BY aggregate_sequence ASC"
        ))
        .bind(&aggregate_id_text)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_row::<A>).collect()
    }

    async fn get_after(
        &self,
        sequence: Sequence,
        event_classes: &[&'static str],
        batch_size: u32,
    ) -> Result<Vec<SequencedEvent<AnyEvent<A>, A::Metadata>>, StoreError> {
        let events_table = events_table(self.aggregate_name);
        let predicate = event_class_predicate(event_classes, |i| format!("${}", i + 3));

        let mut query = sqlx::query(&format!(
            "SELECT sequence, id, aggregate_id, aggregate_type, aggregate_sequence, event_type, created_at, json_body, metadata
             FROM {events_table}
             WHERE sequence > $1 {predicate}
             ORDER BY sequence ASC
             LIMIT $2"
        ))
        .bind(sequence)
        .bind(batch_size as i64);

        for class in event_classes {
            query = query.bind(*class);
        }

        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                let sequence: Sequence = row.try_get("sequence")?;
                let event = decode_row::<A>(row)?;
                Ok(SequencedEvent { event, sequence })
            })
            .collect()
    }

    async fn last_sequence(&self, event_classes: &[&'static str]) -> Result<Sequence, StoreError> {
        let stats_table = sequence_stats_table(self.aggregate_name);
        let predicate = event_class_predicate(event_classes, |i| format!("${}", i + 1));

        let mut query = sqlx::query(&format!(
            "SELECT COALESCE(MAX(sequence), 0) AS sequence FROM {stats_table} WHERE 1 = 1 {predicate}"
        ));

        for class in event_classes {
            query = query.bind(*class);
        }

        let row = query.fetch_one(&self.pool).await?;
        Ok(row.try_get("sequence")?)
    }

    fn add_synchronous_processor(&mut self, processor: Box<dyn EventProcessor<A>>) {
        self.processors.push(processor);
    }
}

fn encode_payload<A: Aggregate>(
    payload: &AnyEvent<A>,
    aggregate_sequence: i64,
) -> Result<(Value, &'static str), StoreError> {
    let (value, event_type) = match payload {
        AnyEvent::Creation(event) => (
            serde_json::to_value(event).map_err(StoreError::EventBodySerialization)?,
            event.event_type(),
        ),
        AnyEvent::Update(event) => (
            serde_json::to_value(event).map_err(StoreError::EventBodySerialization)?,
            event.event_type(),
        ),
    };

    crate::serde_support::validate_body_round_trip::<A>(aggregate_sequence, &value)?;

    Ok((value, event_type))
}

fn encode_metadata<M: crate::metadata::Metadata>(metadata: &M) -> Result<Value, StoreError> {
    let value = serde_json::to_value(metadata).map_err(StoreError::EventMetadataSerialization)?;
    serde_json::from_value::<M>(value.clone()).map_err(StoreError::EventMetadataSerialization)?;
    Ok(value)
}

fn decode_row<A: Aggregate>(row: SqliteRow) -> Result<Event<AnyEvent<A>, A::Metadata>, StoreError> {
    let aggregate_sequence: i64 = row.try_get("aggregate_sequence")?;
    let event_type: String = row.try_get("event_type")?;
    let json_body: Value = {
        let raw: String = row.try_get("json_body")?;
        serde_json::from_str(&raw).map_err(StoreError::EventBodySerialization)?
    };
    let metadata_json: Value = {
        let raw: String = row.try_get("metadata")?;
        serde_json::from_str(&raw).map_err(StoreError::EventMetadataSerialization)?
    };

    let payload = crate::serde_support::decode_payload::<A>(aggregate_sequence, &event_type, json_body)?;
    let metadata = serde_json::from_value(metadata_json).map_err(StoreError::EventMetadataSerialization)?;

    let id_text: String = row.try_get("id")?;
    let aggregate_id_text: String = row.try_get("aggregate_id")?;
    let created_at_text: String = row.try_get("created_at")?;

    Ok(Event {
        id: Uuid::parse_str(&id_text).map_err(|err| {
            StoreError::EventBodySerialization(serde::de::Error::custom(format!("invalid event id: {err}")))
        })?,
        aggregate_id: Uuid::parse_str(&aggregate_id_text).map_err(|err| {
            StoreError::EventBodySerialization(serde::de::Error::custom(format!("invalid aggregate id: {err}")))
        })?,
        aggregate_sequence,
        aggregate_type: A::NAME,
        created_at: DateTime::parse_from_rfc3339(&created_at_text)
            .map_err(|err| {
                StoreError::EventBodySerialization(serde::de::Error::custom(format!("invalid timestamp: {err}")))
            })?
            .with_timezone(&Utc),
        metadata,
        payload,
    })
}
