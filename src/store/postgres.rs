use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgQueryResult;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::aggregate::{Aggregate, AnyEvent};
use crate::error::StoreError;
use crate::event::{DomainEvent, Event, SequencedEvent};
use crate::processor::EventProcessor;
use crate::store::statements::{event_class_predicate, events_table, sequence_stats_table};
use crate::store::{EventStore, LockStrategy};
use crate::types::Sequence;

/// Postgres-backed [`EventStore`]. Grounded on the teacher's `PgStore`/`PgStoreBuilder`:
/// one connection pool shared across aggregate instances, migrations run at construction,
/// transactional synchronous processors, `pg_advisory_xact_lock` as the coarse lock strategy.
pub struct PgEventStore<A: Aggregate> {
    pool: Pool<Postgres>,
    aggregate_name: &'static str,
    lock_strategy: LockStrategy,
    processors: Vec<Box<dyn EventProcessor<A>>>,
}

impl<A: Aggregate> PgEventStore<A> {
    /// Creates the store, running the idempotent `CREATE TABLE IF NOT EXISTS` migrations for
    /// both the events table and the sequence-stats table.
    pub async fn new(pool: Pool<Postgres>, lock_strategy: LockStrategy) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            aggregate_name: A::NAME,
            lock_strategy,
            processors: Vec::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let events_table = events_table(self.aggregate_name);
        let stats_table = sequence_stats_table(self.aggregate_name);

        let mut transaction: Transaction<Postgres> = self.pool.begin().await?;

        let _: PgQueryResult = sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {events_table} (
                sequence BIGSERIAL PRIMARY KEY,
                id UUID UNIQUE NOT NULL,
                aggregate_sequence BIGINT NOT NULL,
                aggregate_id UUID NOT NULL,
                aggregate_type VARCHAR(128) NOT NULL,
                event_type VARCHAR(256) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                json_body JSONB NOT NULL,
                metadata JSONB NOT NULL,
                CONSTRAINT {events_table}_aggregate_sequence_unique UNIQUE (aggregate_id, aggregate_sequence)
            )"
        ))
        .execute(&mut *transaction)
        .await?;

        let _: PgQueryResult = sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {events_table}_event_aggregate_type_idx \
             ON {events_table} (event_type, aggregate_type)"
        ))
        .execute(&mut *transaction)
        .await?;

        let _: PgQueryResult = sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {stats_table} (
                event_type VARCHAR(256) PRIMARY KEY,
                sequence BIGINT NOT NULL
            )"
        ))
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;
        Ok(())
    }

    async fn acquire_lock(&self, transaction: &mut Transaction<'_, Postgres>, aggregate_id: Uuid) -> Result<(), StoreError> {
        match &self.lock_strategy {
            LockStrategy::None => Ok(()),
            LockStrategy::AdvisoryTimeout(timeout) => {
                let millis = timeout.as_millis();
                sqlx::query(&format!("SET LOCAL lock_timeout = '{millis}ms'"))
                    .execute(&mut **transaction)
                    .await?;

                let (key, _) = aggregate_id.as_u64_pair();

                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(key as i64)
                    .execute(&mut **transaction)
                    .await
                    .map_err(|err| match &err {
                        sqlx::Error::Database(db_err)
                            if db_err.code().as_deref() == Some("55P03") || db_err.code().as_deref() == Some("57014") =>
                        {
                            StoreError::Locking(format!("advisory lock timed out after {millis}ms"))
                        }
                        _ => StoreError::Sql(err),
                    })?;

                Ok(())
            }
        }
    }
}

#[async_trait]
impl<A: Aggregate> EventStore<A> for PgEventStore<A> {
    async fn sink(
        &self,
        events: Vec<Event<AnyEvent<A>, A::Metadata>>,
    ) -> Result<Vec<SequencedEvent<AnyEvent<A>, A::Metadata>>, StoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let aggregate_id = events[0].aggregate_id;
        let events_table = events_table(self.aggregate_name);
        let stats_table = sequence_stats_table(self.aggregate_name);

        let mut transaction: Transaction<Postgres> = self.pool.begin().await?;

        self.acquire_lock(&mut transaction, aggregate_id).await?;

        let mut sequenced_events = Vec::with_capacity(events.len());

        for event in events {
            let (json_body, event_type) = encode_payload::<A>(&event.payload, event.aggregate_sequence)?;
            let metadata_json = encode_metadata(&event.metadata)?;

            let row = sqlx::query(&format!(
                "INSERT INTO {events_table}
                 (id, aggregate_id, aggregate_type, aggregate_sequence, event_type, created_at, json_body, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING sequence"
            ))
            .bind(event.id)
            .bind(event.aggregate_id)
            .bind(event.aggregate_type)
            .bind(event.aggregate_sequence)
            .bind(&event_type)
            .bind(event.created_at)
            .bind(&json_body)
            .bind(&metadata_json)
            .fetch_one(&mut *transaction)
            .await
            .map_err(StoreError::from_sql)?;

            let sequence: Sequence = row.try_get("sequence")?;

            sqlx::query(&format!(
                "INSERT INTO {stats_table} (event_type, sequence) VALUES ($1, $2)
                 ON CONFLICT (event_type) DO UPDATE SET sequence = EXCLUDED.sequence
                 WHERE {stats_table}.sequence < EXCLUDED.sequence"
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

        let rows = sqlx::query(&format!(
            "SELECT id, aggregate_id, aggregate_type, aggregate_sequence, event_type, created_at, json_body, metadata
             FROM {events_table} WHERE aggregate_id = $1 ORDER BY aggregate_sequence ASC"
        ))
        .bind(aggregate_id)
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
            "SELECT COALESCE(MAX(sequence), 0) AS sequence FROM {stats_table} WHERE TRUE {predicate}"
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

fn decode_row<A: Aggregate>(row: sqlx::postgres::PgRow) -> Result<Event<AnyEvent<A>, A::Metadata>, StoreError> {
    let aggregate_sequence: i64 = row.try_get("aggregate_sequence")?;
    let event_type: String = row.try_get("event_type")?;
    let json_body: Value = row.try_get("json_body")?;
    let metadata_json: Value = row.try_get("metadata")?;

    let payload = crate::serde_support::decode_payload::<A>(aggregate_sequence, &event_type, json_body)?;
    let metadata = serde_json::from_value(metadata_json).map_err(StoreError::EventMetadataSerialization)?;

    Ok(Event {
        id: row.try_get("id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        aggregate_sequence,
        aggregate_type: A::NAME,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        metadata,
        payload,
    })
}
