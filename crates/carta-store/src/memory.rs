//! In-memory reference engine
//!
//! A HashMap-backed implementation of the persistence-engine contract,
//! honest about the descriptor's special columns: UUID fill on create,
//! created/updated timestamps, soft deletion via the deleted-at column, and
//! snapshot-per-transaction begin/commit/rollback semantics. Tests (and
//! embedders that want a throwaway store) use it as the engine; it also
//! records per-operation call counters and the queries it was handed so
//! tests can assert exact engine-call behavior.
//!
//! Projection is accepted and recorded but not applied to materialized
//! entities: the reference engine always returns whole records, leaving
//! column stripping to engines with a real wire format.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use carta_core::{
    CartaError, CartaErrorKind, Entity, EntityDescriptor, EntityValues, Query, Result,
};

use crate::engine::{EntityEngine, TransactionBackend};
use crate::transaction::TransactionHandle;

type JsonMap = serde_json::Map<String, Value>;

/// Internal failure conditions of the in-memory engine
#[derive(Debug, Error)]
enum MemoryStoreError {
    #[error("record in table {table} is missing primary key column {field}")]
    MissingPrimaryKey { table: String, field: String },

    #[error("primary key column {field} must be an integer, got {value}")]
    NonIntegerPrimaryKey { field: String, value: Value },

    #[error("transaction handle was not created by this engine")]
    ForeignTransaction,

    #[error("record decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}

impl From<MemoryStoreError> for CartaError {
    fn from(err: MemoryStoreError) -> Self {
        let kind = match &err {
            MemoryStoreError::MissingPrimaryKey { .. }
            | MemoryStoreError::NonIntegerPrimaryKey { .. } => CartaErrorKind::TypeMismatch,
            MemoryStoreError::ForeignTransaction => CartaErrorKind::Persistence,
            MemoryStoreError::Decode(_) => CartaErrorKind::Serialization,
        };
        CartaError::new(kind)
            .with_op("memory_engine")
            .with_message(err.to_string())
    }
}

/// Per-operation call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub find_one_calls: u64,
    pub find_all_calls: u64,
    pub create_calls: u64,
    pub update_calls: u64,
    pub destroy_calls: u64,
}

impl EngineCounters {
    /// Total engine calls of any kind
    pub fn total(&self) -> u64 {
        self.begins
            + self.commits
            + self.rollbacks
            + self.find_one_calls
            + self.find_all_calls
            + self.create_calls
            + self.update_calls
            + self.destroy_calls
    }
}

/// Table contents plus the primary-key sequence
#[derive(Debug, Clone, Default)]
struct TableState {
    rows: BTreeMap<i64, JsonMap>,
    next_key: i64,
}

/// Snapshot held by an open transaction; rollback restores it
struct MemoryTransaction {
    snapshot: Mutex<Option<TableState>>,
}

/// HashMap-backed engine for one entity type
pub struct MemoryEngine<E: Entity> {
    descriptor: Arc<EntityDescriptor>,
    state: Mutex<TableState>,
    counters: Mutex<EngineCounters>,
    queries: Mutex<Vec<Query>>,
    _entity: PhantomData<fn() -> E>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<E: Entity> MemoryEngine<E> {
    /// Create an empty engine for the given descriptor
    pub fn new(descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            descriptor,
            state: Mutex::new(TableState {
                rows: BTreeMap::new(),
                next_key: 1,
            }),
            counters: Mutex::new(EngineCounters::default()),
            queries: Mutex::new(Vec::new()),
            _entity: PhantomData,
        }
    }

    /// Snapshot of the call counters
    pub fn counters(&self) -> EngineCounters {
        *lock(&self.counters)
    }

    /// The queries handed to `find_one`/`find_all`, in call order
    pub fn issued_queries(&self) -> Vec<Query> {
        lock(&self.queries).clone()
    }

    /// Number of rows currently stored, soft-deleted ones included
    pub fn row_count(&self) -> usize {
        lock(&self.state).rows.len()
    }

    fn decode(&self, row: &JsonMap) -> Result<E> {
        serde_json::from_value(Value::Object(row.clone()))
            .map_err(|e| MemoryStoreError::Decode(e).into())
    }

    fn primary_key_of(&self, record: &JsonMap) -> Result<i64> {
        let field = self.descriptor.primary_key_field();
        let value = record
            .get(field)
            .ok_or_else(|| MemoryStoreError::MissingPrimaryKey {
                table: self.descriptor.table_name().to_string(),
                field: field.to_string(),
            })?;

        value
            .as_i64()
            .ok_or_else(|| {
                MemoryStoreError::NonIntegerPrimaryKey {
                    field: field.to_string(),
                    value: value.clone(),
                }
                .into()
            })
    }

    fn encode(&self, entity: &E) -> Result<JsonMap> {
        match serde_json::to_value(entity).map_err(MemoryStoreError::Decode)? {
            Value::Object(map) => Ok(map),
            other => Err(CartaError::new(CartaErrorKind::TypeMismatch)
                .with_op("memory_engine")
                .with_table(self.descriptor.table_name())
                .with_message(format!("Entity serialized to non-object value {}", other))),
        }
    }

    /// True when the row is soft-deleted under the descriptor's
    /// deleted-at column
    fn is_soft_deleted(&self, row: &JsonMap) -> bool {
        self.descriptor
            .deleted_at_field()
            .and_then(|field| row.get(field))
            .is_some_and(|value| !value.is_null())
    }

    fn transaction_of(&self, handle: &TransactionHandle) -> Result<Arc<MemoryTransaction>> {
        handle
            .downcast::<MemoryTransaction>()
            .ok_or_else(|| MemoryStoreError::ForeignTransaction.into())
    }

    fn now_value() -> Value {
        Value::String(Utc::now().to_rfc3339())
    }
}

#[async_trait]
impl<E: Entity> TransactionBackend for MemoryEngine<E> {
    async fn begin(&self) -> Result<TransactionHandle> {
        lock(&self.counters).begins += 1;

        let snapshot = lock(&self.state).clone();
        let handle = TransactionHandle::new(Arc::new(MemoryTransaction {
            snapshot: Mutex::new(Some(snapshot)),
        }));

        tracing::debug!(
            component = module_path!(),
            table = self.descriptor.table_name(),
            tx_id = %handle.id(),
            "began in-memory transaction"
        );
        Ok(handle)
    }

    async fn commit(&self, handle: &TransactionHandle) -> Result<()> {
        lock(&self.counters).commits += 1;

        let transaction = self.transaction_of(handle)?;
        lock(&transaction.snapshot).take();
        Ok(())
    }

    async fn rollback(&self, handle: &TransactionHandle) -> Result<()> {
        lock(&self.counters).rollbacks += 1;

        let transaction = self.transaction_of(handle)?;
        if let Some(snapshot) = lock(&transaction.snapshot).take() {
            *lock(&self.state) = snapshot;
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> EntityEngine<E> for MemoryEngine<E> {
    async fn find_one(&self, query: &Query) -> Result<Option<E>> {
        lock(&self.counters).find_one_calls += 1;
        lock(&self.queries).push(query.clone());

        let state = lock(&self.state);
        for row in state.rows.values() {
            if self.is_soft_deleted(row) {
                continue;
            }
            if query.predicate.matches(row) {
                return self.decode(row).map(Some);
            }
        }
        Ok(None)
    }

    async fn find_all(&self, query: &Query) -> Result<Vec<E>> {
        lock(&self.counters).find_all_calls += 1;
        lock(&self.queries).push(query.clone());

        let state = lock(&self.state);
        state
            .rows
            .values()
            .filter(|row| !self.is_soft_deleted(row))
            .filter(|row| query.predicate.matches(row))
            .map(|row| self.decode(row))
            .collect()
    }

    async fn create(
        &self,
        values: &EntityValues,
        _transaction: Option<&TransactionHandle>,
    ) -> Result<E> {
        lock(&self.counters).create_calls += 1;

        let mut state = lock(&self.state);
        let key = state.next_key;
        state.next_key += 1;

        let mut row: JsonMap = values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        row.insert(
            self.descriptor.primary_key_field().to_string(),
            Value::from(key),
        );

        if let Some(uuid_field) = self.descriptor.uuid_field() {
            row.entry(uuid_field.to_string())
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        }
        if let Some(created_at) = self.descriptor.created_at_field() {
            row.entry(created_at.to_string()).or_insert_with(Self::now_value);
        }
        if let Some(updated_at) = self.descriptor.updated_at_field() {
            row.entry(updated_at.to_string()).or_insert_with(Self::now_value);
        }

        let entity = self.decode(&row)?;
        state.rows.insert(key, row);
        Ok(entity)
    }

    async fn update(
        &self,
        entity: &E,
        values: &EntityValues,
        _transaction: Option<&TransactionHandle>,
    ) -> Result<E> {
        lock(&self.counters).update_calls += 1;

        let key = self.primary_key_of(&self.encode(entity)?)?;

        let mut state = lock(&self.state);
        let row = state.rows.get_mut(&key).ok_or_else(|| {
            CartaError::new(CartaErrorKind::NotFound)
                .with_op("memory_engine_update")
                .with_table(self.descriptor.table_name())
                .with_entity_ref(key.to_string())
                .with_message("Record vanished before update")
        })?;

        for (field, value) in values {
            row.insert(field.clone(), value.clone());
        }
        if let Some(updated_at) = self.descriptor.updated_at_field() {
            row.insert(updated_at.to_string(), Self::now_value());
        }

        let row = row.clone();
        drop(state);
        self.decode(&row)
    }

    async fn destroy(
        &self,
        entity: &E,
        force: bool,
        _transaction: Option<&TransactionHandle>,
    ) -> Result<()> {
        lock(&self.counters).destroy_calls += 1;

        let key = self.primary_key_of(&self.encode(entity)?)?;
        let mut state = lock(&self.state);

        if !state.rows.contains_key(&key) {
            return Err(CartaError::new(CartaErrorKind::NotFound)
                .with_op("memory_engine_destroy")
                .with_table(self.descriptor.table_name())
                .with_entity_ref(key.to_string())
                .with_message("Record vanished before destroy"));
        }

        match self.descriptor.deleted_at_field() {
            Some(deleted_at) if !force => {
                if let Some(row) = state.rows.get_mut(&key) {
                    row.insert(deleted_at.to_string(), Self::now_value());
                }
            }
            _ => {
                state.rows.remove(&key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carta_core::Predicate;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: i64,
        uuid: Option<String>,
        label: String,
        deleted_at: Option<String>,
    }

    fn descriptor() -> Arc<EntityDescriptor> {
        Arc::new(
            EntityDescriptor::new("widgets", "id")
                .with_uuid_field("uuid")
                .with_deleted_at_field("deleted_at"),
        )
    }

    fn values(label: &str) -> EntityValues {
        EntityValues::from([("label".to_string(), json!(label))])
    }

    #[tokio::test]
    async fn create_fills_key_and_uuid() {
        let engine: MemoryEngine<Widget> = MemoryEngine::new(descriptor());
        let widget = engine.create(&values("first"), None).await.unwrap();

        assert_eq!(widget.id, 1);
        assert!(widget.uuid.is_some());
        assert_eq!(widget.label, "first");
        assert_eq!(engine.counters().create_calls, 1);
    }

    #[tokio::test]
    async fn soft_delete_hides_rows_from_finds() {
        let engine: MemoryEngine<Widget> = MemoryEngine::new(descriptor());
        let widget = engine.create(&values("gone"), None).await.unwrap();

        engine.destroy(&widget, false, None).await.unwrap();

        let found = engine
            .find_one(&Query {
                projection: None,
                predicate: Predicate::field_eq("id", widget.id),
            })
            .await
            .unwrap();
        assert!(found.is_none());
        // Row is retained, only hidden
        assert_eq!(engine.row_count(), 1);

        let widget2 = engine.create(&values("hard"), None).await.unwrap();
        engine.destroy(&widget2, true, None).await.unwrap();
        assert_eq!(engine.row_count(), 1);
    }

    #[tokio::test]
    async fn rollback_restores_the_pre_transaction_state() {
        let engine: MemoryEngine<Widget> = MemoryEngine::new(descriptor());
        engine.create(&values("kept"), None).await.unwrap();

        let handle = engine.begin().await.unwrap();
        engine.create(&values("discarded"), None).await.unwrap();
        assert_eq!(engine.row_count(), 2);

        engine.rollback(&handle).await.unwrap();
        assert_eq!(engine.row_count(), 1);

        let all: Vec<Widget> = engine.find_all(&Query::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].label, "kept");
    }

    #[tokio::test]
    async fn commit_discards_the_snapshot() {
        let engine: MemoryEngine<Widget> = MemoryEngine::new(descriptor());

        let handle = engine.begin().await.unwrap();
        engine.create(&values("stays"), None).await.unwrap();
        engine.commit(&handle).await.unwrap();

        assert_eq!(engine.row_count(), 1);
        let counters = engine.counters();
        assert_eq!(counters.begins, 1);
        assert_eq!(counters.commits, 1);
        assert_eq!(counters.rollbacks, 0);
    }

    #[tokio::test]
    async fn foreign_handle_is_rejected() {
        let engine: MemoryEngine<Widget> = MemoryEngine::new(descriptor());
        let foreign = TransactionHandle::new(Arc::new(42_u32));

        let err = engine.commit(&foreign).await.unwrap_err();
        assert_eq!(err.kind(), CartaErrorKind::Persistence);
    }
}
