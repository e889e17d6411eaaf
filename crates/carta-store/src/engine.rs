//! Persistence-engine contract
//!
//! The access layer never talks to a database directly; it talks to these
//! traits. A concrete engine (SQL, in-memory, remote) implements them and is
//! handed to the repository by the application.

use async_trait::async_trait;

use carta_core::{Entity, EntityValues, Query, Result};

use crate::transaction::TransactionHandle;

/// Transaction lifecycle surface of a persistence engine
///
/// Object-safe on purpose: the transaction coordinator only needs this part
/// of the engine.
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    /// Begin a new engine transaction and wrap it in an opaque handle
    async fn begin(&self) -> Result<TransactionHandle>;

    /// Commit the transaction behind the handle
    async fn commit(&self, handle: &TransactionHandle) -> Result<()>;

    /// Roll back the transaction behind the handle
    async fn rollback(&self, handle: &TransactionHandle) -> Result<()>;
}

/// Record CRUD surface of a persistence engine, per entity type
///
/// Finds take the composed [`Query`] (projection + predicate); mutations
/// additionally take the transaction handle they must run under, or `None`
/// for engine-default autocommit behavior.
#[async_trait]
pub trait EntityEngine<E: Entity>: TransactionBackend {
    /// Single-result query
    async fn find_one(&self, query: &Query) -> Result<Option<E>>;

    /// Multi-result query
    async fn find_all(&self, query: &Query) -> Result<Vec<E>>;

    /// Insert a record built from the given values
    async fn create(
        &self,
        values: &EntityValues,
        transaction: Option<&TransactionHandle>,
    ) -> Result<E>;

    /// Apply values to an existing record
    async fn update(
        &self,
        entity: &E,
        values: &EntityValues,
        transaction: Option<&TransactionHandle>,
    ) -> Result<E>;

    /// Destroy a record; `force` skips soft deletion
    async fn destroy(
        &self,
        entity: &E,
        force: bool,
        transaction: Option<&TransactionHandle>,
    ) -> Result<()>;
}
