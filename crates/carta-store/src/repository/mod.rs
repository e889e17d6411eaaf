//! Generic transactional entity repository
//!
//! One repository instance serves one entity type. It composes query
//! modifiers from the scope registry (built once from the entity's
//! descriptor), issues engine calls, and routes every mutation through the
//! transaction coordinator. The repository decides *what* runs inside a
//! transaction handle; it never commits or rolls back itself.

mod options;

pub use options::{
    EntityCreateOptions, EntityDeleteOptions, EntityFindOrCreateOptions, EntityUpdateOptions,
    EntityUpdateOrCreateOptions, PartialScopedFindOptions, ScopedFindOptions,
};

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use carta_core::{
    log_op_end, log_op_error, log_op_start, merge_values, CartaError, CartaErrorKind, Entity,
    EntityDescriptor, EntityResolution, EntityValues, Predicate, Query, Result, Scope, ScopeCall,
    ScopeRegistry,
};

use crate::engine::EntityEngine;
use crate::transaction::{BodyExtractor, RunningTransaction, TransactionCoordinator};

/// Generic per-entity-type CRUD facade
pub struct EntityRepository<E: Entity, G: EntityEngine<E>> {
    descriptor: Arc<EntityDescriptor>,
    registry: ScopeRegistry,
    engine: Arc<G>,
    coordinator: TransactionCoordinator<G>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, G: EntityEngine<E>> EntityRepository<E, G> {
    /// Create a repository for one entity type
    ///
    /// The scope registry is derived from the descriptor here, once, and
    /// reused for the lifetime of the repository.
    pub fn new(descriptor: Arc<EntityDescriptor>, engine: Arc<G>) -> Self {
        let registry = ScopeRegistry::for_descriptor(&descriptor);
        let coordinator = TransactionCoordinator::new(Arc::clone(&engine));

        Self {
            descriptor,
            registry,
            engine,
            coordinator,
            _entity: PhantomData,
        }
    }

    /// Install a body-extraction hook on the coordinator
    pub fn with_body_extractor(mut self, extractor: BodyExtractor) -> Self {
        self.coordinator = self.coordinator.with_body_extractor(extractor);
        self
    }

    /// The descriptor this repository was built for
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// The memoized scope registry
    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    /// The coordinator, for applications running multi-repository units of
    /// work
    pub fn coordinator(&self) -> &TransactionCoordinator<G> {
        &self.coordinator
    }

    /// Register an application-defined scope for this entity type
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the name collides with the fixed vocabulary or an
    /// existing scope.
    pub fn register_scope(&mut self, name: impl Into<String>, scope: Scope) -> Result<()> {
        self.registry.insert_custom(name, scope)
    }

    /// Single-result find under the default plus named scopes
    pub async fn find_entity(&self, options: ScopedFindOptions) -> Result<Option<E>> {
        let query = self.build_query(&options)?;
        tracing::debug!(
            component = module_path!(),
            op = "find_entity",
            table = self.descriptor.table_name(),
            scope_count = options.scopes.len(),
        );
        self.engine.find_one(&query).await
    }

    /// Multi-result find; missing option parts fall back to defaults
    pub async fn find_entities(
        &self,
        options: Option<PartialScopedFindOptions>,
    ) -> Result<Vec<E>> {
        let options = self.effective_find_options(options);
        let query = self.build_query(&options)?;
        tracing::debug!(
            component = module_path!(),
            op = "find_entities",
            table = self.descriptor.table_name(),
            scope_count = options.scopes.len(),
        );
        self.engine.find_all(&query).await
    }

    /// Single-result find that raises `NotFound` when nothing matches
    pub async fn find_or_fail_entity(&self, options: ScopedFindOptions) -> Result<E> {
        let predicate = options.predicate.clone();

        match self.find_entity(options).await? {
            Some(entity) => Ok(entity),
            None => Err(CartaError::new(CartaErrorKind::NotFound)
                .with_op("find_or_fail_entity")
                .with_table(self.descriptor.table_name())
                .with_message(format!("No match for predicate {:?}", predicate))),
        }
    }

    /// Turn a reference, UUID, or primary key into a materialized entity
    ///
    /// `ByInstance` returns the input unchanged and issues no engine call.
    /// `ByUuid` requires the descriptor to have a UUID column.
    pub async fn resolve_entity(
        &self,
        resolution: EntityResolution<E>,
        scopes: Vec<ScopeCall>,
    ) -> Result<Option<E>> {
        match resolution {
            EntityResolution::ByInstance(entity) => Ok(Some(entity)),
            EntityResolution::ByUuid(uuid) => {
                let Some(uuid_field) = self.descriptor.uuid_field() else {
                    return Err(CartaError::new(CartaErrorKind::MissingUuidColumn)
                        .with_op("resolve_entity")
                        .with_table(self.descriptor.table_name())
                        .with_message(format!(
                            "Uuid column not defined on {}",
                            self.descriptor.table_name()
                        )));
                };
                self.find_entity(ScopedFindOptions {
                    scopes,
                    predicate: Predicate::field_eq(uuid_field, uuid),
                })
                .await
            }
            EntityResolution::ByKey(key) => {
                self.find_entity(ScopedFindOptions {
                    scopes,
                    predicate: Predicate::field_eq(self.descriptor.primary_key_field(), key),
                })
                .await
            }
        }
    }

    /// Resolution that raises `NotFound` when nothing materializes
    pub async fn resolve_or_fail_entity(
        &self,
        resolution: EntityResolution<E>,
        scopes: Vec<ScopeCall>,
    ) -> Result<E> {
        let reference = match &resolution {
            EntityResolution::ByInstance(_) => None,
            EntityResolution::ByUuid(uuid) => Some(uuid.clone()),
            EntityResolution::ByKey(key) => Some(key.to_string()),
        };

        match self.resolve_entity(resolution, scopes).await? {
            Some(entity) => Ok(entity),
            None => {
                let mut err = CartaError::new(CartaErrorKind::NotFound)
                    .with_op("resolve_or_fail_entity")
                    .with_table(self.descriptor.table_name())
                    .with_message("Entity not resolved");
                if let Some(reference) = reference {
                    err = err.with_entity_ref(reference);
                }
                Err(err)
            }
        }
    }

    /// Return an existing entity or create one
    ///
    /// Precedence: a resolution that materializes wins, then a predicate
    /// that matches, then a create with `values_to_create`. Exactly one
    /// branch runs its terminal effect.
    pub async fn find_or_create_entity(
        &self,
        options: EntityFindOrCreateOptions<E>,
    ) -> Result<E> {
        let EntityFindOrCreateOptions {
            resolution,
            predicate,
            scopes,
            values_to_create,
            transaction,
        } = options;

        if let Some(resolution) = resolution {
            if let Some(found) = self.resolve_entity(resolution, scopes.clone()).await? {
                return Ok(found);
            }
        }

        if let Some(predicate) = predicate {
            if let Some(found) = self
                .find_entity(ScopedFindOptions { scopes, predicate })
                .await?
            {
                return Ok(found);
            }
        }

        self.create_entity(EntityCreateOptions {
            values_to_create,
            transaction,
        })
        .await
    }

    /// Insert a record inside the given (or a fresh) transaction
    pub async fn create_entity(&self, options: EntityCreateOptions) -> Result<E> {
        let EntityCreateOptions {
            values_to_create,
            transaction,
        } = options;

        log_op_start!("create_entity", table = self.descriptor.table_name());
        let started = Instant::now();

        let engine = Arc::clone(&self.engine);
        let result = self
            .coordinator
            .execute(transaction.as_ref(), move |running| async move {
                engine.create(&values_to_create, Some(running.handle())).await
            })
            .await;

        match &result {
            Ok(_) => log_op_end!(
                "create_entity",
                duration_ms = started.elapsed().as_millis() as u64,
                table = self.descriptor.table_name(),
            ),
            Err(err) => log_op_error!(
                "create_entity",
                err,
                duration_ms = started.elapsed().as_millis() as u64,
            ),
        }

        result
    }

    /// Apply values to a record located by predicate or resolution
    ///
    /// The predicate takes precedence when both are given. Raises `NotFound`
    /// when the target does not materialize.
    pub async fn update_entity(&self, options: EntityUpdateOptions<E>) -> Result<E> {
        let EntityUpdateOptions {
            resolution,
            predicate,
            scopes,
            values_to_update,
            transaction,
        } = options;

        let found = if let Some(predicate) = predicate {
            self.find_or_fail_entity(ScopedFindOptions { scopes, predicate })
                .await?
        } else if let Some(resolution) = resolution {
            self.resolve_or_fail_entity(resolution, scopes).await?
        } else {
            return Err(CartaError::new(CartaErrorKind::InvalidInput)
                .with_op("update_entity")
                .with_table(self.descriptor.table_name())
                .with_message("Update requires a predicate or a resolution"));
        };

        self.apply_update(found, values_to_update, transaction).await
    }

    /// Update an existing entity, or create one from the merged values
    ///
    /// Precedence mirrors `find_or_create_entity`; the create leg uses
    /// `values_to_create` overwritten by `values_to_update` on key
    /// collisions.
    pub async fn update_or_create_entity(
        &self,
        options: EntityUpdateOrCreateOptions<E>,
    ) -> Result<E> {
        let EntityUpdateOrCreateOptions {
            resolution,
            predicate,
            scopes,
            values_to_create,
            values_to_update,
            transaction,
        } = options;

        if let Some(resolution) = resolution {
            if let Some(found) = self.resolve_entity(resolution, scopes.clone()).await? {
                return self.apply_update(found, values_to_update, transaction).await;
            }
        }

        if let Some(predicate) = predicate {
            if let Some(found) = self
                .find_entity(ScopedFindOptions { scopes, predicate })
                .await?
            {
                return self.apply_update(found, values_to_update, transaction).await;
            }
        }

        let merged = merge_values(&values_to_create, &values_to_update);
        self.create_entity(EntityCreateOptions {
            values_to_create: merged,
            transaction,
        })
        .await
    }

    /// Destroy a record located by predicate or resolution
    ///
    /// Returns false with no side effect when the target does not
    /// materialize. `force` skips soft deletion.
    pub async fn delete_entity(&self, options: EntityDeleteOptions<E>) -> Result<bool> {
        let EntityDeleteOptions {
            resolution,
            predicate,
            scopes,
            force,
            transaction,
        } = options;

        let found = if let Some(predicate) = predicate {
            self.find_entity(ScopedFindOptions { scopes, predicate })
                .await?
        } else if let Some(resolution) = resolution {
            self.resolve_entity(resolution, scopes).await?
        } else {
            return Err(CartaError::new(CartaErrorKind::InvalidInput)
                .with_op("delete_entity")
                .with_table(self.descriptor.table_name())
                .with_message("Delete requires a predicate or a resolution"));
        };

        let Some(found) = found else {
            return Ok(false);
        };

        log_op_start!("delete_entity", table = self.descriptor.table_name(), force = force);
        let started = Instant::now();

        let engine = Arc::clone(&self.engine);
        let result = self
            .coordinator
            .execute(transaction.as_ref(), move |running| async move {
                engine.destroy(&found, force, Some(running.handle())).await
            })
            .await;

        match &result {
            Ok(()) => log_op_end!(
                "delete_entity",
                duration_ms = started.elapsed().as_millis() as u64,
                table = self.descriptor.table_name(),
            ),
            Err(err) => log_op_error!(
                "delete_entity",
                err,
                duration_ms = started.elapsed().as_millis() as u64,
            ),
        }

        result.map(|()| true)
    }

    /// Fill missing find-option parts with the process-wide defaults,
    /// without mutating caller-owned structures
    fn effective_find_options(
        &self,
        provided: Option<PartialScopedFindOptions>,
    ) -> ScopedFindOptions {
        let provided = provided.unwrap_or_default();

        ScopedFindOptions {
            scopes: provided.scopes.unwrap_or_default(),
            predicate: provided.predicate.unwrap_or_default(),
        }
    }

    /// Resolve named scopes and compose the effective query
    fn build_query(&self, options: &ScopedFindOptions) -> Result<Query> {
        let modifiers = self.registry.resolve(&options.scopes)?;
        Ok(Query::compose(&modifiers, &options.predicate))
    }

    async fn apply_update(
        &self,
        found: E,
        values_to_update: EntityValues,
        transaction: Option<RunningTransaction>,
    ) -> Result<E> {
        tracing::debug!(
            component = module_path!(),
            op = "update_entity",
            table = self.descriptor.table_name(),
        );

        let engine = Arc::clone(&self.engine);
        self.coordinator
            .execute(transaction.as_ref(), move |running| async move {
                engine
                    .update(&found, &values_to_update, Some(running.handle()))
                    .await
            })
            .await
    }
}
