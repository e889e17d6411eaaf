//! Option structs for repository operations
//!
//! Mutating options carry an optional [`RunningTransaction`]; the repository
//! forwards it into the coordinator unchanged, so a caller-owned transaction
//! is joined and an absent one makes the single operation its own unit of
//! work.
//!
//! Operations that locate a target accept a resolution and/or a predicate.
//! `update`/`delete` give the predicate precedence when both are present;
//! `find_or_create`/`update_or_create` try the resolution first.

use carta_core::{Entity, EntityResolution, EntityValues, Predicate, ScopeCall};

use crate::transaction::RunningTransaction;

/// Scope calls plus a predicate for a find operation
#[derive(Debug, Clone, Default)]
pub struct ScopedFindOptions {
    pub scopes: Vec<ScopeCall>,
    pub predicate: Predicate,
}

impl ScopedFindOptions {
    /// Find by predicate with no named scopes
    pub fn with_predicate(predicate: Predicate) -> Self {
        Self {
            scopes: Vec::new(),
            predicate,
        }
    }
}

/// Caller-side partial find options; missing parts fall back to the
/// process-wide defaults (no scopes, empty predicate)
#[derive(Debug, Clone, Default)]
pub struct PartialScopedFindOptions {
    pub scopes: Option<Vec<ScopeCall>>,
    pub predicate: Option<Predicate>,
}

/// Options for `create_entity`
#[derive(Debug, Clone, Default)]
pub struct EntityCreateOptions {
    pub values_to_create: EntityValues,
    pub transaction: Option<RunningTransaction>,
}

/// Options for `find_or_create_entity`
#[derive(Debug, Clone)]
pub struct EntityFindOrCreateOptions<E> {
    pub resolution: Option<EntityResolution<E>>,
    pub predicate: Option<Predicate>,
    pub scopes: Vec<ScopeCall>,
    pub values_to_create: EntityValues,
    pub transaction: Option<RunningTransaction>,
}

impl<E: Entity> Default for EntityFindOrCreateOptions<E> {
    fn default() -> Self {
        Self {
            resolution: None,
            predicate: None,
            scopes: Vec::new(),
            values_to_create: EntityValues::new(),
            transaction: None,
        }
    }
}

/// Options for `update_entity`
#[derive(Debug, Clone)]
pub struct EntityUpdateOptions<E> {
    pub resolution: Option<EntityResolution<E>>,
    pub predicate: Option<Predicate>,
    pub scopes: Vec<ScopeCall>,
    pub values_to_update: EntityValues,
    pub transaction: Option<RunningTransaction>,
}

impl<E: Entity> Default for EntityUpdateOptions<E> {
    fn default() -> Self {
        Self {
            resolution: None,
            predicate: None,
            scopes: Vec::new(),
            values_to_update: EntityValues::new(),
            transaction: None,
        }
    }
}

/// Options for `update_or_create_entity`
#[derive(Debug, Clone)]
pub struct EntityUpdateOrCreateOptions<E> {
    pub resolution: Option<EntityResolution<E>>,
    pub predicate: Option<Predicate>,
    pub scopes: Vec<ScopeCall>,
    pub values_to_create: EntityValues,
    pub values_to_update: EntityValues,
    pub transaction: Option<RunningTransaction>,
}

impl<E: Entity> Default for EntityUpdateOrCreateOptions<E> {
    fn default() -> Self {
        Self {
            resolution: None,
            predicate: None,
            scopes: Vec::new(),
            values_to_create: EntityValues::new(),
            values_to_update: EntityValues::new(),
            transaction: None,
        }
    }
}

/// Options for `delete_entity`
///
/// `force` defaults to false, meaning soft deletion when the descriptor has
/// a soft-delete column.
#[derive(Debug, Clone)]
pub struct EntityDeleteOptions<E> {
    pub resolution: Option<EntityResolution<E>>,
    pub predicate: Option<Predicate>,
    pub scopes: Vec<ScopeCall>,
    pub force: bool,
    pub transaction: Option<RunningTransaction>,
}

impl<E: Entity> Default for EntityDeleteOptions<E> {
    fn default() -> Self {
        Self {
            resolution: None,
            predicate: None,
            scopes: Vec::new(),
            force: false,
            transaction: None,
        }
    }
}
