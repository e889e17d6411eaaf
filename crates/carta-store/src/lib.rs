//! carta-store - Transactional entity repository over a persistence engine
//!
//! This crate provides the persistence boundary of the carta access layer:
//! - The persistence-engine contract ([`engine::TransactionBackend`],
//!   [`engine::EntityEngine`])
//! - The reentrant transaction coordinator with single-ownership
//!   commit/rollback semantics
//! - The generic per-entity-type repository
//!   (resolve/find/create/update/delete/upsert)
//! - An in-memory reference engine honoring descriptor metadata, used by
//!   tests and throwaway embedders

pub mod engine;
pub mod memory;
pub mod repository;
pub mod transaction;

// Re-export commonly used types
pub use engine::{EntityEngine, TransactionBackend};
pub use memory::{EngineCounters, MemoryEngine};
pub use repository::{
    EntityCreateOptions, EntityDeleteOptions, EntityFindOrCreateOptions, EntityRepository,
    EntityUpdateOptions, EntityUpdateOrCreateOptions, PartialScopedFindOptions, ScopedFindOptions,
};
pub use transaction::{
    BodyExtractor, RunningTransaction, TransactionCoordinator, TransactionHandle,
};
